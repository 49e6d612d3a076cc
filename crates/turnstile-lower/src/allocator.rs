//! Resume-state allocation.
//!
//! One [`StateAllocator`] is owned by each lowering run and consulted once
//! per suspension point, in source order. Yield states count down from
//! `-4`, await states count up from `0`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use turnstile_core::Span;
use turnstile_ir::{ResumeState, StateDebugMap, StateEntry, SuspensionKind};

/// States handed out by an earlier compilation of the same method, keyed
/// by the span of their suspension point.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocatorSeed {
    pub entries: Vec<SeedEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedEntry {
    pub span: Span,
    pub kind: SuspensionKind,
    pub state: ResumeState,
}

impl AllocatorSeed {
    /// Seed a recompilation with the states of a previous lowering.
    pub fn from_debug_map(map: &StateDebugMap) -> Self {
        AllocatorSeed {
            entries: map
                .iter()
                .map(|(state, entry)| SeedEntry {
                    span: entry.span,
                    kind: entry.kind,
                    state,
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct StateAllocator {
    next_yield: i32,
    next_await: i32,
    previous: Vec<SeedEntry>,
    reused: BTreeSet<ResumeState>,
    debug_map: StateDebugMap,
}

impl Default for StateAllocator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StateAllocator {
    pub fn new(seed: Option<&AllocatorSeed>) -> Self {
        let mut allocator = StateAllocator {
            next_yield: ResumeState::FIRST_YIELD.0,
            next_await: ResumeState::FIRST_AWAIT.0,
            previous: Vec::new(),
            reused: BTreeSet::new(),
            debug_map: StateDebugMap::default(),
        };

        for entry in seed.into_iter().flat_map(|seed| &seed.entries) {
            if entry.state.space() != Some(entry.kind) {
                tracing::warn!(
                    state = %entry.state,
                    kind = %entry.kind,
                    "ignoring seed entry outside its numbering space"
                );
                continue;
            }
            // Fresh numbers continue past every seeded one.
            match entry.kind {
                SuspensionKind::Yield => {
                    allocator.next_yield = allocator.next_yield.min(entry.state.0 - 1)
                }
                SuspensionKind::Await => {
                    allocator.next_await = allocator.next_await.max(entry.state.0 + 1)
                }
            }
            allocator.previous.push(*entry);
        }

        allocator
    }

    pub fn allocate(&mut self, kind: SuspensionKind, span: Span) -> ResumeState {
        let previous = self
            .previous
            .iter()
            .find(|entry| {
                entry.kind == kind && entry.span == span && !self.reused.contains(&entry.state)
            })
            .map(|entry| entry.state);

        let state = match previous {
            Some(state) => {
                self.reused.insert(state);
                state
            }
            None => self.fresh(kind),
        };

        self.debug_map.insert(state, StateEntry { kind, span });
        tracing::trace!(%state, %kind, %span, "allocated resume state");
        state
    }

    fn fresh(&mut self, kind: SuspensionKind) -> ResumeState {
        match kind {
            SuspensionKind::Yield => {
                let state = ResumeState(self.next_yield);
                self.next_yield -= 1;
                state
            }
            SuspensionKind::Await => {
                let state = ResumeState(self.next_await);
                self.next_await += 1;
                state
            }
        }
    }

    /// Seeded states that no suspension point claimed in this run.
    pub fn missing_states(&self) -> Vec<ResumeState> {
        let missing: BTreeSet<_> = self
            .previous
            .iter()
            .map(|entry| entry.state)
            .filter(|state| !self.reused.contains(state))
            .collect();
        missing.into_iter().collect()
    }

    pub fn debug_map(&self) -> &StateDebugMap {
        &self.debug_map
    }

    pub fn into_debug_map(self) -> StateDebugMap {
        self.debug_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(n: usize) -> Span {
        Span::new(n, n + 1)
    }

    #[test]
    fn test_yield_states_decrease() {
        let mut allocator = StateAllocator::default();
        let states: Vec<_> = (0..3)
            .map(|n| allocator.allocate(SuspensionKind::Yield, span(n)))
            .collect();
        assert_eq!(states, vec![ResumeState(-4), ResumeState(-5), ResumeState(-6)]);
    }

    #[test]
    fn test_await_states_increase() {
        let mut allocator = StateAllocator::default();
        let states: Vec<_> = (0..3)
            .map(|n| allocator.allocate(SuspensionKind::Await, span(n)))
            .collect();
        assert_eq!(states, vec![ResumeState(0), ResumeState(1), ResumeState(2)]);
    }

    #[test]
    fn test_interleaved_spaces_never_collide() {
        let mut allocator = StateAllocator::default();
        let a = allocator.allocate(SuspensionKind::Await, span(0));
        let y = allocator.allocate(SuspensionKind::Yield, span(1));
        let b = allocator.allocate(SuspensionKind::Await, span(2));
        let z = allocator.allocate(SuspensionKind::Yield, span(3));
        assert_eq!((a, b), (ResumeState(0), ResumeState(1)));
        assert_eq!((y, z), (ResumeState(-4), ResumeState(-5)));
        assert_eq!(allocator.debug_map().len(), 4);
    }

    #[test]
    fn test_debug_map_records_locations() {
        let mut allocator = StateAllocator::default();
        let state = allocator.allocate(SuspensionKind::Yield, Span::new(40, 52));
        let map = allocator.into_debug_map();
        assert_eq!(
            map.get(state),
            Some(&StateEntry {
                kind: SuspensionKind::Yield,
                span: Span::new(40, 52),
            })
        );
    }

    #[test]
    fn test_seed_reuses_matching_spans() {
        let seed = AllocatorSeed {
            entries: vec![
                SeedEntry {
                    span: span(7),
                    kind: SuspensionKind::Yield,
                    state: ResumeState(-9),
                },
                SeedEntry {
                    span: span(8),
                    kind: SuspensionKind::Await,
                    state: ResumeState(4),
                },
            ],
        };
        let mut allocator = StateAllocator::new(Some(&seed));

        // A new suspension point gets a number past every seeded one.
        assert_eq!(
            allocator.allocate(SuspensionKind::Yield, span(1)),
            ResumeState(-10)
        );
        assert_eq!(
            allocator.allocate(SuspensionKind::Yield, span(7)),
            ResumeState(-9)
        );
        assert_eq!(
            allocator.allocate(SuspensionKind::Await, span(2)),
            ResumeState(5)
        );
        assert_eq!(allocator.missing_states(), vec![ResumeState(4)]);
    }

    #[test]
    fn test_seed_kind_must_match() {
        let seed = AllocatorSeed {
            entries: vec![SeedEntry {
                span: span(3),
                kind: SuspensionKind::Await,
                state: ResumeState(0),
            }],
        };
        let mut allocator = StateAllocator::new(Some(&seed));
        assert_eq!(
            allocator.allocate(SuspensionKind::Yield, span(3)),
            ResumeState(-4)
        );
    }

    #[test]
    fn test_seed_entries_outside_their_space_are_ignored() {
        let seed = AllocatorSeed {
            entries: vec![SeedEntry {
                span: span(0),
                kind: SuspensionKind::Yield,
                state: ResumeState(2),
            }],
        };
        let mut allocator = StateAllocator::new(Some(&seed));
        assert_eq!(
            allocator.allocate(SuspensionKind::Yield, span(0)),
            ResumeState(-4)
        );
        assert!(allocator.missing_states().is_empty());
    }

    #[test]
    fn test_seed_round_trips_through_debug_map() {
        let mut first = StateAllocator::default();
        first.allocate(SuspensionKind::Yield, span(0));
        first.allocate(SuspensionKind::Await, span(1));
        first.allocate(SuspensionKind::Yield, span(2));
        let seed = AllocatorSeed::from_debug_map(first.debug_map());

        // The middle yield was deleted in the edit; the others keep their numbers.
        let mut second = StateAllocator::new(Some(&seed));
        assert_eq!(second.allocate(SuspensionKind::Yield, span(0)), ResumeState(-4));
        assert_eq!(second.allocate(SuspensionKind::Yield, span(2)), ResumeState(-5));
        assert_eq!(second.allocate(SuspensionKind::Yield, span(9)), ResumeState(-6));
        assert_eq!(second.missing_states(), vec![ResumeState(0)]);
    }
}
