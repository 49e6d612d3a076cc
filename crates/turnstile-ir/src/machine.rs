//! The synthesized state-machine type and its resume-state numbering.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use turnstile_core::Span;

use crate::bound::{LocalId, ParamId};
use crate::lowered::Region;

/// Identifies the suspension point a machine resumes from.
///
/// Yield points count down from [`ResumeState::FIRST_YIELD`], await points
/// count up from [`ResumeState::FIRST_AWAIT`]; the two spaces never meet.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("{_0}")]
pub struct ResumeState(pub i32);

impl ResumeState {
    /// Executing inside Advance.
    pub const RUNNING: ResumeState = ResumeState(-1);
    /// Terminal. A kicked-off re-iterable object also sits here until
    /// GetEnumerator hands it out.
    pub const FINISHED: ResumeState = ResumeState(-2);
    pub const INITIAL_ENUMERABLE: ResumeState = ResumeState::FINISHED;
    /// Constructed enumerator awaiting its first Advance.
    pub const NOT_STARTED: ResumeState = ResumeState(-3);
    pub const FIRST_YIELD: ResumeState = ResumeState(-4);
    pub const FIRST_AWAIT: ResumeState = ResumeState(0);

    pub fn is_reserved(self) -> bool {
        (Self::NOT_STARTED.0..=Self::RUNNING.0).contains(&self.0)
    }

    /// Which numbering space an allocated state belongs to.
    pub fn space(self) -> Option<SuspensionKind> {
        if self.0 <= Self::FIRST_YIELD.0 {
            Some(SuspensionKind::Yield)
        } else if self.0 >= Self::FIRST_AWAIT.0 {
            Some(SuspensionKind::Await)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuspensionKind {
    #[display("yield")]
    Yield,
    #[display("await")]
    Await,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateEntry {
    pub kind: SuspensionKind,
    pub span: Span,
}

/// Resume state → source location, for debuggers. Lowering writes it and
/// never reads it back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateDebugMap {
    entries: BTreeMap<ResumeState, StateEntry>,
}

impl StateDebugMap {
    pub fn insert(&mut self, state: ResumeState, entry: StateEntry) {
        self.entries.insert(state, entry);
    }

    pub fn get(&self, state: ResumeState) -> Option<&StateEntry> {
        self.entries.get(&state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResumeState, &StateEntry)> {
        self.entries.iter().map(|(state, entry)| (*state, entry))
    }
}

/// Whether the machine is handed out directly as an enumerator or wrapped
/// in an enumerable that can start fresh runs.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flavor {
    #[default]
    #[display("enumerator")]
    Enumerator,
    #[display("reiterable")]
    Reiterable,
}

#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("#{_0}")]
pub struct FieldId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDecl {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    State,
    Current,
    DisposeMode,
    Awaiter,
    Parameter(ParamId),
    /// Value the parameter had at kickoff; copied into the parameter field
    /// by every GetEnumerator.
    ParameterProxy(ParamId),
    HoistedLocal(LocalId),
    CombinedTokens,
}

/// Body of one synthesized operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodBody {
    pub arity: u32,
    pub temps: u32,
    pub body: Region,
}

/// The lowering result: one type per generator method.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateMachineType {
    pub name: String,
    pub flavor: Flavor,
    pub fields: Vec<FieldDecl>,
    /// Replacement body of the original method.
    pub kickoff: MethodBody,
    pub advance: MethodBody,
    pub current: MethodBody,
    pub request_dispose: MethodBody,
    /// Present for [`Flavor::Reiterable`] only.
    pub get_enumerator: Option<MethodBody>,
    pub states: StateDebugMap,
}

impl StateMachineType {
    pub fn field(&self, id: FieldId) -> Option<&FieldDecl> {
        self.fields.get(id.0 as usize)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_of_kind(&self, kind: FieldKind) -> Option<&FieldDecl> {
        self.fields.iter().find(|field| field.kind == kind)
    }

    pub fn hoisted_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields
            .iter()
            .filter(|field| matches!(field.kind, FieldKind::HoistedLocal(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_states() {
        assert!(ResumeState::RUNNING.is_reserved());
        assert!(ResumeState::FINISHED.is_reserved());
        assert!(ResumeState::NOT_STARTED.is_reserved());
        assert!(!ResumeState::FIRST_YIELD.is_reserved());
        assert!(!ResumeState::FIRST_AWAIT.is_reserved());
    }

    #[test]
    fn test_numbering_spaces() {
        assert_eq!(ResumeState(-7).space(), Some(SuspensionKind::Yield));
        assert_eq!(ResumeState(3).space(), Some(SuspensionKind::Await));
        assert_eq!(ResumeState::NOT_STARTED.space(), None);
    }
}
