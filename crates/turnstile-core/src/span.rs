//! Source locations carried through lowering.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A half-open byte range in the original source.
///
/// Lowering never interprets spans; they key the debug state table and
/// the allocator seed, and locate diagnostics.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[display("{start}..{end}")]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
