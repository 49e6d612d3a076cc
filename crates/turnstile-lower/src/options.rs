//! Configuration of a lowering run.

use serde::{Deserialize, Serialize};
use turnstile_ir::Flavor;

use crate::allocator::AllocatorSeed;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringOptions {
    pub flavor: Flavor,
    /// Combine the token parameter with the token passed to GetEnumerator
    /// through a linked cancellation source.
    pub linked_cancellation: bool,
    /// States assigned by a previous compilation of the same method.
    pub allocator_seed: Option<AllocatorSeed>,
}

impl LoweringOptions {
    pub fn reiterable() -> Self {
        LoweringOptions {
            flavor: Flavor::Reiterable,
            ..Default::default()
        }
    }
}
