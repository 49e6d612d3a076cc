//! Lowering of generator methods into resumable state machines.
//!
//! ## Pipeline
//!
//! 1. [`analysis`]: shape checks and suspension counts
//! 2. [`hoist`]: locals that must survive a suspension become fields
//! 3. [`layout`]: field table of the synthesized type
//! 4. [`rewrite`]: the Advance routine, numbering resume states through the
//!    [`allocator`] and threading disposal targets through [`disposal`]
//! 5. [`builder`]: kickoff, Current, RequestDispose and GetEnumerator

pub mod allocator;
pub mod analysis;
pub mod builder;
pub mod disposal;
pub mod errors;
pub mod hoist;
pub mod layout;
pub mod options;
pub mod rewrite;

// Re-exports
pub use allocator::{AllocatorSeed, SeedEntry, StateAllocator};
pub use disposal::{DisposalScope, DisposalTracker};
pub use errors::{LoweringError, LoweringErrorKind, LoweringResult};
pub use options::LoweringOptions;

use turnstile_ir::{MethodDecl, StateMachineType};

use crate::layout::FieldLayout;

/// Lower one generator method into its state-machine type.
#[tracing::instrument(skip_all, fields(method = %method.name))]
pub fn lower_method(
    method: &MethodDecl,
    options: &LoweringOptions,
) -> LoweringResult<StateMachineType> {
    let facts = analysis::analyze_body(method)?;
    let hoisted = hoist::hoisted_locals(method);
    let layout = FieldLayout::new(method, options, &facts, &hoisted)?;
    let allocator = StateAllocator::new(options.allocator_seed.as_ref());
    let body = rewrite::rewrite_body(method, &layout, allocator)?;
    Ok(builder::build_machine(method, options.flavor, layout, body))
}
