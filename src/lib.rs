//! Turnstile: lowering of generator methods into resumable state machines.
//!
//! The heavy lifting lives in the member crates; this crate ties them into
//! an incremental pipeline and reads generators from disk.

pub mod input;
pub mod pipeline;

pub use input::{GeneratorFile, InputError};
pub use pipeline::{
    GeneratorSource, LoweringOutput, lower_generator, lower_with_diagnostics,
    lowering_diagnostics, state_debug_map,
};
pub use turnstile_core::{Diagnostic, TurnstileDatabaseImpl};
