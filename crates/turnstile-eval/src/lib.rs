//! Reference runtime for synthesized state machines.
//!
//! Executes the lowered operations of a [`StateMachineType`] directly, so
//! that lowering can be checked by behaviour rather than by shape: what a
//! consumer observes through MoveNext, Current and Dispose.
//!
//! [`StateMachineType`]: turnstile_ir::StateMachineType

pub mod cancellation;
pub mod errors;
mod exec;
pub mod runtime;
pub mod value;

pub use cancellation::{
    CancellationSourceFactory, CancellationToken, CountingSourceFactory, LinkedTokenSource,
};
pub use errors::{EvalError, EvalResult};
pub use runtime::Runtime;
pub use value::{Instance, Task, Value};
