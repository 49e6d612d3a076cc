use derive_more::Display;
use turnstile_ir::{FieldId, LabelId, TempId};

use crate::value::Value;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Display, Debug, Clone)]
pub enum EvalError {
    /// User code threw and nothing caught it.
    #[display("uncaught exception: {_0}")]
    Thrown(Value),

    #[display("disposal requested while the machine is running or awaiting")]
    DisposeWhileRunning,

    #[display("machine resumed in a state that no longer exists")]
    RemovedState,

    #[display("jump to {_0}, which is not reachable from here")]
    UnknownLabel(LabelId),

    #[display("read of unallocated temporary {_0}")]
    UnknownTemp(TempId),

    #[display("access to unknown field {_0}")]
    UnknownField(FieldId),

    #[display("missing argument {_0}")]
    MissingArgument(u32),

    #[display("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    #[display("unknown host function `{_0}`")]
    UnknownFunction(String),

    #[display("`{_0}` expects {_1} argument(s)")]
    Arity(String, usize),

    #[display("operation ended without returning")]
    MissingReturn,

    #[display("`self` used outside of an instance operation")]
    NoReceiver,

    #[display("awaiting a task that nothing will complete")]
    Stalled,

    #[display("result of a task that has not completed")]
    NotCompleted,

    #[display("cannot throw null")]
    ThrowNull,

    #[display("machine `{_0}` has no GetEnumerator")]
    NotReiterable(String),

    #[display("step limit of {_0} exceeded")]
    StepLimit(usize),
}

impl std::error::Error for EvalError {}

impl EvalError {
    pub(crate) fn type_error(expected: &'static str, found: &Value) -> Self {
        EvalError::Type {
            expected,
            found: found.type_name(),
        }
    }
}
