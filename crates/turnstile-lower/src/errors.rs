//! Error types for generator lowering.
//!
//! Every error here is an internal-invariant violation: the binder is
//! expected to reject ill-formed generators before lowering runs.

use derive_more::Display;
use turnstile_core::{CompilationPhase, Span};
use turnstile_ir::{LabelId, LocalId, ParamId};

pub type LoweringResult<T> = Result<T, LoweringError>;

#[derive(Display, Debug, Clone, PartialEq, Eq)]
#[display("{kind}")]
pub struct LoweringError {
    kind: Box<LoweringErrorKind>,
}

impl From<LoweringErrorKind> for LoweringError {
    fn from(kind: LoweringErrorKind) -> Self {
        LoweringError {
            kind: Box::new(kind),
        }
    }
}

impl LoweringError {
    pub fn kind(&self) -> &LoweringErrorKind {
        &self.kind
    }

    /// Source location to attach to the diagnostic, when one is known.
    pub fn span(&self) -> Option<Span> {
        match &*self.kind {
            LoweringErrorKind::SuspensionInFinally(span)
            | LoweringErrorKind::YieldInCatch(span)
            | LoweringErrorKind::BranchOutsideLoop(_, span)
            | LoweringErrorKind::ExitFromFinally(_, span)
            | LoweringErrorKind::NoDisposalTarget(span)
            | LoweringErrorKind::MissingAwaiterField(span) => Some(*span),
            _ => None,
        }
    }

    pub fn phase(&self) -> CompilationPhase {
        match &*self.kind {
            LoweringErrorKind::CancellationTokenParameter(_)
            | LoweringErrorKind::LinkedCancellationWithoutEnumerable => {
                CompilationPhase::Synthesis
            }
            _ => CompilationPhase::Lowering,
        }
    }

    pub(crate) fn suspension_in_finally(span: Span) -> Self {
        LoweringErrorKind::SuspensionInFinally(span).into()
    }

    pub(crate) fn yield_in_catch(span: Span) -> Self {
        LoweringErrorKind::YieldInCatch(span).into()
    }
}

#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum LoweringErrorKind {
    #[display("suspension point inside a finally clause at {_0}")]
    SuspensionInFinally(Span),

    #[display("yield inside a catch clause at {_0}")]
    YieldInCatch(Span),

    #[display("`{_0}` outside of a loop at {_1}")]
    BranchOutsideLoop(&'static str, Span),

    #[display("`{_0}` leaves a finally clause at {_1}")]
    ExitFromFinally(&'static str, Span),

    #[display("reference to undeclared {_0}")]
    UnknownLocal(LocalId),

    #[display("reference to undeclared {_0}")]
    UnknownParameter(ParamId),

    #[display("no disposal target is active at {_0}")]
    NoDisposalTarget(Span),

    #[display("await at {_0} but the machine has no awaiter field")]
    MissingAwaiterField(Span),

    #[display("disposal target stack popped while empty")]
    DisposalStackUnderflow,

    #[display("disposal target mismatch: expected {expected:?}, found {found:?}")]
    DisposalTargetMismatch {
        expected: Option<LabelId>,
        found: Option<LabelId>,
    },

    #[display("disposal target stack still holds {_0} entries after lowering")]
    UnbalancedDisposalStack(usize),

    #[display("linked cancellation needs exactly one cancellation token parameter, found {_0}")]
    CancellationTokenParameter(usize),

    #[display("linked cancellation is only available to re-iterable generators")]
    LinkedCancellationWithoutEnumerable,
}

impl std::error::Error for LoweringError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_and_span() {
        let err = LoweringError::suspension_in_finally(Span::new(10, 14));
        assert_eq!(err.to_string(), "suspension point inside a finally clause at 10..14");
        assert_eq!(err.span(), Some(Span::new(10, 14)));
        assert_eq!(err.phase(), CompilationPhase::Lowering);
    }

    #[test]
    fn test_synthesis_errors_have_no_span() {
        let err = LoweringError::from(LoweringErrorKind::CancellationTokenParameter(2));
        assert_eq!(err.span(), None);
        assert_eq!(err.phase(), CompilationPhase::Synthesis);
        assert_eq!(
            err.to_string(),
            "linked cancellation needs exactly one cancellation token parameter, found 2"
        );
    }
}
