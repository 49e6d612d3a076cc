//! Disposal continuation tracking.
//!
//! While the rewriter walks the body it keeps a stack of "where does
//! disposal go from here" labels. A region with cleanup work pushes the
//! label that leads into that cleanup; a `finally` body pushes `None`
//! because disposal simply falls through it.

use turnstile_ir::LabelId;

use crate::errors::{LoweringErrorKind, LoweringResult};

#[derive(Debug, Default)]
pub struct DisposalTracker {
    stack: Vec<Option<LabelId>>,
}

impl DisposalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: Option<LabelId>) {
        tracing::trace!(?target, depth = self.stack.len(), "push disposal target");
        self.stack.push(target);
    }

    /// Pop the innermost target, which must be `expected`.
    pub fn pop(&mut self, expected: Option<LabelId>) -> LoweringResult<()> {
        match self.stack.pop() {
            None => Err(LoweringErrorKind::DisposalStackUnderflow.into()),
            Some(found) if found != expected => {
                Err(LoweringErrorKind::DisposalTargetMismatch { expected, found }.into())
            }
            Some(_) => Ok(()),
        }
    }

    /// The active disposal target. `None` both inside a `finally` body and
    /// when nothing was pushed.
    pub fn current(&self) -> Option<LabelId> {
        self.stack.last().copied().flatten()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Check that every push was matched by a pop.
    pub fn finish(&self) -> LoweringResult<()> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(LoweringErrorKind::UnbalancedDisposalStack(self.stack.len()).into())
        }
    }
}

/// Anything that owns a [`DisposalTracker`] and can run a nested lowering
/// step with a disposal target in scope.
pub trait DisposalScope {
    fn disposal(&mut self) -> &mut DisposalTracker;

    /// Run `f` with `target` active, restoring the previous target after.
    ///
    /// The pop happens whether `f` succeeds or not; a failure from `f`
    /// takes precedence over a failed pop.
    fn with_target<T>(
        &mut self,
        target: Option<LabelId>,
        f: impl FnOnce(&mut Self) -> LoweringResult<T>,
    ) -> LoweringResult<T>
    where
        Self: Sized,
    {
        self.disposal().push(target);
        let result = f(self);
        let popped = self.disposal().pop(target);
        let value = result?;
        popped?;
        Ok(value)
    }
}

impl DisposalScope for DisposalTracker {
    fn disposal(&mut self) -> &mut DisposalTracker {
        self
    }
}
