use turnstile_core::Span;
use turnstile_ir::{Expr, LExpr, LPlace, LStmt, Outcome, Place, ResumeState, SuspensionKind};

use super::Rewriter;
use crate::errors::{LoweringErrorKind, LoweringResult};

impl Rewriter<'_> {
    /// ```text
    /// self.current = value
    /// self.state = N
    /// return produced
    /// resume:
    /// self.state = -1
    /// if self.dispose_mode goto <disposal>
    /// ```
    pub(super) fn lower_yield(
        &mut self,
        value: &Expr,
        span: Span,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let disposal = self
            .disposal
            .current()
            .ok_or(LoweringErrorKind::NoDisposalTarget(span))?;
        let value = self.lower_expr(value)?;
        let state = self.allocator.allocate(SuspensionKind::Yield, span);
        let resume = self.label();

        out.push(LStmt::assign(LPlace::this_field(self.layout.current), value));
        out.push(self.set_state(state));
        out.push(LStmt::Return(Outcome::Produced));
        out.push(LStmt::Label(resume));
        out.push(self.set_state(ResumeState::RUNNING));
        out.push(LStmt::goto_if(self.field(self.layout.dispose_mode), disposal));

        self.register_resume(state, resume);
        Ok(())
    }

    /// ```text
    /// t = awaiter(operand)
    /// if completed(t) goto ready
    /// self.state = N
    /// self.awaiter = t
    /// return pending
    /// resume:
    /// t = self.awaiter
    /// self.awaiter = null
    /// self.state = -1
    /// ready:
    /// target = result(t)
    /// ```
    pub(super) fn lower_await(
        &mut self,
        target: Option<&Place>,
        operand: &Expr,
        span: Span,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let awaiter_field = self
            .layout
            .awaiter
            .ok_or(LoweringErrorKind::MissingAwaiterField(span))?;
        let operand = self.lower_expr(operand)?;
        let state = self.allocator.allocate(SuspensionKind::Await, span);
        let awaiter = self.temp();
        let resume = self.label();
        let ready = self.label();

        out.push(LStmt::assign(
            LPlace::Temp(awaiter),
            LExpr::Awaiter(Box::new(operand)),
        ));
        out.push(LStmt::goto_if(
            LExpr::IsCompleted(Box::new(LExpr::Temp(awaiter))),
            ready,
        ));
        out.push(self.set_state(state));
        out.push(LStmt::assign(
            LPlace::this_field(awaiter_field),
            LExpr::Temp(awaiter),
        ));
        out.push(LStmt::Return(Outcome::Pending));
        out.push(LStmt::Label(resume));
        out.push(LStmt::assign(
            LPlace::Temp(awaiter),
            self.field(awaiter_field),
        ));
        out.push(LStmt::assign(
            LPlace::this_field(awaiter_field),
            LExpr::null(),
        ));
        out.push(self.set_state(ResumeState::RUNNING));
        out.push(LStmt::Label(ready));

        let result = LExpr::AwaitResult(Box::new(LExpr::Temp(awaiter)));
        match target {
            Some(place) => {
                let place = self.lower_place(*place)?;
                out.push(LStmt::assign(place, result));
            }
            None => out.push(LStmt::Eval(result)),
        }

        self.register_resume(state, resume);
        Ok(())
    }

    /// `yield break`, `return`, and the end of the body: start disposal
    /// from the innermost cleanup outward.
    pub(super) fn lower_exit(&mut self, span: Span, out: &mut Vec<LStmt>) -> LoweringResult<()> {
        let disposal = self
            .disposal
            .current()
            .ok_or(LoweringErrorKind::NoDisposalTarget(span))?;
        out.push(LStmt::assign(
            LPlace::this_field(self.layout.dispose_mode),
            LExpr::bool(true),
        ));
        out.push(LStmt::Goto(disposal));
        Ok(())
    }
}
