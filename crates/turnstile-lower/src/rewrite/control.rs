//! Structured control flow: `if`, `while`, `break` and `continue`.
//!
//! A branch that leaves an extracted finally cannot jump straight to its
//! target, since the finally body only runs when control falls into it.
//! Instead it records a pending-branch id and jumps to the finally entry;
//! the code after the finally body dispatches on that id.

use turnstile_core::Span;
use turnstile_ir::{BinaryOp, Expr, LExpr, LPlace, LStmt, LabelId, Stmt, TempId};

use super::Rewriter;
use crate::errors::{LoweringErrorKind, LoweringResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BranchKind {
    Break,
    Continue,
}

impl BranchKind {
    fn keyword(self) -> &'static str {
        match self {
            BranchKind::Break => "break",
            BranchKind::Continue => "continue",
        }
    }
}

#[derive(Debug)]
pub(crate) enum Frame {
    Loop {
        head: LabelId,
        exit: LabelId,
    },
    /// An extracted finally; branches leaving it are parked here until
    /// its body has been emitted.
    Finally {
        entry: LabelId,
        branches: Vec<PendingBranch>,
    },
}

#[derive(Debug)]
pub(crate) struct PendingBranch {
    id: i64,
    /// Index of the loop frame the branch belongs to.
    frame: usize,
    target: LabelId,
}

impl Rewriter<'_> {
    pub(super) fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let cond = self.lower_expr(cond)?;
        match else_branch {
            None => {
                let end = self.label();
                out.push(LStmt::goto_if(LExpr::not(cond), end));
                self.lower_stmt(then_branch, out)?;
                out.push(LStmt::Label(end));
            }
            Some(else_branch) => {
                let otherwise = self.label();
                let end = self.label();
                out.push(LStmt::goto_if(LExpr::not(cond), otherwise));
                self.lower_stmt(then_branch, out)?;
                out.push(LStmt::Goto(end));
                out.push(LStmt::Label(otherwise));
                self.lower_stmt(else_branch, out)?;
                out.push(LStmt::Label(end));
            }
        }
        Ok(())
    }

    pub(super) fn lower_while(
        &mut self,
        cond: &Expr,
        body: &Stmt,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let head = self.label();
        let exit = self.label();
        out.push(LStmt::Label(head));
        let cond = self.lower_expr(cond)?;
        out.push(LStmt::goto_if(LExpr::not(cond), exit));

        self.frames.push(Frame::Loop { head, exit });
        let lowered = self.lower_stmt(body, out);
        self.frames.pop();
        lowered?;

        out.push(LStmt::Goto(head));
        out.push(LStmt::Label(exit));
        Ok(())
    }

    pub(super) fn lower_branch(
        &mut self,
        kind: BranchKind,
        span: Span,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let (frame, head, exit) = self
            .frames
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, frame)| match frame {
                Frame::Loop { head, exit } => Some((index, *head, *exit)),
                Frame::Finally { .. } => None,
            })
            .ok_or(LoweringErrorKind::BranchOutsideLoop(kind.keyword(), span))?;
        let target = match kind {
            BranchKind::Break => exit,
            BranchKind::Continue => head,
        };
        self.route(frame, target, out);
        Ok(())
    }

    /// Jump to `target` in loop frame `frame`, parking the branch in the
    /// innermost extracted finally in between, if any.
    fn route(&mut self, frame: usize, target: LabelId, out: &mut Vec<LStmt>) {
        let crosses_finally = self.frames[frame + 1..]
            .iter()
            .any(|f| matches!(f, Frame::Finally { .. }));
        if !crosses_finally {
            out.push(LStmt::Goto(target));
            return;
        }

        let id = self.next_branch;
        self.next_branch += 1;
        let pending = self.pending_branch_temp();
        let entry = self.frames[frame + 1..]
            .iter_mut()
            .rev()
            .find_map(|f| match f {
                Frame::Finally { entry, branches } => {
                    branches.push(PendingBranch { id, frame, target });
                    Some(*entry)
                }
                Frame::Loop { .. } => None,
            });
        if let Some(entry) = entry {
            out.push(LStmt::assign(LPlace::Temp(pending), LExpr::int(id)));
            out.push(LStmt::Goto(entry));
        }
    }

    /// Resume the branches parked in a finally that has just been emitted.
    pub(super) fn emit_pending_branches(
        &mut self,
        branches: Vec<PendingBranch>,
        out: &mut Vec<LStmt>,
    ) {
        for branch in branches {
            let pending = self.pending_branch_temp();
            let skip = self.label();
            out.push(LStmt::goto_if(
                LExpr::binary(BinaryOp::Ne, LExpr::Temp(pending), LExpr::int(branch.id)),
                skip,
            ));
            out.push(LStmt::assign(LPlace::Temp(pending), LExpr::null()));
            self.route(branch.frame, branch.target, out);
            out.push(LStmt::Label(skip));
        }
    }

    pub(super) fn pending_branch_temp(&mut self) -> TempId {
        match self.pending_branch {
            Some(temp) => temp,
            None => {
                let temp = self.temp();
                self.pending_branch = Some(temp);
                temp
            }
        }
    }
}
