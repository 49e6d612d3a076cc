//! Rewrite a generator body into the Advance routine of its state machine.
//!
//! - `yield return` → store `current`, set the state, return produced, resume label,
//!   disposal test
//! - `await` → awaiter fast path, suspension, resume label
//! - `yield break` / `return` → raise `dispose_mode` and jump to the active disposal label
//! - `try`/`finally` around a suspension → extracted finally
//! - `if` / `while` → labels and conditional jumps
//!
//! The whole body runs inside one catching region that tears the machine
//! down on an uncaught failure and rethrows.

mod control;
mod exceptions;
mod suspension;


use std::collections::HashMap;

use turnstile_ir::{
    BinaryOp, CatchRegion, Constant, Expr, FieldId, LExpr, LPlace, LStmt, LabelId, LocalId,
    MethodBody, MethodDecl, Outcome, Place, Region, ResumeState, RuntimeFault, StateDebugMap, Stmt,
    StmtKind, TempId, TryRegion,
};

use crate::allocator::StateAllocator;
use crate::disposal::{DisposalScope, DisposalTracker};
use crate::errors::{LoweringErrorKind, LoweringResult};
use crate::layout::FieldLayout;

use control::{BranchKind, Frame};

/// Advance plus the resume-state table produced while building it.
#[derive(Debug)]
pub struct RewrittenBody {
    pub advance: MethodBody,
    pub states: StateDebugMap,
}

pub fn rewrite_body(
    method: &MethodDecl,
    layout: &FieldLayout,
    allocator: StateAllocator,
) -> LoweringResult<RewrittenBody> {
    Rewriter {
        method,
        layout,
        allocator,
        disposal: DisposalTracker::new(),
        next_label: 0,
        next_temp: 0,
        next_branch: 1,
        locals: HashMap::new(),
        frames: Vec::new(),
        dispatch: Vec::new(),
        pending_branch: None,
    }
    .run()
}

pub(crate) struct Rewriter<'a> {
    method: &'a MethodDecl,
    layout: &'a FieldLayout,
    allocator: StateAllocator,
    disposal: DisposalTracker,
    next_label: u32,
    next_temp: u32,
    next_branch: i64,
    /// Temporaries standing in for locals that were not hoisted.
    locals: HashMap<LocalId, TempId>,
    frames: Vec<Frame>,
    /// Resume cases of each enclosing resumable region, innermost last.
    dispatch: Vec<Vec<(ResumeState, LabelId)>>,
    pending_branch: Option<TempId>,
}

impl DisposalScope for Rewriter<'_> {
    fn disposal(&mut self) -> &mut DisposalTracker {
        &mut self.disposal
    }
}

impl Rewriter<'_> {
    fn run(mut self) -> LoweringResult<RewrittenBody> {
        let top_dispose = self.label();
        let failure = self.temp();
        let method = self.method;

        self.dispatch.push(Vec::new());
        let mut body = Vec::new();
        let lowered = self.with_target(Some(top_dispose), |this| {
            this.lower_stmt(&method.body, &mut body)?;
            // Falling off the end is an implicit `yield break`.
            this.lower_exit(method.body.span, &mut body)
        });
        let mut cases = self.dispatch.pop().unwrap_or_default();
        lowered?;
        self.disposal.finish()?;

        let removed = self.allocator.missing_states();
        let removed_label = if removed.is_empty() {
            None
        } else {
            let label = self.label();
            cases.extend(removed.iter().map(|&state| (state, label)));
            Some(label)
        };

        let mut protected = Vec::new();
        if !cases.is_empty() {
            protected.push(LStmt::Dispatch {
                on: self.field(self.layout.state),
                cases,
            });
        }
        protected.push(LStmt::goto_if(
            self.field(self.layout.dispose_mode),
            top_dispose,
        ));
        protected.push(self.set_state(ResumeState::RUNNING));
        protected.extend(body);
        if let Some(label) = removed_label {
            protected.push(LStmt::Label(label));
            protected.push(LStmt::Fail(RuntimeFault::RemovedState));
        }

        let mut on_failure = self.teardown();
        on_failure.push(LStmt::Throw(LExpr::Temp(failure)));

        let mut stmts = vec![
            LStmt::goto_if(self.state_is(BinaryOp::Eq, ResumeState::FINISHED), top_dispose),
            LStmt::Try(Box::new(TryRegion {
                body: Region::new(protected),
                catch: Some(CatchRegion {
                    binding: Some(failure),
                    body: Region::new(on_failure),
                }),
                finally: None,
            })),
            LStmt::Label(top_dispose),
        ];
        stmts.extend(self.teardown());
        stmts.push(LStmt::Return(Outcome::Finished));

        tracing::debug!(
            "rewrite_body: {} lowered to {} labels and {} temporaries",
            method.name,
            self.next_label,
            self.next_temp
        );

        Ok(RewrittenBody {
            advance: MethodBody {
                arity: 0,
                temps: self.next_temp,
                body: Region::new(stmts),
            },
            states: self.allocator.into_debug_map(),
        })
    }

    fn lower_stmt(&mut self, stmt: &Stmt, out: &mut Vec<LStmt>) -> LoweringResult<()> {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                for stmt in stmts {
                    self.lower_stmt(stmt, out)?;
                }
            }
            StmtKind::Let { local, init } => {
                let place = self.lower_place(Place::Local(*local))?;
                let value = match init {
                    Some(init) => self.lower_expr(init)?,
                    None => LExpr::null(),
                };
                out.push(LStmt::assign(place, value));
            }
            StmtKind::Assign { target, value } => {
                let value = self.lower_expr(value)?;
                let place = self.lower_place(*target)?;
                out.push(LStmt::assign(place, value));
            }
            StmtKind::Expr(expr) => {
                let expr = self.lower_expr(expr)?;
                out.push(LStmt::Eval(expr));
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref(), out)?,
            StmtKind::While { cond, body } => self.lower_while(cond, body, out)?,
            StmtKind::Break => self.lower_branch(BranchKind::Break, stmt.span, out)?,
            StmtKind::Continue => self.lower_branch(BranchKind::Continue, stmt.span, out)?,
            StmtKind::Try {
                body,
                catch,
                finally,
            } => self.lower_try(body, catch.as_ref(), finally.as_deref(), out)?,
            StmtKind::Throw(value) => {
                let value = self.lower_expr(value)?;
                out.push(LStmt::Throw(value));
            }
            StmtKind::Return | StmtKind::YieldBreak => self.lower_exit(stmt.span, out)?,
            StmtKind::YieldReturn(value) => self.lower_yield(value, stmt.span, out)?,
            StmtKind::Await { target, operand } => {
                self.lower_await(target.as_ref(), operand, stmt.span, out)?
            }
        }
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> LoweringResult<LExpr> {
        Ok(match expr {
            Expr::Null => LExpr::null(),
            Expr::Int(value) => LExpr::int(*value),
            Expr::Bool(value) => LExpr::bool(*value),
            Expr::Str(value) => LExpr::Const(Constant::Str(value.clone())),
            Expr::Local(local) => match self.lower_place(Place::Local(*local))? {
                LPlace::Temp(temp) => LExpr::Temp(temp),
                LPlace::Field { receiver, field } => LExpr::Field { receiver, field },
            },
            Expr::Param(param) => {
                let field = self
                    .layout
                    .param(*param)
                    .ok_or(LoweringErrorKind::UnknownParameter(*param))?;
                self.field(field)
            }
            Expr::Unary { op, operand } => LExpr::Unary {
                op: *op,
                operand: Box::new(self.lower_expr(operand)?),
            },
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                LExpr::binary(*op, lhs, rhs)
            }
            Expr::Call { callee, args } => LExpr::Call {
                callee: callee.clone(),
                args: self.lower_exprs(args)?,
            },
            Expr::List(items) => LExpr::List(self.lower_exprs(items)?),
        })
    }

    fn lower_exprs(&mut self, exprs: &[Expr]) -> LoweringResult<Vec<LExpr>> {
        exprs.iter().map(|expr| self.lower_expr(expr)).collect()
    }

    fn lower_place(&mut self, place: Place) -> LoweringResult<LPlace> {
        match place {
            Place::Local(local) => Ok(match self.layout.hoisted(local) {
                Some(field) => LPlace::this_field(field),
                None => LPlace::Temp(self.local_temp(local)),
            }),
            Place::Param(param) => self
                .layout
                .param(param)
                .map(LPlace::this_field)
                .ok_or_else(|| LoweringErrorKind::UnknownParameter(param).into()),
        }
    }

    fn local_temp(&mut self, local: LocalId) -> TempId {
        if let Some(temp) = self.locals.get(&local) {
            return *temp;
        }
        let temp = self.temp();
        self.locals.insert(local, temp);
        temp
    }

    fn label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    fn temp(&mut self) -> TempId {
        let temp = TempId(self.next_temp);
        self.next_temp += 1;
        temp
    }

    fn field(&self, field: FieldId) -> LExpr {
        LExpr::this_field(field)
    }

    fn set_state(&self, state: ResumeState) -> LStmt {
        LStmt::assign(LPlace::this_field(self.layout.state), LExpr::state(state))
    }

    fn state_is(&self, op: BinaryOp, state: ResumeState) -> LExpr {
        LExpr::binary(op, self.field(self.layout.state), LExpr::state(state))
    }

    /// Record a resume label in the innermost resumable region.
    fn register_resume(&mut self, state: ResumeState, label: LabelId) {
        if let Some(cases) = self.dispatch.last_mut() {
            cases.push((state, label));
        }
    }

    /// Terminal cleanup shared by completion, disposal and failure.
    fn teardown(&self) -> Vec<LStmt> {
        let mut stmts = vec![self.set_state(ResumeState::FINISHED)];
        for field in self.layout.hoisted_fields() {
            stmts.push(LStmt::assign(LPlace::this_field(field), LExpr::null()));
        }
        stmts.push(LStmt::assign(
            LPlace::this_field(self.layout.current),
            LExpr::null(),
        ));
        if let Some(tokens) = self.layout.combined_tokens {
            stmts.push(LStmt::Eval(LExpr::DisposeSource(Box::new(self.field(tokens)))));
            stmts.push(LStmt::assign(LPlace::this_field(tokens), LExpr::null()));
        }
        stmts
    }
}
