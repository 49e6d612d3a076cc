//! Shape checks and facts about a generator body, gathered before rewriting.
//!
//! The binder should already have rejected everything checked here. A
//! violation is an internal invariant failure and aborts lowering of the
//! method.

use turnstile_core::Span;
use turnstile_ir::{Expr, MethodDecl, Place, Stmt, StmtKind};

use crate::errors::{LoweringError, LoweringErrorKind, LoweringResult};

/// What the rest of lowering needs to know about a validated body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BodyFacts {
    pub yields: usize,
    pub awaits: usize,
}

impl BodyFacts {
    pub fn has_await(&self) -> bool {
        self.awaits > 0
    }
}

pub fn analyze_body(method: &MethodDecl) -> LoweringResult<BodyFacts> {
    let mut validator = Validator {
        method,
        facts: BodyFacts::default(),
    };
    validator.visit(&method.body, Context::default())?;
    tracing::debug!(
        "analyze_body: {} has {} yield and {} await points",
        method.name,
        validator.facts.yields,
        validator.facts.awaits
    );
    Ok(validator.facts)
}

#[derive(Clone, Copy, Debug, Default)]
struct Context {
    in_finally: bool,
    in_catch: bool,
    /// Loops entered since the innermost `finally` boundary.
    loops: usize,
}

struct Validator<'a> {
    method: &'a MethodDecl,
    facts: BodyFacts,
}

impl Validator<'_> {
    fn visit(&mut self, stmt: &Stmt, cx: Context) -> LoweringResult<()> {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                for stmt in stmts {
                    self.visit(stmt, cx)?;
                }
            }
            StmtKind::Let { local, init } => {
                self.check_place(Place::Local(*local))?;
                if let Some(init) = init {
                    self.check_expr(init)?;
                }
            }
            StmtKind::Assign { target, value } => {
                self.check_place(*target)?;
                self.check_expr(value)?;
            }
            StmtKind::Expr(expr) | StmtKind::Throw(expr) => self.check_expr(expr)?,
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond)?;
                self.visit(then_branch, cx)?;
                if let Some(else_branch) = else_branch {
                    self.visit(else_branch, cx)?;
                }
            }
            StmtKind::While { cond, body } => {
                self.check_expr(cond)?;
                self.visit(
                    body,
                    Context {
                        loops: cx.loops + 1,
                        ..cx
                    },
                )?;
            }
            StmtKind::Break => self.check_branch("break", stmt.span, cx)?,
            StmtKind::Continue => self.check_branch("continue", stmt.span, cx)?,
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                self.visit(body, cx)?;
                if let Some(catch) = catch {
                    if let Some(binding) = catch.binding {
                        self.check_place(Place::Local(binding))?;
                    }
                    self.visit(
                        &catch.body,
                        Context {
                            in_catch: true,
                            ..cx
                        },
                    )?;
                }
                if let Some(finally) = finally {
                    self.visit(
                        finally,
                        Context {
                            in_finally: true,
                            in_catch: cx.in_catch,
                            loops: 0,
                        },
                    )?;
                }
            }
            StmtKind::Return => self.check_exit("return", stmt.span, cx)?,
            StmtKind::YieldBreak => self.check_exit("yield break", stmt.span, cx)?,
            StmtKind::YieldReturn(value) => {
                self.check_suspension(stmt.span, cx)?;
                if cx.in_catch {
                    return Err(LoweringError::yield_in_catch(stmt.span));
                }
                self.check_expr(value)?;
                self.facts.yields += 1;
            }
            StmtKind::Await { target, operand } => {
                self.check_suspension(stmt.span, cx)?;
                if let Some(target) = target {
                    self.check_place(*target)?;
                }
                self.check_expr(operand)?;
                self.facts.awaits += 1;
            }
        }
        Ok(())
    }

    fn check_suspension(&self, span: Span, cx: Context) -> LoweringResult<()> {
        if cx.in_finally {
            return Err(LoweringError::suspension_in_finally(span));
        }
        Ok(())
    }

    fn check_exit(&self, what: &'static str, span: Span, cx: Context) -> LoweringResult<()> {
        if cx.in_finally {
            return Err(LoweringErrorKind::ExitFromFinally(what, span).into());
        }
        Ok(())
    }

    fn check_branch(&self, what: &'static str, span: Span, cx: Context) -> LoweringResult<()> {
        match (cx.loops, cx.in_finally) {
            (0, true) => Err(LoweringErrorKind::ExitFromFinally(what, span).into()),
            (0, false) => Err(LoweringErrorKind::BranchOutsideLoop(what, span).into()),
            _ => Ok(()),
        }
    }

    fn check_place(&self, place: Place) -> LoweringResult<()> {
        match place {
            Place::Local(local) if self.method.local(local).is_none() => {
                Err(LoweringErrorKind::UnknownLocal(local).into())
            }
            Place::Param(param) if self.method.param(param).is_none() => {
                Err(LoweringErrorKind::UnknownParameter(param).into())
            }
            _ => Ok(()),
        }
    }

    fn check_expr(&self, expr: &Expr) -> LoweringResult<()> {
        let mut result = Ok(());
        expr.for_each_ref(&mut |place| {
            if result.is_ok() {
                result = self.check_place(place);
            }
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_ir::builder::*;
    use turnstile_ir::{LocalId, ParamId};

    #[test]
    fn test_counts_suspension_points() {
        let mut builder = MethodBuilder::new("m");
        let x = builder.local("x");
        let method = builder.build(vec![
            yield_return(int(1)),
            await_(Some(Place::Local(x)), call("ready", vec![int(2)])),
            while_(
                Expr::Bool(true),
                vec![yield_return(local(x)), break_()],
            ),
            yield_break(),
        ]);
        let facts = analyze_body(&method).unwrap();
        assert_eq!(facts, BodyFacts { yields: 2, awaits: 1 });
        assert!(facts.has_await());
    }

    #[test]
    fn test_yield_in_finally_is_rejected() {
        let method = MethodBuilder::new("m").build(vec![try_finally(
            vec![log(str_("body"))],
            vec![yield_return(int(1))],
        )]);
        let err = analyze_body(&method).unwrap_err();
        assert!(matches!(
            err.kind(),
            LoweringErrorKind::SuspensionInFinally(_)
        ));
    }

    #[test]
    fn test_yield_in_catch_is_rejected() {
        let method = MethodBuilder::new("m").build(vec![try_catch(
            vec![throw(str_("boom"))],
            None,
            vec![yield_return(int(1))],
        )]);
        let err = analyze_body(&method).unwrap_err();
        assert!(matches!(err.kind(), LoweringErrorKind::YieldInCatch(_)));
    }

    #[test]
    fn test_await_in_catch_is_allowed() {
        let method = MethodBuilder::new("m").build(vec![try_catch(
            vec![throw(str_("boom"))],
            None,
            vec![await_(None, call("ready", vec![]))],
        )]);
        assert_eq!(
            analyze_body(&method).unwrap(),
            BodyFacts { yields: 0, awaits: 1 }
        );
    }

    #[test]
    fn test_await_in_catch_inside_finally_is_rejected() {
        let method = MethodBuilder::new("m").build(vec![try_finally(
            vec![],
            vec![try_catch(
                vec![throw(str_("boom"))],
                None,
                vec![await_(None, call("ready", vec![]))],
            )],
        )]);
        let err = analyze_body(&method).unwrap_err();
        assert!(matches!(
            err.kind(),
            LoweringErrorKind::SuspensionInFinally(_)
        ));
    }

    #[test]
    fn test_yield_break_in_catch_is_allowed() {
        let method = MethodBuilder::new("m").build(vec![try_catch(
            vec![yield_return(int(1))],
            None,
            vec![yield_break()],
        )]);
        assert!(analyze_body(&method).is_ok());
    }

    #[test]
    fn test_exits_from_finally_are_rejected() {
        let method = MethodBuilder::new("m").build(vec![while_(
            Expr::Bool(true),
            vec![try_finally(vec![yield_return(int(1))], vec![break_()])],
        )]);
        let err = analyze_body(&method).unwrap_err();
        assert!(matches!(
            err.kind(),
            LoweringErrorKind::ExitFromFinally("break", _)
        ));

        let method = MethodBuilder::new("m")
            .build(vec![try_finally(vec![yield_return(int(1))], vec![return_()])]);
        let err = analyze_body(&method).unwrap_err();
        assert!(matches!(
            err.kind(),
            LoweringErrorKind::ExitFromFinally("return", _)
        ));
    }

    #[test]
    fn test_loop_inside_finally_may_break() {
        let method = MethodBuilder::new("m").build(vec![try_finally(
            vec![yield_return(int(1))],
            vec![while_(Expr::Bool(true), vec![break_()])],
        )]);
        assert!(analyze_body(&method).is_ok());
    }

    #[test]
    fn test_break_outside_loop() {
        let method = MethodBuilder::new("m").build(vec![yield_return(int(1)), continue_()]);
        let err = analyze_body(&method).unwrap_err();
        assert!(matches!(
            err.kind(),
            LoweringErrorKind::BranchOutsideLoop("continue", _)
        ));
    }

    #[test]
    fn test_unknown_references() {
        let method = MethodBuilder::new("m").build(vec![yield_return(local(LocalId(3)))]);
        assert_eq!(
            analyze_body(&method).unwrap_err().kind(),
            &LoweringErrorKind::UnknownLocal(LocalId(3))
        );

        let method = MethodBuilder::new("m").build(vec![yield_return(param(ParamId(0)))]);
        assert_eq!(
            analyze_body(&method).unwrap_err().kind(),
            &LoweringErrorKind::UnknownParameter(ParamId(0))
        );
    }
}
