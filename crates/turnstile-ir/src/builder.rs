//! Convenience constructors for bound trees.
//!
//! The binder normally produces [`MethodDecl`]s; tests and the demo inputs
//! build them by hand through [`MethodBuilder`] and the statement and
//! expression helpers below.

use turnstile_core::Span;

use crate::bound::*;

/// Builds a [`MethodDecl`], allocating parameter and local slots.
#[derive(Debug)]
pub struct MethodBuilder {
    name: String,
    params: Vec<ParamDecl>,
    locals: Vec<LocalDecl>,
}

impl MethodBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn param(&mut self, name: impl Into<String>) -> ParamId {
        self.params.push(ParamDecl {
            name: name.into(),
            cancellation_token: false,
        });
        ParamId(self.params.len() as u32 - 1)
    }

    /// Declare the parameter that receives the enumerator's cancellation token.
    pub fn token_param(&mut self, name: impl Into<String>) -> ParamId {
        self.params.push(ParamDecl {
            name: name.into(),
            cancellation_token: true,
        });
        ParamId(self.params.len() as u32 - 1)
    }

    pub fn local(&mut self, name: impl Into<String>) -> LocalId {
        self.locals.push(LocalDecl {
            name: name.into(),
            span: Span::default(),
        });
        LocalId(self.locals.len() as u32 - 1)
    }

    /// Finish the method. Statements without a span get distinct synthetic
    /// spans in pre-order, so every suspension point is distinguishable in
    /// the debug state table.
    pub fn build(self, body: Vec<Stmt>) -> MethodDecl {
        let mut body = block(body);
        let mut next = 0;
        assign_synthetic_spans(&mut body, &mut next);
        MethodDecl {
            name: self.name,
            params: self.params,
            locals: self.locals,
            body,
            span: Span::new(0, next),
        }
    }
}

fn assign_synthetic_spans(stmt: &mut Stmt, next: &mut usize) {
    if stmt.span.is_empty() {
        stmt.span = Span::new(*next, *next + 1);
    }
    *next += 1;
    match &mut stmt.kind {
        StmtKind::Block(stmts) => {
            for stmt in stmts {
                assign_synthetic_spans(stmt, next);
            }
        }
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            assign_synthetic_spans(then_branch, next);
            if let Some(else_branch) = else_branch {
                assign_synthetic_spans(else_branch, next);
            }
        }
        StmtKind::While { body, .. } => assign_synthetic_spans(body, next),
        StmtKind::Try {
            body,
            catch,
            finally,
        } => {
            assign_synthetic_spans(body, next);
            if let Some(catch) = catch {
                assign_synthetic_spans(&mut catch.body, next);
            }
            if let Some(finally) = finally {
                assign_synthetic_spans(finally, next);
            }
        }
        _ => {}
    }
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Span::default())
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(stmts))
}

pub fn let_(local: LocalId, init: Expr) -> Stmt {
    stmt(StmtKind::Let {
        local,
        init: Some(init),
    })
}

pub fn assign(target: Place, value: Expr) -> Stmt {
    stmt(StmtKind::Assign { target, value })
}

pub fn expr(expr: Expr) -> Stmt {
    stmt(StmtKind::Expr(expr))
}

pub fn if_(cond: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then_branch: Box::new(block(then_branch)),
        else_branch: else_branch.map(|stmts| Box::new(block(stmts))),
    })
}

pub fn while_(cond: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::While {
        cond,
        body: Box::new(block(body)),
    })
}

pub fn break_() -> Stmt {
    stmt(StmtKind::Break)
}

pub fn continue_() -> Stmt {
    stmt(StmtKind::Continue)
}

pub fn try_finally(body: Vec<Stmt>, finally: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Try {
        body: Box::new(block(body)),
        catch: None,
        finally: Some(Box::new(block(finally))),
    })
}

pub fn try_catch(body: Vec<Stmt>, binding: Option<LocalId>, handler: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Try {
        body: Box::new(block(body)),
        catch: Some(CatchClause {
            binding,
            body: Box::new(block(handler)),
        }),
        finally: None,
    })
}

pub fn try_catch_finally(
    body: Vec<Stmt>,
    binding: Option<LocalId>,
    handler: Vec<Stmt>,
    finally: Vec<Stmt>,
) -> Stmt {
    stmt(StmtKind::Try {
        body: Box::new(block(body)),
        catch: Some(CatchClause {
            binding,
            body: Box::new(block(handler)),
        }),
        finally: Some(Box::new(block(finally))),
    })
}

pub fn throw(value: Expr) -> Stmt {
    stmt(StmtKind::Throw(value))
}

pub fn return_() -> Stmt {
    stmt(StmtKind::Return)
}

pub fn yield_return(value: Expr) -> Stmt {
    stmt(StmtKind::YieldReturn(value))
}

pub fn yield_break() -> Stmt {
    stmt(StmtKind::YieldBreak)
}

pub fn await_(target: Option<Place>, operand: Expr) -> Stmt {
    stmt(StmtKind::Await { target, operand })
}

pub fn int(value: i64) -> Expr {
    Expr::Int(value)
}

pub fn str_(value: &str) -> Expr {
    Expr::Str(value.to_string())
}

pub fn local(local: LocalId) -> Expr {
    Expr::Local(local)
}

pub fn param(param: ParamId) -> Expr {
    Expr::Param(param)
}

pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: callee.to_string(),
        args,
    }
}

/// `log(value)`: appends to the host log.
pub fn log(value: Expr) -> Stmt {
    expr(call("log", vec![value]))
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_spans_are_distinct() {
        let mut builder = MethodBuilder::new("numbers");
        let n = builder.param("n");
        let method = builder.build(vec![
            yield_return(int(1)),
            try_finally(vec![yield_return(param(n))], vec![log(str_("done"))]),
        ]);

        let mut spans = Vec::new();
        method.body.walk(&mut |stmt| spans.push(stmt.span));
        let mut deduped = spans.clone();
        deduped.dedup();
        assert_eq!(spans, deduped);
        assert_eq!(method.span, Span::new(0, spans.len()));
    }

    #[test]
    fn test_slots_are_sequential() {
        let mut builder = MethodBuilder::new("m");
        assert_eq!(builder.param("a"), ParamId(0));
        assert_eq!(builder.token_param("ct"), ParamId(1));
        assert_eq!(builder.local("x"), LocalId(0));
        let method = builder.build(vec![]);
        assert!(method.params[1].cancellation_token);
    }
}
