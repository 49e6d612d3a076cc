//! Decide which locals must outlive a suspension and become fields.
//!
//! A local is hoisted when some statement after its declaration, in the
//! block that declares it, contains a suspension point. Locals the binder
//! never declared through a `let` are scoped to the whole body. A catch
//! binding is hoisted only when its catch body awaits.

use std::collections::BTreeSet;

use turnstile_ir::{LocalId, MethodDecl, Stmt, StmtKind};

pub fn hoisted_locals(method: &MethodDecl) -> BTreeSet<LocalId> {
    let mut scan = Scan::default();
    scan.stmt(&method.body);

    if method.body.contains_suspension() {
        for index in 0..method.locals.len() as u32 {
            let local = LocalId(index);
            if !scan.declared.contains(&local) && !scan.catch_bound.contains(&local) {
                scan.hoisted.insert(local);
            }
        }
    }

    tracing::debug!(
        "hoisted_locals: {} of {} locals in {} become fields",
        scan.hoisted.len(),
        method.locals.len(),
        method.name
    );
    scan.hoisted
}

#[derive(Default)]
struct Scan {
    hoisted: BTreeSet<LocalId>,
    declared: BTreeSet<LocalId>,
    catch_bound: BTreeSet<LocalId>,
}

impl Scan {
    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                for (index, stmt) in stmts.iter().enumerate() {
                    if let StmtKind::Let { local, .. } = stmt.kind {
                        self.declared.insert(local);
                        if stmts[index + 1..].iter().any(Stmt::contains_suspension) {
                            self.hoisted.insert(local);
                        }
                    }
                    self.stmt(stmt);
                }
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.stmt(else_branch);
                }
            }
            StmtKind::While { body, .. } => self.stmt(body),
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                self.stmt(body);
                if let Some(catch) = catch {
                    if let Some(binding) = catch.binding {
                        self.catch_bound.insert(binding);
                        if catch.body.contains_suspension() {
                            self.hoisted.insert(binding);
                        }
                    }
                    self.stmt(&catch.body);
                }
                if let Some(finally) = finally {
                    self.stmt(finally);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_ir::builder::*;
    use turnstile_ir::{BinaryOp, Expr, Place};

    #[test]
    fn test_local_live_across_yield_is_hoisted() {
        let mut builder = MethodBuilder::new("m");
        let i = builder.local("i");
        let method = builder.build(vec![
            let_(i, int(0)),
            while_(
                binary(BinaryOp::Lt, local(i), int(3)),
                vec![
                    yield_return(local(i)),
                    assign(Place::Local(i), binary(BinaryOp::Add, local(i), int(1))),
                ],
            ),
        ]);
        assert_eq!(hoisted_locals(&method), BTreeSet::from([i]));
    }

    #[test]
    fn test_local_declared_after_last_suspension_stays() {
        let mut builder = MethodBuilder::new("m");
        let before = builder.local("before");
        let after = builder.local("after");
        let method = builder.build(vec![
            let_(before, int(1)),
            yield_return(local(before)),
            let_(after, int(2)),
            log(local(after)),
        ]);
        assert_eq!(hoisted_locals(&method), BTreeSet::from([before]));
    }

    #[test]
    fn test_loop_body_local_scoped_to_iteration() {
        let mut builder = MethodBuilder::new("m");
        let x = builder.local("x");
        let method = builder.build(vec![while_(
            Expr::Bool(true),
            vec![yield_return(int(1)), let_(x, int(2)), log(local(x))],
        )]);
        assert!(hoisted_locals(&method).is_empty());
    }

    #[test]
    fn test_nested_suspension_counts() {
        let mut builder = MethodBuilder::new("m");
        let items = builder.local("items");
        let method = builder.build(vec![
            let_(items, Expr::List(vec![])),
            try_finally(
                vec![if_(Expr::Bool(true), vec![yield_return(int(1))], None)],
                vec![log(local(items))],
            ),
        ]);
        assert_eq!(hoisted_locals(&method), BTreeSet::from([items]));
    }

    #[test]
    fn test_catch_binding_and_undeclared_locals() {
        let mut builder = MethodBuilder::new("m");
        let error = builder.local("error");
        let result = builder.local("result");
        let method = builder.build(vec![
            await_(Some(Place::Local(result)), call("ready", vec![int(1)])),
            try_catch(vec![throw(local(result))], Some(error), vec![log(local(error))]),
        ]);
        assert_eq!(hoisted_locals(&method), BTreeSet::from([result]));
    }

    #[test]
    fn test_binding_of_awaiting_catch_is_hoisted() {
        let mut builder = MethodBuilder::new("m");
        let error = builder.local("error");
        let method = builder.build(vec![try_catch(
            vec![throw(str_("boom"))],
            Some(error),
            vec![await_(None, call("task", vec![])), log(local(error))],
        )]);
        assert_eq!(hoisted_locals(&method), BTreeSet::from([error]));
    }

    #[test]
    fn test_nothing_hoisted_without_suspension() {
        let mut builder = MethodBuilder::new("m");
        let x = builder.local("x");
        let method = builder.build(vec![assign(Place::Local(x), int(1)), yield_break()]);
        assert!(hoisted_locals(&method).is_empty());
    }
}
