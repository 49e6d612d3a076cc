//! Bound control-flow tree handed to lowering by the binder.
//!
//! Locals and parameters are already resolved to indices into the
//! method's tables, so lowering never performs name lookup.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use turnstile_core::Span;

/// Index into [`MethodDecl::locals`].
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("local#{_0}")]
pub struct LocalId(pub u32);

/// Index into [`MethodDecl::params`].
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("param#{_0}")]
pub struct ParamId(pub u32);

/// A generator method as produced by the binder.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub locals: Vec<LocalDecl>,
    pub body: Stmt,
    #[serde(default)]
    pub span: Span,
}

impl MethodDecl {
    pub fn param(&self, id: ParamId) -> Option<&ParamDecl> {
        self.params.get(id.0 as usize)
    }

    pub fn local(&self, id: LocalId) -> Option<&LocalDecl> {
        self.locals.get(id.0 as usize)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    /// Marks the parameter that receives the enumerator's cancellation
    /// token when linked cancellation is enabled.
    #[serde(default)]
    pub cancellation_token: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalDecl {
    pub name: String,
    #[serde(default)]
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StmtKind {
    /// Sequence of statements; `Let`s inside are scoped to the block.
    Block(Vec<Stmt>),
    Let {
        local: LocalId,
        init: Option<Expr>,
    },
    Assign {
        target: Place,
        value: Expr,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Try {
        body: Box<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Box<Stmt>>,
    },
    Throw(Expr),
    /// Plain `return` inside a generator: ends the iteration.
    Return,
    YieldReturn(Expr),
    YieldBreak,
    Await {
        target: Option<Place>,
        operand: Expr,
    },
}

/// A catch-all clause, optionally binding the thrown value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatchClause {
    pub binding: Option<LocalId>,
    pub body: Box<Stmt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Place {
    Local(LocalId),
    Param(ParamId),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Null,
    Int(i64),
    Bool(bool),
    Str(String),
    Local(LocalId),
    Param(ParamId),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Call of a host function.
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    List(Vec<Expr>),
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    #[display("!")]
    Not,
    #[display("-")]
    Neg,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("==")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Visit this statement and every statement nested in it, pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Stmt)) {
        f(self);
        match &self.kind {
            StmtKind::Block(stmts) => {
                for stmt in stmts {
                    stmt.walk(f);
                }
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.walk(f);
                if let Some(else_branch) = else_branch {
                    else_branch.walk(f);
                }
            }
            StmtKind::While { body, .. } => body.walk(f),
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                body.walk(f);
                if let Some(catch) = catch {
                    catch.body.walk(f);
                }
                if let Some(finally) = finally {
                    finally.walk(f);
                }
            }
            StmtKind::Let { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Expr(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Throw(_)
            | StmtKind::Return
            | StmtKind::YieldReturn(_)
            | StmtKind::YieldBreak
            | StmtKind::Await { .. } => {}
        }
    }

    /// Whether this statement (or anything nested in it) can suspend.
    ///
    /// `yield break` and `return` end the iteration without suspending.
    pub fn contains_suspension(&self) -> bool {
        let mut found = false;
        self.walk(&mut |stmt| {
            found |= matches!(
                stmt.kind,
                StmtKind::YieldReturn(_) | StmtKind::Await { .. }
            );
        });
        found
    }
}

impl Expr {
    /// Visit every parameter and local referenced by this expression.
    pub fn for_each_ref(&self, f: &mut impl FnMut(Place)) {
        match self {
            Expr::Null | Expr::Int(_) | Expr::Bool(_) | Expr::Str(_) => {}
            Expr::Local(local) => f(Place::Local(*local)),
            Expr::Param(param) => f(Place::Param(*param)),
            Expr::Unary { operand, .. } => operand.for_each_ref(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_ref(f);
                rhs.for_each_ref(f);
            }
            Expr::Call { args, .. } | Expr::List(args) => {
                for arg in args {
                    arg.for_each_ref(f);
                }
            }
        }
    }
}
