//! Intermediate representations for generator lowering.
//!
//! - [`bound`]: the control-flow tree the binder hands to lowering.
//! - [`lowered`]: flat labelled regions produced by the body rewriter.
//! - [`machine`]: the synthesized state-machine type.

pub mod bound;
pub mod builder;
pub mod lowered;
pub mod machine;
pub mod printer;

pub use bound::{
    BinaryOp, CatchClause, Expr, LocalDecl, LocalId, MethodDecl, ParamDecl, ParamId, Place, Stmt,
    StmtKind, UnaryOp,
};
pub use lowered::{
    CatchRegion, Constant, LExpr, LPlace, LStmt, LabelId, Outcome, Receiver, Region,
    RuntimeFault, TempId, TryRegion,
};
pub use machine::{
    FieldDecl, FieldId, FieldKind, Flavor, MethodBody, ResumeState, StateDebugMap, StateEntry,
    StateMachineType, SuspensionKind,
};
pub use printer::Printer;
