//! The lowered tree: flat labelled regions with explicit jumps.
//!
//! Structured `if`/`while` are gone; only `try` regions nest. A `goto` may
//! leave a `try` region (running its `finally`, if any) but never enter
//! one, which is why resuming inside a protected region goes through a
//! nested [`LStmt::Dispatch`] at the start of that region.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::bound::{BinaryOp, UnaryOp};
use crate::machine::{FieldId, ResumeState};

#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("L{_0}")]
pub struct LabelId(pub u32);

/// A per-invocation temporary. Temporaries start out `null` each time an
/// operation is entered and never survive a suspension.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("t{_0}")]
pub struct TempId(pub u32);

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub stmts: Vec<LStmt>,
}

impl Region {
    pub fn new(stmts: Vec<LStmt>) -> Self {
        Self { stmts }
    }

    /// Position of `label` directly in this region (not in nested regions).
    pub fn label_position(&self, label: LabelId) -> Option<usize> {
        self.stmts
            .iter()
            .position(|stmt| matches!(stmt, LStmt::Label(l) if *l == label))
    }
}

/// What a physical invocation of Advance reports to its caller.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// A new value is available through Current.
    #[display("produced")]
    Produced,
    /// Iteration is over.
    #[display("finished")]
    Finished,
    /// Suspended at an await; advance again once the awaited task settles.
    #[display("pending")]
    Pending,
}

/// Failures raised by synthesized code itself rather than by user code.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeFault {
    #[display("disposal requested while the machine is running or awaiting")]
    DisposeWhileRunning,
    #[display("machine resumed in a state that no longer exists")]
    RemovedState,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LStmt {
    Label(LabelId),
    Goto(LabelId),
    GotoIf {
        cond: LExpr,
        target: LabelId,
    },
    /// Jump to the label paired with the scrutinee's value; fall through
    /// when no case matches.
    Dispatch {
        on: LExpr,
        cases: Vec<(ResumeState, LabelId)>,
    },
    Assign {
        place: LPlace,
        value: LExpr,
    },
    Eval(LExpr),
    Try(Box<TryRegion>),
    Throw(LExpr),
    /// Leave Advance reporting `Outcome`.
    Return(Outcome),
    /// Leave any other operation with a value.
    ReturnValue(LExpr),
    /// Run Advance on the given instance until it stops reporting pending.
    Drive(LExpr),
    Fail(RuntimeFault),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TryRegion {
    pub body: Region,
    pub catch: Option<CatchRegion>,
    pub finally: Option<Region>,
}

/// Catch-all handler; the thrown value is stored into `binding`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatchRegion {
    pub binding: Option<TempId>,
    pub body: Region,
}

/// Whose fields a field access reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Receiver {
    This,
    Temp(TempId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LPlace {
    Temp(TempId),
    Field { receiver: Receiver, field: FieldId },
}

impl LPlace {
    pub fn this_field(field: FieldId) -> Self {
        LPlace::Field {
            receiver: Receiver::This,
            field,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Int(i64),
    Bool(bool),
    Str(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LExpr {
    Const(Constant),
    Temp(TempId),
    Field {
        receiver: Receiver,
        field: FieldId,
    },
    /// Positional argument of the running operation.
    Arg(u32),
    This,
    /// Fresh instance of the machine's own type with every field `null`.
    NewInstance,
    Unary {
        op: UnaryOp,
        operand: Box<LExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<LExpr>,
        rhs: Box<LExpr>,
    },
    Call {
        callee: String,
        args: Vec<LExpr>,
    },
    List(Vec<LExpr>),
    Awaiter(Box<LExpr>),
    IsCompleted(Box<LExpr>),
    AwaitResult(Box<LExpr>),
    /// Link two cancellation tokens through the cancellation-source factory.
    LinkTokens(Box<LExpr>, Box<LExpr>),
    SourceToken(Box<LExpr>),
    DisposeSource(Box<LExpr>),
}

impl LExpr {
    pub fn null() -> Self {
        LExpr::Const(Constant::Null)
    }

    pub fn int(value: i64) -> Self {
        LExpr::Const(Constant::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        LExpr::Const(Constant::Bool(value))
    }

    pub fn state(state: ResumeState) -> Self {
        LExpr::int(i64::from(state.0))
    }

    pub fn this_field(field: FieldId) -> Self {
        LExpr::Field {
            receiver: Receiver::This,
            field,
        }
    }

    pub fn binary(op: BinaryOp, lhs: LExpr, rhs: LExpr) -> Self {
        LExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn not(operand: LExpr) -> Self {
        LExpr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }
}

impl LStmt {
    pub fn assign(place: LPlace, value: LExpr) -> Self {
        LStmt::Assign { place, value }
    }

    pub fn goto_if(cond: LExpr, target: LabelId) -> Self {
        LStmt::GotoIf { cond, target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_position_ignores_nested_regions() {
        let region = Region::new(vec![
            LStmt::Try(Box::new(TryRegion {
                body: Region::new(vec![LStmt::Label(LabelId(1))]),
                catch: None,
                finally: None,
            })),
            LStmt::Label(LabelId(2)),
        ]);
        assert_eq!(region.label_position(LabelId(1)), None);
        assert_eq!(region.label_position(LabelId(2)), Some(1));
    }

    #[test]
    fn test_state_constant() {
        assert_eq!(
            LExpr::state(ResumeState::FINISHED),
            LExpr::Const(Constant::Int(-2))
        );
    }
}
