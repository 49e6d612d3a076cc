//! Interpreter for lowered regions.
//!
//! Each region runs with its own program counter. A `goto` whose label is
//! not in the running region travels outwards as [`Flow::Goto`] until the
//! region holding the label picks it up, running any `finally` it passes.

use std::cell::RefCell;
use std::rc::Rc;

use turnstile_ir::{
    BinaryOp, Constant, LExpr, LPlace, LStmt, LabelId, MethodBody, Outcome, Receiver, Region,
    RuntimeFault, StateMachineType, TryRegion, UnaryOp,
};

use crate::errors::EvalError;
use crate::runtime::Runtime;
use crate::value::{Instance, Task, TaskStatus, Value};

/// How control leaves a statement or region.
pub(crate) enum Flow {
    Normal,
    Goto(LabelId),
    Exit(Exit),
}

pub(crate) enum Exit {
    Outcome(Outcome),
    Value(Value),
}

/// Abrupt completion that `catch` regions see (`Thrown`) or do not see.
pub(crate) enum Unwind {
    Thrown(Value),
    Fatal(EvalError),
}

impl From<EvalError> for Unwind {
    fn from(error: EvalError) -> Self {
        Unwind::Fatal(error)
    }
}

impl From<Unwind> for EvalError {
    fn from(unwind: Unwind) -> Self {
        match unwind {
            Unwind::Thrown(value) => EvalError::Thrown(value),
            Unwind::Fatal(error) => error,
        }
    }
}

type ExecResult<T> = Result<T, Unwind>;

/// Activation record of one synthesized operation.
pub(crate) struct Frame {
    ty: Rc<StateMachineType>,
    this: Option<Instance>,
    args: Vec<Value>,
    temps: Vec<Value>,
}

impl Frame {
    pub(crate) fn new(
        ty: Rc<StateMachineType>,
        this: Option<Instance>,
        body: &MethodBody,
        args: Vec<Value>,
    ) -> Self {
        Frame {
            ty,
            this,
            args,
            temps: vec![Value::Null; body.temps as usize],
        }
    }

    fn receiver(&self, receiver: Receiver) -> ExecResult<Instance> {
        let value = match receiver {
            Receiver::This => return self.this.clone().ok_or(EvalError::NoReceiver.into()),
            Receiver::Temp(temp) => self
                .temps
                .get(temp.0 as usize)
                .ok_or(EvalError::UnknownTemp(temp))?,
        };
        match value {
            Value::Instance(instance) => Ok(instance.clone()),
            other => Err(EvalError::type_error("instance", other).into()),
        }
    }
}

impl Runtime {
    /// Run one operation body to its exit.
    pub(crate) fn run_body(&mut self, body: &MethodBody, frame: &mut Frame) -> ExecResult<Exit> {
        match self.exec_region(&body.body, frame)? {
            Flow::Exit(exit) => Ok(exit),
            Flow::Goto(label) => Err(EvalError::UnknownLabel(label).into()),
            Flow::Normal => Err(EvalError::MissingReturn.into()),
        }
    }

    fn exec_region(&mut self, region: &Region, frame: &mut Frame) -> ExecResult<Flow> {
        let mut pc = 0;
        while let Some(stmt) = region.stmts.get(pc) {
            self.tick()?;
            match self.exec_stmt(stmt, frame)? {
                Flow::Normal => pc += 1,
                Flow::Goto(label) => match region.label_position(label) {
                    Some(position) => pc = position + 1,
                    None => return Ok(Flow::Goto(label)),
                },
                exit @ Flow::Exit(_) => return Ok(exit),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &LStmt, frame: &mut Frame) -> ExecResult<Flow> {
        match stmt {
            LStmt::Label(_) => Ok(Flow::Normal),
            LStmt::Goto(label) => Ok(Flow::Goto(*label)),
            LStmt::GotoIf { cond, target } => {
                if self.condition(cond, frame)? {
                    Ok(Flow::Goto(*target))
                } else {
                    Ok(Flow::Normal)
                }
            }
            LStmt::Dispatch { on, cases } => {
                let state = match self.eval(on, frame)? {
                    Value::Int(state) => state,
                    other => return Err(EvalError::type_error("int", &other).into()),
                };
                Ok(cases
                    .iter()
                    .find(|(case, _)| i64::from(case.0) == state)
                    .map_or(Flow::Normal, |(_, label)| Flow::Goto(*label)))
            }
            LStmt::Assign { place, value } => {
                let value = self.eval(value, frame)?;
                self.store(place, value, frame)?;
                Ok(Flow::Normal)
            }
            LStmt::Eval(expr) => {
                self.eval(expr, frame)?;
                Ok(Flow::Normal)
            }
            LStmt::Try(region) => self.exec_try(region, frame),
            LStmt::Throw(expr) => match self.eval(expr, frame)? {
                Value::Null => Err(EvalError::ThrowNull.into()),
                value => Err(Unwind::Thrown(value)),
            },
            LStmt::Return(outcome) => Ok(Flow::Exit(Exit::Outcome(*outcome))),
            LStmt::ReturnValue(expr) => Ok(Flow::Exit(Exit::Value(self.eval(expr, frame)?))),
            LStmt::Drive(expr) => {
                let instance = match self.eval(expr, frame)? {
                    Value::Instance(instance) => instance,
                    other => return Err(EvalError::type_error("instance", &other).into()),
                };
                self.drive(&instance)?;
                Ok(Flow::Normal)
            }
            LStmt::Fail(fault) => Err(match fault {
                RuntimeFault::DisposeWhileRunning => EvalError::DisposeWhileRunning,
                RuntimeFault::RemovedState => EvalError::RemovedState,
            }
            .into()),
        }
    }

    fn exec_try(&mut self, region: &TryRegion, frame: &mut Frame) -> ExecResult<Flow> {
        let result = match (self.exec_region(&region.body, frame), &region.catch) {
            (Err(Unwind::Thrown(value)), Some(catch)) => {
                if let Some(binding) = catch.binding {
                    self.store(&LPlace::Temp(binding), value, frame)?;
                }
                self.exec_region(&catch.body, frame)
            }
            (result, _) => result,
        };
        if let Err(Unwind::Fatal(_)) = result {
            return result;
        }
        match &region.finally {
            // Abrupt completion of the finally replaces whatever came before.
            Some(finally) => match self.exec_region(finally, frame)? {
                Flow::Normal => result,
                flow => Ok(flow),
            },
            None => result,
        }
    }

    /// Advance `instance` until it stops reporting pending.
    pub(crate) fn drive(&mut self, instance: &Instance) -> ExecResult<Outcome> {
        loop {
            match self.advance_raw(instance)? {
                Outcome::Pending => {
                    if !self.run_pending() {
                        return Err(EvalError::Stalled.into());
                    }
                }
                outcome => return Ok(outcome),
            }
        }
    }

    pub(crate) fn advance_raw(&mut self, instance: &Instance) -> ExecResult<Outcome> {
        let ty = instance.ty();
        let mut frame = Frame::new(ty.clone(), Some(instance.clone()), &ty.advance, vec![]);
        match self.run_body(&ty.advance, &mut frame)? {
            Exit::Outcome(outcome) => Ok(outcome),
            Exit::Value(value) => Err(EvalError::type_error("outcome", &value).into()),
        }
    }

    fn condition(&mut self, cond: &LExpr, frame: &mut Frame) -> ExecResult<bool> {
        let value = self.eval(cond, frame)?;
        value
            .is_truthy()
            .ok_or_else(|| EvalError::type_error("bool", &value).into())
    }

    fn store(&mut self, place: &LPlace, value: Value, frame: &mut Frame) -> ExecResult<()> {
        match place {
            LPlace::Temp(temp) => {
                let slot = frame
                    .temps
                    .get_mut(temp.0 as usize)
                    .ok_or(EvalError::UnknownTemp(*temp))?;
                *slot = value;
            }
            LPlace::Field { receiver, field } => {
                if !frame.receiver(*receiver)?.set(*field, value) {
                    return Err(EvalError::UnknownField(*field).into());
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &LExpr, frame: &mut Frame) -> ExecResult<Value> {
        Ok(match expr {
            LExpr::Const(constant) => match constant {
                Constant::Null => Value::Null,
                Constant::Int(value) => Value::Int(*value),
                Constant::Bool(value) => Value::Bool(*value),
                Constant::Str(value) => Value::str(value),
            },
            LExpr::Temp(temp) => frame
                .temps
                .get(temp.0 as usize)
                .cloned()
                .ok_or(EvalError::UnknownTemp(*temp))?,
            LExpr::Field { receiver, field } => frame
                .receiver(*receiver)?
                .get(*field)
                .ok_or(EvalError::UnknownField(*field))?,
            LExpr::Arg(index) => frame
                .args
                .get(*index as usize)
                .cloned()
                .ok_or(EvalError::MissingArgument(*index))?,
            LExpr::This => Value::Instance(frame.receiver(Receiver::This)?),
            LExpr::NewInstance => Value::Instance(Instance::new(frame.ty.clone())),
            LExpr::Unary { op, operand } => {
                let operand = self.eval(operand, frame)?;
                match (op, &operand) {
                    (UnaryOp::Neg, Value::Int(n)) => Value::Int(n.wrapping_neg()),
                    (UnaryOp::Not, value) => match value.is_truthy() {
                        Some(b) => Value::Bool(!b),
                        None => return Err(EvalError::type_error("bool", value).into()),
                    },
                    (UnaryOp::Neg, other) => {
                        return Err(EvalError::type_error("int", other).into());
                    }
                }
            }
            LExpr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, frame)?,
            LExpr::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, frame))
                    .collect::<ExecResult<Vec<_>>>()?;
                self.call_host(callee, args)?
            }
            LExpr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item, frame))
                    .collect::<ExecResult<Vec<_>>>()?;
                Value::list(items)
            }
            LExpr::Awaiter(operand) => match self.eval(operand, frame)? {
                task @ Value::Task(_) => task,
                other => return Err(EvalError::type_error("task", &other).into()),
            },
            LExpr::IsCompleted(awaiter) => Value::Bool(self.task(awaiter, frame)?.is_completed()),
            LExpr::AwaitResult(awaiter) => match self.task(awaiter, frame)?.outcome() {
                TaskStatus::Completed(value) => value,
                TaskStatus::Faulted(value) => return Err(Unwind::Thrown(value)),
                TaskStatus::Pending(_) => return Err(EvalError::NotCompleted.into()),
            },
            LExpr::LinkTokens(first, second) => {
                let first = self.eval(first, frame)?;
                let second = self.eval(second, frame)?;
                match (first, second) {
                    (Value::Token(first), Value::Token(second)) => {
                        let source = self.factory.link(first, second);
                        Value::Source(Rc::new(RefCell::new(source)))
                    }
                    (Value::Token(_), other) | (other, _) => {
                        return Err(EvalError::type_error("token", &other).into());
                    }
                }
            }
            LExpr::SourceToken(source) => match self.eval(source, frame)? {
                Value::Source(source) => Value::Token(source.borrow().token()),
                other => return Err(EvalError::type_error("token source", &other).into()),
            },
            LExpr::DisposeSource(source) => match self.eval(source, frame)? {
                Value::Null => Value::Null,
                Value::Source(source) => {
                    source.borrow_mut().dispose();
                    Value::Null
                }
                other => return Err(EvalError::type_error("token source", &other).into()),
            },
        })
    }

    fn task(&mut self, expr: &LExpr, frame: &mut Frame) -> ExecResult<Task> {
        match self.eval(expr, frame)? {
            Value::Task(task) => Ok(task),
            other => Err(EvalError::type_error("task", &other).into()),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &LExpr,
        rhs: &LExpr,
        frame: &mut Frame,
    ) -> ExecResult<Value> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let left = self.condition(lhs, frame)?;
            return Ok(Value::Bool(match op {
                BinaryOp::And => left && self.condition(rhs, frame)?,
                _ => left || self.condition(rhs, frame)?,
            }));
        }

        let left = self.eval(lhs, frame)?;
        let right = self.eval(rhs, frame)?;
        Ok(match (op, &left, &right) {
            (BinaryOp::Eq, _, _) => Value::Bool(left.equals(&right)),
            (BinaryOp::Ne, _, _) => Value::Bool(!left.equals(&right)),
            (BinaryOp::Add, Value::Str(a), b) => Value::str(&format!("{a}{b}")),
            (BinaryOp::Add, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
            (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
            (BinaryOp::Mul, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(*b)),
            (BinaryOp::Lt, Value::Int(a), Value::Int(b)) => Value::Bool(a < b),
            (BinaryOp::Le, Value::Int(a), Value::Int(b)) => Value::Bool(a <= b),
            (BinaryOp::Gt, Value::Int(a), Value::Int(b)) => Value::Bool(a > b),
            (BinaryOp::Ge, Value::Int(a), Value::Int(b)) => Value::Bool(a >= b),
            (_, Value::Int(_), other) | (_, other, _) => {
                return Err(EvalError::type_error("int", other).into());
            }
        })
    }

    fn call_host(&mut self, name: &str, args: Vec<Value>) -> ExecResult<Value> {
        let arity = |expected: usize| -> ExecResult<()> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(EvalError::Arity(name.to_string(), expected).into())
            }
        };
        let first = || args.first().cloned().unwrap_or_default();

        match name {
            "log" => {
                arity(1)?;
                let line = first().to_string();
                tracing::debug!(%line, "log");
                self.log.push(line);
                Ok(Value::Null)
            }
            // `task(v)` settles once the host runs pending work.
            "task" | "ready" | "faulted" => {
                if args.len() > 1 {
                    return Err(EvalError::Arity(name.to_string(), 1).into());
                }
                let value = first();
                let task = match name {
                    "task" => {
                        let task = Task::new(TaskStatus::Pending(value));
                        self.pending.push(task.clone());
                        task
                    }
                    "ready" => Task::new(TaskStatus::Completed(value)),
                    _ => Task::new(TaskStatus::Faulted(value)),
                };
                Ok(Value::Task(task))
            }
            "push" => {
                arity(2)?;
                match &args[0] {
                    Value::List(items) => {
                        items.borrow_mut().push(args[1].clone());
                        Ok(Value::Null)
                    }
                    other => Err(EvalError::type_error("list", other).into()),
                }
            }
            "len" => {
                arity(1)?;
                match &args[0] {
                    Value::List(items) => Ok(Value::Int(items.borrow().len() as i64)),
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    other => Err(EvalError::type_error("list", other).into()),
                }
            }
            "str" => {
                arity(1)?;
                Ok(Value::str(&first().to_string()))
            }
            "fail" => {
                arity(1)?;
                match first() {
                    Value::Null => Err(EvalError::ThrowNull.into()),
                    value => Err(Unwind::Thrown(value)),
                }
            }
            _ => Err(EvalError::UnknownFunction(name.to_string()).into()),
        }
    }
}
