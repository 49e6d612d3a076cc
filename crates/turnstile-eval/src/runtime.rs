//! Host side of a synthesized state machine: the consumer that calls
//! MoveNext, Current and Dispose, plus the host functions user code calls.

use std::rc::Rc;

use turnstile_ir::{Flavor, Outcome, StateMachineType};

use crate::cancellation::{CancellationSourceFactory, CancellationToken, CountingSourceFactory};
use crate::errors::{EvalError, EvalResult};
use crate::exec::{Exit, Frame};
use crate::value::{Instance, Task, Value};

const DEFAULT_STEP_LIMIT: usize = 1_000_000;

pub struct Runtime {
    pub(crate) log: Vec<String>,
    pub(crate) pending: Vec<Task>,
    pub(crate) factory: Box<dyn CancellationSourceFactory>,
    step_limit: usize,
    steps: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_factory(CountingSourceFactory::new())
    }

    pub fn with_factory(factory: impl CancellationSourceFactory + 'static) -> Self {
        Runtime {
            log: Vec::new(),
            pending: Vec::new(),
            factory: Box::new(factory),
            step_limit: DEFAULT_STEP_LIMIT,
            steps: 0,
        }
    }

    /// Statements one host call may execute before it is aborted.
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Lines written by `log(...)`, oldest first.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn take_log(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log)
    }

    /// Complete every task created by `task(...)` so far.
    /// Returns whether there was anything to complete.
    pub fn run_pending(&mut self) -> bool {
        let mut progressed = false;
        for task in self.pending.drain(..) {
            progressed |= task.settle();
        }
        progressed
    }

    pub(crate) fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(EvalError::StepLimit(self.step_limit));
        }
        Ok(())
    }

    fn begin(&mut self) {
        self.steps = 0;
    }

    /// Call the rewritten generator method: construct the machine without
    /// running any user code.
    #[tracing::instrument(level = "debug", skip_all, fields(machine = %ty.name))]
    pub fn invoke(&mut self, ty: &Rc<StateMachineType>, args: Vec<Value>) -> EvalResult<Instance> {
        self.begin();
        let mut frame = Frame::new(ty.clone(), None, &ty.kickoff, args);
        expect_instance(self.run_body(&ty.kickoff, &mut frame)?)
    }

    /// One physical Advance. Pending outcomes are handed back as they are.
    pub fn advance(&mut self, instance: &Instance) -> EvalResult<Outcome> {
        self.begin();
        let outcome = self.advance_raw(instance)?;
        tracing::trace!(%outcome, state = ?instance.state(), "advance");
        Ok(outcome)
    }

    /// MoveNext as a synchronous consumer sees it: awaits are completed by
    /// running pending work until the machine produces or finishes.
    pub fn move_next(&mut self, instance: &Instance) -> EvalResult<bool> {
        loop {
            match self.advance(instance)? {
                Outcome::Produced => return Ok(true),
                Outcome::Finished => return Ok(false),
                Outcome::Pending => {
                    if !self.run_pending() {
                        return Err(EvalError::Stalled);
                    }
                }
            }
        }
    }

    pub fn current(&mut self, instance: &Instance) -> EvalResult<Value> {
        self.begin();
        let ty = instance.ty();
        let mut frame = Frame::new(ty.clone(), Some(instance.clone()), &ty.current, vec![]);
        match self.run_body(&ty.current, &mut frame)? {
            Exit::Value(value) => Ok(value),
            Exit::Outcome(_) => Err(EvalError::MissingReturn),
        }
    }

    /// Dispose. Runs the pending `finally` clauses of a suspended machine;
    /// a no-op on a finished one.
    #[tracing::instrument(level = "debug", skip_all, fields(state = ?instance.state()))]
    pub fn request_dispose(&mut self, instance: &Instance) -> EvalResult<()> {
        self.begin();
        let ty = instance.ty();
        let body = &ty.request_dispose;
        let mut frame = Frame::new(ty.clone(), Some(instance.clone()), body, vec![]);
        self.run_body(body, &mut frame)?;
        Ok(())
    }

    /// GetEnumerator of a re-iterable machine.
    pub fn get_enumerator(
        &mut self,
        instance: &Instance,
        token: Option<CancellationToken>,
    ) -> EvalResult<Instance> {
        self.begin();
        let ty = instance.ty();
        let body = match (&ty.get_enumerator, ty.flavor) {
            (Some(body), Flavor::Reiterable) => body,
            _ => return Err(EvalError::NotReiterable(ty.name.clone())),
        };
        let token = token.map_or(Value::Null, Value::Token);
        let mut frame = Frame::new(ty.clone(), Some(instance.clone()), body, vec![token]);
        expect_instance(self.run_body(body, &mut frame)?)
    }

    /// Iterate to the end, collecting every produced value. The machine is
    /// disposed afterwards, as a `foreach` would.
    pub fn collect(&mut self, instance: &Instance) -> EvalResult<Vec<Value>> {
        let mut values = Vec::new();
        let result = loop {
            match self.move_next(instance) {
                Ok(true) => match self.current(instance) {
                    Ok(value) => values.push(value),
                    Err(err) => break Err(err),
                },
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        result?;
        self.request_dispose(instance)?;
        Ok(values)
    }
}

fn expect_instance(exit: Exit) -> EvalResult<Instance> {
    match exit {
        Exit::Value(Value::Instance(instance)) => Ok(instance),
        Exit::Value(other) => Err(EvalError::type_error("instance", &other)),
        Exit::Outcome(_) => Err(EvalError::MissingReturn),
    }
}
