//! Runtime values of the reference runtime.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use turnstile_ir::{FieldId, FieldKind, StateMachineType};

use crate::cancellation::{CancellationToken, LinkedTokenSource};

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Task(Task),
    Token(CancellationToken),
    Source(Rc<RefCell<Box<dyn LinkedTokenSource>>>),
    Instance(Instance),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                let items: Vec<_> = items.borrow().iter().map(|item| item.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Task(task) => write!(f, "<task {}>", task.status()),
            Value::Token(token) => write!(f, "{token}"),
            Value::Source(_) => write!(f, "<linked token source>"),
            Value::Instance(instance) => write!(f, "<{}>", instance.ty().name),
        }
    }
}

impl Value {
    pub fn str(value: &str) -> Self {
        Value::Str(value.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Conditions accept booleans, and `null` as false.
    pub fn is_truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Null => Some(false),
            _ => None,
        }
    }

    /// Equality of the lowered tree: structural for scalars, identity for
    /// everything that lives on the heap.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Task(a), Value::Task(b)) => a.ptr_eq(b),
            (Value::Token(a), Value::Token(b)) => a == b,
            (Value::Source(a), Value::Source(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Task(_) => "task",
            Value::Token(_) => "token",
            Value::Source(_) => "token source",
            Value::Instance(_) => "instance",
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TaskStatus {
    /// Settles to the value once the runtime runs pending work.
    Pending(Value),
    Completed(Value),
    Faulted(Value),
}

/// An awaitable. The task doubles as its own awaiter.
#[derive(Debug, Clone)]
pub struct Task(Rc<RefCell<TaskStatus>>);

impl Task {
    pub(crate) fn new(status: TaskStatus) -> Self {
        Task(Rc::new(RefCell::new(status)))
    }

    pub fn is_completed(&self) -> bool {
        !matches!(*self.0.borrow(), TaskStatus::Pending(_))
    }

    pub(crate) fn status(&self) -> &'static str {
        match *self.0.borrow() {
            TaskStatus::Pending(_) => "pending",
            TaskStatus::Completed(_) => "completed",
            TaskStatus::Faulted(_) => "faulted",
        }
    }

    pub(crate) fn outcome(&self) -> TaskStatus {
        self.0.borrow().clone()
    }

    /// Complete a pending task. Returns whether anything changed.
    pub(crate) fn settle(&self) -> bool {
        let mut status = self.0.borrow_mut();
        match &*status {
            TaskStatus::Pending(value) => {
                *status = TaskStatus::Completed(value.clone());
                true
            }
            _ => false,
        }
    }

    fn ptr_eq(&self, other: &Task) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A live state-machine object.
#[derive(Clone)]
pub struct Instance(Rc<RefCell<InstanceData>>);

struct InstanceData {
    ty: Rc<StateMachineType>,
    fields: Vec<Value>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.ty().name).finish()
    }
}

impl Instance {
    pub fn new(ty: Rc<StateMachineType>) -> Self {
        let fields = vec![Value::Null; ty.fields.len()];
        Instance(Rc::new(RefCell::new(InstanceData { ty, fields })))
    }

    pub fn ty(&self) -> Rc<StateMachineType> {
        self.0.borrow().ty.clone()
    }

    pub fn get(&self, field: FieldId) -> Option<Value> {
        self.0.borrow().fields.get(field.0 as usize).cloned()
    }

    pub fn set(&self, field: FieldId, value: Value) -> bool {
        match self.0.borrow_mut().fields.get_mut(field.0 as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn field_by_name(&self, name: &str) -> Option<Value> {
        let id = self.ty().field_by_name(name)?.id;
        self.get(id)
    }

    /// Current resume state, when the state field holds one.
    pub fn state(&self) -> Option<i64> {
        let id = self.ty().field_of_kind(FieldKind::State)?.id;
        match self.get(id)? {
            Value::Int(state) => Some(state),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
