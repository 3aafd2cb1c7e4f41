//! Runtime value representation.
//!
//! Immediates (nil, booleans, integers, floats, symbols) carry no identity and
//! always belong to their builtin class. Heap objects carry a class reference
//! that may be swapped for a singleton class, plus a small instance-variable
//! table used by attribute accessors.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::class::ClassRef;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(Arc<str>),
    Str(Arc<str>),
    Object(ObjectRef),
}

/// Coarse classification of a value, used by guards on immediate receivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    True,
    False,
    Int,
    Float,
    Symbol,
    Str,
    Object,
}

impl ValueKind {
    /// Immediates can never have a singleton class, so their kind fixes their class.
    #[inline]
    pub fn is_immediate(self) -> bool {
        !matches!(self, ValueKind::Str | ValueKind::Object)
    }
}

impl Value {
    pub fn sym(name: &str) -> Self {
        Value::Symbol(Arc::from(name))
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(true) => ValueKind::True,
            Value::Bool(false) => ValueKind::False,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Symbol(_) => ValueKind::Symbol,
            Value::Str(_) => ValueKind::Str,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Human-readable rendering used in error messages.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f:?}"),
            Value::Symbol(s) => format!(":{s}"),
            Value::Str(s) => format!("{:?}", s.as_ref()),
            Value::Object(o) => format!("#<{}>", o.class().real_class().name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) | Value::Symbol(s) => f.write_str(s),
            other => f.write_str(&other.inspect()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

pub type ObjectRef = Arc<RObject>;

/// A heap object.
pub struct RObject {
    id: u64,
    class: RwLock<ClassRef>,
    ivars: Mutex<HashMap<Arc<str>, Value, RandomState>>,
}

impl RObject {
    pub(crate) fn new(class: ClassRef) -> Self {
        Self {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class: RwLock::new(class),
            ivars: Mutex::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The actual class: the singleton class once one exists.
    #[inline]
    pub fn class(&self) -> ClassRef {
        self.class.read().clone()
    }

    /// Replaces the class under the write lock unless `upgrade` returns `None`.
    pub(crate) fn upgrade_class<E>(
        &self,
        upgrade: impl FnOnce(&ClassRef) -> Result<Option<ClassRef>, E>,
    ) -> Result<ClassRef, E> {
        let mut class = self.class.write();
        if let Some(next) = upgrade(&class)? {
            *class = next;
        }
        Ok(class.clone())
    }

    pub fn ivar_get(&self, name: &str) -> Value {
        self.ivars.lock().get(name).cloned().unwrap_or(Value::Nil)
    }

    pub fn ivar_set(&self, name: &str, value: Value) {
        self.ivars.lock().insert(Arc::from(name), value);
    }
}

impl fmt::Debug for RObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RObject")
            .field("id", &self.id)
            .field("class", &self.class().name())
            .finish()
    }
}
