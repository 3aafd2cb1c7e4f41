//! Method implementations.
//!
//! Every method can be invoked through `DynamicMethod::call`, the generic entry
//! point that checks arity, pushes a frame when the body needs one and
//! re-dispatches by argument count. Methods with a fixed low-level entry point
//! additionally expose a `NativeShape` so a call site can bind to that entry
//! directly.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::block::Block;
use crate::context::ThreadContext;
use crate::unwind::{CallResult, ErrorClass, RaiseError};
use crate::value::Value;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

/// Accepted argument counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArityRange {
    pub required: usize,
    pub optional: usize,
    pub rest: bool,
}

impl ArityRange {
    pub const fn fixed(n: usize) -> Self {
        Self {
            required: n,
            optional: 0,
            rest: false,
        }
    }

    pub const fn optional(required: usize, optional: usize) -> Self {
        Self {
            required,
            optional,
            rest: false,
        }
    }

    pub const fn rest(required: usize) -> Self {
        Self {
            required,
            optional: 0,
            rest: true,
        }
    }

    #[inline]
    pub fn accepts(&self, given: usize) -> bool {
        given >= self.required && (self.rest || given <= self.required + self.optional)
    }

    pub fn check(&self, given: usize) -> Result<(), RaiseError> {
        if self.accepts(given) {
            Ok(())
        } else {
            Err(RaiseError::argument_count(given, self))
        }
    }
}

impl fmt::Display for ArityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rest {
            write!(f, "{}+", self.required)
        } else if self.optional > 0 {
            write!(f, "{}..{}", self.required, self.required + self.optional)
        } else {
            write!(f, "{}", self.required)
        }
    }
}

pub type Fn0 = Arc<dyn Fn(&ThreadContext, &Value, Option<&Block>) -> CallResult + Send + Sync>;
pub type Fn1 =
    Arc<dyn Fn(&ThreadContext, &Value, &Value, Option<&Block>) -> CallResult + Send + Sync>;
pub type Fn2 = Arc<
    dyn Fn(&ThreadContext, &Value, &Value, &Value, Option<&Block>) -> CallResult + Send + Sync,
>;
pub type Fn3 = Arc<
    dyn Fn(&ThreadContext, &Value, &Value, &Value, &Value, Option<&Block>) -> CallResult
        + Send
        + Sync,
>;
pub type FnN =
    Arc<dyn Fn(&ThreadContext, &Value, &[Value], Option<&Block>) -> CallResult + Send + Sync>;

/// A low-level entry point with a statically known argument count.
#[derive(Clone)]
pub enum NativeEntry {
    Fixed0(Fn0),
    Fixed1(Fn1),
    Fixed2(Fn2),
    Fixed3(Fn3),
    Varargs(FnN),
}

impl NativeEntry {
    /// `None` for varargs entries.
    pub fn arg_count(&self) -> Option<usize> {
        match self {
            NativeEntry::Fixed0(_) => Some(0),
            NativeEntry::Fixed1(_) => Some(1),
            NativeEntry::Fixed2(_) => Some(2),
            NativeEntry::Fixed3(_) => Some(3),
            NativeEntry::Varargs(_) => None,
        }
    }

    /// Calls through the entry with a slice. The argument count must already
    /// have been checked against the method's arity.
    pub fn call(
        &self,
        ctx: &ThreadContext,
        recv: &Value,
        args: &[Value],
        block: Option<&Block>,
    ) -> CallResult {
        match self {
            NativeEntry::Fixed0(f) => f(ctx, recv, block),
            NativeEntry::Fixed1(f) => f(ctx, recv, &args[0], block),
            NativeEntry::Fixed2(f) => f(ctx, recv, &args[0], &args[1], block),
            NativeEntry::Fixed3(f) => f(ctx, recv, &args[0], &args[1], &args[2], block),
            NativeEntry::Varargs(f) => f(ctx, recv, args, block),
        }
    }
}

/// What a call site needs to know to decide on direct binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeShape {
    /// Fixed argument count, `None` for varargs.
    pub args: Option<usize>,
    /// The body runs in its own frame and cannot be entered directly.
    pub needs_frame: bool,
}

#[derive(Clone)]
pub enum MethodBody {
    /// Frameless core method.
    Native(NativeEntry),
    /// Method with a native entry that still needs a frame set up around it.
    Scoped(NativeEntry),
    /// Method only reachable through the generic entry point.
    Generic(FnN),
    AttrReader(Arc<str>),
    AttrWriter(Arc<str>),
    Alias {
        original: Arc<str>,
        target: Arc<DynamicMethod>,
    },
    /// Removal marker left by `undef_method`; resolves as missing.
    Undefined,
}

#[derive(Clone)]
pub struct DynamicMethod {
    serial: u64,
    name: Arc<str>,
    visibility: Visibility,
    arity: ArityRange,
    body: MethodBody,
}

impl DynamicMethod {
    pub fn new(name: &str, arity: ArityRange, body: MethodBody) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
            visibility: Visibility::Public,
            arity,
            body,
        }
    }

    pub fn native0<F>(name: &str, f: F) -> Self
    where
        F: Fn(&ThreadContext, &Value, Option<&Block>) -> CallResult + Send + Sync + 'static,
    {
        Self::new(
            name,
            ArityRange::fixed(0),
            MethodBody::Native(NativeEntry::Fixed0(Arc::new(f))),
        )
    }

    pub fn native1<F>(name: &str, f: F) -> Self
    where
        F: Fn(&ThreadContext, &Value, &Value, Option<&Block>) -> CallResult
            + Send
            + Sync
            + 'static,
    {
        Self::new(
            name,
            ArityRange::fixed(1),
            MethodBody::Native(NativeEntry::Fixed1(Arc::new(f))),
        )
    }

    pub fn native2<F>(name: &str, f: F) -> Self
    where
        F: Fn(&ThreadContext, &Value, &Value, &Value, Option<&Block>) -> CallResult
            + Send
            + Sync
            + 'static,
    {
        Self::new(
            name,
            ArityRange::fixed(2),
            MethodBody::Native(NativeEntry::Fixed2(Arc::new(f))),
        )
    }

    pub fn native3<F>(name: &str, f: F) -> Self
    where
        F: Fn(&ThreadContext, &Value, &Value, &Value, &Value, Option<&Block>) -> CallResult
            + Send
            + Sync
            + 'static,
    {
        Self::new(
            name,
            ArityRange::fixed(3),
            MethodBody::Native(NativeEntry::Fixed3(Arc::new(f))),
        )
    }

    pub fn native_varargs<F>(name: &str, arity: ArityRange, f: F) -> Self
    where
        F: Fn(&ThreadContext, &Value, &[Value], Option<&Block>) -> CallResult
            + Send
            + Sync
            + 'static,
    {
        Self::new(
            name,
            arity,
            MethodBody::Native(NativeEntry::Varargs(Arc::new(f))),
        )
    }

    pub fn generic<F>(name: &str, arity: ArityRange, f: F) -> Self
    where
        F: Fn(&ThreadContext, &Value, &[Value], Option<&Block>) -> CallResult
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, arity, MethodBody::Generic(Arc::new(f)))
    }

    /// `attr_reader :name` reads `@name`.
    pub fn attr_reader(name: &str) -> Self {
        let ivar = format!("@{name}");
        Self::new(
            name,
            ArityRange::fixed(0),
            MethodBody::AttrReader(Arc::from(ivar.as_str())),
        )
    }

    /// `attr_writer :name` defines `name=` writing `@name`.
    pub fn attr_writer(name: &str) -> Self {
        let ivar = format!("@{name}");
        Self::new(
            &format!("{name}="),
            ArityRange::fixed(1),
            MethodBody::AttrWriter(Arc::from(ivar.as_str())),
        )
    }

    pub fn alias(new_name: &str, original: &str, target: Arc<DynamicMethod>) -> Self {
        let mut m = Self::new(
            new_name,
            target.arity,
            MethodBody::Alias {
                original: Arc::from(original),
                target: target.clone(),
            },
        );
        m.visibility = target.visibility;
        m
    }

    pub fn undefined(name: &str) -> Self {
        Self::new(name, ArityRange::rest(0), MethodBody::Undefined)
    }

    /// Converts a frameless native method into one that needs a frame.
    pub fn needing_frame(mut self) -> Self {
        self.body = match std::mem::replace(&mut self.body, MethodBody::Undefined) {
            MethodBody::Native(entry) => MethodBody::Scoped(entry),
            other => other,
        };
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// A copy with a new identity and the given visibility.
    pub fn restamped(&self, visibility: Visibility) -> Self {
        let mut m = self.clone();
        m.serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        m.visibility = visibility;
        m
    }

    /// Unique per definition; a redefinition always gets a new serial.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn arity(&self) -> ArityRange {
        self.arity
    }

    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.body, MethodBody::Undefined)
    }

    /// Follows aliases to the method that actually runs.
    pub fn real_method(self: &Arc<Self>) -> Arc<DynamicMethod> {
        let mut cur = self.clone();
        while let MethodBody::Alias { target, .. } = &cur.body {
            let next = target.clone();
            cur = next;
        }
        cur
    }

    /// `None` means the method can only be invoked through `call`.
    pub fn native_shape(&self) -> Option<NativeShape> {
        match &self.body {
            MethodBody::Native(e) => Some(NativeShape {
                args: e.arg_count(),
                needs_frame: false,
            }),
            MethodBody::Scoped(e) => Some(NativeShape {
                args: e.arg_count(),
                needs_frame: true,
            }),
            MethodBody::AttrReader(_) => Some(NativeShape {
                args: Some(0),
                needs_frame: false,
            }),
            MethodBody::AttrWriter(_) => Some(NativeShape {
                args: Some(1),
                needs_frame: false,
            }),
            MethodBody::Alias { target, .. } => target.native_shape(),
            MethodBody::Generic(_) | MethodBody::Undefined => None,
        }
    }

    /// The generic entry point: always correct for any argument shape.
    pub fn call(
        &self,
        ctx: &ThreadContext,
        recv: &Value,
        args: &[Value],
        block: Option<&Block>,
    ) -> CallResult {
        match &self.body {
            MethodBody::Native(entry) => {
                self.arity.check(args.len())?;
                entry.call(ctx, recv, args, block)
            }
            MethodBody::Scoped(entry) => {
                self.arity.check(args.len())?;
                let _frame = ctx.push_frame();
                entry.call(ctx, recv, args, block)
            }
            MethodBody::Generic(f) => {
                self.arity.check(args.len())?;
                let _frame = ctx.push_frame();
                f(ctx, recv, args, block)
            }
            MethodBody::AttrReader(ivar) => {
                self.arity.check(args.len())?;
                Ok(read_ivar(recv, ivar))
            }
            MethodBody::AttrWriter(ivar) => {
                self.arity.check(args.len())?;
                write_ivar(recv, ivar, &args[0])
            }
            MethodBody::Alias { target, .. } => target.call(ctx, recv, args, block),
            MethodBody::Undefined => Err(RaiseError::new(
                ErrorClass::NoMethodError,
                format!("undefined method `{}' for {}", self.name, recv.inspect()),
            )
            .with_name(&self.name)
            .into()),
        }
    }
}

pub fn read_ivar(recv: &Value, ivar: &str) -> Value {
    match recv {
        Value::Object(o) => o.ivar_get(ivar),
        _ => Value::Nil,
    }
}

pub fn write_ivar(recv: &Value, ivar: &str, value: &Value) -> CallResult {
    match recv {
        Value::Object(o) => {
            o.ivar_set(ivar, value.clone());
            Ok(value.clone())
        }
        other => Err(RaiseError::new(
            ErrorClass::TypeError,
            format!("can't modify instance variable {ivar} of {}", other.inspect()),
        )
        .into()),
    }
}

impl fmt::Debug for DynamicMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            MethodBody::Native(_) => "native",
            MethodBody::Scoped(_) => "scoped",
            MethodBody::Generic(_) => "generic",
            MethodBody::AttrReader(_) => "attr_reader",
            MethodBody::AttrWriter(_) => "attr_writer",
            MethodBody::Alias { .. } => "alias",
            MethodBody::Undefined => "undefined",
        };
        f.debug_struct("DynamicMethod")
            .field("name", &self.name)
            .field("serial", &self.serial)
            .field("visibility", &self.visibility)
            .field("arity", &self.arity)
            .field("body", &body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_ranges() {
        assert!(ArityRange::fixed(2).accepts(2));
        assert!(!ArityRange::fixed(2).accepts(3));
        assert!(ArityRange::optional(1, 2).accepts(3));
        assert!(!ArityRange::optional(1, 2).accepts(0));
        assert!(ArityRange::rest(1).accepts(10));
        let err = ArityRange::optional(1, 2).check(5).unwrap_err();
        assert_eq!(
            err.message,
            "wrong number of arguments (given 5, expected 1..3)"
        );
    }

    #[test]
    fn alias_unwraps_to_real_method() {
        let real = Arc::new(DynamicMethod::native0("speak", |_, _, _| Ok(Value::Int(1))));
        let alias = Arc::new(DynamicMethod::alias("talk", "speak", real.clone()));
        assert_eq!(alias.real_method().serial(), real.serial());
        assert_eq!(alias.native_shape(), real.native_shape());
    }
}
