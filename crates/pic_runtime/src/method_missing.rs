//! Missing-method detection and `method_missing` redirection.
//!
//! A redirected call is never cached: whether a method counts as missing
//! depends on the caller, which varies per call.

use smallvec::SmallVec;

use pic_core::{
    CallResult, ClassRef, DynamicMethod, ErrorClass, ObjectModel, RaiseError, Resolved, Value,
    Visibility,
};

use crate::shape::CallType;
use crate::target::Invocation;

pub const METHOD_MISSING: &str = "method_missing";

/// Why a call was treated as missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MissingKind {
    /// Nothing found, or an undefined-method marker.
    Undefined,
    Private,
    Protected,
}

/// Resolves `name` for a call and applies visibility rules. `Err` means the
/// call must go to `method_missing`.
pub fn resolve_callable(
    model: &dyn ObjectModel,
    name: &str,
    call_type: CallType,
    caller: &Value,
    class: &ClassRef,
) -> Result<Resolved, MissingKind> {
    match model.resolve(class, name) {
        Some(found) if !found.method.is_undefined() => {
            let method = &found.method;
            match visibility_denied(model, name, call_type, caller, method, &found.defining_class) {
                Some(kind) => Err(kind),
                None => Ok(found),
            }
        }
        _ => Err(MissingKind::Undefined),
    }
}

/// Only `Normal` calls are restricted; `method_missing` itself is always reachable.
pub fn visibility_denied(
    model: &dyn ObjectModel,
    name: &str,
    call_type: CallType,
    caller: &Value,
    method: &DynamicMethod,
    defining_class: &ClassRef,
) -> Option<MissingKind> {
    if call_type != CallType::Normal || name == METHOD_MISSING {
        return None;
    }
    match method.visibility() {
        Visibility::Public => None,
        Visibility::Private => Some(MissingKind::Private),
        Visibility::Protected => {
            if model.kind_of(caller, &defining_class.real_class()) {
                None
            } else {
                Some(MissingKind::Protected)
            }
        }
    }
}

/// Calls the receiver's `method_missing` with the name prepended to the
/// arguments, or raises the default error when there is none.
pub fn redirect(
    model: &dyn ObjectModel,
    name: &str,
    call_type: CallType,
    inv: &Invocation<'_>,
    kind: MissingKind,
) -> CallResult {
    if name != METHOD_MISSING {
        let handler = model
            .resolve(inv.class, METHOD_MISSING)
            .filter(|found| !found.method.is_undefined());
        if let Some(handler) = handler {
            let mut args: SmallVec<[Value; 4]> = SmallVec::with_capacity(inv.args.len() + 1);
            args.push(Value::sym(name));
            args.extend(inv.args.iter().cloned());
            return handler.method.call(inv.ctx, inv.receiver, &args, inv.block);
        }
    }
    Err(default_error(name, call_type, inv.receiver, kind).into())
}

fn default_error(
    name: &str,
    call_type: CallType,
    receiver: &Value,
    kind: MissingKind,
) -> RaiseError {
    let recv = receiver.inspect();
    let (class, message) = match kind {
        MissingKind::Private => (
            ErrorClass::NoMethodError,
            format!("private method `{name}' called for {recv}"),
        ),
        MissingKind::Protected => (
            ErrorClass::NoMethodError,
            format!("protected method `{name}' called for {recv}"),
        ),
        MissingKind::Undefined if call_type == CallType::Variable => (
            ErrorClass::NameError,
            format!("undefined local variable or method `{name}' for {recv}"),
        ),
        MissingKind::Undefined => (
            ErrorClass::NoMethodError,
            format!("undefined method `{name}' for {recv}"),
        ),
    };
    RaiseError::new(class, message).with_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_messages_follow_call_type_and_visibility() {
        let recv = Value::Int(3);
        let err = default_error("foo", CallType::Variable, &recv, MissingKind::Undefined);
        assert_eq!(err.class, ErrorClass::NameError);
        assert_eq!(err.message, "undefined local variable or method `foo' for 3");

        let err = default_error("foo", CallType::Normal, &recv, MissingKind::Undefined);
        assert_eq!(err.class, ErrorClass::NoMethodError);
        assert_eq!(err.message, "undefined method `foo' for 3");

        let err = default_error("foo", CallType::Normal, &Value::Nil, MissingKind::Private);
        assert_eq!(err.message, "private method `foo' called for nil");
        assert_eq!(err.name.as_deref(), Some("foo"));
    }
}
