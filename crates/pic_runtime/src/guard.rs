//! Receiver-shape guards.
//!
//! A guard checks exactly one invalidation mechanism. Immediates always use
//! their value kind plus the broad builtin signal; heap receivers use either
//! the generation token or the class switch point, per `GuardPolicy`.

use std::sync::Arc;

use pic_core::{ClassId, ClassRef, ClassVersioning, ObjectModel, SwitchPoint, Value, ValueKind};

use crate::config::GuardPolicy;
use crate::entry::MethodEntry;

#[derive(Clone, Debug)]
pub enum Guard {
    Generation { class: ClassId, token: u64 },
    SwitchPoint { class: ClassId, signal: Arc<SwitchPoint> },
    Immediate { kind: ValueKind, signal: Arc<SwitchPoint> },
}

impl Guard {
    pub fn for_entry(entry: &MethodEntry, receiver: &Value, policy: GuardPolicy) -> Self {
        let kind = receiver.kind();
        if let (true, Some(signal)) = (kind.is_immediate(), &entry.stamp.builtin_signal) {
            return Guard::Immediate {
                kind,
                signal: signal.clone(),
            };
        }
        match policy {
            GuardPolicy::Generation => Guard::Generation {
                class: entry.receiver_class,
                token: entry.stamp.token,
            },
            GuardPolicy::SwitchPoint => Guard::SwitchPoint {
                class: entry.receiver_class,
                signal: entry.stamp.signal.clone(),
            },
        }
    }

    #[inline]
    pub fn check(&self, model: &dyn ObjectModel, receiver: &Value, class: &ClassRef) -> bool {
        match self {
            Guard::Generation { class: id, token } => {
                class.id() == *id && model.generation(class) == *token
            }
            Guard::SwitchPoint { class: id, signal } => class.id() == *id && signal.is_valid(),
            Guard::Immediate { kind, signal } => receiver.kind() == *kind && signal.is_valid(),
        }
    }
}
