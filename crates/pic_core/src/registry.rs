//! Thread-safe reference implementation of the object model.
//!
//! Structural changes go through the registry so it can invalidate the class
//! and everything that inherits from it: subclasses, singleton classes and
//! classes including a changed module. Each mutation is applied to the method
//! table first and then invalidated; call sites snapshot the token before
//! resolving, so a resolution racing a mutation is cached under a token that
//! is already stale.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ahash::RandomState;
use hashbrown::HashSet;
use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::class::{ClassId, ClassKind, ClassRef, RClass};
use crate::method::{DynamicMethod, Visibility};
use crate::object_model::{ClassVersioning, MethodTable, Resolved};
use crate::switch_point::SwitchPoint;
use crate::value::{RObject, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectModelError {
    #[error("{0} is not a class")]
    NotAClass(String),
    #[error("{0} is not a module")]
    NotAModule(String),
    #[error("superclass mismatch for class {0}")]
    SuperclassMismatch(String),
    #[error("cyclic include detected: {module} in {class}")]
    CyclicInclude { class: String, module: String },
    #[error("can't define singleton for {0}")]
    NoSingleton(String),
    #[error("undefined method `{name}' for class `{class}'")]
    UndefinedMethod { class: String, name: String },
    #[error("allocator undefined for {0}")]
    NotInstantiable(String),
    #[error("class id space exhausted")]
    ClassIdsExhausted,
}

struct Builtins {
    basic_object: ClassRef,
    object: ClassRef,
    kernel: ClassRef,
    integer: ClassRef,
    float: ClassRef,
    string: ClassRef,
    symbol: ClassRef,
    nil_class: ClassRef,
    true_class: ClassRef,
    false_class: ClassRef,
}

pub struct ClassRegistry {
    next_id: AtomicU32,
    generations: AtomicU64,
    classes: RwLock<IndexMap<Arc<str>, ClassRef, RandomState>>,
    builtin_signal: RwLock<Arc<SwitchPoint>>,
    builtins: Builtins,
}

impl ClassRegistry {
    pub fn new() -> Self {
        let next_builtin = std::cell::Cell::new(0u8);
        let generations = AtomicU64::new(1);
        let alloc = |name: &str, kind, superclass: Option<&ClassRef>, immediate| {
            let index = next_builtin.replace(next_builtin.get() + 1);
            let class = Arc::new(RClass::new(
                ClassId::builtin(index),
                Arc::from(name),
                kind,
                superclass.cloned(),
                immediate,
                generations.fetch_add(1, Ordering::AcqRel),
            ));
            if let Some(sup) = superclass {
                sup.add_dependent(&class);
            }
            class
        };

        let basic_object = alloc("BasicObject", ClassKind::Class, None, false);
        let object = alloc("Object", ClassKind::Class, Some(&basic_object), false);
        let kernel = alloc("Kernel", ClassKind::Module, None, false);
        object.push_include(kernel.clone());
        kernel.add_dependent(&object);
        let builtins = Builtins {
            integer: alloc("Integer", ClassKind::Class, Some(&object), true),
            float: alloc("Float", ClassKind::Class, Some(&object), true),
            string: alloc("String", ClassKind::Class, Some(&object), false),
            symbol: alloc("Symbol", ClassKind::Class, Some(&object), true),
            nil_class: alloc("NilClass", ClassKind::Class, Some(&object), true),
            true_class: alloc("TrueClass", ClassKind::Class, Some(&object), true),
            false_class: alloc("FalseClass", ClassKind::Class, Some(&object), true),
            basic_object,
            object,
            kernel,
        };

        let mut classes = IndexMap::with_hasher(RandomState::new());
        for class in [
            &builtins.basic_object,
            &builtins.object,
            &builtins.kernel,
            &builtins.integer,
            &builtins.float,
            &builtins.string,
            &builtins.symbol,
            &builtins.nil_class,
            &builtins.true_class,
            &builtins.false_class,
        ] {
            classes.insert(Arc::from(class.name()), class.clone());
        }

        Self {
            next_id: AtomicU32::new(u32::from(next_builtin.get())),
            generations,
            classes: RwLock::new(classes),
            builtin_signal: RwLock::new(SwitchPoint::new()),
            builtins,
        }
    }

    pub fn basic_object(&self) -> &ClassRef {
        &self.builtins.basic_object
    }

    pub fn object(&self) -> &ClassRef {
        &self.builtins.object
    }

    pub fn kernel(&self) -> &ClassRef {
        &self.builtins.kernel
    }

    pub fn integer(&self) -> &ClassRef {
        &self.builtins.integer
    }

    pub fn float(&self) -> &ClassRef {
        &self.builtins.float
    }

    pub fn string(&self) -> &ClassRef {
        &self.builtins.string
    }

    pub fn symbol(&self) -> &ClassRef {
        &self.builtins.symbol
    }

    pub fn nil_class(&self) -> &ClassRef {
        &self.builtins.nil_class
    }

    pub fn true_class(&self) -> &ClassRef {
        &self.builtins.true_class
    }

    pub fn false_class(&self) -> &ClassRef {
        &self.builtins.false_class
    }

    pub fn class_named(&self, name: &str) -> Option<ClassRef> {
        self.classes.read().get(name).cloned()
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::AcqRel)
    }

    /// Never hands out an id twice: the counter stops instead of wrapping.
    fn next_class_id(&self) -> Result<ClassId, ObjectModelError> {
        self.next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .ok()
            .and_then(ClassId::from_index)
            .ok_or(ObjectModelError::ClassIdsExhausted)
    }

    fn alloc_class(
        &self,
        name: &str,
        kind: ClassKind,
        superclass: Option<&ClassRef>,
    ) -> Result<ClassRef, ObjectModelError> {
        let class = Arc::new(RClass::new(
            self.next_class_id()?,
            Arc::from(name),
            kind,
            superclass.cloned(),
            false,
            self.next_generation(),
        ));
        if let Some(sup) = superclass {
            sup.add_dependent(&class);
        }
        Ok(class)
    }

    /// Defines a class, or reopens it when one with the same name exists.
    /// `superclass` defaults to `Object`.
    pub fn define_class(
        &self,
        name: &str,
        superclass: Option<&ClassRef>,
    ) -> Result<ClassRef, ObjectModelError> {
        let mut classes = self.classes.write();
        if let Some(existing) = classes.get(name) {
            if existing.is_module() {
                return Err(ObjectModelError::NotAClass(name.to_string()));
            }
            if let Some(sup) = superclass {
                if existing.superclass().map(|s| s.id()) != Some(sup.id()) {
                    return Err(ObjectModelError::SuperclassMismatch(name.to_string()));
                }
            }
            return Ok(existing.clone());
        }

        let superclass = superclass.unwrap_or(&self.builtins.object);
        if superclass.is_module() || superclass.is_singleton() {
            return Err(ObjectModelError::NotAClass(superclass.name().to_string()));
        }
        let class = self.alloc_class(name, ClassKind::Class, Some(superclass))?;
        classes.insert(Arc::from(name), class.clone());
        tracing::trace!(class = name, superclass = superclass.name(), "class defined");
        Ok(class)
    }

    pub fn define_module(&self, name: &str) -> Result<ClassRef, ObjectModelError> {
        let mut classes = self.classes.write();
        if let Some(existing) = classes.get(name) {
            return if existing.is_module() {
                Ok(existing.clone())
            } else {
                Err(ObjectModelError::NotAModule(name.to_string()))
            };
        }
        let module = self.alloc_class(name, ClassKind::Module, None)?;
        classes.insert(Arc::from(name), module.clone());
        Ok(module)
    }

    pub fn new_object(&self, class: &ClassRef) -> Result<Value, ObjectModelError> {
        if class.kind() != ClassKind::Class
            || class.is_builtin_immediate()
            || Arc::ptr_eq(class, &self.builtins.string)
        {
            return Err(ObjectModelError::NotInstantiable(class.name().to_string()));
        }
        Ok(Value::Object(Arc::new(RObject::new(class.clone()))))
    }

    /// The receiver's singleton class, created on first request. Immediates
    /// and strings have none.
    pub fn singleton_class(&self, value: &Value) -> Result<ClassRef, ObjectModelError> {
        let Value::Object(object) = value else {
            return Err(ObjectModelError::NoSingleton(value.inspect()));
        };
        let name = format!("#<Class:{}>", value.inspect());
        object.upgrade_class(|current| {
            if current.is_singleton() {
                return Ok(None);
            }
            self.alloc_class(&name, ClassKind::Singleton, Some(current)).map(Some)
        })
    }

    /// Adds or replaces `method` in `class` and invalidates the hierarchy below it.
    pub fn define_method(&self, class: &ClassRef, method: DynamicMethod) -> Arc<DynamicMethod> {
        let method = Arc::new(method);
        class
            .methods_mut()
            .insert(Arc::from(method.name()), method.clone());
        tracing::trace!(class = class.name(), method = method.name(), "method defined");
        self.invalidate(class);
        method
    }

    /// Blocks lookup of `name` through `class`, even if an ancestor defines it.
    pub fn undef_method(&self, class: &ClassRef, name: &str) -> Result<(), ObjectModelError> {
        match self.resolve(class, name) {
            Some(found) if !found.method.is_undefined() => {}
            _ => {
                return Err(ObjectModelError::UndefinedMethod {
                    class: class.name().to_string(),
                    name: name.to_string(),
                });
            }
        }
        self.define_method(class, DynamicMethod::undefined(name));
        Ok(())
    }

    /// Removes the local definition, exposing any inherited one.
    pub fn remove_method(
        &self,
        class: &ClassRef,
        name: &str,
    ) -> Result<Arc<DynamicMethod>, ObjectModelError> {
        let removed = class.methods_mut().shift_remove(name);
        match removed {
            Some(method) => {
                self.invalidate(class);
                Ok(method)
            }
            None => Err(ObjectModelError::UndefinedMethod {
                class: class.name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub fn alias_method(
        &self,
        class: &ClassRef,
        new_name: &str,
        original: &str,
    ) -> Result<Arc<DynamicMethod>, ObjectModelError> {
        let target = match self.resolve(class, original) {
            Some(found) if !found.method.is_undefined() => found.method,
            _ => {
                return Err(ObjectModelError::UndefinedMethod {
                    class: class.name().to_string(),
                    name: original.to_string(),
                });
            }
        };
        Ok(self.define_method(class, DynamicMethod::alias(new_name, original, target)))
    }

    /// Changes the visibility of `name` as seen through `class`. An inherited
    /// method gets a local copy; the ancestor's definition is left untouched.
    pub fn set_visibility(
        &self,
        class: &ClassRef,
        name: &str,
        visibility: Visibility,
    ) -> Result<(), ObjectModelError> {
        let method = match self.resolve(class, name) {
            Some(found) if !found.method.is_undefined() => found.method,
            _ => {
                return Err(ObjectModelError::UndefinedMethod {
                    class: class.name().to_string(),
                    name: name.to_string(),
                });
            }
        };
        if method.visibility() != visibility {
            self.define_method(class, method.restamped(visibility));
        }
        Ok(())
    }

    pub fn include_module(
        &self,
        class: &ClassRef,
        module: &ClassRef,
    ) -> Result<(), ObjectModelError> {
        if !module.is_module() {
            return Err(ObjectModelError::NotAModule(module.name().to_string()));
        }
        if class.id() == module.id() || class.is_ancestor_of(module) {
            return Err(ObjectModelError::CyclicInclude {
                class: class.name().to_string(),
                module: module.name().to_string(),
            });
        }
        if module.is_ancestor_of(class) {
            return Ok(());
        }
        class.push_include(module.clone());
        module.add_dependent(class);
        tracing::trace!(class = class.name(), module = module.name(), "module included");
        self.invalidate(class);
        Ok(())
    }

    /// Gives `class` and every dependent a fresh token and fires their switch
    /// points. Touching a builtin immediate class also fires the broad signal.
    pub fn invalidate(&self, class: &ClassRef) {
        let mut pending = vec![class.clone()];
        let mut visited: HashSet<ClassId, RandomState> = HashSet::with_hasher(RandomState::new());
        let mut builtin_touched = false;

        while let Some(current) = pending.pop() {
            if !visited.insert(current.id()) {
                continue;
            }
            current.set_generation(self.next_generation());
            current.replace_invalidator().invalidate();
            builtin_touched |= current.is_builtin_immediate();
            pending.extend(current.dependents());
        }

        if builtin_touched {
            let old = std::mem::replace(&mut *self.builtin_signal.write(), SwitchPoint::new());
            old.invalidate();
        }
        tracing::debug!(
            class = class.name(),
            invalidated = visited.len(),
            builtin = builtin_touched,
            "class hierarchy invalidated"
        );
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodTable for ClassRegistry {
    fn class_of(&self, value: &Value) -> ClassRef {
        let b = &self.builtins;
        match value {
            Value::Nil => b.nil_class.clone(),
            Value::Bool(true) => b.true_class.clone(),
            Value::Bool(false) => b.false_class.clone(),
            Value::Int(_) => b.integer.clone(),
            Value::Float(_) => b.float.clone(),
            Value::Symbol(_) => b.symbol.clone(),
            Value::Str(_) => b.string.clone(),
            Value::Object(o) => o.class(),
        }
    }

    fn resolve(&self, start: &ClassRef, name: &str) -> Option<Resolved> {
        start.ancestors().into_iter().find_map(|class| {
            class.local_method(name).map(|method| Resolved {
                method,
                defining_class: class,
            })
        })
    }

    fn kind_of(&self, value: &Value, class: &ClassRef) -> bool {
        class.is_ancestor_of(&self.class_of(value))
    }
}

impl ClassVersioning for ClassRegistry {
    #[inline]
    fn generation(&self, class: &ClassRef) -> u64 {
        class.generation()
    }

    #[inline]
    fn invalidator(&self, class: &ClassRef) -> Arc<SwitchPoint> {
        class.invalidator()
    }

    fn builtin_signal(&self) -> Arc<SwitchPoint> {
        self.builtin_signal.read().clone()
    }
}
