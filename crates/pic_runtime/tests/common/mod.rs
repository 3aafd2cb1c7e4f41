#![allow(dead_code)]

use std::sync::Arc;

use pic_core::{
    CallResult, ClassRef, ClassRegistry, DynamicMethod, ObjectModel, ThreadContext, Value,
};
use pic_runtime::{Arity, CallSite, CallType, DispatchConfig, DispatchEngine, SiteDescriptor};

pub struct World {
    pub reg: Arc<ClassRegistry>,
    pub engine: Arc<DispatchEngine>,
    pub ctx: ThreadContext,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        let reg = Arc::new(ClassRegistry::new());
        let model: Arc<dyn ObjectModel> = reg.clone();
        Self {
            engine: DispatchEngine::new(model, config),
            reg,
            ctx: ThreadContext::new(),
        }
    }

    pub fn class(&self, name: &str) -> ClassRef {
        self.reg.define_class(name, None).unwrap()
    }

    pub fn subclass(&self, name: &str, superclass: &ClassRef) -> ClassRef {
        self.reg.define_class(name, Some(superclass)).unwrap()
    }

    /// A class whose one-argument `speak` returns `value * 100 + arg`.
    pub fn speaker(&self, name: &str, value: i64) -> ClassRef {
        let class = self.class(name);
        self.reg.define_method(&class, speak(value));
        class
    }

    pub fn obj(&self, class: &ClassRef) -> Value {
        self.reg.new_object(class).unwrap()
    }

    pub fn site(&self, name: &str, arity: Arity) -> Arc<CallSite> {
        self.engine
            .call_site(SiteDescriptor::new(name, arity, CallType::Normal).at("test.rb", 1))
    }

    pub fn site_with(&self, desc: SiteDescriptor) -> Arc<CallSite> {
        self.engine.call_site(desc)
    }

    pub fn call(&self, site: &CallSite, recv: &Value, args: &[Value]) -> CallResult {
        site.invoke(&self.ctx, &Value::Nil, recv, args, None)
    }

    pub fn call_int(&self, site: &CallSite, recv: &Value, args: &[Value]) -> i64 {
        int(self.call(site, recv, args))
    }
}

pub fn speak(value: i64) -> DynamicMethod {
    DynamicMethod::native1("speak", move |_, _, arg, _| {
        Ok(Value::Int(value * 100 + arg.as_int().unwrap_or(0)))
    })
}

pub fn int(result: CallResult) -> i64 {
    match result {
        Ok(Value::Int(i)) => i,
        other => panic!("expected an integer, got {other:?}"),
    }
}

pub fn raised(result: CallResult) -> pic_core::RaiseError {
    match result {
        Err(unwind) => unwind
            .as_raise()
            .cloned()
            .unwrap_or_else(|| panic!("expected a raise, got {unwind:?}")),
        Ok(v) => panic!("expected a raise, got {v:?}"),
    }
}
