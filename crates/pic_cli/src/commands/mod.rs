use std::sync::Arc;

use pic_core::{ClassRef, ClassRegistry, DynamicMethod, ObjectModel, Value};
use pic_runtime::{DispatchConfig, DispatchEngine};

pub(crate) mod scenario;
pub(crate) mod stress;

/// A fresh object model and engine, plus the failures a command has seen.
pub(crate) struct Harness {
    pub reg: Arc<ClassRegistry>,
    pub engine: Arc<DispatchEngine>,
    failures: Vec<String>,
}

impl Harness {
    pub(crate) fn new(config: DispatchConfig) -> Self {
        let reg = Arc::new(ClassRegistry::new());
        let model: Arc<dyn ObjectModel> = reg.clone();
        Self {
            engine: DispatchEngine::new(model, config),
            reg,
            failures: Vec::new(),
        }
    }

    /// Defines `name` with a `speak(n)` answering `value * 100 + n`.
    pub(crate) fn speaker(&self, name: &str, value: i64) -> Result<ClassRef, String> {
        let class = self.reg.define_class(name, None).map_err(|e| e.to_string())?;
        self.reg.define_method(&class, speak(value));
        Ok(class)
    }

    pub(crate) fn instance(&self, class: &ClassRef) -> Result<Value, String> {
        self.reg.new_object(class).map_err(|e| e.to_string())
    }

    pub(crate) fn check(&mut self, ok: bool, what: impl FnOnce() -> String) {
        if !ok {
            let msg = what();
            tracing::warn!(%msg, "check failed");
            self.failures.push(msg);
        }
    }

    pub(crate) fn failures(&self) -> &[String] {
        &self.failures
    }

    pub(crate) fn print_report(&self) {
        print!("{}", self.engine.report());
    }
}

pub(crate) fn speak(value: i64) -> DynamicMethod {
    DynamicMethod::native1("speak", move |_, _, arg, _| {
        Ok(Value::Int(value * 100 + arg.as_int().unwrap_or(0)))
    })
}

/// The value `speak(arg)` must return for a class defined with `value`.
pub(crate) fn expected(value: i64, arg: i64) -> i64 {
    value * 100 + arg
}
