//! Configured object graphs
//!
//! A small bean container: beans are declared in JSON configuration (a
//! `type` naming a registered factory, plus constructor `params`), and
//! string params of the form `ref:<bean>` inject other beans in place of
//! the string. Instances are cached, so within one container a bean behaves
//! as a singleton and every injection of it is the same `Arc`.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Bean [{0}] requested, but no config found")]
    UnknownBean(String),

    #[error("Bean [{bean}] declares type [{type_name}], but no factory is registered for it")]
    UnknownType { bean: String, type_name: String },

    #[error("Bean [{0}] is part of a reference cycle")]
    CircularReference(String),

    #[error("Bean [{bean}] construction failed: {reason}")]
    Construction { bean: String, reason: String },

    #[error("Bean [{bean}] is not a [{expected}]")]
    WrongType {
        bean: String,
        expected: &'static str,
    },
}

/// Declaration of a single bean.
#[derive(Debug, Clone, Deserialize)]
pub struct BeanDef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Top-level container configuration, deserializable from JSON of the shape
/// `{"beans": {"<id>": {"type": "<factory>", "params": {...}}}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub beans: HashMap<String, BeanDef>,
}

/// A constructed bean, type-erased for storage and injection.
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// Parameters handed to a factory: plain JSON values, plus the bean
/// instances injected for `ref:` params.
#[derive(Default)]
pub struct BeanParams {
    pub values: Map<String, Value>,
    pub refs: HashMap<String, BeanInstance>,
}

impl BeanParams {
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// An injected bean, downcast to its concrete type.
    pub fn reference<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.refs.get(key).cloned()?.downcast::<T>().ok()
    }
}

type BeanFactory = Box<dyn Fn(&BeanParams) -> Result<BeanInstance, String> + Send + Sync>;

pub struct Container {
    config: ContainerConfig,
    factories: HashMap<String, BeanFactory>,
    cache: Mutex<HashMap<String, BeanInstance>>,
}

impl Container {
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            config,
            factories: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register the factory that builds instances of `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&BeanParams) -> Result<BeanInstance, String> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Box::new(factory));
    }

    /// Get the bean named `name`, instantiating and caching it on first use.
    pub fn get(&self, name: &str) -> Result<BeanInstance, ContainerError> {
        let mut in_progress = HashSet::new();
        self.get_inner(name, &mut in_progress)
    }

    /// Typed accessor: the bean downcast to `T`.
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        self.get(name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::WrongType {
                bean: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    fn get_inner(
        &self,
        name: &str,
        in_progress: &mut HashSet<String>,
    ) -> Result<BeanInstance, ContainerError> {
        if let Some(cached) = self.cache.lock().unwrap().get(name) {
            return Ok(Arc::clone(cached));
        }
        if !in_progress.insert(name.to_string()) {
            return Err(ContainerError::CircularReference(name.to_string()));
        }

        let def = self
            .config
            .beans
            .get(name)
            .ok_or_else(|| ContainerError::UnknownBean(name.to_string()))?;

        let mut params = BeanParams {
            values: def.params.clone(),
            refs: HashMap::new(),
        };
        // Resolve `ref:` params into bean instances before instantiating.
        for (key, value) in &def.params {
            if let Some(target) = value.as_str().and_then(|s| s.strip_prefix("ref:")) {
                let instance = self.get_inner(target, in_progress)?;
                params.values.remove(key);
                params.refs.insert(key.clone(), instance);
            }
        }

        let factory =
            self.factories
                .get(&def.type_name)
                .ok_or_else(|| ContainerError::UnknownType {
                    bean: name.to_string(),
                    type_name: def.type_name.clone(),
                })?;

        let instance = factory(&params).map_err(|reason| ContainerError::Construction {
            bean: name.to_string(),
            reason,
        })?;

        // Another thread may have constructed the bean while the factory
        // ran; the first instance into the cache wins for everyone.
        let instance = {
            let mut cache = self.cache.lock().unwrap();
            Arc::clone(cache.entry(name.to_string()).or_insert(instance))
        };
        in_progress.remove(name);
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Logger {
        level: String,
    }

    #[derive(Debug)]
    struct TrackingLogger {
        inner: Arc<Logger>,
    }

    fn container() -> Container {
        let config: ContainerConfig = serde_json::from_value(json!({
            "beans": {
                "app/Logger": {
                    "type": "Logger",
                    "params": {"logLevel": "DEBUG"}
                },
                "app/TrackingLogger": {
                    "type": "TrackingLogger",
                    "params": {"logger": "ref:app/Logger"}
                },
                "app/Broken": {
                    "type": "Missing"
                },
                "app/Chicken": {
                    "type": "Logger",
                    "params": {"egg": "ref:app/Egg"}
                },
                "app/Egg": {
                    "type": "Logger",
                    "params": {"chicken": "ref:app/Chicken"}
                }
            }
        }))
        .unwrap();

        let mut container = Container::new(config);
        container.register("Logger", |params| {
            let level = params
                .value("logLevel")
                .and_then(Value::as_str)
                .unwrap_or("INFO")
                .to_string();
            Ok(Arc::new(Logger { level }))
        });
        container.register("TrackingLogger", |params| {
            let inner = params
                .reference::<Logger>("logger")
                .ok_or("missing logger ref")?;
            Ok(Arc::new(TrackingLogger { inner }))
        });
        container
    }

    #[test]
    fn instantiates_from_config_params() {
        let container = container();
        let logger = container.get_as::<Logger>("app/Logger").unwrap();
        assert_eq!(logger.level, "DEBUG");
    }

    #[test]
    fn beans_are_singletons() {
        let container = container();
        let first = container.get_as::<Logger>("app/Logger").unwrap();
        let second = container.get_as::<Logger>("app/Logger").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn concurrent_gets_share_one_instance() {
        let container = container();
        let (first, second) = std::thread::scope(|scope| {
            let a = scope.spawn(|| container.get_as::<Logger>("app/Logger").unwrap());
            let b = scope.spawn(|| container.get_as::<Logger>("app/Logger").unwrap());
            (a.join().unwrap(), b.join().unwrap())
        });
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn ref_params_inject_other_beans() {
        let container = container();
        let tracking = container.get_as::<TrackingLogger>("app/TrackingLogger").unwrap();
        let logger = container.get_as::<Logger>("app/Logger").unwrap();
        assert!(Arc::ptr_eq(&tracking.inner, &logger));
    }

    #[test]
    fn unknown_bean_is_a_configuration_error() {
        let err = container().get("app/Nope").unwrap_err();
        assert!(matches!(err, ContainerError::UnknownBean(name) if name == "app/Nope"));
    }

    #[test]
    fn unregistered_type_is_a_configuration_error() {
        let err = container().get("app/Broken").unwrap_err();
        assert!(matches!(err, ContainerError::UnknownType { .. }));
    }

    #[test]
    fn reference_cycles_are_detected() {
        let err = container().get("app/Chicken").unwrap_err();
        assert!(matches!(err, ContainerError::CircularReference(_)));
    }

    #[test]
    fn wrong_downcast_is_reported() {
        let container = container();
        let err = container.get_as::<TrackingLogger>("app/Logger").unwrap_err();
        assert!(matches!(err, ContainerError::WrongType { .. }));
    }
}
