//! Named callbacks that the backend may trigger by identifier

use crate::error::CallbackError;
use std::collections::HashMap;
use std::sync::Arc;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Identifier → handler table, populated at startup.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    handlers: HashMap<String, Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous entry
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn invoke(&self, name: &str) -> Result<(), CallbackError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| CallbackError::Unknown(name.to_string()))?;
        handler();
        Ok(())
    }
}
