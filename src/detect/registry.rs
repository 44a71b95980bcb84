use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::ModelLoader;

/// Registry of named model loaders.
///
/// Loaders are cheap handles; nothing is loaded until a session acquires a
/// detector through a `ModelSlot`.
pub struct BackendRegistry {
    loaders: HashMap<String, Arc<dyn ModelLoader>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a loader. The first registered loader becomes the default.
    pub fn register<L: ModelLoader + 'static>(&mut self, loader: L) {
        let name = loader.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.loaders.insert(name, Arc::new(loader));
    }

    /// Set default loader by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.loaders.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelLoader>> {
        self.loaders.get(name).cloned()
    }

    pub fn default_loader(&self) -> Option<Arc<dyn ModelLoader>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Resolve a loader by name, falling back to the default when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn ModelLoader>> {
        match name {
            Some(name) => self.get(name).ok_or_else(|| {
                anyhow!(
                    "backend '{}' not registered (available: {})",
                    name,
                    self.list().join(", ")
                )
            }),
            None => self
                .default_loader()
                .ok_or_else(|| anyhow!("no detector backends registered")),
        }
    }

    /// Registered loader names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaders.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubLoader;

    #[test]
    fn first_registered_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(StubLoader::default());
        assert_eq!(registry.default_loader().unwrap().name(), "stub");
        assert_eq!(registry.resolve(None).unwrap().name(), "stub");
    }

    #[test]
    fn unknown_backend_lists_alternatives() {
        let mut registry = BackendRegistry::new();
        registry.register(StubLoader::default());
        let err = match registry.resolve(Some("tract")) {
            Err(err) => err,
            Ok(_) => panic!("tract is not registered"),
        };
        assert!(err.to_string().contains("available: stub"));
        assert!(registry.set_default("tract").is_err());
    }

    #[test]
    fn empty_registry_has_no_default() {
        let registry = BackendRegistry::default();
        assert!(registry.resolve(None).is_err());
        assert!(registry.list().is_empty());
    }
}
