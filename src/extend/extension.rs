//! Registrable extensions.
//!
//! An extension bundles a named group of resources with an init hook that
//! runs once during the registration phase. Historically these came in two
//! flavors (services and plugins); they are structurally identical, so the
//! registry keeps a single unified concept.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::extend::registry::{Registry, RegistryError};
use crate::extend::Resource;

/// Hook run sequentially, in registration order, during startup. Hooks may
/// register middleware, admin pages, and menu items against the registry.
pub type InitHook = Arc<dyn Fn(&mut Registry) -> Result<(), RegistryError> + Send + Sync>;

#[derive(Clone)]
pub struct Extension {
    /// Unique key for lookups
    pub name: String,
    pub friendly_name: String,
    pub description: String,
    /// Internal extensions ship with the host and are hidden from
    /// user-facing extension management
    pub internal: bool,
    /// Dispatch precedence within the extension follows this order
    pub resources: Vec<Resource>,
    pub on_init: Option<InitHook>,
}

impl Extension {
    pub fn new(name: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.into(),
            description: String::new(),
            internal: false,
            resources: Vec::new(),
            on_init: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn on_init(mut self, hook: InitHook) -> Self {
        self.on_init = Some(hook);
        self
    }

    pub fn to_api_json(&self) -> Value {
        json!({
            "name": self.name,
            "friendly_name": self.friendly_name,
            "description": self.description,
            "resources": self.resources.iter().map(Resource::to_api_json).collect::<Vec<_>>(),
        })
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name)
            .field("internal", &self.internal)
            .field("resources", &self.resources.len())
            .finish()
    }
}
