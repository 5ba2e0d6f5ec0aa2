//! The extension registry.
//!
//! The registry is an explicit object built once during a single-threaded
//! startup phase and handed to the dispatcher as an immutable snapshot.
//! Registration after `finalize()` is a programming error and is surfaced
//! as such rather than silently accepted.

use thiserror::Error;

use crate::extend::admin::{match_template, AdminPage};
use crate::extend::menu::SideMenuItem;
use crate::extend::middleware::{Handler, Middleware};
use crate::extend::route::RouteError;
use crate::extend::{Extension, HandlerFn, RouteRule};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("Extension '{0}' is already registered")]
    DuplicateExtension(String),

    #[error("Side menu parent '{0}' does not exist; parents must be registered before children")]
    MissingMenuParent(String),

    #[error("Registration attempted after the registry started serving")]
    AlreadyServing,

    #[error("Extension '{name}' failed to initialize: {message}")]
    InitFailed { name: String, message: String },
}

#[derive(Default)]
pub struct Registry {
    extensions: Vec<Extension>,
    middleware: Vec<Middleware>,
    handlers: Vec<Handler>,
    admin_pages: Vec<AdminPage>,
    side_menu: Vec<SideMenuItem>,
    next_seq: u64,
    serving: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_registering(&self) -> Result<(), RegistryError> {
        if self.serving {
            return Err(RegistryError::AlreadyServing);
        }
        Ok(())
    }

    // ---- Registration ----

    pub fn register_extension(&mut self, extension: Extension) -> Result<(), RegistryError> {
        self.ensure_registering()?;
        if self.extensions.iter().any(|e| e.name == extension.name) {
            return Err(RegistryError::DuplicateExtension(extension.name));
        }
        tracing::info!(extension = %extension.name, "Registered extension");
        self.extensions.push(extension);
        Ok(())
    }

    pub fn register_middleware(&mut self, mut middleware: Middleware) -> Result<(), RegistryError> {
        self.ensure_registering()?;
        middleware.seq = self.next_seq;
        self.next_seq += 1;
        self.middleware.push(middleware);
        // Stable order: ascending priority, insertion sequence as tiebreaker
        self.middleware.sort_by_key(|m| (m.priority, m.seq));
        Ok(())
    }

    pub fn register_handler(
        &mut self,
        rule: RouteRule,
        action: HandlerFn,
    ) -> Result<(), RegistryError> {
        self.ensure_registering()?;
        self.handlers.push(Handler::new(rule, action));
        Ok(())
    }

    pub fn register_admin_page(&mut self, page: AdminPage) -> Result<(), RegistryError> {
        self.ensure_registering()?;
        tracing::debug!(route = %page.route, "Registered admin page");
        self.admin_pages.push(page);
        Ok(())
    }

    /// Add a side menu item. `parent` is the exact title of an existing root
    /// item, or empty for a root entry. Menu structure must be built in
    /// dependency order; a missing parent is fatal at startup.
    pub fn add_side_menu_item(
        &mut self,
        title: &str,
        path: &str,
        priority: i32,
        parent: &str,
        permission: &str,
    ) -> Result<(), RegistryError> {
        self.ensure_registering()?;
        let item = SideMenuItem::new(title, path, priority, permission);

        if !parent.is_empty() {
            let root = self
                .side_menu
                .iter_mut()
                .find(|root| root.title == parent)
                .ok_or_else(|| RegistryError::MissingMenuParent(parent.to_string()))?;
            root.children.push(item);
            root.children.sort_by_key(|c| c.priority);
            return Ok(());
        }

        self.side_menu.push(item);
        self.side_menu.sort_by_key(|i| i.priority);
        Ok(())
    }

    /// Run each extension's init hook sequentially, in registration order.
    /// Hooks may register middleware, admin pages, and menu entries. Any
    /// failure aborts startup.
    pub fn run_init_hooks(&mut self) -> Result<(), RegistryError> {
        self.ensure_registering()?;
        let hooks: Vec<(String, crate::extend::InitHook)> = self
            .extensions
            .iter()
            .filter_map(|e| e.on_init.clone().map(|h| (e.name.clone(), h)))
            .collect();

        for (name, hook) in hooks {
            tracing::info!(extension = %name, "Initializing extension");
            hook(self).map_err(|e| RegistryError::InitFailed {
                name,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Flip the phase flag; every mutation from here on fails. The caller
    /// wraps the finalized registry in an `Arc` for concurrent dispatch.
    pub fn finalize(&mut self) {
        self.serving = true;
        tracing::info!(
            extensions = self.extensions.len(),
            middleware = self.middleware.len(),
            handlers = self.handlers.len(),
            admin_pages = self.admin_pages.len(),
            "Registry finalized"
        );
    }

    pub fn is_serving(&self) -> bool {
        self.serving
    }

    // ---- Accessors (defensive copies, never the live collection) ----

    pub fn extensions(&self) -> Vec<Extension> {
        self.extensions.clone()
    }

    pub fn extension(&self, name: &str) -> Option<Extension> {
        self.extensions.iter().find(|e| e.name == name).cloned()
    }

    pub fn middleware(&self) -> Vec<Middleware> {
        self.middleware.clone()
    }

    pub fn handlers(&self) -> Vec<Handler> {
        self.handlers.clone()
    }

    pub fn admin_pages(&self) -> Vec<AdminPage> {
        self.admin_pages.clone()
    }

    pub fn side_menu(&self) -> Vec<SideMenuItem> {
        self.side_menu.clone()
    }

    /// Find the admin page whose template matches `path` (the full request
    /// path, `/admin/...`), together with its captured parameters.
    pub fn admin_page_for(
        &self,
        path: &str,
    ) -> Option<(AdminPage, std::collections::BTreeMap<String, String>)> {
        for page in &self.admin_pages {
            let template = format!("/admin/{}", page.route);
            if let Some(params) = match_template(path, &template) {
                return Some((page.clone(), params));
            }
        }
        None
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("extensions", &self.extensions.len())
            .field("middleware", &self.middleware.len())
            .field("handlers", &self.handlers.len())
            .field("serving", &self.serving)
            .finish()
    }
}
