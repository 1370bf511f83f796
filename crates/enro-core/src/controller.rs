//! The navigation controller: bindings, interceptors, plugins and the root
//! handler, assembled once and shared by `Arc`.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use enro_types::{ContextId, NavigationKeyInstance, Result};

use crate::binding::{BindingRegistry, NavigationBinding};
use crate::context::ContextTree;
use crate::events::EventEmitter;
use crate::interceptor::{AggregateInterceptor, NavigationInterceptor};
use crate::interceptors::system_interceptors;

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Runtime configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Move destinations between Created/Started/Resumed as the active path
    /// changes. Hosts that drive lifecycle themselves turn this off.
    pub manage_lifecycle: bool,
    pub event_capacity: usize,
    /// Log the whole context tree at debug level after every commit.
    pub log_tree_on_commit: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            manage_lifecycle: true,
            event_capacity: 256,
            log_tree_on_commit: false,
        }
    }
}

impl ControllerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// Observer of destination lifecycle across the whole controller.
pub trait NavigationPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn on_attached(&self, _controller: &EnroController) {}

    fn on_opened(&self, _instance: &NavigationKeyInstance) {}

    /// The instance became the active leaf of its root.
    fn on_active(&self, _instance: &NavigationKeyInstance) {}

    fn on_closed(&self, _instance: &NavigationKeyInstance) {}
}

/// The plugins of one controller.
#[derive(Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn NavigationPlugin>>,
    attached: AtomicBool,
}

impl PluginSet {
    pub fn new(plugins: Vec<Arc<dyn NavigationPlugin>>) -> Self {
        Self {
            plugins,
            attached: AtomicBool::new(false),
        }
    }

    /// Notify every plugin that it now belongs to `controller`.
    ///
    /// # Panics
    ///
    /// A plugin set belongs to one controller; attaching it twice panics.
    pub fn attach(&self, controller: &EnroController) {
        let already = self.attached.swap(true, Ordering::SeqCst);
        assert!(!already, "PluginSet is already attached to a controller");
        for plugin in &self.plugins {
            plugin.on_attached(controller);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn NavigationPlugin>> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Root handler
// ---------------------------------------------------------------------------

/// Host hook for keys that need a new platform-level root.
pub trait RootNavigationHandler: Send + Sync {
    fn open_root(&self, instance: &NavigationKeyInstance) -> Result<()>;
}

/// Root handler that records every request (for tests and script replay).
#[derive(Debug, Default)]
pub struct RecordingRootHandler {
    opened: Mutex<Vec<NavigationKeyInstance>>,
}

impl RecordingRootHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<NavigationKeyInstance> {
        self.lock().clone()
    }

    /// Take the requests recorded so far.
    pub fn drain(&self) -> Vec<NavigationKeyInstance> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<NavigationKeyInstance>> {
        self.opened.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RootNavigationHandler for RecordingRootHandler {
    fn open_root(&self, instance: &NavigationKeyInstance) -> Result<()> {
        tracing::debug!(instance = %instance.id, key_type = instance.key_type(), "Root requested");
        self.lock().push(instance.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EnroController
// ---------------------------------------------------------------------------

pub struct EnroController {
    config: ControllerConfig,
    bindings: BindingRegistry,
    interceptors: Vec<Arc<dyn NavigationInterceptor>>,
    system: Vec<Arc<dyn NavigationInterceptor>>,
    plugins: PluginSet,
    root_handler: Option<Arc<dyn RootNavigationHandler>>,
    events: EventEmitter,
}

impl EnroController {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    pub fn root_handler(&self) -> Option<&Arc<dyn RootNavigationHandler>> {
        self.root_handler.as_ref()
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// The interceptors an operation executing in `container` passes through:
    /// the container's own, those of each ancestor container, the global
    /// ones, then the system interceptors.
    pub fn interceptor_chain(
        &self,
        tree: &ContextTree,
        container: ContextId,
    ) -> AggregateInterceptor {
        let mut chain = Vec::new();
        let mut cursor = Some(container);
        while let Some(id) = cursor {
            if let Ok(container) = tree.container(id) {
                chain.extend(container.interceptors().iter().cloned());
            }
            cursor = tree.parent(id);
        }
        chain.extend(self.interceptors.iter().cloned());
        chain.extend(self.system.iter().cloned());
        AggregateInterceptor::new(chain)
    }
}

impl fmt::Debug for EnroController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnroController")
            .field("config", &self.config)
            .field("bindings", &self.bindings.len())
            .field("interceptors", &self.interceptors.len())
            .field("plugins", &self.plugins.len())
            .field("root_handler", &self.root_handler.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct ControllerBuilder {
    config: ControllerConfig,
    bindings: Vec<NavigationBinding>,
    interceptors: Vec<Arc<dyn NavigationInterceptor>>,
    plugins: Vec<Arc<dyn NavigationPlugin>>,
    root_handler: Option<Arc<dyn RootNavigationHandler>>,
}

impl ControllerBuilder {
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn binding(mut self, binding: NavigationBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Add a global interceptor; global interceptors run in registration order.
    pub fn interceptor(mut self, interceptor: Arc<dyn NavigationInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn NavigationPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn root_handler(mut self, handler: Arc<dyn RootNavigationHandler>) -> Self {
        self.root_handler = Some(handler);
        self
    }

    /// Fails with `DuplicateBinding` if two bindings share a key type.
    pub fn build(self) -> Result<EnroController> {
        let mut bindings = BindingRegistry::new();
        for binding in self.bindings {
            bindings.register(binding)?;
        }

        let controller = EnroController {
            events: EventEmitter::new(self.config.event_capacity),
            config: self.config,
            bindings,
            interceptors: self.interceptors,
            system: system_interceptors(),
            plugins: PluginSet::new(self.plugins),
            root_handler: self.root_handler,
        };
        controller.plugins.attach(&controller);
        tracing::debug!(
            bindings = controller.bindings.len(),
            interceptors = controller.interceptors.len(),
            plugins = controller.plugins.len(),
            "Controller built"
        );
        Ok(controller)
    }
}
