//! JSON navigation scripts replayed by `enro replay`.
//!
//! A script declares bindings by key type, the containers of a single
//! `window` root, and a list of steps. Opens are issued from the active leaf
//! of that root. Root-hosted keys are captured by a recording root handler
//! and given their own root after each step.

use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};

use enro_core::{
    BindingHost, ContainerFilter, ControllerConfig, EnroController, ExecuteOutcome,
    NavigationBinding, NavigationEvent, NavigationRuntime, NavigationSnapshot, RecordingRootHandler,
};
use enro_types::{AnyKey, ContainerKey, ContextId, NavigationDirection, NavigationKeyInstance};

const MAIN_ROOT: &str = "window";

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub config: ControllerConfig,
    #[serde(default)]
    pub bindings: Vec<ScriptBinding>,
    /// Containers added directly under the main root.
    #[serde(default)]
    pub containers: Vec<ScriptContainer>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid navigation script")
    }
}

#[derive(Debug, Deserialize)]
pub struct ScriptBinding {
    pub key_type: String,
    #[serde(default)]
    pub host: ScriptHost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptHost {
    #[default]
    Container,
    Root,
}

impl From<ScriptHost> for BindingHost {
    fn from(host: ScriptHost) -> Self {
        match host {
            ScriptHost::Container => BindingHost::Container,
            ScriptHost::Root => BindingHost::Root,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScriptContainer {
    pub key: String,
    #[serde(default)]
    pub filter: ContainerFilter,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Open {
        key_type: String,
        #[serde(default)]
        payload: Value,
        #[serde(default = "default_direction")]
        direction: NavigationDirection,
    },
    /// Add a container under the active leaf destination.
    AddContainer {
        key: String,
        #[serde(default)]
        filter: ContainerFilter,
    },
    Activate {
        container: String,
    },
    Close,
    Complete {
        #[serde(default)]
        result: Value,
    },
    Back,
    Print,
}

fn default_direction() -> NavigationDirection {
    NavigationDirection::Push
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

pub struct Replay {
    runtime: NavigationRuntime,
    root: ContextId,
    root_requests: Arc<RecordingRootHandler>,
    receiver: broadcast::Receiver<NavigationEvent>,
    events: Vec<NavigationEvent>,
}

impl Replay {
    pub fn new(script: &Script) -> anyhow::Result<Self> {
        let root_requests = Arc::new(RecordingRootHandler::new());
        let mut builder = EnroController::builder()
            .config(script.config.clone())
            .root_handler(root_requests.clone());
        for binding in &script.bindings {
            builder = builder.binding(NavigationBinding::dynamic(
                binding.key_type.clone(),
                binding.host.into(),
            ));
        }

        let mut runtime = NavigationRuntime::new(Arc::new(builder.build()?));
        let receiver = runtime.subscribe();
        let root = runtime.create_root(MAIN_ROOT);
        for container in &script.containers {
            runtime.add_container(
                root,
                ContainerKey::new(&container.key),
                container.filter.clone(),
            )?;
        }

        Ok(Self {
            runtime,
            root,
            root_requests,
            receiver,
            events: Vec::new(),
        })
    }

    pub fn runtime(&self) -> &NavigationRuntime {
        &self.runtime
    }

    pub fn root(&self) -> ContextId {
        self.root
    }

    /// Events observed so far, in emission order.
    pub fn events(&self) -> &[NavigationEvent] {
        &self.events
    }

    /// Restore saved backstacks into the containers that exist, returning the
    /// keys that had none.
    pub fn restore(&mut self, snapshot: &NavigationSnapshot) -> anyhow::Result<Vec<ContainerKey>> {
        let missing = self.runtime.restore(snapshot)?;
        self.host_root_requests()?;
        self.collect_events();
        Ok(missing)
    }

    /// Run every step, collecting the output of `print` steps.
    pub fn run(&mut self, steps: &[Step]) -> anyhow::Result<Vec<String>> {
        let mut output = Vec::new();
        for (index, step) in steps.iter().enumerate() {
            let printed = self
                .step(step)
                .with_context(|| format!("step {} ({:?}) failed", index + 1, step))?;
            output.extend(printed);
        }
        Ok(output)
    }

    pub fn step(&mut self, step: &Step) -> anyhow::Result<Option<String>> {
        let mut printed = None;
        match step {
            Step::Open {
                key_type,
                payload,
                direction,
            } => {
                let instance = NavigationKeyInstance::from_any(
                    AnyKey::new(key_type.clone(), payload.clone()),
                    *direction,
                );
                let from = self.current();
                let outcome = self.runtime.open(from, instance)?;
                report("open", key_type, outcome);
            }
            Step::AddContainer { key, filter } => {
                let Some(parent) = self.runtime.tree().active_leaf(self.root) else {
                    bail!("container '{}' needs an active destination to live in", key);
                };
                self.runtime
                    .add_container(parent, ContainerKey::new(key), filter.clone())?;
            }
            Step::Activate { container } => {
                self.runtime
                    .set_active_container(&ContainerKey::new(container))?;
            }
            Step::Close => {
                let leaf = self.active_leaf()?;
                let outcome = self.runtime.close(leaf)?;
                report("close", &self.key_type_of(leaf), outcome);
            }
            Step::Complete { result } => {
                let leaf = self.active_leaf()?;
                let key_type = self.key_type_of(leaf);
                let outcome = self.runtime.complete(leaf, result)?;
                report("complete", &key_type, outcome);
            }
            Step::Back => {
                let outcome = self.runtime.handle_back(self.root)?;
                tracing::info!(outcome = ?outcome, "back");
            }
            Step::Print => printed = Some(self.tree_dump()),
        }
        self.host_root_requests()?;
        self.collect_events();
        Ok(printed)
    }

    /// Debug dump of every root, one after the other.
    pub fn tree_dump(&self) -> String {
        let tree = self.runtime.tree();
        tree.roots()
            .iter()
            .map(|root| tree.get_debug_string(*root))
            .collect()
    }

    fn current(&self) -> ContextId {
        self.runtime
            .tree()
            .active_leaf(self.root)
            .unwrap_or(self.root)
    }

    fn active_leaf(&self) -> anyhow::Result<ContextId> {
        self.runtime
            .tree()
            .active_leaf(self.root)
            .context("no active destination")
    }

    fn key_type_of(&self, context: ContextId) -> String {
        self.runtime
            .tree()
            .destination(context)
            .map(|d| d.instance.key_type().to_string())
            .unwrap_or_default()
    }

    fn host_root_requests(&mut self) -> anyhow::Result<()> {
        for instance in self.root_requests.drain() {
            let host = instance.key_type().to_string();
            let root = self.runtime.host_in_root(host.clone(), instance)?;
            tracing::info!(root = %root, host = %host, "Opened new root");
        }
        Ok(())
    }

    fn collect_events(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        tracing::debug!(event = %json, "Navigation event");
                    }
                    self.events.push(event);
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event receiver lagged");
                }
                Err(_) => break,
            }
        }
    }
}

fn report(op: &str, key_type: &str, outcome: ExecuteOutcome) {
    match outcome {
        ExecuteOutcome::Committed => tracing::info!(key_type, "{} committed", op),
        ExecuteOutcome::Cancelled => tracing::info!(key_type, "{} cancelled", op),
        ExecuteOutcome::Ignored => tracing::info!(key_type, "{} ignored", op),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
