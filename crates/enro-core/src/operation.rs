//! The navigation operation model.
//!
//! Operations are immutable descriptions of a requested state change. The
//! producer never applies them; it hands them to a container through the
//! [`NavigationRuntime`](crate::runtime::NavigationRuntime), which runs them
//! through the interceptor chain before committing.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use enro_types::{NavigationKeyInstance, Result};

use crate::runtime::NavigationRuntime;

pub type SideEffectFn = dyn Fn(&mut NavigationRuntime) -> Result<()> + Send + Sync;

/// A deferred action with no backstack effect of its own.
///
/// Side effects run after the operation that carried them has been
/// committed, in the order they appear in the aggregate.
#[derive(Clone)]
pub struct SideEffect {
    label: String,
    block: Arc<SideEffectFn>,
}

impl SideEffect {
    pub fn new<F>(label: impl Into<String>, block: F) -> Self
    where
        F: Fn(&mut NavigationRuntime) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            block: Arc::new(block),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn run(&self, runtime: &mut NavigationRuntime) -> Result<()> {
        tracing::debug!(side_effect = %self.label, "Running side effect");
        (self.block)(runtime)
    }
}

impl fmt::Debug for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SideEffect").field(&self.label).finish()
    }
}

/// A requested navigation state change.
#[derive(Debug, Clone)]
pub enum NavigationOperation {
    /// Add an instance to the target container's backstack.
    Open(NavigationKeyInstance),
    /// Remove an instance from whichever container holds it.
    Close(NavigationKeyInstance),
    /// Close an instance and deliver a result to whoever awaits it.
    Complete {
        instance: NavigationKeyInstance,
        result: serde_json::Value,
    },
    SideEffect(SideEffect),
    /// An ordered batch that is intercepted and committed as a unit.
    Aggregate(Vec<NavigationOperation>),
}

impl NavigationOperation {
    pub fn open(instance: NavigationKeyInstance) -> Self {
        Self::Open(instance)
    }

    pub fn close(instance: NavigationKeyInstance) -> Self {
        Self::Close(instance)
    }

    pub fn complete<T: Serialize>(instance: NavigationKeyInstance, result: &T) -> Result<Self> {
        Ok(Self::Complete {
            instance,
            result: serde_json::to_value(result)?,
        })
    }

    pub fn side_effect<F>(label: impl Into<String>, block: F) -> Self
    where
        F: Fn(&mut NavigationRuntime) -> Result<()> + Send + Sync + 'static,
    {
        Self::SideEffect(SideEffect::new(label, block))
    }

    pub fn aggregate(operations: impl IntoIterator<Item = NavigationOperation>) -> Self {
        Self::Aggregate(operations.into_iter().collect())
    }

    /// The aggregate that turns `current` into `target`: closes for entries
    /// that disappear (top first), then opens for entries that are new.
    pub fn set_backstack(
        current: &[NavigationKeyInstance],
        target: Vec<NavigationKeyInstance>,
    ) -> Self {
        let closes = current
            .iter()
            .rev()
            .filter(|c| !target.iter().any(|t| t.id == c.id))
            .cloned()
            .map(Self::Close);
        let opens = target
            .iter()
            .filter(|t| !current.iter().any(|c| c.id == t.id))
            .cloned()
            .map(Self::Open);
        Self::Aggregate(closes.chain(opens).collect())
    }

    /// Flatten into leaf operations, inlining nested aggregates in order.
    pub fn into_children(self) -> Vec<NavigationOperation> {
        let mut queue = VecDeque::from([self]);
        let mut leaves = Vec::new();
        while let Some(op) = queue.pop_front() {
            match op {
                Self::Aggregate(children) => {
                    for child in children.into_iter().rev() {
                        queue.push_front(child);
                    }
                }
                leaf => leaves.push(leaf),
            }
        }
        leaves
    }

    /// Wrap a leaf in a single-element aggregate; aggregates are flattened.
    pub fn into_aggregate(self) -> Self {
        Self::Aggregate(self.into_children())
    }

    pub fn instance(&self) -> Option<&NavigationKeyInstance> {
        match self {
            Self::Open(instance) | Self::Close(instance) => Some(instance),
            Self::Complete { instance, .. } => Some(instance),
            Self::SideEffect(_) | Self::Aggregate(_) => None,
        }
    }

    pub fn instance_mut(&mut self) -> Option<&mut NavigationKeyInstance> {
        match self {
            Self::Open(instance) | Self::Close(instance) => Some(instance),
            Self::Complete { instance, .. } => Some(instance),
            Self::SideEffect(_) | Self::Aggregate(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Close(_) => "close",
            Self::Complete { .. } => "complete",
            Self::SideEffect(_) => "side_effect",
            Self::Aggregate(_) => "aggregate",
        }
    }
}
