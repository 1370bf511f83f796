//! Navigation event system for observability.
//!
//! Emits [`NavigationEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! hosts, loggers and test harnesses can follow what the runtime commits
//! without coupling to its internals.

use serde::{Deserialize, Serialize};

use enro_types::{ContainerKey, InstanceId, ResultId};

/// Events emitted while executing navigation operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NavigationEvent {
    OperationCancelled {
        container: ContainerKey,
        operation: String,
    },
    BackstackUpdated {
        container: ContainerKey,
        previous: Vec<InstanceId>,
        current: Vec<InstanceId>,
        /// `merge(previous, current)`, the order hosts should animate in.
        merged: Vec<InstanceId>,
    },
    DestinationCreated {
        container: ContainerKey,
        instance: InstanceId,
        key_type: String,
    },
    DestinationDestroyed {
        instance: InstanceId,
        key_type: String,
    },
    ActiveChanged {
        root: String,
        instance: Option<InstanceId>,
    },
    RootRedirected {
        instance: InstanceId,
        key_type: String,
    },
    ResultBuffered {
        result_id: ResultId,
    },
    ResultDelivered {
        result_id: ResultId,
    },
    ResultDropped {
        result_id: ResultId,
        reason: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<NavigationEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: NavigationEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<NavigationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
