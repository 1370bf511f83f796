//! Navigation interceptor trait, outcome type, and the aggregate chain.

use std::sync::Arc;

use enro_types::{ContainerKey, ContextId, NavigationKeyInstance};

use crate::context::ContextTree;
use crate::controller::EnroController;
use crate::operation::{NavigationOperation, SideEffect};

// ---------------------------------------------------------------------------
// InterceptOutcome
// ---------------------------------------------------------------------------

/// What an interceptor decided to do with an operation.
#[derive(Debug, Clone)]
pub enum InterceptOutcome {
    /// Pass the (possibly rewritten) operation to the next interceptor.
    Continue(NavigationOperation),
    /// Substitute the operation and skip the remaining interceptors for it.
    Replaced(NavigationOperation),
    /// Abort the whole in-flight operation; nothing is committed.
    Cancelled,
    /// Abort, then run the side effect.
    CancelAnd(SideEffect),
}

impl InterceptOutcome {
    /// Replace the operation with the aggregate that turns `current` into `target`.
    pub fn replace_backstack(
        current: &[NavigationKeyInstance],
        target: Vec<NavigationKeyInstance>,
    ) -> Self {
        Self::Replaced(NavigationOperation::set_backstack(current, target))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::CancelAnd(_))
    }
}

// ---------------------------------------------------------------------------
// InterceptContext
// ---------------------------------------------------------------------------

/// Read-only view handed to interceptors.
pub struct InterceptContext<'a> {
    /// The context that requested the operation.
    pub from: ContextId,
    /// The container the operation is executing in.
    pub container: ContextId,
    pub tree: &'a ContextTree,
    pub controller: &'a EnroController,
}

impl InterceptContext<'_> {
    pub fn container_key(&self) -> Option<&ContainerKey> {
        self.tree.container(self.container).ok().map(|c| &c.key)
    }

    /// Key of the container that is currently active next to the target
    /// container, i.e. the active child of the target container's parent.
    pub fn active_sibling_container(&self) -> Option<&ContainerKey> {
        let parent = self.tree.parent(self.container)?;
        let active = self.tree.active_child(parent)?;
        self.tree.container(active).ok().map(|c| &c.key)
    }
}

// ---------------------------------------------------------------------------
// NavigationInterceptor trait
// ---------------------------------------------------------------------------

pub trait NavigationInterceptor: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Sees the whole aggregate before any per-operation dispatch.
    fn before_intercept(
        &self,
        _ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        InterceptOutcome::Continue(operation)
    }

    /// Called once per Open, Close and Complete of the aggregate.
    fn intercept(
        &self,
        _ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        InterceptOutcome::Continue(operation)
    }
}

// ---------------------------------------------------------------------------
// FnInterceptor
// ---------------------------------------------------------------------------

type InterceptFn =
    dyn Fn(&InterceptContext<'_>, NavigationOperation) -> InterceptOutcome + Send + Sync;

/// An interceptor built from closures.
pub struct FnInterceptor {
    name: String,
    before: Option<Box<InterceptFn>>,
    intercept: Option<Box<InterceptFn>>,
}

impl FnInterceptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: None,
            intercept: None,
        }
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&InterceptContext<'_>, NavigationOperation) -> InterceptOutcome
            + Send
            + Sync
            + 'static,
    {
        self.before = Some(Box::new(f));
        self
    }

    pub fn on_operation<F>(mut self, f: F) -> Self
    where
        F: Fn(&InterceptContext<'_>, NavigationOperation) -> InterceptOutcome
            + Send
            + Sync
            + 'static,
    {
        self.intercept = Some(Box::new(f));
        self
    }

    /// Only Opens reach `f`; everything else passes through.
    pub fn on_open<F>(self, f: F) -> Self
    where
        F: Fn(&InterceptContext<'_>, NavigationKeyInstance) -> InterceptOutcome
            + Send
            + Sync
            + 'static,
    {
        self.on_operation(move |ctx, operation| match operation {
            NavigationOperation::Open(instance) => f(ctx, instance),
            other => InterceptOutcome::Continue(other),
        })
    }
}

impl NavigationInterceptor for FnInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_intercept(
        &self,
        ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        match &self.before {
            Some(f) => f(ctx, operation),
            None => InterceptOutcome::Continue(operation),
        }
    }

    fn intercept(
        &self,
        ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        match &self.intercept {
            Some(f) => f(ctx, operation),
            None => InterceptOutcome::Continue(operation),
        }
    }
}

// ---------------------------------------------------------------------------
// AggregateInterceptor
// ---------------------------------------------------------------------------

/// An ordered chain of interceptors applied as one.
#[derive(Clone, Default)]
pub struct AggregateInterceptor {
    interceptors: Vec<Arc<dyn NavigationInterceptor>>,
}

impl AggregateInterceptor {
    pub fn new(interceptors: Vec<Arc<dyn NavigationInterceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Fold `operation` through the chain.
    ///
    /// Every interceptor's `before_intercept` sees the whole aggregate first,
    /// in order. Then each Open/Close/Complete is folded through every
    /// interceptor's `intercept`. Side effects pass straight through. Any
    /// cancellation aborts the whole aggregate. On success the result is
    /// always a flat `Aggregate`.
    pub fn process(
        &self,
        ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        let mut aggregate = operation.into_aggregate();
        for interceptor in &self.interceptors {
            match interceptor.before_intercept(ctx, aggregate) {
                InterceptOutcome::Continue(next) | InterceptOutcome::Replaced(next) => {
                    aggregate = next.into_aggregate();
                }
                cancelled => {
                    tracing::debug!(interceptor = interceptor.name(), "Cancelled before intercept");
                    return cancelled;
                }
            }
        }

        let mut committed = Vec::new();
        for child in aggregate.into_children() {
            if matches!(child, NavigationOperation::SideEffect(_)) {
                committed.push(child);
                continue;
            }
            match self.intercept_one(ctx, child) {
                InterceptOutcome::Continue(op) | InterceptOutcome::Replaced(op) => {
                    committed.extend(op.into_children());
                }
                cancelled => return cancelled,
            }
        }
        InterceptOutcome::Continue(NavigationOperation::Aggregate(committed))
    }

    fn intercept_one(
        &self,
        ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        let mut current = operation;
        for interceptor in &self.interceptors {
            match interceptor.intercept(ctx, current) {
                InterceptOutcome::Continue(next) => current = next,
                InterceptOutcome::Replaced(next) => return InterceptOutcome::Replaced(next),
                cancelled => {
                    tracing::debug!(interceptor = interceptor.name(), "Cancelled operation");
                    return cancelled;
                }
            }
        }
        InterceptOutcome::Continue(current)
    }
}
