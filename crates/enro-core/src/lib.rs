//! Navigation operation pipeline, context tree, and result channels.
//!
//! This crate implements the Enro navigation core: the operation model,
//! interceptor chain with its system interceptors, backstack merge, the
//! root/container/destination context tree, result delivery, and the
//! controller and runtime that tie them together.

pub mod binding;
pub mod context;
pub mod controller;
pub mod events;
pub mod flow;
pub mod handle;
pub mod interceptor;
pub mod interceptors;
pub mod merge;
pub mod operation;
pub mod results;
pub mod runtime;
pub mod saved_state;

pub use binding::{BindingHost, BindingRegistry, NavigationBinding};
pub use context::{
    ContainerContext, ContainerFilter, ContextKind, ContextNode, ContextTree, DestinationContext,
    Lifecycle, RootContext,
};
pub use controller::{
    ControllerBuilder, ControllerConfig, EnroController, NavigationPlugin, PluginSet,
    RecordingRootHandler, RootNavigationHandler,
};
pub use events::{EventEmitter, NavigationEvent};
pub use flow::{shared, NavigationFlow, SharedRuntime};
pub use handle::NavigationHandle;
pub use interceptor::{
    AggregateInterceptor, FnInterceptor, InterceptContext, InterceptOutcome, NavigationInterceptor,
};
pub use interceptors::{system_interceptors, SyntheticDestination, SyntheticScope};
pub use merge::{merge, merge_instances, removed_in_order};
pub use operation::{NavigationOperation, SideEffect};
pub use results::{NavigationResult, PendingResult, ResultChannel, ResultRegistry};
pub use runtime::{ExecuteOutcome, NavigationRuntime};
pub use saved_state::{
    clear_snapshot, load_snapshot, save_snapshot, ContainerSnapshot, NavigationSnapshot,
};
