//! Interceptors the controller always appends after user interceptors.

pub mod previously_active;
pub mod root;
pub mod synthetic;

use std::sync::Arc;

use crate::interceptor::NavigationInterceptor;

pub use previously_active::PreviouslyActiveContainerInterceptor;
pub use root::RootDestinationInterceptor;
pub use synthetic::{SyntheticDestination, SyntheticDestinationInterceptor, SyntheticScope};

/// System interceptors in priority order.
pub fn system_interceptors() -> Vec<Arc<dyn NavigationInterceptor>> {
    vec![
        Arc::new(SyntheticDestinationInterceptor),
        Arc::new(RootDestinationInterceptor),
        Arc::new(PreviouslyActiveContainerInterceptor),
    ]
}
