use crate::interceptor::{InterceptContext, InterceptOutcome, NavigationInterceptor};
use crate::operation::{NavigationOperation, SideEffect};

/// Redirects opens of root-hosted keys to the controller's root handler.
///
/// Instances are flagged `opened_in_root` before they are handed over, so
/// when the host opens them inside the new root they pass through untouched.
pub struct RootDestinationInterceptor;

impl NavigationInterceptor for RootDestinationInterceptor {
    fn name(&self) -> &str {
        "root"
    }

    fn before_intercept(
        &self,
        ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        let mut kept = Vec::new();
        let mut redirects = Vec::new();
        for child in operation.into_children() {
            match child {
                NavigationOperation::Open(instance)
                    if !instance.metadata.opened_in_root
                        && ctx
                            .controller
                            .bindings()
                            .get(instance.key_type())
                            .is_some_and(|b| b.is_root()) =>
                {
                    let label = format!("open {} in root", instance.key_type());
                    redirects.push(NavigationOperation::SideEffect(SideEffect::new(
                        label,
                        move |runtime| runtime.open_in_root(instance.clone()),
                    )));
                }
                other => kept.push(other),
            }
        }
        kept.extend(redirects);
        InterceptOutcome::Continue(NavigationOperation::Aggregate(kept))
    }
}
