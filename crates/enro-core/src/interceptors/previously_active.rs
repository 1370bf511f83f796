use crate::interceptor::{InterceptContext, InterceptOutcome, NavigationInterceptor};
use crate::operation::{NavigationOperation, SideEffect};

/// Remembers which sibling container was active when an instance was opened,
/// and makes it active again once that instance closes.
///
/// Lets a "details" container opened over a "tabs" container hand focus back
/// to the tabs on close.
pub struct PreviouslyActiveContainerInterceptor;

impl NavigationInterceptor for PreviouslyActiveContainerInterceptor {
    fn name(&self) -> &str {
        "previously-active"
    }

    fn before_intercept(
        &self,
        ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        let mut children = operation.into_children();
        let reactivations: Vec<_> = children
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    NavigationOperation::Close(_) | NavigationOperation::Complete { .. }
                )
            })
            .filter_map(|op| op.instance())
            .filter_map(|instance| {
                // The stored instance carries the stamp even if the caller's copy does not.
                ctx.tree
                    .instance(instance.id)
                    .unwrap_or(instance)
                    .metadata
                    .previously_active_container
                    .clone()
            })
            .map(|key| {
                NavigationOperation::SideEffect(SideEffect::new(
                    format!("reactivate {}", key),
                    move |runtime| {
                        if runtime.tree().find_container(&key).is_none() {
                            tracing::debug!(
                                container = %key,
                                "Previously active container is gone"
                            );
                            return Ok(());
                        }
                        runtime.set_active_container(&key)
                    },
                ))
            })
            .collect();
        children.extend(reactivations);
        InterceptOutcome::Continue(NavigationOperation::Aggregate(children))
    }

    fn intercept(
        &self,
        ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        match operation {
            NavigationOperation::Open(mut instance)
                if instance.metadata.previously_active_container.is_none() =>
            {
                instance.metadata.previously_active_container =
                    ctx.active_sibling_container().cloned();
                InterceptOutcome::Continue(NavigationOperation::Open(instance))
            }
            other => InterceptOutcome::Continue(other),
        }
    }
}
