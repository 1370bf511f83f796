//! End-to-end tests for the Enro navigation core.
//!
//! Each test builds a controller and runtime, drives it the way a host and
//! its destinations would, and checks the resulting tree, events, and results.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use enro_core::{
    merge, BindingHost, ContainerFilter, ControllerConfig, EnroController, ExecuteOutcome,
    FnInterceptor, InterceptOutcome, Lifecycle, NavigationBinding, NavigationEvent,
    NavigationFlow, NavigationInterceptor, NavigationOperation, NavigationPlugin,
    NavigationResult, NavigationRuntime, RecordingRootHandler,
};
use enro_types::{
    AnyKey, ContainerKey, ContextId, EnroError, InstanceId, NavigationKey,
    NavigationKeyInstance, SupportsPresent, SupportsPush, WithResult,
};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Home;
impl NavigationKey for Home {
    const KEY_TYPE: &'static str = "Home";
}
impl SupportsPush for Home {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Detail {
    item: u32,
}
impl NavigationKey for Detail {
    const KEY_TYPE: &'static str = "Detail";
}
impl SupportsPush for Detail {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GetName;
impl NavigationKey for GetName {
    const KEY_TYPE: &'static str = "GetName";
}
impl SupportsPush for GetName {}
impl WithResult for GetName {
    type Result = String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Confirm {
    message: String,
}
impl NavigationKey for Confirm {
    const KEY_TYPE: &'static str = "Confirm";
}
impl SupportsPush for Confirm {}
impl WithResult for Confirm {
    type Result = bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NameOrDefault;
impl NavigationKey for NameOrDefault {
    const KEY_TYPE: &'static str = "NameOrDefault";
}
impl SupportsPush for NameOrDefault {}
impl WithResult for NameOrDefault {
    type Result = String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Login;
impl NavigationKey for Login {
    const KEY_TYPE: &'static str = "Login";
}
impl SupportsPresent for Login {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TabPage {
    tab: String,
}
impl NavigationKey for TabPage {
    const KEY_TYPE: &'static str = "TabPage";
}
impl SupportsPush for TabPage {}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bindings() -> Vec<NavigationBinding> {
    vec![
        NavigationBinding::destination::<Home>(),
        NavigationBinding::destination::<Detail>(),
        NavigationBinding::destination::<GetName>(),
        NavigationBinding::destination::<TabPage>(),
        NavigationBinding::dynamic("Wrapped", BindingHost::Container),
        NavigationBinding::root::<Login>(),
        NavigationBinding::synthetic::<Confirm, _>(|scope| {
            let confirm: Confirm = scope.key()?;
            scope.complete(&!confirm.message.is_empty())
        }),
        NavigationBinding::synthetic::<NameOrDefault, _>(|scope| {
            let forward = NavigationKeyInstance::push(&GetName)?;
            scope.forward_result(forward)?;
            Ok(())
        }),
    ]
}

fn controller_with(
    configure: impl FnOnce(enro_core::ControllerBuilder) -> enro_core::ControllerBuilder,
) -> Arc<EnroController> {
    let mut builder = EnroController::builder();
    for binding in bindings() {
        builder = builder.binding(binding);
    }
    Arc::new(configure(builder).build().expect("controller build failed"))
}

/// A runtime with one root and a `main` container, plus the root id.
fn app_with(controller: Arc<EnroController>) -> (NavigationRuntime, ContextId) {
    let mut runtime = NavigationRuntime::new(controller);
    let root = runtime.create_root("window");
    runtime
        .add_container(root, ContainerKey::new("main"), ContainerFilter::All)
        .unwrap();
    (runtime, root)
}

fn app() -> (NavigationRuntime, ContextId) {
    app_with(controller_with(|b| b))
}

fn leaf(runtime: &NavigationRuntime, root: ContextId) -> ContextId {
    runtime.tree().active_leaf(root).expect("no active leaf")
}

fn leaf_type(runtime: &NavigationRuntime, root: ContextId) -> String {
    let ctx = leaf(runtime, root);
    runtime
        .tree()
        .destination(ctx)
        .unwrap()
        .instance
        .key_type()
        .to_string()
}

fn backstack_types(runtime: &NavigationRuntime, key: &str) -> Vec<String> {
    let container = runtime.tree().find_container(&ContainerKey::new(key)).unwrap();
    runtime
        .tree()
        .container(container)
        .unwrap()
        .backstack()
        .iter()
        .map(|i| i.key_type().to_string())
        .collect()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<NavigationEvent>) -> Vec<NavigationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnMut(T) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |value| sink.lock().unwrap().push(value))
}

fn assert_single_active_leaf(runtime: &NavigationRuntime, root: ContextId) {
    let active: Vec<ContextId> = runtime
        .tree()
        .find_all_destinations(root)
        .into_iter()
        .filter(|d| runtime.tree().is_active_in_root(*d))
        .collect();
    assert!(active.len() <= 1, "more than one active leaf: {:?}", active);
    assert_eq!(active.first().copied(), runtime.tree().active_leaf(root));
}

// ---------------------------------------------------------------------------
// Backstack merge
// ---------------------------------------------------------------------------

#[test]
fn merge_keeps_survivor_order_and_places_removed_after_predecessor() {
    let old = ["a", "b", "c", "d"];
    let new = ["d", "a", "e"];
    let merged = merge(&old, &new, |s| *s);
    assert_eq!(merged, vec!["d", "a", "b", "c", "e"]);

    let survivors: Vec<_> = merged.iter().filter(|s| new.contains(*s)).copied().collect();
    assert_eq!(survivors, new);
}

#[test]
fn merge_of_identical_lists_is_identity() {
    let old = ["home", "list", "detail"];
    assert_eq!(merge(&old, &old, |s| *s), old);
}

#[test]
fn replacing_the_backstack_tears_down_in_merged_order() {
    let (mut runtime, root) = app();
    let main = runtime.tree().find_container(&ContainerKey::new("main")).unwrap();
    let a = NavigationKeyInstance::push(&Home).unwrap();
    let b = NavigationKeyInstance::push(&Detail { item: 1 }).unwrap();
    let c = NavigationKeyInstance::push(&Detail { item: 2 }).unwrap();
    let d = NavigationKeyInstance::push(&Detail { item: 3 }).unwrap();
    runtime
        .execute(
            root,
            main,
            NavigationOperation::aggregate([
                NavigationOperation::open(a.clone()),
                NavigationOperation::open(b.clone()),
                NavigationOperation::open(c.clone()),
            ]),
        )
        .unwrap();

    let mut rx = runtime.subscribe();
    let current = runtime.tree().container(main).unwrap().backstack().to_vec();
    runtime
        .execute(
            root,
            main,
            NavigationOperation::set_backstack(&current, vec![a.clone(), d.clone()]),
        )
        .unwrap();

    let events = drain(&mut rx);
    let destroyed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            NavigationEvent::DestinationDestroyed { instance, .. } => Some(*instance),
            _ => None,
        })
        .collect();
    assert_eq!(destroyed, vec![b.id, c.id]);

    let merged = events
        .iter()
        .find_map(|e| match e {
            NavigationEvent::BackstackUpdated { merged, .. } => Some(merged.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(merged, vec![a.id, b.id, c.id, d.id]);
    assert_eq!(runtime.tree().container(main).unwrap().backstack_ids(), vec![a.id, d.id]);
}

fn created_and_destroyed(events: &[NavigationEvent]) -> (Vec<InstanceId>, Vec<InstanceId>) {
    let mut created = Vec::new();
    let mut destroyed = Vec::new();
    for event in events {
        match event {
            NavigationEvent::DestinationCreated { instance, .. } => created.push(*instance),
            NavigationEvent::DestinationDestroyed { instance, .. } => destroyed.push(*instance),
            _ => {}
        }
    }
    (created, destroyed)
}

#[test]
fn open_then_close_in_one_aggregate_leaves_the_backstack_alone() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    let main = runtime.tree().find_container(&ContainerKey::new("main")).unwrap();
    let detail = NavigationKeyInstance::push(&Detail { item: 4 }).unwrap();

    let mut rx = runtime.subscribe();
    let outcome = runtime
        .execute(
            root,
            main,
            NavigationOperation::aggregate([
                NavigationOperation::open(detail.clone()),
                NavigationOperation::close(detail.clone()),
            ]),
        )
        .unwrap();

    assert_eq!(outcome, ExecuteOutcome::Committed);
    assert_eq!(backstack_types(&runtime, "main"), vec!["Home"]);
    assert!(runtime.tree().instance(detail.id).is_none());
    assert_eq!(leaf_type(&runtime, root), "Home");
    let (created, destroyed) = created_and_destroyed(&drain(&mut rx));
    assert!(created.is_empty(), "unexpected creations: {:?}", created);
    assert!(destroyed.is_empty(), "unexpected teardown: {:?}", destroyed);
}

#[test]
fn close_and_reopen_moves_an_instance_between_containers() {
    let (mut runtime, root) = app();
    let details = runtime
        .add_container(root, ContainerKey::new("details"), ContainerFilter::only(["Detail"]))
        .unwrap();
    runtime.push(root, &Home).unwrap();
    let main = runtime.tree().find_container(&ContainerKey::new("main")).unwrap();
    let detail = NavigationKeyInstance::push(&Detail { item: 9 }).unwrap();
    runtime
        .execute(root, main, NavigationOperation::open(detail.clone()))
        .unwrap();
    assert_eq!(backstack_types(&runtime, "main"), vec!["Home", "Detail"]);

    let mut rx = runtime.subscribe();
    runtime
        .execute(
            root,
            details,
            NavigationOperation::aggregate([
                NavigationOperation::close(detail.clone()),
                NavigationOperation::open(detail.clone()),
            ]),
        )
        .unwrap();

    assert_eq!(backstack_types(&runtime, "main"), vec!["Home"]);
    assert_eq!(backstack_types(&runtime, "details"), vec!["Detail"]);
    let (created, destroyed) = created_and_destroyed(&drain(&mut rx));
    assert_eq!(created, vec![detail.id]);
    assert_eq!(destroyed, vec![detail.id]);
    let holder = runtime.tree().container_holding(detail.id);
    assert_eq!(holder, Some(details));
}

#[test]
fn opening_the_same_instance_twice_in_one_aggregate_fails() {
    let (mut runtime, root) = app();
    let main = runtime.tree().find_container(&ContainerKey::new("main")).unwrap();
    let detail = NavigationKeyInstance::push(&Detail { item: 2 }).unwrap();
    let err = runtime
        .execute(
            root,
            main,
            NavigationOperation::aggregate([
                NavigationOperation::open(detail.clone()),
                NavigationOperation::open(detail.clone()),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, EnroError::DuplicateInstance { instance } if instance == detail.id));
    assert!(backstack_types(&runtime, "main").is_empty());
}

// ---------------------------------------------------------------------------
// Interceptors
// ---------------------------------------------------------------------------

fn stamp() -> Arc<dyn NavigationInterceptor> {
    Arc::new(FnInterceptor::new("stamp").on_open(|_, mut instance| {
        if instance.key_type() == "Detail" {
            instance.metadata.set_extra("stamped", json!(true));
        }
        InterceptOutcome::Continue(NavigationOperation::Open(instance))
    }))
}

fn wrap() -> Arc<dyn NavigationInterceptor> {
    Arc::new(FnInterceptor::new("wrap").on_open(|_, instance| {
        if instance.key_type() != "Detail" {
            return InterceptOutcome::Continue(NavigationOperation::Open(instance));
        }
        let mut wrapped = NavigationKeyInstance::from_any(
            AnyKey::new("Wrapped", json!({ "inner": instance.key.payload })),
            instance.direction,
        );
        wrapped.id = instance.id;
        wrapped.metadata = instance.metadata;
        InterceptOutcome::Continue(NavigationOperation::Open(wrapped))
    }))
}

fn top_after_detail(interceptors: Vec<Arc<dyn NavigationInterceptor>>) -> NavigationKeyInstance {
    let controller = controller_with(move |mut builder| {
        for interceptor in interceptors {
            builder = builder.interceptor(interceptor);
        }
        builder
    });
    let (mut runtime, root) = app_with(controller);
    runtime.push(root, &Detail { item: 9 }).unwrap();
    let ctx = leaf(&runtime, root);
    runtime.tree().destination(ctx).unwrap().instance.clone()
}

#[test]
fn interceptor_order_is_deterministic_and_matters() {
    let stamped_then_wrapped = top_after_detail(vec![stamp(), wrap()]);
    let again = top_after_detail(vec![stamp(), wrap()]);
    assert_eq!(stamped_then_wrapped.key, again.key);
    assert_eq!(stamped_then_wrapped.metadata.extras, again.metadata.extras);

    let wrapped_then_stamped = top_after_detail(vec![wrap(), stamp()]);

    assert_eq!(stamped_then_wrapped.key_type(), "Wrapped");
    assert_eq!(wrapped_then_stamped.key_type(), "Wrapped");
    assert_eq!(stamped_then_wrapped.metadata.extra("stamped"), Some(&json!(true)));
    assert_eq!(wrapped_then_stamped.metadata.extra("stamped"), None);
}

#[test]
fn cancelled_close_leaves_backstack_unchanged() {
    let guard: Arc<dyn NavigationInterceptor> = Arc::new(
        FnInterceptor::new("unsaved-changes").on_operation(|_, op| match op {
            NavigationOperation::Close(ref instance) if instance.key_type() == "Detail" => {
                InterceptOutcome::Cancelled
            }
            other => InterceptOutcome::Continue(other),
        }),
    );
    let (mut runtime, root) = app_with(controller_with(|b| b.interceptor(guard)));
    runtime.push(root, &Home).unwrap();
    runtime.push(root, &Detail { item: 1 }).unwrap();
    let before = runtime.tree().get_debug_string(root);

    assert_eq!(runtime.handle_back(root).unwrap(), ExecuteOutcome::Cancelled);
    assert_eq!(runtime.tree().get_debug_string(root), before);

    // One cancelled child cancels the whole aggregate.
    let main = runtime.tree().find_container(&ContainerKey::new("main")).unwrap();
    let current = runtime.tree().container(main).unwrap().backstack().to_vec();
    let outcome = runtime
        .execute(
            root,
            main,
            NavigationOperation::set_backstack(
                &current,
                vec![NavigationKeyInstance::push(&Home).unwrap()],
            ),
        )
        .unwrap();
    assert_eq!(outcome, ExecuteOutcome::Cancelled);
    assert_eq!(backstack_types(&runtime, "main"), vec!["Home", "Detail"]);
}

#[test]
fn container_interceptor_can_redirect_an_open() {
    let (mut runtime, root) = app();
    let main = runtime.tree().find_container(&ContainerKey::new("main")).unwrap();
    runtime
        .add_container_interceptor(
            main,
            Arc::new(FnInterceptor::new("detail-needs-home").on_open(|ctx, instance| {
                let empty = ctx.tree.container(ctx.container).map(|c| c.backstack().is_empty());
                if instance.key_type() == "Detail" && empty.unwrap_or(false) {
                    let home = NavigationKeyInstance::push(&Home).expect("home key");
                    InterceptOutcome::Replaced(NavigationOperation::aggregate([
                        NavigationOperation::open(home),
                        NavigationOperation::open(instance),
                    ]))
                } else {
                    InterceptOutcome::Continue(NavigationOperation::Open(instance))
                }
            })),
        )
        .unwrap();

    runtime.push(root, &Detail { item: 5 }).unwrap();
    assert_eq!(backstack_types(&runtime, "main"), vec!["Home", "Detail"]);
}

// ---------------------------------------------------------------------------
// Context tree
// ---------------------------------------------------------------------------

#[test]
fn at_most_one_active_leaf_through_tab_switches() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    assert_single_active_leaf(&runtime, root);

    let home = leaf(&runtime, root);
    let tab_a = runtime
        .add_container(home, ContainerKey::new("tab-a"), ContainerFilter::only(["TabPage"]))
        .unwrap();
    let tab_b = runtime
        .add_container(home, ContainerKey::new("tab-b"), ContainerFilter::only(["TabPage"]))
        .unwrap();
    assert_single_active_leaf(&runtime, root);

    let page_a = NavigationKeyInstance::push(&TabPage { tab: "a".into() }).unwrap();
    let page_b = NavigationKeyInstance::push(&TabPage { tab: "b".into() }).unwrap();
    runtime
        .execute(home, tab_a, NavigationOperation::open(page_a))
        .unwrap();
    runtime
        .execute(home, tab_b, NavigationOperation::open(page_b))
        .unwrap();
    assert_single_active_leaf(&runtime, root);
    let page: TabPage = runtime
        .tree()
        .destination(leaf(&runtime, root))
        .unwrap()
        .instance
        .key()
        .unwrap();
    assert_eq!(page.tab, "b");

    runtime.set_active_container(&ContainerKey::new("tab-a")).unwrap();
    assert_single_active_leaf(&runtime, root);
    let page: TabPage = runtime
        .tree()
        .destination(leaf(&runtime, root))
        .unwrap()
        .instance
        .key()
        .unwrap();
    assert_eq!(page.tab, "a");

    // Detail is rejected by the tabs and lands in main, above Home.
    runtime.push(leaf(&runtime, root), &Detail { item: 2 }).unwrap();
    assert_single_active_leaf(&runtime, root);
    assert_eq!(leaf_type(&runtime, root), "Detail");
    let tab_page = runtime.tree().children(tab_a)[0];
    assert_eq!(
        runtime.tree().destination(tab_page).unwrap().lifecycle,
        Lifecycle::Created
    );

    runtime.handle_back(root).unwrap();
    assert_single_active_leaf(&runtime, root);
    assert_eq!(leaf(&runtime, root), tab_page);
    assert_eq!(
        runtime.tree().destination(tab_page).unwrap().lifecycle,
        Lifecycle::Resumed
    );
}

#[test]
fn closing_a_detail_reactivates_the_previous_container() {
    let (mut runtime, root) = app();
    let details = runtime
        .add_container(root, ContainerKey::new("details"), ContainerFilter::only(["Detail"]))
        .unwrap();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);

    let detail = NavigationKeyInstance::push(&Detail { item: 7 }).unwrap();
    runtime
        .execute(home, details, NavigationOperation::open(detail.clone()))
        .unwrap();
    assert_eq!(leaf_type(&runtime, root), "Detail");
    let stored = runtime.tree().instance(detail.id).unwrap();
    assert_eq!(
        stored.metadata.previously_active_container,
        Some(ContainerKey::new("main"))
    );

    runtime.handle_back(root).unwrap();
    assert_eq!(leaf(&runtime, root), home);
}

#[test]
fn host_destroying_a_detail_reactivates_the_previous_container() {
    let (mut runtime, root) = app();
    let details = runtime
        .add_container(root, ContainerKey::new("details"), ContainerFilter::only(["Detail"]))
        .unwrap();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    runtime
        .execute(
            home,
            details,
            NavigationOperation::open(NavigationKeyInstance::push(&Detail { item: 3 }).unwrap()),
        )
        .unwrap();
    let detail = leaf(&runtime, root);
    assert_ne!(detail, home);

    runtime.set_lifecycle(detail, Lifecycle::Destroyed).unwrap();
    assert!(backstack_types(&runtime, "details").is_empty());
    assert_eq!(runtime.tree().active_leaf(root), Some(home));
    assert_single_active_leaf(&runtime, root);
}

#[test]
fn open_without_a_binding_names_the_key_type() {
    let (mut runtime, root) = app();
    let unknown = NavigationKeyInstance::from_any(
        AnyKey::new("Unknown", serde_json::Value::Null),
        enro_types::NavigationDirection::Push,
    );
    let err = runtime.open(root, unknown).unwrap_err();
    assert!(err.is_configuration_error());
    assert_eq!(err.key_type(), Some("Unknown"));
}

#[test]
fn no_container_for_a_filtered_key() {
    let controller = controller_with(|b| b);
    let mut runtime = NavigationRuntime::new(controller);
    let root = runtime.create_root("window");
    runtime
        .add_container(root, ContainerKey::new("only-home"), ContainerFilter::only(["Home"]))
        .unwrap();
    let err = runtime.push(root, &Detail { item: 1 }).unwrap_err();
    assert!(matches!(
        err,
        EnroError::NoContainerFor { ref key_type, from } if key_type == "Detail" && from == root
    ));
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[test]
fn result_round_trip_delivers_exactly_once() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);

    let (received, callback) = recorder::<NavigationResult<String>>();
    let channel = runtime
        .register_result_channel::<GetName, _>(home, "name", callback)
        .unwrap();
    channel.push(&mut runtime, &GetName).unwrap();
    assert_eq!(leaf_type(&runtime, root), "GetName");

    let handle = runtime.handle_for(leaf(&runtime, root)).unwrap();
    assert_eq!(
        handle.complete_for::<GetName>(&mut runtime, &"John Doe".to_string()).unwrap(),
        ExecuteOutcome::Committed
    );
    assert_eq!(
        handle.complete(&mut runtime, &"Jane").unwrap(),
        ExecuteOutcome::Ignored
    );

    assert_eq!(
        *received.lock().unwrap(),
        vec![NavigationResult::Completed("John Doe".to_string())]
    );
    assert!(!runtime.results().has_pending(channel.id()));
    assert_eq!(leaf(&runtime, root), home);
}

#[test]
fn closing_instead_of_completing_reports_closed() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    let (received, callback) = recorder::<NavigationResult<String>>();
    let channel = runtime
        .register_result_channel::<GetName, _>(home, "name", callback)
        .unwrap();
    channel.push(&mut runtime, &GetName).unwrap();

    runtime.handle_back(root).unwrap();
    assert_eq!(*received.lock().unwrap(), vec![NavigationResult::Closed]);
}

#[test]
fn results_wait_for_the_owner_to_start() {
    let config = ControllerConfig {
        manage_lifecycle: false,
        ..ControllerConfig::default()
    };
    let (mut runtime, root) = app_with(controller_with(|b| b.config(config)));
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    let (received, callback) = recorder::<NavigationResult<String>>();
    let channel = runtime
        .register_result_channel::<GetName, _>(home, "name", callback)
        .unwrap();
    channel.push(&mut runtime, &GetName).unwrap();
    runtime
        .complete(leaf(&runtime, root), &"John Doe")
        .unwrap();

    assert!(received.lock().unwrap().is_empty());
    assert!(runtime.results().has_pending(channel.id()));

    runtime.set_lifecycle(home, Lifecycle::Started).unwrap();
    assert_eq!(received.lock().unwrap().len(), 1);
    assert!(!runtime.results().has_pending(channel.id()));
}

#[test]
fn pending_results_are_dropped_with_their_owner() {
    let config = ControllerConfig {
        manage_lifecycle: false,
        ..ControllerConfig::default()
    };
    let (mut runtime, root) = app_with(controller_with(|b| b.config(config)));
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    let channel = runtime
        .register_result_channel::<GetName, _>(home, "name", |_| {})
        .unwrap();
    channel.push(&mut runtime, &GetName).unwrap();
    runtime.complete(leaf(&runtime, root), &"lost").unwrap();
    assert!(runtime.results().has_pending(channel.id()));

    let mut rx = runtime.subscribe();
    runtime.close(home).unwrap();
    assert!(!runtime.results().has_pending(channel.id()));
    assert!(!runtime.results().has_channel(channel.id()));
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        NavigationEvent::ResultDropped { result_id, .. } if result_id == channel.id()
    )));
}

#[test]
fn synthetic_destination_answers_without_a_context() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    let nodes_before = runtime.tree().len();

    let (received, callback) = recorder::<NavigationResult<bool>>();
    let channel = runtime
        .register_result_channel::<Confirm, _>(home, "confirm", callback)
        .unwrap();
    channel
        .push(&mut runtime, &Confirm { message: "Delete?".into() })
        .unwrap();

    assert_eq!(*received.lock().unwrap(), vec![NavigationResult::Completed(true)]);
    assert_eq!(runtime.tree().len(), nodes_before);
    assert_eq!(backstack_types(&runtime, "main"), vec!["Home"]);
}

#[test]
fn synthetic_destination_forwards_its_result() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    let (received, callback) = recorder::<NavigationResult<String>>();
    let channel = runtime
        .register_result_channel::<NameOrDefault, _>(home, "name", callback)
        .unwrap();
    channel.push(&mut runtime, &NameOrDefault).unwrap();
    assert_eq!(leaf_type(&runtime, root), "GetName");

    runtime.complete(leaf(&runtime, root), &"Ada").unwrap();
    assert_eq!(
        *received.lock().unwrap(),
        vec![NavigationResult::Completed("Ada".to_string())]
    );
}

#[tokio::test]
async fn flow_awaits_result_between_commits() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    let shared = enro_core::shared(runtime);

    let flow = NavigationFlow::new(Arc::clone(&shared), home);
    let task = tokio::spawn(async move { flow.push_for_result(&GetName).await });

    let picker = loop {
        {
            let runtime = shared.lock().await;
            if let Some(active) = runtime.tree().active_leaf(root) {
                if active != home {
                    break active;
                }
            }
        }
        tokio::task::yield_now().await;
    };
    shared.lock().await.complete(picker, &"John Doe").unwrap();

    let result = task.await.unwrap().unwrap();
    assert_eq!(result, NavigationResult::Completed("John Doe".to_string()));
}

#[tokio::test]
async fn flow_reports_owner_destroyed() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    let pending = runtime.push_for_result(home, &GetName).unwrap();

    runtime.destroy_root(root).unwrap();
    let err = pending.wait().await.unwrap_err();
    assert!(matches!(err, EnroError::ResultChannelClosed(_)));
}

#[tokio::test]
async fn host_destroying_a_result_destination_reports_closed() {
    let (mut runtime, root) = app();
    runtime.push(root, &Home).unwrap();
    let home = leaf(&runtime, root);
    let pending = runtime.push_for_result(home, &GetName).unwrap();
    let picker = leaf(&runtime, root);
    assert_ne!(picker, home);

    let mut rx = runtime.subscribe();
    runtime.set_lifecycle(picker, Lifecycle::Destroyed).unwrap();
    assert_eq!(leaf(&runtime, root), home);
    assert_eq!(backstack_types(&runtime, "main"), vec!["Home"]);

    let result = tokio::time::timeout(Duration::from_millis(200), pending.wait())
        .await
        .expect("result was never delivered")
        .unwrap();
    assert_eq!(result, NavigationResult::Closed);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, NavigationEvent::ResultDelivered { .. })));
}

// ---------------------------------------------------------------------------
// Root redirection & plugins
// ---------------------------------------------------------------------------

#[test]
fn root_keys_are_handed_to_the_host() {
    let handler = Arc::new(RecordingRootHandler::new());
    let root_handler = Arc::clone(&handler);
    let (mut runtime, root) = app_with(controller_with(move |b| b.root_handler(root_handler)));
    runtime.push(root, &Home).unwrap();

    let mut rx = runtime.subscribe();
    runtime.present(leaf(&runtime, root), &Login).unwrap();
    assert_eq!(backstack_types(&runtime, "main"), vec!["Home"]);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        NavigationEvent::RootRedirected { key_type, .. } if key_type == "Login"
    )));

    let requested = handler.drain();
    assert_eq!(requested.len(), 1);
    assert!(requested[0].metadata.opened_in_root);

    let login_root = runtime.host_in_root("login", requested[0].clone()).unwrap();
    assert_eq!(leaf_type(&runtime, login_root), "Login");
    assert!(handler.opened().is_empty());
    assert_eq!(runtime.tree().roots().len(), 2);
}

#[test]
fn root_keys_without_a_host_fail() {
    let (mut runtime, root) = app();
    let err = runtime.present(root, &Login).unwrap_err();
    assert!(matches!(err, EnroError::MissingRootHost { ref key_type } if key_type == "Login"));
}

#[derive(Default)]
struct RecordingPlugin {
    calls: Mutex<Vec<String>>,
}

impl NavigationPlugin for RecordingPlugin {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_opened(&self, instance: &NavigationKeyInstance) {
        self.calls.lock().unwrap().push(format!("opened {}", instance.key_type()));
    }

    fn on_active(&self, instance: &NavigationKeyInstance) {
        self.calls.lock().unwrap().push(format!("active {}", instance.key_type()));
    }

    fn on_closed(&self, instance: &NavigationKeyInstance) {
        self.calls.lock().unwrap().push(format!("closed {}", instance.key_type()));
    }
}

#[test]
fn plugins_follow_destination_lifecycle() {
    let plugin = Arc::new(RecordingPlugin::default());
    let registered = Arc::clone(&plugin);
    let (mut runtime, root) = app_with(controller_with(move |b| b.plugin(registered)));

    runtime.push(root, &Home).unwrap();
    runtime.push(root, &Detail { item: 1 }).unwrap();
    runtime.handle_back(root).unwrap();

    assert_eq!(
        *plugin.calls.lock().unwrap(),
        vec![
            "opened Home",
            "active Home",
            "opened Detail",
            "active Detail",
            "closed Detail",
            "active Home",
        ]
    );
}
