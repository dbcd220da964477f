mod common;

use common::{collect, init_tracing, person, schema, vertices, RecordingHook, RecordingStore};
use std::sync::{Arc, Mutex};
use synapse_federation::{
    Context, DelegateGraph, Element, Entity, FederatedStore, GetAllElements, GetElements, Graph,
    GraphConfig, GraphError, GraphHook, Limit, LoggingHook, MapStore, Operation,
    OperationAuthoriser, OperationChain, QueryOutput, Store, UpdateViewHook, User,
    ValidationResult, ValidationRules, View, ViewElementDefinition,
};

fn mixed_store() -> Arc<RecordingStore> {
    Arc::new(RecordingStore::new(
        schema(),
        vec![
            person("ann"),
            Entity::new("junction", "j1").into(),
            Entity::new("secret", "s1").into(),
        ],
    ))
}

fn groups_view(groups: &[&str]) -> View {
    groups
        .iter()
        .fold(View::new(), |view, g| view.entity(*g, ViewElementDefinition::new()))
}

fn groups_of(elements: &[Element]) -> Vec<&str> {
    elements.iter().map(Element::group).collect()
}

#[tokio::test]
async fn white_and_black_lists_shape_results() {
    init_tracing();
    let hook = UpdateViewHook::new()
        .white_list_element_groups(["person", "secret"])
        .black_list_element_groups(["secret"]);
    let graph = Graph::builder()
        .graph_id("g")
        .store(mixed_store())
        .add_hook(hook)
        .build()
        .unwrap();

    let chain = OperationChain::first(
        GetAllElements::new().view(groups_view(&["person", "junction", "secret"])),
    );
    let elements = collect(graph.execute(chain, &mut Context::default()).await.unwrap()).await;

    assert_eq!(groups_of(&elements), ["person"]);
}

#[tokio::test]
async fn black_list_applies_to_operations_without_a_view() {
    let graph = Graph::builder()
        .graph_id("g")
        .store(mixed_store())
        .add_hook(UpdateViewHook::new().black_list_element_groups(["secret"]))
        .build()
        .unwrap();

    let output = graph
        .execute(OperationChain::first(GetAllElements::new()), &mut Context::default())
        .await
        .unwrap();

    assert_eq!(groups_of(&collect(output).await), ["person", "junction"]);
}

#[tokio::test]
async fn view_rewrite_is_gated_on_user_capabilities() {
    let hook = UpdateViewHook::new()
        .without_data_auth(["admin"])
        .black_list_element_groups(["secret"]);
    let graph = Graph::builder()
        .graph_id("g")
        .store(mixed_store())
        .add_hook(hook)
        .build()
        .unwrap();
    let chain = || {
        OperationChain::first(
            GetAllElements::new().view(groups_view(&["person", "junction", "secret"])),
        )
    };

    let mut admin = Context::new(User::new("root").with_data_auths(["admin"]));
    let seen_by_admin = collect(graph.execute(chain(), &mut admin).await.unwrap()).await;
    assert_eq!(groups_of(&seen_by_admin), ["person", "junction", "secret"]);

    let mut analyst = Context::new(User::new("ann").with_data_auths(["analyst"]));
    let seen_by_analyst = collect(graph.execute(chain(), &mut analyst).await.unwrap()).await;
    assert_eq!(groups_of(&seen_by_analyst), ["person", "junction"]);
}

#[tokio::test]
async fn hooks_run_in_registration_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let graph = Graph::builder()
        .graph_id("g")
        .store(mixed_store())
        .add_hook(RecordingHook::new("first", &calls))
        .add_hook(RecordingHook::new("second", &calls))
        .build()
        .unwrap();

    let output = graph
        .execute(OperationChain::first(GetAllElements::new()), &mut Context::default())
        .await
        .unwrap();
    collect(output).await;

    assert_eq!(
        *calls.lock().unwrap(),
        ["first:pre", "second:pre", "first:post", "second:post"]
    );
}

#[tokio::test]
async fn authoriser_rejection_runs_failure_hooks() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let store = mixed_store();
    let graph = Graph::builder()
        .graph_id("g")
        .store(store.clone())
        .add_hook(RecordingHook::new("audit", &calls))
        .add_hook(OperationAuthoriser::new().require("GetAllElements", ["admin"]))
        .add_hook(RecordingHook::new("after", &calls))
        .build()
        .unwrap();

    let err = graph
        .execute(
            OperationChain::first(GetAllElements::new()),
            &mut Context::new(User::new("ann")),
        )
        .await
        .err()
        .unwrap();

    assert!(matches!(err, GraphError::HookRejected { ref hook, .. } if hook == "OperationAuthoriser"));
    assert_eq!(
        *calls.lock().unwrap(),
        ["audit:pre", "audit:failure(rejected)", "after:failure(rejected)"]
    );
    assert_eq!(store.dispatches(), 0);
}

#[tokio::test]
async fn invalid_chains_never_reach_the_store() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let store = mixed_store();
    let graph = Graph::builder()
        .graph_id("g")
        .store(store.clone())
        .add_hook(RecordingHook::new("audit", &calls))
        .build()
        .unwrap();

    let chain = OperationChain::first(GetElements::new()).then(Limit { result_limit: 0 });
    let err = graph
        .execute(chain, &mut Context::default())
        .await
        .err()
        .unwrap();

    assert_eq!(
        err.to_string(),
        "Operation chain is invalid. GetElements requires seeds when it starts a chain, \
         Limit must be greater than 0"
    );
    assert_eq!(*calls.lock().unwrap(), ["audit:failure(validation)"]);
    assert_eq!(store.dispatches(), 0);
}

#[tokio::test]
async fn registered_validation_rules_reject_chains() {
    let rules = ValidationRules::new().register(
        "GetAllElements",
        |_op: &Operation, user: &User, _schema: &synapse_federation::Schema| {
            let mut result = ValidationResult::new();
            if !user.op_auths.contains("bulk") {
                result.add_error("GetAllElements needs the bulk op auth");
            }
            result
        },
    );
    let graph = Graph::builder()
        .graph_id("g")
        .store(mixed_store())
        .validation_rules(rules)
        .build()
        .unwrap();

    let err = graph
        .execute(OperationChain::first(GetAllElements::new()), &mut Context::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, GraphError::Validation { ref messages } if messages.len() == 1));

    let mut bulk = Context::new(User::new("etl").with_op_auths(["bulk"]));
    let output = graph
        .execute(OperationChain::first(GetAllElements::new()), &mut bulk)
        .await
        .unwrap();
    assert_eq!(collect(output).await.len(), 3);
}

#[tokio::test]
async fn post_execute_errors_run_failure_hooks() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let store = mixed_store();
    let graph = Graph::builder()
        .graph_id("g")
        .store(store.clone())
        .add_hook(RecordingHook::new("broken", &calls).failing_post_execute())
        .add_hook(RecordingHook::new("audit", &calls))
        .build()
        .unwrap();

    let result = graph
        .execute(OperationChain::first(GetAllElements::new()), &mut Context::default())
        .await;

    assert!(result.is_err());
    assert_eq!(
        *calls.lock().unwrap(),
        [
            "broken:pre",
            "audit:pre",
            "broken:post",
            "broken:failure(rejected)",
            "audit:failure(rejected)"
        ]
    );
    assert_eq!(store.closed(), 1);
}

/// Rejects every result without touching it and remembers whether the
/// failure hooks were handed the result.
struct RejectResults {
    saw_partial: Arc<Mutex<Option<bool>>>,
}

impl GraphHook for RejectResults {
    fn name(&self) -> &str {
        "RejectResults"
    }

    fn post_execute(
        &self,
        _result: &mut QueryOutput,
        _chain: &OperationChain,
        _ctx: &mut Context,
    ) -> synapse_federation::Result<()> {
        Err(GraphError::hook_rejected("RejectResults", "no"))
    }

    fn on_failure(
        &self,
        result: Option<QueryOutput>,
        _chain: &OperationChain,
        _ctx: &mut Context,
        _error: &GraphError,
    ) -> Option<QueryOutput> {
        *self.saw_partial.lock().unwrap() = Some(result.is_some());
        result
    }
}

#[tokio::test]
async fn rejected_results_reach_failure_hooks_and_are_released() {
    let store = Arc::new(MapStore::new(schema()));
    store.add_elements(vec![person("ann"), person("bob")]).unwrap();
    let saw_partial = Arc::new(Mutex::new(None));
    let graph = Graph::builder()
        .graph_id("g")
        .store(store.clone())
        .add_hook(RejectResults {
            saw_partial: saw_partial.clone(),
        })
        .build()
        .unwrap();

    let err = graph
        .execute(OperationChain::first(GetAllElements::new()), &mut Context::default())
        .await
        .unwrap_err();

    assert!(matches!(err, GraphError::HookRejected { ref hook, .. } if hook == "RejectResults"));
    assert_eq!(*saw_partial.lock().unwrap(), Some(true));
    assert_eq!(store.open_streams(), 0);
}

#[tokio::test]
async fn graphs_with_hooks_can_be_federated() {
    let restricted = Graph::builder()
        .graph_id("restricted")
        .store(mixed_store())
        .add_hook(UpdateViewHook::new().black_list_element_groups(["secret"]))
        .build()
        .unwrap();
    let open = Arc::new(RecordingStore::new(
        schema(),
        vec![Entity::new("secret", "s2").into()],
    ));

    let federated = FederatedStore::default();
    federated
        .add_graph(DelegateGraph::new("restricted", Arc::new(restricted) as Arc<dyn Store>))
        .unwrap();
    federated
        .add_graph(DelegateGraph::new("open", open as Arc<dyn Store>))
        .unwrap();
    let graph = Graph::builder()
        .graph_id("federated")
        .store(Arc::new(federated))
        .add_hook(LoggingHook::default())
        .build()
        .unwrap();

    let chain = OperationChain::first(
        GetAllElements::new().view(groups_view(&["person", "junction", "secret"])),
    );
    let elements = collect(graph.execute(chain, &mut Context::default()).await.unwrap()).await;

    assert_eq!(vertices(&elements), ["ann", "j1", "s2"]);
}

#[tokio::test]
async fn graph_config_loads_from_file() {
    let path = std::env::temp_dir().join(format!("graph-config-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"{
            "graph_id": "from-file",
            "description": "loaded from disk",
            "hooks": [
                { "type": "update_view", "black_list_element_groups": ["secret"] },
                { "type": "logging" }
            ]
        }"#,
    )
    .unwrap();

    let config = GraphConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    let graph = Graph::builder()
        .config(config)
        .store(mixed_store())
        .build()
        .unwrap();

    assert_eq!(graph.graph_id(), "from-file");
    assert_eq!(graph.description(), Some("loaded from disk"));
    assert_eq!(graph.hook_names(), ["UpdateViewHook", "LoggingHook"]);

    let chain = OperationChain::first(
        GetAllElements::new().view(groups_view(&["person", "secret"])),
    );
    let elements = collect(graph.execute(chain, &mut Context::default()).await.unwrap()).await;
    assert_eq!(groups_of(&elements), ["person"]);

    assert!(GraphConfig::from_file("/definitely/not/here.json").is_err());
}

#[tokio::test]
async fn count_through_a_graph() {
    let graph = Graph::builder()
        .graph_id("g")
        .store(mixed_store())
        .build()
        .unwrap();
    let count = graph
        .execute(
            OperationChain::first(GetAllElements::new()).then(Operation::Count),
            &mut Context::default(),
        )
        .await
        .unwrap()
        .into_count()
        .unwrap();
    assert_eq!(count, 3);
}
