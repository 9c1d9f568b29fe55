//! End-to-end tests against in-process remote GraphQL services.

use async_graphql::{
    EmptyMutation, EmptySubscription, Enum, Object, Schema, SimpleObject, Subscription, Union, ID,
};
use async_graphql_axum::{GraphQL, GraphQLSubscription};
use axum::{routing::post_service, Router};
use futures::{Stream, StreamExt};
use graphql_stitching_gateway::{EndpointDescriptor, Error, Gateway, GatewayBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
enum Status {
    Draft,
    Published,
}

#[derive(SimpleObject)]
struct Record {
    id: ID,
    title: String,
    status: Status,
}

#[derive(SimpleObject)]
struct Author {
    name: String,
}

#[derive(Union)]
enum SearchResult {
    Record(Record),
    Author(Author),
}

struct RecordsQuery;

#[Object]
impl RecordsQuery {
    async fn foo(&self) -> &str {
        "bar"
    }

    async fn record(&self, id: ID) -> Option<Record> {
        (id.as_str() == "1").then(|| Record {
            id,
            title: "First".to_string(),
            status: Status::Draft,
        })
    }

    async fn broken(&self) -> async_graphql::Result<Option<String>> {
        Err("record store offline".into())
    }

    async fn search(&self, term: String) -> Vec<SearchResult> {
        vec![
            SearchResult::Record(Record {
                id: ID::from("2"),
                title: term,
                status: Status::Published,
            }),
            SearchResult::Author(Author {
                name: "Ada".to_string(),
            }),
        ]
    }
}

struct RecordsSubscription;

#[Subscription]
impl RecordsSubscription {
    async fn counter(&self, upto: i32) -> impl Stream<Item = i32> {
        futures::stream::iter(1..=upto)
    }
}

struct InventoryQuery;

#[Object]
impl InventoryQuery {
    async fn stock(&self) -> i32 {
        7
    }
}

/// Serve a schema over HTTP and graphql-transport-ws on an ephemeral port
async fn serve<Q, M, S>(schema: Schema<Q, M, S>) -> String
where
    Q: async_graphql::ObjectType + 'static,
    M: async_graphql::ObjectType + 'static,
    S: async_graphql::SubscriptionType + 'static,
{
    let app = Router::new().route(
        "/graphql",
        post_service(GraphQL::new(schema.clone())).get_service(GraphQLSubscription::new(schema)),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/graphql")
}

async fn records_service() -> String {
    serve(Schema::new(RecordsQuery, EmptyMutation, RecordsSubscription)).await
}

async fn inventory_service() -> String {
    serve(Schema::new(InventoryQuery, EmptyMutation, EmptySubscription)).await
}

/// Accepts connections and never answers
async fn silent_service() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/graphql")
}

fn builder() -> GatewayBuilder {
    Gateway::builder()
        .with_registry_api()
        .with_discovery_timeout(Duration::from_millis(500))
        .with_request_timeout(Duration::from_secs(2))
}

async fn query(gateway: &Gateway, document: &str) -> (Value, Vec<Value>) {
    let response = gateway.execute(document).await;
    let json = serde_json::to_value(&response).expect("serializes");
    let errors = json["errors"].as_array().cloned().unwrap_or_default();
    (json["data"].clone(), errors)
}

#[tokio::test]
async fn prefixed_endpoint_exposes_renamed_fields() {
    let url = records_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(url).with_prefix("ns2"))
        .start()
        .await
        .expect("starts");

    let (data, errors) = query(
        &gateway,
        r#"{
            ns2Foo
            ns2Record(id: "1") { id title status }
            __type(name: "Ns2Record") { name }
            queryType: __type(name: "Query") { fields { name } }
        }"#,
    )
    .await;
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(data["ns2Foo"], "bar");
    assert_eq!(
        data["ns2Record"],
        json!({"id": "1", "title": "First", "status": "DRAFT"})
    );
    assert_eq!(data["__type"]["name"], "Ns2Record");

    let fields: Vec<&str> = data["queryType"]["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert!(fields.contains(&"ns2Foo"));
    assert!(!fields.contains(&"foo"));
}

#[tokio::test]
async fn aliases_and_abstract_types_survive_delegation() {
    let url = records_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(url).with_prefix("rec"))
        .start()
        .await
        .expect("starts");

    let (data, errors) = query(
        &gateway,
        r#"{
            hits: recSearch(term: "stitching") {
                __typename
                ... on RecRecord { heading: title }
                ... on RecAuthor { name }
            }
        }"#,
    )
    .await;
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(
        data,
        json!({"hits": [
            {"__typename": "RecRecord", "heading": "stitching"},
            {"__typename": "RecAuthor", "name": "Ada"}
        ]})
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_isolated() {
    let healthy = records_service().await;
    let silent = silent_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(healthy.clone()).with_prefix("a"))
        .add_endpoint(EndpointDescriptor::new(silent).with_prefix("b"))
        .build()
        .expect("builds");

    let report = gateway.reload().await.expect("reload does not fail");
    assert_eq!((report.attempted, report.loaded), (2, 1));

    let loaded: Vec<_> = gateway.loaded().iter().map(|l| l.url().to_string()).collect();
    assert_eq!(loaded, [healthy]);

    let (data, errors) = query(&gateway, "{ aFoo }").await;
    assert!(errors.is_empty());
    assert_eq!(data, json!({"aFoo": "bar"}));
}

#[tokio::test]
async fn all_endpoints_failing_degrades_to_local_schema() {
    let silent = silent_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(silent))
        .build()
        .expect("builds");

    let report = gateway.reload().await.expect("reload does not fail");
    assert_eq!(report.loaded, 0);
    assert!(gateway.loaded().is_empty());

    let local = builder().build().expect("builds");
    local.reload().await.expect("reloads");
    assert_eq!(
        gateway.schema().expect("published").sdl(),
        local.schema().expect("published").sdl()
    );
}

#[tokio::test]
async fn conflicting_endpoint_keeps_previous_schema() {
    let first = records_service().await;
    let second = records_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(first.clone()))
        .start()
        .await
        .expect("starts");

    let sdl = gateway.schema().expect("published").sdl();
    let reloaded_at = gateway.last_reload_at();

    // Both services define an unprefixed `foo` root field
    let registration = gateway
        .register_endpoint(EndpointDescriptor::new(second.clone()))
        .await
        .expect("valid");
    assert!(!registration.success);
    assert_eq!(gateway.endpoints().len(), 2);

    assert_eq!(gateway.schema().expect("published").sdl(), sdl);
    assert_eq!(gateway.last_reload_at(), reloaded_at);
    let loaded: Vec<_> = gateway.loaded().iter().map(|l| l.url().to_string()).collect();
    assert_eq!(loaded, [first]);

    let (data, errors) = query(&gateway, "{ foo endpoints { url loaded } }").await;
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(data["foo"], "bar");
    assert_eq!(data["endpoints"][1], json!({"url": second, "loaded": false}));

    assert!(matches!(gateway.reload().await, Err(Error::Schema(_))));
    assert_eq!(gateway.schema().expect("published").sdl(), sdl);
}

#[tokio::test]
async fn failed_first_assembly_serves_local_schema() {
    let first = records_service().await;
    let second = records_service().await;
    let conflicting = || {
        builder()
            .add_endpoint(EndpointDescriptor::new(first.clone()))
            .add_endpoint(EndpointDescriptor::new(second.clone()))
    };

    let gateway = conflicting().build().expect("builds");
    assert!(!gateway.is_ready());
    assert!(matches!(gateway.reload().await, Err(Error::Schema(_))));
    assert!(gateway.is_ready());
    assert!(gateway.loaded().is_empty());

    let local = builder().start().await.expect("starts");
    assert_eq!(
        gateway.schema().expect("published").sdl(),
        local.schema().expect("published").sdl()
    );

    let started = conflicting().start().await.expect("starts on the local schema");
    assert!(started.is_ready());
    let (data, errors) = query(&started, "{ endpoints { loaded } }").await;
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(data, json!({"endpoints": [{"loaded": false}, {"loaded": false}]}));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let url = records_service().await;
    let gateway = builder().start().await.expect("starts");

    let first = gateway
        .register_endpoint(EndpointDescriptor::new(url.clone()).with_prefix("p"))
        .await
        .expect("valid");
    let second = gateway
        .register_endpoint(EndpointDescriptor::new(url.clone()).with_prefix("p"))
        .await
        .expect("valid");

    assert!(first.success);
    assert!(!second.success);
    let matching = gateway
        .endpoints()
        .iter()
        .filter(|e| e.matches(&url, Some("p")))
        .count();
    assert_eq!(matching, 1);

    let (data, _) = query(&gateway, "{ endpoints { url prefix loaded } }").await;
    assert_eq!(
        data,
        json!({"endpoints": [{"url": url, "prefix": "p", "loaded": true}]})
    );
}

#[tokio::test]
async fn remote_failure_is_a_field_error() {
    let url = records_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(url).with_prefix("rec"))
        .start()
        .await
        .expect("starts");

    let (data, errors) = query(&gateway, "{ recFoo recBroken }").await;
    assert_eq!(data, json!({"recFoo": "bar", "recBroken": null}));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "record store offline");
    assert_eq!(errors[0]["path"], json!(["recBroken"]));
    assert_eq!(errors[0]["extensions"]["code"], "REMOTE_ERROR");
}

#[tokio::test]
async fn subscription_streams_remote_events_in_order() {
    let url = records_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(url).with_prefix("rec"))
        .start()
        .await
        .expect("starts");

    let events: Vec<Value> = gateway
        .execute_stream("subscription { recCounter(upto: 3) }")
        .map(|response| {
            assert!(response.errors.is_empty(), "{:?}", response.errors);
            response.data.into_json().expect("json")["recCounter"].clone()
        })
        .collect()
        .await;
    assert_eq!(events, [json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn subscription_can_stop_after_first_event() {
    let url = records_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(url).with_prefix("rec"))
        .start()
        .await
        .expect("starts");

    let mut stream = gateway.execute_stream("subscription { recCounter(upto: 1000) }");
    let first = stream.next().await.expect("first event");
    assert_eq!(
        first.data.into_json().expect("json"),
        json!({"recCounter": 1})
    );
    drop(stream);

    let (data, errors) = query(&gateway, "{ recFoo }").await;
    assert!(errors.is_empty());
    assert_eq!(data, json!({"recFoo": "bar"}));
}

#[tokio::test]
async fn unregistering_removes_fields() {
    let records = records_service().await;
    let inventory = inventory_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(records.clone()).with_prefix("rec"))
        .add_endpoint(EndpointDescriptor::new(inventory))
        .start()
        .await
        .expect("starts");

    let (data, _) = query(&gateway, "{ recFoo stock }").await;
    assert_eq!(data, json!({"recFoo": "bar", "stock": 7}));

    assert!(!gateway.unregister_endpoint(&records, None).await);
    assert!(gateway.unregister_endpoint(&records, Some("rec")).await);

    let (data, _) = query(&gateway, "{ stock }").await;
    assert_eq!(data, json!({"stock": 7}));
    let (_, errors) = query(&gateway, "{ recFoo }").await;
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn concurrent_reloads_publish_consistent_snapshots() {
    let records = records_service().await;
    let inventory = inventory_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(records.clone()).with_prefix("rec"))
        .start()
        .await
        .expect("starts");

    let (_, registered, _, unregistered) = tokio::join!(
        gateway.reload(),
        gateway.register_endpoint(EndpointDescriptor::new(inventory.clone())),
        gateway.reload_all_endpoints(),
        gateway.unregister_endpoint(&records, Some("rec")),
    );
    assert!(registered.expect("valid").success);
    assert!(unregistered);

    let schema = gateway.schema().expect("published");
    let published: Vec<_> = schema.endpoints().iter().map(|e| e.url.clone()).collect();
    let loaded: Vec<_> = gateway.loaded().iter().map(|l| l.url().to_string()).collect();
    let registered: Vec<_> = gateway.endpoints().iter().map(|e| e.url.clone()).collect();
    assert_eq!(published, loaded);
    assert_eq!(loaded, registered);
    assert_eq!(registered, [inventory]);
}

#[tokio::test]
async fn served_router_delegates_over_http() {
    let url = records_service().await;
    let gateway = builder()
        .add_endpoint(EndpointDescriptor::new(url).with_prefix("rec"))
        .start()
        .await
        .expect("starts");
    let front = serve_gateway(gateway).await;

    let body: Value = reqwest::Client::new()
        .post(&front)
        .json(&json!({"query": "{ recFoo }"}))
        .send()
        .await
        .expect("sends")
        .json()
        .await
        .expect("json");
    assert_eq!(body, json!({"data": {"recFoo": "bar"}}));
}

async fn serve_gateway(gateway: Gateway) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = gateway.into_router();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/graphql")
}
