//! End-to-end: a counter service registered by convention, driven through
//! `Server::handle` with real HTTP requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use restify::{with_state, Config, Context, Fault, Params, Reply, Response, Restify, Server, Service};
use serde_json::{json, Value};

const BASE: &str = "/myservice/rest/v1.0/";

#[derive(Default)]
struct Counters {
    values: Mutex<HashMap<String, i64>>,
}

impl Counters {
    async fn get_counter(self: Arc<Self>, args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
        let id = args["id"].as_str().unwrap_or_default().to_owned();
        match self.values.lock().unwrap().get(&id) {
            Some(value) => Ok(json!({ "value": value })),
            None => Err(Fault::new("no_counter", format!("No counter defined for {id}"))),
        }
    }

    async fn create_counter(self: Arc<Self>, args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
        let id = args["id"].as_str().unwrap_or_default().to_owned();
        let value = args.get("value").and_then(Value::as_i64).unwrap_or(0);
        let mut values = self.values.lock().unwrap();
        if values.contains_key(&id) {
            return Err(Fault::new("counter_exists", format!("Counter already created for {id}")));
        }
        values.insert(id.clone(), value);
        Ok(json!({ "id": id, "value": value }))
    }

    async fn update_counter(self: Arc<Self>, args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
        let id = args["id"].as_str().unwrap_or_default().to_owned();
        let mut values = self.values.lock().unwrap();
        let Some(current) = values.get_mut(&id) else {
            return Err(Fault::new("no_counter", format!("No counter defined for {id}")));
        };
        *current = args.get("value").and_then(Value::as_i64).unwrap_or(*current + 1);
        Ok(json!({ "id": id, "value": *current }))
    }
}

async fn get_export(_args: Params, ctx: Arc<Context>) -> Reply {
    ctx.send(Response::text("id,value\n"));
    Reply::Handled
}

fn server() -> Server {
    let config = Config::from_toml(
        r#"
        [[endpoints]]
        name = "MyService"
        regex = "/myservice/rest/v1.0/(\\w+)"
        "#,
    )
    .unwrap();

    let counters = Arc::new(Counters::default());
    let service = Service::new("MyService")
        .validator(|method, args, _ctx| {
            if method == "getExport" || args.contains_key("id") {
                Ok(())
            } else {
                Err("missing_param".into())
            }
        })
        .method("getCounter", with_state(&counters, Counters::get_counter))
        .method("createCounter", with_state(&counters, Counters::create_counter))
        .method("updateCounter", with_state(&counters, Counters::update_counter))
        .method("getExport", get_export);

    let mut server = Server::from_config(&config.server).unwrap();
    Restify::new(&config).service(service).startup(&mut server).unwrap();
    server
}

async fn call(server: &Server, method: &str, resource: &str, body: Option<Value>) -> (StatusCode, Bytes) {
    let body = body.map(|b| Bytes::from(serde_json::to_vec(&b).unwrap())).unwrap_or_default();
    let req = Request::builder()
        .method(method)
        .uri(format!("{BASE}{resource}"))
        .header("content-type", "application/json")
        .body(Full::new(body))
        .unwrap();
    let res = server.handle(req).await;
    let status = res.status();
    (status, res.into_body().collect().await.unwrap().to_bytes())
}

async fn call_json(server: &Server, method: &str, resource: &str, body: Option<Value>) -> Value {
    let (status, bytes) = call(server, method, resource, body).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn counter_lifecycle() {
    let server = server();

    let created = call_json(&server, "POST", "Counter", Some(json!({"id": "foo", "value": 12}))).await;
    assert_eq!(created, json!({"code": 0, "id": "foo", "value": 12}));

    let fetched = call_json(&server, "GET", "Counter?id=foo", None).await;
    assert_eq!(fetched, json!({"code": 0, "value": 12}));

    let missing = call_json(&server, "GET", "Counter?id=bar", None).await;
    assert_eq!(missing, json!({"code": "no_counter", "message": "No counter defined for bar"}));

    let bumped = call_json(&server, "PUT", "Counter", Some(json!({"id": "foo"}))).await;
    assert_eq!(bumped, json!({"code": 0, "id": "foo", "value": 13}));

    let set = call_json(&server, "PUT", "Counter", Some(json!({"id": "foo", "value": 40}))).await;
    assert_eq!(set, json!({"code": 0, "id": "foo", "value": 40}));

    let duplicate = call_json(&server, "POST", "Counter", Some(json!({"id": "foo"}))).await;
    assert_eq!(duplicate, json!({"code": "counter_exists", "message": "Counter already created for foo"}));
}

#[tokio::test]
async fn validation_blocks_the_handler() {
    let server = server();
    let env = call_json(&server, "POST", "Counter", Some(json!({"value": 1}))).await;
    assert_eq!(env, json!({"code": "missing_param", "message": "no details"}));

    // Nothing was created.
    let env = call_json(&server, "GET", "Counter?id=", None).await;
    assert_eq!(env["code"], "no_counter");
}

#[tokio::test]
async fn routing_errors() {
    let server = server();

    let env = call_json(&server, "PATCH", "Counter", None).await;
    assert_eq!(env["code"], "unsupported_method");

    let env = call_json(&server, "DELETE", "Counter", None).await;
    assert_eq!(env["code"], "no_handler");

    let env = call_json(&server, "GET", "Gauge?id=foo", None).await;
    assert_eq!(env, json!({"code": "no_handler", "message": "No handler found for URI: /myservice/rest/v1.0/Gauge?id=foo"}));
}

#[tokio::test]
async fn handled_reply_writes_its_own_response() {
    let server = server();
    let (status, body) = call(&server, "GET", "Export", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"id,value\n");
}

#[tokio::test]
async fn outside_every_pattern_is_404() {
    let server = server();
    let req = Request::get("/elsewhere").body(Full::new(Bytes::new())).unwrap();
    let res = server.handle(req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
