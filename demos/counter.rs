//! Counter service: named counters over convention-routed REST.
//!
//! Run with:
//!   RUST_LOG=restify=debug cargo run --example counter
//!
//! Try:
//!   curl -X POST http://localhost:3080/myservice/rest/v1.0/Counter \
//!        -H 'content-type: application/json' -d '{"id":"foo","value":12}'
//!   curl 'http://localhost:3080/myservice/rest/v1.0/Counter?id=foo'
//!   curl -X PUT http://localhost:3080/myservice/rest/v1.0/Counter \
//!        -H 'content-type: application/json' -d '{"id":"foo"}'
//!   curl 'http://localhost:3080/myservice/rest/v1.0/Counter'          # missing_param
//!   curl -X PATCH http://localhost:3080/myservice/rest/v1.0/Counter   # unsupported_method

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use restify::{with_state, Config, Context, Fault, Params, Restify, Server, Service};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
[server]
bind = "0.0.0.0:3080"

[[endpoints]]
name = "MyService"
regex = "/myservice/rest/v1.0/(\\w+)"
"#;

#[tokio::main]
async fn main() -> Result<(), restify::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::from_toml(CONFIG)?,
    };

    let counters = Arc::new(Counters::default());
    let service = Service::new("MyService")
        .validator(require_id)
        .method("getCounter", with_state(&counters, Counters::get_counter))
        .method("createCounter", with_state(&counters, Counters::create_counter))
        .method("updateCounter", with_state(&counters, Counters::update_counter));

    let mut server = Server::from_config(&config.server)?;
    Restify::new(&config).service(service).startup(&mut server)?;
    server.serve().await
}

fn require_id(_method: &str, args: &Params, _ctx: &Context) -> Result<(), Fault> {
    match args.get("id") {
        Some(_) => Ok(()),
        None => Err("missing_param".into()),
    }
}

#[derive(Default)]
struct Counters {
    values: Mutex<HashMap<String, i64>>,
}

impl Counters {
    // GET /myservice/rest/v1.0/Counter?id=foo
    async fn get_counter(self: Arc<Self>, args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
        let id = id(&args);
        let values = self.values.lock().expect("counter lock");
        match values.get(&id) {
            Some(value) => Ok(json!({ "value": value })),
            None => Err(no_counter(&id)),
        }
    }

    // POST /myservice/rest/v1.0/Counter {"id": "foo", "value": 12}
    async fn create_counter(self: Arc<Self>, args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
        let id = id(&args);
        let value = value(&args)?.unwrap_or(0);
        let mut values = self.values.lock().expect("counter lock");
        if values.contains_key(&id) {
            return Err(Fault::new("counter_exists", format!("Counter already created for {id}")));
        }
        values.insert(id.clone(), value);
        Ok(json!({ "id": id, "value": value }))
    }

    // PUT /myservice/rest/v1.0/Counter {"id": "foo"}, increments unless a value is given
    async fn update_counter(self: Arc<Self>, args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
        let id = id(&args);
        let explicit = value(&args)?;
        let mut values = self.values.lock().expect("counter lock");
        let Some(current) = values.get_mut(&id) else {
            return Err(no_counter(&id));
        };
        *current = explicit.unwrap_or(*current + 1);
        Ok(json!({ "id": id, "value": *current }))
    }
}

fn id(args: &Params) -> String {
    match args.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn value(args: &Params) -> Result<Option<i64>, Fault> {
    match args.get("value") {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            .map(Some)
            .ok_or_else(|| Fault::new("bad_value", format!("Not an integer: {v}"))),
    }
}

fn no_counter(id: &str) -> Fault {
    Fault::new("no_counter", format!("No counter defined for {id}"))
}
