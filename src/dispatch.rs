//! Per-request dispatch for one endpoint group.
//!
//! ```text
//! method known? ──no──▶ unsupported_method
//!      │
//! pattern captures a routed resource? ──no──▶ no_handler
//!      │
//! validator ──Err──▶ normalize(fault)
//!      │
//! handler.await ──▶ normalize(fault | reply) ──▶ responder
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use regex::Regex;
use tracing::{debug, error};

use crate::context::{Context, Params, Responder};
use crate::envelope::{normalize, Delivery, Envelope, Fault};
use crate::method::Method;
use crate::server::UriHandler;
use crate::table::{DispatchTable, HandlerEntry};

/// `code` when the table has no routes for the request's verb.
pub const UNSUPPORTED_METHOD: &str = "unsupported_method";
/// `code` when the URL does not name a routed resource.
pub const NO_HANDLER: &str = "no_handler";

/// Dispatches requests for one endpoint group: one URL pattern, one table.
///
/// The pattern's first capture group names the resource:
/// `/svc/rest/v1/(\w+)` on `/svc/rest/v1/Counter?id=foo` selects `Counter`.
pub struct Dispatcher {
    pattern: Regex,
    table: DispatchTable,
}

impl Dispatcher {
    pub fn new(pattern: Regex, table: DispatchTable) -> Self {
        Self { pattern, table }
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Runs the request and hands the outcome to `responder`.
    pub async fn dispatch(&self, ctx: Arc<Context>, responder: Responder) {
        responder.respond(self.run(ctx).await);
    }

    /// Runs the request and returns the outcome.
    pub async fn run(&self, ctx: Arc<Context>) -> Delivery {
        let verb = ctx.method().to_ascii_lowercase();
        let Some(method) = verb.parse::<Method>().ok().filter(|m| self.table.supports(*m)) else {
            let message = format!("unsupported method: {verb} url: {}", ctx.url());
            debug!(%message, "dispatch error");
            return Envelope::failure(UNSUPPORTED_METHOD, message).into();
        };

        let Some(entry) = self.resolve(method, ctx.url()) else {
            let message = format!("No handler found for URI: {}", ctx.url());
            debug!(%message, "dispatch error");
            return Envelope::failure(NO_HANDLER, message).into();
        };

        let args = match method {
            Method::Get => ctx.query_params(),
            _ => ctx.params().clone(),
        };
        debug!(url = ctx.url(), handler = entry.name(), ?args, "dispatching");

        invoke(&entry, args, ctx).await
    }

    fn resolve(&self, method: Method, url: &str) -> Option<Arc<HandlerEntry>> {
        let resource = self.pattern.captures(url)?.get(1)?;
        self.table.get(method, resource.as_str()).cloned()
    }
}

impl UriHandler for Dispatcher {
    fn handle(&self, ctx: Arc<Context>, responder: Responder) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.dispatch(ctx, responder))
    }
}

async fn invoke(entry: &HandlerEntry, args: Params, ctx: Arc<Context>) -> Delivery {
    let verdict = std::panic::catch_unwind(AssertUnwindSafe(|| entry.validate(&args, &ctx)));
    let outcome = match verdict {
        Ok(Ok(())) => {
            // `call` itself runs the handler's synchronous prologue.
            let handler_ctx = Arc::clone(&ctx);
            AssertUnwindSafe(async move { entry.call(args, handler_ctx).await })
                .catch_unwind()
                .await
        }
        Ok(Err(fault)) => return normalize(Some(fault), None),
        Err(panic) => Err(panic),
    };

    match outcome {
        Ok(Ok(reply)) => {
            let delivery = normalize(None, Some(reply));
            debug!(url = ctx.url(), result = ?delivery, "dispatch result");
            delivery
        }
        Ok(Err(fault)) => {
            let delivery = normalize(Some(fault), None);
            error!(handler = entry.name(), url = ctx.url(), err = ?delivery, "handler failed");
            delivery
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            let delivery = normalize(Some(Fault::Message(message)), None);
            error!(
                handler = entry.name(),
                url = ctx.url(),
                err = ?delivery,
                backtrace = %std::backtrace::Backtrace::capture(),
                "handler panicked"
            );
            delivery
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convention::VerbMap;
    use crate::envelope::Reply;
    use crate::service::Service;
    use serde_json::{json, Value};

    async fn echo(args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
        Ok(Value::Object(args))
    }

    async fn explode(_args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
        panic!("counter store corrupted");
    }

    async fn raw(_args: Params, ctx: Arc<Context>) -> Reply {
        ctx.send(crate::Response::text("raw"));
        Reply::Handled
    }

    fn dispatcher(service: Service) -> Dispatcher {
        let pattern = Regex::new(r"/svc/rest/v1/(\w+)").unwrap();
        Dispatcher::new(pattern, DispatchTable::build(&service, &VerbMap::default()))
    }

    fn envelope(delivery: Delivery) -> Value {
        delivery.envelope().expect("envelope").into_value()
    }

    fn post(url: &str, body: Value) -> Arc<Context> {
        let Value::Object(params) = body else { panic!("object body") };
        Arc::new(Context::new("POST", url).with_params(params))
    }

    #[tokio::test]
    async fn unknown_verb_is_unsupported() {
        let d = dispatcher(Service::new("S").method("getCounter", echo));
        for method in ["PATCH", "FETCH"] {
            let env = envelope(d.run(Arc::new(Context::new(method, "/svc/rest/v1/Counter"))).await);
            assert_eq!(env["code"], "unsupported_method");
            let expected = format!("unsupported method: {} url: /svc/rest/v1/Counter", method.to_lowercase());
            assert_eq!(env["message"], expected.as_str());
        }
    }

    #[tokio::test]
    async fn unmatched_resource_has_no_handler() {
        let d = dispatcher(Service::new("S").method("getCounter", echo));
        for url in ["/svc/rest/v1/Gauge", "/other/Counter", "/svc/rest/v1/"] {
            let env = envelope(d.run(Arc::new(Context::new("GET", url))).await);
            assert_eq!(env["code"], "no_handler");
            assert_eq!(env["message"], format!("No handler found for URI: {url}").as_str());
        }
    }

    #[tokio::test]
    async fn configured_verb_without_handlers_has_no_handler() {
        let d = dispatcher(Service::new("S").method("getCounter", echo));
        let env = envelope(d.run(Arc::new(Context::new("DELETE", "/svc/rest/v1/Counter"))).await);
        assert_eq!(env["code"], "no_handler");
    }

    #[tokio::test]
    async fn get_uses_query_and_post_uses_body() {
        let d = dispatcher(Service::new("S").method("getCounter", echo).method("createCounter", echo));

        let ctx = Context::new("GET", "/svc/rest/v1/Counter?id=foo").with_params(json!({"ignored": 1}).as_object().cloned().unwrap());
        assert_eq!(envelope(d.run(Arc::new(ctx)).await), json!({"code": 0, "id": "foo"}));

        let env = envelope(d.run(post("/svc/rest/v1/Counter?id=bar", json!({"id": "foo", "value": 12}))).await);
        assert_eq!(env, json!({"code": 0, "id": "foo", "value": 12}));
    }

    #[tokio::test]
    async fn failed_validation_skips_the_handler() {
        let service = Service::new("S")
            .validator(|_method, args, _ctx| if args.contains_key("id") { Ok(()) } else { Err("missing_param".into()) })
            .method("createCounter", explode);
        let env = envelope(dispatcher(service).run(post("/svc/rest/v1/Counter", json!({}))).await);
        assert_eq!(env, json!({"code": "missing_param", "message": "no details"}));
    }

    #[tokio::test]
    async fn handler_fault_is_normalized() {
        async fn missing(args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
            let id = args.get("id").and_then(Value::as_str).unwrap_or_default();
            Err(Fault::new("no_counter", format!("No counter defined for {id}")))
        }
        let d = dispatcher(Service::new("S").method("getCounter", missing));
        let env = envelope(d.run(Arc::new(Context::new("GET", "/svc/rest/v1/Counter?id=bar"))).await);
        assert_eq!(env, json!({"code": "no_counter", "message": "No counter defined for bar"}));
    }

    #[tokio::test]
    async fn handler_panic_is_normalized() {
        let d = dispatcher(Service::new("S").method("createCounter", explode));
        let env = envelope(d.run(post("/svc/rest/v1/Counter", json!({"id": "foo"}))).await);
        assert_eq!(env, json!({"code": "unknown", "message": "counter store corrupted"}));
    }

    #[tokio::test]
    async fn panic_before_the_future_is_normalized() {
        let eager = |args: Params, _ctx: Arc<Context>| {
            let Some(id) = args.get("id").cloned() else { panic!("id required") };
            async move { Ok::<Value, Fault>(id) }
        };
        let d = dispatcher(Service::new("S").method("getCounter", eager));
        let env = envelope(d.run(Arc::new(Context::new("GET", "/svc/rest/v1/Counter"))).await);
        assert_eq!(env, json!({"code": "unknown", "message": "id required"}));

        let env = envelope(d.run(Arc::new(Context::new("GET", "/svc/rest/v1/Counter?id=foo"))).await);
        assert_eq!(env, json!({"code": 0, "message": "foo"}));
    }

    #[test]
    fn exposes_pattern_and_table() {
        let d = dispatcher(Service::new("S").method("getCounter", echo));
        assert_eq!(d.pattern().as_str(), r"/svc/rest/v1/(\w+)");
        assert_eq!(d.table().get(Method::Get, "Counter").unwrap().name(), "getCounter");
    }

    #[tokio::test]
    async fn validator_panic_is_normalized() {
        let service = Service::new("S")
            .validator(|_method, _args, _ctx| panic!("validator broke"))
            .method("createCounter", echo);
        let env = envelope(dispatcher(service).run(post("/svc/rest/v1/Counter", json!({}))).await);
        assert_eq!(env, json!({"code": "unknown", "message": "validator broke"}));
    }

    #[tokio::test]
    async fn handled_reply_is_passed_through() {
        let d = dispatcher(Service::new("S").method("getRaw", raw));
        let ctx = Arc::new(Context::new("GET", "/svc/rest/v1/Raw"));
        assert_eq!(d.run(Arc::clone(&ctx)).await, Delivery::AlreadyHandled);
        assert_eq!(ctx.take_sent().unwrap().body(), b"raw");
    }

    #[tokio::test]
    async fn dispatch_responds_through_the_responder() {
        let d = dispatcher(Service::new("S").method("getCounter", echo));
        let (responder, pending) = Responder::channel();
        d.dispatch(Arc::new(Context::new("PUT", "/svc/rest/v1/Counter")), responder).await;
        assert_eq!(envelope(pending.await.unwrap())["code"], "no_handler");
    }
}
