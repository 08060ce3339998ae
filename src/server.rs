//! HTTP server, URI handler registry and graceful shutdown.
//!
//! Handlers register against a regular expression. Each request goes to the
//! first registration, in registration order, whose pattern matches the
//! request URL (path plus query string). The handler receives a parsed
//! [`Context`] and a single-use [`Responder`]; the server turns whatever it
//! delivers into the HTTP response.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting connections, lets every
//! in-flight connection finish, then returns from [`Server::serve`].

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use regex::Regex;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::context::{Context, Params, Responder};
use crate::dispatch::NO_HANDLER;
use crate::envelope::{Delivery, Envelope};
use crate::error::Error;
use crate::response::Response;

// ── UriHandler ────────────────────────────────────────────────────────────────

/// Something that answers requests routed to it by URL pattern.
///
/// Implemented by [`Dispatcher`](crate::Dispatcher) and by any closure
/// `Fn(Arc<Context>, Responder) -> impl Future<Output = ()>`.
pub trait UriHandler: Send + Sync + 'static {
    fn handle(&self, ctx: Arc<Context>, responder: Responder) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl<F, Fut> UriHandler for F
where
    F: Fn(Arc<Context>, Responder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, ctx: Arc<Context>, responder: Responder) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self(ctx, responder))
    }
}

struct Registration {
    pattern: Regex,
    name: String,
    streaming: bool,
    handler: Arc<dyn UriHandler>,
}

// ── Server ────────────────────────────────────────────────────────────────────

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    handlers: Vec<Registration>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use restify::Server;
    /// let server = Server::bind("127.0.0.1:3080").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|_| Error::Address(addr.to_owned()))?;
        Ok(Self { addr, handlers: Vec::new() })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        Self::bind(&config.bind)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Routes requests whose URL matches `pattern` to `handler`.
    ///
    /// Streaming handlers get the raw body only; body parameters are not
    /// parsed for them.
    pub fn register_pattern(
        &mut self,
        pattern: Regex,
        name: impl Into<String>,
        streaming: bool,
        handler: impl UriHandler,
    ) {
        let name = name.into();
        info!(%pattern, %name, streaming, "uri handler registered");
        self.handlers.push(Registration { pattern, name, streaming, handler: Arc::new(handler) });
    }

    /// Starts accepting connections.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self) -> Result<(), Error> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), stopping when `signal` resolves.
    pub async fn serve_with_shutdown(self, signal: impl Future<Output = ()>) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let addr = listener.local_addr()?;
        let server = Arc::new(self);

        info!(%addr, "restify listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let server = Arc::clone(&server);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let server = Arc::clone(&server);
                            async move { Ok::<_, std::convert::Infallible>(server.handle(req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("restify stopped");
        Ok(())
    }

    /// Answers one request. Transport-independent: `serve` feeds it hyper
    /// requests, tests can feed it anything with an `http_body::Body`.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: fmt::Display,
    {
        self.respond(req).await.into_inner()
    }

    async fn respond<B>(&self, req: http::Request<B>) -> Response
    where
        B: Body,
        B::Error: fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let url = parts.uri.path_and_query().map_or("/", |pq| pq.as_str()).to_owned();

        let Some(registration) = self.handlers.iter().find(|r| r.pattern.is_match(&url)) else {
            let env = Envelope::failure(NO_HANDLER, format!("No handler found for URI: {url}"));
            return Response::envelope_with_status(StatusCode::NOT_FOUND, &env);
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(%url, "failed to read request body: {e}");
                let env = Envelope::failure("bad_request", format!("Unreadable request body: {e}"));
                return Response::envelope_with_status(StatusCode::BAD_REQUEST, &env);
            }
        };

        let params = if registration.streaming { Params::new() } else { parse_params(&parts.headers, &body) };
        let ctx = Arc::new(
            Context::new(parts.method.as_str(), url)
                .with_params(params)
                .with_body(body)
                .with_headers(parts.headers),
        );

        let (responder, pending) = Responder::channel();
        registration.handler.handle(Arc::clone(&ctx), responder).await;

        match pending.await {
            Ok(Delivery::Envelope(env)) => Response::envelope(&env),
            Ok(Delivery::AlreadyHandled) => ctx.take_sent().unwrap_or_else(|| {
                warn!(url = ctx.url(), handler = %registration.name, "handled reply without a response");
                Response::status(StatusCode::NO_CONTENT)
            }),
            Err(_) => {
                error!(url = ctx.url(), handler = %registration.name, "handler finished without responding");
                let env = Envelope::failure("no_response", "Handler finished without responding");
                Response::envelope_with_status(StatusCode::INTERNAL_SERVER_ERROR, &env)
            }
        }
    }
}

/// Body parameters: a JSON object, or form-urlencoded pairs when the request
/// says so. Anything else leaves the parameters empty (the raw body is still
/// on the context).
fn parse_params(headers: &HeaderMap, body: &Bytes) -> Params {
    if body.is_empty() {
        return Params::new();
    }
    if let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(body) {
        return obj;
    }
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if !is_form {
        return Params::new();
    }
    form_urlencoded::parse(body)
        .into_owned()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C on Windows).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;
    use serde_json::json;

    use crate::envelope::normalize;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        h
    }

    #[test]
    fn json_object_body_becomes_params() {
        let params = parse_params(&HeaderMap::new(), &Bytes::from_static(br#"{"id":"foo","value":12}"#));
        assert_eq!(params["id"], "foo");
        assert_eq!(params["value"], 12);
    }

    #[test]
    fn form_body_becomes_string_params() {
        let params = parse_params(&headers("application/x-www-form-urlencoded"), &Bytes::from_static(b"id=foo&value=12"));
        assert_eq!(params["value"], "12");
    }

    #[test]
    fn other_bodies_give_no_params() {
        assert!(parse_params(&headers("text/plain"), &Bytes::from_static(b"id=foo")).is_empty());
        assert!(parse_params(&HeaderMap::new(), &Bytes::from_static(b"[1,2]")).is_empty());
    }

    #[test]
    fn bad_address_is_an_error() {
        assert!(matches!(Server::bind("not an address"), Err(Error::Address(_))));
    }

    #[tokio::test]
    async fn first_matching_registration_wins() {
        let mut server = Server::bind("127.0.0.1:0").unwrap();
        server.register_pattern(Regex::new("^/a").unwrap(), "first", false, |_ctx: Arc<Context>, r: Responder| async move {
            r.respond(Envelope::failure("first", "x"));
        });
        server.register_pattern(Regex::new("^/a/b").unwrap(), "second", false, |_ctx: Arc<Context>, r: Responder| async move {
            r.respond(Envelope::failure("second", "x"));
        });

        let req = http::Request::get("/a/b").body(Full::new(Bytes::new())).unwrap();
        let res = server.handle(req).await;
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], "first");
    }

    #[tokio::test]
    async fn unmatched_url_is_404() {
        let server = Server::bind("127.0.0.1:0").unwrap();
        let req = http::Request::get("/nowhere").body(Full::new(Bytes::new())).unwrap();
        assert_eq!(server.handle(req).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dropped_responder_is_500() {
        let mut server = Server::bind("127.0.0.1:0").unwrap();
        server.register_pattern(Regex::new("/").unwrap(), "silent", false, |_ctx: Arc<Context>, r: Responder| async move {
            drop(r);
        });
        let req = http::Request::get("/x").body(Full::new(Bytes::new())).unwrap();
        assert_eq!(server.handle(req).await.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn echo_body(ctx: Arc<Context>, r: Responder) {
        let reply = json!({
            "params": ctx.params().len(),
            "body": String::from_utf8_lossy(ctx.body()),
        });
        r.respond(normalize(None, Some(reply.into())));
    }

    #[tokio::test]
    async fn streaming_handlers_skip_body_parsing() {
        let mut server = Server::bind("127.0.0.1:0").unwrap();
        server.register_pattern(Regex::new("^/upload").unwrap(), "upload", true, echo_body);
        server.register_pattern(Regex::new("^/form").unwrap(), "form", false, echo_body);

        for (path, params) in [("/upload", 0), ("/form", 1)] {
            let req = http::Request::post(path)
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from_static(br#"{"id":"foo"}"#)))
                .unwrap();
            let body = server.handle(req).await.into_body().collect().await.unwrap().to_bytes();
            let value: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value, json!({"code": 0, "params": params, "body": r#"{"id":"foo"}"#}));
        }
    }

    #[tokio::test]
    async fn handled_without_a_response_is_204() {
        let mut server = Server::bind("127.0.0.1:0").unwrap();
        server.register_pattern(Regex::new("/").unwrap(), "mute", false, |_ctx: Arc<Context>, r: Responder| async move {
            r.respond(Delivery::AlreadyHandled);
        });
        let req = http::Request::get("/x").body(Full::new(Bytes::new())).unwrap();
        let res = server.handle(req).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(res.into_body().collect().await.unwrap().to_bytes().is_empty());
    }
}
