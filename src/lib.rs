//! # restify
//!
//! Convention-based REST dispatch. Name a method `getCounter` and it answers
//! `GET …/Counter`; name it `createCounter` and it answers `POST …/Counter`.
//! Whatever it returns, or fails with, goes back as a JSON envelope.
//!
//! ## The contract
//!
//! - **Routing**: a verb table maps method-name prefixes to HTTP methods
//!   (`get`, `create`, `update`, `delete` by default). Each endpoint group pairs
//!   one service with one URL regex whose first capture group is the resource.
//! - **Validation**: a service may carry one validator. It runs before every
//!   handler with the method name, and can stop the request with a fault.
//! - **Envelopes**: success is `{"code": 0, ...}`, failure is
//!   `{"code": ..., "message": ...}`. See [`normalize`] for the exact rules.
//!
//! What restify intentionally ignores: TLS, authentication, rate limiting,
//! content types other than JSON.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use restify::{Config, Context, Fault, Params, Restify, Server, Service};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restify::Error> {
//!     let config = Config::from_toml(r#"
//!         [[endpoints]]
//!         name = "Clock"
//!         regex = "/clock/rest/v1/(\\w+)"
//!     "#)?;
//!
//!     let clock = Service::new("Clock").method("getTime", get_time);
//!
//!     let mut server = Server::from_config(&config.server)?;
//!     Restify::new(&config).service(clock).startup(&mut server)?;
//!     server.serve().await
//! }
//!
//! // GET /clock/rest/v1/Time → {"code": 0, "now": 0}
//! async fn get_time(_args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
//!     Ok(json!({ "now": 0 }))
//! }
//! ```

mod config;
mod context;
mod convention;
mod dispatch;
mod envelope;
mod error;
mod handler;
mod method;
mod registrar;
mod response;
mod server;
mod service;
mod table;

pub use config::{Config, EndpointConfig, ServerConfig};
pub use context::{Context, Params, Pending, Responder};
pub use convention::{Mapping, Verb, VerbMap};
pub use dispatch::{Dispatcher, NO_HANDLER, UNSUPPORTED_METHOD};
pub use envelope::{normalize, Delivery, Envelope, Fault, Reply, NO_DETAILS, UNKNOWN_CODE};
pub use error::Error;
pub use handler::{with_state, Handler, IntoOutcome, Outcome};
pub use method::Method;
pub use registrar::Restify;
pub use response::{ContentType, Response, ResponseBuilder};
pub use server::{Server, UriHandler};
pub use service::Service;
pub use table::{DispatchTable, HandlerEntry};
