//! Services: named methods declared explicitly, in order.

use std::fmt;
use std::sync::Arc;

use crate::context::{Context, Params};
use crate::envelope::Fault;
use crate::handler::{BoxedHandler, BoxedValidator, Handler};

/// A named set of methods to expose over REST.
///
/// Method names follow the verb convention (`getCounter`, `createCounter`,
/// ...); names no verb prefix matches are kept but never routed. Build it
/// once at startup and hand it to [`Restify::service`](crate::Restify::service).
///
/// ```rust
/// use std::sync::Arc;
/// use restify::{Context, Fault, Params, Service};
/// use serde_json::{json, Value};
///
/// async fn get_time(_args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
///     Ok(json!({ "now": 0 }))
/// }
///
/// let clock = Service::new("Clock")
///     .validator(|_method, args, _ctx| match args.get("tz") {
///         Some(_) => Ok(()),
///         None => Err("missing_param".into()),
///     })
///     .method("getTime", get_time);
/// ```
#[derive(Clone)]
pub struct Service {
    name: String,
    methods: Vec<(String, BoxedHandler)>,
    validator: Option<BoxedValidator>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), methods: Vec::new(), validator: None }
    }

    /// Declares a method. Declaration order is table-construction order.
    pub fn method(mut self, name: impl Into<String>, handler: impl Handler) -> Self {
        self.methods.push((name.into(), handler.into_boxed_handler()));
        self
    }

    /// Sets the validator every routed method runs before its handler.
    ///
    /// `Ok(())` lets the request through; `Err(fault)` answers with that
    /// fault and skips the handler.
    pub fn validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&str, &Params, &Context) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn methods(&self) -> impl Iterator<Item = (&str, &BoxedHandler)> {
        self.methods.iter().map(|(name, handler)| (name.as_str(), handler))
    }

    pub(crate) fn validator_fn(&self) -> Option<&BoxedValidator> {
        self.validator.as_ref()
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.methods.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}
