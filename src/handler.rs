//! Handler trait and type erasure.
//!
//! A dispatch table holds handlers of many concrete types, so each one is
//! wrapped in a trait object behind an `Arc`:
//!
//! ```text
//! async fn get_counter(args: Params, ctx: Arc<Context>) -> Result<Value, Fault>
//!        ↓ Service::method("getCounter", get_counter)
//! Arc::new(FnHandler(get_counter))       ← BoxedHandler
//!        ↓ at request time
//! handler.call(args, ctx)                ← one vtable dispatch, one boxed future
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::context::{Context, Params};
use crate::envelope::{Fault, Reply};

/// What every handler future resolves to once erased.
pub type Outcome = Result<Reply, Fault>;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, args: Params, ctx: Arc<Context>) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// A validator shared by every method of a service. It receives the method
/// name it is checking for, then the same arguments the handler would get.
pub(crate) type BoxedValidator =
    Arc<dyn Fn(&str, &Params, &Context) -> Result<(), Fault> + Send + Sync + 'static>;

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into an [`Outcome`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: Into<Reply>,
    E: Into<Fault>,
{
    fn into_outcome(self) -> Outcome {
        self.map(Into::into).map_err(Into::into)
    }
}

impl IntoOutcome for Reply {
    fn into_outcome(self) -> Outcome { Ok(self) }
}

impl IntoOutcome for Value {
    fn into_outcome(self) -> Outcome { Ok(self.into()) }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid service method.
///
/// Satisfied automatically by any function or closure shaped like:
///
/// ```text
/// async fn name(args: Params, ctx: Arc<Context>) -> impl IntoOutcome
/// ```
///
/// Methods that need service state are adapted with [`with_state`].
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Params, Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Params, Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Params, Arc<Context>) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, args: Params, ctx: Arc<Context>) -> BoxFuture {
        let fut = (self.0)(args, ctx);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

/// Binds shared service state to a method taking `Arc<S>` first.
///
/// ```rust
/// use std::sync::Arc;
/// use restify::{with_state, Context, Fault, Params, Service};
/// use serde_json::{json, Value};
///
/// struct Greeter { greeting: String }
///
/// impl Greeter {
///     async fn get_greeting(self: Arc<Self>, _args: Params, _ctx: Arc<Context>) -> Result<Value, Fault> {
///         Ok(json!({ "greeting": self.greeting }))
///     }
/// }
///
/// let greeter = Arc::new(Greeter { greeting: "hello".into() });
/// let service = Service::new("Greeter")
///     .method("getGreeting", with_state(&greeter, Greeter::get_greeting));
/// ```
pub fn with_state<S, F, Fut, R>(state: &Arc<S>, method: F) -> impl Handler
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, Params, Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    let state = Arc::clone(state);
    move |args: Params, ctx: Arc<Context>| method(Arc::clone(&state), args, ctx)
}
