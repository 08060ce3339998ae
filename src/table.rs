//! Dispatch tables: `(method, resource) → handler entry`.
//!
//! One table per endpoint group. Built once at startup, never mutated
//! afterwards, so concurrent requests read it without locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::context::{Context, Params};
use crate::convention::VerbMap;
use crate::envelope::Fault;
use crate::handler::{BoxFuture, BoxedHandler, BoxedValidator};
use crate::method::Method;
use crate::service::Service;

/// One routed method.
pub struct HandlerEntry {
    name: String,
    validator: Option<BoxedValidator>,
    handler: BoxedHandler,
}

impl HandlerEntry {
    /// The declared method name, e.g. `"createCounter"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Runs the service validator with this entry's method name. Entries
    /// without a validator accept everything.
    pub(crate) fn validate(&self, args: &Params, ctx: &Context) -> Result<(), Fault> {
        match &self.validator {
            Some(validate) => validate(&self.name, args, ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn call(&self, args: Params, ctx: Arc<Context>) -> BoxFuture {
        self.handler.call(args, ctx)
    }
}

/// Routes for one endpoint group.
pub struct DispatchTable {
    routes: HashMap<Method, HashMap<String, Arc<HandlerEntry>>>,
}

impl DispatchTable {
    /// Builds the table for `service` under the verb convention `verbs`.
    ///
    /// Every verb in `verbs` gets a route map, even an empty one: a known verb
    /// with nothing behind it is "no handler", an unknown verb is
    /// "unsupported method". Methods that map to the same route overwrite
    /// each other in declaration order.
    pub fn build(service: &Service, verbs: &VerbMap) -> Self {
        let mut routes: HashMap<Method, HashMap<String, Arc<HandlerEntry>>> =
            verbs.methods().map(|m| (m, HashMap::new())).collect();

        for (name, handler) in service.methods() {
            let Some(mapping) = verbs.map_method(name) else { continue };
            let entry = HandlerEntry {
                name: name.to_owned(),
                validator: service.validator_fn().cloned(),
                handler: Arc::clone(handler),
            };
            routes
                .entry(mapping.method)
                .or_default()
                .insert(mapping.resource.to_owned(), Arc::new(entry));
        }

        let table = Self { routes };
        debug!(service = service.name(), routes = ?table.summary(), "dispatch table built");
        table
    }

    /// Whether `method` is a verb this table knows about.
    pub fn supports(&self, method: Method) -> bool {
        self.routes.contains_key(&method)
    }

    /// `None` when the verb is unknown, else the entry for `resource` if any.
    pub fn routes(&self, method: Method) -> Option<&HashMap<String, Arc<HandlerEntry>>> {
        self.routes.get(&method)
    }

    pub fn get(&self, method: Method, resource: &str) -> Option<&Arc<HandlerEntry>> {
        self.routes.get(&method)?.get(resource)
    }

    /// `{verb: {resource: method name}}`, sorted, for logs and tests.
    pub fn summary(&self) -> BTreeMap<Method, BTreeMap<String, String>> {
        self.routes
            .iter()
            .map(|(method, entries)| {
                let names = entries
                    .iter()
                    .map(|(resource, entry)| (resource.clone(), entry.name.clone()))
                    .collect();
                (*method, names)
            })
            .collect()
    }
}
