//! Startup registration: one dispatcher per configured endpoint group.

use std::collections::HashMap;

use regex::Regex;
use tracing::info;

use crate::config::{Config, EndpointConfig};
use crate::convention::VerbMap;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::server::Server;
use crate::service::Service;
use crate::table::DispatchTable;

/// Wires services into a [`Server`] by naming convention.
///
/// ```rust,no_run
/// use restify::{Config, Restify, Server, Service};
///
/// # async fn run(my_service: Service) -> Result<(), restify::Error> {
/// let config = Config::load("restify.toml")?;
/// let mut server = Server::from_config(&config.server)?;
/// Restify::new(&config)
///     .service(my_service)
///     .startup(&mut server)?;
/// server.serve().await
/// # }
/// ```
#[derive(Debug)]
pub struct Restify {
    verbs: VerbMap,
    endpoints: Vec<EndpointConfig>,
    services: HashMap<String, Service>,
}

impl Restify {
    pub fn new(config: &Config) -> Self {
        Self {
            verbs: config.verbs.clone(),
            endpoints: config.endpoints.clone(),
            services: HashMap::new(),
        }
    }

    /// Makes `service` available to endpoint groups under its name.
    pub fn service(mut self, service: Service) -> Self {
        self.services.insert(service.name().to_owned(), service);
        self
    }

    /// Adds an endpoint group after the configured ones.
    pub fn endpoint(mut self, name: impl Into<String>, regex: impl Into<String>) -> Self {
        self.endpoints.push(EndpointConfig { name: name.into(), regex: regex.into() });
        self
    }

    /// Registers every endpoint group with `server`, in order.
    ///
    /// All groups are resolved before any is registered, so an unknown
    /// service or a bad pattern leaves `server` untouched.
    pub fn startup(&self, server: &mut Server) -> Result<(), Error> {
        let groups = self
            .endpoints
            .iter()
            .map(|endpoint| -> Result<_, Error> {
                let service = self
                    .services
                    .get(&endpoint.name)
                    .ok_or_else(|| Error::UnknownService(endpoint.name.clone()))?;
                Ok((service, Regex::new(&endpoint.regex)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (service, pattern) in groups {
            self.register_endpoints(service, server, pattern);
        }
        Ok(())
    }

    /// Builds `service`'s dispatch table and registers it under `pattern`.
    pub fn register_endpoints(&self, service: &Service, server: &mut Server, pattern: Regex) {
        let table = DispatchTable::build(service, &self.verbs);
        info!(service = service.name(), %pattern, "endpoint group registered");
        server.register_pattern(pattern.clone(), service.name(), false, Dispatcher::new(pattern, table));
    }
}
