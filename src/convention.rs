//! Naming convention: method-name prefix → HTTP verb.
//!
//! `getCounter` is served as `GET …/Counter`, `createCounter` as
//! `POST …/Counter`. The prefix table is ordered and the first prefix that
//! starts the name wins, so two prefixes where one starts the other
//! (`get` / `getAll`) are a configuration mistake the mapper does not detect.

use serde::Deserialize;

use crate::method::Method;

/// One row of the verb table.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Verb {
    pub prefix: String,
    pub method: Method,
}

/// The result of mapping a method name.
#[derive(Debug, Eq, PartialEq)]
pub struct Mapping<'a> {
    pub method: Method,
    pub resource: &'a str,
}

/// Ordered prefix → method table. Immutable once built.
///
/// Deserializes from a list of [`Verb`]s, first entry tested first.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct VerbMap {
    verbs: Vec<Verb>,
}

impl VerbMap {
    pub fn new(verbs: Vec<Verb>) -> Self {
        Self { verbs }
    }

    /// Maps a method name to `(verb, resource)`, or `None` if no prefix applies.
    ///
    /// ```
    /// use restify::{Method, VerbMap};
    ///
    /// let verbs = VerbMap::default();
    /// let mapping = verbs.map_method("updateCounter").unwrap();
    /// assert_eq!(mapping.method, Method::Put);
    /// assert_eq!(mapping.resource, "Counter");
    /// assert!(verbs.map_method("validate").is_none());
    /// ```
    pub fn map_method<'a>(&self, name: &'a str) -> Option<Mapping<'a>> {
        self.verbs.iter().find_map(|verb| {
            name.strip_prefix(verb.prefix.as_str())
                .map(|resource| Mapping { method: verb.method, resource })
        })
    }

    /// Every configured HTTP method, in table order (duplicates kept).
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.verbs.iter().map(|v| v.method)
    }
}

/// `get → GET`, `create → POST`, `update → PUT`, `delete → DELETE`.
impl Default for VerbMap {
    fn default() -> Self {
        let verb = |prefix: &str, method| Verb { prefix: prefix.to_owned(), method };
        Self::new(vec![
            verb("get", Method::Get),
            verb("create", Method::Post),
            verb("update", Method::Put),
            verb("delete", Method::Delete),
        ])
    }
}
