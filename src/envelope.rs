//! The JSON envelope every dispatched request answers with.
//!
//! Success looks like `{"code": 0, ...payload}`, failure like
//! `{"code": "no_counter", "message": "No counter defined for bar"}`.
//! [`normalize`] is the single place where handler results and faults are
//! folded into that shape.
//!
//! # Truthiness
//!
//! Faults keep the loose "is this an error at all?" test clients of the wire
//! format rely on: `0`, `""`, `false` and `null` are not errors. A validator
//! that rejects with such a value therefore produces a success envelope
//! without running the handler.

use serde::Serialize;
use serde_json::{Map, Number, Value};

/// `code` for failures that carry no code of their own.
pub const UNKNOWN_CODE: &str = "unknown";
/// `message` for failures that carry no message of their own.
pub const NO_DETAILS: &str = "no details";

/// Strings longer than this (in UTF-16 units) are read as messages.
const TEXT_CODE_MAX_LEN: usize = 15;

// ── Fault ─────────────────────────────────────────────────────────────────────

/// An error raised by a validator or handler.
#[derive(Clone, Debug, PartialEq)]
pub enum Fault {
    /// Becomes `code`.
    Number(Number),
    /// Becomes `code` when at most 15 characters long, `message` otherwise.
    ///
    /// Kept for wire compatibility with existing clients. New code should
    /// prefer [`Fault::Code`] or [`Fault::Message`], which say what they mean.
    Text(String),
    /// Always becomes `code`.
    Code(String),
    /// Always becomes `message`.
    Message(String),
    /// An object (or array). `code` and `message` are copied when present;
    /// without a `message` the whole value is serialized into it.
    Structured(Value),
    /// Booleans and `null`: carry no information, yield the default envelope.
    Opaque(Value),
}

impl Fault {
    /// A fault with an explicit code and message.
    ///
    /// ```
    /// use restify::Fault;
    ///
    /// let fault = Fault::new("no_counter", "No counter defined for bar");
    /// ```
    pub fn new(code: impl Into<Value>, message: impl Into<String>) -> Self {
        let mut obj = Map::new();
        obj.insert("code".to_owned(), code.into());
        obj.insert("message".to_owned(), Value::String(message.into()));
        Self::Structured(Value::Object(obj))
    }

    /// Wraps a Rust error: its `Display` output becomes the message.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::Message(err.to_string())
    }

    /// Whether this fault counts as an error.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Number(n) => is_truthy(&Value::Number(n.clone())),
            Self::Text(s) | Self::Code(s) | Self::Message(s) => !s.is_empty(),
            Self::Structured(_) => true,
            Self::Opaque(v) => is_truthy(v),
        }
    }

    fn into_envelope(self) -> Envelope {
        let mut env = Envelope::failure(UNKNOWN_CODE, NO_DETAILS);
        match self {
            Self::Number(n) => env.set("code", Value::Number(n)),
            Self::Text(s) if s.encode_utf16().count() > TEXT_CODE_MAX_LEN => env.set("message", s.into()),
            Self::Text(s) | Self::Code(s) => env.set("code", s.into()),
            Self::Message(s) => env.set("message", s.into()),
            Self::Structured(v) => {
                if let Some(code) = v.get("code").filter(|c| is_truthy(c)) {
                    env.set("code", code.clone());
                }
                match v.get("message").filter(|m| is_truthy(m)) {
                    Some(message) => env.set("message", message.clone()),
                    None => env.set("message", serde_json::to_string(&v).unwrap_or_default().into()),
                }
            }
            Self::Opaque(_) => {}
        }
        env
    }
}

impl From<&str> for Fault {
    fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Fault {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for Fault {
    fn from(n: i64) -> Self { Self::Number(n.into()) }
}

impl From<u64> for Fault {
    fn from(n: u64) -> Self { Self::Number(n.into()) }
}

impl From<i32> for Fault {
    fn from(n: i32) -> Self { Self::Number(n.into()) }
}

impl From<Map<String, Value>> for Fault {
    fn from(obj: Map<String, Value>) -> Self { Self::Structured(Value::Object(obj)) }
}

impl From<Value> for Fault {
    fn from(v: Value) -> Self {
        match v {
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::Text(s),
            Value::Object(_) | Value::Array(_) => Self::Structured(v),
            Value::Bool(_) | Value::Null => Self::Opaque(v),
        }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// A handler's successful outcome.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The handler wrote the HTTP response itself via
    /// [`Context::send`](crate::Context::send); nothing more is written.
    Handled,
    /// A JSON value to wrap into an envelope.
    Value(Value),
}

impl Reply {
    /// Serializes any `Serialize` payload into a reply.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, Fault> {
        serde_json::to_value(payload)
            .map(Self::from)
            .map_err(|e| Fault::from_error(&e))
    }
}

/// `true` is the "already handled" marker; everything else is a value.
impl From<Value> for Reply {
    fn from(v: Value) -> Self {
        match v {
            Value::Bool(true) => Self::Handled,
            other => Self::Value(other),
        }
    }
}

impl From<Map<String, Value>> for Reply {
    fn from(obj: Map<String, Value>) -> Self { Self::Value(Value::Object(obj)) }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self { Self::Value(s.into()) }
}

impl From<String> for Reply {
    fn from(s: String) -> Self { Self::Value(s.into()) }
}

impl From<i64> for Reply {
    fn from(n: i64) -> Self { Self::Value(n.into()) }
}

impl From<bool> for Reply {
    fn from(b: bool) -> Self { Value::Bool(b).into() }
}

impl From<()> for Reply {
    fn from((): ()) -> Self { Self::Value(Value::Null) }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// A JSON object that always carries a `code` field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// `{"code": code, "message": message}`.
    pub fn failure(code: &str, message: impl Into<String>) -> Self {
        let mut obj = Map::new();
        obj.insert("code".to_owned(), code.into());
        obj.insert("message".to_owned(), Value::String(message.into()));
        Self(obj)
    }

    fn success(mut obj: Map<String, Value>) -> Self {
        obj.entry("code").or_insert(Value::from(0));
        Self(obj)
    }

    pub fn code(&self) -> &Value {
        self.0.get("code").unwrap_or(&Value::Null)
    }

    /// `true` when `code` is `0`.
    pub fn is_success(&self) -> bool {
        self.code() == &Value::from(0)
    }

    pub fn message(&self) -> Option<&Value> {
        self.0.get("message")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(&self.0).unwrap_or_default()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_owned(), value);
    }
}

/// What the dispatcher hands to the [`Responder`](crate::Responder).
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// The handler already produced the HTTP response.
    AlreadyHandled,
    Envelope(Envelope),
}

impl Delivery {
    pub fn envelope(self) -> Option<Envelope> {
        match self {
            Self::Envelope(env) => Some(env),
            Self::AlreadyHandled => None,
        }
    }
}

impl From<Envelope> for Delivery {
    fn from(env: Envelope) -> Self { Self::Envelope(env) }
}

// ── normalize ─────────────────────────────────────────────────────────────────

/// Folds a fault and/or a result into a [`Delivery`].
///
/// A truthy fault always wins, however rich the result is.
///
/// ```
/// use restify::{normalize, Fault, Reply};
/// use serde_json::json;
///
/// let env = normalize(None, Some(Reply::from(json!({"id": "foo", "value": 12}))))
///     .envelope()
///     .unwrap();
/// assert_eq!(env.into_value(), json!({"code": 0, "id": "foo", "value": 12}));
///
/// let env = normalize(Some(Fault::from("missing_param")), None).envelope().unwrap();
/// assert_eq!(env.into_value(), json!({"code": "missing_param", "message": "no details"}));
/// ```
pub fn normalize(error: Option<Fault>, result: Option<Reply>) -> Delivery {
    if let Some(fault) = error.filter(Fault::is_truthy) {
        return fault.into_envelope().into();
    }

    match result.unwrap_or(Reply::Value(Value::Null)) {
        Reply::Handled => Delivery::AlreadyHandled,
        Reply::Value(Value::Object(obj)) => Envelope::success(obj).into(),
        Reply::Value(other) => {
            let mut obj = Map::new();
            obj.insert("message".to_owned(), other);
            Envelope::success(obj).into()
        }
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
