use crate::dates;
use crate::error::CoreError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

pub type HandlerResult = Result<serde_json::Value, HandlerErr>;

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<CoreError> for HandlerErr {
    fn from(e: CoreError) -> Self {
        if let CoreError::Store(inner) = &e {
            tracing::error!(error = %inner, "store failure");
        }
        Self {
            code: e.code(),
            details: e.details(),
            message: e.to_string(),
        }
    }
}

impl From<anyhow::Error> for HandlerErr {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(error = ?e, "settings access failed");
        Self::new("db_query_failed", format!("{e:#}"))
    }
}

impl From<serde_json::Error> for HandlerErr {
    fn from(e: serde_json::Error) -> Self {
        Self::new("encode_failed", e.to_string())
    }
}

pub fn respond(req: &Request, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Deserialize `params` into a typed struct; shape errors become `bad_params`.
pub fn params<T: DeserializeOwned>(req: &Request) -> Result<T, HandlerErr> {
    let raw = if req.params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        req.params.clone()
    };
    serde_json::from_value(raw).map_err(|e| HandlerErr::new("bad_params", e.to_string()))
}

pub fn to_json<T: Serialize>(value: T) -> HandlerResult {
    Ok(serde_json::to_value(value)?)
}

/// Wrap `value` under a single key, the shape every handler replies with.
pub fn keyed<T: Serialize>(key: &str, value: T) -> HandlerResult {
    let mut out = serde_json::Map::new();
    out.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(serde_json::Value::Object(out))
}

pub fn deleted() -> HandlerResult {
    Ok(serde_json::json!({ "ok": true }))
}

/// Optional `now` override for time-relative rules; defaults to local time.
#[derive(Debug, Default, Deserialize)]
pub struct Clock {
    now: Option<String>,
}

impl Clock {
    pub fn now(&self) -> Result<NaiveDateTime, HandlerErr> {
        Ok(dates::parse_optional_instant("now", self.now.as_deref())?.unwrap_or_else(dates::now_local))
    }
}
