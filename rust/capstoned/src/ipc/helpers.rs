use crate::error::GradeError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::rubric::Track;
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn db(code: &'static str, e: anyhow::Error) -> Self {
        Self::new(code, format!("{e:#}"))
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<GradeError> for HandlerErr {
    fn from(e: GradeError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: Some(e.details()),
        }
    }
}

pub type HandlerResult = Result<serde_json::Value, HandlerErr>;

pub fn respond(req: &Request, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            log::warn!(
                "event=request_failed method={} code={} message={}",
                req.method,
                e.code,
                e.message
            );
            e.response(&req.id)
        }
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn str_param(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) => Ok(v.to_string()),
        None => Err(HandlerErr::new(
            "bad_params",
            format!("missing params.{key}"),
        )),
    }
}

/// Missing and null both read as "".
pub fn opt_str_param(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(HandlerErr::new(
            "bad_params",
            format!("params.{key} must be a string"),
        )
        .with_details(json!({ "value": other }))),
    }
}

pub fn track_param(req: &Request) -> Result<Track, HandlerErr> {
    let raw = str_param(req, "track")?;
    Track::parse(&raw).ok_or_else(|| {
        HandlerErr::new("bad_params", "track must be one of: research, design")
            .with_details(json!({ "track": raw }))
    })
}
