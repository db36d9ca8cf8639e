use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::booking::WizardError;
use crate::config::offset_from_minutes;
use crate::documents::DocumentError;
use crate::error::StoreError;
use crate::insights::InsightError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;
use crate::model::{parse_ts, year_in_range, ParseEnumError, User, MAX_YEAR, MIN_YEAR};
use crate::payments::PaymentError;
use crate::store::Store;

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

pub type HandlerResult = Result<Value, HandlerErr>;

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(message) => HandlerErr::bad_params(message),
            StoreError::NotFound { entity } => HandlerErr::not_found(format!("{entity} not found")),
            StoreError::SlotUnavailable { conflicting_id } => {
                HandlerErr::new("slot_unavailable", "slot no longer available")
                    .with_details(json!({ "conflictingAppointmentId": conflicting_id }))
            }
            StoreError::Database(e) => {
                warn!(error = %e, "store query failed");
                HandlerErr::new("db_query_failed", e.to_string())
            }
        }
    }
}

impl From<WizardError> for HandlerErr {
    fn from(e: WizardError) -> Self {
        match e {
            WizardError::SlotTaken(_) => HandlerErr::new("slot_unavailable", e.to_string()),
            WizardError::WrongStep(step) => {
                HandlerErr::bad_params(e.to_string()).with_details(json!({ "step": step }))
            }
            other => HandlerErr::bad_params(other.to_string()),
        }
    }
}

impl From<PaymentError> for HandlerErr {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::AlreadySettled(status) => {
                HandlerErr::bad_params(e.to_string()).with_details(json!({ "status": status }))
            }
            other => HandlerErr::bad_params(other.to_string()),
        }
    }
}

impl From<DocumentError> for HandlerErr {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Expired => HandlerErr::new("document_expired", e.to_string()),
            DocumentError::WrongStatus { status, .. } => {
                HandlerErr::bad_params(e.to_string()).with_details(json!({ "status": status }))
            }
        }
    }
}

impl From<InsightError> for HandlerErr {
    fn from(e: InsightError) -> Self {
        HandlerErr::new("upstream_failed", e.to_string())
    }
}

/// Envelope for a handler outcome.
pub fn respond(id: &str, result: HandlerResult) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("serialize_failed", e.to_string()))
}

pub fn store(state: &AppState) -> Result<&dyn Store, HandlerErr> {
    state
        .store
        .as_deref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn store_mut(state: &mut AppState) -> Result<&mut (dyn Store + 'static), HandlerErr> {
    state
        .store
        .as_deref_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// The signed-in user; a store must be open for anyone to be signed in.
pub fn current_user(state: &AppState) -> Result<User, HandlerErr> {
    store(state)?;
    state
        .session
        .as_ref()
        .map(|s| s.user.clone())
        .ok_or_else(|| HandlerErr::new("unauthorized", "sign in first"))
}

pub fn require_supervisor(user: &User) -> Result<(), HandlerErr> {
    if user.role.is_supervisor() {
        Ok(())
    } else {
        Err(HandlerErr::forbidden("trainer or admin role required")
            .with_details(json!({ "role": user.role })))
    }
}

/// Trimmed, non-empty string param.
pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    get_opt_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed string param; blank and non-string values read as absent.
pub fn get_opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Patch semantics: absent leaves the field alone, `null` clears it.
pub fn get_patch_str(params: &Value, key: &str) -> Result<Option<Option<String>>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => Ok(Some(Some(s.clone()))),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_opt_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_opt_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn get_opt_enum<T>(params: &Value, key: &str) -> Result<Option<T>, HandlerErr>
where
    T: FromStr<Err = ParseEnumError>,
{
    get_opt_str(params, key)
        .map(|raw| raw.parse::<T>().map_err(|e| HandlerErr::bad_params(e.to_string())))
        .transpose()
}

pub fn get_required_enum<T>(params: &Value, key: &str) -> Result<T, HandlerErr>
where
    T: FromStr<Err = ParseEnumError>,
{
    get_opt_enum(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// `YYYY-MM-DD` with a year in `MIN_YEAR..=MAX_YEAR`.
pub fn get_opt_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    get_opt_str(params, key)
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .ok()
                .filter(|d| year_in_range(d.year()))
                .ok_or_else(|| {
                    HandlerErr::bad_params(format!(
                        "{} must be YYYY-MM-DD between years {:04} and {}, got '{}'",
                        key, MIN_YEAR, MAX_YEAR, raw
                    ))
                })
        })
        .transpose()
}

pub fn get_required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    get_opt_date(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// RFC 3339 instant.
pub fn get_opt_ts(params: &Value, key: &str) -> Result<Option<DateTime<Utc>>, HandlerErr> {
    get_opt_str(params, key)
        .map(|raw| {
            parse_ts(&raw).ok_or_else(|| {
                HandlerErr::bad_params(format!("{} must be an RFC 3339 timestamp", key))
            })
        })
        .transpose()
}

/// `utcOffsetMinutes` from the request, else the configured default.
pub fn offset_param(state: &AppState, params: &Value) -> Result<FixedOffset, HandlerErr> {
    match get_opt_i64(params, "utcOffsetMinutes")? {
        None => Ok(state.config.default_offset),
        Some(minutes) => i32::try_from(minutes)
            .ok()
            .and_then(offset_from_minutes)
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("utcOffsetMinutes out of range: {}", minutes))
            }),
    }
}
