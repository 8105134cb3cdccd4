//! Tenant-scoped database operations.
//!
//! Every function that reads or writes tenant data takes the owning
//! `TenantId` and filters on it; none of them accept a bare record id.

mod audit;
mod chemical;
mod ledger;
mod notification;
mod pending;
mod substitution;
mod sync_run;
mod tenant;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Value;
use uuid::Uuid;

use super::DatabaseError;
use crate::models::FieldValue;
use crate::tenancy::TenantId;

// Re-export all public items from sub-modules
pub use audit::*;
pub use chemical::*;
pub use ledger::*;
pub use notification::*;
pub use pending::*;
pub use substitution::*;
pub use sync_run::*;
pub use tenant::*;

pub(crate) const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_opt_date(raw: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    raw.as_deref()
        .map(|s| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map_err(|e| DatabaseError::ConstraintViolation(format!("bad date {s:?}: {e}")))
        })
        .transpose()
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_opt_uuid(raw: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    raw.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_tenant(raw: &str) -> Result<TenantId, DatabaseError> {
    TenantId::parse(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

/// SQLite representation of a typed field value.
pub(crate) fn field_value_to_sql(value: &FieldValue) -> Result<Value, DatabaseError> {
    Ok(match value {
        FieldValue::Null => Value::Null,
        FieldValue::Flag(flag) => Value::Integer(*flag as i64),
        FieldValue::Date(date) => Value::Text(fmt_date(*date)),
        FieldValue::Timestamp(ts) => Value::Text(fmt_ts(*ts)),
        FieldValue::List(items) => Value::Text(serde_json::to_string(items)?),
        FieldValue::Text(text) => Value::Text(text.clone()),
    })
}
