use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::BookingError;
use crate::models::slot::TimeOfDay;

/// Prefix shared by application keys in the store.
pub const APPLICATION_KEY_PREFIX: &str = "application:";

/// Keys that belong to the record itself and are never accepted from a payload.
pub const RESERVED_KEYS: [&str; 4] = ["id", "createdAt", "appointmentDate", "appointmentTime"];

/// Millisecond-timestamp identifier of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId(i64);

impl ApplicationId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// The store key holding this application.
    pub fn key(&self) -> String {
        format!("{}{}", APPLICATION_KEY_PREFIX, self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ApplicationId {
    type Err = BookingError;

    /// Accepts both `1723971600000` and the store key form `application:1723971600000`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let digits = raw.strip_prefix(APPLICATION_KEY_PREFIX).unwrap_or(raw);
        digits
            .parse::<i64>()
            .ok()
            .filter(|value| *value >= 0)
            .map(Self)
            .ok_or_else(|| BookingError::Validation(format!("Invalid application ID '{}'", s)))
    }
}

impl TryFrom<String> for ApplicationId {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApplicationId> for String {
    fn from(value: ApplicationId) -> Self {
        value.to_string()
    }
}

/// A single scalar form answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(serde_json::Number),
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

/// The open bag of student, guardian and exam answers carried by an application.
///
/// The allocator never inspects these fields; they travel opaquely between the
/// form and the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, FieldValue>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops keys owned by the record itself.
    pub fn sanitized(mut self) -> Self {
        self.0.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        self
    }
}

impl FromIterator<(String, FieldValue)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A committed application: one booked slot plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: ApplicationId,
    pub created_at: DateTime<Utc>,
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeOfDay,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeOfDay,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Admin edit. The payload replaces the stored one; an omitted date or time
/// keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApplicationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_time: Option<TimeOfDay>,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelApplicationResponse {
    pub id: ApplicationId,
    pub cancelled_at: DateTime<Utc>,
}
