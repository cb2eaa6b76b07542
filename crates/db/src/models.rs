use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;

#[derive(Debug, Clone, FromRow)]
pub struct DbEntry {
    pub key: String,
    pub value: Json<Value>,
    pub updated_at: DateTime<Utc>,
}
