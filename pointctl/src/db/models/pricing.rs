use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One pricing catalogue entry. Mutating the catalogue is out of scope here;
/// the ledger only ever reads the single active row per work type.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingEntry {
    pub id: Uuid,
    pub work_type: String,
    pub unit_price: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
