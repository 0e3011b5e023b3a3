//! Extracted payment records.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::{AccountId, PaymentId};

/// Status tag applied when the model leaves it blank.
pub const DEFAULT_PAYMENT_STATUS: &str = "upcoming";

/// A payment extracted from one message.
///
/// Written once by the extraction stage and never updated by the pipeline.
/// `raw_response` keeps the verbatim model output for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub account_id: AccountId,
    pub merchant: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub date: DateTime<Utc>,
    pub recurrence: Option<String>,
    pub status: String,
    pub category: Option<String>,
    pub external_reference: Option<String>,
    pub metadata: JsonValue,
    pub raw_response: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
