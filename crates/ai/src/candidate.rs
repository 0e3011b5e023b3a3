//! Extraction candidates and the validation gate in front of payment storage.

use core::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use inboxpay_core::{AccountId, DEFAULT_PAYMENT_STATUS, Payment, PaymentId};

/// Provisional payment as returned by the model, before validation.
///
/// Every field is optional: a message without a payment typically comes back
/// with all fields null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentCandidate {
    pub merchant_name: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub due: Option<String>,
    pub recurrence: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub external_reference: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// Why a candidate was not turned into a payment.
///
/// A rejection is a normal outcome ("this message holds no payment"), not a
/// processing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateRejection {
    #[error("merchant name missing")]
    MissingMerchant,

    #[error("amount missing or not a positive finite number")]
    InvalidAmount,

    #[error("currency missing")]
    MissingCurrency,

    #[error("effective date missing")]
    MissingDate,

    #[error("effective date not parseable: {0}")]
    UnparseableDate(String),
}

/// A candidate that passed the validation gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayment {
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
}

impl PaymentCandidate {
    /// True when the model filled in nothing, its way of saying "no payment".
    pub fn is_blank(&self) -> bool {
        let metadata_blank = match &self.metadata {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::Object(map)) => map.is_empty(),
            Some(_) => false,
        };
        metadata_blank
            && [
                &self.merchant_name,
                &self.description,
                &self.currency,
                &self.due,
                &self.recurrence,
                &self.status,
                &self.category,
                &self.external_reference,
            ]
            .iter()
            .all(|field| field.as_deref().is_none_or(|v| v.trim().is_empty()))
            && self.amount.is_none()
    }

    /// Apply the validation gate.
    ///
    /// Accepted only when merchant, a finite positive amount, currency and an
    /// effective date in one of the accepted formats are all present. The
    /// amount is rounded to four places and must still be positive and fit
    /// the stored column.
    pub fn validate(self) -> Result<ValidatedPayment, CandidateRejection> {
        let merchant = non_blank(self.merchant_name).ok_or(CandidateRejection::MissingMerchant)?;

        let amount = self
            .amount
            .filter(|a| a.is_finite() && *a > 0.0)
            .ok_or(CandidateRejection::InvalidAmount)?;
        // Display of an f64 is its shortest round-trip form, so 19.99 stays "19.99".
        let amount =
            BigDecimal::from_str(&amount.to_string()).map_err(|_| CandidateRejection::InvalidAmount)?;
        let amount = storable_amount(amount).ok_or(CandidateRejection::InvalidAmount)?;

        let currency = non_blank(self.currency).ok_or(CandidateRejection::MissingCurrency)?;

        let due = non_blank(self.due).ok_or(CandidateRejection::MissingDate)?;
        let date = parse_effective_date(&due).ok_or(CandidateRejection::UnparseableDate(due))?;

        Ok(ValidatedPayment {
            merchant,
            description: non_blank(self.description),
            amount,
            currency,
            date,
            recurrence: non_blank(self.recurrence),
            status: non_blank(self.status).unwrap_or_else(|| DEFAULT_PAYMENT_STATUS.to_string()),
            category: non_blank(self.category),
            external_reference: non_blank(self.external_reference),
            metadata: match self.metadata {
                Some(JsonValue::Null) | None => JsonValue::Object(Default::default()),
                Some(other) => other,
            },
        })
    }
}

impl ValidatedPayment {
    pub fn into_payment(
        self,
        account_id: AccountId,
        raw_response: JsonValue,
        now: DateTime<Utc>,
    ) -> Payment {
        Payment {
            id: PaymentId::new(),
            account_id,
            merchant: self.merchant,
            description: self.description,
            amount: self.amount,
            currency: self.currency,
            date: self.date,
            recurrence: self.recurrence,
            status: self.status,
            category: self.category,
            external_reference: self.external_reference,
            metadata: self.metadata,
            raw_response,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fractional digits kept for a stored amount (`NUMERIC(18, 4)`).
const AMOUNT_SCALE: i64 = 4;

/// Exclusive upper bound of a stored amount: 14 integer digits.
const AMOUNT_LIMIT: i64 = 100_000_000_000_000;

/// Round to the stored scale; `None` when the result is not positive or
/// does not fit the column.
fn storable_amount(amount: BigDecimal) -> Option<BigDecimal> {
    let amount = if amount.as_bigint_and_exponent().1 > AMOUNT_SCALE {
        amount.round(AMOUNT_SCALE)
    } else {
        amount
    };
    (amount > BigDecimal::from(0) && amount < BigDecimal::from(AMOUNT_LIMIT)).then_some(amount)
}

/// Parse an effective date in any accepted format.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` (read as UTC) and `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_effective_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn netflix() -> PaymentCandidate {
        PaymentCandidate {
            merchant_name: Some("Netflix".into()),
            amount: Some(19.99),
            currency: Some("USD".into()),
            due: Some("2025-02-01T00:00:00".into()),
            status: Some("upcoming".into()),
            recurrence: Some("monthly".into()),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_complete_candidate() {
        let payment = netflix().validate().unwrap();

        assert_eq!(payment.merchant, "Netflix");
        assert_eq!(payment.amount, BigDecimal::from_str("19.99").unwrap());
        assert_eq!(payment.currency, "USD");
        assert_eq!(payment.date, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(payment.status, "upcoming");
        assert_eq!(payment.recurrence.as_deref(), Some("monthly"));
        assert_eq!(payment.metadata, serde_json::json!({}));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let candidate = PaymentCandidate {
            amount: Some(0.0),
            ..netflix()
        };
        assert_eq!(candidate.validate(), Err(CandidateRejection::InvalidAmount));
    }

    #[test]
    fn amount_below_stored_precision_is_rejected() {
        let candidate = PaymentCandidate {
            amount: Some(0.00001),
            ..netflix()
        };
        assert_eq!(candidate.validate(), Err(CandidateRejection::InvalidAmount));
    }

    #[test]
    fn amount_too_large_to_store_is_rejected() {
        for amount in [1e14, 1e15, 1e20] {
            let candidate = PaymentCandidate {
                amount: Some(amount),
                ..netflix()
            };
            assert_eq!(candidate.validate(), Err(CandidateRejection::InvalidAmount));
        }
    }

    #[test]
    fn amount_is_rounded_to_four_places() {
        let candidate = PaymentCandidate {
            amount: Some(12.345678),
            ..netflix()
        };
        let payment = candidate.validate().unwrap();
        assert_eq!(payment.amount, BigDecimal::from_str("12.3457").unwrap());

        let largest = PaymentCandidate {
            amount: Some(99_999_999_999_999.0),
            ..netflix()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn non_finite_amount_is_rejected() {
        let candidate = PaymentCandidate {
            amount: Some(f64::NAN),
            ..netflix()
        };
        assert_eq!(candidate.validate(), Err(CandidateRejection::InvalidAmount));
    }

    #[test]
    fn blank_merchant_is_rejected() {
        let candidate = PaymentCandidate {
            merchant_name: Some("   ".into()),
            ..netflix()
        };
        assert_eq!(candidate.validate(), Err(CandidateRejection::MissingMerchant));
    }

    #[test]
    fn all_null_candidate_is_rejected() {
        assert!(PaymentCandidate::default().validate().is_err());
    }

    #[test]
    fn unparseable_date_is_rejected() {
        let candidate = PaymentCandidate {
            due: Some("next tuesday".into()),
            ..netflix()
        };
        assert_eq!(
            candidate.validate(),
            Err(CandidateRejection::UnparseableDate("next tuesday".into()))
        );
    }

    #[test]
    fn blank_status_defaults_to_upcoming() {
        let candidate = PaymentCandidate {
            status: Some(String::new()),
            ..netflix()
        };
        assert_eq!(candidate.validate().unwrap().status, "upcoming");
    }

    #[test]
    fn accepted_date_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 15, 9, 30, 0).unwrap();
        assert_eq!(parse_effective_date("2025-03-15T09:30:00Z"), Some(expected));
        assert_eq!(parse_effective_date("2025-03-15T11:30:00+02:00"), Some(expected));
        assert_eq!(parse_effective_date("2025-03-15T09:30:00"), Some(expected));
        assert_eq!(
            parse_effective_date("2025-03-15"),
            Some(Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_effective_date("15/03/2025"), None);
    }

    #[test]
    fn into_payment_keeps_raw_response() {
        let account_id = AccountId::new();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let raw = serde_json::json!({"choices": []});

        let payment = netflix().validate().unwrap().into_payment(account_id, raw.clone(), now);

        assert_eq!(payment.account_id, account_id);
        assert_eq!(payment.raw_response, raw);
        assert_eq!(payment.created_at, now);
    }
}
