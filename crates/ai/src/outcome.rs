use serde_json::Value as JsonValue;

use crate::candidate::PaymentCandidate;

/// What the model said about one message.
///
/// `candidate` is `None` when the model explicitly signalled "no payment".
/// `raw_response` is the verbatim reply, kept for audit on the stored payment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub candidate: Option<PaymentCandidate>,
    pub raw_response: JsonValue,
}

impl ExtractionOutcome {
    pub fn payment(candidate: PaymentCandidate, raw_response: JsonValue) -> Self {
        Self {
            candidate: Some(candidate),
            raw_response,
        }
    }

    pub fn no_payment(raw_response: JsonValue) -> Self {
        Self {
            candidate: None,
            raw_response,
        }
    }

    /// Classify a parsed reply: an all-null candidate is "no payment".
    pub fn from_candidate(candidate: PaymentCandidate, raw_response: JsonValue) -> Self {
        if candidate.is_blank() {
            Self::no_payment(raw_response)
        } else {
            Self::payment(candidate, raw_response)
        }
    }
}
