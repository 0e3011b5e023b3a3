//! Prompt construction and model-output parsing.

use crate::candidate::PaymentCandidate;
use crate::error::AiError;

/// The parts of a message the model sees.
///
/// Message content is held only in memory for the duration of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub from: String,
    pub subject: String,
    pub body: String,
}

const INSTRUCTIONS: &str = r#"Extract upcoming-payment details from the message below.

Reply with a single JSON object and nothing else, using exactly these keys:

{
  "merchant_name": string or null,
  "description": string or null,
  "amount": number or null,
  "currency": string or null,
  "due": string or null,
  "recurrence": string or null,
  "status": string or null,
  "category": string or null,
  "external_reference": string or null,
  "metadata": object
}

Field rules:
- merchant_name: the business requesting payment, taken from the text only.
- amount: a plain number, no currency symbols or thousands separators.
- currency: ISO 4217 code (USD, EUR, GBP, INR, ...).
- due: next due date as YYYY-MM-DDTHH:MM:SS; use T00:00:00 when only a date is known.
- recurrence: null, "daily", "weekly", "monthly", "quarterly", "semiannual" or "yearly".
- status: "upcoming", "due_soon", "overdue", "paid" or "cancelled"; default "upcoming".
- category: "subscription", "utility", "emi", "credit_card_bill", "loan", "insurance", "rent" or "misc".
- external_reference: invoice, order, bill or subscription number when present.
- metadata: any other useful detail (billing period, plan, card used, customer id).

If the message does not describe a payment, set every field to null and metadata to {}.
"#;

/// Build the extraction prompt for one message.
pub fn build_prompt(message: &MessageContent) -> String {
    format!(
        "{INSTRUCTIONS}\nFrom: {}\nSubject: {}\n\n{}",
        message.from, message.subject, message.body
    )
}

/// Cut the JSON object out of a model reply.
///
/// Models often wrap the object in prose or a markdown fence; everything
/// before the first `{` and after the last `}` is dropped. Without a brace
/// pair the trimmed input is returned and the JSON parser reports the error.
pub fn extract_json_object(content: &str) -> &str {
    let content = content.trim();
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    }
}

/// Parse a model reply into a candidate.
pub fn parse_candidate(content: &str) -> Result<PaymentCandidate, AiError> {
    serde_json::from_str(extract_json_object(content))
        .map_err(|e| AiError::MalformedResponse(format!("candidate JSON: {e}")))
}
