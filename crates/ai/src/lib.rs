//! `inboxpay-ai`
//!
//! **Responsibility:** the language-model boundary of the pipeline.
//!
//! This crate is deliberately pure and synchronous:
//! - It builds prompts and parses replies; transport lives in `inboxpay-infra`.
//! - It never touches the job store.
//! - Its validation gate decides "payment" vs "no payment"; it never raises
//!   an error for a message that simply holds no payment.

pub mod candidate;
pub mod error;
pub mod outcome;
pub mod prompt;

pub use candidate::{CandidateRejection, PaymentCandidate, ValidatedPayment, parse_effective_date};
pub use error::AiError;
pub use outcome::ExtractionOutcome;
pub use prompt::{MessageContent, build_prompt, extract_json_object, parse_candidate};
