//! Scriptable fakes of the outside world for processor and scheduler tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use inboxpay_ai::{ExtractionOutcome, MessageContent, PaymentCandidate};

use crate::external::{
    ExtractionOracle, MessagePage, MessageSource, OracleError, RefreshedToken, SourceError, TokenRefresher,
};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub struct FakeRefresher {
    result: Result<RefreshedToken, SourceError>,
    calls: AtomicUsize,
}

impl FakeRefresher {
    pub fn ok(access_token: &str, rotated: Option<&str>) -> Self {
        Self {
            result: Ok(RefreshedToken {
                access_token: access_token.to_string(),
                refresh_token: rotated.map(str::to_string),
                expires_at: fixed_now() + chrono::Duration::hours(1),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(SourceError::Api {
                status: 400,
                body: reason.to_string(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        fixed_now() + chrono::Duration::hours(1)
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedToken, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// One recorded `list_message_ids` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub access_token: String,
    pub query: String,
    pub page_size: u32,
    pub cursor: Option<String>,
}

/// A mailbox with pages keyed by cursor and messages keyed by id.
#[derive(Default)]
pub struct FakeMailbox {
    pages: Mutex<HashMap<Option<String>, MessagePage>>,
    messages: Mutex<HashMap<String, MessageContent>>,
    broken_messages: Mutex<HashSet<String>>,
    list_error: Mutex<Option<SourceError>>,
    list_calls: Mutex<Vec<ListCall>>,
    fetch_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, cursor: Option<&str>, ids: &[&str], next_cursor: Option<&str>) -> Self {
        self.pages.lock().unwrap().insert(
            cursor.map(str::to_string),
            MessagePage {
                ids: ids.iter().map(|id| id.to_string()).collect(),
                next_cursor: next_cursor.map(str::to_string),
            },
        );
        self
    }

    pub fn with_message(self, id: &str, from: &str, subject: &str, body: &str) -> Self {
        self.messages.lock().unwrap().insert(
            id.to_string(),
            MessageContent {
                from: from.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            },
        );
        self
    }

    pub fn with_broken_message(self, id: &str) -> Self {
        self.broken_messages.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn fail_listing(&self, error: SourceError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    pub fn list_calls(&self) -> Vec<ListCall> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for FakeMailbox {
    async fn list_message_ids(
        &self,
        access_token: &str,
        query: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<MessagePage, SourceError> {
        self.list_calls.lock().unwrap().push(ListCall {
            access_token: access_token.to_string(),
            query: query.to_string(),
            page_size,
            cursor: cursor.map(str::to_string),
        });
        if let Some(error) = self.list_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&cursor.map(str::to_string))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_message(&self, _access_token: &str, message_id: &str) -> Result<MessageContent, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_messages.lock().unwrap().contains(message_id) {
            return Err(SourceError::Network(format!("connection reset fetching {message_id}")));
        }
        self.messages
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| SourceError::Api {
                status: 404,
                body: format!("message {message_id} not found"),
            })
    }
}

/// Answers by subject line; unknown subjects get an all-null reply.
#[derive(Default)]
pub struct FakeOracle {
    answers: Mutex<HashMap<String, PaymentCandidate>>,
    failing_senders: Mutex<HashSet<String>>,
    batches: Mutex<Vec<usize>>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, subject: &str, candidate: PaymentCandidate) -> Self {
        self.answers.lock().unwrap().insert(subject.to_string(), candidate);
        self
    }

    /// Any batch holding a message from `sender` fails as a whole.
    pub fn fail_for_sender(self, sender: &str) -> Self {
        self.failing_senders.lock().unwrap().insert(sender.to_string());
        self
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionOracle for FakeOracle {
    async fn extract_batch(&self, messages: &[MessageContent]) -> Result<Vec<ExtractionOutcome>, OracleError> {
        self.batches.lock().unwrap().push(messages.len());
        let failing = self.failing_senders.lock().unwrap();
        if messages.iter().any(|m| failing.contains(&m.from)) {
            return Err(OracleError::Api {
                status: 503,
                body: "model overloaded".into(),
            });
        }

        let answers = self.answers.lock().unwrap();
        Ok(messages
            .iter()
            .map(|m| {
                let raw = json!({"subject": m.subject});
                match answers.get(&m.subject) {
                    Some(candidate) => ExtractionOutcome::payment(candidate.clone(), raw),
                    None => ExtractionOutcome::no_payment(raw),
                }
            })
            .collect())
    }
}

pub fn netflix_candidate() -> PaymentCandidate {
    PaymentCandidate {
        merchant_name: Some("Netflix".into()),
        amount: Some(19.99),
        currency: Some("USD".into()),
        due: Some("2025-07-01T00:00:00".into()),
        status: Some("upcoming".into()),
        recurrence: Some("monthly".into()),
        ..Default::default()
    }
}
