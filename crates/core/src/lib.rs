//! `inboxpay-core`: domain building blocks of the payment extraction pipeline.
//!
//! This crate contains **pure domain** types (no I/O): identifiers, the three
//! job kinds with their status machines, accounts and payments.

pub mod account;
pub mod discovery;
pub mod error;
pub mod extraction;
pub mod id;
pub mod job;
pub mod payment;

pub use account::{Account, AccountJob, AccountJobStatus};
pub use discovery::{DiscoveryJob, DiscoveryJobStatus, SyncMode};
pub use error::DomainError;
pub use extraction::{ExtractionJob, ExtractionJobStatus};
pub use id::{AccountId, AccountJobId, DiscoveryJobId, ExtractionJobId, PaymentId};
pub use job::{FairnessKey, JobKind, JobRecord, JobStatus};
pub use payment::{DEFAULT_PAYMENT_STATUS, Payment};
