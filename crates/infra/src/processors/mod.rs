//! Per-stage job processors.
//!
//! - [`AccountProcessor`]: validates a connected account and seeds discovery
//! - [`DiscoveryProcessor`]: pages message identifiers into extraction jobs
//! - [`ExtractionProcessor`]: turns messages into payments
//!
//! Account and discovery processors return an outcome and leave the status
//! transition to the scheduler. The extraction processor records each job's
//! status itself, since one batch settles jobs of several accounts.

pub mod account;
pub mod discovery;
pub mod extraction;

pub use account::{AccountProcessor, AccountSetupError};
pub use discovery::{BASE_QUERY, DiscoveryError, DiscoveryProcessor, build_query};
pub use extraction::{ExtractionProcessor, ExtractionSummary};
