//! Shared shape of the three pipeline job kinds.
//!
//! Account, discovery and extraction jobs differ in payload and processing but
//! share one scheduling shape: a status with pending/processing/failed states,
//! an attempt counter, a last error, and a position in a fairness ordering.
//! [`JobRecord`] and [`JobStatus`] capture that shape so the scheduler can poll
//! and claim every kind through the same code path.

use core::fmt;
use core::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::AccountId;

/// The three job kinds driven by the scheduler.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Account,
    Discovery,
    Extraction,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Account => "account",
            JobKind::Discovery => "discovery",
            JobKind::Extraction => "extraction",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status vocabulary of one job kind.
pub trait JobStatus:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const PENDING: Self;
    const PROCESSING: Self;
    const FAILED: Self;

    /// Statuses the scheduler polls, in the order their due-sets are concatenated.
    const DUE: [Self; 3] = [Self::PENDING, Self::FAILED, Self::PROCESSING];

    /// Whether entering this status stamps `processed_at`.
    ///
    /// Every other status clears it.
    fn is_settled(&self) -> bool;
}

/// Ordering key for due-set reads.
///
/// `None` sorts before `Some`, which gives "never serviced first, then least
/// recently serviced" when sorted ascending. Creation time breaks ties.
pub type FairnessKey = (Option<DateTime<Utc>>, DateTime<Utc>);

/// A persisted job row as seen by the scheduler.
pub trait JobRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Id: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Status: JobStatus;

    const KIND: JobKind;

    fn id(&self) -> Self::Id;

    fn account_id(&self) -> AccountId;

    fn status(&self) -> Self::Status;

    fn attempts(&self) -> u32;

    fn fairness_key(&self) -> FairnessKey;

    /// Apply a status transition with its timestamp side effects.
    fn apply_status(&mut self, status: Self::Status, error: Option<String>, now: DateTime<Utc>);

    /// Record one more processing attempt.
    fn bump_attempts(&mut self, now: DateTime<Utc>);
}

/// Implements `as_str`, `Display` and `FromStr` for a status-like enum whose
/// variants map one-to-one onto persisted tags.
macro_rules! impl_tag_enum {
    ($t:ty, $kind:literal, { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl $t {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $tag,)+
                }
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok(Self::$variant),)+
                    other => Err($crate::error::DomainError::unknown_tag($kind, other)),
                }
            }
        }
    };
}

pub(crate) use impl_tag_enum;
