//! Infrastructure layer: job store, credentials, processors, scheduler and
//! HTTP adapters for the mail provider and the extraction model.

pub mod config;
pub mod credentials;
pub mod external;
pub mod processors;
pub mod scheduler;
pub mod store;

pub use config::PipelineConfig;
pub use credentials::{CredentialError, CredentialResolver};
pub use scheduler::{Scheduler, SweepReport, TickReport};

#[cfg(test)]
pub(crate) mod test_support;
