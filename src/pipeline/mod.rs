pub mod decision;
pub mod error;
pub mod hazard;
pub mod ingest;
pub mod matcher;
pub mod merge;
pub mod notify;
pub mod orchestrator;
pub mod pacing;
pub mod registry_sync;
pub mod review;
pub mod run;
pub mod substitution;
pub mod types;

pub use error::{ErrorClass, SyncError};
pub use orchestrator::{JobReport, Orchestrator};
pub use pacing::CancelFlag;
pub use run::Collaborators;
