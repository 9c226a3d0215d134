//! Application services for branch synchronisation.

mod engine;
mod executor;
mod ledger;
mod merge;
mod predictor;
mod registry;

pub use engine::{FastForwardEngine, SyncJobContext};
pub use executor::{ExecuteError, SyncExecutor, SyncRunner};
pub use ledger::{LedgerError, LedgerResult, RunLedger};
pub use merge::{MergeError, MergeOutcome, MergeRequest, MergeService};
pub use predictor::{ConflictPredictor, MergeCheckError};
pub use registry::{
    RepositoryRegistration, SyncTaskService, SyncTaskServiceError, SyncTaskServiceResult,
};
