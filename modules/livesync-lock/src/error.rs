use livesync_common::LiveSyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Lock on {names:?} not acquired after {attempts} attempts")]
    NotAcquired { names: Vec<String>, attempts: u32 },

    #[error("Lock on {names:?} lost while the section was running")]
    Lost { names: Vec<String> },

    #[error("No lock names given")]
    NoNames,

    #[error("Lock backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error(transparent)]
    Config(#[from] LiveSyncError),
}
