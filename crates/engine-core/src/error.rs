use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Failed to encode or decode run record: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Run '{run_id}' of job '{job_name}' is not recorded")]
    UnknownRun { job_name: String, run_id: String },
}
