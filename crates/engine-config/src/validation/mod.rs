use crate::error::ConfigurationError;
use model::execution::job::JobSpec;

/// Checks everything a run relies on before it starts. Reports every problem at once.
pub fn validate_job(job: &JobSpec) -> Result<(), ConfigurationError> {
    let mut problems = Vec::new();

    if job.name.trim().is_empty() {
        problems.push("job name is empty".to_string());
    }
    if job.source.table.trim().is_empty() {
        problems.push("source table is empty".to_string());
    }
    if job.source.key_columns.is_empty() {
        problems.push("at least one key column is required".to_string());
    }
    if job.source.key_columns.iter().any(|c| c.trim().is_empty()) {
        problems.push("key column names must not be blank".to_string());
    }
    if job.target.collection.trim().is_empty() {
        problems.push("target collection is empty".to_string());
    }
    if job.archive.enabled
        && job
            .archive
            .table
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
    {
        problems.push("archive is enabled but no archive table is set".to_string());
    }

    let t = &job.tunables;
    if t.chunk_size == 0 {
        problems.push("chunk_size must be greater than 0".to_string());
    }
    if t.throttle_limit == 0 {
        problems.push("throttle_limit must be greater than 0".to_string());
    }
    if t.fetch_size == 0 {
        problems.push("fetch_size must be greater than 0".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigurationError::Invalid {
            job: job.name.clone(),
            reason: problems.join("; "),
        })
    }
}
