use crate::{catalog::JobCatalog, error::ConfigurationError, validation::validate_job};
use async_trait::async_trait;
use model::execution::job::JobSpec;
use std::collections::BTreeMap;

/// Fixed set of jobs held in memory, validated up front.
#[derive(Debug, Clone, Default)]
pub struct StaticJobCatalog {
    jobs: BTreeMap<String, JobSpec>,
}

impl StaticJobCatalog {
    pub fn new(jobs: impl IntoIterator<Item = JobSpec>) -> Result<Self, ConfigurationError> {
        let mut catalog = Self::default();
        for job in jobs {
            validate_job(&job)?;
            catalog.jobs.insert(job.name.clone(), job);
        }
        Ok(catalog)
    }
}

#[async_trait]
impl JobCatalog for StaticJobCatalog {
    async fn job(&self, name: &str) -> Result<JobSpec, ConfigurationError> {
        self.jobs
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownJob(name.to_string()))
    }

    async fn job_names(&self) -> Result<Vec<String>, ConfigurationError> {
        Ok(self.jobs.keys().cloned().collect())
    }
}
