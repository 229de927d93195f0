use crate::error::ChainError;
use connectors::writer::DocumentWriter;
use model::records::document::MigrationDocument;
use std::sync::Arc;

/// Ordered fan-out over the sink writers of a job. The upsert writer goes first,
/// so an archive row is only attempted for documents that reached the target.
#[derive(Clone, Default)]
pub struct WriterChain {
    writers: Vec<Arc<dyn DocumentWriter>>,
}

impl WriterChain {
    pub fn new(writers: Vec<Arc<dyn DocumentWriter>>) -> Self {
        Self { writers }
    }

    pub fn with_writer(mut self, writer: Arc<dyn DocumentWriter>) -> Self {
        self.writers.push(writer);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.writers.iter().map(|w| w.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Hands the documents to every writer in order, stopping at the first failure.
    pub async fn write(&self, documents: &[MigrationDocument]) -> Result<(), ChainError> {
        for writer in &self.writers {
            writer
                .write(documents)
                .await
                .map_err(|source| ChainError {
                    writer: writer.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::error::WriteError;
    use std::sync::Mutex;

    struct Named {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl DocumentWriter for Named {
        fn name(&self) -> &str {
            self.name
        }

        async fn write(&self, _documents: &[MigrationDocument]) -> Result<(), WriteError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(WriteError::Rejected("no".into()));
            }
            Ok(())
        }
    }

    fn writer(name: &'static str, fail: bool, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn DocumentWriter> {
        Arc::new(Named {
            name,
            fail,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn writers_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = WriterChain::new(vec![writer("upsert", false, &log), writer("archive", false, &log)]);

        chain.write(&[]).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["upsert", "archive"]);
        assert_eq!(chain.names(), vec!["upsert", "archive"]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = WriterChain::new(vec![writer("upsert", true, &log), writer("archive", false, &log)]);

        let err = chain.write(&[]).await.unwrap_err();

        assert_eq!(err.writer, "upsert");
        assert_eq!(*log.lock().unwrap(), vec!["upsert"]);
    }
}
