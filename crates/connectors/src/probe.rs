use crate::{
    error::ConnectorError, mongo::client::connect_database, sql::postgres::utils::connect_client,
};
use async_trait::async_trait;
use mongodb::bson::doc;
use tracing::{error, info};

/// Reachability check for an external store.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self) -> Result<(), ConnectorError>;
}

pub struct PostgresProbe {
    pub conn_str: String,
}

#[async_trait]
impl HealthProbe for PostgresProbe {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn probe(&self) -> Result<(), ConnectorError> {
        let client = connect_client(&self.conn_str).await.inspect_err(|e| {
            error!(error = %e, "Postgres connection failed");
        })?;

        let val: i32 = client.query_one("SELECT 1", &[]).await?.get(0);
        if val != 1 {
            return Err(ConnectorError::UnexpectedResult(format!(
                "SELECT 1 returned {val}"
            )));
        }

        info!("Postgres ping succeeded");
        Ok(())
    }
}

pub struct MongoProbe {
    pub uri: String,
    pub database: String,
}

#[async_trait]
impl HealthProbe for MongoProbe {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn probe(&self) -> Result<(), ConnectorError> {
        let db = connect_database(&self.uri, &self.database).await?;
        db.run_command(doc! { "ping": 1 }).await.inspect_err(|e| {
            error!(error = %e, "MongoDB ping failed");
        })?;

        info!(database = %self.database, "MongoDB ping succeeded");
        Ok(())
    }
}
