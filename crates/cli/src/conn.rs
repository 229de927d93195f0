use crate::error::CliError;
use connectors::probe::{HealthProbe, MongoProbe, PostgresProbe};
use std::str::FromStr;
use tracing::info;

/// Database probed by `test-conn --format mongo`; `ping` is answered by any database.
const MONGO_PING_DATABASE: &str = "admin";

/// What kind of connection to check
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    Postgres,
    Mongo,
}

impl FromStr for ConnectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(ConnectionKind::Postgres),
            "mongo" | "mongodb" => Ok(ConnectionKind::Mongo),
            other => Err(format!("Unknown connection kind: {other}")),
        }
    }
}

impl ConnectionKind {
    pub fn probe(&self, conn_str: &str) -> Box<dyn HealthProbe> {
        match self {
            ConnectionKind::Postgres => Box::new(PostgresProbe {
                conn_str: conn_str.to_string(),
            }),
            ConnectionKind::Mongo => Box::new(MongoProbe {
                uri: conn_str.to_string(),
                database: MONGO_PING_DATABASE.to_string(),
            }),
        }
    }
}

pub async fn test_connection(format: &str, conn_str: &str) -> Result<(), CliError> {
    let kind = ConnectionKind::from_str(format)
        .map_err(|_| CliError::InvalidConnectionFormat(format.to_string()))?;
    let probe = kind.probe(conn_str);

    info!(kind = ?kind, "Testing connection");
    probe.probe().await?;
    println!("{} connection OK", probe.name());
    Ok(())
}
