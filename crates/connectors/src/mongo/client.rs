use crate::error::ConnectorError;
use mongodb::{Client as MongoClient, Database, options::ClientOptions};
use tracing::info;

/// Connects to MongoDB and returns a handle to `database`.
/// The driver pools connections internally; the handle is cheap to clone.
pub async fn connect_database(uri: &str, database: &str) -> Result<Database, ConnectorError> {
    let mut options = ClientOptions::parse(uri).await?;
    if options.app_name.is_none() {
        options.app_name = Some("migrate".to_string());
    }

    let client = MongoClient::with_options(options)?;
    info!(database = %database, "MongoDB client ready");
    Ok(client.database(database))
}
