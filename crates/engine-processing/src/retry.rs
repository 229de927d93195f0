use crate::error::{ChainError, TransformError};
use connectors::error::WriteError;
use engine_core::retry::RetryDisposition;
use mongodb::error::{
    Error as MongoError, ErrorKind as MongoErrorKind, RETRYABLE_WRITE_ERROR,
    TRANSIENT_TRANSACTION_ERROR,
};
use tokio_postgres::{Error as PgError, error::SqlState};

pub fn classify_transform_error(err: &TransformError) -> RetryDisposition {
    match err {
        TransformError::Transient(_) => RetryDisposition::Retry,
        TransformError::MissingKey { .. }
        | TransformError::EmptyIdentifier { .. }
        | TransformError::UnsupportedKey { .. }
        | TransformError::Malformed(_) => RetryDisposition::Stop,
    }
}

pub fn classify_chain_error(err: &ChainError) -> RetryDisposition {
    classify_write_error(&err.source)
}

pub fn classify_write_error(err: &WriteError) -> RetryDisposition {
    match err {
        WriteError::Postgres(pg_err) => classify_pg_error(pg_err),
        WriteError::Mongo(mongo_err) => classify_mongo_error(mongo_err),
        WriteError::Transient(_) => RetryDisposition::Retry,
        WriteError::Encode { .. } => RetryDisposition::Stop,
        WriteError::Rejected(_) => RetryDisposition::Stop,
    }
}

fn classify_pg_error(err: &PgError) -> RetryDisposition {
    if err.is_closed() {
        return RetryDisposition::Retry;
    }

    if let Some(code) = err.code()
        && is_retryable_pg_code(code)
    {
        return RetryDisposition::Retry;
    }

    RetryDisposition::Stop
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
    )
}

fn classify_mongo_error(err: &MongoError) -> RetryDisposition {
    if err.contains_label(RETRYABLE_WRITE_ERROR) || err.contains_label(TRANSIENT_TRANSACTION_ERROR)
    {
        return RetryDisposition::Retry;
    }

    match err.kind.as_ref() {
        MongoErrorKind::Io(_)
        | MongoErrorKind::ConnectionPoolCleared { .. }
        | MongoErrorKind::ServerSelection { .. } => RetryDisposition::Retry,
        _ => RetryDisposition::Stop,
    }
}
