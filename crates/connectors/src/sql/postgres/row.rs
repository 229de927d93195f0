use crate::error::ExtractionError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::{
    core::value::{FieldValue, Value},
    execution::job::SourceSpec,
    records::row::SourceRow,
};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use tokio_postgres::{
    Column, Row,
    types::{FromSql, Type},
};

/// Decodes a fetched row. Large-text columns are fully materialized as owned strings.
pub fn to_source_row(row: &Row, source: &SourceSpec) -> Result<SourceRow, ExtractionError> {
    let mut fields = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let value = if source.is_large_text(column.name()) {
            large_text_value(row, idx, column)?
        } else {
            scalar_value(row, idx, column)?
        };
        fields.push(FieldValue::new(column.name(), value));
    }

    Ok(SourceRow::new(&source.table, fields))
}

fn get<'a, T: FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    column: &Column,
) -> Result<Option<T>, ExtractionError> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| decode_error(column, e.to_string()))
}

fn decode_error(column: &Column, reason: impl Into<String>) -> ExtractionError {
    ExtractionError::Decode {
        column: column.name().to_string(),
        reason: reason.into(),
    }
}

fn scalar_value(row: &Row, idx: usize, column: &Column) -> Result<Value, ExtractionError> {
    let ty = column.type_();
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx, column)?.map(Value::Boolean),
        Type::INT2 => get::<i16>(row, idx, column)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx, column)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx, column)?.map(Value::Int),
        Type::FLOAT4 => get::<f32>(row, idx, column)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx, column)?.map(Value::Float),
        Type::NUMERIC => get::<Decimal>(row, idx, column)?.map(decimal_value),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx, column)?.map(Value::String)
        }
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx, column)?.map(Value::Json),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx, column)?.map(Value::Timestamp),
        Type::TIMESTAMP => {
            get::<NaiveDateTime>(row, idx, column)?.map(|v| Value::Timestamp(v.and_utc()))
        }
        Type::DATE => get::<NaiveDate>(row, idx, column)?.map(Value::Date),
        Type::UUID => get::<uuid::Uuid>(row, idx, column)?.map(|v| Value::String(v.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, idx, column)?.map(Value::Bytes),
        _ => return Err(decode_error(column, format!("unsupported column type {ty}"))),
    };

    Ok(value.unwrap_or(Value::Null))
}

fn large_text_value(row: &Row, idx: usize, column: &Column) -> Result<Value, ExtractionError> {
    let ty = column.type_();
    let text = match *ty {
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get::<String>(row, idx, column)?,
        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx, column)?.map(|v| v.to_string())
        }
        Type::BYTEA => match get::<Vec<u8>>(row, idx, column)? {
            Some(bytes) => Some(
                String::from_utf8(bytes).map_err(|e| decode_error(column, e.to_string()))?,
            ),
            None => None,
        },
        _ => {
            return Err(decode_error(
                column,
                format!("large-text column has non-text type {ty}"),
            ));
        }
    };

    Ok(text.map(Value::String).unwrap_or(Value::Null))
}

/// Integral decimals keep an exact integer form so they make stable key fragments.
fn decimal_value(d: Decimal) -> Value {
    if d.fract().is_zero()
        && let Some(v) = d.to_i64()
    {
        return Value::Int(v);
    }
    d.to_f64()
        .map(Value::Float)
        .unwrap_or_else(|| Value::String(d.to_string()))
}
