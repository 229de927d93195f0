use crate::core::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};

/// One relational row: the table it came from and its columns in projection order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRow {
    pub table: String,
    pub field_values: Vec<FieldValue>,
}

impl SourceRow {
    pub fn new(table: &str, field_values: Vec<FieldValue>) -> Self {
        SourceRow {
            table: table.to_string(),
            field_values,
        }
    }

    /// Column lookup. Relational identifiers fold case, so matching ignores ASCII case.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .map(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.field_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let row = SourceRow::new(
            "orders",
            vec![
                FieldValue::new("ORDER_ID", Value::Int(7)),
                FieldValue::new("payload", Value::String("x".into())),
            ],
        );

        assert_eq!(row.get_value("order_id"), Value::Int(7));
        assert_eq!(row.get_value("PAYLOAD"), Value::String("x".into()));
        assert_eq!(row.get_value("missing"), Value::Null);
    }
}
