use model::{
    core::value::{FieldValue, Value},
    execution::job::{ArchiveSpec, JobSpec, KeyPolicy, SourceSpec, TargetSpec, Tunables},
    records::row::SourceRow,
};

pub const TEST_TABLE: &str = "ORDERS";

/// `count` order rows keyed by `ORDER_ID` 0..count. Rows whose index is in `bad`
/// carry a binary key, which the transformer rejects.
pub fn order_rows(count: usize, bad: &[usize]) -> Vec<SourceRow> {
    (0..count)
        .map(|i| {
            let key = if bad.contains(&i) {
                Value::Bytes(vec![0xff, i as u8])
            } else {
                Value::Int(i as i64)
            };
            SourceRow::new(
                TEST_TABLE,
                vec![
                    FieldValue::new("ORDER_ID", key),
                    FieldValue::new("CUSTOMER", Value::String(format!("customer-{}", i % 7))),
                    FieldValue::new(
                        "PAYLOAD",
                        Value::String(format!(r#"{{"lines":[{{"sku":"A{i}","qty":{}}}]}}"#, i % 3 + 1)),
                    ),
                ],
            )
        })
        .collect()
}

pub fn job(name: &str, chunk_size: usize, skip_limit: u64, throttle_limit: usize) -> JobSpec {
    JobSpec {
        name: name.to_string(),
        description: None,
        source: SourceSpec {
            owner: Some("SALES".into()),
            table: TEST_TABLE.into(),
            key_columns: vec!["ORDER_ID".into()],
            large_text_columns: vec!["PAYLOAD".into()],
            filter: None,
        },
        target: TargetSpec {
            database: None,
            collection: "orders".into(),
        },
        archive: ArchiveSpec::default(),
        tunables: Tunables {
            chunk_size,
            skip_limit,
            retry_limit: 3,
            throttle_limit,
            retry_backoff_ms: 1,
            fetch_size: chunk_size,
        },
        key_policy: KeyPolicy::Lenient,
    }
}

pub fn with_archive(mut job: JobSpec, enabled: bool) -> JobSpec {
    job.archive = ArchiveSpec {
        enabled,
        table: Some("MIGRATION_ARCHIVE".into()),
    };
    job
}
