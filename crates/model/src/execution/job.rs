use serde::{Deserialize, Serialize};

/// A complete, validated job definition. Read once at run start and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source: SourceSpec,
    pub target: TargetSpec,
    #[serde(default)]
    pub archive: ArchiveSpec,
    #[serde(default)]
    pub tunables: Tunables,
    #[serde(default)]
    pub key_policy: KeyPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Schema that owns the table, if not the connection default.
    #[serde(default)]
    pub owner: Option<String>,
    pub table: String,
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub large_text_columns: Vec<String>,
    /// Raw SQL predicate appended verbatim as the WHERE clause.
    #[serde(default)]
    pub filter: Option<String>,
}

impl SourceSpec {
    pub fn qualified_table(&self) -> String {
        match self.owner.as_deref().filter(|o| !o.is_empty()) {
            Some(owner) => format!("{owner}.{}", self.table),
            None => self.table.clone(),
        }
    }

    /// Key columns followed by large-text columns, first occurrence wins.
    pub fn projection(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for column in self.key_columns.iter().chain(&self.large_text_columns) {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                columns.push(column.clone());
            }
        }
        columns
    }

    pub fn is_large_text(&self, column: &str) -> bool {
        self.large_text_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Overrides the engine-wide target database.
    #[serde(default)]
    pub database: Option<String>,
    pub collection: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub table: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub chunk_size: usize,
    pub skip_limit: u64,
    pub retry_limit: u32,
    pub throttle_limit: usize,
    pub retry_backoff_ms: u64,
    pub fetch_size: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            skip_limit: 10,
            retry_limit: 3,
            throttle_limit: 10,
            retry_backoff_ms: 100,
            fetch_size: 1000,
        }
    }
}

/// How the transformer treats a key column that is absent or NULL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Missing fragments become empty strings.
    #[default]
    Lenient,
    /// Missing fragments fail the record.
    Strict,
}
