use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::CliError;

/// Environment variable manager that loads from system and .env files
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
    sensitive_patterns: Vec<String>,
}

impl EnvManager {
    pub fn new() -> Self {
        let mut env = Self::empty();
        env.vars.extend(std::env::vars());
        env
    }

    /// A manager that sees only what is loaded into it explicitly.
    pub fn empty() -> Self {
        Self {
            vars: HashMap::new(),
            sensitive_patterns: Self::default_sensitive_patterns(),
        }
    }

    /// Load variables from a .env file. File entries override system variables.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read env file {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value safe to print: masked when the key looks like it holds a secret.
    pub fn display_value(&self, key: &str) -> Option<String> {
        let value = self.get(key)?;
        if self.is_sensitive(key) {
            Some("****".to_string())
        } else {
            Some(value.to_string())
        }
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.sensitive_patterns.iter().any(|p| key.contains(p.as_str()))
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() {
                return Err(CliError::Config(format!(
                    "Invalid env file: empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();

        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }

        value.to_string()
    }

    /// Default patterns for sensitive variable detection
    fn default_sensitive_patterns() -> Vec<String> {
        ["password", "passwd", "secret", "token", "url", "uri", "credential"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_env() {
        let mut env = EnvManager::empty();
        let content = r#"
# Comment
MIGRATE_CATALOG_DIR=/etc/migrate/jobs
export MIGRATE_STATE_DIR=/var/lib/migrate
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(env.get("MIGRATE_CATALOG_DIR"), Some("/etc/migrate/jobs"));
        assert_eq!(env.get("MIGRATE_STATE_DIR"), Some("/var/lib/migrate"));
    }

    #[test]
    fn test_parse_quoted_values() {
        let mut env = EnvManager::empty();
        let content = r#"
QUOTED="value with spaces"
SINGLE='single quoted'
WITH_EQUALS=postgres://u:p@h/db?sslmode=require
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(env.get("QUOTED"), Some("value with spaces"));
        assert_eq!(env.get("SINGLE"), Some("single quoted"));
        assert_eq!(
            env.get("WITH_EQUALS"),
            Some("postgres://u:p@h/db?sslmode=require")
        );
    }

    #[test]
    fn test_invalid_env_format() {
        let mut env = EnvManager::empty();
        assert!(env.parse_env_content("INVALID LINE WITHOUT EQUALS").is_err());
        assert!(env.parse_env_content("=value").is_err());
    }

    #[test]
    fn test_sensitive_values_are_masked() {
        let mut env = EnvManager::empty();
        env.parse_env_content("MIGRATE_SOURCE_URL=postgres://u:p@h/db\nMIGRATE_LIMIT=5")
            .unwrap();

        assert_eq!(env.display_value("MIGRATE_SOURCE_URL").as_deref(), Some("****"));
        assert_eq!(env.display_value("MIGRATE_LIMIT").as_deref(), Some("5"));
        assert_eq!(env.display_value("MISSING"), None);
    }
}
