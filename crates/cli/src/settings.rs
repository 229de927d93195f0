use crate::{commands::GlobalArgs, env::EnvManager, error::CliError};
use engine_config::settings::EngineSettings;
use engine_core::monitor::config::MonitorConfig;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_TARGET_DATABASE: &str = "migration";

const OPTION_KEYS: [&str; 6] = [
    "MIGRATE_SOURCE_URL",
    "MIGRATE_TARGET_URI",
    "MIGRATE_TARGET_DATABASE",
    "MIGRATE_CATALOG_DIR",
    "MIGRATE_STATE_DIR",
    "MIGRATE_MONITOR_CONFIG",
];
pub const DEFAULT_CATALOG_DIR: &str = "jobs";
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Resolves options from flags (or their process variables), then the env file.
pub struct Resolver {
    args: GlobalArgs,
    env: EnvManager,
}

impl Resolver {
    pub fn from_args(args: GlobalArgs) -> Result<Self, CliError> {
        let mut env = EnvManager::new();
        if let Some(path) = &args.env_file {
            env.load_from_file(path)?;
            debug!(path = %path.display(), "Loaded env file");
            for key in OPTION_KEYS {
                if let Some(value) = env.display_value(key) {
                    debug!(key, value = %value, "Option available from environment");
                }
            }
        }
        Ok(Self::new(args, env))
    }

    pub fn new(args: GlobalArgs, env: EnvManager) -> Self {
        Self { args, env }
    }

    fn value(&self, flag: Option<&String>, key: &str) -> Option<String> {
        flag.cloned()
            .or_else(|| self.env.get(key).map(str::to_string))
            .filter(|v| !v.trim().is_empty())
    }

    fn path(&self, flag: Option<&PathBuf>, key: &str) -> Option<PathBuf> {
        flag.cloned()
            .or_else(|| self.env.get(key).map(PathBuf::from))
    }

    fn required(&self, flag: Option<&String>, key: &str, name: &str) -> Result<String, CliError> {
        self.value(flag, key).ok_or_else(|| {
            CliError::Config(format!("missing --{name} (or {key})"))
        })
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.path(self.args.catalog.as_ref(), "MIGRATE_CATALOG_DIR")
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_DIR))
    }

    pub fn state_dir(&self) -> Result<PathBuf, CliError> {
        if let Some(dir) = self.path(self.args.state_dir.as_ref(), "MIGRATE_STATE_DIR") {
            return Ok(dir);
        }
        let home = dirs::home_dir()
            .ok_or_else(|| CliError::Unexpected("Could not determine home directory".into()))?;
        Ok(home.join(".migrate/state"))
    }

    pub fn monitor_config(&self) -> Result<MonitorConfig, CliError> {
        match self.path(self.args.monitor_config.as_ref(), "MIGRATE_MONITOR_CONFIG") {
            Some(path) => Ok(EngineSettings::load_monitor_config(&path)?),
            None => Ok(MonitorConfig::default()),
        }
    }

    /// Full settings for commands that talk to both stores.
    pub fn engine_settings(&self) -> Result<EngineSettings, CliError> {
        let settings = EngineSettings {
            source_url: self.required(
                self.args.source_url.as_ref(),
                "MIGRATE_SOURCE_URL",
                "source-url",
            )?,
            target_uri: self.required(
                self.args.target_uri.as_ref(),
                "MIGRATE_TARGET_URI",
                "target-uri",
            )?,
            target_database: self
                .value(self.args.target_database.as_ref(), "MIGRATE_TARGET_DATABASE")
                .unwrap_or_else(|| DEFAULT_TARGET_DATABASE.to_string()),
            catalog_dir: self.catalog_dir(),
            state_dir: self.state_dir()?,
            monitor: self.monitor_config()?,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_from(content: &str) -> EnvManager {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let mut env = EnvManager::empty();
        env.load_from_file(file.path()).unwrap();
        env
    }

    #[test]
    fn env_file_fills_unset_flags() {
        let env = env_from(
            "MIGRATE_SOURCE_URL=postgres://src/db\nMIGRATE_TARGET_URI=mongodb://dst\nMIGRATE_STATE_DIR=/tmp/state\n",
        );
        let resolver = Resolver::new(GlobalArgs::default(), env);

        let settings = resolver.engine_settings().unwrap();
        assert_eq!(settings.source_url, "postgres://src/db");
        assert_eq!(settings.target_uri, "mongodb://dst");
        assert_eq!(settings.target_database, DEFAULT_TARGET_DATABASE);
        assert_eq!(settings.catalog_dir, PathBuf::from(DEFAULT_CATALOG_DIR));
        assert_eq!(settings.state_dir, PathBuf::from("/tmp/state"));
    }

    #[test]
    fn flags_win_over_env_file() {
        let env = env_from("MIGRATE_SOURCE_URL=postgres://from-file/db\n");
        let args = GlobalArgs {
            source_url: Some("postgres://from-flag/db".into()),
            target_uri: Some("mongodb://dst".into()),
            state_dir: Some(PathBuf::from("/tmp/state")),
            ..GlobalArgs::default()
        };

        let settings = Resolver::new(args, env).engine_settings().unwrap();
        assert_eq!(settings.source_url, "postgres://from-flag/db");
    }

    #[test]
    fn missing_source_url_is_reported() {
        let args = GlobalArgs {
            target_uri: Some("mongodb://dst".into()),
            ..GlobalArgs::default()
        };

        let err = Resolver::new(args, EnvManager::empty())
            .engine_settings()
            .unwrap_err();
        assert!(err.to_string().contains("--source-url"));
    }
}
