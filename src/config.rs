use std::{env, path::PathBuf};

use log::LevelFilter;

pub const DATA_DIR_ENV: &str = "KENDRA_BINDU_DATA_DIR";
pub const DEBUG_ENV: &str = "KENDRA_BINDU_DEBUG";

const DEFAULT_DIR_NAME: &str = ".kendra-bindu";
const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "local_storage.sqlite3";

/// Process-level settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub debug: bool,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                lookup("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(DEFAULT_DIR_NAME)
            });

        let debug = lookup(DEBUG_ENV)
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);

        Self { data_dir, debug }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}
