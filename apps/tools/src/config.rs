use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use shared::domain::Eligibility;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub require_active_volunteers: bool,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/roster"),
            database_url: None,
            require_active_volunteers: true,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn eligibility(&self) -> Eligibility {
        if self.require_active_volunteers {
            Eligibility::RolesAndActive
        } else {
            Eligibility::RolesOnly
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    data_dir: Option<PathBuf>,
    database_url: Option<String>,
    require_active_volunteers: Option<bool>,
    log_filter: Option<String>,
}

pub fn load_settings(config_path: &Path) -> (Settings, Option<toml::de::Error>) {
    load_settings_from(config_path, |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file (if readable), then environment overrides.
/// A file that does not parse is skipped and its error handed back so the
/// caller can report it once logging is up.
pub fn load_settings_from(
    config_path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> (Settings, Option<toml::de::Error>) {
    let mut settings = Settings::default();
    let mut file_error = None;

    if let Ok(raw) = fs::read_to_string(config_path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.data_dir {
                    settings.data_dir = v;
                }
                if let Some(v) = file_cfg.database_url {
                    settings.database_url = Some(v);
                }
                if let Some(v) = file_cfg.require_active_volunteers {
                    settings.require_active_volunteers = v;
                }
                if let Some(v) = file_cfg.log_filter {
                    settings.log_filter = v;
                }
            }
            Err(err) => file_error = Some(err),
        }
    }

    if let Some(v) = env("ROSTER_DATA_DIR") {
        settings.data_dir = PathBuf::from(v);
    }
    if let Some(v) = env("APP__DATA_DIR") {
        settings.data_dir = PathBuf::from(v);
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = Some(v);
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = Some(v);
    }

    if let Some(v) = env("APP__REQUIRE_ACTIVE") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.require_active_volunteers = parsed;
        }
    }

    if let Some(v) = env("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings.database_url = settings
        .database_url
        .as_deref()
        .and_then(normalize_database_url);
    (settings, file_error)
}

fn normalize_database_url(raw_database_url: &str) -> Option<String> {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return None;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return Some(raw_database_url.to_string());
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return Some(format!("sqlite://{path}"));
    }

    Some(format!("sqlite://{}", raw_database_url.replace('\\', "/")))
}
