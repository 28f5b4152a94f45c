use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use client_core::{
    identity::DEFAULT_IDENTITY_URL, store::DEFAULT_FIRESTORE_URL, FirestoreConfig,
    IdentityConfig, PasswordCredentials,
};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "viewer.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub project_id: String,
    pub identity_url: String,
    pub firestore_url: String,
    pub collection: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub session_file: PathBuf,
    /// Documents per list request; the service picks when unset.
    pub page_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            identity_url: DEFAULT_IDENTITY_URL.into(),
            firestore_url: DEFAULT_FIRESTORE_URL.into(),
            collection: "people".into(),
            email: None,
            password: None,
            session_file: PathBuf::from("./data/session.json"),
            page_size: None,
        }
    }
}

impl Settings {
    pub fn identity_config(&self) -> IdentityConfig {
        let credentials = match (&self.email, &self.password) {
            (Some(email), Some(password)) => Some(PasswordCredentials {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        IdentityConfig {
            base_url: self.identity_url.clone(),
            api_key: self.api_key.clone(),
            credentials,
            session_file: Some(self.session_file.clone()),
        }
    }

    pub fn firestore_config(&self) -> FirestoreConfig {
        let mut config = FirestoreConfig::new(self.project_id.clone());
        config.base_url = self.firestore_url.clone();
        config.page_size = self.page_size;
        config
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push("api_key");
        }
        if self.project_id.trim().is_empty() {
            missing.push("project_id");
        }
        missing
    }
}

/// Defaults, then the TOML file (when present), then `APP__*` variables.
pub fn load_settings(config_path: &Path) -> Settings {
    let settings = apply_file(Settings::default(), config_path);
    apply_env(settings, |key| std::env::var(key).ok())
}

fn apply_file(mut settings: Settings, path: &Path) -> Settings {
    let Ok(raw) = fs::read_to_string(path) else {
        return settings;
    };
    let file_cfg = match toml::from_str::<HashMap<String, String>>(&raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable config file");
            return settings;
        }
    };

    if let Some(v) = file_cfg.get("api_key") {
        settings.api_key = v.clone();
    }
    if let Some(v) = file_cfg.get("project_id") {
        settings.project_id = v.clone();
    }
    if let Some(v) = file_cfg.get("identity_url") {
        settings.identity_url = v.clone();
    }
    if let Some(v) = file_cfg.get("firestore_url") {
        settings.firestore_url = v.clone();
    }
    if let Some(v) = file_cfg.get("collection") {
        settings.collection = v.clone();
    }
    if let Some(v) = file_cfg.get("email") {
        settings.email = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("password") {
        settings.password = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("session_file") {
        settings.session_file = PathBuf::from(v);
    }
    if let Some(v) = file_cfg.get("page_size") {
        settings.page_size = parse_page_size(v).or(settings.page_size);
    }

    settings
}

fn apply_env(mut settings: Settings, lookup: impl Fn(&str) -> Option<String>) -> Settings {
    if let Some(v) = lookup("APP__API_KEY") {
        settings.api_key = v;
    }
    if let Some(v) = lookup("APP__PROJECT_ID") {
        settings.project_id = v;
    }
    if let Some(v) = lookup("APP__IDENTITY_URL") {
        settings.identity_url = v;
    }
    if let Some(v) = lookup("APP__FIRESTORE_URL") {
        settings.firestore_url = v;
    }
    if let Some(v) = lookup("APP__COLLECTION") {
        settings.collection = v;
    }
    if let Some(v) = lookup("APP__EMAIL") {
        settings.email = Some(v);
    }
    if let Some(v) = lookup("APP__PASSWORD") {
        settings.password = Some(v);
    }
    if let Some(v) = lookup("APP__SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }
    if let Some(v) = lookup("APP__PAGE_SIZE") {
        settings.page_size = parse_page_size(&v).or(settings.page_size);
    }

    settings
}

fn parse_page_size(raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) | Err(_) => {
            warn!(value = raw, "ignoring invalid page_size");
            None
        }
        Ok(size) => Some(size),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
