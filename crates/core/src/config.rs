//! Configuration for a sync run.
//!
//! The configuration file is a flat JSON object (or TOML table when the file
//! ends in `.toml`) with upper-case keys:
//!
//! ```json
//! {
//!   "LDAP_HOST": "ldap://ldap.example.com",
//!   "LDAP_USER": "cn=reader,dc=example,dc=com",
//!   "LDAP_PASS": "env:LDAP_PASSWORD",
//!   "LDAP_SEARCH_BASE": "ou=groups,dc=example,dc=com",
//!   "LDAP_SEARCH_FILTER": "(objectClass=posixGroup)",
//!   "GITEA_HOST": "https://git.example.com",
//!   "GITEA_TOKEN": "env:GITEA_TOKEN",
//!   "MAPPING": { "devs": ["acme/backend"] }
//! }
//! ```
//!
//! Secrets may be given literally or as `env:NAME`, in which case they are
//! resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::mapping::MappingConfig;

/// Keys that must be present in every configuration file.
pub const REQUIRED_KEYS: [&str; 8] = [
    "LDAP_HOST",
    "LDAP_USER",
    "LDAP_PASS",
    "LDAP_SEARCH_BASE",
    "LDAP_SEARCH_FILTER",
    "GITEA_HOST",
    "GITEA_TOKEN",
    "MAPPING",
];

const ENV_PREFIX: &str = "env:";

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LDAP server URL (e.g. `ldaps://ldap.example.com`).
    #[serde(rename = "LDAP_HOST")]
    pub ldap_host: String,

    /// Bind DN.
    #[serde(rename = "LDAP_USER")]
    pub ldap_user: String,

    /// Bind password, literal or `env:NAME`.
    #[serde(rename = "LDAP_PASS")]
    pub ldap_pass: String,

    /// Base DN of the group subtree search.
    #[serde(rename = "LDAP_SEARCH_BASE")]
    pub ldap_search_base: String,

    /// Filter selecting the group entries.
    #[serde(rename = "LDAP_SEARCH_FILTER")]
    pub ldap_search_filter: String,

    /// Attribute holding the group name(s).
    #[serde(rename = "LDAP_GROUP_ATTRIBUTE", default = "default_group_attribute")]
    pub ldap_group_attribute: String,

    /// Attribute holding member user names.
    #[serde(rename = "LDAP_MEMBER_ATTRIBUTE", default = "default_member_attribute")]
    pub ldap_member_attribute: String,

    /// Gitea base URL, without the `/api/v1` suffix.
    #[serde(rename = "GITEA_HOST")]
    pub gitea_host: String,

    /// Gitea access token, literal or `env:NAME`.
    #[serde(rename = "GITEA_TOKEN")]
    pub gitea_token: String,

    /// Raw rules: LDAP group -> `["org/team", ...]`.
    #[serde(rename = "MAPPING")]
    pub mapping: BTreeMap<String, Vec<String>>,

    /// Optional tracing filter (e.g. `debug`).
    #[serde(rename = "LOG_LEVEL", default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_group_attribute() -> String {
    "cn".into()
}
fn default_member_attribute() -> String {
    "memberUid".into()
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a JSON (or `.toml`) file.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let value: serde_json::Value = if is_toml {
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?
        };

        let config = Self::from_value(value)?;
        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Build a config from an already-parsed document, reporting the first
    /// missing required key by name.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::ParseError("top level must be an object".into()))?;

        if let Some(missing) = REQUIRED_KEYS.iter().find(|key| !object.contains_key(**key)) {
            return Err(ConfigError::MissingKey((*missing).to_string()));
        }

        serde_json::from_value(value).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Replace `env:NAME` secrets with the value of the named variable.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");
        self.ldap_pass = resolve_secret(&self.ldap_pass, "LDAP_PASS")?;
        self.gitea_token = resolve_secret(&self.gitea_token, "GITEA_TOKEN")?;
        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate the config and parse the rule set.
    ///
    /// A malformed `org/team` value fails here, before any network call.
    pub fn validate(&self) -> Result<MappingConfig, ConfigError> {
        let non_empty = [
            ("LDAP_HOST", &self.ldap_host),
            ("LDAP_SEARCH_BASE", &self.ldap_search_base),
            ("GITEA_HOST", &self.gitea_host),
            ("GITEA_TOKEN", &self.gitea_token),
        ];
        for (field, value) in non_empty {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "must not be empty".into(),
                });
            }
        }

        Ok(MappingConfig::from_entries(
            self.mapping.iter().map(|(group, teams)| (group, teams.clone())),
        )?)
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<(Self, MappingConfig), ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        let mapping = config.validate()?;
        Ok((config, mapping))
    }
}

fn resolve_secret(value: &str, field: &str) -> Result<String, ConfigError> {
    let Some(env_name) = value.strip_prefix(ENV_PREFIX) else {
        return Ok(value.to_string());
    };
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Ok(val)
        }
        _ => Err(ConfigError::MissingKey(format!("{field} (env var {env_name})"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_json() -> &'static str {
        r#"{
  "LDAP_HOST": "ldap://ldap.example.com",
  "LDAP_USER": "cn=reader,dc=example,dc=com",
  "LDAP_PASS": "secret",
  "LDAP_SEARCH_BASE": "ou=groups,dc=example,dc=com",
  "LDAP_SEARCH_FILTER": "(objectClass=posixGroup)",
  "GITEA_HOST": "https://git.example.com",
  "GITEA_TOKEN": "abc123",
  "MAPPING": {
    "devs": ["acme/backend", "acme/frontend"],
    "Admins": ["acme/owners"]
  }
}"#
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "config.json", sample_json());

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.ldap_host, "ldap://ldap.example.com");
        assert_eq!(config.ldap_group_attribute, "cn");
        assert_eq!(config.ldap_member_attribute, "memberUid");
        assert_eq!(config.mapping["devs"].len(), 2);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "config.toml",
            r#"
LDAP_HOST = "ldap://localhost"
LDAP_USER = "cn=admin"
LDAP_PASS = "pw"
LDAP_SEARCH_BASE = "dc=test"
LDAP_SEARCH_FILTER = "(cn=*)"
LDAP_MEMBER_ATTRIBUTE = "member"
GITEA_HOST = "http://localhost:3000"
GITEA_TOKEN = "t"
LOG_LEVEL = "debug"

[MAPPING]
devs = ["acme/backend"]
"#,
        );

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.ldap_member_attribute, "member");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/config.json");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "config.json", "{ not json");
        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_each_required_key_is_reported() {
        for key in REQUIRED_KEYS {
            let mut value: serde_json::Value = serde_json::from_str(sample_json()).unwrap();
            value.as_object_mut().unwrap().remove(key);
            let result = AppConfig::from_value(value);
            assert!(
                matches!(result, Err(ConfigError::MissingKey(ref k)) if k == key),
                "expected MissingKey({key}), got {result:?}"
            );
        }
    }

    #[test]
    fn test_validate_parses_mapping() {
        let config = AppConfig::from_value(serde_json::from_str(sample_json()).unwrap()).unwrap();
        let mapping = config.validate().unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.resolve_group("ACME", "Owners"), Some("admins"));
    }

    #[test]
    fn test_validate_rejects_malformed_team() {
        let mut config =
            AppConfig::from_value(serde_json::from_str(sample_json()).unwrap()).unwrap();
        config.mapping.insert("ops".into(), vec!["acme".into()]);
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Mapping(_))));
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let mut config =
            AppConfig::from_value(serde_json::from_str(sample_json()).unwrap()).unwrap();
        config.gitea_host = String::new();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "GITEA_HOST"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("TEST_LTS_LDAP_PW", "s3cret");

        let mut config =
            AppConfig::from_value(serde_json::from_str(sample_json()).unwrap()).unwrap();
        config.ldap_pass = "env:TEST_LTS_LDAP_PW".into();
        config.resolve_env_vars().unwrap();

        assert_eq!(config.ldap_pass, "s3cret");
        assert_eq!(config.gitea_token, "abc123");

        std::env::remove_var("TEST_LTS_LDAP_PW");
    }

    #[test]
    fn test_resolve_env_vars_missing_variable() {
        let mut config =
            AppConfig::from_value(serde_json::from_str(sample_json()).unwrap()).unwrap();
        config.gitea_token = "env:TEST_LTS_DEFINITELY_UNSET".into();
        let result = config.resolve_env_vars();
        assert!(matches!(result, Err(ConfigError::MissingKey(ref k)) if k.starts_with("GITEA_TOKEN")));
    }
}
