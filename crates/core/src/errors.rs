//! Error types for the LDAP team sync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type. Every variant here is fatal for a run; soft conditions
//! (failed writes, unknown teams) never surface as errors.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Gitea(#[from] GiteaError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("cannot find config file at '{0}'")]
    FileNotFound(String),

    /// JSON / TOML parse error.
    #[error("configuration file is malformed: {0}")]
    ParseError(String),

    /// A required key is absent from the configuration.
    #[error("key '{0}' not found in config")]
    MissingKey(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// The `MAPPING` rule set could not be parsed.
    #[error("invalid MAPPING: {0}")]
    Mapping(#[from] MappingError),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Mapping errors
// ---------------------------------------------------------------------------

/// Errors from parsing the group to team rule set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// A mapped value does not split into exactly two non-empty segments.
    #[error("invalid Gitea team '{0}', expected 'org/team'")]
    InvalidTeam(String),
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from the LDAP directory client.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Could not open a connection to the directory server.
    #[error("LDAP connection to '{url}' failed: {detail}")]
    Connect { url: String, detail: String },

    /// The bind was rejected.
    #[error("LDAP bind as '{bind_dn}' failed (rc {rc}): {detail}")]
    Bind {
        bind_dn: String,
        rc: u32,
        detail: String,
    },

    /// The subtree search failed.
    #[error("LDAP search under '{base}' failed: {detail}")]
    Search { base: String, detail: String },

    /// Underlying ldap3 protocol error.
    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),
}

// ---------------------------------------------------------------------------
// Gitea API errors
// ---------------------------------------------------------------------------

/// Errors from Gitea REST API interactions.
#[derive(Debug, Error)]
pub enum GiteaError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("Gitea API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("'{method} {url}' returned {status}")]
    ApiError {
        method: String,
        url: String,
        status: u16,
    },

    /// JSON deserialization failure.
    #[error("Gitea response parse error: {0}")]
    ParseError(String),

    /// `GITEA_HOST` is not a usable base URL.
    #[error("invalid Gitea host '{0}'")]
    InvalidUrl(String),
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors that abort a reconciliation run while building snapshots.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Fetching groups from the directory failed.
    #[error("fetching users from LDAP failed: {0}")]
    DirectoryFetch(#[source] DirectoryError),

    /// Listing orgs, teams, or members from Gitea failed.
    #[error("fetching users from Gitea failed: {0}")]
    GiteaFetch(#[source] GiteaError),
}
