//! LDAP team sync core library.
//!
//! Reconciles Gitea org/team memberships with LDAP group membership according
//! to a declarative group -> `org/team` rule set: configuration, the identity
//! model, the directory and Gitea clients, and the reconciliation engine.

pub mod config;
pub mod directory;
pub mod errors;
pub mod gitea;
pub mod mapping;
pub mod model;
pub mod reconcile;
pub mod snapshot;
pub mod sync_engine;
pub mod team_ids;

// Re-exports for convenience.
pub use config::AppConfig;
pub use directory::{Directory, DirectoryGroup, LdapDirectory};
pub use gitea::{GiteaClient, TeamApi};
pub use mapping::{MappingConfig, TeamRef};
pub use model::IdentityStore;
pub use reconcile::{Action, MembershipChange, Reconciler, SyncReport};
pub use sync_engine::SyncEngine;
pub use team_ids::TeamIdMap;
