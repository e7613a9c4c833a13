//! One full LDAP -> Gitea sync run.
//!
//! The [`SyncEngine`] runs strictly in sequence:
//!
//! 1. Fetch group membership from the directory.
//! 2. Walk Gitea orgs, teams, and members.
//! 3. Reconcile every user against the rule set.
//!
//! Nothing is persisted between runs; re-running is the retry mechanism.

use tracing::info;

use crate::directory::Directory;
use crate::errors::SyncError;
use crate::gitea::TeamApi;
use crate::mapping::MappingConfig;
use crate::model::IdentityStore;
use crate::reconcile::{Reconciler, SyncReport};
use crate::snapshot::{ingest_directory, ingest_gitea};
use crate::team_ids::TeamIdMap;

pub struct SyncEngine<D: Directory, A: TeamApi> {
    directory: D,
    api: A,
    mapping: MappingConfig,
    dry_run: bool,
}

impl<D: Directory, A: TeamApi> SyncEngine<D, A> {
    pub fn new(directory: D, api: A, mapping: MappingConfig) -> Self {
        info!(rules = mapping.len(), "initializing sync engine");
        Self {
            directory,
            api,
            mapping,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute one sync run.
    ///
    /// Directory and Gitea read failures abort the run before any membership
    /// is changed.
    pub async fn run(&mut self) -> Result<SyncReport, SyncError> {
        let groups = self
            .directory
            .fetch_groups()
            .await
            .map_err(SyncError::DirectoryFetch)?;

        let mut store = IdentityStore::new();
        ingest_directory(&mut store, &groups);

        let mut team_ids = TeamIdMap::new();
        ingest_gitea(&self.api, &mut store, &mut team_ids)
            .await
            .map_err(SyncError::GiteaFetch)?;

        let report = Reconciler::new(&self.api, &self.mapping, &mut team_ids)
            .dry_run(self.dry_run)
            .reconcile(&store)
            .await;

        info!(
            users = report.users,
            added = report.added,
            removed = report.removed,
            skipped_missing = report.skipped_missing,
            failed = report.failed,
            dry_run = report.dry_run,
            "sync run completed"
        );
        Ok(report)
    }
}
