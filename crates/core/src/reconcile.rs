//! Membership reconciliation.
//!
//! For each user, in name order:
//!
//! 1. **Prune** -- drop the user from every managed team none of whose
//!    governing groups the user belongs to. Teams no rule mentions are never
//!    touched.
//! 2. **Provision** -- add the user to every team mapped from one of the
//!    user's groups that the Gitea snapshot does not already show.
//!
//! Decisions are taken against the snapshots only; the store is not updated
//! after a write. Failed writes and unresolvable team ids are counted and
//! logged, never returned as errors.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info, warn};

use crate::gitea::TeamApi;
use crate::mapping::{MappingConfig, TeamRef};
use crate::model::{IdentityStore, User};
use crate::team_ids::TeamIdMap;

/// Kind of membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Added,
    Removed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// A membership change that was applied (or planned, in a dry run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub action: Action,
    pub user: String,
    pub team: TeamRef,
}

impl fmt::Display for MembershipChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preposition = match self.action {
            Action::Added => "to",
            Action::Removed => "from",
        };
        write!(f, "User '{}' {} {} {}", self.user, self.action, preposition, self.team)
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub users: usize,
    pub added: usize,
    pub removed: usize,
    /// Changes skipped because the team id could not be resolved.
    pub skipped_missing: usize,
    /// Add/remove calls the API rejected.
    pub failed: usize,
    pub dry_run: bool,
    pub changes: Vec<MembershipChange>,
}

impl SyncReport {
    fn record(&mut self, change: MembershipChange) {
        match change.action {
            Action::Added => self.added += 1,
            Action::Removed => self.removed += 1,
        }
        self.changes.push(change);
    }

    /// True when the pass neither changed nor tried to change anything.
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty() && self.failed == 0
    }
}

/// Applies the rule set to an [`IdentityStore`] through a [`TeamApi`].
pub struct Reconciler<'a, A: TeamApi> {
    api: &'a A,
    mapping: &'a MappingConfig,
    team_ids: &'a mut TeamIdMap,
    dry_run: bool,
}

impl<'a, A: TeamApi> Reconciler<'a, A> {
    pub fn new(api: &'a A, mapping: &'a MappingConfig, team_ids: &'a mut TeamIdMap) -> Self {
        Self {
            api,
            mapping,
            team_ids,
            dry_run: false,
        }
    }

    /// Plan changes without calling `add_member` / `remove_member`.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn reconcile(&mut self, store: &IdentityStore) -> SyncReport {
        let mut report = SyncReport {
            users: store.len(),
            dry_run: self.dry_run,
            ..Default::default()
        };

        for user in store.users() {
            self.prune(user, &mut report).await;
            self.provision(user, &mut report).await;
        }

        report
    }

    async fn prune(&mut self, user: &User, report: &mut SyncReport) {
        let mapping = self.mapping;

        for org in user.orgs() {
            for team_name in org.teams() {
                let team = TeamRef::new(org.name(), team_name);
                let mut governing = mapping.groups_for(&team).peekable();
                // Unmanaged team.
                if governing.peek().is_none() {
                    continue;
                }
                if governing.any(|group| user.in_group(group)) {
                    continue;
                }

                let Some(id) = self.team_ids.get_id(self.api, &team.org, &team.team).await else {
                    warn!(user = %user.name(), team = %team, "cannot resolve team id, membership kept");
                    report.skipped_missing += 1;
                    continue;
                };
                drop(governing);
                self.apply(Action::Removed, id, user, team, report).await;
            }
        }
    }

    async fn provision(&mut self, user: &User, report: &mut SyncReport) {
        let mapping = self.mapping;
        let mut seen: BTreeSet<&TeamRef> = BTreeSet::new();

        for rule in mapping.rules() {
            if !user.in_group(&rule.group) {
                continue;
            }

            for team in &rule.teams {
                // Two rules may map the same team.
                if !seen.insert(team) {
                    continue;
                }
                if user.is_member_of(&team.org, &team.team) {
                    continue;
                }

                let Some(id) = self.team_ids.get_id(self.api, &team.org, &team.team).await else {
                    debug!(user = %user.name(), team = %team, "team does not exist in Gitea, skipping");
                    report.skipped_missing += 1;
                    continue;
                };
                self.apply(Action::Added, id, user, team.clone(), report).await;
            }
        }
    }

    async fn apply(
        &self,
        action: Action,
        team_id: u64,
        user: &User,
        team: TeamRef,
        report: &mut SyncReport,
    ) {
        let change = MembershipChange {
            action,
            user: user.name().to_string(),
            team,
        };

        if self.dry_run {
            info!(action = %action, user = %change.user, org = %change.team.org, team = %change.team.team, dry_run = true, "planned membership change");
            report.record(change);
            return;
        }

        let result = match action {
            Action::Added => self.api.add_member(team_id, user.name()).await,
            Action::Removed => self.api.remove_member(team_id, user.name()).await,
        };

        match result {
            Ok(()) => {
                info!(action = %action, user = %change.user, org = %change.team.org, team = %change.team.team, "membership changed");
                report.record(change);
            }
            Err(e) => {
                warn!(action = %action, user = %change.user, team = %change.team, error = %e, "membership change failed");
                report.failed += 1;
            }
        }
    }
}
