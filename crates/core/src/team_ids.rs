//! Cache of Gitea team ids keyed by lower-cased `org/team`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::gitea::TeamApi;
use crate::mapping::TeamRef;

#[derive(Debug, Clone, Default)]
pub struct TeamIdMap {
    ids: HashMap<String, u64>,
}

impl TeamIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, org: &str, team: &str, id: u64) {
        self.ids.insert(TeamRef::new(org, team).key(), id);
    }

    pub fn cached(&self, org: &str, team: &str) -> Option<u64> {
        self.ids.get(&TeamRef::new(org, team).key()).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Resolve the id of `org/team`.
    ///
    /// On a cache miss every team of `org` is listed and cached. `None` means
    /// the team does not exist or the org could not be listed; neither aborts
    /// the run.
    pub async fn get_id<A: TeamApi>(&mut self, api: &A, org: &str, team: &str) -> Option<u64> {
        if let Some(id) = self.cached(org, team) {
            return Some(id);
        }

        match api.list_teams(&org.to_lowercase()).await {
            Ok(teams) => {
                for t in &teams {
                    self.add(org, &t.name, t.id);
                }
                debug!(org, listed = teams.len(), "refreshed team ids");
            }
            Err(e) => {
                warn!(org, team, error = %e, "could not list teams to resolve team id");
                return None;
            }
        }

        self.cached(org, team)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::errors::GiteaError;
    use crate::gitea::{Member, Organization, Team};

    /// Serves a fixed team list for `acme` and fails for any other org.
    #[derive(Default)]
    struct TeamsOnly {
        list_calls: Cell<usize>,
    }

    impl TeamApi for TeamsOnly {
        async fn list_orgs(&self) -> Result<Vec<Organization>, GiteaError> {
            unreachable!()
        }

        async fn list_teams(&self, org: &str) -> Result<Vec<Team>, GiteaError> {
            self.list_calls.set(self.list_calls.get() + 1);
            if org != "acme" {
                return Err(GiteaError::ApiError {
                    method: "GET".into(),
                    url: format!("/orgs/{org}/teams"),
                    status: 404,
                });
            }
            Ok(vec![
                Team {
                    id: 7,
                    name: "Backend".into(),
                },
                Team {
                    id: 8,
                    name: "frontend".into(),
                },
            ])
        }

        async fn list_members(&self, _team_id: u64) -> Result<Vec<Member>, GiteaError> {
            unreachable!()
        }

        async fn add_member(&self, _team_id: u64, _username: &str) -> Result<(), GiteaError> {
            unreachable!()
        }

        async fn remove_member(&self, _team_id: u64, _username: &str) -> Result<(), GiteaError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_cached_id_skips_api() {
        let api = TeamsOnly::default();
        let mut map = TeamIdMap::new();
        map.add("Acme", "Ops", 3);

        assert_eq!(map.get_id(&api, "acme", "OPS").await, Some(3));
        assert_eq!(api.list_calls.get(), 0);
    }

    #[tokio::test]
    async fn test_miss_caches_every_listed_team() {
        let api = TeamsOnly::default();
        let mut map = TeamIdMap::new();

        assert_eq!(map.get_id(&api, "ACME", "backend").await, Some(7));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get_id(&api, "acme", "frontend").await, Some(8));
        assert_eq!(api.list_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_unknown_team_is_none() {
        let api = TeamsOnly::default();
        let mut map = TeamIdMap::new();
        assert_eq!(map.get_id(&api, "acme", "missing").await, None);
    }

    #[tokio::test]
    async fn test_list_failure_is_soft() {
        let api = TeamsOnly::default();
        let mut map = TeamIdMap::new();
        assert_eq!(map.get_id(&api, "ghost", "team").await, None);
        assert!(map.is_empty());
    }
}
