//! Snapshot ingestion: fill the [`IdentityStore`] from both systems.

use tracing::{debug, info};

use crate::directory::DirectoryGroup;
use crate::errors::GiteaError;
use crate::gitea::TeamApi;
use crate::model::IdentityStore;
use crate::team_ids::TeamIdMap;

/// Record every member of every group under all of the group's names.
pub fn ingest_directory(store: &mut IdentityStore, groups: &[DirectoryGroup]) {
    for group in groups {
        for member in &group.members {
            let user = store.get_or_create(member);
            for name in &group.names {
                user.add_ldap_group(name);
            }
        }
    }
    info!(groups = groups.len(), users = store.len(), "ingested directory snapshot");
}

/// Walk every org, team, and member in Gitea and record the memberships.
///
/// Gitea offers no single call for all memberships, so this issues
/// `list_orgs`, then `list_teams` per org, then `list_members` per team.
/// Every listed team is cached in `team_ids`. Any read failure aborts.
pub async fn ingest_gitea<A: TeamApi>(
    api: &A,
    store: &mut IdentityStore,
    team_ids: &mut TeamIdMap,
) -> Result<(), GiteaError> {
    let orgs = api.list_orgs().await?;
    let mut memberships = 0usize;

    for org in &orgs {
        let teams = api.list_teams(&org.username).await?;
        for team in &teams {
            team_ids.add(&org.username, &team.name, team.id);

            let members = api.list_members(team.id).await?;
            debug!(org = %org.username, team = %team.name, members = members.len(), "listed team");
            for member in &members {
                store
                    .get_or_create(&member.username)
                    .org(&org.username)
                    .add_team(&team.name);
                memberships += 1;
            }
        }
    }

    info!(
        orgs = orgs.len(),
        teams = team_ids.len(),
        memberships,
        users = store.len(),
        "ingested Gitea snapshot"
    );
    Ok(())
}
