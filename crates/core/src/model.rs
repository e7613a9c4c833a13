//! In-memory identity model.
//!
//! One [`User`] per user name seen in either the directory or Gitea, holding
//! the user's LDAP groups and current Gitea org/team memberships. The store is
//! filled while ingesting snapshots and only read during reconciliation.

use std::collections::{BTreeMap, BTreeSet};

/// A user's memberships within one Gitea organization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Organization {
    name: String,
    teams: BTreeSet<String>,
}

impl Organization {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            teams: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn teams(&self) -> impl Iterator<Item = &str> {
        self.teams.iter().map(String::as_str)
    }

    pub fn add_team(&mut self, team: &str) {
        self.teams.insert(team.to_lowercase());
    }
}

/// A user known to the directory, Gitea, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    name: String,
    groups: BTreeSet<String>,
    orgs: BTreeMap<String, Organization>,
}

impl User {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_ldap_group(&mut self, group: &str) {
        self.groups.insert(group.to_lowercase());
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(&group.to_lowercase())
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    /// Get the user's entry for `org`, creating it on first use.
    pub fn org(&mut self, org: &str) -> &mut Organization {
        let key = org.to_lowercase();
        self.orgs
            .entry(key)
            .or_insert_with(|| Organization::new(org))
    }

    pub fn orgs(&self) -> impl Iterator<Item = &Organization> {
        self.orgs.values()
    }

    /// Whether the Gitea snapshot shows the user in `org/team`.
    pub fn is_member_of(&self, org: &str, team: &str) -> bool {
        self.orgs
            .get(&org.to_lowercase())
            .is_some_and(|o| o.teams.contains(&team.to_lowercase()))
    }
}

/// Owner of all [`User`] records for a run, keyed by user name.
///
/// User names are case-sensitive. Iteration is in name order so a run is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct IdentityStore {
    users: BTreeMap<String, User>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, name: &str) -> &mut User {
        self.users
            .entry(name.to_string())
            .or_insert_with(|| User::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut store = IdentityStore::new();
        store.get_or_create("alice").add_ldap_group("devs");
        store.get_or_create("alice").add_ldap_group("ops");
        store.get_or_create("bob");

        assert_eq!(store.len(), 2);
        let alice = store.get("alice").unwrap();
        assert_eq!(alice.groups().collect::<Vec<_>>(), vec!["devs", "ops"]);
    }

    #[test]
    fn test_user_names_are_case_sensitive() {
        let mut store = IdentityStore::new();
        store.get_or_create("Alice");
        store.get_or_create("alice");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_groups_are_lower_cased() {
        let mut store = IdentityStore::new();
        let user = store.get_or_create("alice");
        user.add_ldap_group("Admins");
        user.add_ldap_group("admins");

        assert_eq!(user.groups().collect::<Vec<_>>(), vec!["admins"]);
        assert!(user.in_group("ADMINS"));
    }

    #[test]
    fn test_org_is_created_once() {
        let mut store = IdentityStore::new();
        let user = store.get_or_create("alice");
        user.org("Acme").add_team("Backend");
        user.org("ACME").add_team("frontend");

        let orgs: Vec<_> = user.orgs().collect();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].name(), "acme");
        assert_eq!(orgs[0].teams().collect::<Vec<_>>(), vec!["backend", "frontend"]);
    }

    #[test]
    fn test_is_member_of_case_insensitive() {
        let mut store = IdentityStore::new();
        let user = store.get_or_create("alice");
        user.org("OrgA").add_team("TeamX");

        assert!(user.is_member_of("orga", "teamx"));
        assert!(user.is_member_of("ORGA", "TEAMX"));
        assert!(!user.is_member_of("orga", "teamy"));
        assert!(!user.is_member_of("orgb", "teamx"));
    }
}
