//! LDAP directory access.
//!
//! The directory is the source of truth for group membership. One bind and
//! one subtree search yield every group entry together with its members.

use ldap3::{LdapConnAsync, Scope, SearchEntry};
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::DirectoryError;

/// One group entry: its name(s) and member user names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryGroup {
    pub names: Vec<String>,
    pub members: Vec<String>,
}

/// Source of group membership for a run.
#[allow(async_fn_in_trait)]
pub trait Directory {
    async fn fetch_groups(&mut self) -> Result<Vec<DirectoryGroup>, DirectoryError>;
}

/// [`Directory`] backed by an LDAP server via `ldap3`.
pub struct LdapDirectory {
    url: String,
    bind_dn: String,
    bind_password: String,
    search_base: String,
    search_filter: String,
    group_attribute: String,
    member_attribute: String,
}

impl LdapDirectory {
    pub fn from_config(config: &AppConfig) -> Self {
        let directory = Self {
            url: config.ldap_host.clone(),
            bind_dn: config.ldap_user.clone(),
            bind_password: config.ldap_pass.clone(),
            search_base: config.ldap_search_base.clone(),
            search_filter: config.ldap_search_filter.clone(),
            group_attribute: config.ldap_group_attribute.clone(),
            member_attribute: config.ldap_member_attribute.clone(),
        };
        info!(url = %directory.url, base = %directory.search_base, "created LdapDirectory");
        directory
    }

    /// Turn a raw search entry into a [`DirectoryGroup`].
    ///
    /// Attribute names are matched case-insensitively since servers are free
    /// to return them in any case. Returns `None` when the entry carries no
    /// group name.
    fn entry_to_group(&self, entry: SearchEntry) -> Option<DirectoryGroup> {
        let (names, members) = extract(entry, &self.group_attribute, &self.member_attribute);
        if names.is_empty() {
            return None;
        }
        Some(DirectoryGroup { names, members })
    }
}

/// Split an entry's attributes into `(group names, member names)`.
fn extract(entry: SearchEntry, group_attr: &str, member_attr: &str) -> (Vec<String>, Vec<String>) {
    let mut names = Vec::new();
    let mut members = Vec::new();
    for (attr, values) in entry.attrs {
        if attr.eq_ignore_ascii_case(group_attr) {
            names.extend(values);
        } else if attr.eq_ignore_ascii_case(member_attr) {
            members.extend(values);
        }
    }
    (names, members)
}

impl Directory for LdapDirectory {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_groups(&mut self) -> Result<Vec<DirectoryGroup>, DirectoryError> {
        let (conn, mut ldap) =
            LdapConnAsync::new(&self.url)
                .await
                .map_err(|e| DirectoryError::Connect {
                    url: self.url.clone(),
                    detail: e.to_string(),
                })?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        debug!(bind_dn = %self.bind_dn, "performing LDAP bind");
        let bind = ldap.simple_bind(&self.bind_dn, &self.bind_password).await?;
        if bind.rc != 0 {
            return Err(DirectoryError::Bind {
                bind_dn: self.bind_dn.clone(),
                rc: bind.rc,
                detail: bind.text,
            });
        }

        let attrs = vec![self.group_attribute.as_str(), self.member_attribute.as_str()];
        let (entries, _) = ldap
            .search(&self.search_base, Scope::Subtree, &self.search_filter, attrs)
            .await?
            .success()
            .map_err(|e| DirectoryError::Search {
                base: self.search_base.clone(),
                detail: e.to_string(),
            })?;

        let total = entries.len();
        let groups: Vec<DirectoryGroup> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(|entry| {
                let dn = entry.dn.clone();
                let group = self.entry_to_group(entry);
                if group.is_none() {
                    warn!(dn = %dn, attribute = %self.group_attribute, "skipping entry without group name");
                }
                group
            })
            .collect();

        if let Err(e) = ldap.unbind().await {
            warn!(error = %e, "LDAP unbind failed");
        }

        info!(entries = total, groups = groups.len(), "LDAP search completed");
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn entry(attrs: &[(&str, &[&str])]) -> SearchEntry {
        SearchEntry {
            dn: "cn=devs,ou=groups,dc=example,dc=com".into(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect::<HashMap<_, _>>(),
            bin_attrs: HashMap::new(),
        }
    }

    #[test]
    fn test_extract_matches_attribute_case_insensitively() {
        let (names, members) = extract(
            entry(&[("CN", &["devs", "developers"]), ("memberuid", &["alice", "bob"])]),
            "cn",
            "memberUid",
        );
        assert_eq!(names, vec!["devs", "developers"]);
        assert_eq!(members, vec!["alice", "bob"]);
    }

    #[test]
    fn test_entry_without_members_is_empty_group() {
        let config = AppConfig::from_value(serde_json::json!({
            "LDAP_HOST": "ldap://localhost",
            "LDAP_USER": "cn=admin",
            "LDAP_PASS": "pw",
            "LDAP_SEARCH_BASE": "dc=test",
            "LDAP_SEARCH_FILTER": "(cn=*)",
            "GITEA_HOST": "http://localhost",
            "GITEA_TOKEN": "t",
            "MAPPING": {}
        }))
        .unwrap();
        let dir = LdapDirectory::from_config(&config);

        let group = dir.entry_to_group(entry(&[("cn", &["empty"])])).unwrap();
        assert_eq!(group.names, vec!["empty"]);
        assert!(group.members.is_empty());

        assert!(dir.entry_to_group(entry(&[("memberUid", &["alice"])])).is_none());
    }
}
