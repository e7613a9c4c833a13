//! Group to team rule set.
//!
//! A rule associates one LDAP group with one or more Gitea `org/team` pairs.
//! All keys are lower-cased when the rule set is built, so every lookup is
//! case-insensitive.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::errors::MappingError;

/// An addressable Gitea team, written `org/team`. Both halves are lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeamRef {
    pub org: String,
    pub team: String,
}

impl TeamRef {
    pub fn new(org: &str, team: &str) -> Self {
        Self {
            org: org.to_lowercase(),
            team: team.to_lowercase(),
        }
    }

    /// Cache key used by the team id map.
    pub fn key(&self) -> String {
        format!("{}/{}", self.org, self.team)
    }
}

impl FromStr for TeamRef {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(org), Some(team), None) if !org.is_empty() && !team.is_empty() => {
                Ok(Self::new(org, team))
            }
            _ => Err(MappingError::InvalidTeam(s.to_string())),
        }
    }
}

impl fmt::Display for TeamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.team)
    }
}

/// One entry of the rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Lower-cased LDAP group name.
    pub group: String,
    /// Teams the group's members belong in, without duplicates.
    pub teams: Vec<TeamRef>,
}

/// Parsed `MAPPING` rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingConfig {
    rules: Vec<Rule>,
}

impl MappingConfig {
    /// Build the rule set from raw `(group, ["org/team", ...])` entries.
    ///
    /// Groups that differ only in case are merged into a single rule, keeping
    /// the position of the first occurrence. Any value that is not exactly
    /// two non-empty `/`-separated segments fails the whole rule set.
    pub fn from_entries<I, G, T>(entries: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (G, Vec<T>)>,
        G: AsRef<str>,
        T: AsRef<str>,
    {
        let mut rules: Vec<Rule> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (group, teams) in entries {
            let group = group.as_ref().to_lowercase();
            let slot = *index.entry(group.clone()).or_insert_with(|| {
                rules.push(Rule {
                    group: group.clone(),
                    teams: Vec::new(),
                });
                rules.len() - 1
            });

            for raw in teams {
                let team: TeamRef = raw.as_ref().parse()?;
                let rule = &mut rules[slot];
                if !rule.teams.contains(&team) {
                    rule.teams.push(team);
                }
            }
        }

        debug!(rules = rules.len(), "parsed mapping rules");
        Ok(Self { rules })
    }

    /// Return the first group whose rule lists `org/team`, if any.
    ///
    /// Several groups may govern the same team; one witness is enough to
    /// tell a managed team from an unmanaged one. Removal decisions walk
    /// [`groups_for`](Self::groups_for) instead, which answers both questions
    /// in one pass.
    pub fn resolve_group(&self, org: &str, team: &str) -> Option<&str> {
        let wanted = TeamRef::new(org, team);
        self.rules
            .iter()
            .find(|rule| rule.teams.contains(&wanted))
            .map(|rule| rule.group.as_str())
    }

    /// Iterate every group whose rule lists `team`, in rule-set order.
    pub fn groups_for<'a>(&'a self, team: &'a TeamRef) -> impl Iterator<Item = &'a str> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.teams.contains(team))
            .map(|rule| rule.group.as_str())
    }

    /// Iterate rules in rule-set order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
