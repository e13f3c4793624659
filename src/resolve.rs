//! Site directory resolution
//!
//! Maps every configured group onto the id of the console site carrying the
//! same name. Any disagreement between the two lists aborts the run.

use std::collections::HashMap;

use tracing::info;

use crate::classify::RuleSet;
use crate::console::{ConsoleApi, RemoteSite};
use crate::error::{Result, SorterError};

/// Group name to console site id, in configured group order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDirectory {
    entries: Vec<(String, String)>,
}

impl SiteDirectory {
    /// Fetch move-eligible sites and match them against the rule set
    pub async fn resolve(api: &dyn ConsoleApi, rules: &RuleSet) -> Result<Self> {
        let sites = api.list_move_sites().await?;
        let directory = Self::from_sites(rules, sites)?;
        info!("Successfully loaded site ids from the API");
        Ok(directory)
    }

    /// Match a site listing against the rule set
    pub fn from_sites(rules: &RuleSet, sites: Vec<RemoteSite>) -> Result<Self> {
        let mut ids: HashMap<String, String> = HashMap::new();

        for site in sites {
            if !rules.contains(&site.name) {
                return Err(SorterError::SiteMismatch(format!(
                    "Site '{}' has no group in the rule file. Add a group with this name \
                     and a list of patterns, or an empty list to ignore it.",
                    site.name
                )));
            }
            if ids.contains_key(&site.name) {
                return Err(SorterError::SiteMismatch(format!(
                    "Site '{}' was returned more than once by the API",
                    site.name
                )));
            }
            ids.insert(site.name, site.id);
        }

        if ids.len() != rules.len() {
            let mut returned: Vec<&str> = ids.keys().map(String::as_str).collect();
            returned.sort_unstable();
            let mut expected: Vec<&str> = rules.group_names().collect();
            expected.sort_unstable();
            let missing: Vec<&str> = expected
                .iter()
                .copied()
                .filter(|name| !ids.contains_key(*name))
                .collect();

            return Err(SorterError::SiteMismatch(format!(
                "Mismatch between configured groups and API result.\n\
                 API returned site list: {:?}\n\
                 Rule file expected: {:?}\n\
                 Missing from API: {:?}\n\n\
                 Is the service account admin on all mentioned sites?",
                returned, expected, missing
            )));
        }

        let entries = rules
            .group_names()
            .filter_map(|name| ids.remove(name).map(|id| (name.to_string(), id)))
            .collect();

        Ok(Self { entries })
    }

    /// Console site id of a group
    pub fn site_id(&self, group: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, id)| id.as_str())
    }

    /// Site id of a group, failing when the group is unknown
    pub fn require(&self, group: &str) -> Result<&str> {
        self.site_id(group).ok_or_else(|| {
            SorterError::SiteMismatch(format!("no console site resolved for group '{}'", group))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, i)| (n.as_str(), i.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GroupConfig};
    use crate::console::MockConsoleApi;
    use assert_matches::assert_matches;

    fn rules(names: &[&str]) -> RuleSet {
        let config = Config {
            groups: names
                .iter()
                .map(|name| GroupConfig {
                    name: name.to_string(),
                    patterns: Vec::new(),
                })
                .collect(),
            ..Config::default()
        };
        RuleSet::compile(&config).unwrap()
    }

    fn site(id: &str, name: &str) -> RemoteSite {
        RemoteSite {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_resolves_in_group_order() {
        let directory = SiteDirectory::from_sites(
            &rules(&["France", "Other"]),
            vec![site("2", "Other"), site("1", "France")],
        )
        .unwrap();

        let entries: Vec<_> = directory.iter().collect();
        assert_eq!(entries, vec![("France", "1"), ("Other", "2")]);
        assert_eq!(directory.site_id("Other"), Some("2"));
        assert!(directory.site_id("Germany").is_none());
        assert!(directory.require("Germany").is_err());
    }

    #[test]
    fn test_unknown_remote_site_is_fatal() {
        let result = SiteDirectory::from_sites(
            &rules(&["France"]),
            vec![site("1", "France"), site("9", "Atlantis")],
        );

        assert_matches!(result, Err(SorterError::SiteMismatch(msg)) if msg.contains("Atlantis"));
    }

    #[test]
    fn test_missing_remote_site_is_fatal() {
        let result = SiteDirectory::from_sites(
            &rules(&["France", "Germany", "Other"]),
            vec![site("1", "France"), site("2", "Other")],
        );

        assert_matches!(
            result,
            Err(SorterError::SiteMismatch(msg)) if msg.contains("Missing from API: [\"Germany\"]")
        );
    }

    #[test]
    fn test_duplicate_remote_site_is_fatal() {
        let result = SiteDirectory::from_sites(
            &rules(&["France"]),
            vec![site("1", "France"), site("2", "France")],
        );

        assert_matches!(result, Err(SorterError::SiteMismatch(_)));
    }

    #[tokio::test]
    async fn test_resolve_uses_console() {
        let mut api = MockConsoleApi::new();
        api.expect_list_move_sites()
            .times(1)
            .returning(|| Ok(vec![site("1", "France")]));

        let directory = SiteDirectory::resolve(&api, &rules(&["France"])).await.unwrap();
        assert_eq!(directory.len(), 1);
    }
}
