//! Endpoint classification
//!
//! Groups are tried in configured order and patterns within a group in
//! listed order. The first pattern matching the start of an endpoint's
//! display name decides its group. A pattern starting with `(?i)` ignores
//! case; every other pattern is case-sensitive.

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::config::{Config, GroupConfig};
use crate::console::Endpoint;
use crate::error::{Result, SorterError};

/// Marker opting a pattern into case-insensitive matching
pub const CASE_INSENSITIVE_MARKER: &str = "(?i)";

/// A compiled group pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern anchored at the start of the subject
    pub fn compile(source: &str) -> Result<Self> {
        let (body, ignore_case) = match source.strip_prefix(CASE_INSENSITIVE_MARKER) {
            Some(rest) => (rest, true),
            None => (source, false),
        };

        let regex = RegexBuilder::new(&format!("^(?:{})", body))
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| SorterError::config(format!("invalid pattern '{}': {}", source, e)))?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }
}

/// A group and its compiled patterns
#[derive(Debug, Clone)]
pub struct GroupRule {
    pub name: String,
    pub patterns: Vec<Pattern>,
}

impl GroupRule {
    pub fn compile(group: &GroupConfig) -> Result<Self> {
        let patterns = group
            .patterns
            .iter()
            .map(|p| Pattern::compile(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: group.name.clone(),
            patterns,
        })
    }

    /// First pattern of this group matching the subject
    pub fn first_match(&self, subject: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.is_match(subject))
    }
}

/// Ordered group rules
#[derive(Debug, Clone)]
pub struct RuleSet {
    groups: Vec<GroupRule>,
}

impl RuleSet {
    /// Compile every group of the rule file, failing on the first bad pattern
    pub fn compile(config: &Config) -> Result<Self> {
        let groups = config
            .groups
            .iter()
            .map(GroupRule::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[GroupRule] {
        &self.groups
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group the subject belongs to, if any
    pub fn match_name(&self, subject: &str) -> Option<&GroupRule> {
        self.groups
            .iter()
            .find(|group| group.first_match(subject).is_some())
    }

    /// Sort endpoints into group buckets
    pub fn classify(&self, endpoints: Vec<Endpoint>) -> ClassificationResult {
        let mut buckets: Vec<GroupBucket> = self
            .groups
            .iter()
            .map(|g| GroupBucket {
                group: g.name.clone(),
                endpoints: Vec::new(),
            })
            .collect();
        let mut unmatched = Vec::new();

        for endpoint in endpoints {
            match self.groups.iter().position(|g| g.first_match(&endpoint.name).is_some()) {
                Some(index) => {
                    debug!("{} -> {}", endpoint.name, buckets[index].group);
                    buckets[index].endpoints.push(endpoint);
                }
                None => {
                    warn!("Endpoint {} did not match any group pattern", endpoint.name);
                    unmatched.push(endpoint);
                }
            }
        }

        ClassificationResult { buckets, unmatched }
    }
}

/// Endpoints assigned to one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBucket {
    pub group: String,
    pub endpoints: Vec<Endpoint>,
}

impl GroupBucket {
    pub fn names(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Outcome of classifying one listing of endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    buckets: Vec<GroupBucket>,
    unmatched: Vec<Endpoint>,
}

impl ClassificationResult {
    /// Every configured group in order, empty ones included
    pub fn buckets(&self) -> &[GroupBucket] {
        &self.buckets
    }

    /// Groups that received at least one endpoint
    pub fn non_empty(&self) -> impl Iterator<Item = &GroupBucket> {
        self.buckets.iter().filter(|b| !b.is_empty())
    }

    pub fn bucket(&self, group: &str) -> Option<&GroupBucket> {
        self.buckets.iter().find(|b| b.group == group)
    }

    pub fn unmatched(&self) -> &[Endpoint] {
        &self.unmatched
    }

    pub fn has_moves(&self) -> bool {
        self.non_empty().next().is_some()
    }

    pub fn moved_count(&self) -> usize {
        self.non_empty().map(|b| b.endpoints.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn rules(groups: &[(&str, &[&str])]) -> RuleSet {
        let config = Config {
            groups: groups
                .iter()
                .map(|(name, patterns)| GroupConfig {
                    name: name.to_string(),
                    patterns: patterns.iter().map(|p| p.to_string()).collect(),
                })
                .collect(),
            ..Config::default()
        };
        RuleSet::compile(&config).expect("rules compile")
    }

    #[test]
    fn test_scenario_france_other() {
        let rules = rules(&[("France", &["^FR.+"]), ("Other", &[])]);
        let result = rules.classify(vec![Endpoint::new("10", "FR01"), Endpoint::new("11", "XX99")]);

        assert_eq!(
            result.bucket("France").unwrap().endpoints,
            vec![Endpoint::new("10", "FR01")]
        );
        assert!(result.bucket("Other").unwrap().is_empty());
        assert_eq!(result.unmatched(), &[Endpoint::new("11", "XX99")]);
        assert_eq!(result.moved_count(), 1);
    }

    #[test]
    fn test_first_group_in_order_wins() {
        let rules = rules(&[("Spain", &["(?i)(C|S|V|EU)?ES.+"]), ("Europe", &["EU.+"])]);
        let result = rules.classify(vec![Endpoint::new("1", "EUES01")]);

        assert_eq!(result.bucket("Spain").unwrap().names(), vec!["EUES01"]);
        assert!(result.bucket("Europe").unwrap().is_empty());
    }

    #[test]
    fn test_later_pattern_of_group_matches() {
        let rules = rules(&[("France", &["(?i)^(C|S|V)FR.+", "(?i)^Julie.+"])]);
        assert_eq!(rules.match_name("julie-laptop").unwrap().name, "France");
    }

    #[test]
    fn test_prefix_match_not_search() {
        let rules = rules(&[("France", &["FR.+"])]);

        assert!(rules.match_name("FR01-extra").is_some());
        assert!(rules.match_name("XFR01").is_none());
    }

    #[test]
    fn test_case_sensitivity_marker() {
        let sensitive = Pattern::compile("CFR.+").unwrap();
        let insensitive = Pattern::compile("(?i)CFR.+").unwrap();

        assert!(sensitive.is_match("CFR01"));
        assert!(!sensitive.is_match("cfr01"));
        assert!(insensitive.is_match("cfr01"));
        assert_eq!(insensitive.source(), "(?i)CFR.+");
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = Pattern::compile("(unclosed").unwrap_err();
        assert!(matches!(err, SorterError::Config(msg) if msg.contains("(unclosed")));
    }

    #[test]
    fn test_buckets_keep_configured_order() {
        let rules = rules(&[("B", &["b"]), ("A", &["a"]), ("C", &[])]);
        let result = rules.classify(vec![Endpoint::new("1", "a1"), Endpoint::new("2", "b1")]);

        let order: Vec<_> = result.buckets().iter().map(|b| b.group.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        let moving: Vec<_> = result.non_empty().map(|b| b.group.as_str()).collect();
        assert_eq!(moving, vec!["B", "A"]);
    }

    #[test]
    fn test_nothing_matches() {
        let rules = rules(&[("France", &["FR"]), ("Default site", &[])]);
        let result = rules.classify(vec![Endpoint::new("1", "DE01")]);

        assert!(!result.has_moves());
        assert_eq!(result.unmatched().len(), 1);
    }

    #[quickcheck]
    fn prop_empty_pattern_groups_never_receive_endpoints(names: Vec<String>) -> bool {
        let rules = rules(&[("Catch", &["[a-m]"]), ("Empty", &[])]);
        let endpoints = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Endpoint::new(i.to_string(), name))
            .collect();

        let result = rules.classify(endpoints);
        result.bucket("Empty").map_or(false, |b| b.is_empty())
    }

    #[quickcheck]
    fn prop_every_endpoint_lands_exactly_once(names: Vec<String>) -> bool {
        let rules = rules(&[("Lower", &["[a-z]"]), ("Digit", &["[0-9]"]), ("Any", &["(?i)[a-z]"])]);
        let total = names.len();
        let endpoints = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Endpoint::new(i.to_string(), name))
            .collect();

        let result = rules.classify(endpoints);
        result.moved_count() + result.unmatched().len() == total
    }
}
