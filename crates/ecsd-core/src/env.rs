//! Environment override sets and the merge into a container's variables.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::types::EnvironmentVariable;

/// Desired final values for a subset of environment variables.
///
/// Keys are unique and iterate in lexicographic order, which fixes the order
/// in which new variables are appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentOverrides(BTreeMap<String, String>);

impl EnvironmentOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any earlier one for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Layer `other` on top of `self`; `other` wins on conflicts.
    pub fn extend(&mut self, other: EnvironmentOverrides) {
        self.0.extend(other.0);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentOverrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One `NAME=value` command-line assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvAssignment {
    pub name: String,
    pub value: String,
}

impl FromStr for EnvAssignment {
    type Err = ConfigError;

    /// Splits on the first `=`; the value may itself contain `=` or be empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidEnv(s.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidEnv(s.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

/// Names touched by a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub updated: Vec<String>,
    pub added: Vec<String>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.added.is_empty()
    }
}

/// Reconcile `overrides` into `vars`.
///
/// Matching entries take the override value where they stand; names not yet
/// present are appended in key order. Nothing is removed or reordered. If the
/// list already held duplicates of a name, every copy is updated.
pub fn merge_environment(
    vars: &mut Vec<EnvironmentVariable>,
    overrides: &EnvironmentOverrides,
) -> MergeReport {
    let mut report = MergeReport::default();

    for (name, value) in overrides.iter() {
        let mut found = false;
        for var in vars.iter_mut().filter(|v| v.name == name) {
            found = true;
            var.value = value.to_string();
        }

        if found {
            debug!(%name, "updating env");
            report.updated.push(name.to_string());
        } else {
            debug!(%name, "adding env");
            vars.push(EnvironmentVariable::new(name, value));
            report.added.push(name.to_string());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> EnvironmentOverrides {
        pairs.iter().copied().collect()
    }

    fn contains(vars: &[EnvironmentVariable], name: &str, value: &str) -> bool {
        vars.iter().any(|v| v.name == name && v.value == value)
    }

    #[test]
    fn merge_empty_overrides() {
        let mut vars = Vec::new();
        let report = merge_environment(&mut vars, &EnvironmentOverrides::new());
        assert!(vars.is_empty());
        assert!(report.is_empty());
    }

    #[test]
    fn merge_single_var() {
        let mut vars = Vec::new();
        merge_environment(&mut vars, &overrides(&[("aa", "1")]));
        assert_eq!(vars, vec![EnvironmentVariable::new("aa", "1")]);
    }

    #[test]
    fn merge_add_two_vars() {
        let mut vars = Vec::new();
        let report = merge_environment(&mut vars, &overrides(&[("ab", "2"), ("aa", "1")]));
        assert_eq!(vars.len(), 2);
        assert!(contains(&vars, "aa", "1"));
        assert!(contains(&vars, "ab", "2"));
        // Appended in key order regardless of input order.
        assert_eq!(vars[0].name, "aa");
        assert_eq!(report.added, vec!["aa", "ab"]);
    }

    #[test]
    fn merge_replaces_existing_in_place() {
        let mut vars = vec![EnvironmentVariable::new("ab", "*")];
        let report = merge_environment(&mut vars, &overrides(&[("aa", "1"), ("ab", "2")]));
        assert_eq!(vars.len(), 2);
        assert!(contains(&vars, "aa", "1"));
        assert!(contains(&vars, "ab", "2"));
        assert_eq!(vars[0], EnvironmentVariable::new("ab", "2"));
        assert_eq!(report.updated, vec!["ab"]);
        assert_eq!(report.added, vec!["aa"]);
    }

    #[test]
    fn merge_keeps_untouched_entries_and_positions() {
        let mut vars = vec![
            EnvironmentVariable::new("z", "last"),
            EnvironmentVariable::new("m", "old"),
            EnvironmentVariable::new("a", "first"),
        ];
        merge_environment(&mut vars, &overrides(&[("m", "new"), ("b", "x")]));
        let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["z", "m", "a", "b"]);
        assert_eq!(vars[1].value, "new");
        assert_eq!(vars[0].value, "last");
    }

    #[test]
    fn merge_is_idempotent() {
        let base = vec![
            EnvironmentVariable::new("ab", "*"),
            EnvironmentVariable::new("keep", "1"),
        ];
        let set = overrides(&[("aa", "1"), ("ab", "2"), ("zz", "")]);

        let mut once = base.clone();
        merge_environment(&mut once, &set);

        let mut twice = base;
        merge_environment(&mut twice, &set);
        let second = merge_environment(&mut twice, &set);

        assert_eq!(once, twice);
        assert!(second.added.is_empty());
    }

    #[test]
    fn merge_updates_every_duplicate() {
        let mut vars = vec![
            EnvironmentVariable::new("dup", "1"),
            EnvironmentVariable::new("dup", "2"),
        ];
        merge_environment(&mut vars, &overrides(&[("dup", "3")]));
        assert_eq!(vars.len(), 2);
        assert!(vars.iter().all(|v| v.value == "3"));
    }

    #[test]
    fn parse_assignment() {
        let a: EnvAssignment = "KEY=value".parse().unwrap();
        assert_eq!(a.name, "KEY");
        assert_eq!(a.value, "value");

        let a: EnvAssignment = "URL=postgres://u@h/db?sslmode=require".parse().unwrap();
        assert_eq!(a.value, "postgres://u@h/db?sslmode=require");

        let a: EnvAssignment = "EMPTY=".parse().unwrap();
        assert_eq!(a.value, "");

        assert!("NOEQUALS".parse::<EnvAssignment>().is_err());
        assert!("=value".parse::<EnvAssignment>().is_err());
    }

    #[test]
    fn later_overrides_win() {
        let mut base = overrides(&[("a", "1"), ("b", "1")]);
        base.extend(overrides(&[("b", "2")]));
        assert_eq!(base.get("a"), Some("1"));
        assert_eq!(base.get("b"), Some("2"));
    }
}
