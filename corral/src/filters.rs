use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::labels::Labels;

/// A daemon query filter: category to set of values, AND semantics across
/// entries of the same category.
///
/// Helpers never mutate their receiver. Extending a filter set returns a new
/// value, so a set handed to a caller stays what it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters(BTreeMap<String, BTreeSet<String>>);

impl Filters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One `label: key=value` entry.
    #[must_use]
    pub fn label(key: &str, value: &str) -> Self {
        Self::new().with("label", &format!("{key}={value}"))
    }

    /// One `label:` entry per pair.
    #[must_use]
    pub fn labels(labels: &Labels) -> Self {
        labels
            .iter()
            .fold(Self::new(), |acc, (k, v)| acc.with("label", &format!("{k}={v}")))
    }

    #[must_use]
    pub fn with(&self, category: &str, value: &str) -> Self {
        let mut out = self.clone();
        out.0.entry(category.to_owned()).or_default().insert(value.to_owned());
        out
    }

    #[must_use]
    pub fn with_labels(&self, labels: &Labels) -> Self {
        labels
            .iter()
            .fold(self.clone(), |acc, (k, v)| acc.with("label", &format!("{k}={v}")))
    }

    /// Additive merge across every category of both sets.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (category, values) in &other.0 {
            let entry = out.0.entry(category.clone()).or_default();
            for value in values {
                entry.insert(value.clone());
            }
        }
        out
    }

    #[must_use]
    pub fn contains(&self, category: &str, value: &str) -> bool {
        self.0.get(category).is_some_and(|values| values.contains(value))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn category(&self, category: &str) -> Vec<&str> {
        self.0
            .get(category)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// The shape the daemon API takes filters in.
    #[must_use]
    pub fn to_query(&self) -> HashMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(category, values)| (category.clone(), values.iter().cloned().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn label_single() {
        let f = Filters::label("com.test.managed", "true");
        assert_eq!(f.category("label"), vec!["com.test.managed=true"]);
    }

    #[test]
    fn labels_multi_and_semantics() {
        let labels: Labels =
            [("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())].into();
        let f = Filters::labels(&labels);
        assert_eq!(f.category("label"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn with_leaves_receiver_alone() {
        let f = Filters::label("k", "v");
        let g = f.with("name", "^/web$");
        assert!(f.category("name").is_empty());
        assert_eq!(g.category("name"), vec!["^/web$"]);
        assert_eq!(g.category("label"), vec!["k=v"]);
    }

    #[test]
    fn merged_with_is_additive() {
        let f = Filters::label("k", "v");
        let g = Filters::label("k2", "v2").with("dangling", "true");
        let merged = f.merged_with(&g);
        assert_eq!(merged.category("label"), vec!["k2=v2", "k=v"]);
        assert_eq!(merged.category("dangling"), vec!["true"]);
        // receiver untouched
        assert_eq!(f.category("label"), vec!["k=v"]);
    }

    #[test]
    fn to_query_shape() {
        let f = Filters::label("k", "v").with("name", "web");
        let q = f.to_query();
        assert_eq!(q["label"], vec!["k=v".to_owned()]);
        assert_eq!(q["name"], vec!["web".to_owned()]);
    }
}
