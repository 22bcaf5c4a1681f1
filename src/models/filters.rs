use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata filter: every listed field must hold one of its accepted values.
///
/// `{"name": ["a.txt", "b.txt"], "lang": ["en"]}` keeps documents named
/// `a.txt` or `b.txt` whose `lang` is `en`. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(pub BTreeMap<String, Vec<Value>>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, accepted: Vec<Value>) -> Self {
        self.0.insert(field.into(), accepted);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `lookup` resolves a field name to the candidate's value, if present.
    pub fn matches<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<Value>,
    {
        self.0.iter().all(|(field, accepted)| match lookup(field) {
            Some(Value::Array(items)) => items.iter().any(|v| accepted.contains(v)),
            Some(value) => accepted.contains(&value),
            None => false,
        })
    }

    pub fn matches_meta(&self, meta: &Map<String, Value>) -> bool {
        self.matches(|field| meta.get(field).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filters::new().matches_meta(&Map::new()));
    }

    #[test]
    fn all_fields_must_match() {
        let f = Filters::new()
            .with("name", vec![json!("a.txt"), json!("b.txt")])
            .with("lang", vec![json!("en")]);
        assert!(f.matches_meta(&meta(json!({"name": "b.txt", "lang": "en"}))));
        assert!(!f.matches_meta(&meta(json!({"name": "b.txt", "lang": "de"}))));
        assert!(!f.matches_meta(&meta(json!({"name": "b.txt"}))));
    }

    #[test]
    fn array_values_match_any_element() {
        let f = Filters::new().with("tags", vec![json!("faq")]);
        assert!(f.matches_meta(&meta(json!({"tags": ["intro", "faq"]}))));
        assert!(!f.matches_meta(&meta(json!({"tags": ["intro"]}))));
    }

    #[test]
    fn deserializes_from_plain_object() {
        let f: Filters = serde_json::from_value(json!({"name": ["a.txt"]})).unwrap();
        assert_eq!(f, Filters::new().with("name", vec![json!("a.txt")]));
    }
}
