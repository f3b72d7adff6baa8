//! Region name-list: region id → display name.

use std::collections::BTreeMap;

/// External list of known region ids and their display names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameList(BTreeMap<String, String>);

impl NameList {
    pub fn new(names: BTreeMap<String, String>) -> Self {
        Self(names)
    }

    /// Parse the name-list JSON (a flat `{"id": "name"}` object).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::from_str(json)?))
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.0.contains_key(region_id)
    }

    pub fn get(&self, region_id: &str) -> Option<&str> {
        self.0.get(region_id).map(String::as_str)
    }

    /// Display name for a region, or the id itself when it is not listed.
    pub fn label<'a>(&'a self, region_id: &'a str) -> &'a str {
        self.get(region_id).unwrap_or(region_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NameList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
