//! URL query-string decoding.
//!
//! Collects every value given for each key, in the order they appear.
//! Decoding follows `application/x-www-form-urlencoded`; pairs with an empty
//! value are dropped.

use std::collections::BTreeMap;
use url::form_urlencoded;

/// Decoded query string: key → values in order of appearance.
pub type RawQuery = BTreeMap<String, Vec<String>>;

pub fn parse_query_string(qs: &str) -> RawQuery {
    let mut parsed = RawQuery::new();
    let qs = qs.trim_start_matches('?');
    for (key, value) in form_urlencoded::parse(qs.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        parsed
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    parsed
}
