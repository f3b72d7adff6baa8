//! Query string cleaning, canonical form and cache keys.

use tabular::query::{
    parse_query_string, Labels, Layout, LevelSelector, OutputFormat, RegionSelector, SortKey,
    TimeSelector,
};
use tabular::{CanonicalQuery, ValidationError};

fn clean(qs: &str) -> CanonicalQuery {
    CanonicalQuery::clean(qs).unwrap()
}

// =============================================================================
// Decoding
// =============================================================================

#[test]
fn test_query_string_decoding() {
    let raw = parse_query_string("?data=12411%3ABEVSTD%28GES%29&region=11&region=&time=2015");
    assert_eq!(raw["data"], vec!["12411:BEVSTD(GES)"]);
    assert_eq!(raw["region"], vec!["11"]);
    assert_eq!(raw["time"], vec!["2015"]);
}

#[test]
fn test_form_encoding_and_repeated_keys() {
    let raw = parse_query_string("data=S1:M1&delimiter=%3B&x=a+b%20c&data=S2%3AM2&bad=20%1");
    assert_eq!(raw["data"], vec!["S1:M1", "S2:M2"]);
    assert_eq!(raw["delimiter"], vec![";"]);
    assert_eq!(raw["x"], vec!["a b c"]);
    assert_eq!(raw["bad"], vec!["20%1"]);
}

#[test]
fn test_encoded_and_plain_forms_are_equal() {
    let plain = clean("data=S1:M1(D1:a|b)&region=11");
    let encoded = clean("data=S1%3AM1%28D1%3Aa%7Cb%29&region=11");
    assert_eq!(plain.render_key().unwrap(), encoded.render_key().unwrap());
}

// =============================================================================
// Cleaning
// =============================================================================

#[test]
fn test_presentation_fields() {
    let query = clean("data=S1:M1&labels=both&layout=region&format=json&sort=value");
    assert_eq!(query.labels, Labels::Both);
    assert_eq!(query.layout, Layout::Region);
    assert_eq!(query.format, OutputFormat::Json);
    assert_eq!(query.sort, SortKey::Value);
    assert_eq!(query.format.mimetype(), "application/json");
}

#[test]
fn test_selectors() {
    let query = clean("data=S1:M1&region=12,11&level=2,3&time=:2010");
    assert_eq!(
        query.region,
        RegionSelector::Ids(["11".to_string(), "12".to_string()].into())
    );
    assert_eq!(query.level, LevelSelector::Levels([2, 3].into()));
    assert_eq!(
        query.time,
        TimeSelector::Range {
            start: None,
            end: Some(2010)
        }
    );
}

#[test]
fn test_default_literal_equals_absent() {
    let explicit = clean("data=S1:M1&region=all&level=1&time=last&format=csv&delimiter=,");
    let implicit = clean("data=S1:M1");
    assert_eq!(explicit.render_key().unwrap(), implicit.render_key().unwrap());
}

#[test]
fn test_data_entries_merge_across_repeats_and_commas() {
    let repeated = clean("data=S1:M1(D1:a)&data=S1:M1(D1:b),S2:M2");
    let combined = clean("data=S2:M2,S1:M1(D1:b|a)");
    assert_eq!(repeated.data, combined.data);
    assert_eq!(repeated.data.len(), 2);
}

#[test]
fn test_rejections() {
    assert_eq!(
        CanonicalQuery::clean("data=S1:M1&foo=1&bar=2"),
        Err(ValidationError::UnknownParameters(vec![
            "bar".into(),
            "foo".into()
        ]))
    );
    assert_eq!(
        CanonicalQuery::clean("data=S1:M1&time=2015&time=2016"),
        Err(ValidationError::Repeated("time".into()))
    );
    assert_eq!(
        CanonicalQuery::clean("data=S1:M1&format=csv,json"),
        Err(ValidationError::NotAList("format".into()))
    );
    assert_eq!(
        CanonicalQuery::clean("data=S1:M1&layout=pivot"),
        Err(ValidationError::InvalidValue {
            param: "layout".into(),
            value: "pivot".into()
        })
    );
    assert_eq!(
        CanonicalQuery::clean("data=S1:M1&time=15"),
        Err(ValidationError::InvalidValue {
            param: "time".into(),
            value: "15".into()
        })
    );
    assert!(matches!(
        CanonicalQuery::clean("data=S1"),
        Err(ValidationError::MalformedData(_))
    ));
    assert_eq!(CanonicalQuery::clean(""), Err(ValidationError::MissingData));
}

#[test]
fn test_error_messages() {
    let err = CanonicalQuery::clean("data=S1:M1&time=2015&time=2016").unwrap_err();
    assert_eq!(
        err.to_string(),
        "param `time` can only be used once in query string"
    );
    let err = CanonicalQuery::clean("data=S1:M1&colour=red").unwrap_err();
    assert_eq!(err.to_string(), "unknown attributes: colour");
}

// =============================================================================
// Keys
// =============================================================================

#[test]
fn test_render_key_ignores_parameter_order() {
    let a = clean("data=S1:M1(D1:a|b)&region=11,12&time=2015");
    let b = clean("time=2015&region=12,11&data=S1:M1(D1:b|a)");
    assert_eq!(a.render_key().unwrap(), b.render_key().unwrap());
    assert_eq!(a.data_key().unwrap(), b.data_key().unwrap());
    // the raw string is kept but not hashed
    assert_ne!(a.urlquery, b.urlquery);
}

#[test]
fn test_data_key_shared_by_presentation_variants() {
    let base = clean("data=S1:M1&region=11");
    for variant in [
        "data=S1:M1&region=11&format=json",
        "data=S1:M1&region=11&layout=time",
        "data=S1:M1&region=11&labels=name",
        "data=S1:M1&region=11&sort=value",
        "data=S1:M1&region=11&delimiter=;",
    ] {
        let query = clean(variant);
        assert_eq!(query.data_key().unwrap(), base.data_key().unwrap(), "{}", variant);
        assert_ne!(query.render_key().unwrap(), base.render_key().unwrap(), "{}", variant);
    }
}

#[test]
fn test_data_key_differs_for_data_fields() {
    let base = clean("data=S1:M1&region=11");
    for variant in [
        "data=S1:M1&region=12",
        "data=S1:M1&region=11&time=2015",
        "data=S1:M1&region=11&dformat=date",
        "data=S1:M1&region=11&level=2",
        "data=S1:M1&region=11&parent=1",
        "data=S1:M1(D1)&region=11",
    ] {
        let query = clean(variant);
        assert_ne!(query.data_key().unwrap(), base.data_key().unwrap(), "{}", variant);
    }
}

#[test]
fn test_key_format() {
    let key = clean("data=S1:M1").render_key().unwrap();
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
}
