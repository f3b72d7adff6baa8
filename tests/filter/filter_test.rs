//! Filter compilation and evaluation against an in-memory fact store.

use insta::assert_snapshot;
use serde_json::{json, Value};
use tabular::filter::{Filter, FilterCompiler};
use tabular::store::{Fact, FactStore, MemoryFactStore, StoreResult};
use tabular::{CanonicalQuery, Schema};

fn schema() -> Schema {
    Schema::from_value(
        "Regionalstatistik",
        json!({
            "S1": {"measures": {
                "M1": {"dimensions": {
                    "D1": {"values": [{"key": "a"}, {"key": "b"}, {"key": "c"}]},
                    "D2": {"values": [{"key": "x"}, {"key": "y"}]}
                }},
                "M2": {}
            }},
            "S2": {"measures": {"M3": {}}}
        }),
    )
    .unwrap()
}

fn compile(qs: &str) -> Filter {
    let schema = schema();
    let query = CanonicalQuery::clean(qs).unwrap();
    FilterCompiler::new(&schema, &query).compile()
}

fn search(filter: &Filter, facts: Vec<Value>) -> Vec<Fact> {
    let store = MemoryFactStore::from_values("genesapi", facts);
    store
        .search(filter)
        .unwrap()
        .collect::<StoreResult<_>>()
        .unwrap()
}

fn ids(facts: &[Fact]) -> Vec<&str> {
    facts.iter().map(|f| f["id"].as_str().unwrap()).collect()
}

#[test]
fn test_search_body() {
    let schema = schema();
    let query = CanonicalQuery::clean("data=S1:M2&region=11&time=2015").unwrap();
    let body = FilterCompiler::new(&schema, &query).body();
    assert_snapshot!(body.to_string(), @r#"{"query":{"constant_score":{"filter":{"bool":{"must":[{"term":{"region_id":"11"}},{"term":{"statistic":"S1"}},{"term":{"year":"2015"}},{"bool":{"should":[{"bool":{"must":[{"term":{"statistic":"S1"}},{"bool":{"should":[{"bool":{"must":[{"exists":{"field":"M2"}}]}}]}}]}}]}}]}}}}}"#);
}

#[test]
fn test_one_clause_per_statistic() {
    let json = compile("data=S1:M1,S2:M3&region=11").to_json();
    let must = json["bool"]["must"].as_array().unwrap();
    assert_eq!(must[1], json!({"terms": {"statistic": ["S1", "S2"]}}));
    let statistics = must.last().unwrap()["bool"]["should"].as_array().unwrap();
    assert_eq!(statistics.len(), 2);
    assert_eq!(
        statistics[1]["bool"]["must"][0],
        json!({"term": {"statistic": "S2"}})
    );
}

#[test]
fn test_closed_world_selection() {
    let facts = vec![
        json!({"id": "plain", "region_id": "11", "statistic": "S1", "M1": 1}),
        json!({"id": "a", "region_id": "11", "statistic": "S1", "M1": 2,
               "path": {"M1": {"D1": "a"}}}),
        json!({"id": "b", "region_id": "11", "statistic": "S1", "M1": 3,
               "path": {"M1": {"D1": "b"}}}),
        json!({"id": "a-x", "region_id": "11", "statistic": "S1", "M1": 4,
               "path": {"M1": {"D1": "a", "D2": "x"}}}),
        json!({"id": "other-statistic", "region_id": "11", "statistic": "S2", "M3": 5}),
    ];

    let plain = search(&compile("data=S1:M1&region=11"), facts.clone());
    assert_eq!(ids(&plain), vec!["plain"]);

    let by_d1 = search(&compile("data=S1:M1(D1)&region=11"), facts.clone());
    assert_eq!(ids(&by_d1), vec!["a", "b"]);

    let only_a = search(&compile("data=S1:M1(D1:a)&region=11"), facts.clone());
    assert_eq!(ids(&only_a), vec!["a"]);

    let both = search(&compile("data=S1:M1(D1:a,D2)&region=11"), facts.clone());
    assert_eq!(ids(&both), vec!["a-x"]);

    let two_statistics = search(&compile("data=S1:M1,S2:M3&region=11"), facts);
    assert_eq!(ids(&two_statistics), vec!["plain", "other-statistic"]);
}

#[test]
fn test_meta_clauses_select_regions_and_time() {
    let facts = vec![
        json!({"id": "berlin-2014", "region_id": "11", "region_level": 1, "year": "2014",
               "statistic": "S2", "M3": 1}),
        json!({"id": "berlin-2016", "region_id": "11", "region_level": 1, "year": "2016",
               "statistic": "S2", "M3": 2}),
        json!({"id": "koeln-2016", "region_id": "05315", "region_level": 3, "year": "2016",
               "statistic": "S2", "M3": 3}),
        json!({"id": "bonn-2016", "region_id": "05314", "region_level": 3, "year": 2016,
               "statistic": "S2", "M3": 4}),
    ];

    let since_2015 = search(&compile("data=S2:M3&level=all&time=2015:"), facts.clone());
    assert_eq!(ids(&since_2015), vec!["berlin-2016", "koeln-2016", "bonn-2016"]);

    let level_three = search(&compile("data=S2:M3&level=3&time=2016"), facts.clone());
    assert_eq!(ids(&level_three), vec!["koeln-2016", "bonn-2016"]);

    let under_nrw = search(&compile("data=S2:M3&level=all&parent=05"), facts.clone());
    assert_eq!(ids(&under_nrw), vec!["koeln-2016", "bonn-2016"]);

    // listed regions ignore the default level
    let listed = search(&compile("data=S2:M3&region=05315,11&time=all"), facts);
    assert_eq!(ids(&listed), vec!["berlin-2014", "berlin-2016", "koeln-2016"]);
}

#[test]
fn test_filter_serializes_as_store_json() {
    let filter = Filter::Bool(tabular::filter::BoolFilter {
        must: vec![Filter::range("year", Some(2000), Some(2010))],
        must_not: vec![Filter::prefix("region_id", "05")],
        should: vec![Filter::term("statistic", "S1")],
    });
    assert_eq!(
        serde_json::to_value(&filter).unwrap(),
        json!({"bool": {
            "must": [{"range": {"year": {"gte": 2000, "lte": 2010}}}],
            "must_not": [{"prefix": {"region_id": "05"}}],
            "should": [{"term": {"statistic": "S1"}}],
            "minimum_should_match": 1
        }})
    );
}
