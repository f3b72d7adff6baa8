//! End-to-end query answering through the service.

use serde_json::{json, Value};
use tabular::cache::{MemoryCache, ResultCache};
use tabular::service::error_response;
use tabular::store::{MemoryFactStore, NdjsonFactStore};
use tabular::{CacheOutcome, NameList, Schema, Service, TabularError, ValidationError};

fn schema() -> Schema {
    Schema::from_value(
        "Regionalstatistik",
        json!({
            "S1": {"name": "Bevölkerung", "measures": {
                "M1": {"name": "Einwohner", "region_levels": [1, 3], "dimensions": {
                    "D1": {"values": [{"key": "a"}, {"key": "b"}]}
                }}
            }}
        }),
    )
    .unwrap()
}

fn names() -> NameList {
    NameList::from_iter([("11", "Berlin"), ("12", "Brandenburg")])
}

fn facts() -> Vec<Value> {
    vec![
        json!({"region_id": "11", "region_level": 1, "year": "2015", "statistic": "S1",
               "M1": 42, "cube": "C1"}),
        json!({"region_id": "11", "region_level": 1, "year": "2015", "statistic": "S1",
               "M1": 20, "path": {"M1": {"D1": "a"}}, "cube": "C2"}),
        json!({"region_id": "11", "region_level": 1, "year": "2015", "statistic": "S1",
               "M1": 22, "path": {"M1": {"D1": "b"}}, "cube": "C2"}),
        json!({"region_id": "12", "region_level": 1, "year": "2015", "statistic": "S1",
               "M1": 7.0, "cube": "C1"}),
        json!({"region_id": "12", "region_level": 1, "year": "2014", "statistic": "S1",
               "M1": 6, "cube": "C1"}),
    ]
}

fn store() -> MemoryFactStore {
    MemoryFactStore::from_values("genesapi", facts())
}

#[test]
fn test_plain_measure_csv() {
    let (schema, names, store) = (schema(), names(), store());
    let service = Service::new(&schema, &names, &store);
    let response = service.handle("data=S1:M1&region=11&time=2015").unwrap();
    assert_eq!(response.content, "region_id,year,measure,value\n11,2015,M1,42\n");
    assert_eq!(response.mimetype, "text/plain");
    assert_eq!(response.cubes, vec!["C1"]);
    assert_eq!(response.outcome, CacheOutcome::Miss);
}

#[test]
fn test_json_value_is_integer() {
    let (schema, names, store) = (schema(), names(), store());
    let service = Service::new(&schema, &names, &store);
    let response = service
        .handle("data=S1:M1&region=12&time=2015&format=json")
        .unwrap();
    assert_eq!(response.mimetype, "application/json");
    let parsed: Value = serde_json::from_str(&response.content).unwrap();
    assert_eq!(parsed["data"][0]["value"], json!(7));
    assert!(parsed["data"][0]["value"].is_i64());
}

#[test]
fn test_breakdown_excludes_totals() {
    let (schema, names, store) = (schema(), names(), store());
    let service = Service::new(&schema, &names, &store);
    let response = service.handle("data=S1:M1(D1)&region=11&time=2015").unwrap();
    assert_eq!(
        response.content,
        "region_id,year,measure,value,S1:M1(D1)\n11,2015,M1,20,a\n11,2015,M1,22,b\n"
    );

    let response = service.handle("data=S1:M1(D1:b)&region=11&time=2015").unwrap();
    assert_eq!(
        response.content,
        "region_id,year,measure,value,S1:M1(D1)\n11,2015,M1,22,b\n"
    );
}

#[test]
fn test_last_time_and_all_regions() {
    let (schema, names, store) = (schema(), names(), store());
    let service = Service::new(&schema, &names, &store);
    let response = service.handle("data=S1:M1").unwrap();
    assert_eq!(
        response.content,
        "region_id,year,measure,value\n11,2015,M1,42\n12,2015,M1,7\n"
    );
}

#[test]
fn test_parameter_order_hits_cache() {
    let (schema, names, store) = (schema(), names(), store());
    let cache = MemoryCache::new();
    let service = Service::new(&schema, &names, &store).with_cache(&cache);

    let first = service.handle("data=S1:M1(D1:a|b)&region=11,12&time=2015").unwrap();
    let second = service.handle("time=2015&region=12,11&data=S1:M1(D1:b|a)").unwrap();
    assert_eq!(first.outcome, CacheOutcome::Miss);
    assert_eq!(second.outcome, CacheOutcome::Hit);
    assert_eq!(first.content, second.content);
    assert_eq!(first.cubes, second.cubes);
}

#[test]
fn test_base_reuse_matches_direct_rendering() {
    let (schema, names, store) = (schema(), names(), store());
    let cache = MemoryCache::new();
    let cached = Service::new(&schema, &names, &store).with_cache(&cache);
    let direct = Service::new(&schema, &names, &store);

    cached.handle("data=S1:M1&time=all&level=1").unwrap();
    for variant in [
        "data=S1:M1&time=all&level=1&format=json",
        "data=S1:M1&time=all&level=1&layout=time&labels=both",
        "data=S1:M1&time=all&level=1&sort=value&delimiter=;",
    ] {
        let reused = cached.handle(variant).unwrap();
        assert_eq!(reused.outcome, CacheOutcome::Base, "{}", variant);
        assert_eq!(reused.content, direct.handle(variant).unwrap().content, "{}", variant);
    }
    // one base entry shared by four renderings
    assert_eq!(cache.len(), 5);
}

#[test]
fn test_validation_errors_write_nothing() {
    let (schema, names, store) = (schema(), names(), store());
    let cache = MemoryCache::new();
    let service = Service::new(&schema, &names, &store).with_cache(&cache);

    for (qs, message) in [
        ("data=S1:M1&foo=bar", "unknown attributes: foo"),
        ("data=S2:M1", "statistic `S2` does not exist"),
        ("data=S1:M1&level=2", "region level `2` is not available for measure `M1`"),
        ("data=S1:M1&region=99", "region `99` does not exist"),
    ] {
        let err = service.handle(qs).unwrap_err();
        assert!(matches!(err, TabularError::Validation(_)), "{}", qs);
        let body = error_response(&err).unwrap();
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"error": message}));
    }
    assert!(cache.is_empty());
}

#[test]
fn test_empty_result_is_header_only() {
    let (schema, names, store) = (schema(), names(), store());
    let cache = MemoryCache::new();
    let service = Service::new(&schema, &names, &store).with_cache(&cache);

    let response = service.handle("data=S1:M1&region=11&time=1990").unwrap();
    assert_eq!(response.content, "region_id,year,measure,value\n");
    assert!(response.cubes.is_empty());
    assert_eq!(cache.len(), 2);

    let query = service.parse("data=S1:M1&region=11&time=1990").unwrap();
    assert!(cache.get(&query.data_key().unwrap()).unwrap().is_some());
}

#[test]
fn test_ndjson_store() {
    let dir = std::env::temp_dir().join(format!("tabular-service-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("facts.ndjson");
    let lines: Vec<String> = facts().iter().map(Value::to_string).collect();
    std::fs::write(&path, lines.join("\n")).unwrap();

    let (schema, names) = (schema(), names());
    let store = NdjsonFactStore::new("genesapi", &path);
    let service = Service::new(&schema, &names, &store);
    let response = service.handle("data=S1:M1&region=11&time=2015").unwrap();
    assert_eq!(response.content, "region_id,year,measure,value\n11,2015,M1,42\n");

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_parse_rejects_before_store_access() {
    let (schema, names) = (schema(), names());
    let store = NdjsonFactStore::new("genesapi", "/nonexistent/facts.ndjson");
    let service = Service::new(&schema, &names, &store);

    assert_eq!(
        service.parse("data=S1:M1(D2)").unwrap_err(),
        ValidationError::UnknownDimension {
            measure: "M1".into(),
            dimension: "D2".into()
        }
    );
    assert!(matches!(
        service.handle("data=S1:M1"),
        Err(TabularError::Store(_))
    ));
}
