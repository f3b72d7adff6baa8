//! Facts through the tabulation stages into rendered tables.

use insta::assert_snapshot;
use serde_json::{json, Value};
use tabular::store::Fact;
use tabular::table::{LongTable, Tabulator};
use tabular::{CanonicalQuery, NameList, Schema};

fn schema() -> Schema {
    Schema::from_value(
        "Regionalstatistik",
        json!({
            "S1": {"name": "Bevölkerung", "measures": {
                "M1": {"name": "Einwohner", "dimensions": {
                    "D1": {"name": "Geschlecht", "values": [
                        {"key": "a", "name": "männlich"},
                        {"key": "b", "name": "weiblich"}
                    ]}
                }}
            }}
        }),
    )
    .unwrap()
}

fn names() -> NameList {
    NameList::from_iter([("11", "Berlin"), ("12", "Brandenburg")])
}

fn facts(values: Vec<Value>) -> Vec<Fact> {
    values
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn yearly() -> Vec<Fact> {
    facts(vec![
        json!({"region_id": "11", "year": "2014", "statistic": "S1", "M1": 4, "cube": "C1"}),
        json!({"region_id": "11", "year": "2016", "statistic": "S1", "M1": 5.0, "cube": "C2"}),
        json!({"region_id": "12", "year": "2016", "statistic": "S1", "M1": {"value": 6.5},
               "cube": "C2"}),
    ])
}

fn render(qs: &str, facts: &[Fact]) -> String {
    let schema = schema();
    let names = names();
    let query = CanonicalQuery::clean(qs).unwrap();
    let view = schema.get_filtered(&query.data);
    let table = LongTable::from_facts(facts, &view, &query);
    Tabulator::new(&view, &names, &query).render(&table).unwrap()
}

#[test]
fn test_long_tsv_with_dimension() {
    let facts = facts(vec![
        json!({"region_id": "12", "year": "2015", "statistic": "S1", "M1": 7,
               "path": {"M1": {"D1": "a"}}}),
        json!({"region_id": "11", "year": "2015", "statistic": "S1", "M1": 12,
               "path": {"M1": {"D1": "b"}}}),
        json!({"region_id": "11", "year": "2015", "statistic": "S1", "M1": {"value": 10},
               "path": {"M1": {"D1": "a"}}}),
    ]);
    assert_eq!(
        render("data=S1:M1(D1)&time=2015&format=tsv", &facts),
        "region_id\tyear\tmeasure\tvalue\tS1:M1(D1)\n\
         11\t2015\tM1\t10\ta\n\
         11\t2015\tM1\t12\tb\n\
         12\t2015\tM1\t7\ta\n"
    );
}

#[test]
fn test_last_keeps_latest_time() {
    assert_eq!(
        render("data=S1:M1", &yearly()),
        "region_id,year,measure,value\n11,2016,M1,5\n12,2016,M1,6.5\n"
    );
    assert_eq!(
        render("data=S1:M1&time=all&sort=region", &yearly()),
        "region_id,year,measure,value\n11,2014,M1,4\n11,2016,M1,5\n12,2016,M1,6.5\n"
    );
}

#[test]
fn test_cubes_in_first_appearance_order() {
    let schema = schema();
    let query = CanonicalQuery::clean("data=S1:M1&time=all").unwrap();
    let table = LongTable::from_facts(&yearly(), &schema.get_filtered(&query.data), &query);
    assert_eq!(table.cubes, vec!["C1", "C2"]);
    assert_eq!(table.len(), 3);
}

#[test]
fn test_json_with_names() {
    let json = render("data=S1:M1&format=json&labels=name", &yearly());
    let parsed: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed["schema"],
        json!([
            {"name": "ID_Region", "type": "string"},
            {"name": "Region", "type": "string"},
            {"name": "Jahr", "type": "string"},
            {"name": "Merkmal", "type": "string"},
            {"name": "Wert", "type": "number"}
        ])
    );
    assert_eq!(
        parsed["data"][0],
        json!({"ID_Region": "11", "Region": "Berlin", "Jahr": "2016",
               "Merkmal": "Einwohner", "Wert": 5})
    );
    assert!(parsed["data"][0]["Wert"].is_i64());
    assert_eq!(parsed["data"][1]["Wert"], json!(6.5));
}

#[test]
fn test_json_rows_keep_column_order() {
    let json = render("data=S1:M1&format=json", &yearly());
    assert!(json.starts_with(r#"{"schema":[{"name":"region_id","type":"string"}"#));
    assert!(json.contains(r#"{"region_id":"11","year":"2016","measure":"M1","value":5}"#));
}

#[test]
fn test_region_layout_with_both_labels() {
    assert_eq!(
        render("data=S1:M1&layout=region&labels=both", &yearly()),
        "ID_Region,Region,Einwohner 2016 (S1:M1-year:2016)\n11,Berlin,5\n12,Brandenburg,6.5\n"
    );
}

#[test]
fn test_time_layout_ids() {
    assert_snapshot!(render("data=S1:M1&layout=time&time=all", &yearly()), @r"
    year,S1:M1-region_id:11,S1:M1-region_id:12
    2014,4,
    2016,5,6.5
    ");
}

#[test]
fn test_date_field() {
    let facts = facts(vec![
        json!({"region_id": "11", "date": "2016-12-31", "statistic": "S1", "M1": 1}),
    ]);
    assert_eq!(
        render("data=S1:M1&dformat=date&delimiter=;", &facts),
        "region_id;date;measure;value\n11;2016-12-31;M1;1\n"
    );
}

#[test]
fn test_render_all_formats_agree() {
    let schema = schema();
    let names = names();
    let query = CanonicalQuery::clean("data=S1:M1").unwrap();
    let view = schema.get_filtered(&query.data);
    let table = LongTable::from_facts(&yearly(), &view, &query);
    let formats = Tabulator::new(&view, &names, &query).render_all(&table).unwrap();
    assert_eq!(formats.csv.replace(',', "\t"), formats.tsv);
    assert!(formats.json.contains(r#""value":6.5"#));
}

#[test]
fn test_shared_measure_names_stay_distinct() {
    let schema = Schema::from_value(
        "Regionalstatistik",
        json!({
            "S1": {"name": "Bevölkerung", "measures": {"M1": {"name": "Einwohner"}}},
            "S2": {"name": "Zensus", "measures": {"M1": {"name": "Einwohner"}}}
        }),
    )
    .unwrap();
    let names = names();
    let facts = facts(vec![
        json!({"region_id": "11", "year": "2016", "statistic": "S1", "M1": 5}),
        json!({"region_id": "11", "year": "2016", "statistic": "S2", "M1": 7}),
    ]);
    let query =
        CanonicalQuery::clean("data=S1:M1&data=S2:M1&layout=region&labels=name&format=json")
            .unwrap();
    let view = schema.get_filtered(&query.data);
    let table = LongTable::from_facts(&facts, &view, &query);
    let json = Tabulator::new(&view, &names, &query).render(&table).unwrap();

    let parsed: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed["data"][0],
        json!({"ID_Region": "11", "Region": "Berlin",
               "Einwohner 2016 [S1]": 5, "Einwohner 2016 [S2]": 7})
    );
    assert_eq!(json.matches("\"Einwohner 2016 [S1]\"").count(), 2);
}
