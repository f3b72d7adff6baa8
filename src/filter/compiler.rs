//! Canonical query → fact store filter.
//!
//! The compiled filter selects a closed world: a fact passes only if it
//! matches every meta clause and exactly one of the selected
//! statistic/measure/dimension cells.
//!
//! ```text
//! bool.must
//!  ├── region / region_level / time / parent / statistic   (meta clauses)
//!  └── bool.should                                          (one per statistic)
//!       └── bool.must
//!            ├── term statistic = S
//!            └── bool.should                                (one per measure)
//!                 └── bool { must: [exists M, dimension clauses...],
//!                            must_not: [other dimensions, value complements...] }
//! ```
//!
//! Dimension paths are namespaced under their measure: `path.{M}.{D}` for
//! existence, `path.{M}.{D}.keyword` for value equality.

use serde_json::{json, Value};

use super::{BoolFilter, Filter};
use crate::query::{
    CanonicalQuery, DimensionSelection, LevelSelector, MeasureSelection, RegionSelector,
    TimeSelector,
};
use crate::schema::Schema;

/// Compiles one canonical query against the full schema.
pub struct FilterCompiler<'a> {
    schema: &'a Schema,
    query: &'a CanonicalQuery,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(schema: &'a Schema, query: &'a CanonicalQuery) -> Self {
        Self { schema, query }
    }

    /// The complete filter expression.
    pub fn compile(&self) -> Filter {
        let mut must = self.meta_clauses();
        let statistics = self
            .query
            .data
            .statistics()
            .map(|(key, measures)| self.statistic_clause(key, measures))
            .collect();
        must.push(Filter::should(statistics));
        Filter::must(must)
    }

    /// The search request body sent to the fact store.
    pub fn body(&self) -> Value {
        json!({
            "query": {
                "constant_score": {
                    "filter": self.compile().to_json()
                }
            }
        })
    }

    // =========================================================================
    // Meta clauses
    // =========================================================================

    fn meta_clauses(&self) -> Vec<Filter> {
        [
            self.region(),
            self.statistics(),
            self.time(),
            self.region_level(),
            self.parent(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn region(&self) -> Option<Filter> {
        match &self.query.region {
            RegionSelector::All => None,
            RegionSelector::Ids(ids) => Some(Filter::term_or_terms(
                "region_id",
                ids.iter().cloned().collect(),
            )),
        }
    }

    /// Levels only narrow an unrestricted region selection.
    fn region_level(&self) -> Option<Filter> {
        match (&self.query.region, &self.query.level) {
            (RegionSelector::All, LevelSelector::Levels(levels)) => Some(Filter::term_or_terms(
                "region_level",
                levels.iter().map(u8::to_string).collect(),
            )),
            _ => None,
        }
    }

    fn statistics(&self) -> Option<Filter> {
        let keys: Vec<String> = self.query.data.statistic_keys().map(str::to_string).collect();
        if keys.is_empty() {
            None
        } else {
            Some(Filter::term_or_terms("statistic", keys))
        }
    }

    /// Time clauses always target `year`; `last` is resolved after retrieval.
    fn time(&self) -> Option<Filter> {
        match self.query.time {
            TimeSelector::All | TimeSelector::Last => None,
            TimeSelector::Year(year) => Some(Filter::term("year", year.to_string())),
            TimeSelector::Range { start, end } => Some(Filter::range(
                "year",
                start.map(i64::from),
                end.map(i64::from),
            )),
        }
    }

    fn parent(&self) -> Option<Filter> {
        self.query
            .parent
            .as_ref()
            .map(|parent| Filter::prefix("region_id", parent.as_str()))
    }

    // =========================================================================
    // Data selection
    // =========================================================================

    fn statistic_clause(&self, statistic: &str, measures: &MeasureSelection) -> Filter {
        let measures = measures
            .iter()
            .map(|(measure, dimensions)| self.measure_clause(statistic, measure, dimensions))
            .collect();
        Filter::must(vec![
            Filter::term("statistic", statistic),
            Filter::should(measures),
        ])
    }

    /// One exact cell of a measure.
    ///
    /// Every schema dimension of the measure that was not selected must be
    /// absent, and a dimension restricted to some values must not carry any
    /// of its other values.
    fn measure_clause(&self, statistic: &str, measure: &str, selected: &DimensionSelection) -> Filter {
        let schema_measure = self.schema.measure(statistic, measure);
        let mut clause = BoolFilter {
            must: vec![Filter::exists(measure)],
            ..Default::default()
        };

        for (dimension, values) in selected {
            if values.is_empty() {
                clause.must.push(Filter::exists(dimension_path(measure, dimension)));
            } else {
                clause.must.push(Filter::term_or_terms(
                    keyword_path(measure, dimension),
                    values.iter().cloned().collect(),
                ));
                let complement: Vec<String> = schema_measure
                    .and_then(|m| m.dimension(dimension))
                    .map(|d| {
                        d.values()
                            .filter(|v| !values.contains(&v.key))
                            .map(|v| v.key.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                if !complement.is_empty() {
                    clause.must_not.push(Filter::Terms {
                        field: keyword_path(measure, dimension),
                        values: complement,
                    });
                }
            }
        }

        if let Some(schema_measure) = schema_measure {
            for dimension in schema_measure.dimension_keys() {
                if !selected.contains_key(dimension) {
                    clause
                        .must_not
                        .push(Filter::exists(dimension_path(measure, dimension)));
                }
            }
        }

        Filter::Bool(clause)
    }
}

fn dimension_path(measure: &str, dimension: &str) -> String {
    format!("path.{}.{}", measure, dimension)
}

fn keyword_path(measure: &str, dimension: &str) -> String {
    format!("path.{}.{}.keyword", measure, dimension)
}
