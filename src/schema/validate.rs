//! Validation of a canonical query against the schema and name-list.

use super::{NameList, Schema};
use crate::error::ValidationError;
use crate::query::{CanonicalQuery, LevelSelector, RegionSelector};

impl Schema {
    /// Check a query against the full (unfiltered) hierarchy.
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// 1. every statistic/measure/dimension/value in the data selection exists
    /// 2. requested region levels are available for every selected measure
    /// 3. `parent`, when set, is a known region
    /// 4. every explicitly requested region is known
    pub fn validate(&self, query: &CanonicalQuery, names: &NameList) -> Result<(), ValidationError> {
        self.validate_selection(query)?;
        self.validate_levels(query)?;

        if let Some(parent) = &query.parent {
            if !names.contains(parent) {
                return Err(ValidationError::UnknownParent(parent.clone()));
            }
        }

        if let RegionSelector::Ids(ids) = &query.region {
            if let Some(unknown) = ids.iter().find(|id| !names.contains(id)) {
                return Err(ValidationError::UnknownRegion(unknown.clone()));
            }
        }

        Ok(())
    }

    fn validate_selection(&self, query: &CanonicalQuery) -> Result<(), ValidationError> {
        for (skey, measures) in query.data.statistics() {
            let statistic = self
                .statistic(skey)
                .ok_or_else(|| ValidationError::UnknownStatistic(skey.to_string()))?;

            for (mkey, dimensions) in measures {
                let measure =
                    statistic
                        .measure(mkey)
                        .ok_or_else(|| ValidationError::UnknownMeasure {
                            statistic: skey.to_string(),
                            measure: mkey.clone(),
                        })?;

                for (dkey, values) in dimensions {
                    let dimension =
                        measure
                            .dimension(dkey)
                            .ok_or_else(|| ValidationError::UnknownDimension {
                                measure: mkey.clone(),
                                dimension: dkey.clone(),
                            })?;

                    if let Some(value) = values.iter().find(|v| !dimension.contains(v)) {
                        return Err(ValidationError::UnknownValue {
                            dimension: dkey.clone(),
                            value: value.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_levels(&self, query: &CanonicalQuery) -> Result<(), ValidationError> {
        let LevelSelector::Levels(levels) = &query.level else {
            return Ok(());
        };

        for (skey, measures) in query.data.statistics() {
            for mkey in measures.keys() {
                let Some(measure) = self.measure(skey, mkey) else {
                    continue;
                };
                if let Some(level) = levels.iter().find(|l| !measure.allows_level(**l)) {
                    return Err(ValidationError::LevelNotAvailable {
                        measure: mkey.clone(),
                        level: *level,
                    });
                }
            }
        }
        Ok(())
    }
}
