//! Declarations of the accepted query arguments and their cleaning rules.

use once_cell::sync::Lazy;
use regex::Regex;

use super::data::split_entries;
use super::urlquery::RawQuery;
use crate::error::ValidationError;

/// How a single raw value is split into list items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    /// Commas are rejected.
    Single,
    /// Every comma separates items.
    Comma,
    /// Commas separate items only outside parentheses.
    Nested,
}

/// One declared query argument.
#[derive(Debug)]
pub struct Argument {
    pub name: &'static str,
    /// Literal that, when given as the first value, means "use the default".
    pub default: Option<&'static str>,
    pub choices: &'static [&'static str],
    pub patterns: Vec<Regex>,
    pub list: ListStyle,
    /// Whether the key may appear more than once in the query string.
    pub repeat: bool,
}

impl Argument {
    fn new(name: &'static str, default: Option<&'static str>) -> Self {
        Self {
            name,
            default,
            choices: &[],
            patterns: Vec::new(),
            list: ListStyle::Single,
            repeat: false,
        }
    }

    fn choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }

    fn patterns(mut self, patterns: &[&str]) -> Self {
        self.patterns = patterns
            .iter()
            .map(|p| Regex::new(p).expect("argument pattern is valid"))
            .collect();
        self
    }

    fn list(mut self, list: ListStyle) -> Self {
        self.list = list;
        self
    }

    fn repeatable(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Clean this argument's raw values.
    ///
    /// Returns `None` when the default applies (argument absent, or its first
    /// value is the default literal), otherwise every list item in order.
    pub fn clean(&self, raw: &RawQuery) -> Result<Option<Vec<String>>, ValidationError> {
        let Some(values) = raw.get(self.name) else {
            return Ok(None);
        };
        if !self.repeat && values.len() > 1 {
            return Err(ValidationError::Repeated(self.name.to_string()));
        }
        if self.default.is_some() && values.first().map(String::as_str) == self.default {
            return Ok(None);
        }

        let mut cleaned = Vec::new();
        for value in values {
            let items = match self.list {
                ListStyle::Single if value.contains(',') => {
                    return Err(ValidationError::NotAList(self.name.to_string()));
                }
                ListStyle::Single => vec![value.as_str()],
                ListStyle::Comma => value.split(',').collect(),
                ListStyle::Nested => split_entries(value),
            };
            for item in items {
                self.check(item)?;
                cleaned.push(item.to_string());
            }
        }
        Ok(Some(cleaned))
    }

    fn check(&self, value: &str) -> Result<(), ValidationError> {
        if self.choices.is_empty() && self.patterns.is_empty() {
            return Ok(());
        }
        if self.choices.contains(&value) || self.patterns.iter().any(|p| p.is_match(value)) {
            return Ok(());
        }
        Err(ValidationError::InvalidValue {
            param: self.name.to_string(),
            value: value.to_string(),
        })
    }
}

/// All accepted arguments, in canonical order.
pub static ARGUMENTS: Lazy<Vec<Argument>> = Lazy::new(|| {
    vec![
        Argument::new("region", Some("all"))
            .choices(&["DG"])
            .patterns(&[r"^\d+$"])
            .list(ListStyle::Comma),
        Argument::new("level", Some("1"))
            .choices(&["0", "1", "2", "3", "4", "all"])
            .list(ListStyle::Comma),
        Argument::new("parent", None).patterns(&[r"^\d+$"]),
        Argument::new("time", Some("last"))
            .choices(&["all", "last"])
            .patterns(&[r"^\d{4}$", r"^\d{4}:\d{4}$", r"^:\d{4}$", r"^\d{4}:$"]),
        Argument::new("dformat", Some("year")).choices(&["year", "date"]),
        Argument::new("labels", Some("id")).choices(&["id", "name", "both"]),
        Argument::new("layout", Some("long")).choices(&["long", "region", "time"]),
        Argument::new("format", Some("csv")).choices(&["csv", "tsv", "json"]),
        Argument::new("delimiter", Some(",")).choices(&[",", ";"]),
        Argument::new("sort", Some("time")).choices(&["time", "region", "value", "measure"]),
        Argument::new("data", None)
            .list(ListStyle::Nested)
            .repeatable(),
    ]
});

/// Look up a declared argument by name.
pub fn argument(name: &str) -> Option<&'static Argument> {
    ARGUMENTS.iter().find(|a| a.name == name)
}

/// Reject any key that is not a declared argument.
pub fn check_known(raw: &RawQuery) -> Result<(), ValidationError> {
    let unknown: Vec<String> = raw
        .keys()
        .filter(|k| argument(k).is_none())
        .cloned()
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::UnknownParameters(unknown))
    }
}
