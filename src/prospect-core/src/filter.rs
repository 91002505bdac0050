// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use regex::Regex;

use crate::common::{Error, ErrorCode, ErrorKind, Result, canonicalize};

/// Free-text predicate over process names and reference products, used by
/// the relinker to scope which consumers an exchange rewrite applies to.
///
/// `Contains` matches on canonicalized text, so `FilterSpec::contains("Coal")`
/// matches "electricity production, hard coal".  `Pattern` applies a regex to
/// the raw string for callers that need more than substring matching.
#[derive(Clone, Debug, Default)]
pub enum FilterSpec {
    #[default]
    Any,
    Contains(String),
    Pattern(Regex),
    AnyOf(Vec<FilterSpec>),
}

impl FilterSpec {
    pub fn contains(needle: &str) -> FilterSpec {
        FilterSpec::Contains(canonicalize(needle).into_string())
    }

    pub fn pattern(re: &str) -> Result<FilterSpec> {
        let re = Regex::new(re).map_err(|err| {
            Error::new(
                ErrorKind::Validation,
                ErrorCode::BadFilter,
                Some(err.to_string()),
            )
        })?;
        Ok(FilterSpec::Pattern(re))
    }

    pub fn matches(&self, raw: &str) -> bool {
        match self {
            FilterSpec::Any => true,
            FilterSpec::Contains(needle) => {
                canonicalize(raw).as_str().contains(needle.as_str())
            }
            FilterSpec::Pattern(re) => re.is_match(raw),
            FilterSpec::AnyOf(specs) => specs.iter().any(|spec| spec.matches(raw)),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, FilterSpec::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_case_insensitive() {
        let f = FilterSpec::contains("Hard Coal");
        assert!(f.matches("electricity production, hard coal"));
        assert!(f.matches("Electricity Production, Hard  Coal"));
        assert!(!f.matches("electricity production, lignite"));
    }

    #[test]
    fn pattern_matches_raw_text() {
        let f = FilterSpec::pattern("^market for electricity").unwrap();
        assert!(f.matches("market for electricity, high voltage"));
        assert!(!f.matches("electricity production, hard coal"));

        assert!(FilterSpec::pattern("(unclosed").is_err());
    }

    #[test]
    fn any_of_is_a_union() {
        let f = FilterSpec::AnyOf(vec![
            FilterSpec::contains("coal"),
            FilterSpec::contains("lignite"),
        ]);
        assert!(f.matches("electricity production, lignite"));
        assert!(f.matches("electricity production, hard coal"));
        assert!(!f.matches("electricity production, wind"));
        assert!(FilterSpec::Any.matches("anything at all"));
    }
}
