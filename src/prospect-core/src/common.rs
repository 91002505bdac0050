// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::borrow::Borrow;
use std::fmt;
use std::{error, result};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// A canonicalized identifier: trimmed, lowercased, with internal runs of
/// whitespace collapsed to single spaces.
///
/// Process names, reference products, substance names and technology ids
/// are all `Ident`s.  Location codes are not: case is significant there
/// ("DE" and "RoW" stay as written) and they get their own newtype in the
/// engine datamodel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wraps a string that is already in canonical form.  Used by loaders
    /// that canonicalized on the way in; everything else goes through
    /// [`canonicalize`].
    pub fn from_canonical_unchecked(name: String) -> Ident {
        Ident(name)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for Ident {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Ident {
        canonicalize(name)
    }
}

pub fn canonicalize(name: &str) -> Ident {
    let name = name.trim();
    let name = WHITESPACE.replace_all(name, " ");
    Ident(name.to_lowercase())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    DoesNotExist,
    JsonDeserialization,
    CsvDeserialization,
    MissingField,
    BadFlowKind,
    BadProcessClass,
    BadFilter,
    DuplicateProcess,
    MissingReferenceOutput,
    DuplicateReferenceOutput,
    NonFiniteAmount,
    NegativeAmount,
    NegativeShare,
    EmptyCandidateSet,
    UnknownLocation,
    UnknownRegion,
    OverlappingRegions,
    NoLossData,
    BadScalingFactor,
    ClampedScalingFactor,
    MissingHeatingValue,
    ZeroFuelInput,
    DanglingReference,
    UnknownTechnology,
    EmptyMarketComposition,
    DuplicateTechnology,
    DuplicateMarket,
    MissingScenarioValue,
    BadUnit,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            JsonDeserialization => "json_deserialization",
            CsvDeserialization => "csv_deserialization",
            MissingField => "missing_field",
            BadFlowKind => "bad_flow_kind",
            BadProcessClass => "bad_process_class",
            BadFilter => "bad_filter",
            DuplicateProcess => "duplicate_process",
            MissingReferenceOutput => "missing_reference_output",
            DuplicateReferenceOutput => "duplicate_reference_output",
            NonFiniteAmount => "non_finite_amount",
            NegativeAmount => "negative_amount",
            NegativeShare => "negative_share",
            EmptyCandidateSet => "empty_candidate_set",
            UnknownLocation => "unknown_location",
            UnknownRegion => "unknown_region",
            OverlappingRegions => "overlapping_regions",
            NoLossData => "no_loss_data",
            BadScalingFactor => "bad_scaling_factor",
            ClampedScalingFactor => "clamped_scaling_factor",
            MissingHeatingValue => "missing_heating_value",
            ZeroFuelInput => "zero_fuel_input",
            DanglingReference => "dangling_reference",
            UnknownTechnology => "unknown_technology",
            EmptyMarketComposition => "empty_market_composition",
            DuplicateTechnology => "duplicate_technology",
            DuplicateMarket => "duplicate_market",
            MissingScenarioValue => "missing_scenario_value",
            BadUnit => "bad_unit",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Import,
    Database,
    Transform,
    Validation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl From<Box<dyn error::Error>> for Error {
    fn from(err: Box<dyn error::Error>) -> Self {
        Error {
            kind: ErrorKind::Transform,
            code: ErrorCode::Generic,
            details: Some(err.to_string()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Import => "ImportError",
            ErrorKind::Database => "DatabaseError",
            ErrorKind::Transform => "TransformError",
            ErrorKind::Validation => "ValidationError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[test]
fn test_canonicalize() {
    assert_eq!("hard coal", canonicalize("Hard Coal").as_str());
    assert_eq!("hard coal", canonicalize("  hard\tcoal ").as_str());
    assert_eq!(
        "electricity, high voltage",
        canonicalize("Electricity,  High\nVoltage").as_str()
    );
    assert_eq!("", canonicalize("   ").as_str());
}

#[test]
fn test_ident_borrow() {
    use std::collections::HashMap;

    let mut m: HashMap<Ident, i32> = HashMap::new();
    m.insert(canonicalize("Natural Gas"), 1);
    assert_eq!(Some(&1), m.get("natural gas"));
    assert_eq!(None, m.get("Natural Gas"));
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Transform,
        ErrorCode::EmptyCandidateSet,
        Some("electricity, coal @ CAZ".to_owned()),
    );
    assert_eq!(
        "TransformError{empty_candidate_set: electricity, coal @ CAZ}",
        format!("{err}")
    );

    let err = Error::new(ErrorKind::Database, ErrorCode::NonFiniteAmount, None);
    assert_eq!("DatabaseError{non_finite_amount}", format!("{err}"));
}
