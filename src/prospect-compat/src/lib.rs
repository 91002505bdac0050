// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

//! I/O adapters between external files and the transformation engine:
//! JSON process databases, JSON topology and loss tables, and CSV
//! scenario tables with year interpolation.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;

use serde::{Deserialize, Serialize};

use prospect_core::{Error, ErrorCode, ErrorKind, Ident, canonicalize};
use prospect_engine::json::JsonDatabase;
pub use prospect_engine::{self as engine, Result};
use prospect_engine::{Database, Location, LossFactors, LossTable, Topology};

pub mod config;

fn json_err(err: serde_json::Error) -> Error {
    Error::new(
        ErrorKind::Import,
        ErrorCode::JsonDeserialization,
        Some(err.to_string()),
    )
}

pub fn open_database(reader: &mut dyn BufRead) -> Result<Database> {
    JsonDatabase::from_reader(reader)?.into_database()
}

pub fn to_json(db: &Database) -> Result<String> {
    serde_json::to_string_pretty(&JsonDatabase::from(db)).map_err(json_err)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionDef {
    pub name: String,
    pub locations: Vec<String>,
}

/// One model's region table as it appears in the topology file.  Region
/// order is meaningful: it decides which region wins a contested
/// location and the order markets are built in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDef {
    pub model: String,
    pub regions: Vec<RegionDef>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub aggregates: Vec<RegionDef>,
}

fn region_pair(def: RegionDef) -> (Location, Vec<Location>) {
    (
        Location::new(&def.name),
        def.locations.iter().map(|l| Location::new(l)).collect(),
    )
}

pub fn open_topologies(reader: &mut dyn BufRead) -> Result<Vec<Topology>> {
    let parsed: Vec<TopologyDef> = serde_json::from_reader(reader).map_err(json_err)?;
    Ok(parsed
        .into_iter()
        .map(|def| Topology {
            model: canonicalize(&def.model),
            regions: def.regions.into_iter().map(region_pair).collect(),
            aggregates: def.aggregates.into_iter().map(region_pair).collect(),
        })
        .collect())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LossDef {
    pub location: String,
    #[serde(default)]
    pub transformation: f64,
    #[serde(default)]
    pub distribution: f64,
}

pub fn open_losses(reader: &mut dyn BufRead) -> Result<LossTable> {
    let parsed: Vec<LossDef> = serde_json::from_reader(reader).map_err(json_err)?;
    let mut table = LossTable::new();
    for def in parsed {
        if !def.transformation.is_finite()
            || !def.distribution.is_finite()
            || def.transformation < 0.0
            || def.distribution < 0.0
        {
            return Err(Error::new(
                ErrorKind::Import,
                ErrorCode::NegativeAmount,
                Some(format!("losses for {}", def.location)),
            ));
        }
        table.insert(
            Location::new(&def.location),
            LossFactors {
                transformation: def.transformation,
                distribution: def.distribution,
            },
        );
    }
    Ok(table)
}

/// One scenario's time series, keyed by region and variable.  IAM tables
/// are sampled every five or ten years; `value_at` fills the gaps by
/// linear interpolation and clamps outside the tabulated range.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScenarioTable {
    model: Ident,
    pathway: Ident,
    series: HashMap<Location, HashMap<Ident, BTreeMap<i32, f64>>>,
}

impl ScenarioTable {
    pub fn new(model: Ident, pathway: Ident) -> ScenarioTable {
        ScenarioTable {
            model,
            pathway,
            series: HashMap::new(),
        }
    }

    pub fn model(&self) -> &Ident {
        &self.model
    }

    pub fn pathway(&self) -> &Ident {
        &self.pathway
    }

    pub fn push(&mut self, region: Location, variable: Ident, year: i32, value: f64) {
        self.series
            .entry(region)
            .or_default()
            .entry(variable)
            .or_default()
            .insert(year, value);
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn value_at(&self, region: &Location, variable: &Ident, year: i32) -> Option<f64> {
        let series = self.series.get(region)?.get(variable)?;
        if let Some(&exact) = series.get(&year) {
            return Some(exact);
        }
        let before = series.range(..year).next_back();
        let after = series.range(year + 1..).next();
        match (before, after) {
            (Some((&y0, &v0)), Some((&y1, &v1))) => {
                let t = (year - y0) as f64 / (y1 - y0) as f64;
                Some(v0 + t * (v1 - v0))
            }
            (Some((_, &v)), None) | (None, Some((_, &v))) => Some(v),
            (None, None) => None,
        }
    }
}

#[cfg(feature = "file_io")]
#[derive(Debug, Deserialize)]
struct ScenarioRow {
    model: String,
    pathway: String,
    region: String,
    variable: String,
    year: i32,
    value: f64,
}

#[cfg(feature = "file_io")]
fn csv_err(line: usize, details: &str) -> Error {
    let details = if line == 0 {
        details.to_owned()
    } else {
        format!("line {}: {}", line, details)
    };
    Error::new(
        ErrorKind::Import,
        ErrorCode::CsvDeserialization,
        Some(details),
    )
}

/// Load one scenario's table.  Columns: model, pathway, region, variable,
/// unit, year, value; extra columns are ignored.  All rows must belong to
/// the same (model, pathway) pair.
#[cfg(feature = "file_io")]
pub fn load_scenario_csv(file_path: &str, delimiter: u8) -> Result<ScenarioTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(file_path)
        .map_err(|err| csv_err(0, &err.to_string()))?;

    let mut table: Option<ScenarioTable> = None;
    for (i, row) in rdr.deserialize::<ScenarioRow>().enumerate() {
        let line = i + 2; // 1-based, after the header
        let row = row.map_err(|err| csv_err(line, &err.to_string()))?;
        if !row.value.is_finite() {
            return Err(csv_err(line, &format!("non-finite value {}", row.value)));
        }

        let model = canonicalize(&row.model);
        let pathway = canonicalize(&row.pathway);
        let entry =
            table.get_or_insert_with(|| ScenarioTable::new(model.clone(), pathway.clone()));
        if entry.model != model || entry.pathway != pathway {
            return Err(csv_err(
                line,
                &format!(
                    "rows from more than one scenario: {} {} after {} {}",
                    model, pathway, entry.model, entry.pathway
                ),
            ));
        }
        entry.push(
            Location::new(&row.region),
            canonicalize(&row.variable),
            row.year,
            row.value,
        );
    }
    table.ok_or_else(|| csv_err(0, "no data rows"))
}
