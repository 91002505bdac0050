// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! JSON interchange for process databases.
//!
//! The wire format keeps flat, string-tagged records so exports from the
//! usual inventory tooling load without a schema dance; the typed
//! datamodel lives in [`crate::datamodel`].  Loading validates every
//! record and rejects malformed ones with an error naming the record,
//! rather than failing somewhere deep inside a transformation.
//!
//! # Example
//! ```no_run
//! use prospect_engine::json;
//!
//! let json_str = r#"{"processes": []}"#;
//! let db: json::JsonDatabase = serde_json::from_str(json_str)?;
//! let database = db.into_database()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorCode, ErrorKind, Result, canonicalize};
use crate::database::Database;
use crate::datamodel::{
    Exchange, ExchangeTarget, FlowKind, Location, Process, ProcessClass, ProcessKey,
};

// Helper functions for serde skip_serializing_if

fn is_zero_f64(val: &f64) -> bool {
    *val == 0.0
}

fn is_empty_string(val: &str) -> bool {
    val.is_empty()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonDatabase {
    pub processes: Vec<JsonProcess>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonProcess {
    pub name: String,
    pub product: String,
    pub location: String,
    pub unit: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub class: String,
    #[serde(skip_serializing_if = "is_zero_f64", default)]
    pub volume: f64,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub documentation: String,
    pub exchanges: Vec<JsonExchange>,
}

/// One flow record.  Technosphere edges carry `name`/`product`/`location`
/// of the target process; biosphere edges carry `substance` and
/// `compartment`.  Exactly one of the two shapes must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonExchange {
    pub flow: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub substance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub compartment: Option<String>,
}

fn import_err(code: ErrorCode, details: String) -> Error {
    Error::new(ErrorKind::Import, code, Some(details))
}

fn parse_flow(flow: &str, at: &str) -> Result<FlowKind> {
    match flow {
        "input" => Ok(FlowKind::Input),
        "output" => Ok(FlowKind::Output),
        "waste" => Ok(FlowKind::Waste),
        _ => Err(import_err(
            ErrorCode::BadFlowKind,
            format!("{}: {:?}", at, flow),
        )),
    }
}

fn parse_class(class: &str, at: &str) -> Result<ProcessClass> {
    match class {
        "" | "ordinary" => Ok(ProcessClass::Ordinary),
        "market" => Ok(ProcessClass::Market),
        "conversion" => Ok(ProcessClass::Conversion),
        _ => Err(import_err(
            ErrorCode::BadProcessClass,
            format!("{}: {:?}", at, class),
        )),
    }
}

impl JsonExchange {
    fn into_exchange(self, at: &str) -> Result<Exchange> {
        let kind = parse_flow(&self.flow, at)?;
        if !self.amount.is_finite() {
            return Err(import_err(
                ErrorCode::NonFiniteAmount,
                format!("{}: {}", at, self.amount),
            ));
        }

        let target = match (&self.substance, &self.name) {
            (Some(substance), None) => {
                if substance.trim().is_empty() {
                    return Err(import_err(
                        ErrorCode::MissingField,
                        format!("{}: substance", at),
                    ));
                }
                ExchangeTarget::Substance {
                    name: canonicalize(substance),
                    compartment: self.compartment.clone().unwrap_or_default(),
                }
            }
            (None, Some(name)) => {
                let product = self.product.as_deref().ok_or_else(|| {
                    import_err(ErrorCode::MissingField, format!("{}: product", at))
                })?;
                let location = self.location.as_deref().ok_or_else(|| {
                    import_err(ErrorCode::MissingField, format!("{}: location", at))
                })?;
                if name.trim().is_empty() || product.trim().is_empty() {
                    return Err(import_err(
                        ErrorCode::MissingField,
                        format!("{}: name/product", at),
                    ));
                }
                ExchangeTarget::Process(ProcessKey::new(
                    canonicalize(name),
                    canonicalize(product),
                    Location::new(location),
                ))
            }
            _ => {
                return Err(import_err(
                    ErrorCode::MissingField,
                    format!("{}: exactly one of name or substance", at),
                ));
            }
        };

        Ok(Exchange {
            target,
            kind,
            amount: self.amount,
            unit: self.unit,
        })
    }
}

impl JsonProcess {
    pub fn into_process(self, index: usize) -> Result<Process> {
        let at = format!("process {}", index);
        if self.name.trim().is_empty()
            || self.product.trim().is_empty()
            || self.location.trim().is_empty()
        {
            return Err(import_err(
                ErrorCode::MissingField,
                format!("{}: name/product/location", at),
            ));
        }
        if self.unit.trim().is_empty() {
            return Err(import_err(ErrorCode::MissingField, format!("{}: unit", at)));
        }

        let key = ProcessKey::new(
            canonicalize(&self.name),
            canonicalize(&self.product),
            Location::new(&self.location),
        );
        let mut process = Process::new(key, &self.unit);
        process.class = parse_class(&self.class, &at)?;
        process.volume = self.volume;
        process.documentation = self.documentation;
        process.exchanges = self
            .exchanges
            .into_iter()
            .enumerate()
            .map(|(i, e)| e.into_exchange(&format!("{} exchange {}", at, i)))
            .collect::<Result<Vec<Exchange>>>()?;
        Ok(process)
    }
}

impl JsonDatabase {
    pub fn into_database(self) -> Result<Database> {
        let processes = self
            .processes
            .into_iter()
            .enumerate()
            .map(|(i, p)| p.into_process(i))
            .collect::<Result<Vec<Process>>>()?;
        Database::new(processes)
    }

    /// Parse a database from a reader
    pub fn from_reader(reader: impl std::io::Read) -> Result<JsonDatabase> {
        serde_json::from_reader(reader)
            .map_err(|err| import_err(ErrorCode::JsonDeserialization, err.to_string()))
    }
}

impl std::str::FromStr for JsonDatabase {
    type Err = Error;

    fn from_str(s: &str) -> Result<JsonDatabase> {
        serde_json::from_str(s)
            .map_err(|err| import_err(ErrorCode::JsonDeserialization, err.to_string()))
    }
}

impl From<&Exchange> for JsonExchange {
    fn from(exchange: &Exchange) -> Self {
        let flow = match exchange.kind {
            FlowKind::Input => "input",
            FlowKind::Output => "output",
            FlowKind::Waste => "waste",
        }
        .to_owned();
        match &exchange.target {
            ExchangeTarget::Process(key) => JsonExchange {
                flow,
                amount: exchange.amount,
                unit: exchange.unit.clone(),
                name: Some(key.name.as_str().to_owned()),
                product: Some(key.product.as_str().to_owned()),
                location: Some(key.location.as_str().to_owned()),
                ..Default::default()
            },
            ExchangeTarget::Substance { name, compartment } => JsonExchange {
                flow,
                amount: exchange.amount,
                unit: exchange.unit.clone(),
                substance: Some(name.as_str().to_owned()),
                compartment: Some(compartment.clone()),
                ..Default::default()
            },
        }
    }
}

impl From<&Process> for JsonProcess {
    fn from(process: &Process) -> Self {
        let class = match process.class {
            ProcessClass::Ordinary => "",
            ProcessClass::Market => "market",
            ProcessClass::Conversion => "conversion",
        }
        .to_owned();
        JsonProcess {
            name: process.key.name.as_str().to_owned(),
            product: process.key.product.as_str().to_owned(),
            location: process.key.location.as_str().to_owned(),
            unit: process.unit.clone(),
            class,
            volume: process.volume,
            documentation: process.documentation.clone(),
            exchanges: process.exchanges.iter().map(JsonExchange::from).collect(),
        }
    }
}

impl From<&Database> for JsonDatabase {
    fn from(db: &Database) -> Self {
        JsonDatabase {
            processes: db.processes().map(JsonProcess::from).collect(),
        }
    }
}
