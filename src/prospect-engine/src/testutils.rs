// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::datamodel::{
    Exchange, ExchangeTarget, FlowKind, Location, Process, ProcessClass, ProcessKey, ScenarioPoint,
};
use crate::geography::Topology;
use prospect_core::canonicalize;

#[cfg(test)]
pub(crate) fn key(name: &str, product: &str, location: &str) -> ProcessKey {
    ProcessKey::new(
        canonicalize(name),
        canonicalize(product),
        Location::new(location),
    )
}

#[cfg(test)]
pub(crate) fn x_ref(key: &ProcessKey, amount: f64, unit: &str) -> Exchange {
    Exchange {
        target: ExchangeTarget::Process(key.clone()),
        kind: FlowKind::Output,
        amount,
        unit: unit.to_owned(),
    }
}

#[cfg(test)]
pub(crate) fn x_input(
    name: &str,
    product: &str,
    location: &str,
    amount: f64,
    unit: &str,
) -> Exchange {
    Exchange {
        target: ExchangeTarget::Process(key(name, product, location)),
        kind: FlowKind::Input,
        amount,
        unit: unit.to_owned(),
    }
}

#[cfg(test)]
pub(crate) fn x_emission(name: &str, amount: f64) -> Exchange {
    Exchange {
        target: ExchangeTarget::Substance {
            name: canonicalize(name),
            compartment: "air".to_owned(),
        },
        kind: FlowKind::Output,
        amount,
        unit: "kilogram".to_owned(),
    }
}

/// A well-formed ordinary process: one unit of reference output, the given
/// production volume, no other exchanges.
#[cfg(test)]
pub(crate) fn producer(
    name: &str,
    product: &str,
    location: &str,
    unit: &str,
    volume: f64,
) -> Process {
    let key = key(name, product, location);
    let mut p = Process::new(key.clone(), unit);
    p.volume = volume;
    p.exchanges.push(x_ref(&key, 1.0, unit));
    p
}

#[cfg(test)]
pub(crate) fn market(name: &str, product: &str, location: &str, unit: &str) -> Process {
    let mut p = producer(name, product, location, unit, 0.0);
    p.class = ProcessClass::Market;
    p
}

#[cfg(test)]
pub(crate) fn point(model: &str, pathway: &str, year: i32) -> ScenarioPoint {
    ScenarioPoint {
        model: canonicalize(model),
        pathway: canonicalize(pathway),
        year,
    }
}

/// A two-region toy topology in the shape of the REMIND tables: EUR over
/// three member countries, CAZ over three, plus the RER aggregate.
#[cfg(test)]
pub(crate) fn x_topology(model: &str) -> Topology {
    fn locs(codes: &[&str]) -> Vec<Location> {
        codes.iter().map(|c| Location::new(c)).collect()
    }
    Topology {
        model: canonicalize(model),
        regions: vec![
            (Location::new("EUR"), locs(&["DE", "FR", "PL"])),
            (Location::new("CAZ"), locs(&["AU", "CA", "NZ"])),
        ],
        aggregates: vec![(Location::new("RER"), locs(&["DE", "FR", "PL", "ES", "IT"]))],
    }
}
