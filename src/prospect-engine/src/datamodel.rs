// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::fmt;

use crate::common::{Error, ErrorCode, ErrorKind, Ident};

/// An opaque geography code: a country ("DE"), a sub-country grid area
/// ("US-WECC"), an aggregate trade bloc ("RER"), an IAM region code, or one
/// of the two pseudo-locations.  No hierarchy is encoded in the code itself;
/// that lives in the topology tables behind the Geography Index.
///
/// Unlike [`Ident`], location codes keep their case: "RoW" and "row" are
/// different strings in every interchange format we consume.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(String);

pub const GLOBAL: &str = "GLO";
pub const REST_OF_WORLD: &str = "RoW";

impl Location {
    pub fn new(code: &str) -> Location {
        Location(code.trim().to_owned())
    }

    pub fn global() -> Location {
        Location(GLOBAL.to_owned())
    }

    pub fn rest_of_world() -> Location {
        Location(REST_OF_WORLD.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL
    }

    pub fn is_rest_of_world(&self) -> bool {
        self.0 == REST_OF_WORLD
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Location {
    fn from(code: &str) -> Location {
        Location::new(code)
    }
}

/// What a location code denotes, resolved once against the topology when
/// the Geography Index is built.  Candidate resolution dispatches on this
/// tag instead of sniffing code shapes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LocationKind {
    /// A country or sub-country grid area; the finest granularity we track.
    Plain,
    /// A trade-bloc style aggregate ("RER") with a containment list in the
    /// topology.
    Aggregate,
    /// An IAM region code for the model under transformation.
    Region,
    Global,
    RestOfWorld,
}

/// Identity of a process: the triple that background databases key
/// technosphere links on.  Immutable for the lifetime of a process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessKey {
    pub name: Ident,
    pub product: Ident,
    pub location: Location,
}

impl ProcessKey {
    pub fn new(name: Ident, product: Ident, location: Location) -> ProcessKey {
        ProcessKey {
            name,
            product,
            location,
        }
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} | {} | {}", self.name, self.product, self.location)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowKind {
    /// Material or energy consumed by the process; amounts are non-negative.
    Input,
    /// The single reference output of the process.
    Output,
    /// Waste or credit flow; amounts are signed.
    Waste,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExchangeTarget {
    /// Technosphere edge to another process, linked by identity.
    Process(ProcessKey),
    /// Biosphere edge to an elementary flow.
    Substance { name: Ident, compartment: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Exchange {
    pub target: ExchangeTarget,
    pub kind: FlowKind,
    pub amount: f64,
    pub unit: String,
}

impl Exchange {
    pub fn is_technosphere(&self) -> bool {
        matches!(self.target, ExchangeTarget::Process(_))
    }

    pub fn is_biosphere(&self) -> bool {
        matches!(self.target, ExchangeTarget::Substance { .. })
    }

    pub fn technosphere_key(&self) -> Option<&ProcessKey> {
        match &self.target {
            ExchangeTarget::Process(key) => Some(key),
            ExchangeTarget::Substance { .. } => None,
        }
    }

    pub fn substance_name(&self) -> Option<&Ident> {
        match &self.target {
            ExchangeTarget::Substance { name, .. } => Some(name),
            ExchangeTarget::Process(_) => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ProcessClass {
    #[default]
    Ordinary,
    /// A supply-mix process: consumes producers of one product, emits that
    /// product.  Markets are the processes the relinker supersedes wholesale.
    Market,
    /// A pure energy-conversion process; efficiency scaling applies to all
    /// of its inputs uniformly, not just energy carriers.
    Conversion,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Process {
    pub key: ProcessKey,
    /// Unit of the reference product.
    pub unit: String,
    pub class: ProcessClass,
    /// Current known production volume, used as an allocation weight.
    /// Missing volumes are loaded as 0, which is legal.
    pub volume: f64,
    pub exchanges: Vec<Exchange>,
    pub documentation: String,
}

impl Process {
    pub fn new(key: ProcessKey, unit: &str) -> Process {
        Process {
            key,
            unit: unit.to_owned(),
            class: ProcessClass::default(),
            volume: 0.0,
            exchanges: Vec::new(),
            documentation: String::new(),
        }
    }

    /// The single technosphere output exchange.  Well-formed processes have
    /// exactly one; `check_integrity` reports the ones that don't.
    pub fn reference_output(&self) -> Option<&Exchange> {
        self.exchanges
            .iter()
            .find(|e| e.kind == FlowKind::Output && e.is_technosphere())
    }

    pub fn reference_amount(&self) -> f64 {
        self.reference_output().map(|e| e.amount).unwrap_or(0.0)
    }

    pub fn technosphere_inputs(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges
            .iter()
            .filter(|e| e.kind == FlowKind::Input && e.is_technosphere())
    }

    pub fn biosphere_outputs(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges
            .iter()
            .filter(|e| e.kind == FlowKind::Output && e.is_biosphere())
    }

    /// Per-process structural invariants from the data model: finite
    /// amounts everywhere, non-negative amounts on inputs, exactly one
    /// technosphere reference output with a positive amount targeting the
    /// process itself.  Waste flows are signed and skipped by the
    /// non-negativity check.
    pub fn check_integrity(&self) -> Vec<Error> {
        let mut errors = Vec::new();

        let mut reference_outputs = 0;
        for exchange in self.exchanges.iter() {
            if !exchange.amount.is_finite() {
                errors.push(Error::new(
                    ErrorKind::Database,
                    ErrorCode::NonFiniteAmount,
                    Some(format!("{}: {:?}", self.key, exchange.target)),
                ));
                continue;
            }
            match exchange.kind {
                FlowKind::Input => {
                    if exchange.amount < 0.0 {
                        errors.push(Error::new(
                            ErrorKind::Database,
                            ErrorCode::NegativeAmount,
                            Some(format!("{}: {:?}", self.key, exchange.target)),
                        ));
                    }
                }
                FlowKind::Output => {
                    if exchange.is_technosphere() {
                        reference_outputs += 1;
                        if exchange.amount <= 0.0 {
                            errors.push(Error::new(
                                ErrorKind::Database,
                                ErrorCode::NegativeAmount,
                                Some(format!("{}: reference output", self.key)),
                            ));
                        }
                        if exchange.technosphere_key() != Some(&self.key) {
                            errors.push(Error::new(
                                ErrorKind::Database,
                                ErrorCode::DanglingReference,
                                Some(format!(
                                    "{}: reference output targets a different process",
                                    self.key
                                )),
                            ));
                        }
                    }
                }
                FlowKind::Waste => {}
            }
        }

        if reference_outputs == 0 {
            errors.push(Error::new(
                ErrorKind::Database,
                ErrorCode::MissingReferenceOutput,
                Some(format!("{}", self.key)),
            ));
        } else if reference_outputs > 1 {
            errors.push(Error::new(
                ErrorKind::Database,
                ErrorCode::DuplicateReferenceOutput,
                Some(format!("{}", self.key)),
            ));
        }

        errors
    }
}

/// One (model, pathway, year) coordinate in scenario space.  A single run
/// produces one transformed database copy per point.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScenarioPoint {
    pub model: Ident,
    pub pathway: Ident,
    pub year: i32,
}

impl fmt::Display for ScenarioPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.model, self.pathway, self.year)
    }
}

/// One allocated supplier of a market: the process and its normalized share.
/// Shares across a market's non-loss suppliers sum to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct SupplyShare {
    pub key: ProcessKey,
    pub share: f64,
}

/// A technology the scenario mapping layer has already bound to a concrete
/// process identity (name + reference product) in the background database.
#[derive(Clone, Debug, PartialEq)]
pub struct Technology {
    pub id: Ident,
    pub process_name: Ident,
    pub product: Ident,
    /// Minimum fuel input per unit of reference output (MJ), overriding the
    /// built-in floor table for processes matched through this technology.
    pub floor: Option<f64>,
    /// True when the scenario provides an efficiency ratio for this
    /// technology; the scaler only runs for these.
    pub has_efficiency: bool,
}

/// Plan for the markets of a single product, one per target region and
/// scenario point.  `tiers` chains further markets on top of the mix
/// (e.g. a voltage hierarchy), each with its own additive loss.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketPlan {
    pub name: Ident,
    pub product: Ident,
    pub unit: String,
    /// Technology ids mixed by this market; their scenario shares define
    /// the composition.
    pub technologies: Vec<Ident>,
    /// Forward window in years for a period-weighted market; 0 builds the
    /// market from the scenario year alone.
    pub window: u32,
    pub tiers: Vec<TierPlan>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TierPlan {
    pub name: Ident,
    pub product: Ident,
    pub unit: String,
    /// Fraction of the region's distribution loss attributed to this tier.
    pub loss_fraction: f64,
}

/// The full set of transformations requested of the engine, produced by the
/// (external) configuration layer after validation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformPlan {
    pub technologies: Vec<Technology>,
    pub markets: Vec<MarketPlan>,
}

impl TransformPlan {
    pub fn technology(&self, id: &Ident) -> Option<&Technology> {
        self.technologies.iter().find(|t| &t.id == id)
    }
}

/// Scenario values for one point, already resolved by the mapping layer to
/// (technology, region, year) coordinates.  Shares weight market
/// compositions; efficiencies are new/old ratios relative to
/// `reference_year`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioInput {
    pub point: ScenarioPoint,
    pub reference_year: i32,
    shares: BTreeMap<(Ident, Location, i32), f64>,
    efficiencies: BTreeMap<(Ident, Location, i32), f64>,
}

impl ScenarioInput {
    pub fn new(point: ScenarioPoint, reference_year: i32) -> ScenarioInput {
        ScenarioInput {
            point,
            reference_year,
            shares: BTreeMap::new(),
            efficiencies: BTreeMap::new(),
        }
    }

    pub fn set_share(&mut self, tech: Ident, region: Location, year: i32, value: f64) {
        self.shares.insert((tech, region, year), value);
    }

    pub fn set_efficiency(&mut self, tech: Ident, region: Location, year: i32, value: f64) {
        self.efficiencies.insert((tech, region, year), value);
    }

    pub fn share(&self, tech: &Ident, region: &Location, year: i32) -> Option<f64> {
        self.shares
            .get(&(tech.clone(), region.clone(), year))
            .copied()
    }

    pub fn efficiency(&self, tech: &Ident, region: &Location, year: i32) -> Option<f64> {
        self.efficiencies
            .get(&(tech.clone(), region.clone(), year))
            .copied()
    }
}

/// Per-location line loss fractions, volume-weighted over a region by the
/// market builder.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LossFactors {
    pub transformation: f64,
    pub distribution: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LossTable {
    factors: BTreeMap<Location, LossFactors>,
}

impl LossTable {
    pub fn new() -> LossTable {
        Default::default()
    }

    pub fn insert(&mut self, location: Location, factors: LossFactors) {
        self.factors.insert(location, factors);
    }

    pub fn get(&self, location: &Location) -> Option<LossFactors> {
        self.factors.get(location).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}
