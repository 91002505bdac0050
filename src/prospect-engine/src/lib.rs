// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod common;

pub mod allocation;
pub mod database;
pub mod datamodel;
pub mod geography;
pub mod json;
pub mod market;
pub mod relink;
pub mod resolver;
pub mod scaling;
pub mod transform;
pub mod volumes;

#[cfg(test)]
mod testutils;
#[cfg(test)]
mod transform_proptest;

pub use self::common::{Error, ErrorCode, ErrorKind, FilterSpec, Ident, Result, canonicalize};
pub use self::database::{Database, IntegrityReport};
pub use self::datamodel::{
    Exchange, ExchangeTarget, FlowKind, Location, LossFactors, LossTable, MarketPlan, Process,
    ProcessClass, ProcessKey, ScenarioInput, ScenarioPoint, SupplyShare, Technology, TierPlan,
    TransformPlan,
};
pub use self::geography::{GeographyIndex, Topology};
pub use self::transform::{Project, ScenarioResult, TransformSummary};
