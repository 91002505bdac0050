// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! User scenario configuration: which IAM variables drive which
//! technologies, and which markets to build from them.
//!
//! The configuration is validated fail-fast before anything touches a
//! database, then mapped onto the engine's typed plan and scenario
//! inputs.

use std::collections::HashSet;
use std::io::BufRead;

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use prospect_engine::{
    Error, ErrorCode, ErrorKind, Location, MarketPlan, Result, ScenarioInput, ScenarioPoint,
    Technology, TierPlan, Topology, TransformPlan, canonicalize,
};

use crate::ScenarioTable;

fn is_none<T>(val: &Option<T>) -> bool {
    val.is_none()
}

fn is_zero_u32(val: &u32) -> bool {
    *val == 0
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct ScenarioConfig {
    pub model: String,
    pub pathway: String,
    /// Database vintage year; efficiency ratios are relative to it.
    pub reference_year: i32,
    /// Scenario Point years to transform.
    pub years: Vec<i32>,
    pub technologies: Vec<TechnologyDef>,
    pub markets: Vec<MarketDef>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct TechnologyDef {
    pub id: String,
    /// Process name the technology maps to in the background database.
    pub process: String,
    pub product: String,
    /// Scenario variable whose regional values weight this technology in
    /// market compositions.
    pub share_variable: String,
    /// Scenario variable holding the technology's conversion efficiency;
    /// absent means the scaler skips processes matched through it.
    #[serde(skip_serializing_if = "is_none", default)]
    pub efficiency_variable: Option<String>,
    /// Minimum fuel input per reference-output unit, MJ.
    #[serde(skip_serializing_if = "is_none", default)]
    pub floor: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct MarketDef {
    pub name: String,
    pub product: String,
    pub unit: String,
    pub technologies: Vec<String>,
    #[serde(skip_serializing_if = "is_zero_u32", default)]
    pub window: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tiers: Vec<TierDef>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct TierDef {
    pub name: String,
    pub product: String,
    pub unit: String,
    pub loss_fraction: f64,
}

pub fn open_config(reader: &mut dyn BufRead) -> Result<ScenarioConfig> {
    let config: ScenarioConfig = serde_json::from_reader(reader).map_err(crate::json_err)?;
    config.validate()?;
    Ok(config)
}

fn invalid(code: ErrorCode, details: String) -> Error {
    Error::new(ErrorKind::Validation, code, Some(details))
}

impl ScenarioConfig {
    /// Reject inconsistent configurations before any transformation
    /// starts: every error here is a user input problem, reported with
    /// enough context to fix the file.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() || self.pathway.trim().is_empty() {
            return Err(invalid(
                ErrorCode::MissingField,
                "model/pathway".to_owned(),
            ));
        }
        if self.years.is_empty() {
            return Err(invalid(ErrorCode::MissingField, "years".to_owned()));
        }

        let mut tech_ids = HashSet::new();
        for tech in self.technologies.iter() {
            if tech.id.trim().is_empty()
                || tech.process.trim().is_empty()
                || tech.product.trim().is_empty()
                || tech.share_variable.trim().is_empty()
            {
                return Err(invalid(
                    ErrorCode::MissingField,
                    format!("technology {:?}", tech.id),
                ));
            }
            if !tech_ids.insert(canonicalize(&tech.id)) {
                return Err(invalid(ErrorCode::DuplicateTechnology, tech.id.clone()));
            }
            if let Some(floor) = tech.floor {
                if !floor.is_finite() || floor <= 0.0 {
                    return Err(invalid(
                        ErrorCode::BadScalingFactor,
                        format!("{}: floor {}", tech.id, floor),
                    ));
                }
            }
        }

        let mut market_keys = HashSet::new();
        for market in self.markets.iter() {
            if market.name.trim().is_empty() || market.product.trim().is_empty() {
                return Err(invalid(
                    ErrorCode::MissingField,
                    format!("market {:?}", market.name),
                ));
            }
            if !market_keys.insert((canonicalize(&market.name), canonicalize(&market.product))) {
                return Err(invalid(ErrorCode::DuplicateMarket, market.name.clone()));
            }
            if market.technologies.is_empty() {
                return Err(invalid(
                    ErrorCode::EmptyMarketComposition,
                    market.name.clone(),
                ));
            }
            for tech_id in market.technologies.iter() {
                if !tech_ids.contains(&canonicalize(tech_id)) {
                    return Err(invalid(
                        ErrorCode::UnknownTechnology,
                        format!("{} in {}", tech_id, market.name),
                    ));
                }
            }
            for tier in market.tiers.iter() {
                if !market_keys.insert((canonicalize(&tier.name), canonicalize(&tier.product))) {
                    return Err(invalid(ErrorCode::DuplicateMarket, tier.name.clone()));
                }
                if !tier.loss_fraction.is_finite() || tier.loss_fraction < 0.0 {
                    return Err(invalid(
                        ErrorCode::NegativeShare,
                        format!("{}: loss fraction {}", tier.name, tier.loss_fraction),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn to_plan(&self) -> Result<TransformPlan> {
        self.validate()?;
        let technologies = self
            .technologies
            .iter()
            .map(|tech| Technology {
                id: canonicalize(&tech.id),
                process_name: canonicalize(&tech.process),
                product: canonicalize(&tech.product),
                floor: tech.floor,
                has_efficiency: tech.efficiency_variable.is_some(),
            })
            .collect();
        let markets = self
            .markets
            .iter()
            .map(|market| MarketPlan {
                name: canonicalize(&market.name),
                product: canonicalize(&market.product),
                unit: market.unit.clone(),
                technologies: market.technologies.iter().map(|t| canonicalize(t)).collect(),
                window: market.window,
                tiers: market
                    .tiers
                    .iter()
                    .map(|tier| TierPlan {
                        name: canonicalize(&tier.name),
                        product: canonicalize(&tier.product),
                        unit: tier.unit.clone(),
                        loss_fraction: tier.loss_fraction,
                    })
                    .collect(),
            })
            .collect();
        Ok(TransformPlan {
            technologies,
            markets,
        })
    }

    /// Resolve the configured variables against the scenario table into
    /// per-point engine inputs.  Shares are set for every year a market
    /// window can reach; efficiencies become new-over-reference ratios at
    /// the point year.  Missing table values are simply not set; the
    /// engine warns about them in context.
    pub fn scenario_inputs(
        &self,
        table: &ScenarioTable,
        topologies: &[Topology],
    ) -> Result<Vec<ScenarioInput>> {
        let model = canonicalize(&self.model);
        let pathway = canonicalize(&self.pathway);
        if table.model() != &model || table.pathway() != &pathway {
            return Err(invalid(
                ErrorCode::MissingScenarioValue,
                format!(
                    "table holds {} {}, configuration wants {} {}",
                    table.model(),
                    table.pathway(),
                    model,
                    pathway
                ),
            ));
        }
        let Some(topology) = topologies.iter().find(|t| t.model == model) else {
            return Err(invalid(
                ErrorCode::UnknownRegion,
                format!("no topology for model {}", model),
            ));
        };
        let regions: Vec<&Location> = topology.regions.iter().map(|(region, _)| region).collect();
        let reach = self.markets.iter().map(|m| m.window).max().unwrap_or(0) as i32;

        let mut inputs = Vec::with_capacity(self.years.len());
        for &year in self.years.iter() {
            let point = ScenarioPoint {
                model: model.clone(),
                pathway: pathway.clone(),
                year,
            };
            let mut input = ScenarioInput::new(point, self.reference_year);
            for tech in self.technologies.iter() {
                let id = canonicalize(&tech.id);
                let share_variable = canonicalize(&tech.share_variable);
                for &region in regions.iter() {
                    for y in year..=year + reach {
                        if let Some(value) = table.value_at(region, &share_variable, y) {
                            input.set_share(id.clone(), region.clone(), y, value);
                        }
                    }
                    if let Some(variable) = &tech.efficiency_variable {
                        let variable = canonicalize(variable);
                        let now = table.value_at(region, &variable, year);
                        let base = table.value_at(region, &variable, self.reference_year);
                        if let (Some(now), Some(base)) = (now, base) {
                            if base > 0.0 {
                                input.set_efficiency(
                                    id.clone(),
                                    region.clone(),
                                    year,
                                    now / base,
                                );
                            }
                        }
                    }
                }
            }
            inputs.push(input);
        }
        Ok(inputs)
    }
}
