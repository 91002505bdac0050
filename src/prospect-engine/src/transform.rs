// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::allocation::allocate;
use crate::common::{Error, ErrorCode, ErrorKind, FilterSpec, Ident, Result};
use crate::database::Database;
use crate::datamodel::{
    Location, LocationKind, LossTable, MarketPlan, ProcessKey, ScenarioInput, ScenarioPoint,
    SupplyShare, TransformPlan,
};
use crate::geography::{GeographyIndex, Topology};
use crate::market::{MarketSpec, build_market_chain, period_average_shares, region_losses};
use crate::relink::{Scope, empty_to_passthrough, relink};
use crate::resolver::{Resolution, resolve};
use crate::scaling::{biogenic_energy_share, fuel_spec, scale_efficiency, split_combustion_co2};
use crate::volumes::VolumeIndex;
use crate::xform_err;

/// Mutable state for one Scenario Point's transformation: the resolution
/// cache and the warnings accumulated along the way.  Contexts are
/// created per point and discarded with it; sharing one across points
/// would let an earlier point's view of the database leak into a later
/// one.
pub struct TransformContext {
    point: ScenarioPoint,
    cache: HashMap<(Ident, Ident, Location), Resolution>,
    warnings: Vec<Error>,
}

impl TransformContext {
    pub fn new(point: ScenarioPoint) -> TransformContext {
        TransformContext {
            point,
            cache: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn point(&self) -> &ScenarioPoint {
        &self.point
    }

    pub fn model(&self) -> &Ident {
        &self.point.model
    }

    pub fn warn(&mut self, code: ErrorCode, details: String) {
        self.warnings
            .push(Error::new(ErrorKind::Transform, code, Some(details)));
    }

    pub fn push_warning(&mut self, warning: Error) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Error> {
        self.warnings
    }

    pub(crate) fn cached(
        &self,
        name: &Ident,
        product: &Ident,
        target: &Location,
    ) -> Option<Resolution> {
        self.cache
            .get(&(name.clone(), product.clone(), target.clone()))
            .cloned()
    }

    pub(crate) fn remember(
        &mut self,
        name: &Ident,
        product: &Ident,
        target: &Location,
        resolution: Resolution,
    ) {
        self.cache
            .insert((name.clone(), product.clone(), target.clone()), resolution);
    }
}

/// Counts of what one Scenario Point's transformation did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformSummary {
    pub markets_built: usize,
    pub markets_emptied: usize,
    pub processes_scaled: usize,
    pub exchanges_relinked: usize,
    pub emission_splits: usize,
}

/// One finished Scenario Point: the transformed database copy plus
/// everything worth reporting about how it was produced.  `validation`
/// holds the dangling-reference findings of the final integrity pass;
/// they mark individual exchanges, not the run.
#[derive(Debug)]
pub struct ScenarioResult {
    pub point: ScenarioPoint,
    pub database: Database,
    pub summary: TransformSummary,
    pub warnings: Vec<Error>,
    pub validation: Vec<Error>,
}

/// An immutable, fully validated transformation setup: the background
/// database, the indexes built from it, the plan, and the scenario
/// inputs.  Everything here is shared read-only by the per-point
/// workers; each point clones the database and owns the clone.
#[derive(Debug)]
pub struct Project {
    pub database: Database,
    pub geography: GeographyIndex,
    pub volumes: VolumeIndex,
    pub losses: LossTable,
    pub plan: TransformPlan,
    pub scenarios: Vec<ScenarioInput>,
    /// Non-fatal findings from construction: overlapping region claims,
    /// clamped volumes.
    pub errors: Vec<Error>,
}

impl Project {
    /// Build a project, failing fast on plan inconsistencies (duplicate
    /// ids, markets referencing technologies that do not exist) before
    /// any transformation mutates anything.
    pub fn new(
        database: Database,
        topologies: &[Topology],
        losses: LossTable,
        plan: TransformPlan,
        scenarios: Vec<ScenarioInput>,
    ) -> Result<Project> {
        let mut seen = HashSet::new();
        for tech in plan.technologies.iter() {
            if !seen.insert(tech.id.clone()) {
                return xform_err!(DuplicateTechnology, format!("{}", tech.id));
            }
        }
        let mut seen = HashSet::new();
        for market in plan.markets.iter() {
            if !seen.insert((market.name.clone(), market.product.clone())) {
                return xform_err!(DuplicateMarket, format!("{}", market.name));
            }
            for tier in market.tiers.iter() {
                if !seen.insert((tier.name.clone(), tier.product.clone())) {
                    return xform_err!(DuplicateMarket, format!("{}", tier.name));
                }
            }
            for tech_id in market.technologies.iter() {
                if plan.technology(tech_id).is_none() {
                    return xform_err!(
                        UnknownTechnology,
                        format!("{} in {}", tech_id, market.name)
                    );
                }
            }
        }

        let geography = GeographyIndex::new(topologies);
        let volumes = VolumeIndex::new(&database);
        let mut errors = Vec::new();
        errors.extend(geography.warnings().iter().cloned());
        errors.extend(volumes.warnings().iter().cloned());

        // database locations no region claims are excluded, not fatal
        let known = database.locations();
        for topology in topologies.iter() {
            for location in known.iter() {
                if geography.kind_of(&topology.model, location) != LocationKind::Plain {
                    continue;
                }
                if geography.region_containing(&topology.model, location).is_none() {
                    errors.push(Error::new(
                        ErrorKind::Import,
                        ErrorCode::UnknownLocation,
                        Some(format!("{}: {} not in any region", topology.model, location)),
                    ));
                }
            }
        }

        Ok(Project {
            database,
            geography,
            volumes,
            losses,
            plan,
            scenarios,
            errors,
        })
    }

    /// Transform every Scenario Point, in parallel, each against its own
    /// copy of the background database.  Results come back in scenario
    /// order; a failed point is an `Err` for that point alone.
    pub fn transform_all(&self) -> Vec<Result<ScenarioResult>> {
        self.scenarios
            .par_iter()
            .map(|input| self.transform_point(input))
            .collect()
    }

    /// Run the full pipeline for one Scenario Point: build the planned
    /// regional markets (with tiers and forward windows), scale matched
    /// technologies' efficiencies, relink consumers region by region,
    /// empty the superseded markets into pass-throughs, split combustion
    /// CO2 under blended fuel markets, and validate the result.
    ///
    /// Structural violations (non-finite amounts, broken reference
    /// outputs) abort this point; everything softer lands in
    /// `warnings`/`validation` and the point still produces output.
    pub fn transform_point(&self, input: &ScenarioInput) -> Result<ScenarioResult> {
        let mut ctx = TransformContext::new(input.point.clone());
        let mut db = self.database.clone();
        let mut summary = TransformSummary::default();

        let upfront = db.check_integrity();
        if let Some(first) = upfront.structural.into_iter().next() {
            return Err(first);
        }

        let regions: Vec<Location> = self.geography.regions(ctx.model()).to_vec();
        if regions.is_empty() {
            ctx.warn(
                ErrorCode::UnknownRegion,
                format!("no topology for model {}", ctx.model()),
            );
        }

        // market construction, additive only
        let mut built: Vec<BuiltMarket> = Vec::new();
        for plan in self.plan.markets.iter() {
            for region in regions.iter() {
                if let Some(chain) =
                    self.build_regional_market(&mut ctx, &mut db, plan, region, input, &mut summary)?
                {
                    built.push(chain);
                }
            }
        }

        // efficiency scaling on the scenario-matched producers
        for tech in self.plan.technologies.iter() {
            if !tech.has_efficiency {
                continue;
            }
            for region in regions.iter() {
                let Some(factor) = input.efficiency(&tech.id, region, input.point.year) else {
                    ctx.warn(
                        ErrorCode::MissingScenarioValue,
                        format!("efficiency for {} in {}", tech.id, region),
                    );
                    continue;
                };
                let resolution = resolve(
                    &mut ctx,
                    &db,
                    &self.geography,
                    &tech.process_name,
                    &tech.product,
                    region,
                    &FilterSpec::Any,
                );
                for &i in resolution.indices.iter() {
                    let process = db.process_at_mut(i);
                    match scale_efficiency(
                        process,
                        factor,
                        input.point.year,
                        input.reference_year,
                        tech.floor,
                    ) {
                        Ok(outcome) => {
                            if outcome.applied != 1.0 {
                                summary.processes_scaled += 1;
                            }
                            for note in outcome.notes {
                                ctx.push_warning(note);
                            }
                        }
                        Err(err) => ctx.push_warning(err),
                    }
                }
            }
        }

        // relink consumers inside each region onto the new markets, then
        // fold superseded regional markets into pass-throughs
        let new_keys: HashSet<ProcessKey> = built
            .iter()
            .flat_map(|b| b.chain.iter().cloned())
            .collect();
        for b in built.iter() {
            let scope = Scope::region(ctx.model().clone(), b.region.clone());
            for new_key in b.chain.iter() {
                let superseded: Vec<ProcessKey> = db
                    .markets_for(&new_key.product)
                    .into_iter()
                    .map(|i| db.process_at(i).key.clone())
                    .filter(|key| !new_keys.contains(key))
                    .collect();
                for old in superseded.iter() {
                    summary.exchanges_relinked +=
                        relink(&mut db, &self.geography, old, new_key, &scope);

                    let claimed = self
                        .geography
                        .region_containing(ctx.model(), &old.location)
                        .map(|region| region == &b.region)
                        .unwrap_or(false);
                    if claimed {
                        empty_to_passthrough(&mut db, old, new_key)?;
                        summary.markets_emptied += 1;
                    }
                }
            }
        }

        // blended fuel markets change what burning their product emits
        let mut split_done: HashSet<ProcessKey> = HashSet::new();
        for b in built.iter() {
            let base = &b.chain[0];
            if fuel_spec(&base.product).is_none() {
                continue;
            }
            let blend = db.get(base).map(|p| biogenic_energy_share(p));
            let share = match blend {
                Some(Ok(share)) if share > 0.0 => share,
                Some(Err(err)) => {
                    ctx.push_warning(err);
                    continue;
                }
                _ => continue,
            };
            let chain: HashSet<&ProcessKey> = b.chain.iter().collect();
            for i in 0..db.len() {
                let process = db.process_at(i);
                if chain.contains(&process.key) || split_done.contains(&process.key) {
                    continue;
                }
                let buys = process.technosphere_inputs().any(|e| {
                    e.technosphere_key()
                        .map(|key| chain.contains(key))
                        .unwrap_or(false)
                });
                if !buys {
                    continue;
                }
                let key = process.key.clone();
                match split_combustion_co2(db.process_at_mut(i), share) {
                    Ok(true) => {
                        summary.emission_splits += 1;
                        split_done.insert(key);
                    }
                    Ok(false) => {}
                    Err(err) => ctx.push_warning(err),
                }
            }
        }

        let report = db.check_integrity();
        if let Some(first) = report.structural.into_iter().next() {
            return Err(first);
        }

        Ok(ScenarioResult {
            point: input.point.clone(),
            database: db,
            summary,
            warnings: ctx.into_warnings(),
            validation: report.dangling,
        })
    }

    /// Resolve, allocate, and emit the market chain of one plan for one
    /// region.  `None` means the region was skipped (nothing resolvable,
    /// or the market already exists); hard errors only for structural
    /// problems in what we were about to write.
    fn build_regional_market(
        &self,
        ctx: &mut TransformContext,
        db: &mut Database,
        plan: &MarketPlan,
        region: &Location,
        input: &ScenarioInput,
        summary: &mut TransformSummary,
    ) -> Result<Option<BuiltMarket>> {
        let shares = self.market_composition(ctx, db, plan, region, input);
        if shares.is_empty() {
            ctx.warn(
                ErrorCode::EmptyMarketComposition,
                format!("{} | {}", plan.name, region),
            );
            return Ok(None);
        }

        let (losses, loss_warning) = region_losses(
            &self.geography,
            &self.volumes,
            &self.losses,
            ctx.model(),
            region,
            &plan.product,
        );
        if let Some(warning) = loss_warning {
            ctx.push_warning(warning);
        }

        let spec = MarketSpec {
            name: plan.name.clone(),
            product: plan.product.clone(),
            unit: plan.unit.clone(),
            region: region.clone(),
            losses,
        };
        let mut prospective = vec![spec.key()];
        for tier in plan.tiers.iter() {
            prospective.push(ProcessKey::new(
                tier.name.clone(),
                tier.product.clone(),
                region.clone(),
            ));
        }
        if let Some(taken) = prospective.iter().find(|key| db.contains(key)) {
            ctx.warn(ErrorCode::DuplicateMarket, format!("{}", taken));
            return Ok(None);
        }

        let volume = self.volumes.total(shares.iter().map(|s| &s.key));
        let chain = build_market_chain(&spec, &shares, volume, &plan.tiers)?;
        let mut keys = Vec::with_capacity(chain.len());
        for process in chain {
            keys.push(process.key.clone());
            db.insert(process)?;
            summary.markets_built += 1;
        }
        Ok(Some(BuiltMarket {
            region: region.clone(),
            chain: keys,
        }))
    }

    /// The market's composition for one region: scenario technology
    /// shares times volume allocation within each technology, averaged
    /// over the plan's forward window.  Technologies that resolve to
    /// nothing or have no scenario value drop out and the remainder is
    /// renormalized.
    fn market_composition(
        &self,
        ctx: &mut TransformContext,
        db: &Database,
        plan: &MarketPlan,
        region: &Location,
        input: &ScenarioInput,
    ) -> Vec<SupplyShare> {
        let anchor = input.point.year;
        let years: Vec<i32> = (anchor..=anchor + plan.window as i32).collect();

        let mut per_year: Vec<Vec<SupplyShare>> = Vec::with_capacity(years.len());
        for &year in years.iter() {
            let mut combined: Vec<SupplyShare> = Vec::new();
            let mut present = 0.0;
            for tech_id in plan.technologies.iter() {
                let Some(tech) = self.plan.technology(tech_id) else {
                    continue;
                };
                let Some(tech_share) = input.share(tech_id, region, year) else {
                    if year == anchor {
                        ctx.warn(
                            ErrorCode::MissingScenarioValue,
                            format!("share for {} in {} at {}", tech_id, region, year),
                        );
                    }
                    continue;
                };
                if tech_share <= 0.0 {
                    continue;
                }
                let resolution = resolve(
                    ctx,
                    db,
                    &self.geography,
                    &tech.process_name,
                    &tech.product,
                    region,
                    &FilterSpec::Any,
                );
                if resolution.is_empty() {
                    continue;
                }
                for s in allocate(&self.volumes, resolution.keys(db)) {
                    combined.push(SupplyShare {
                        key: s.key,
                        share: tech_share * s.share,
                    });
                }
                present += tech_share;
            }
            if present > 0.0 {
                for s in combined.iter_mut() {
                    s.share /= present;
                }
            }
            per_year.push(combined);
        }
        period_average_shares(&per_year)
    }
}

struct BuiltMarket {
    region: Location,
    chain: Vec<ProcessKey>,
}
