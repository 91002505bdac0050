// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::common::{Error, ErrorCode, ErrorKind, Ident, Result};
use crate::datamodel::{
    Exchange, ExchangeTarget, FlowKind, Location, LossFactors, LossTable, Process, ProcessClass,
    ProcessKey, SupplyShare, TierPlan,
};
use crate::geography::GeographyIndex;
use crate::volumes::VolumeIndex;
use crate::xform_err;

/// Everything needed to synthesize one regional market process, already
/// resolved to a concrete region and loss factors.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketSpec {
    pub name: Ident,
    pub product: Ident,
    pub unit: String,
    pub region: Location,
    pub losses: LossFactors,
}

impl MarketSpec {
    pub fn key(&self) -> ProcessKey {
        ProcessKey::new(self.name.clone(), self.product.clone(), self.region.clone())
    }
}

/// Emit the market process for `spec`: one unit of reference output, one
/// input per supplier scaled by its share, and the loss terms as inputs
/// from the market onto itself (self-consumption, the standard way line
/// and transformer losses are modeled).
///
/// Supplier shares are normalized once more here; period averaging can
/// drift a few ulps off 1 and the built market must not.  Negative or
/// non-finite shares are structural and rejected outright.
pub fn build_market(spec: &MarketSpec, shares: &[SupplyShare], volume: f64) -> Result<Process> {
    if shares.is_empty() {
        return xform_err!(
            EmptyMarketComposition,
            format!("{} | {}", spec.name, spec.region)
        );
    }
    for s in shares.iter() {
        if !s.share.is_finite() {
            return xform_err!(NonFiniteAmount, format!("{}: {}", spec.name, s.key));
        }
        if s.share < 0.0 {
            return xform_err!(NegativeShare, format!("{}: {}", spec.name, s.key));
        }
    }
    let total: f64 = shares.iter().map(|s| s.share).sum();
    if total <= 0.0 {
        return xform_err!(
            EmptyMarketComposition,
            format!("{} | {}: shares sum to {}", spec.name, spec.region, total)
        );
    }

    let key = spec.key();
    let mut market = Process::new(key.clone(), &spec.unit);
    market.class = ProcessClass::Market;
    market.volume = volume;
    market.exchanges.push(Exchange {
        target: ExchangeTarget::Process(key.clone()),
        kind: FlowKind::Output,
        amount: 1.0,
        unit: spec.unit.clone(),
    });
    for s in shares.iter() {
        market.exchanges.push(Exchange {
            target: ExchangeTarget::Process(s.key.clone()),
            kind: FlowKind::Input,
            amount: s.share / total,
            unit: spec.unit.clone(),
        });
    }
    for loss in [spec.losses.transformation, spec.losses.distribution] {
        if loss > 0.0 {
            market.exchanges.push(Exchange {
                target: ExchangeTarget::Process(key.clone()),
                kind: FlowKind::Input,
                amount: loss,
                unit: spec.unit.clone(),
            });
        }
    }
    Ok(market)
}

/// Build a market plus its tier chain (e.g. a voltage hierarchy).  The
/// base market carries the transformation loss; each tier consumes one
/// unit of the tier below and its own `loss_fraction` of the region's
/// distribution loss.  Returned in dependency order, base first, so the
/// caller can insert them in sequence.
pub fn build_market_chain(
    spec: &MarketSpec,
    shares: &[SupplyShare],
    volume: f64,
    tiers: &[TierPlan],
) -> Result<Vec<Process>> {
    if tiers.is_empty() {
        return Ok(vec![build_market(spec, shares, volume)?]);
    }

    let mut base_spec = spec.clone();
    base_spec.losses.distribution = 0.0;
    let base = build_market(&base_spec, shares, volume)?;

    let mut chain = vec![base];
    for tier in tiers.iter() {
        let previous = chain.last().unwrap();
        let previous_key = previous.key.clone();
        let previous_unit = previous.unit.clone();

        let key = ProcessKey::new(tier.name.clone(), tier.product.clone(), spec.region.clone());
        let mut process = Process::new(key.clone(), &tier.unit);
        process.class = ProcessClass::Market;
        process.volume = volume;
        process.exchanges.push(Exchange {
            target: ExchangeTarget::Process(key.clone()),
            kind: FlowKind::Output,
            amount: 1.0,
            unit: tier.unit.clone(),
        });
        process.exchanges.push(Exchange {
            target: ExchangeTarget::Process(previous_key),
            kind: FlowKind::Input,
            amount: 1.0,
            unit: previous_unit,
        });
        let loss = spec.losses.distribution * tier.loss_fraction;
        if loss > 0.0 {
            process.exchanges.push(Exchange {
                target: ExchangeTarget::Process(key.clone()),
                kind: FlowKind::Input,
                amount: loss,
                unit: tier.unit.clone(),
            });
        }
        chain.push(process);
    }
    Ok(chain)
}

/// Average per-year compositions into one, for long-horizon markets built
/// over a forward window.  Every contributing year weighs equally; years
/// that resolved to nothing are skipped rather than dragging every share
/// toward zero.  Output is sorted largest share first, ties by key.
pub fn period_average_shares(per_year: &[Vec<SupplyShare>]) -> Vec<SupplyShare> {
    let mut acc: BTreeMap<ProcessKey, f64> = BTreeMap::new();
    let mut contributing = 0usize;
    for year in per_year.iter() {
        if year.is_empty() {
            continue;
        }
        contributing += 1;
        for s in year.iter() {
            *acc.entry(s.key.clone()).or_default() += s.share;
        }
    }
    if contributing == 0 {
        return Vec::new();
    }

    let mut averaged: Vec<SupplyShare> = acc
        .into_iter()
        .map(|(key, sum)| SupplyShare {
            key,
            share: sum / contributing as f64,
        })
        .collect();
    averaged.sort_by(|a, b| {
        (Reverse(OrderedFloat(a.share)), &a.key).cmp(&(Reverse(OrderedFloat(b.share)), &b.key))
    });
    averaged
}

/// Volume-weight the known per-location loss factors over the members of
/// `region`.  Weights are the members' production volumes of `product`;
/// when nobody reports a volume the members average evenly.  No member
/// with loss data at all yields zero losses plus a warning, never a
/// failure.
pub fn region_losses(
    geo: &GeographyIndex,
    volumes: &VolumeIndex,
    table: &LossTable,
    model: &Ident,
    region: &Location,
    product: &Ident,
) -> (LossFactors, Option<Error>) {
    let members: Vec<Location> = match geo.locations_in(model, region) {
        Some(members) => members.iter().cloned().collect(),
        // a plain location used as a market target is its own region
        None => vec![region.clone()],
    };

    let known: Vec<(LossFactors, f64)> = members
        .iter()
        .filter_map(|member| {
            table
                .get(member)
                .map(|factors| (factors, volumes.product_volume_at(product, member)))
        })
        .collect();

    if known.is_empty() {
        let warning = Error::new(
            ErrorKind::Transform,
            ErrorCode::NoLossData,
            Some(format!("{} | {}", product, region)),
        );
        return (LossFactors::default(), Some(warning));
    }

    let total_weight: f64 = known.iter().map(|(_, w)| w).sum();
    let mut averaged = LossFactors::default();
    if total_weight > 0.0 {
        for (factors, weight) in known.iter() {
            averaged.transformation += factors.transformation * weight / total_weight;
            averaged.distribution += factors.distribution * weight / total_weight;
        }
    } else {
        let n = known.len() as f64;
        for (factors, _) in known.iter() {
            averaged.transformation += factors.transformation / n;
            averaged.distribution += factors.distribution / n;
        }
    }
    (averaged, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::testutils::{key, producer, x_topology};
    use float_cmp::approx_eq;
    use prospect_core::canonicalize;

    fn spec() -> MarketSpec {
        MarketSpec {
            name: canonicalize("market for electricity, high voltage"),
            product: canonicalize("electricity, high voltage"),
            unit: "kilowatt hour".to_owned(),
            region: Location::new("EUR"),
            losses: LossFactors {
                transformation: 0.0066,
                distribution: 0.024,
            },
        }
    }

    fn coal_shares() -> Vec<SupplyShare> {
        vec![
            SupplyShare {
                key: key("electricity production, hard coal", "electricity, high voltage", "DE"),
                share: 0.6,
            },
            SupplyShare {
                key: key("electricity production, hard coal", "electricity, high voltage", "PL"),
                share: 0.4,
            },
        ]
    }

    #[test]
    fn market_has_unit_output_share_inputs_and_self_losses() {
        let market = build_market(&spec(), &coal_shares(), 100.0).unwrap();

        assert_eq!(ProcessClass::Market, market.class);
        assert_eq!("EUR", market.key.location.as_str());
        assert_eq!(100.0, market.volume);
        assert_eq!(1.0, market.reference_amount());
        assert!(market.check_integrity().is_empty());

        let inputs: Vec<(&ProcessKey, f64)> = market
            .technosphere_inputs()
            .map(|e| (e.technosphere_key().unwrap(), e.amount))
            .collect();
        assert_eq!(4, inputs.len());
        assert_eq!(0.6, inputs[0].1);
        assert_eq!(0.4, inputs[1].1);
        // self-consumption loss terms, transformation then distribution
        assert_eq!(&market.key, inputs[2].0);
        assert_eq!(0.0066, inputs[2].1);
        assert_eq!(&market.key, inputs[3].0);
        assert_eq!(0.024, inputs[3].1);

        let supplier_sum: f64 = inputs[..2].iter().map(|(_, a)| a).sum();
        assert!(approx_eq!(f64, 1.0, supplier_sum, epsilon = 1e-9));
    }

    #[test]
    fn drifted_shares_are_renormalized() {
        let mut shares = coal_shares();
        shares[0].share = 0.6000000001;
        let market = build_market(&spec(), &shares, 0.0).unwrap();
        let supplier_sum: f64 = market
            .technosphere_inputs()
            .filter(|e| e.technosphere_key() != Some(&market.key))
            .map(|e| e.amount)
            .sum();
        assert!(approx_eq!(f64, 1.0, supplier_sum, epsilon = 1e-12));
    }

    #[test]
    fn empty_or_negative_compositions_are_rejected() {
        let err = build_market(&spec(), &[], 0.0).unwrap_err();
        assert_eq!(ErrorCode::EmptyMarketComposition, err.code);

        let mut shares = coal_shares();
        shares[1].share = -0.4;
        let err = build_market(&spec(), &shares, 0.0).unwrap_err();
        assert_eq!(ErrorCode::NegativeShare, err.code);
    }

    #[test]
    fn tier_chain_feeds_each_tier_from_the_one_below() {
        let tiers = vec![
            TierPlan {
                name: canonicalize("market for electricity, medium voltage"),
                product: canonicalize("electricity, medium voltage"),
                unit: "kilowatt hour".to_owned(),
                loss_fraction: 0.25,
            },
            TierPlan {
                name: canonicalize("market for electricity, low voltage"),
                product: canonicalize("electricity, low voltage"),
                unit: "kilowatt hour".to_owned(),
                loss_fraction: 0.75,
            },
        ];
        let chain = build_market_chain(&spec(), &coal_shares(), 50.0, &tiers).unwrap();
        assert_eq!(3, chain.len());

        // base keeps the transformation loss only
        let base_self: Vec<f64> = chain[0]
            .technosphere_inputs()
            .filter(|e| e.technosphere_key() == Some(&chain[0].key))
            .map(|e| e.amount)
            .collect();
        assert_eq!(vec![0.0066], base_self);

        // each tier consumes one unit of the previous tier
        for i in 1..chain.len() {
            let feed = chain[i]
                .technosphere_inputs()
                .find(|e| e.technosphere_key() == Some(&chain[i - 1].key))
                .unwrap();
            assert_eq!(1.0, feed.amount);
            assert!(chain[i].check_integrity().is_empty());
        }

        // distribution loss split 25/75 across the tiers
        let tier_loss = |i: usize| -> f64 {
            chain[i]
                .technosphere_inputs()
                .filter(|e| e.technosphere_key() == Some(&chain[i].key))
                .map(|e| e.amount)
                .sum()
        };
        assert!(approx_eq!(f64, 0.024 * 0.25, tier_loss(1), epsilon = 1e-12));
        assert!(approx_eq!(f64, 0.024 * 0.75, tier_loss(2), epsilon = 1e-12));
    }

    #[test]
    fn period_average_is_per_identity_and_skips_empty_years() {
        let de = key("electricity production, hard coal", "electricity", "DE");
        let pl = key("electricity production, hard coal", "electricity", "PL");
        let per_year = vec![
            vec![
                SupplyShare { key: de.clone(), share: 0.6 },
                SupplyShare { key: pl.clone(), share: 0.4 },
            ],
            vec![],
            vec![
                SupplyShare { key: de.clone(), share: 0.8 },
                SupplyShare { key: pl.clone(), share: 0.2 },
            ],
        ];

        let averaged = period_average_shares(&per_year);
        assert_eq!(2, averaged.len());
        assert_eq!(de, averaged[0].key);
        assert!(approx_eq!(f64, 0.7, averaged[0].share, epsilon = 1e-12));
        assert!(approx_eq!(f64, 0.3, averaged[1].share, epsilon = 1e-12));

        assert!(period_average_shares(&[vec![], vec![]]).is_empty());
    }

    #[test]
    fn losses_are_volume_weighted_over_region_members() {
        let db = Database::new(vec![
            producer("electricity production, hard coal", "electricity", "DE", "kilowatt hour", 75.0),
            producer("electricity production, hard coal", "electricity", "PL", "kilowatt hour", 25.0),
        ])
        .unwrap();
        let volumes = VolumeIndex::new(&db);
        let geo = GeographyIndex::new(&[x_topology("remind")]);

        let mut table = LossTable::new();
        table.insert(
            Location::new("DE"),
            LossFactors { transformation: 0.004, distribution: 0.02 },
        );
        table.insert(
            Location::new("PL"),
            LossFactors { transformation: 0.008, distribution: 0.06 },
        );

        let (losses, warning) = region_losses(
            &geo,
            &volumes,
            &table,
            &canonicalize("remind"),
            &Location::new("EUR"),
            &canonicalize("electricity"),
        );
        assert!(warning.is_none());
        assert!(approx_eq!(f64, 0.005, losses.transformation, epsilon = 1e-12));
        assert!(approx_eq!(f64, 0.03, losses.distribution, epsilon = 1e-12));

        // no data for any member: zero losses, one warning
        let (losses, warning) = region_losses(
            &geo,
            &volumes,
            &LossTable::new(),
            &canonicalize("remind"),
            &Location::new("EUR"),
            &canonicalize("electricity"),
        );
        assert_eq!(LossFactors::default(), losses);
        assert_eq!(ErrorCode::NoLossData, warning.unwrap().code);
    }
}
