// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for the transformation core using proptest.
//!
//! These tests verify that:
//! 1. Volume allocation always yields a complete, ordered share vector
//! 2. Efficiency scaling respects the no-degradation / no-improvement clamps
//! 3. Market synthesis and CO2 splitting conserve what they redistribute

use float_cmp::approx_eq;
use proptest::prelude::*;

use crate::allocation::allocate;
use crate::database::Database;
use crate::datamodel::{FlowKind, Location, LossFactors, ProcessKey, SupplyShare};
use crate::market::{MarketSpec, build_market};
use crate::scaling::{scale_efficiency, split_combustion_co2};
use crate::testutils::*;
use crate::volumes::VolumeIndex;

fn volume_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        (1u32..1_000_000).prop_map(|v| v as f64),
        (1u32..10_000).prop_map(|v| v as f64 / 8.0),
    ]
}

fn volume_set() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(volume_strategy(), 1..12)
}

/// One producer per volume, all supplying the same product from distinct
/// locations.
fn producers_for(volumes: &[f64]) -> (Database, Vec<ProcessKey>) {
    let processes: Vec<_> = volumes
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            producer(
                &format!("plant {}", i),
                "widget",
                &format!("L{}", i),
                "kilogram",
                v,
            )
        })
        .collect();
    let keys: Vec<ProcessKey> = processes.iter().map(|p| p.key.clone()).collect();
    (Database::new(processes).unwrap(), keys)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn allocation_covers_every_candidate_and_sums_to_one(volumes in volume_set()) {
        let (db, keys) = producers_for(&volumes);
        let index = VolumeIndex::new(&db);
        let shares = allocate(&index, keys.iter());

        prop_assert_eq!(keys.len(), shares.len());
        let total: f64 = shares.iter().map(|s| s.share).sum();
        prop_assert!(approx_eq!(f64, 1.0, total, epsilon = 1e-9));
        for s in shares.iter() {
            prop_assert!(s.share >= 0.0 && s.share <= 1.0 + 1e-12);
        }
        // largest supplier first, ties broken by key
        for pair in shares.windows(2) {
            prop_assert!(pair[0].share >= pair[1].share - 1e-12);
        }
    }

    #[test]
    fn allocation_ignores_candidate_order(volumes in volume_set()) {
        let (db, keys) = producers_for(&volumes);
        let index = VolumeIndex::new(&db);

        let forward = allocate(&index, keys.iter());
        let backward = allocate(&index, keys.iter().rev());

        prop_assert_eq!(forward.len(), backward.len());
        for (a, b) in forward.iter().zip(backward.iter()) {
            prop_assert_eq!(&a.key, &b.key);
            prop_assert!(approx_eq!(f64, a.share, b.share, epsilon = 1e-12));
        }
    }

    #[test]
    fn forward_scaling_never_increases_fuel(
        factor in 0.2f64..5.0,
        amount in 0.01f64..10.0,
    ) {
        let mut plant = producer(
            "electricity production, hard coal",
            "electricity, high voltage",
            "DE",
            "kilowatt hour",
            0.0,
        );
        plant
            .exchanges
            .push(x_input("market for hard coal", "hard coal", "DE", amount, "kilogram"));

        let outcome = scale_efficiency(&mut plant, factor, 2040, 2020, None).unwrap();
        prop_assert!(plant.exchanges[1].amount <= amount + 1e-12);
        if factor < 1.0 {
            prop_assert!(outcome.clamped);
            prop_assert_eq!(amount, plant.exchanges[1].amount);
        }
    }

    #[test]
    fn backward_scaling_never_decreases_fuel(
        factor in 0.2f64..5.0,
        amount in 0.01f64..10.0,
    ) {
        let mut plant = producer(
            "electricity production, hard coal",
            "electricity, high voltage",
            "DE",
            "kilowatt hour",
            0.0,
        );
        plant
            .exchanges
            .push(x_input("market for hard coal", "hard coal", "DE", amount, "kilogram"));

        let outcome = scale_efficiency(&mut plant, factor, 2010, 2020, None).unwrap();
        prop_assert!(plant.exchanges[1].amount >= amount - 1e-12);
        if factor > 1.0 {
            prop_assert!(outcome.clamped);
            prop_assert_eq!(amount, plant.exchanges[1].amount);
        }
    }

    #[test]
    fn emissions_track_the_fuel_ratio(factor in 0.5f64..2.0) {
        let mut plant = producer(
            "electricity production, hard coal",
            "electricity, high voltage",
            "DE",
            "kilowatt hour",
            0.0,
        );
        plant
            .exchanges
            .push(x_input("market for hard coal", "hard coal", "DE", 0.3, "kilogram"));
        plant.exchanges.push(x_emission("Carbon dioxide, fossil", 0.8));

        let outcome = scale_efficiency(&mut plant, factor, 2050, 2020, None).unwrap();
        let applied = outcome.applied;
        prop_assert!(approx_eq!(f64, 0.3 / applied, plant.exchanges[1].amount, epsilon = 1e-12));
        prop_assert!(approx_eq!(f64, 0.8 / applied, plant.exchanges[2].amount, epsilon = 1e-12));
    }

    #[test]
    fn co2_split_conserves_total_mass(
        biogenic_share in 0.0f64..=1.0,
        fossil in 0.01f64..10.0,
    ) {
        let mut plant = producer(
            "heat and power co-generation",
            "heat, district or industrial",
            "DE",
            "megajoule",
            0.0,
        );
        plant.exchanges.push(x_emission("Carbon dioxide, fossil", fossil));

        split_combustion_co2(&mut plant, biogenic_share).unwrap();

        let total: f64 = plant
            .exchanges
            .iter()
            .filter(|x| {
                x.kind == FlowKind::Output
                    && x.substance_name()
                        .map(|n| n.as_str().starts_with("carbon dioxide"))
                        .unwrap_or(false)
            })
            .map(|x| x.amount)
            .sum();
        prop_assert!(approx_eq!(f64, fossil, total, epsilon = 1e-9));
    }

    #[test]
    fn market_supplier_inputs_sum_to_one(
        raw in prop::collection::vec(0.001f64..100.0, 1..8),
    ) {
        let shares: Vec<SupplyShare> = raw
            .iter()
            .enumerate()
            .map(|(i, &share)| SupplyShare {
                key: key(
                    &format!("plant {}", i),
                    "electricity, high voltage",
                    &format!("L{}", i),
                ),
                share,
            })
            .collect();
        let spec = MarketSpec {
            name: "market for electricity, high voltage".into(),
            product: "electricity, high voltage".into(),
            unit: "kilowatt hour".to_owned(),
            region: Location::new("EUR"),
            losses: LossFactors::default(),
        };

        let market = build_market(&spec, &shares, 42.0).unwrap();
        prop_assert_eq!(1.0, market.reference_amount());
        let supplied: f64 = market
            .exchanges
            .iter()
            .filter(|x| x.kind == FlowKind::Input)
            .map(|x| x.amount)
            .sum();
        prop_assert!(approx_eq!(f64, 1.0, supplied, epsilon = 1e-9));
    }
}
