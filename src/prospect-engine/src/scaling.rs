// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use lazy_static::lazy_static;
use smallvec::SmallVec;

use crate::common::{Error, ErrorCode, ErrorKind, Ident, Result};
use crate::datamodel::{Exchange, ExchangeTarget, FlowKind, Process, ProcessClass};
use crate::xform_err;

/// Combustion properties of a fuel, per the unit the background database
/// trades it in (kg for solids and liquids, m3 for gases).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FuelSpec {
    /// Lower heating value, MJ per kg or m3.
    pub lhv: f64,
    /// CO2 emitted per MJ burned, kg.
    pub co2: f64,
    /// Fraction of that CO2 that is biogenic rather than fossil.
    pub biogenic_share: f64,
}

pub const CO2_FOSSIL: &str = "carbon dioxide, fossil";
pub const CO2_BIOGENIC: &str = "carbon dioxide, non-fossil";

lazy_static! {
    /// Keyed by a canonical product-name fragment; the longest fragment
    /// contained in a product name wins, so "natural gas, high pressure"
    /// finds "natural gas".
    static ref FUEL_SPECS: HashMap<&'static str, FuelSpec> = {
        let mut m = HashMap::new();
        m.insert("hard coal", FuelSpec { lhv: 26.7, co2: 0.0946, biogenic_share: 0.0 });
        m.insert("lignite", FuelSpec { lhv: 11.2, co2: 0.101, biogenic_share: 0.0 });
        m.insert("petroleum coke", FuelSpec { lhv: 31.3, co2: 0.0975, biogenic_share: 0.0 });
        m.insert("natural gas", FuelSpec { lhv: 45.0, co2: 0.0561, biogenic_share: 0.0 });
        m.insert("biomethane", FuelSpec { lhv: 36.0, co2: 0.0561, biogenic_share: 1.0 });
        m.insert("diesel", FuelSpec { lhv: 43.0, co2: 0.0732, biogenic_share: 0.0 });
        m.insert("biodiesel", FuelSpec { lhv: 38.0, co2: 0.0732, biogenic_share: 1.0 });
        m.insert("petrol", FuelSpec { lhv: 42.6, co2: 0.0693, biogenic_share: 0.0 });
        m.insert("light fuel oil", FuelSpec { lhv: 42.6, co2: 0.0736, biogenic_share: 0.0 });
        m.insert("heavy fuel oil", FuelSpec { lhv: 40.4, co2: 0.0774, biogenic_share: 0.0 });
        m.insert("wood chips", FuelSpec { lhv: 18.9, co2: 0.112, biogenic_share: 1.0 });
        m.insert("wood pellet", FuelSpec { lhv: 16.2, co2: 0.112, biogenic_share: 1.0 });
        m.insert("hydrogen", FuelSpec { lhv: 120.0, co2: 0.0, biogenic_share: 0.0 });
        m
    };

    /// Energy content of one reference-output unit, MJ.
    static ref OUTPUT_ENERGY: HashMap<&'static str, f64> = {
        let mut m = HashMap::new();
        m.insert("kilowatt hour", 3.6);
        m.insert("megawatt hour", 3600.0);
        m.insert("kilojoule", 0.001);
        m.insert("megajoule", 1.0);
        m.insert("gigajoule", 1000.0);
        m
    };

    /// Minimum fuel input per reference-output unit (MJ), for product
    /// classes with a hard thermodynamic bound.  Scenario-mapped
    /// technologies can override per technology.
    static ref FUEL_FLOORS: HashMap<&'static str, f64> = {
        let mut m = HashMap::new();
        m.insert("clinker", 2.9);
        m.insert("heat", 0.92);
        m
    };

    /// Substance-name fragments of emissions that move proportionally
    /// with fuel input.
    static ref COMBUSTION_EMISSIONS: Vec<&'static str> = vec![
        "carbon dioxide",
        "carbon monoxide",
        "sulfur dioxide",
        "nitrogen oxides",
        "dinitrogen monoxide",
        "methane, fossil",
        "particulate matter",
    ];
}

/// The fuel table entry for a product, longest matching name fragment
/// first.  `None` means the product is not an energy carrier.
pub fn fuel_spec(product: &Ident) -> Option<&'static FuelSpec> {
    FUEL_SPECS
        .iter()
        .filter(|(fragment, _)| product.as_str().contains(*fragment))
        .max_by_key(|(fragment, _)| fragment.len())
        .map(|(_, spec)| spec)
}

pub fn output_energy(unit: &str) -> Result<f64> {
    match OUTPUT_ENERGY.get(unit) {
        Some(&mj) => Ok(mj),
        None => xform_err!(BadUnit, unit.to_owned()),
    }
}

pub fn fuel_floor(product: &Ident) -> Option<f64> {
    FUEL_FLOORS
        .iter()
        .filter(|(fragment, _)| product.as_str().contains(*fragment))
        .max_by_key(|(fragment, _)| fragment.len())
        .map(|(_, &floor)| floor)
}

fn is_combustion_substance(name: &Ident) -> bool {
    COMBUSTION_EMISSIONS
        .iter()
        .any(|fragment| name.as_str().contains(fragment))
}

fn fuel_input_indices(process: &Process) -> SmallVec<[usize; 4]> {
    process
        .exchanges
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            e.kind == FlowKind::Input
                && e.technosphere_key()
                    .map(|key| fuel_spec(&key.product).is_some())
                    .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Total fuel energy consumed per activity of the process, MJ.
pub fn fuel_energy(process: &Process) -> f64 {
    process
        .exchanges
        .iter()
        .filter(|e| e.kind == FlowKind::Input)
        .filter_map(|e| {
            let spec = fuel_spec(&e.technosphere_key()?.product)?;
            Some(e.amount * spec.lhv)
        })
        .sum()
}

/// Energy-conversion efficiency as the database currently states it:
/// reference output energy over fuel input energy.
pub fn current_efficiency(process: &Process) -> Result<f64> {
    let energy_out = output_energy(&process.unit)? * process.reference_amount();
    let energy_in = fuel_energy(process);
    if energy_in <= 0.0 {
        return xform_err!(ZeroFuelInput, format!("{}", process.key));
    }
    Ok(energy_out / energy_in)
}

/// What `scale_efficiency` did to a process.  `applied` is the factor the
/// exchanges were actually divided by after clamping and flooring;
/// `notes` are informational, never fatal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScaleOutcome {
    pub requested: f64,
    pub applied: f64,
    pub clamped: bool,
    pub floored: bool,
    pub scaled_exchanges: usize,
    pub notes: Vec<Error>,
}

impl ScaleOutcome {
    fn untouched(requested: f64) -> ScaleOutcome {
        ScaleOutcome {
            requested,
            applied: 1.0,
            ..Default::default()
        }
    }
}

/// Divide the process's energy-carrier inputs, and the emissions that
/// move with them, by `factor` (new over old efficiency).  Two rules are
/// enforced unconditionally: efficiency may only improve for years after
/// `reference_year`, and never retroactively improve for years before it.
/// When the scaled fuel energy would fall below the floor (per-technology
/// override, else the product-class table), the floor is used and the
/// factor recomputed from it.
///
/// `ProcessClass::Conversion` processes scale every input uniformly, not
/// just energy carriers.
pub fn scale_efficiency(
    process: &mut Process,
    factor: f64,
    year: i32,
    reference_year: i32,
    floor_override: Option<f64>,
) -> Result<ScaleOutcome> {
    if !factor.is_finite() || factor <= 0.0 {
        return xform_err!(
            BadScalingFactor,
            format!("{}: {}", process.key, factor)
        );
    }

    let mut outcome = ScaleOutcome::untouched(factor);
    let mut applied = factor;
    if year > reference_year && factor < 1.0 {
        applied = 1.0;
        outcome.clamped = true;
        outcome.notes.push(Error::new(
            ErrorKind::Transform,
            ErrorCode::ClampedScalingFactor,
            Some(format!(
                "{}: {} for {} held at 1, efficiency only improves after {}",
                process.key, factor, year, reference_year
            )),
        ));
    } else if year < reference_year && factor > 1.0 {
        applied = 1.0;
        outcome.clamped = true;
        outcome.notes.push(Error::new(
            ErrorKind::Transform,
            ErrorCode::ClampedScalingFactor,
            Some(format!(
                "{}: {} for {} held at 1, no improvement before {}",
                process.key, factor, year, reference_year
            )),
        ));
    }

    let energy_before = fuel_energy(process);
    let floor = floor_override.or_else(|| fuel_floor(&process.key.product));
    if let Some(floor) = floor {
        if energy_before > 0.0 && applied != 1.0 {
            let minimum = floor * process.reference_amount();
            if energy_before / applied < minimum {
                applied = energy_before / minimum;
                outcome.floored = true;
                outcome.notes.push(Error::new(
                    ErrorKind::Transform,
                    ErrorCode::ClampedScalingFactor,
                    Some(format!(
                        "{}: fuel input held at the floor of {} MJ per {}",
                        process.key, floor, process.unit
                    )),
                ));
            }
        }
    }

    outcome.applied = applied;
    if applied == 1.0 {
        return Ok(outcome);
    }

    let scale_all_inputs = process.class == ProcessClass::Conversion;
    let fuel_indices = fuel_input_indices(process);
    for (i, exchange) in process.exchanges.iter_mut().enumerate() {
        let scales = match exchange.kind {
            FlowKind::Input => scale_all_inputs || fuel_indices.contains(&i),
            FlowKind::Output => exchange
                .substance_name()
                .map(is_combustion_substance)
                .unwrap_or(false),
            FlowKind::Waste => false,
        };
        if scales {
            exchange.amount /= applied;
            outcome.scaled_exchanges += 1;
        }
    }
    Ok(outcome)
}

/// Energy-weighted biogenic fraction of a supply blend: how much of the
/// CO2 from burning one unit of this market's product is non-fossil.
/// Suppliers without a fuel table entry contribute no energy; a blend
/// with no recognizable fuel at all is an error the caller downgrades to
/// a warning.
pub fn biogenic_energy_share(market: &Process) -> Result<f64> {
    let mut total = 0.0;
    let mut biogenic = 0.0;
    for exchange in market.technosphere_inputs() {
        let Some(key) = exchange.technosphere_key() else {
            continue;
        };
        if key == &market.key {
            continue;
        }
        if let Some(spec) = fuel_spec(&key.product) {
            let energy = exchange.amount * spec.lhv;
            total += energy;
            biogenic += energy * spec.biogenic_share;
        }
    }
    if total <= 0.0 {
        return xform_err!(MissingHeatingValue, format!("{}", market.key));
    }
    Ok(biogenic / total)
}

/// Split the consumer's fossil CO2 output into fossil and biogenic parts
/// in proportion to the upstream blend, conserving total mass.  Returns
/// whether anything changed.
pub fn split_combustion_co2(consumer: &mut Process, biogenic_share: f64) -> Result<bool> {
    if !(0.0..=1.0).contains(&biogenic_share) {
        return xform_err!(
            BadScalingFactor,
            format!("{}: biogenic share {}", consumer.key, biogenic_share)
        );
    }
    if biogenic_share == 0.0 {
        return Ok(false);
    }

    let Some(fossil_at) = consumer.exchanges.iter().position(|e| {
        e.kind == FlowKind::Output
            && e.substance_name()
                .map(|name| name.as_str() == CO2_FOSSIL)
                .unwrap_or(false)
    }) else {
        return Ok(false);
    };

    let total = consumer.exchanges[fossil_at].amount;
    let moved = total * biogenic_share;
    consumer.exchanges[fossil_at].amount = total - moved;
    let compartment = match &consumer.exchanges[fossil_at].target {
        ExchangeTarget::Substance { compartment, .. } => compartment.clone(),
        ExchangeTarget::Process(_) => unreachable!("fossil CO2 is a substance output"),
    };
    let unit = consumer.exchanges[fossil_at].unit.clone();

    let biogenic_at = consumer.exchanges.iter().position(|e| {
        e.kind == FlowKind::Output
            && e.substance_name()
                .map(|name| name.as_str() == CO2_BIOGENIC)
                .unwrap_or(false)
    });
    match biogenic_at {
        Some(i) => consumer.exchanges[i].amount += moved,
        None => consumer.exchanges.push(Exchange {
            target: ExchangeTarget::Substance {
                name: Ident::from(CO2_BIOGENIC),
                compartment,
            },
            kind: FlowKind::Output,
            amount: moved,
            unit,
        }),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{key, producer, x_emission, x_input};
    use float_cmp::approx_eq;
    use prospect_core::canonicalize;

    fn gas_plant() -> Process {
        let mut p = producer(
            "electricity production, natural gas, combined cycle power plant",
            "electricity, high voltage",
            "DE",
            "kilowatt hour",
            120.0,
        );
        p.exchanges.push(x_input(
            "market for natural gas, high pressure",
            "natural gas, high pressure",
            "DE",
            0.1040,
            "cubic meter",
        ));
        p.exchanges.push(x_emission("Carbon dioxide, fossil", 0.0059));
        p.exchanges.push(x_emission("Water", 0.75));
        p
    }

    #[test]
    fn efficiency_comes_from_lhv_and_output_energy() {
        let p = gas_plant();
        let eff = current_efficiency(&p).unwrap();
        // 3.6 MJ out over 0.1040 m3 * 45 MJ/m3 in
        assert!(approx_eq!(f64, 3.6 / 4.68, eff, epsilon = 1e-9));
    }

    #[test]
    fn scaling_divides_fuel_and_combustion_emissions_only() {
        let mut p = gas_plant();
        let outcome = scale_efficiency(&mut p, 1.03, 2050, 2020, None).unwrap();

        assert_eq!(1.03, outcome.applied);
        assert!(!outcome.clamped);
        assert!(!outcome.floored);
        assert_eq!(2, outcome.scaled_exchanges);

        let fuel = p
            .technosphere_inputs()
            .find(|e| e.unit == "cubic meter")
            .unwrap();
        assert!(approx_eq!(f64, 0.1040 / 1.03, fuel.amount, epsilon = 1e-9));
        assert!(fuel.amount > 0.1009 && fuel.amount < 0.1011);

        let co2 = p
            .biosphere_outputs()
            .find(|e| e.substance_name().unwrap().as_str() == CO2_FOSSIL)
            .unwrap();
        assert!(approx_eq!(f64, 0.0059 / 1.03, co2.amount, epsilon = 1e-9));
        assert!(co2.amount > 0.00572 && co2.amount < 0.00574);

        // cooling water is not a combustion emission
        let water = p
            .biosphere_outputs()
            .find(|e| e.substance_name().unwrap().as_str() == "water")
            .unwrap();
        assert_eq!(0.75, water.amount);
    }

    #[test]
    fn efficiency_never_degrades_forward_nor_improves_backward() {
        let mut p = gas_plant();
        let outcome = scale_efficiency(&mut p, 0.97, 2050, 2020, None).unwrap();
        assert!(outcome.clamped);
        assert_eq!(1.0, outcome.applied);
        assert_eq!(0, outcome.scaled_exchanges);
        assert_eq!(ErrorCode::ClampedScalingFactor, outcome.notes[0].code);
        assert_eq!(gas_plant(), p);

        let outcome = scale_efficiency(&mut p, 1.2, 2005, 2020, None).unwrap();
        assert!(outcome.clamped);
        assert_eq!(gas_plant(), p);

        // at the reference year itself neither clamp applies
        let outcome = scale_efficiency(&mut p, 0.9, 2020, 2020, None).unwrap();
        assert!(!outcome.clamped);
        assert_eq!(0.9, outcome.applied);
    }

    #[test]
    fn floor_recomputes_the_effective_factor() {
        let mut p = producer(
            "electricity production, hard coal",
            "electricity, high voltage",
            "PL",
            "kilowatt hour",
            40.0,
        );
        p.exchanges.push(x_input(
            "market for hard coal",
            "hard coal",
            "PL",
            0.337,
            "kilogram",
        ));

        // 0.337 kg * 26.7 MJ/kg = 9.0 MJ; halving it would undershoot a
        // 5.7 MJ/kWh floor, so the fuel lands exactly on the floor
        let outcome = scale_efficiency(&mut p, 2.0, 2050, 2020, Some(5.7)).unwrap();
        assert!(outcome.floored);
        assert!(approx_eq!(f64, 8.9979 / 5.7, outcome.applied, epsilon = 1e-9));

        let coal = p.technosphere_inputs().find(|e| e.unit == "kilogram").unwrap();
        assert!(approx_eq!(f64, 5.7 / 26.7, coal.amount, epsilon = 1e-9));
    }

    #[test]
    fn conversion_processes_scale_every_input() {
        let mut p = producer(
            "heat production, natural gas, boiler",
            "heat, district or industrial",
            "DE",
            "megajoule",
            15.0,
        );
        p.class = ProcessClass::Conversion;
        p.exchanges.push(x_input(
            "market for natural gas, low pressure",
            "natural gas, low pressure",
            "DE",
            0.031,
            "cubic meter",
        ));
        p.exchanges.push(x_input(
            "market for tap water",
            "tap water",
            "DE",
            0.2,
            "kilogram",
        ));

        let outcome = scale_efficiency(&mut p, 1.1, 2040, 2020, None).unwrap();
        assert_eq!(2, outcome.scaled_exchanges);
        let amounts: Vec<f64> = p.technosphere_inputs().map(|e| e.amount).collect();
        assert!(approx_eq!(f64, 0.031 / 1.1, amounts[0], epsilon = 1e-12));
        assert!(approx_eq!(f64, 0.2 / 1.1, amounts[1], epsilon = 1e-12));
    }

    #[test]
    fn degenerate_factors_are_structural_errors() {
        let mut p = gas_plant();
        for bad in [0.0, -1.5, f64::NAN, f64::INFINITY] {
            let err = scale_efficiency(&mut p, bad, 2050, 2020, None).unwrap_err();
            assert_eq!(ErrorCode::BadScalingFactor, err.code);
        }
    }

    #[test]
    fn efficiency_errors_name_the_problem() {
        let p = producer("cement production", "cement", "CH", "kilogram", 3.0);
        assert_eq!(ErrorCode::BadUnit, current_efficiency(&p).unwrap_err().code);

        let p = producer(
            "electricity production, wind",
            "electricity, high voltage",
            "DK",
            "kilowatt hour",
            80.0,
        );
        assert_eq!(
            ErrorCode::ZeroFuelInput,
            current_efficiency(&p).unwrap_err().code
        );
    }

    #[test]
    fn blend_biogenic_share_is_energy_weighted() {
        let mut blend = producer(
            "market for natural gas, high pressure",
            "natural gas, high pressure",
            "EUR",
            "cubic meter",
            0.0,
        );
        blend.class = ProcessClass::Market;
        blend.exchanges.push(x_input(
            "natural gas production",
            "natural gas, high pressure",
            "NO",
            0.9,
            "cubic meter",
        ));
        blend.exchanges.push(x_input(
            "biomethane upgrading",
            "biomethane, high pressure",
            "DE",
            0.1,
            "cubic meter",
        ));

        let x = biogenic_energy_share(&blend).unwrap();
        let expected = (0.1 * 36.0) / (0.9 * 45.0 + 0.1 * 36.0);
        assert!(approx_eq!(f64, expected, x, epsilon = 1e-12));

        let inert = producer(
            "market for tap water",
            "tap water",
            "EUR",
            "kilogram",
            0.0,
        );
        assert_eq!(
            ErrorCode::MissingHeatingValue,
            biogenic_energy_share(&inert).unwrap_err().code
        );
    }

    #[test]
    fn co2_split_conserves_mass() {
        let mut p = gas_plant();
        let x = 0.0816326530612245;
        assert!(split_combustion_co2(&mut p, x).unwrap());

        let fossil = p
            .biosphere_outputs()
            .find(|e| e.substance_name().unwrap().as_str() == CO2_FOSSIL)
            .unwrap()
            .amount;
        let biogenic = p
            .biosphere_outputs()
            .find(|e| e.substance_name().unwrap().as_str() == CO2_BIOGENIC)
            .unwrap()
            .amount;
        assert!(approx_eq!(f64, 0.0059 * (1.0 - x), fossil, epsilon = 1e-15));
        assert!(approx_eq!(f64, 0.0059 * x, biogenic, epsilon = 1e-15));
        assert!(approx_eq!(f64, 0.0059, fossil + biogenic, epsilon = 1e-15));

        // nothing to split: fully fossil blend or no CO2 output at all
        let mut p = gas_plant();
        assert!(!split_combustion_co2(&mut p, 0.0).unwrap());
        let mut wind = producer(
            "electricity production, wind",
            "electricity, high voltage",
            "DK",
            "kilowatt hour",
            80.0,
        );
        assert!(!split_combustion_co2(&mut wind, 0.3).unwrap());

        let mut p = gas_plant();
        assert_eq!(
            ErrorCode::BadScalingFactor,
            split_combustion_co2(&mut p, 1.5).unwrap_err().code
        );
    }
}
