//! Flemish TMC (BIV).
//!
//! NEDC, first registration before 2021:  `((CO2·f + x) / divisor)^6 · constant + c`
//! WLTP, first registration from 2021:    `((CO2·f·q) / divisor)^6 · constant + c`

use chrono::Datelike;
use rust_decimal::Decimal;

use super::{BaseAmount, FormulaContext};
use crate::calculations::common::powi;
use crate::error::TaxError;
use crate::models::{FuelType, Vehicle, keys};

/// Vehicles first registered from this year on are taxed on WLTP values.
const WLTP_FIRST_YEAR: i32 = 2021;

const FORMULA_EXPONENT: u32 = 6;

/// Emission value for the formula and the breakdown key naming its cycle.
/// The formula's own cycle is preferred; zero values count as unknown.
fn select_co2(vehicle: &Vehicle, wltp: bool) -> Option<(i32, &'static str)> {
    let wltp_value = vehicle.co2_wltp.filter(|c| *c > 0).map(|c| (c, keys::CO2_WLTP));
    let nedc_value = vehicle.co2_nedc.filter(|c| *c > 0).map(|c| (c, keys::CO2_NEDC));
    let any = vehicle
        .co2_wltp
        .map(|c| (c, keys::CO2_WLTP))
        .or(vehicle.co2_nedc.map(|c| (c, keys::CO2_NEDC)));
    if wltp {
        wltp_value.or(nedc_value).or(any)
    } else {
        nedc_value.or(wltp_value).or(any)
    }
}

fn fuel_factor_key(fuel: FuelType) -> &'static str {
    match fuel {
        FuelType::Lpg => "fuel_factor_lpg",
        FuelType::Cng => "fuel_factor_cng",
        _ => "fuel_factor_default",
    }
}

pub(super) async fn tmc(ctx: &mut FormulaContext<'_>) -> Result<BaseAmount, TaxError> {
    let vehicle = ctx.vehicle;

    if vehicle.fuel.is_zero_emission() {
        let fixed = ctx.param("electric_fixed_amount").await?;
        ctx.record(keys::ELECTRIC_FIXED_AMOUNT, fixed);
        return Ok(BaseAmount::fixed(fixed));
    }

    let wltp = ctx.registration.year() >= WLTP_FIRST_YEAR;
    ctx.record(keys::FORMULA_TYPE, if wltp { "WLTP" } else { "NEDC" });

    let (co2, co2_key) = select_co2(vehicle, wltp).ok_or_else(|| ctx.insufficient("co2"))?;
    let euro_norm = ctx.require(vehicle.euro_norm, "euro_norm")?;
    ctx.record(co2_key, co2);
    ctx.record(keys::EURO_NORM, euro_norm.as_str());

    let fuel_factor = ctx.param(fuel_factor_key(vehicle.fuel)).await?;
    let divisor = ctx.param("formula_divisor").await?;
    let constant = ctx.param("formula_constant").await?;
    let air_component_key = if vehicle.fuel.is_diesel_engine() {
        "luchtcomponent_diesel"
    } else {
        "luchtcomponent_petrol"
    };
    let air_component = ctx
        .bracket_amount(air_component_key, euro_norm.ordinal())
        .await?;
    ctx.record(keys::FUEL_FACTOR, fuel_factor);
    ctx.record(keys::LUCHTCOMPONENT, air_component);

    let co2 = Decimal::from(co2);
    let step1 = if wltp {
        let q = ctx.param("wltp_q_factor").await?;
        ctx.record(keys::WLTP_Q_FACTOR, q);
        let step1 = co2 * fuel_factor * q;
        ctx.record(keys::STEP1_CO2_F_Q, step1);
        step1
    } else {
        let x = ctx.param("co2_correction_x").await?;
        ctx.record(keys::CO2_CORRECTION_X, x);
        let step1 = co2 * fuel_factor + x;
        ctx.record(keys::STEP1_CO2_F_X, step1);
        step1
    };

    let step2 = ctx.divide(step1, divisor, "formula_divisor")?;
    let step3 =
        powi(step2, FORMULA_EXPONENT).ok_or_else(|| ctx.out_of_range(keys::STEP3_POWER6))?;
    let step4 = step3
        .checked_mul(constant)
        .ok_or_else(|| ctx.out_of_range(keys::STEP4_TIMES_CONSTANT))?;
    let step5 = step4
        .checked_add(air_component)
        .ok_or_else(|| ctx.out_of_range(keys::STEP5_PLUS_LUCHTCOMPONENT))?;
    ctx.record(keys::STEP2_DIVIDED, step2);
    ctx.record(keys::STEP3_POWER6, step3);
    ctx.record(keys::STEP4_TIMES_CONSTANT, step4);
    ctx.record(keys::STEP5_PLUS_LUCHTCOMPONENT, step5);

    Ok(BaseAmount::computed(step5))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::super::test_support::{bracket, param, resolver_with, vehicle};
    use super::*;
    use crate::models::{Breakdown, EuroNorm, FirstRegistration, NewRuleVersion, Region, TaxType};
    use crate::resolver::RuleResolver;

    fn rules() -> Vec<NewRuleVersion> {
        let (r, t) = (Region::Flanders, TaxType::Tmc);
        vec![
            param(r, t, "formula_divisor", dec!(250)),
            param(r, t, "formula_constant", dec!(4500)),
            param(r, t, "co2_correction_x", dec!(0)),
            param(r, t, "wltp_q_factor", dec!(1)),
            param(r, t, "fuel_factor_default", dec!(1)),
            param(r, t, "fuel_factor_lpg", dec!(0.88)),
            bracket(r, t, "luchtcomponent_petrol", 0, Some(5), dec!(113.33)),
            bracket(r, t, "luchtcomponent_petrol", 6, None, dec!(27.43)),
            bracket(r, t, "luchtcomponent_diesel", 0, None, dec!(1386.27)),
        ]
    }

    async fn run(
        resolver: &RuleResolver,
        v: &Vehicle,
    ) -> (Result<BaseAmount, TaxError>, Breakdown) {
        let registration = v.first_registration.date().unwrap();
        let mut ctx = FormulaContext::new(
            resolver,
            v,
            Region::Flanders,
            TaxType::Tmc,
            registration,
            registration,
        );
        let result = tmc(&mut ctx).await;
        (result, ctx.into_breakdown())
    }

    fn petrol(year: i32) -> Vehicle {
        let mut car = vehicle(FuelType::Petrol);
        car.first_registration = FirstRegistration { year, month: Some(6) };
        car.euro_norm = Some(EuroNorm::Euro6d);
        car
    }

    #[tokio::test]
    async fn wltp_formula_for_recent_registration() {
        let resolver = resolver_with(rules()).await;
        let mut car = petrol(2023);
        car.co2_wltp = Some(125);
        car.co2_nedc = Some(100);

        let (result, breakdown) = run(&resolver, &car).await;

        // (125 / 250)^6 × 4500 + 27.43 = 70.3125 + 27.43
        assert_eq!(result.unwrap().amount, dec!(97.7425));
        assert_eq!(breakdown.text(keys::FORMULA_TYPE), Some("WLTP"));
        assert_eq!(breakdown.integer(keys::CO2_WLTP), Some(125));
        assert_eq!(breakdown.amount(keys::STEP3_POWER6), Some(dec!(0.015625)));
    }

    #[tokio::test]
    async fn nedc_formula_before_2021() {
        let resolver = resolver_with(rules()).await;
        let mut car = petrol(2020);
        car.euro_norm = Some(EuroNorm::Euro5);
        car.co2_wltp = Some(150);
        car.co2_nedc = Some(125);

        let (result, breakdown) = run(&resolver, &car).await;

        // (125 / 250)^6 × 4500 + 113.33
        assert_eq!(result.unwrap().amount, dec!(183.6425));
        assert_eq!(breakdown.text(keys::FORMULA_TYPE), Some("NEDC"));
        assert_eq!(breakdown.integer(keys::CO2_NEDC), Some(125));
        assert!(breakdown.contains_key(keys::STEP1_CO2_F_X));
    }

    #[tokio::test]
    async fn diesel_uses_diesel_air_component() {
        let resolver = resolver_with(rules()).await;
        let mut car = petrol(2023);
        car.fuel = FuelType::Diesel;
        car.co2_wltp = Some(125);

        let (result, breakdown) = run(&resolver, &car).await;

        assert_eq!(result.unwrap().amount, dec!(70.3125) + dec!(1386.27));
        assert_eq!(breakdown.amount(keys::LUCHTCOMPONENT), Some(dec!(1386.27)));
    }

    #[tokio::test]
    async fn electric_without_fixed_amount_is_not_found() {
        let resolver = resolver_with(rules()).await;
        let (result, _) = run(&resolver, &vehicle(FuelType::Electric)).await;
        assert!(matches!(result, Err(TaxError::NotFound { .. })));
    }

    #[tokio::test]
    async fn implausible_co2_is_rejected_instead_of_overflowing() {
        let resolver = resolver_with(vec![
            param(Region::Flanders, TaxType::Tmc, "formula_divisor", dec!(246)),
            param(Region::Flanders, TaxType::Tmc, "formula_constant", dec!(4500)),
            param(Region::Flanders, TaxType::Tmc, "wltp_q_factor", dec!(1)),
            param(Region::Flanders, TaxType::Tmc, "fuel_factor_default", dec!(1.245)),
            bracket(Region::Flanders, TaxType::Tmc, "luchtcomponent_petrol", 0, None, dec!(30.43)),
        ])
        .await;
        let mut car = petrol(2024);
        car.co2_wltp = Some(5_000_000);

        let (result, _) = run(&resolver, &car).await;

        match result {
            Err(TaxError::InvalidRequest(message)) => {
                // (5e6 × 1.245 / 246)^6 × 4500 is about 1.2e30
                assert!(message.contains("out of range for flanders/tmc"), "{message}");
            }
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn co2_prefers_the_formula_cycle() {
        let mut car = petrol(2023);
        car.co2_wltp = Some(140);
        car.co2_nedc = Some(110);
        assert_eq!(select_co2(&car, true), Some((140, keys::CO2_WLTP)));
        assert_eq!(select_co2(&car, false), Some((110, keys::CO2_NEDC)));

        car.co2_nedc = None;
        assert_eq!(select_co2(&car, false), Some((140, keys::CO2_WLTP)));
    }
}
