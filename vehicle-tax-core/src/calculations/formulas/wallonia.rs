//! Walloon TMC: `MB × (CO2/X) × (MMA/Y) × C`.

use rust_decimal::Decimal;

use super::{BaseAmount, FormulaContext};
use crate::error::TaxError;
use crate::models::keys;

pub(super) async fn tmc(ctx: &mut FormulaContext<'_>) -> Result<BaseAmount, TaxError> {
    let vehicle = ctx.vehicle;
    let power_kw = ctx.require(vehicle.power_kw, "power_kw")?;
    let mass_kg = ctx.require(vehicle.mass_kg, "mass_kg")?;

    let bracket_amount = ctx.bracket_amount("power_kw", power_kw).await?;
    ctx.record(keys::POWER_KW, power_kw);
    ctx.record(keys::BRACKET_AMOUNT, bracket_amount);

    let energy = if vehicle.fuel.is_zero_emission() {
        ctx.bracket_amount("energy_electric_kw", power_kw).await?
    } else if vehicle.fuel.is_hybrid() {
        ctx.param("energy_hybrid").await?
    } else {
        ctx.param("energy_thermal").await?
    };
    ctx.record(keys::ENERGY_COEFFICIENT, energy);

    let co2_factor = co2_factor(ctx).await?;
    ctx.record(keys::CO2_FACTOR, co2_factor);

    let mass_factor = if mass_kg == 0 {
        Decimal::ONE
    } else {
        let reference = ctx.param("mma_reference").await?;
        ctx.record(keys::MASS_KG, mass_kg);
        ctx.record(keys::MASS_REFERENCE, reference);
        ctx.divide(Decimal::from(mass_kg), reference, "mma_reference")?
    };
    ctx.record(keys::MASS_FACTOR, mass_factor);

    Ok(BaseAmount::computed(
        bracket_amount * co2_factor * mass_factor * energy,
    ))
}

/// WLTP emissions against the WLTP reference, else NEDC against the NEDC
/// reference. Neutral for zero-emission fuels and zero emissions.
async fn co2_factor(ctx: &mut FormulaContext<'_>) -> Result<Decimal, TaxError> {
    let vehicle = ctx.vehicle;
    if vehicle.fuel.is_zero_emission() {
        return Ok(Decimal::ONE);
    }
    let (co2, co2_key, reference_key) = match (vehicle.co2_wltp, vehicle.co2_nedc) {
        (Some(wltp), _) if wltp > 0 => (wltp, keys::CO2_WLTP, "co2_reference_wltp"),
        (_, Some(nedc)) if nedc > 0 => (nedc, keys::CO2_NEDC, "co2_reference_nedc"),
        _ => return Ok(Decimal::ONE),
    };
    let reference = ctx.param(reference_key).await?;
    ctx.record(co2_key, co2);
    ctx.record(keys::CO2_REFERENCE, reference);
    ctx.divide(Decimal::from(co2), reference, reference_key)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::super::test_support::{bracket, param, resolver_with, vehicle};
    use super::*;
    use crate::models::{Breakdown, FuelType, NewRuleVersion, Region, TaxType, Vehicle};
    use crate::resolver::RuleResolver;

    fn rules() -> Vec<NewRuleVersion> {
        let (r, t) = (Region::Wallonia, TaxType::Tmc);
        vec![
            bracket(r, t, "power_kw", 0, Some(100), dec!(5000)),
            bracket(r, t, "power_kw", 101, None, dec!(9500)),
            bracket(r, t, "energy_electric_kw", 0, Some(120), dec!(0.01)),
            param(r, t, "co2_reference_wltp", dec!(136)),
            param(r, t, "co2_reference_nedc", dec!(115)),
            param(r, t, "mma_reference", dec!(1838)),
            param(r, t, "energy_thermal", dec!(1)),
            param(r, t, "energy_hybrid", dec!(0.8)),
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
            Region::Wallonia,
            TaxType::Tmc,
            registration,
            registration,
        );
        let result = tmc(&mut ctx).await;
        (result, ctx.into_breakdown())
    }

    #[tokio::test]
    async fn thermal_car_scales_by_co2_and_mass() {
        let resolver = resolver_with(rules()).await;
        let mut car = vehicle(FuelType::Petrol);
        car.power_kw = Some(90);
        car.co2_wltp = Some(272);
        car.mass_kg = Some(919);

        let (result, breakdown) = run(&resolver, &car).await;

        // 5000 × 272/136 × 919/1838 × 1
        assert_eq!(result.unwrap().amount, dec!(5000));
        assert_eq!(breakdown.amount(keys::CO2_FACTOR), Some(dec!(2)));
        assert_eq!(breakdown.amount(keys::MASS_FACTOR), Some(dec!(0.5)));
        assert_eq!(breakdown.integer(keys::CO2_WLTP), Some(272));
    }

    #[tokio::test]
    async fn nedc_only_uses_nedc_reference() {
        let resolver = resolver_with(rules()).await;
        let mut car = vehicle(FuelType::Diesel);
        car.power_kw = Some(90);
        car.co2_nedc = Some(230);
        car.mass_kg = Some(1838);

        let (result, breakdown) = run(&resolver, &car).await;

        assert_eq!(result.unwrap().amount, dec!(10000));
        assert_eq!(breakdown.amount(keys::CO2_REFERENCE), Some(dec!(115)));
        assert!(!breakdown.contains_key(keys::CO2_WLTP));
    }

    #[tokio::test]
    async fn electric_uses_energy_bracket_and_neutral_co2() {
        let resolver = resolver_with(rules()).await;
        let mut ev = vehicle(FuelType::Electric);
        ev.power_kw = Some(100);
        ev.mass_kg = Some(1838);

        let (result, breakdown) = run(&resolver, &ev).await;

        assert_eq!(result.unwrap().amount, dec!(50.00));
        assert_eq!(breakdown.amount(keys::ENERGY_COEFFICIENT), Some(dec!(0.01)));
        assert_eq!(breakdown.amount(keys::CO2_FACTOR), Some(dec!(1)));
    }

    #[tokio::test]
    async fn hybrid_uses_hybrid_coefficient() {
        let resolver = resolver_with(rules()).await;
        let mut car = vehicle(FuelType::PlugInHybridPetrol);
        car.power_kw = Some(150);
        car.co2_wltp = Some(136);
        car.mass_kg = Some(0);

        let (result, breakdown) = run(&resolver, &car).await;

        assert_eq!(result.unwrap().amount, dec!(7600));
        assert_eq!(breakdown.amount(keys::MASS_FACTOR), Some(dec!(1)));
        assert!(!breakdown.contains_key(keys::MASS_REFERENCE));
    }

    #[tokio::test]
    async fn missing_reference_is_not_found() {
        let (r, t) = (Region::Wallonia, TaxType::Tmc);
        let resolver = resolver_with(vec![
            bracket(r, t, "power_kw", 0, None, dec!(5000)),
            param(r, t, "energy_thermal", dec!(1)),
        ])
        .await;
        let mut car = vehicle(FuelType::Petrol);
        car.power_kw = Some(90);
        car.co2_wltp = Some(150);
        car.mass_kg = Some(1500);

        let (result, _) = run(&resolver, &car).await;
        assert!(matches!(result, Err(TaxError::NotFound { .. })));
    }
}
