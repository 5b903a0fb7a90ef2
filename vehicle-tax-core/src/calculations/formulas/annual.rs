//! Annual circulation tax, shared by the three regions.

use rust_decimal::Decimal;

use super::{BaseAmount, FormulaContext};
use crate::calculations::common::floor_at_zero;
use crate::error::TaxError;
use crate::models::{FuelType, Region, keys};

/// Fiscal horsepower bracket, plus the LPG supplement, then the Flemish CO2
/// adjustment on that sum.
pub(super) async fn annual(ctx: &mut FormulaContext<'_>) -> Result<BaseAmount, TaxError> {
    let vehicle = ctx.vehicle;
    let fiscal_hp = ctx.require(vehicle.fiscal_hp, "fiscal_hp")?;

    let bracket_amount = ctx.bracket_amount("fiscal_hp", fiscal_hp).await?;
    ctx.record(keys::FISCAL_HP, fiscal_hp);
    ctx.record(keys::BRACKET_AMOUNT, bracket_amount);

    let mut amount = bracket_amount;
    if vehicle.fuel == FuelType::Lpg {
        let per_hp = ctx.param("lpg_supplement_per_hp").await?;
        let supplement = per_hp * Decimal::from(fiscal_hp);
        ctx.record(keys::LPG_SUPPLEMENT, supplement);
        amount += supplement;
    }

    if ctx.region == Region::Flanders {
        if let Some(co2) = vehicle.co2_wltp.filter(|c| *c > 0) {
            let reference = ctx.param("co2_reference_wltp").await?;
            let percent = ctx.param("co2_correction_percent").await?;
            let adjustment = amount * (Decimal::from(co2) - reference) * percent;
            ctx.record(keys::CO2_WLTP, co2);
            ctx.record(keys::CO2_REFERENCE, reference);
            ctx.record(keys::CO2_ADJUSTMENT, adjustment);
            amount += adjustment;
        }
    }

    Ok(BaseAmount::computed(floor_at_zero(amount)))
}
