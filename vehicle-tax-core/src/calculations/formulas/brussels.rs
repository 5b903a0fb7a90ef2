//! Brussels TMC: the higher of the fiscal-HP and kW brackets.

use rust_decimal::Decimal;

use super::{BaseAmount, FormulaContext};
use crate::error::TaxError;
use crate::models::{FuelType, keys};

pub(super) async fn tmc(ctx: &mut FormulaContext<'_>) -> Result<BaseAmount, TaxError> {
    let vehicle = ctx.vehicle;

    if vehicle.fuel.is_zero_emission() {
        let fixed = ctx.param("electric_min_amount").await?;
        ctx.record(keys::ELECTRIC_FIXED_AMOUNT, fixed);
        return Ok(BaseAmount::fixed(fixed));
    }

    let mut by_criteria: Vec<(&str, Decimal)> = Vec::with_capacity(2);
    if let Some(fiscal_hp) = vehicle.fiscal_hp {
        let amount = ctx.bracket_amount("fiscal_hp", fiscal_hp).await?;
        ctx.record(keys::FISCAL_HP, fiscal_hp);
        ctx.record(keys::AMOUNT_BY_FISCAL_HP, amount);
        by_criteria.push(("fiscal_hp", amount));
    }
    if let Some(power_kw) = vehicle.power_kw {
        let amount = ctx.bracket_amount("power_kw", power_kw).await?;
        ctx.record(keys::POWER_KW, power_kw);
        ctx.record(keys::AMOUNT_BY_POWER_KW, amount);
        by_criteria.push(("power_kw", amount));
    }

    let (criteria, amount) = by_criteria
        .into_iter()
        .reduce(|best, next| if next.1 > best.1 { next } else { best })
        .ok_or_else(|| ctx.insufficient("fiscal_hp or power_kw"))?;
    ctx.record(keys::USED_CRITERIA, criteria);

    if vehicle.fuel == FuelType::Cng {
        ctx.record(keys::CNG_EXEMPT, true);
        return Ok(BaseAmount::waived(Decimal::ZERO));
    }

    Ok(BaseAmount::computed(amount))
}
