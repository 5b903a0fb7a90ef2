//! The calculation pipeline shared by every region and tax type.
//!
//! | Step | Description |
//! |------|-------------|
//! | 1    | Exemption on `fuel_<fuel>`; an exempt vehicle stops here |
//! | 2    | Missing vehicle attributes, all reported at once |
//! | 3    | Base amount from the `(region, tax_type)` [`Formula`] |
//! | 4    | Age coefficient (TMC only) |
//! | 5    | LPG reduction (TMC); the annual LPG supplement is part of step 3 |
//! | 6    | Claimed user reductions |
//! | 7    | `min_amount` / `max_amount` clamping |
//! | 8    | Round half-up to cents |

use std::borrow::Cow;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::calculations::common::{floor_at_zero, round_half_up};
use crate::calculations::formulas::{BaseAmount, Formula, FormulaContext};
use crate::error::TaxError;
use crate::models::{
    Breakdown, FuelType, Region, TaxCalculation, TaxCalculationPair, TaxOutcome, TaxType,
    Vehicle, keys,
};
use crate::resolver::{RuleResolver, vehicle_age_years};

/// Computes TMC and annual tax from the rules in force on a date.
#[derive(Clone)]
pub struct TaxCalculator {
    resolver: RuleResolver,
}

impl TaxCalculator {
    pub fn new(resolver: RuleResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    pub async fn calculate(
        &self,
        vehicle: &Vehicle,
        region: Region,
        tax_type: TaxType,
        as_of: NaiveDate,
    ) -> Result<TaxCalculation, TaxError> {
        self.calculate_with_reductions(vehicle, region, tax_type, as_of, &[])
            .await
    }

    /// Runs the full pipeline, deducting the claimed reductions that are in
    /// force and for which the vehicle is eligible.
    ///
    /// # Errors
    ///
    /// * [`TaxError::InsufficientData`] listing every attribute the formula
    ///   needs and the vehicle lacks
    /// * [`TaxError::NotFound`] when a mandatory rule has no version in force
    /// * [`TaxError::InvalidRequest`] for an invalid first registration
    pub async fn calculate_with_reductions(
        &self,
        vehicle: &Vehicle,
        region: Region,
        tax_type: TaxType,
        as_of: NaiveDate,
        claimed_reductions: &[String],
    ) -> Result<TaxCalculation, TaxError> {
        let registration = vehicle.first_registration.date()?;

        if let Some(reason) = self.exemption_reason(vehicle, region, tax_type, as_of).await? {
            debug!(%region, %tax_type, %as_of, fuel = %vehicle.fuel, "vehicle exempt");
            let mut breakdown = Breakdown::new();
            breakdown.record(keys::EXEMPTION_REASON, reason.as_str());
            return Ok(TaxCalculation {
                region,
                tax_type,
                as_of,
                amount: Decimal::ZERO,
                is_exempt: true,
                exemption_reason: Some(reason),
                applied_reductions: Vec::new(),
                breakdown,
            });
        }

        let derived_hp = self
            .fiscal_hp_from_displacement(vehicle, region, tax_type, as_of)
            .await?;
        let vehicle = match derived_hp {
            Some((_, fiscal_hp)) => Cow::Owned(Vehicle {
                fiscal_hp: Some(fiscal_hp),
                ..vehicle.clone()
            }),
            None => Cow::Borrowed(vehicle),
        };

        let missing = vehicle.missing_attributes(region, tax_type);
        if !missing.is_empty() {
            return Err(TaxError::InsufficientData {
                region,
                tax_type,
                missing,
            });
        }

        let mut ctx =
            FormulaContext::new(&self.resolver, &vehicle, region, tax_type, as_of, registration);
        if let Some((displacement_cc, _)) = derived_hp {
            ctx.record(keys::DISPLACEMENT_CC, displacement_cc);
            ctx.record(keys::FISCAL_HP_FROM_DISPLACEMENT, true);
        }
        let base = Formula::select(region, tax_type)
            .base_amount(&mut ctx)
            .await?;
        ctx.record(keys::BASE_AMOUNT, base.amount);

        let BaseAmount {
            mut amount,
            mut minimum_waived,
            ..
        } = base;

        if tax_type == TaxType::Tmc {
            let (after_age, waived) = self.apply_age_coefficient(&mut ctx, base).await?;
            amount = after_age;
            minimum_waived |= waived;
        }

        amount = apply_fuel_adjustments(&mut ctx, amount).await?;

        let (amount, applied_reductions) =
            self.apply_reductions(&mut ctx, amount, claimed_reductions).await?;

        let amount = round_half_up(clamp(&mut ctx, amount, minimum_waived).await?);

        debug!(
            %region,
            %tax_type,
            %as_of,
            amount = %amount,
            reductions = applied_reductions.len(),
            "tax calculated"
        );

        Ok(TaxCalculation {
            region,
            tax_type,
            as_of,
            amount,
            is_exempt: false,
            exemption_reason: None,
            applied_reductions,
            breakdown: ctx.into_breakdown(),
        })
    }

    /// TMC and annual tax of one vehicle on the same date, each calculated
    /// on its own. Missing attributes or rules for one tax type leave the
    /// other result intact.
    ///
    /// # Errors
    ///
    /// Store failures, ambiguous rules and invalid requests fail the whole
    /// call, as in [`Self::calculate_with_reductions`].
    pub async fn calculate_both(
        &self,
        vehicle: &Vehicle,
        region: Region,
        as_of: NaiveDate,
        claimed_reductions: &[String],
    ) -> Result<TaxCalculationPair, TaxError> {
        let tmc = self
            .outcome(vehicle, region, TaxType::Tmc, as_of, claimed_reductions)
            .await?;
        let annual = self
            .outcome(vehicle, region, TaxType::Annual, as_of, claimed_reductions)
            .await?;
        let pair = TaxCalculationPair::new(region, as_of, tmc, annual);
        debug!(%region, %as_of, status = ?pair.status, "both taxes calculated");
        Ok(pair)
    }

    async fn outcome(
        &self,
        vehicle: &Vehicle,
        region: Region,
        tax_type: TaxType,
        as_of: NaiveDate,
        claimed_reductions: &[String],
    ) -> Result<TaxOutcome, TaxError> {
        match self
            .calculate_with_reductions(vehicle, region, tax_type, as_of, claimed_reductions)
            .await
        {
            Ok(calc) => Ok(TaxOutcome::Calculated(calc)),
            Err(TaxError::InsufficientData { missing, .. }) => {
                Ok(TaxOutcome::InsufficientData { missing })
            }
            Err(err @ TaxError::NotFound { .. }) => Ok(TaxOutcome::NotCalculable {
                reason: err.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    /// Fiscal horsepower read from the `displacement_cc` annual brackets,
    /// for a vehicle that only knows its engine displacement and a tax that
    /// needs horsepower. Returns the displacement and the horsepower.
    async fn fiscal_hp_from_displacement(
        &self,
        vehicle: &Vehicle,
        region: Region,
        tax_type: TaxType,
        as_of: NaiveDate,
    ) -> Result<Option<(i32, i32)>, TaxError> {
        let (None, Some(displacement_cc)) = (vehicle.fiscal_hp, vehicle.displacement_cc) else {
            return Ok(None);
        };
        if tax_type == TaxType::Tmc && region != Region::Brussels {
            return Ok(None);
        }
        let bracket = self
            .resolver
            .required_bracket(region, TaxType::Annual, "displacement_cc", displacement_cc, as_of)
            .await?;
        let fiscal_hp = bracket.amount.trunc().to_i32().ok_or_else(|| {
            TaxError::InvalidRequest(format!(
                "displacement_cc bracket {} holds {} instead of a fiscal horsepower",
                bracket.id, bracket.amount
            ))
        })?;
        debug!(%region, displacement_cc, fiscal_hp, "fiscal horsepower from displacement");
        Ok(Some((displacement_cc, fiscal_hp)))
    }

    async fn exemption_reason(
        &self,
        vehicle: &Vehicle,
        region: Region,
        tax_type: TaxType,
        as_of: NaiveDate,
    ) -> Result<Option<String>, TaxError> {
        let exemption = self
            .resolver
            .exemption(region, tax_type, &vehicle.fuel.exemption_condition(), as_of)
            .await?;
        Ok(exemption.map(|_| {
            if vehicle.fuel.is_zero_emission() {
                format!("zero emission vehicle ({})", vehicle.fuel)
            } else {
                format!("exempt fuel type ({})", vehicle.fuel)
            }
        }))
    }

    /// Returns the amount after the age coefficient and whether the minimum
    /// amount no longer applies.
    async fn apply_age_coefficient(
        &self,
        ctx: &mut FormulaContext<'_>,
        base: BaseAmount,
    ) -> Result<(Decimal, bool), TaxError> {
        let age = vehicle_age_years(ctx.registration, ctx.as_of);
        let resolved = self
            .resolver
            .age_coefficient(ctx.region, ctx.tax_type, age, ctx.as_of)
            .await?;
        ctx.record(keys::VEHICLE_AGE_YEARS, age);
        ctx.record(keys::AGE_COEFFICIENT, resolved.coefficient);
        if resolved.is_extrapolated() {
            ctx.record(keys::AGE_COEFFICIENT_APPLIED_AGE, resolved.applied_age_years);
        }

        let (amount, waived) = if resolved.coefficient.is_zero() {
            (Decimal::ZERO, true)
        } else if base.fixed {
            ctx.record(keys::ELECTRIC_FIXED_NO_AGE_COEFFICIENT, true);
            (base.amount, false)
        } else {
            let scaled = base
                .amount
                .checked_mul(resolved.coefficient)
                .ok_or_else(|| ctx.out_of_range(keys::AFTER_AGE_COEFFICIENT))?;
            (scaled, false)
        };
        ctx.record(keys::AFTER_AGE_COEFFICIENT, amount);
        Ok((amount, waived))
    }

    async fn apply_reductions(
        &self,
        ctx: &mut FormulaContext<'_>,
        mut amount: Decimal,
        claimed: &[String],
    ) -> Result<(Decimal, Vec<String>), TaxError> {
        let vehicle = ctx.vehicle;
        let co2 = if vehicle.fuel.is_zero_emission() {
            Some(0)
        } else {
            vehicle.co2_wltp.or(vehicle.co2_nedc)
        };

        let mut seen = BTreeSet::new();
        let mut applied = Vec::new();
        for code in claimed {
            if !seen.insert(code.as_str()) {
                continue;
            }
            let reduction = self
                .resolver
                .resolve_reduction(ctx.region, ctx.tax_type, code, ctx.as_of)
                .await?;
            let Some(reduction) = reduction else {
                debug!(
                    code = %code,
                    region = %ctx.region,
                    tax_type = %ctx.tax_type,
                    "reduction not in force"
                );
                continue;
            };
            if !reduction.is_eligible(co2) {
                debug!(
                    code = %code,
                    co2 = ?co2,
                    max_co2 = ?reduction.max_co2,
                    "vehicle not eligible for reduction"
                );
                continue;
            }
            let deduction = reduction.deduction(amount);
            ctx.record(keys::reduction(code), deduction);
            amount = floor_at_zero(amount - deduction);
            applied.push(code.clone());
        }
        Ok((amount, applied))
    }
}

/// LPG reduction on TMC. The annual LPG supplement is part of the annual
/// formula, ahead of the Flemish CO2 adjustment.
async fn apply_fuel_adjustments(
    ctx: &mut FormulaContext<'_>,
    amount: Decimal,
) -> Result<Decimal, TaxError> {
    if ctx.vehicle.fuel != FuelType::Lpg || ctx.tax_type != TaxType::Tmc {
        return Ok(amount);
    }
    // A region without an LPG reduction simply grants none.
    let Some(reduction) = ctx.optional_param("lpg_reduction").await? else {
        return Ok(amount);
    };
    ctx.record(keys::LPG_REDUCTION, reduction);
    Ok(floor_at_zero(amount - reduction))
}

async fn clamp(
    ctx: &mut FormulaContext<'_>,
    amount: Decimal,
    minimum_waived: bool,
) -> Result<Decimal, TaxError> {
    let min = ctx.optional_param("min_amount").await?;
    let max = ctx.optional_param("max_amount").await?;
    ctx.record(keys::AMOUNT_BEFORE_CLAMPING, amount);

    let mut clamped = amount;
    let mut min_applied = false;
    let mut max_applied = false;
    if let Some(min) = min {
        ctx.record(keys::MIN_AMOUNT, min);
        if !minimum_waived && clamped < min {
            clamped = min;
            min_applied = true;
        }
    }
    if let Some(max) = max {
        ctx.record(keys::MAX_AMOUNT, max);
        if clamped > max {
            clamped = max;
            max_applied = true;
        }
    }
    ctx.record(keys::MIN_AMOUNT_APPLIED, min_applied);
    ctx.record(keys::MAX_AMOUNT_APPLIED, max_applied);
    Ok(clamped)
}
