//! Base-amount formulas, one per `(region, tax_type)`.
//!
//! Each formula reads the rules it needs through a [`FormulaContext`],
//! records every quantity it uses in the breakdown and returns the amount
//! before age coefficient, fuel adjustments, reductions and clamping.

mod annual;
mod brussels;
mod flanders;
mod wallonia;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::TaxError;
use crate::models::{Breakdown, BreakdownValue, Region, TaxType, Vehicle};
use crate::resolver::RuleResolver;

/// The closed set of base-amount strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formula {
    WalloniaTmc,
    BrusselsTmc,
    FlandersTmc,
    Annual,
}

impl Formula {
    pub fn select(region: Region, tax_type: TaxType) -> Self {
        match (region, tax_type) {
            (Region::Wallonia, TaxType::Tmc) => Self::WalloniaTmc,
            (Region::Brussels, TaxType::Tmc) => Self::BrusselsTmc,
            (Region::Flanders, TaxType::Tmc) => Self::FlandersTmc,
            (_, TaxType::Annual) => Self::Annual,
        }
    }

    pub(crate) async fn base_amount(
        self,
        ctx: &mut FormulaContext<'_>,
    ) -> Result<BaseAmount, TaxError> {
        match self {
            Self::WalloniaTmc => wallonia::tmc(ctx).await,
            Self::BrusselsTmc => brussels::tmc(ctx).await,
            Self::FlandersTmc => flanders::tmc(ctx).await,
            Self::Annual => annual::annual(ctx).await,
        }
    }
}

/// Amount produced by a formula plus how later steps must treat it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BaseAmount {
    pub amount: Decimal,
    /// Flat amount that the age coefficient leaves alone (unless it is 0).
    pub fixed: bool,
    /// The minimum amount must not lift this result.
    pub minimum_waived: bool,
}

impl BaseAmount {
    pub fn computed(amount: Decimal) -> Self {
        Self {
            amount,
            fixed: false,
            minimum_waived: false,
        }
    }

    pub fn fixed(amount: Decimal) -> Self {
        Self {
            amount,
            fixed: true,
            minimum_waived: false,
        }
    }

    pub fn waived(amount: Decimal) -> Self {
        Self {
            amount,
            fixed: false,
            minimum_waived: true,
        }
    }
}

/// Everything a formula reads, plus the breakdown it writes to.
pub(crate) struct FormulaContext<'a> {
    pub resolver: &'a RuleResolver,
    pub vehicle: &'a Vehicle,
    pub region: Region,
    pub tax_type: TaxType,
    pub as_of: NaiveDate,
    pub registration: NaiveDate,
    breakdown: Breakdown,
}

impl<'a> FormulaContext<'a> {
    pub fn new(
        resolver: &'a RuleResolver,
        vehicle: &'a Vehicle,
        region: Region,
        tax_type: TaxType,
        as_of: NaiveDate,
        registration: NaiveDate,
    ) -> Self {
        Self {
            resolver,
            vehicle,
            region,
            tax_type,
            as_of,
            registration,
            breakdown: Breakdown::new(),
        }
    }

    pub async fn param(&self, key: &str) -> Result<Decimal, TaxError> {
        self.resolver
            .required_parameter(self.region, self.tax_type, key, self.as_of)
            .await
    }

    pub async fn optional_param(&self, key: &str) -> Result<Option<Decimal>, TaxError> {
        Ok(self
            .resolver
            .parameter(self.region, self.tax_type, key, self.as_of)
            .await?
            .map(|p| p.param_value))
    }

    pub async fn bracket_amount(&self, key: &str, value: i32) -> Result<Decimal, TaxError> {
        Ok(self
            .resolver
            .required_bracket(self.region, self.tax_type, key, value, self.as_of)
            .await?
            .amount)
    }

    pub fn record(&mut self, key: impl Into<String>, value: impl Into<BreakdownValue>) {
        self.breakdown.record(key, value);
    }

    pub fn insufficient(&self, attribute: &str) -> TaxError {
        TaxError::InsufficientData {
            region: self.region,
            tax_type: self.tax_type,
            missing: vec![attribute.to_string()],
        }
    }

    pub fn require<T>(&self, value: Option<T>, attribute: &str) -> Result<T, TaxError> {
        value.ok_or_else(|| self.insufficient(attribute))
    }

    /// `numerator / denominator`, failing on a zero parameter.
    pub fn divide(
        &self,
        numerator: Decimal,
        denominator: Decimal,
        param_key: &str,
    ) -> Result<Decimal, TaxError> {
        numerator.checked_div(denominator).ok_or_else(|| {
            TaxError::InvalidRequest(format!(
                "parameter '{param_key}' is zero for {}/{} on {}",
                self.region, self.tax_type, self.as_of
            ))
        })
    }

    /// An intermediate value left the [`Decimal`] range, which only
    /// implausible vehicle attributes can cause.
    pub fn out_of_range(&self, step: &str) -> TaxError {
        TaxError::InvalidRequest(format!(
            "{step} out of range for {}/{} on {}; check the vehicle attributes",
            self.region, self.tax_type, self.as_of
        ))
    }

    pub fn into_breakdown(self) -> Breakdown {
        self.breakdown
    }
}
