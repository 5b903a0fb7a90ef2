use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::models::{Region, RuleFamily, TaxType};

/// Bulk rate adjustment of open bracket and parameter rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexationRequest {
    /// Restricts the indexation to one region; all regions when `None`.
    pub region: Option<Region>,
    /// Restricts the indexation to one tax type; both when `None`.
    pub tax_type: Option<TaxType>,
    /// Multiplier applied to every selected value, e.g. `1.02` for +2%.
    pub rate: Decimal,
    /// First day of the new versions.
    pub effective_date: NaiveDate,
    pub include_brackets: bool,
    pub include_parameters: bool,
    /// Bracket or parameter keys left untouched (ratio-type parameters such
    /// as `co2_reference_wltp`).
    #[serde(default)]
    pub excluded_keys: BTreeSet<String>,
}

impl IndexationRequest {
    /// Indexes brackets and parameters of every region and tax type.
    pub fn new(rate: Decimal, effective_date: NaiveDate) -> Self {
        Self {
            region: None,
            tax_type: None,
            rate,
            effective_date,
            include_brackets: true,
            include_parameters: true,
            excluded_keys: BTreeSet::new(),
        }
    }

    pub fn for_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn for_tax_type(mut self, tax_type: TaxType) -> Self {
        self.tax_type = Some(tax_type);
        self
    }

    pub fn brackets_only(mut self) -> Self {
        self.include_brackets = true;
        self.include_parameters = false;
        self
    }

    pub fn parameters_only(mut self) -> Self {
        self.include_brackets = false;
        self.include_parameters = true;
        self
    }

    pub fn excluding<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Families to index. Empty when neither flag is set.
    pub fn families(&self) -> Vec<RuleFamily> {
        let mut families = Vec::with_capacity(2);
        if self.include_brackets {
            families.push(RuleFamily::Bracket);
        }
        if self.include_parameters {
            families.push(RuleFamily::Parameter);
        }
        families
    }

    pub fn validate(&self) -> Result<(), TaxError> {
        if self.rate <= Decimal::ZERO {
            return Err(TaxError::InvalidRequest(format!(
                "indexation rate must be positive, got {}",
                self.rate
            )));
        }
        Ok(())
    }
}

/// Outcome of an indexation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexationResult {
    pub brackets_updated: usize,
    pub parameters_updated: usize,
    /// Open rows matching the filters that were left alone (excluded keys,
    /// or rows already starting on or after the effective date).
    pub skipped: usize,
    pub rate: Decimal,
    pub effective_date: NaiveDate,
    pub message: String,
}

impl IndexationResult {
    pub fn new(
        brackets_updated: usize,
        parameters_updated: usize,
        skipped: usize,
        rate: Decimal,
        effective_date: NaiveDate,
    ) -> Self {
        let percent = (rate - Decimal::ONE) * Decimal::ONE_HUNDRED;
        let sign = if percent.is_sign_negative() { "" } else { "+" };
        Self {
            brackets_updated,
            parameters_updated,
            skipped,
            rate,
            effective_date,
            message: format!("indexation of {sign}{percent:.2}% applied from {effective_date}"),
        }
    }

    pub fn total_updated(&self) -> usize {
        self.brackets_updated + self.parameters_updated
    }
}
