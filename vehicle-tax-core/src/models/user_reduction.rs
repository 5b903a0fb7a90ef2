use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Region, TaxType, Validity, Versioned};

/// Catalogue entry for a reduction a taxpayer may claim (e.g. large family,
/// disability).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReductionType {
    pub id: i64,
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserReductionType {
    pub code: String,
    pub description: Option<String>,
}

/// Versioned value of a reduction type for one region and tax type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReduction {
    pub id: i64,
    pub region: Region,
    pub tax_type: TaxType,
    pub reduction_type_code: String,
    /// `value` is a percentage of the running amount when set, a fixed
    /// amount otherwise.
    pub is_percentage: bool,
    pub value: Decimal,
    /// Vehicles emitting more than this (WLTP, else NEDC) are not eligible.
    pub max_co2: Option<i32>,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl UserReduction {
    pub fn is_eligible(&self, co2: Option<i32>) -> bool {
        match (self.max_co2, co2) {
            (None, _) => true,
            (Some(max), Some(co2)) => co2 <= max,
            // Unknown emissions cannot prove eligibility.
            (Some(_), None) => false,
        }
    }

    /// Amount deducted from `running`, never more than `running` itself.
    pub fn deduction(&self, running: Decimal) -> Decimal {
        let raw = if self.is_percentage {
            running * self.value / Decimal::ONE_HUNDRED
        } else {
            self.value
        };
        raw.min(running).max(Decimal::ZERO)
    }
}

impl Versioned for UserReduction {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserReduction {
    pub region: Region,
    pub tax_type: TaxType,
    pub reduction_type_code: String,
    pub is_percentage: bool,
    pub value: Decimal,
    pub max_co2: Option<i32>,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl NewUserReduction {
    pub fn with_id(self, id: i64) -> UserReduction {
        UserReduction {
            id,
            region: self.region,
            tax_type: self.tax_type,
            reduction_type_code: self.reduction_type_code,
            is_percentage: self.is_percentage,
            value: self.value,
            max_co2: self.max_co2,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

impl Versioned for NewUserReduction {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}
