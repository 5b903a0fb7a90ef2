use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Region, TaxType, Validity, Versioned};

/// Multiplicative TMC factor for a vehicle of a given age in whole years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeCoefficient {
    pub id: i64,
    pub region: Region,
    pub tax_type: TaxType,
    pub vehicle_age_years: i32,
    pub coefficient: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl Versioned for AgeCoefficient {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgeCoefficient {
    pub region: Region,
    pub tax_type: TaxType,
    pub vehicle_age_years: i32,
    pub coefficient: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl NewAgeCoefficient {
    pub fn with_id(self, id: i64) -> AgeCoefficient {
        AgeCoefficient {
            id,
            region: self.region,
            tax_type: self.tax_type,
            vehicle_age_years: self.vehicle_age_years,
            coefficient: self.coefficient,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

impl Versioned for NewAgeCoefficient {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

/// Outcome of an age-coefficient lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAgeCoefficient {
    pub vehicle_age_years: i32,
    /// Age of the row actually used; differs from `vehicle_age_years` when the
    /// vehicle is older than the highest defined age.
    pub applied_age_years: i32,
    pub coefficient: Decimal,
}

impl ResolvedAgeCoefficient {
    pub fn is_extrapolated(&self) -> bool {
        self.applied_age_years != self.vehicle_age_years
    }
}
