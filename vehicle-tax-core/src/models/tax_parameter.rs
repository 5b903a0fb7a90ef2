use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Region, TaxType, Validity, Versioned};

/// Scalar constant used by a formula (reference values, coefficients,
/// minimum and maximum amounts, fixed amounts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxParameter {
    pub id: i64,
    pub region: Region,
    pub tax_type: TaxType,
    pub param_key: String,
    pub param_value: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl TaxParameter {
    pub fn indexed(&self, valid_from: NaiveDate, rate: Decimal) -> NewTaxParameter {
        NewTaxParameter {
            region: self.region,
            tax_type: self.tax_type,
            param_key: self.param_key.clone(),
            param_value: self.param_value * rate,
            valid_from,
            valid_to: None,
        }
    }
}

impl Versioned for TaxParameter {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaxParameter {
    pub region: Region,
    pub tax_type: TaxType,
    pub param_key: String,
    pub param_value: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl NewTaxParameter {
    pub fn with_id(self, id: i64) -> TaxParameter {
        TaxParameter {
            id,
            region: self.region,
            tax_type: self.tax_type,
            param_key: self.param_key,
            param_value: self.param_value,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

impl Versioned for NewTaxParameter {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}
