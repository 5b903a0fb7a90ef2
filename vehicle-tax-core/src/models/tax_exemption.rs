use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Region, TaxType, Validity, Versioned};

/// Presence of a row means vehicles matching `condition_key` pay nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxExemption {
    pub id: i64,
    pub region: Region,
    pub tax_type: TaxType,
    pub condition_key: String,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl Versioned for TaxExemption {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaxExemption {
    pub region: Region,
    pub tax_type: TaxType,
    pub condition_key: String,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl NewTaxExemption {
    pub fn with_id(self, id: i64) -> TaxExemption {
        TaxExemption {
            id,
            region: self.region,
            tax_type: self.tax_type,
            condition_key: self.condition_key,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

impl Versioned for NewTaxExemption {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}
