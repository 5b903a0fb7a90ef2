use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Region, TaxType, Validity, Versioned};

/// Maps an integer range of one dimension (kW, fiscal HP, Euro-norm ordinal)
/// to an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub id: i64,
    pub region: Region,
    pub tax_type: TaxType,
    pub bracket_key: String,
    pub min_value: i32,
    /// Inclusive upper bound; `None` for the last, unbounded bracket.
    pub max_value: Option<i32>,
    pub amount: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl TaxBracket {
    pub fn covers(&self, value: i32) -> bool {
        self.min_value <= value && self.max_value.is_none_or(|max| value <= max)
    }

    /// Successor version starting at `valid_from` with the amount scaled by
    /// `rate`.
    pub fn indexed(&self, valid_from: NaiveDate, rate: Decimal) -> NewTaxBracket {
        NewTaxBracket {
            region: self.region,
            tax_type: self.tax_type,
            bracket_key: self.bracket_key.clone(),
            min_value: self.min_value,
            max_value: self.max_value,
            amount: self.amount * rate,
            valid_from,
            valid_to: None,
        }
    }
}

impl Versioned for TaxBracket {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

/// For inserting new brackets (no id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaxBracket {
    pub region: Region,
    pub tax_type: TaxType,
    pub bracket_key: String,
    pub min_value: i32,
    pub max_value: Option<i32>,
    pub amount: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl NewTaxBracket {
    pub fn with_id(self, id: i64) -> TaxBracket {
        TaxBracket {
            id,
            region: self.region,
            tax_type: self.tax_type,
            bracket_key: self.bracket_key,
            min_value: self.min_value,
            max_value: self.max_value,
            amount: self.amount,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }

    /// True when the two value ranges share at least one integer.
    pub fn range_overlaps(&self, other: &TaxBracket) -> bool {
        let below_other_max = other.max_value.is_none_or(|max| self.min_value <= max);
        let above_other_min = self.max_value.is_none_or(|max| other.min_value <= max);
        below_other_max && above_other_min
    }
}

impl Versioned for NewTaxBracket {
    fn validity(&self) -> Validity {
        Validity {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}
