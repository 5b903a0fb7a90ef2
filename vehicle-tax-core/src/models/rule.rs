//! Polymorphic view over the four versioned rule families.
//!
//! Brackets, parameters, age coefficients and exemptions share the same
//! lifecycle (a validity interval, immutable once superseded). [`RuleKey`]
//! names what is being looked up, [`RuleVersion`] is a stored row of any
//! family and [`NewRuleVersion`] a row about to be inserted.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{
    AgeCoefficient, NewAgeCoefficient, NewTaxBracket, NewTaxExemption, NewTaxParameter, Region,
    TaxBracket, TaxExemption, TaxParameter, TaxType, Validity, Versioned,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    Bracket,
    Parameter,
    AgeCoefficient,
    Exemption,
}

impl RuleFamily {
    pub const ALL: [RuleFamily; 4] = [
        Self::Bracket,
        Self::Parameter,
        Self::AgeCoefficient,
        Self::Exemption,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bracket => "bracket",
            Self::Parameter => "parameter",
            Self::AgeCoefficient => "age_coefficient",
            Self::Exemption => "exemption",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|family| family.as_str() == s)
    }

    /// Families whose values scale with indexation.
    pub fn is_indexable(&self) -> bool {
        matches!(self, Self::Bracket | Self::Parameter)
    }
}

impl fmt::Display for RuleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a lookup asks for within one `(region, tax_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", content = "key", rename_all = "snake_case")]
pub enum RuleKey {
    Bracket(String),
    Parameter(String),
    AgeCoefficient,
    Exemption(String),
}

impl RuleKey {
    pub fn bracket(key: impl Into<String>) -> Self {
        Self::Bracket(key.into())
    }

    pub fn parameter(key: impl Into<String>) -> Self {
        Self::Parameter(key.into())
    }

    pub fn exemption(condition: impl Into<String>) -> Self {
        Self::Exemption(condition.into())
    }

    pub fn family(&self) -> RuleFamily {
        match self {
            Self::Bracket(_) => RuleFamily::Bracket,
            Self::Parameter(_) => RuleFamily::Parameter,
            Self::AgeCoefficient => RuleFamily::AgeCoefficient,
            Self::Exemption(_) => RuleFamily::Exemption,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Bracket(key) | Self::Parameter(key) | Self::Exemption(key) => key,
            Self::AgeCoefficient => "age_coefficient",
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgeCoefficient => f.write_str("age_coefficient"),
            other => write!(f, "{} '{}'", other.family(), other.name()),
        }
    }
}

/// Identifies one stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleRef {
    pub family: RuleFamily,
    pub id: i64,
}

/// A stored rule row of any family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum RuleVersion {
    Bracket(TaxBracket),
    Parameter(TaxParameter),
    AgeCoefficient(AgeCoefficient),
    Exemption(TaxExemption),
}

impl RuleVersion {
    pub fn id(&self) -> i64 {
        match self {
            Self::Bracket(r) => r.id,
            Self::Parameter(r) => r.id,
            Self::AgeCoefficient(r) => r.id,
            Self::Exemption(r) => r.id,
        }
    }

    pub fn family(&self) -> RuleFamily {
        match self {
            Self::Bracket(_) => RuleFamily::Bracket,
            Self::Parameter(_) => RuleFamily::Parameter,
            Self::AgeCoefficient(_) => RuleFamily::AgeCoefficient,
            Self::Exemption(_) => RuleFamily::Exemption,
        }
    }

    pub fn rule_ref(&self) -> RuleRef {
        RuleRef {
            family: self.family(),
            id: self.id(),
        }
    }

    pub fn region(&self) -> Region {
        match self {
            Self::Bracket(r) => r.region,
            Self::Parameter(r) => r.region,
            Self::AgeCoefficient(r) => r.region,
            Self::Exemption(r) => r.region,
        }
    }

    pub fn tax_type(&self) -> TaxType {
        match self {
            Self::Bracket(r) => r.tax_type,
            Self::Parameter(r) => r.tax_type,
            Self::AgeCoefficient(r) => r.tax_type,
            Self::Exemption(r) => r.tax_type,
        }
    }

    pub fn key(&self) -> RuleKey {
        match self {
            Self::Bracket(r) => RuleKey::Bracket(r.bracket_key.clone()),
            Self::Parameter(r) => RuleKey::Parameter(r.param_key.clone()),
            Self::AgeCoefficient(_) => RuleKey::AgeCoefficient,
            Self::Exemption(r) => RuleKey::Exemption(r.condition_key.clone()),
        }
    }

    /// Amount, parameter value or coefficient; exemptions carry no value.
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Self::Bracket(r) => Some(r.amount),
            Self::Parameter(r) => Some(r.param_value),
            Self::AgeCoefficient(r) => Some(r.coefficient),
            Self::Exemption(_) => None,
        }
    }

    /// Same row closed at `valid_to`.
    pub fn closed_at(&self, valid_to: NaiveDate) -> Self {
        let mut closed = self.clone();
        match &mut closed {
            Self::Bracket(r) => r.valid_to = Some(valid_to),
            Self::Parameter(r) => r.valid_to = Some(valid_to),
            Self::AgeCoefficient(r) => r.valid_to = Some(valid_to),
            Self::Exemption(r) => r.valid_to = Some(valid_to),
        }
        closed
    }

    /// Successor with the value scaled by `rate`, for indexable families.
    pub fn indexed(&self, valid_from: NaiveDate, rate: Decimal) -> Option<NewRuleVersion> {
        match self {
            Self::Bracket(r) => Some(NewRuleVersion::Bracket(r.indexed(valid_from, rate))),
            Self::Parameter(r) => Some(NewRuleVersion::Parameter(r.indexed(valid_from, rate))),
            Self::AgeCoefficient(_) | Self::Exemption(_) => None,
        }
    }

    pub fn as_bracket(&self) -> Option<&TaxBracket> {
        match self {
            Self::Bracket(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_bracket(self) -> Option<TaxBracket> {
        match self {
            Self::Bracket(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_parameter(self) -> Option<TaxParameter> {
        match self {
            Self::Parameter(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_age_coefficient(self) -> Option<AgeCoefficient> {
        match self {
            Self::AgeCoefficient(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_exemption(self) -> Option<TaxExemption> {
        match self {
            Self::Exemption(r) => Some(r),
            _ => None,
        }
    }
}

impl Versioned for RuleVersion {
    fn validity(&self) -> Validity {
        match self {
            Self::Bracket(r) => r.validity(),
            Self::Parameter(r) => r.validity(),
            Self::AgeCoefficient(r) => r.validity(),
            Self::Exemption(r) => r.validity(),
        }
    }
}

/// A rule row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum NewRuleVersion {
    Bracket(NewTaxBracket),
    Parameter(NewTaxParameter),
    AgeCoefficient(NewAgeCoefficient),
    Exemption(NewTaxExemption),
}

impl NewRuleVersion {
    pub fn family(&self) -> RuleFamily {
        match self {
            Self::Bracket(_) => RuleFamily::Bracket,
            Self::Parameter(_) => RuleFamily::Parameter,
            Self::AgeCoefficient(_) => RuleFamily::AgeCoefficient,
            Self::Exemption(_) => RuleFamily::Exemption,
        }
    }

    pub fn region(&self) -> Region {
        match self {
            Self::Bracket(r) => r.region,
            Self::Parameter(r) => r.region,
            Self::AgeCoefficient(r) => r.region,
            Self::Exemption(r) => r.region,
        }
    }

    pub fn tax_type(&self) -> TaxType {
        match self {
            Self::Bracket(r) => r.tax_type,
            Self::Parameter(r) => r.tax_type,
            Self::AgeCoefficient(r) => r.tax_type,
            Self::Exemption(r) => r.tax_type,
        }
    }

    pub fn key(&self) -> RuleKey {
        match self {
            Self::Bracket(r) => RuleKey::Bracket(r.bracket_key.clone()),
            Self::Parameter(r) => RuleKey::Parameter(r.param_key.clone()),
            Self::AgeCoefficient(_) => RuleKey::AgeCoefficient,
            Self::Exemption(r) => RuleKey::Exemption(r.condition_key.clone()),
        }
    }

    pub fn with_id(self, id: i64) -> RuleVersion {
        match self {
            Self::Bracket(r) => RuleVersion::Bracket(r.with_id(id)),
            Self::Parameter(r) => RuleVersion::Parameter(r.with_id(id)),
            Self::AgeCoefficient(r) => RuleVersion::AgeCoefficient(r.with_id(id)),
            Self::Exemption(r) => RuleVersion::Exemption(r.with_id(id)),
        }
    }

    /// True when inserting `self` next to `existing` would make a lookup
    /// ambiguous: same family, region, tax type and key, overlapping
    /// validity, and (for brackets) overlapping value ranges or (for age
    /// coefficients) the same age.
    pub fn conflicts_with(&self, existing: &RuleVersion) -> bool {
        if self.family() != existing.family()
            || self.region() != existing.region()
            || self.tax_type() != existing.tax_type()
            || self.key() != existing.key()
            || !self.validity().overlaps(&existing.validity())
        {
            return false;
        }
        match (self, existing) {
            (Self::Bracket(new), RuleVersion::Bracket(old)) => new.range_overlaps(old),
            (Self::AgeCoefficient(new), RuleVersion::AgeCoefficient(old)) => {
                new.vehicle_age_years == old.vehicle_age_years
            }
            _ => true,
        }
    }
}

impl Versioned for NewRuleVersion {
    fn validity(&self) -> Validity {
        match self {
            Self::Bracket(r) => r.validity(),
            Self::Parameter(r) => r.validity(),
            Self::AgeCoefficient(r) => r.validity(),
            Self::Exemption(r) => r.validity(),
        }
    }
}

/// Closes an open row at `valid_to`; only succeeds while the row is still
/// open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleClosure {
    pub rule: RuleRef,
    pub valid_to: NaiveDate,
}

/// Closures and inserts committed atomically by
/// [`RuleStore::save_all`](crate::db::RuleStore::save_all). Closures are
/// applied before inserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBatch {
    pub closures: Vec<RuleClosure>,
    pub inserts: Vec<NewRuleVersion>,
}

impl RuleBatch {
    pub fn is_empty(&self) -> bool {
        self.closures.is_empty() && self.inserts.is_empty()
    }
}
