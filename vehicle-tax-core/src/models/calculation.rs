use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Region, TaxType, Vehicle};

/// Stable breakdown keys. Consumers read the breakdown by these names.
pub mod keys {
    pub const EXEMPTION_REASON: &str = "exemptionReason";

    pub const VEHICLE_AGE_YEARS: &str = "vehicleAgeYears";
    pub const AGE_COEFFICIENT: &str = "ageCoefficient";
    pub const AGE_COEFFICIENT_APPLIED_AGE: &str = "ageCoefficientAppliedAge";
    pub const BASE_AMOUNT: &str = "baseAmount";
    pub const AFTER_AGE_COEFFICIENT: &str = "afterAgeCoefficient";

    pub const POWER_KW: &str = "powerKw";
    pub const FISCAL_HP: &str = "fiscalHp";
    pub const DISPLACEMENT_CC: &str = "displacementCc";
    pub const FISCAL_HP_FROM_DISPLACEMENT: &str = "fiscalHpFromDisplacement";
    pub const MASS_KG: &str = "mmaKg";
    pub const BRACKET_AMOUNT: &str = "bracketAmount";
    pub const ENERGY_COEFFICIENT: &str = "energyCoefficient";
    pub const CO2_WLTP: &str = "co2Wltp";
    pub const CO2_NEDC: &str = "co2Nedc";
    pub const CO2_REFERENCE: &str = "co2Reference";
    pub const CO2_FACTOR: &str = "co2Factor";
    pub const MASS_REFERENCE: &str = "mmaReference";
    pub const MASS_FACTOR: &str = "mmaFactor";

    pub const AMOUNT_BY_FISCAL_HP: &str = "amountByFiscalHp";
    pub const AMOUNT_BY_POWER_KW: &str = "amountByPowerKw";
    pub const USED_CRITERIA: &str = "usedCriteria";
    pub const ELECTRIC_FIXED_AMOUNT: &str = "electricFixedAmount";
    pub const ELECTRIC_FIXED_NO_AGE_COEFFICIENT: &str = "electricFixedNoAgeCoef";
    pub const CNG_EXEMPT: &str = "cngExempt";

    pub const FORMULA_TYPE: &str = "formulaType";
    pub const EURO_NORM: &str = "euroNorm";
    pub const FUEL_FACTOR: &str = "fuelFactor_f";
    pub const LUCHTCOMPONENT: &str = "luchtcomponent_c";
    pub const WLTP_Q_FACTOR: &str = "wltp_q_factor";
    pub const CO2_CORRECTION_X: &str = "co2Correction_x";
    pub const STEP1_CO2_F_Q: &str = "step1_co2_f_q";
    pub const STEP1_CO2_F_X: &str = "step1_co2_f_x";
    pub const STEP2_DIVIDED: &str = "step2_divided";
    pub const STEP3_POWER6: &str = "step3_power6";
    pub const STEP4_TIMES_CONSTANT: &str = "step4_times_constant";
    pub const STEP5_PLUS_LUCHTCOMPONENT: &str = "step5_plus_luchtcomponent";

    pub const CO2_ADJUSTMENT: &str = "co2Adjustment";
    pub const LPG_REDUCTION: &str = "lpgReduction";
    pub const LPG_SUPPLEMENT: &str = "lpgSupplement";

    pub const AMOUNT_BEFORE_CLAMPING: &str = "amountBeforeClamping";
    pub const MIN_AMOUNT: &str = "minAmount";
    pub const MAX_AMOUNT: &str = "maxAmount";
    pub const MIN_AMOUNT_APPLIED: &str = "minAmountApplied";
    pub const MAX_AMOUNT_APPLIED: &str = "maxAmountApplied";

    /// Key under which a claimed reduction's deduction is recorded.
    pub fn reduction(code: &str) -> String {
        format!("reduction:{code}")
    }
}

/// One recorded quantity of a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BreakdownValue {
    Flag(bool),
    Integer(i64),
    Amount(Decimal),
    Text(String),
}

impl From<Decimal> for BreakdownValue {
    fn from(value: Decimal) -> Self {
        Self::Amount(value)
    }
}

impl From<i32> for BreakdownValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for BreakdownValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for BreakdownValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for BreakdownValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BreakdownValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Every quantity that contributed to an amount, by key. Ordered so that
/// rendered output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Breakdown(BTreeMap<String, BreakdownValue>);

impl Breakdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: impl Into<String>, value: impl Into<BreakdownValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&BreakdownValue> {
        self.0.get(key)
    }

    pub fn amount(&self, key: &str) -> Option<Decimal> {
        match self.0.get(key)? {
            BreakdownValue::Amount(value) => Some(*value),
            BreakdownValue::Integer(value) => Some(Decimal::from(*value)),
            _ => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            BreakdownValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            BreakdownValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Missing flags read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(BreakdownValue::Flag(true)))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BreakdownValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Input of a single calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub vehicle: Vehicle,
    pub region: Region,
    pub tax_type: TaxType,
    pub as_of: NaiveDate,
    /// Reduction type codes the taxpayer claims.
    #[serde(default)]
    pub claimed_reductions: Vec<String>,
}

/// Result of a single calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCalculation {
    pub region: Region,
    pub tax_type: TaxType,
    pub as_of: NaiveDate,
    /// Rounded half-up to two decimals.
    pub amount: Decimal,
    pub is_exempt: bool,
    pub exemption_reason: Option<String>,
    /// Codes of the claimed reductions that were actually deducted.
    pub applied_reductions: Vec<String>,
    pub breakdown: Breakdown,
}

/// How one tax type of a [`TaxCalculationPair`] turned out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaxOutcome {
    Calculated(TaxCalculation),
    /// The vehicle lacks attributes this tax type needs.
    InsufficientData { missing: Vec<String> },
    /// A mandatory rule has no version in force.
    NotCalculable { reason: String },
}

impl TaxOutcome {
    pub fn calculation(&self) -> Option<&TaxCalculation> {
        match self {
            Self::Calculated(calc) => Some(calc),
            _ => None,
        }
    }

    pub fn is_calculated(&self) -> bool {
        matches!(self, Self::Calculated(_))
    }
}

/// How many of the two tax types could be calculated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationStatus {
    Complete,
    Partial,
    Insufficient,
}

impl CalculationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Insufficient => "insufficient",
        }
    }
}

/// TMC and annual tax of the same vehicle, each calculated independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCalculationPair {
    pub region: Region,
    pub as_of: NaiveDate,
    pub status: CalculationStatus,
    pub tmc: TaxOutcome,
    pub annual: TaxOutcome,
}

impl TaxCalculationPair {
    pub fn new(region: Region, as_of: NaiveDate, tmc: TaxOutcome, annual: TaxOutcome) -> Self {
        let status = match (tmc.is_calculated(), annual.is_calculated()) {
            (true, true) => CalculationStatus::Complete,
            (false, false) => CalculationStatus::Insufficient,
            _ => CalculationStatus::Partial,
        };
        Self {
            region,
            as_of,
            status,
            tmc,
            annual,
        }
    }

    pub fn tmc(&self) -> Option<&TaxCalculation> {
        self.tmc.calculation()
    }

    pub fn annual(&self) -> Option<&TaxCalculation> {
        self.annual.calculation()
    }
}
