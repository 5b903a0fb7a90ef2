mod age_coefficient;
mod calculation;
mod indexation;
mod region;
mod rule;
mod tax_bracket;
mod tax_exemption;
mod tax_parameter;
mod user_reduction;
mod validity;
mod vehicle;

pub use age_coefficient::{AgeCoefficient, NewAgeCoefficient, ResolvedAgeCoefficient};
pub use calculation::{
    Breakdown, BreakdownValue, CalculationRequest, CalculationStatus, TaxCalculation,
    TaxCalculationPair, TaxOutcome, keys,
};
pub use indexation::{IndexationRequest, IndexationResult};
pub use region::{Region, TaxType};
pub use rule::{NewRuleVersion, RuleBatch, RuleClosure, RuleFamily, RuleKey, RuleRef, RuleVersion};
pub use tax_bracket::{NewTaxBracket, TaxBracket};
pub use tax_exemption::{NewTaxExemption, TaxExemption};
pub use tax_parameter::{NewTaxParameter, TaxParameter};
pub use user_reduction::{NewUserReduction, NewUserReductionType, UserReduction, UserReductionType};
pub use validity::{Validity, Versioned};
pub use vehicle::{EuroNorm, FirstRegistration, FuelType, Vehicle};
