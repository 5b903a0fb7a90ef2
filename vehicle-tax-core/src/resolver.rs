//! Temporal rule resolution.
//!
//! Every lookup asks the store for the versions valid on the as-of date and
//! then insists on exactly one candidate: two candidates mean the rule
//! tables are inconsistent, and the resolver refuses to pick one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use tracing::trace;

use crate::db::{RepositoryError, TaxRuleStore};
use crate::error::TaxError;
use crate::models::{
    AgeCoefficient, Region, ResolvedAgeCoefficient, RuleKey, RuleVersion, TaxBracket,
    TaxExemption, TaxParameter, TaxType, UserReduction, Versioned,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound on every single store call.
    pub store_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// Whole years between `registration` and `as_of`, never negative.
pub fn vehicle_age_years(registration: NaiveDate, as_of: NaiveDate) -> i32 {
    let mut years = as_of.year() - registration.year();
    if (as_of.month(), as_of.day()) < (registration.month(), registration.day()) {
        years -= 1;
    }
    years.max(0)
}

/// Runs one store call, turning an elapsed `timeout` into
/// [`TaxError::StoreUnavailable`].
pub(crate) async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, RepositoryError>>,
) -> Result<T, TaxError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(TaxError::from),
        Err(_) => Err(TaxError::StoreUnavailable(format!(
            "rule store did not answer within {timeout:?}"
        ))),
    }
}

/// Picks the single candidate among `candidates` or fails.
///
/// # Arguments
/// * `candidates` - versions to choose from; filtered again on `as_of`
/// * `matches` - extra predicate (value range for brackets)
/// * `ambiguity` - builds the error for more than one match
///
/// # Returns
/// `Ok(None)` when nothing matches, `Ok(Some(_))` for exactly one match,
/// and [`TaxError::AmbiguousRuleVersion`] otherwise.
fn select_single<T: Versioned>(
    candidates: Vec<T>,
    as_of: NaiveDate,
    matches: impl Fn(&T) -> bool,
    ambiguity: impl FnOnce(usize) -> TaxError,
) -> Result<Option<T>, TaxError> {
    let mut found: Vec<T> = candidates
        .into_iter()
        .filter(|candidate| candidate.is_valid_on(as_of) && matches(candidate))
        .collect();
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(ambiguity(count)),
    }
}

/// Resolves rules in force on a given date through a [`TaxRuleStore`].
#[derive(Clone)]
pub struct RuleResolver {
    store: Arc<dyn TaxRuleStore>,
    config: ResolverConfig,
}

impl RuleResolver {
    pub fn new(store: Arc<dyn TaxRuleStore>) -> Self {
        Self::with_config(store, ResolverConfig::default())
    }

    pub fn with_config(store: Arc<dyn TaxRuleStore>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> ResolverConfig {
        self.config
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, TaxError> {
        bounded(self.config.store_timeout, call).await
    }

    async fn candidates(
        &self,
        region: Region,
        tax_type: TaxType,
        key: &RuleKey,
        as_of: NaiveDate,
    ) -> Result<Vec<RuleVersion>, TaxError> {
        self.guarded(self.store.find_valid(region, tax_type, key, as_of))
            .await
    }

    fn ambiguous(
        region: Region,
        tax_type: TaxType,
        rule: String,
        date: NaiveDate,
    ) -> impl FnOnce(usize) -> TaxError {
        move |count| TaxError::AmbiguousRuleVersion {
            region,
            tax_type,
            rule,
            date,
            count,
        }
    }

    fn not_found(region: Region, tax_type: TaxType, rule: String, date: NaiveDate) -> TaxError {
        TaxError::NotFound {
            region,
            tax_type,
            rule,
            date,
        }
    }

    /// Exact-key lookup of any family except brackets and age coefficients,
    /// whose lookups also depend on a value.
    pub async fn resolve(
        &self,
        region: Region,
        tax_type: TaxType,
        key: &RuleKey,
        as_of: NaiveDate,
    ) -> Result<Option<RuleVersion>, TaxError> {
        let candidates = self.candidates(region, tax_type, key, as_of).await?;
        select_single(
            candidates,
            as_of,
            |rule| &rule.key() == key,
            Self::ambiguous(region, tax_type, key.to_string(), as_of),
        )
    }

    pub async fn parameter(
        &self,
        region: Region,
        tax_type: TaxType,
        param_key: &str,
        as_of: NaiveDate,
    ) -> Result<Option<TaxParameter>, TaxError> {
        let key = RuleKey::parameter(param_key);
        let candidates: Vec<TaxParameter> = self
            .candidates(region, tax_type, &key, as_of)
            .await?
            .into_iter()
            .filter_map(RuleVersion::into_parameter)
            .collect();
        let found = select_single(
            candidates,
            as_of,
            |p| p.param_key == param_key,
            Self::ambiguous(region, tax_type, key.to_string(), as_of),
        )?;
        trace!(%region, %tax_type, param_key, found = found.is_some(), "parameter lookup");
        Ok(found)
    }

    /// Like [`RuleResolver::parameter`] but a missing parameter is a
    /// [`TaxError::NotFound`].
    pub async fn required_parameter(
        &self,
        region: Region,
        tax_type: TaxType,
        param_key: &str,
        as_of: NaiveDate,
    ) -> Result<Decimal, TaxError> {
        self.parameter(region, tax_type, param_key, as_of)
            .await?
            .map(|p| p.param_value)
            .ok_or_else(|| {
                Self::not_found(
                    region,
                    tax_type,
                    RuleKey::parameter(param_key).to_string(),
                    as_of,
                )
            })
    }

    pub async fn bracket(
        &self,
        region: Region,
        tax_type: TaxType,
        bracket_key: &str,
        value: i32,
        as_of: NaiveDate,
    ) -> Result<Option<TaxBracket>, TaxError> {
        let key = RuleKey::bracket(bracket_key);
        let candidates: Vec<TaxBracket> = self
            .candidates(region, tax_type, &key, as_of)
            .await?
            .into_iter()
            .filter_map(RuleVersion::into_bracket)
            .collect();
        select_single(
            candidates,
            as_of,
            |b| b.bracket_key == bracket_key && b.covers(value),
            Self::ambiguous(region, tax_type, format!("{key} for value {value}"), as_of),
        )
    }

    pub async fn required_bracket(
        &self,
        region: Region,
        tax_type: TaxType,
        bracket_key: &str,
        value: i32,
        as_of: NaiveDate,
    ) -> Result<TaxBracket, TaxError> {
        self.bracket(region, tax_type, bracket_key, value, as_of)
            .await?
            .ok_or_else(|| {
                Self::not_found(
                    region,
                    tax_type,
                    format!("{} for value {value}", RuleKey::bracket(bracket_key)),
                    as_of,
                )
            })
    }

    pub async fn exemption(
        &self,
        region: Region,
        tax_type: TaxType,
        condition_key: &str,
        as_of: NaiveDate,
    ) -> Result<Option<TaxExemption>, TaxError> {
        let key = RuleKey::exemption(condition_key);
        let candidates: Vec<TaxExemption> = self
            .candidates(region, tax_type, &key, as_of)
            .await?
            .into_iter()
            .filter_map(RuleVersion::into_exemption)
            .collect();
        select_single(
            candidates,
            as_of,
            |e| e.condition_key == condition_key,
            Self::ambiguous(region, tax_type, key.to_string(), as_of),
        )
    }

    /// Coefficient for a vehicle of `vehicle_age_years` whole years.
    ///
    /// An age above the highest defined age uses the highest defined age's
    /// coefficient. An age below the lowest defined age, or one falling in a
    /// gap of the table, is a [`TaxError::NotFound`].
    pub async fn age_coefficient(
        &self,
        region: Region,
        tax_type: TaxType,
        vehicle_age_years: i32,
        as_of: NaiveDate,
    ) -> Result<ResolvedAgeCoefficient, TaxError> {
        let rows: Vec<AgeCoefficient> = self
            .candidates(region, tax_type, &RuleKey::AgeCoefficient, as_of)
            .await?
            .into_iter()
            .filter_map(RuleVersion::into_age_coefficient)
            .filter(|row| row.is_valid_on(as_of))
            .collect();

        let highest = rows.iter().map(|row| row.vehicle_age_years).max();
        let applied_age = match highest {
            Some(max) if vehicle_age_years > max => max,
            _ => vehicle_age_years,
        };

        let rule = format!("age_coefficient for age {applied_age}");
        let row = select_single(
            rows,
            as_of,
            |row| row.vehicle_age_years == applied_age,
            Self::ambiguous(region, tax_type, rule.clone(), as_of),
        )?
        .ok_or_else(|| Self::not_found(region, tax_type, rule, as_of))?;

        Ok(ResolvedAgeCoefficient {
            vehicle_age_years,
            applied_age_years: row.vehicle_age_years,
            coefficient: row.coefficient,
        })
    }

    /// Value of a claimed reduction in force on `as_of`, if any.
    pub async fn resolve_reduction(
        &self,
        region: Region,
        tax_type: TaxType,
        code: &str,
        as_of: NaiveDate,
    ) -> Result<Option<UserReduction>, TaxError> {
        let candidates = self
            .guarded(self.store.find_valid_reductions(region, tax_type, code, as_of))
            .await?;
        select_single(
            candidates,
            as_of,
            |r| r.reduction_type_code == code,
            Self::ambiguous(region, tax_type, format!("reduction '{code}'"), as_of),
        )
    }
}
