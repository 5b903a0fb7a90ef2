use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

pub use crate::error::RepositoryError;
use crate::models::{
    NewRuleVersion, NewUserReduction, NewUserReductionType, Region, RuleBatch, RuleFamily,
    RuleKey, RuleVersion, TaxType, UserReduction, UserReductionType,
};

/// Versioned storage of brackets, parameters, age coefficients and
/// exemptions.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Every version of `key` in `(region, tax_type)` whose validity
    /// contains `date`. For bracket keys this is every value range; for age
    /// coefficients every age.
    async fn find_valid(
        &self,
        region: Region,
        tax_type: TaxType,
        key: &RuleKey,
        date: NaiveDate,
    ) -> Result<Vec<RuleVersion>, RepositoryError>;

    /// Open-ended rows of one family, optionally filtered.
    async fn find_all_open(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError>;

    /// Every row of one family, historical ones included.
    async fn list_rules(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError>;

    /// Inserts one version.
    ///
    /// # Errors
    /// * [`RepositoryError::Overlap`] when a version of the same rule is
    ///   already valid on one of the new version's days.
    async fn save(&self, rule: NewRuleVersion) -> Result<RuleVersion, RepositoryError>;

    /// Applies every closure, then every insert, as one atomic unit.
    /// Returns the inserted versions in input order.
    ///
    /// # Errors
    /// * [`RepositoryError::Conflict`] when a closed row is no longer open.
    /// * [`RepositoryError::NotFound`] when a closed row does not exist.
    /// * [`RepositoryError::Overlap`] as for [`RuleStore::save`].
    ///
    /// Nothing is written when any of these is returned.
    async fn save_all(&self, batch: RuleBatch) -> Result<Vec<RuleVersion>, RepositoryError>;
}

/// Storage of user reduction types and their versioned values.
#[async_trait]
pub trait ReductionStore: Send + Sync {
    async fn list_reduction_types(&self) -> Result<Vec<UserReductionType>, RepositoryError>;

    async fn find_valid_reductions(
        &self,
        region: Region,
        tax_type: TaxType,
        code: &str,
        date: NaiveDate,
    ) -> Result<Vec<UserReduction>, RepositoryError>;

    async fn save_reduction_type(
        &self,
        reduction_type: NewUserReductionType,
    ) -> Result<UserReductionType, RepositoryError>;

    /// # Errors
    /// * [`RepositoryError::NotFound`] when the reduction type code is unknown.
    /// * [`RepositoryError::Overlap`] when a value for the same code is
    ///   already valid on one of the new value's days.
    async fn save_reduction(
        &self,
        reduction: NewUserReduction,
    ) -> Result<UserReduction, RepositoryError>;
}

/// Everything the engine reads and writes. Implemented for every type that
/// implements both stores.
pub trait TaxRuleStore: RuleStore + ReductionStore {}

impl<T: RuleStore + ReductionStore + ?Sized> TaxRuleStore for T {}

#[async_trait]
impl<T: RuleStore + ?Sized> RuleStore for Arc<T> {
    async fn find_valid(
        &self,
        region: Region,
        tax_type: TaxType,
        key: &RuleKey,
        date: NaiveDate,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        (**self).find_valid(region, tax_type, key, date).await
    }

    async fn find_all_open(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        (**self).find_all_open(family, region, tax_type).await
    }

    async fn list_rules(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        (**self).list_rules(family, region, tax_type).await
    }

    async fn save(&self, rule: NewRuleVersion) -> Result<RuleVersion, RepositoryError> {
        (**self).save(rule).await
    }

    async fn save_all(&self, batch: RuleBatch) -> Result<Vec<RuleVersion>, RepositoryError> {
        (**self).save_all(batch).await
    }
}

#[async_trait]
impl<T: ReductionStore + ?Sized> ReductionStore for Arc<T> {
    async fn list_reduction_types(&self) -> Result<Vec<UserReductionType>, RepositoryError> {
        (**self).list_reduction_types().await
    }

    async fn find_valid_reductions(
        &self,
        region: Region,
        tax_type: TaxType,
        code: &str,
        date: NaiveDate,
    ) -> Result<Vec<UserReduction>, RepositoryError> {
        (**self).find_valid_reductions(region, tax_type, code, date).await
    }

    async fn save_reduction_type(
        &self,
        reduction_type: NewUserReductionType,
    ) -> Result<UserReductionType, RepositoryError> {
        (**self).save_reduction_type(reduction_type).await
    }

    async fn save_reduction(
        &self,
        reduction: NewUserReduction,
    ) -> Result<UserReduction, RepositoryError> {
        (**self).save_reduction(reduction).await
    }
}
