use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::factory::{DbConfig, RepositoryFactory};
use super::repository::{ReductionStore, RepositoryError, RuleStore, TaxRuleStore};
use crate::models::{
    NewRuleVersion, NewUserReduction, NewUserReductionType, Region, RuleBatch, RuleFamily,
    RuleKey, RuleVersion, TaxType, UserReduction, UserReductionType, Versioned,
};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    rules: Vec<RuleVersion>,
    reduction_types: Vec<UserReductionType>,
    reductions: Vec<UserReduction>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Rule and reduction store held in process memory.
///
/// A single lock guards the whole state, so a [`RuleStore::save_all`] batch
/// is applied without any reader observing a partial result.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    state: RwLock<MemoryState>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .read()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .write()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".into()))
    }
}

fn matches_filters(rule: &RuleVersion, region: Option<Region>, tax_type: Option<TaxType>) -> bool {
    region.is_none_or(|r| rule.region() == r) && tax_type.is_none_or(|t| rule.tax_type() == t)
}

fn check_insertable(rules: &[RuleVersion], rule: &NewRuleVersion) -> Result<(), RepositoryError> {
    if rule.validity().is_empty() {
        return Err(RepositoryError::Database(format!(
            "{} ends before it starts",
            rule.key()
        )));
    }
    match rules.iter().find(|existing| rule.conflicts_with(existing)) {
        Some(existing) => Err(RepositoryError::Overlap(format!(
            "{} for {}/{} overlaps {} #{}",
            rule.key(),
            rule.region(),
            rule.tax_type(),
            existing.family(),
            existing.id()
        ))),
        None => Ok(()),
    }
}

fn apply_batch(
    state: &mut MemoryState,
    batch: RuleBatch,
) -> Result<Vec<RuleVersion>, RepositoryError> {
    for closure in &batch.closures {
        let row = state
            .rules
            .iter_mut()
            .find(|rule| rule.rule_ref() == closure.rule)
            .ok_or(RepositoryError::NotFound)?;
        if !row.validity().is_open() {
            return Err(RepositoryError::Conflict(format!(
                "{} #{} is no longer open",
                closure.rule.family, closure.rule.id
            )));
        }
        let closed = row.closed_at(closure.valid_to);
        if closed.validity().is_empty() {
            return Err(RepositoryError::Database(format!(
                "closing {} #{} at {} precedes its start",
                closure.rule.family, closure.rule.id, closure.valid_to
            )));
        }
        *row = closed;
    }

    let mut inserted = Vec::with_capacity(batch.inserts.len());
    for rule in batch.inserts {
        check_insertable(&state.rules, &rule)?;
        let id = state.allocate_id();
        let version = rule.with_id(id);
        state.rules.push(version.clone());
        inserted.push(version);
    }
    Ok(inserted)
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn find_valid(
        &self,
        region: Region,
        tax_type: TaxType,
        key: &RuleKey,
        date: NaiveDate,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        let state = self.read()?;
        Ok(state
            .rules
            .iter()
            .filter(|rule| {
                rule.region() == region
                    && rule.tax_type() == tax_type
                    && &rule.key() == key
                    && rule.is_valid_on(date)
            })
            .cloned()
            .collect())
    }

    async fn find_all_open(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        let state = self.read()?;
        Ok(state
            .rules
            .iter()
            .filter(|rule| {
                rule.family() == family
                    && rule.validity().is_open()
                    && matches_filters(rule, region, tax_type)
            })
            .cloned()
            .collect())
    }

    async fn list_rules(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        let state = self.read()?;
        Ok(state
            .rules
            .iter()
            .filter(|rule| rule.family() == family && matches_filters(rule, region, tax_type))
            .cloned()
            .collect())
    }

    async fn save(&self, rule: NewRuleVersion) -> Result<RuleVersion, RepositoryError> {
        let mut state = self.write()?;
        check_insertable(&state.rules, &rule)?;
        let id = state.allocate_id();
        let version = rule.with_id(id);
        state.rules.push(version.clone());
        Ok(version)
    }

    async fn save_all(&self, batch: RuleBatch) -> Result<Vec<RuleVersion>, RepositoryError> {
        let mut state = self.write()?;
        // Work on a copy so a failing batch leaves the store untouched.
        let mut staged = MemoryState {
            next_id: state.next_id,
            rules: state.rules.clone(),
            reduction_types: Vec::new(),
            reductions: Vec::new(),
        };
        let inserted = apply_batch(&mut staged, batch)?;
        state.next_id = staged.next_id;
        state.rules = staged.rules;
        Ok(inserted)
    }
}

#[async_trait]
impl ReductionStore for MemoryRuleStore {
    async fn list_reduction_types(&self) -> Result<Vec<UserReductionType>, RepositoryError> {
        let mut types = self.read()?.reduction_types.clone();
        types.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(types)
    }

    async fn find_valid_reductions(
        &self,
        region: Region,
        tax_type: TaxType,
        code: &str,
        date: NaiveDate,
    ) -> Result<Vec<UserReduction>, RepositoryError> {
        let state = self.read()?;
        Ok(state
            .reductions
            .iter()
            .filter(|r| {
                r.region == region
                    && r.tax_type == tax_type
                    && r.reduction_type_code == code
                    && r.is_valid_on(date)
            })
            .cloned()
            .collect())
    }

    async fn save_reduction_type(
        &self,
        reduction_type: NewUserReductionType,
    ) -> Result<UserReductionType, RepositoryError> {
        let mut state = self.write()?;
        if state.reduction_types.iter().any(|t| t.code == reduction_type.code) {
            return Err(RepositoryError::Database(format!(
                "reduction type '{}' already exists",
                reduction_type.code
            )));
        }
        let saved = UserReductionType {
            id: state.allocate_id(),
            code: reduction_type.code,
            description: reduction_type.description,
        };
        state.reduction_types.push(saved.clone());
        Ok(saved)
    }

    async fn save_reduction(
        &self,
        reduction: NewUserReduction,
    ) -> Result<UserReduction, RepositoryError> {
        let mut state = self.write()?;
        if !state
            .reduction_types
            .iter()
            .any(|t| t.code == reduction.reduction_type_code)
        {
            return Err(RepositoryError::NotFound);
        }
        let validity = reduction.validity();
        let overlapping = state.reductions.iter().any(|existing| {
            existing.region == reduction.region
                && existing.tax_type == reduction.tax_type
                && existing.reduction_type_code == reduction.reduction_type_code
                && existing.validity().overlaps(&validity)
        });
        if overlapping {
            return Err(RepositoryError::Overlap(format!(
                "reduction '{}' for {}/{}",
                reduction.reduction_type_code, reduction.region, reduction.tax_type
            )));
        }
        let id = state.allocate_id();
        let saved = reduction.with_id(id);
        state.reductions.push(saved.clone());
        Ok(saved)
    }
}

/// Registers the in-memory store under the `memory` backend name. The
/// connection string is ignored; every call returns an empty store.
pub struct MemoryRepositoryFactory;

#[async_trait]
impl RepositoryFactory for MemoryRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, _config: &DbConfig) -> Result<Box<dyn TaxRuleStore>, RepositoryError> {
        Ok(Box::new(MemoryRuleStore::new()))
    }
}
