use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::repository::{ReductionStore, RepositoryError, RuleStore};
use crate::models::{
    NewRuleVersion, NewUserReduction, NewUserReductionType, Region, RuleBatch, RuleFamily,
    RuleKey, RuleVersion, TaxType, UserReduction, UserReductionType,
};

type CacheKey = (Region, TaxType, RuleKey, NaiveDate);

/// Entries kept before the oldest are evicted. Each distinct as-of date adds
/// its own entries, so a long-lived process would otherwise grow forever.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct CacheState {
    /// Bumped by every invalidation. A lookup that started under an older
    /// generation must not populate the map.
    generation: u64,
    entries: HashMap<CacheKey, Vec<RuleVersion>>,
    /// Insertion order of `entries`, oldest first.
    order: VecDeque<CacheKey>,
}

/// Read-through cache of [`RuleStore::find_valid`] in front of another store.
///
/// Every write that goes through the cache clears it before returning, and
/// [`CachedRuleStore::invalidate`] clears it for writes made elsewhere.
/// At most `capacity` lookups are kept; the oldest go first.
#[derive(Debug)]
pub struct CachedRuleStore<S> {
    inner: S,
    capacity: usize,
    state: RwLock<CacheState>,
}

impl<S> CachedRuleStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drops every cached entry.
    pub fn invalidate(&self) {
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.generation += 1;
        state.entries.clear();
        state.order.clear();
        debug!(generation = state.generation, "rule cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| state.entries.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn generation(&self) -> u64 {
        self.state
            .read()
            .map(|state| state.generation)
            .unwrap_or_default()
    }

    fn lookup(&self, key: &CacheKey) -> Option<Vec<RuleVersion>> {
        self.state.read().ok()?.entries.get(key).cloned()
    }

    fn populate(&self, key: CacheKey, generation: u64, rules: Vec<RuleVersion>) {
        let Ok(mut state) = self.state.write() else {
            return;
        };
        if state.generation != generation {
            return;
        }
        if state.entries.insert(key.clone(), rules).is_none() {
            state.order.push_back(key);
        }
        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
    }
}

#[async_trait]
impl<S: RuleStore> RuleStore for CachedRuleStore<S> {
    async fn find_valid(
        &self,
        region: Region,
        tax_type: TaxType,
        key: &RuleKey,
        date: NaiveDate,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        let cache_key = (region, tax_type, key.clone(), date);
        if let Some(hit) = self.lookup(&cache_key) {
            return Ok(hit);
        }
        let generation = self.generation();
        let rules = self.inner.find_valid(region, tax_type, key, date).await?;
        self.populate(cache_key, generation, rules.clone());
        Ok(rules)
    }

    async fn find_all_open(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        self.inner.find_all_open(family, region, tax_type).await
    }

    async fn list_rules(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        self.inner.list_rules(family, region, tax_type).await
    }

    async fn save(&self, rule: NewRuleVersion) -> Result<RuleVersion, RepositoryError> {
        let result = self.inner.save(rule).await;
        self.invalidate();
        result
    }

    async fn save_all(&self, batch: RuleBatch) -> Result<Vec<RuleVersion>, RepositoryError> {
        let result = self.inner.save_all(batch).await;
        self.invalidate();
        result
    }
}

#[async_trait]
impl<S: ReductionStore> ReductionStore for CachedRuleStore<S> {
    async fn list_reduction_types(&self) -> Result<Vec<UserReductionType>, RepositoryError> {
        self.inner.list_reduction_types().await
    }

    async fn find_valid_reductions(
        &self,
        region: Region,
        tax_type: TaxType,
        code: &str,
        date: NaiveDate,
    ) -> Result<Vec<UserReduction>, RepositoryError> {
        self.inner.find_valid_reductions(region, tax_type, code, date).await
    }

    async fn save_reduction_type(
        &self,
        reduction_type: NewUserReductionType,
    ) -> Result<UserReductionType, RepositoryError> {
        let result = self.inner.save_reduction_type(reduction_type).await;
        self.invalidate();
        result
    }

    async fn save_reduction(
        &self,
        reduction: NewUserReduction,
    ) -> Result<UserReduction, RepositoryError> {
        let result = self.inner.save_reduction(reduction).await;
        self.invalidate();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::db::MemoryRuleStore;
    use crate::models::{NewTaxParameter, RuleClosure, Versioned};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Counts `find_valid` calls that reach the wrapped store.
    struct CountingStore {
        inner: MemoryRuleStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl RuleStore for CountingStore {
        async fn find_valid(
            &self,
            region: Region,
            tax_type: TaxType,
            key: &RuleKey,
            date: NaiveDate,
        ) -> Result<Vec<RuleVersion>, RepositoryError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.find_valid(region, tax_type, key, date).await
        }
        async fn find_all_open(
            &self,
            family: RuleFamily,
            region: Option<Region>,
            tax_type: Option<TaxType>,
        ) -> Result<Vec<RuleVersion>, RepositoryError> {
            self.inner.find_all_open(family, region, tax_type).await
        }
        async fn list_rules(
            &self,
            family: RuleFamily,
            region: Option<Region>,
            tax_type: Option<TaxType>,
        ) -> Result<Vec<RuleVersion>, RepositoryError> {
            self.inner.list_rules(family, region, tax_type).await
        }
        async fn save(&self, rule: NewRuleVersion) -> Result<RuleVersion, RepositoryError> {
            self.inner.save(rule).await
        }
        async fn save_all(&self, batch: RuleBatch) -> Result<Vec<RuleVersion>, RepositoryError> {
            self.inner.save_all(batch).await
        }
    }

    fn min_amount(value: rust_decimal::Decimal, valid_from: NaiveDate) -> NewRuleVersion {
        NewRuleVersion::Parameter(NewTaxParameter {
            region: Region::Brussels,
            tax_type: TaxType::Tmc,
            param_key: "min_amount".into(),
            param_value: value,
            valid_from,
            valid_to: None,
        })
    }

    type Cached = CachedRuleStore<Arc<CountingStore>>;

    async fn counting_with_min_amount() -> (Arc<CountingStore>, RuleVersion) {
        let counting = Arc::new(CountingStore {
            inner: MemoryRuleStore::new(),
            reads: AtomicUsize::new(0),
        });
        let saved = counting
            .save(min_amount(dec!(74.29), date(2024, 7, 1)))
            .await
            .unwrap();
        (counting, saved)
    }

    async fn cached_with_min_amount() -> (Cached, Arc<CountingStore>, RuleVersion) {
        let (counting, saved) = counting_with_min_amount().await;
        (CachedRuleStore::new(counting.clone()), counting, saved)
    }

    async fn min_amount_on(cache: &Cached, as_of: NaiveDate) -> Vec<RuleVersion> {
        cache
            .find_valid(
                Region::Brussels,
                TaxType::Tmc,
                &RuleKey::parameter("min_amount"),
                as_of,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn repeated_lookup_hits_the_cache() {
        let (cache, counting, _) = cached_with_min_amount().await;

        let first = min_amount_on(&cache, date(2025, 1, 1)).await;
        let second = min_amount_on(&cache, date(2025, 1, 1)).await;

        assert_eq!(first, second);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn write_through_cache_clears_it() {
        let (cache, _, saved) = cached_with_min_amount().await;
        min_amount_on(&cache, date(2026, 8, 1)).await;
        assert!(!cache.is_empty());

        cache
            .save_all(RuleBatch {
                closures: vec![RuleClosure {
                    rule: saved.rule_ref(),
                    valid_to: date(2026, 6, 30),
                }],
                inserts: vec![min_amount(dec!(75.78), date(2026, 7, 1))],
            })
            .await
            .unwrap();
        assert!(cache.is_empty());

        let after = min_amount_on(&cache, date(2026, 8, 1)).await;
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].value(), Some(dec!(75.78)));
        assert_eq!(after[0].validity().valid_from, date(2026, 7, 1));
    }

    #[tokio::test]
    async fn invalidate_drops_entries_written_behind_the_cache() {
        let (cache, counting, _) = cached_with_min_amount().await;
        min_amount_on(&cache, date(2025, 1, 1)).await;

        cache.invalidate();
        min_amount_on(&cache, date(2025, 1, 1)).await;
        assert_eq!(counting.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oldest_lookups_are_evicted_past_capacity() {
        let (counting, _) = counting_with_min_amount().await;
        let cache = CachedRuleStore::with_capacity(counting.clone(), 2);

        for day in 1..=3 {
            min_amount_on(&cache, date(2025, 1, day)).await;
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 3);

        // The newest two are still cached, the first was evicted.
        min_amount_on(&cache, date(2025, 1, 3)).await;
        min_amount_on(&cache, date(2025, 1, 2)).await;
        assert_eq!(counting.reads.load(Ordering::SeqCst), 3);
        min_amount_on(&cache, date(2025, 1, 1)).await;
        assert_eq!(counting.reads.load(Ordering::SeqCst), 4);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn stale_generation_does_not_populate() {
        let cache = CachedRuleStore::new(MemoryRuleStore::new());
        let generation = cache.generation();
        cache.invalidate();
        cache.populate(
            (Region::Wallonia, TaxType::Tmc, RuleKey::AgeCoefficient, date(2025, 1, 1)),
            generation,
            Vec::new(),
        );
        assert!(cache.is_empty());
    }
}
