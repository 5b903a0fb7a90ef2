use std::sync::Arc;

use chrono::NaiveDate;

use crate::calculations::TaxCalculator;
use crate::db::TaxRuleStore;
use crate::error::TaxError;
use crate::indexation::Indexer;
use crate::models::{
    CalculationRequest, IndexationRequest, IndexationResult, Region, TaxCalculation,
    TaxCalculationPair, Vehicle,
};
use crate::resolver::{ResolverConfig, RuleResolver};

/// Entry point for callers: calculations and indexation over one store.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct TaxEngine {
    calculator: TaxCalculator,
    indexer: Indexer,
}

impl TaxEngine {
    pub fn new(store: Arc<dyn TaxRuleStore>) -> Self {
        Self::with_config(store, ResolverConfig::default())
    }

    pub fn with_config(store: Arc<dyn TaxRuleStore>, config: ResolverConfig) -> Self {
        let indexer = Indexer::with_timeout(store.clone(), config.store_timeout);
        let calculator = TaxCalculator::new(RuleResolver::with_config(store, config));
        Self {
            calculator,
            indexer,
        }
    }

    pub fn calculator(&self) -> &TaxCalculator {
        &self.calculator
    }

    pub async fn calculate_tax(
        &self,
        request: &CalculationRequest,
    ) -> Result<TaxCalculation, TaxError> {
        self.calculator
            .calculate_with_reductions(
                &request.vehicle,
                request.region,
                request.tax_type,
                request.as_of,
                &request.claimed_reductions,
            )
            .await
    }

    pub async fn calculate_both(
        &self,
        vehicle: &Vehicle,
        region: Region,
        as_of: NaiveDate,
        claimed_reductions: &[String],
    ) -> Result<TaxCalculationPair, TaxError> {
        self.calculator
            .calculate_both(vehicle, region, as_of, claimed_reductions)
            .await
    }

    pub async fn apply_indexation(
        &self,
        request: &IndexationRequest,
    ) -> Result<IndexationResult, TaxError> {
        self.indexer.apply_indexation(request).await
    }
}
