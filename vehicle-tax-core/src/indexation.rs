//! Bulk indexation of open bracket and parameter rows.
//!
//! An indexation never edits a value in place. Every selected open row is
//! closed the day before the effective date and succeeded by a copy whose
//! value is multiplied by the rate. Closes and inserts go to the store as a
//! single [`RuleBatch`]; each close only succeeds while its row is still
//! open, so two concurrent indexations cannot both win.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::db::TaxRuleStore;
use crate::error::TaxError;
use crate::models::{
    IndexationRequest, IndexationResult, RuleBatch, RuleClosure, RuleFamily, Versioned,
};
use crate::resolver::{ResolverConfig, bounded};

/// Applies [`IndexationRequest`]s to a [`TaxRuleStore`].
#[derive(Clone)]
pub struct Indexer {
    store: Arc<dyn TaxRuleStore>,
    store_timeout: Duration,
}

impl Indexer {
    pub fn new(store: Arc<dyn TaxRuleStore>) -> Self {
        Self::with_timeout(store, ResolverConfig::default().store_timeout)
    }

    pub fn with_timeout(store: Arc<dyn TaxRuleStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Indexes every open row selected by `request`.
    ///
    /// Open rows starting on or after the effective date are a change that
    /// is already planned and are skipped, as are rows whose key is
    /// excluded. Both count towards [`IndexationResult::skipped`].
    ///
    /// # Errors
    ///
    /// * [`TaxError::InvalidRequest`] for a rate that is not positive
    /// * [`TaxError::IndexationConflict`] when another writer closed one of
    ///   the selected rows first; nothing is written and the caller may
    ///   retry
    /// * [`TaxError::StoreUnavailable`] when the store does not answer
    pub async fn apply_indexation(
        &self,
        request: &IndexationRequest,
    ) -> Result<IndexationResult, TaxError> {
        request.validate()?;
        let effective_date = request.effective_date;
        let closing_date = effective_date.pred_opt().ok_or_else(|| {
            TaxError::InvalidRequest(format!("no day precedes {effective_date}"))
        })?;

        let mut batch = RuleBatch::default();
        let mut brackets_updated = 0;
        let mut parameters_updated = 0;
        let mut skipped = 0;

        for family in request.families() {
            let open = bounded(
                self.store_timeout,
                self.store
                    .find_all_open(family, request.region, request.tax_type),
            )
            .await?;

            for rule in open {
                let key = rule.key();
                if request.excluded_keys.contains(key.name()) {
                    debug!(
                        %key,
                        region = %rule.region(),
                        tax_type = %rule.tax_type(),
                        "key excluded from indexation"
                    );
                    skipped += 1;
                    continue;
                }
                let valid_from = rule.validity().valid_from;
                if valid_from >= effective_date {
                    warn!(
                        %key,
                        region = %rule.region(),
                        tax_type = %rule.tax_type(),
                        %valid_from,
                        %effective_date,
                        "open row starts on or after the effective date; skipped"
                    );
                    skipped += 1;
                    continue;
                }
                let Some(successor) = rule.indexed(effective_date, request.rate) else {
                    continue;
                };

                batch.closures.push(RuleClosure {
                    rule: rule.rule_ref(),
                    valid_to: closing_date,
                });
                batch.inserts.push(successor);
                match family {
                    RuleFamily::Bracket => brackets_updated += 1,
                    RuleFamily::Parameter => parameters_updated += 1,
                    RuleFamily::AgeCoefficient | RuleFamily::Exemption => {}
                }
            }
        }

        if !batch.is_empty() {
            bounded(self.store_timeout, self.store.save_all(batch)).await?;
        }

        let result = IndexationResult::new(
            brackets_updated,
            parameters_updated,
            skipped,
            request.rate,
            effective_date,
        );
        info!(
            region = ?request.region,
            tax_type = ?request.tax_type,
            brackets = brackets_updated,
            parameters = parameters_updated,
            skipped,
            "{}",
            result.message
        );
        Ok(result)
    }
}
