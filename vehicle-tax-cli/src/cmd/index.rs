use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use tracing::info;
use vehicle_tax_core::IndexationRequest;

use super::{RegionArg, TaxTypeArg, to_json};
use crate::app::App;
use crate::report;

#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Multiplier applied to every selected value, e.g. 1.02 for +2%
    #[arg(long)]
    pub rate: Decimal,

    /// First day of the indexed versions
    #[arg(short, long)]
    pub effective: NaiveDate,

    /// Only index rules of this region
    #[arg(short, long, value_enum)]
    pub region: Option<RegionArg>,

    /// Only index rules of this tax type
    #[arg(short, long, value_enum)]
    pub tax_type: Option<TaxTypeArg>,

    #[arg(long, conflicts_with = "parameters_only")]
    pub brackets_only: bool,

    #[arg(long)]
    pub parameters_only: bool,

    /// Additional key to leave untouched; repeat for several
    #[arg(long = "exclude", value_name = "KEY")]
    pub excluded: Vec<String>,

    /// Ignore the configured non-indexed keys
    #[arg(long)]
    pub all_keys: bool,
}

impl IndexCommand {
    pub fn request(&self, non_indexed_keys: &[String]) -> IndexationRequest {
        let mut request = IndexationRequest::new(self.rate, self.effective);
        if let Some(region) = self.region {
            request = request.for_region(region.into());
        }
        if let Some(tax_type) = self.tax_type {
            request = request.for_tax_type(tax_type.into());
        }
        if self.brackets_only {
            request = request.brackets_only();
        } else if self.parameters_only {
            request = request.parameters_only();
        }
        if !self.all_keys {
            request = request.excluding(non_indexed_keys.iter().cloned());
        }
        request.excluding(self.excluded.iter().cloned())
    }

    pub async fn run(&self, app: &App, json: bool) -> Result<String> {
        let request = self.request(app.non_indexed_keys());
        let result = app
            .engine()
            .apply_indexation(&request)
            .await
            .context("indexation failed")?;
        info!(
            brackets = result.brackets_updated,
            parameters = result.parameters_updated,
            skipped = result.skipped,
            "{}",
            result.message
        );
        if json {
            to_json(&result)
        } else {
            Ok(report::render_indexation(&result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use vehicle_tax_core::{Region, RuleFamily, TaxType};

    fn command() -> IndexCommand {
        IndexCommand {
            rate: dec!(1.02),
            effective: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            region: None,
            tax_type: None,
            brackets_only: false,
            parameters_only: false,
            excluded: vec!["max_amount".into()],
            all_keys: false,
        }
    }

    #[test]
    fn configured_and_flagged_exclusions_are_merged() {
        let request = command().request(&["mma_reference".to_string()]);

        assert_eq!(
            request.excluded_keys.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["max_amount", "mma_reference"]
        );
        assert_eq!(request.families(), vec![RuleFamily::Bracket, RuleFamily::Parameter]);
    }

    #[test]
    fn all_keys_drops_configured_exclusions_only() {
        let request = IndexCommand {
            all_keys: true,
            ..command()
        }
        .request(&["mma_reference".to_string()]);

        assert_eq!(request.excluded_keys.len(), 1);
        assert!(request.excluded_keys.contains("max_amount"));
    }

    #[test]
    fn filters_are_forwarded() {
        let request = IndexCommand {
            region: Some(RegionArg::Flanders),
            tax_type: Some(TaxTypeArg::Annual),
            parameters_only: true,
            ..command()
        }
        .request(&[]);

        assert_eq!(request.region, Some(Region::Flanders));
        assert_eq!(request.tax_type, Some(TaxType::Annual));
        assert_eq!(request.families(), vec![RuleFamily::Parameter]);
    }
}
