use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Args;
use serde::Serialize;
use vehicle_tax_core::{ReductionStore, Region, TaxType, UserReduction, UserReductionType};

use super::{RegionArg, TaxTypeArg, to_json};
use crate::app::App;
use crate::report;

#[derive(Args, Debug)]
pub struct ReductionsCommand {
    /// Also show the values in force for this region
    #[arg(short, long, value_enum, requires = "tax_type")]
    pub region: Option<RegionArg>,

    #[arg(short, long, value_enum, requires = "region")]
    pub tax_type: Option<TaxTypeArg>,

    /// Date the values are resolved on (defaults to today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct ReductionListing {
    #[serde(flatten)]
    reduction_type: UserReductionType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    values: Vec<UserReduction>,
}

fn value_text(reduction: &UserReduction) -> String {
    let mut text = if reduction.is_percentage {
        format!("{}%", reduction.value.normalize())
    } else {
        format!("{:.2} EUR", reduction.value)
    };
    if let Some(max) = reduction.max_co2 {
        text.push_str(&format!(" up to {max} g/km"));
    }
    text
}

impl ReductionsCommand {
    pub async fn run(&self, app: &App, json: bool) -> Result<String> {
        let types = app
            .store()
            .list_reduction_types()
            .await
            .context("cannot list reduction types")?;

        let (region, tax_type) = match (self.region, self.tax_type) {
            (Some(region), Some(tax_type)) => (Region::from(region), TaxType::from(tax_type)),
            _ => {
                return if json {
                    to_json(&types)
                } else {
                    Ok(report::render_reduction_types(&types))
                };
            }
        };

        let as_of = self.as_of.unwrap_or_else(|| Local::now().date_naive());
        let mut listings = Vec::with_capacity(types.len());
        for reduction_type in types {
            let values = app
                .store()
                .find_valid_reductions(region, tax_type, &reduction_type.code, as_of)
                .await
                .with_context(|| format!("cannot read reduction '{}'", reduction_type.code))?;
            listings.push(ReductionListing {
                reduction_type,
                values,
            });
        }

        if json {
            return to_json(&listings);
        }
        let mut out = format!(
            "{region} {} reductions on {as_of}\n",
            tax_type.as_str().to_uppercase()
        );
        for listing in &listings {
            let value = match listing.values.as_slice() {
                [] => "not available".to_string(),
                values => values.iter().map(value_text).collect::<Vec<_>>().join("; "),
            };
            out.push_str(&format!("  {:<20} {}\n", listing.reduction_type.code, value));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn reduction(
        is_percentage: bool,
        value: rust_decimal::Decimal,
        max_co2: Option<i32>,
    ) -> UserReduction {
        UserReduction {
            id: 1,
            region: Region::Wallonia,
            tax_type: TaxType::Tmc,
            reduction_type_code: "large_family".into(),
            is_percentage,
            value,
            max_co2,
            valid_from: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            valid_to: None,
        }
    }

    #[test]
    fn fixed_and_percentage_values_read_differently() {
        assert_eq!(
            value_text(&reduction(false, dec!(250), Some(145))),
            "250.00 EUR up to 145 g/km"
        );
        assert_eq!(value_text(&reduction(true, dec!(10.00), None)), "10%");
    }
}
