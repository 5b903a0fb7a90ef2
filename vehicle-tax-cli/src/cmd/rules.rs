use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use vehicle_tax_core::{RuleFamily, RuleStore, RuleVersion, Versioned};

use super::{RegionArg, TaxTypeArg, to_json};
use crate::app::App;
use crate::report;

fn parse_family(s: &str) -> Result<RuleFamily, String> {
    RuleFamily::parse(s).ok_or_else(|| {
        let known: Vec<_> = RuleFamily::ALL.iter().map(RuleFamily::as_str).collect();
        format!("unknown rule family '{s}'; expected one of: {}", known.join(", "))
    })
}

#[derive(Args, Debug)]
pub struct RulesCommand {
    /// bracket, parameter, age_coefficient or exemption
    #[arg(value_parser = parse_family)]
    pub family: RuleFamily,

    #[arg(short, long, value_enum)]
    pub region: Option<RegionArg>,

    #[arg(short, long, value_enum)]
    pub tax_type: Option<TaxTypeArg>,

    /// Only rows of this bracket, parameter or exemption key
    #[arg(short, long)]
    pub key: Option<String>,

    /// Only rows in force on this date
    #[arg(long, conflicts_with = "open")]
    pub as_of: Option<NaiveDate>,

    /// Only open-ended rows
    #[arg(long)]
    pub open: bool,
}

impl RulesCommand {
    fn keep(&self, rule: &RuleVersion) -> bool {
        if let Some(key) = &self.key {
            if rule.key().name() != key {
                return false;
            }
        }
        self.as_of.is_none_or(|date| rule.is_valid_on(date))
    }

    pub async fn run(&self, app: &App, json: bool) -> Result<String> {
        let region = self.region.map(Into::into);
        let tax_type = self.tax_type.map(Into::into);
        let listed = if self.open {
            app.store().find_all_open(self.family, region, tax_type).await
        } else {
            app.store().list_rules(self.family, region, tax_type).await
        };
        let rules = listed.with_context(|| format!("cannot list {} rules", self.family))?;

        let rules: Vec<_> = rules.into_iter().filter(|r| self.keep(r)).collect();
        if json {
            to_json(&rules)
        } else {
            Ok(report::render_rules(&rules))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn family_names_match_the_store() {
        assert_eq!(parse_family("age_coefficient"), Ok(RuleFamily::AgeCoefficient));
        assert_eq!(
            parse_family("brackets").unwrap_err(),
            "unknown rule family 'brackets'; \
             expected one of: bracket, parameter, age_coefficient, exemption"
        );
    }
}
