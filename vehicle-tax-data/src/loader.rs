use std::collections::HashSet;
use std::io::Read;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use vehicle_tax_core::{
    NewAgeCoefficient, NewRuleVersion, NewTaxBracket, NewTaxExemption, NewTaxParameter, Region,
    RepositoryError, RuleBatch, RuleClosure, RuleFamily, RuleStore, RuleVersion, TaxType,
    Versioned,
};

/// Errors that can occur when loading rule data.
#[derive(Debug, Error)]
pub enum RuleLoaderError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    /// `record` is the 1-based data row, header excluded.
    #[error("Invalid record {record}: {reason}")]
    InvalidRecord { record: usize, reason: String },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for RuleLoaderError {
    fn from(err: csv::Error) -> Self {
        RuleLoaderError::CsvParse(err.to_string())
    }
}

/// A single row of a rule CSV file.
///
/// One file may mix every family:
/// - `family`: `bracket`, `parameter`, `age_coefficient` or `exemption`
/// - `region`, `tax_type`: storage names (`wallonia`, `tmc`, ...)
/// - `key`: bracket key, parameter key or exemption condition; empty for
///   age coefficients
/// - `min_value`, `max_value`: bracket range (empty max for unbounded); the
///   age in years for age coefficients
/// - `value`: amount, parameter value or coefficient; empty for exemptions
/// - `valid_from`, `valid_to`: ISO dates, empty `valid_to` for open-ended
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RuleRecord {
    pub family: String,
    pub region: String,
    pub tax_type: String,
    #[serde(default)]
    pub key: String,
    #[serde(default, deserialize_with = "deserialize_optional_i32")]
    pub min_value: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_optional_i32")]
    pub max_value: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub value: Option<Decimal>,
    pub valid_from: NaiveDate,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub valid_to: Option<NaiveDate>,
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn deserialize_optional_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s.trim().parse::<i32>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<NaiveDate>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl RuleRecord {
    /// Converts the row into the rule version it describes.
    ///
    /// `record` is the row number used in error messages.
    pub fn to_new_rule(&self, record: usize) -> Result<NewRuleVersion, RuleLoaderError> {
        let invalid = |reason: String| RuleLoaderError::InvalidRecord { record, reason };

        let family = RuleFamily::parse(self.family.trim())
            .ok_or_else(|| invalid(format!("unknown family '{}'", self.family)))?;
        let region = Region::parse(self.region.trim())
            .ok_or_else(|| invalid(format!("unknown region '{}'", self.region)))?;
        let tax_type = TaxType::parse(self.tax_type.trim())
            .ok_or_else(|| invalid(format!("unknown tax type '{}'", self.tax_type)))?;
        let key = self.key.trim();
        if key.is_empty() && family != RuleFamily::AgeCoefficient {
            return Err(invalid(format!("{} needs a key", family)));
        }
        let value = || {
            self.value
                .ok_or_else(|| invalid(format!("{} '{}' needs a value", family, key)))
        };
        let min_value = || {
            self.min_value
                .ok_or_else(|| invalid(format!("{} '{}' needs min_value", family, key)))
        };

        let rule = match family {
            RuleFamily::Bracket => NewRuleVersion::Bracket(NewTaxBracket {
                region,
                tax_type,
                bracket_key: key.to_string(),
                min_value: min_value()?,
                max_value: self.max_value,
                amount: value()?,
                valid_from: self.valid_from,
                valid_to: self.valid_to,
            }),
            RuleFamily::Parameter => NewRuleVersion::Parameter(NewTaxParameter {
                region,
                tax_type,
                param_key: key.to_string(),
                param_value: value()?,
                valid_from: self.valid_from,
                valid_to: self.valid_to,
            }),
            RuleFamily::AgeCoefficient => NewRuleVersion::AgeCoefficient(NewAgeCoefficient {
                region,
                tax_type,
                vehicle_age_years: min_value()?,
                coefficient: value()?,
                valid_from: self.valid_from,
                valid_to: self.valid_to,
            }),
            RuleFamily::Exemption => NewRuleVersion::Exemption(NewTaxExemption {
                region,
                tax_type,
                condition_key: key.to_string(),
                valid_from: self.valid_from,
                valid_to: self.valid_to,
            }),
        };

        if let NewRuleVersion::Bracket(bracket) = &rule {
            if bracket.max_value.is_some_and(|max| max < bracket.min_value) {
                return Err(invalid(format!(
                    "bracket '{}' max_value below min_value",
                    bracket.bracket_key
                )));
            }
        }
        if rule.validity().is_empty() {
            return Err(invalid(format!("{} '{}' ends before it starts", family, key)));
        }
        Ok(rule)
    }
}

/// Loader for rule data from CSV files.
///
/// Reads CSV rows and writes them through the [`RuleStore`] trait, so any
/// backend works. A load is a single [`RuleStore::save_all`] batch: either
/// every row is stored or none is.
pub struct RuleLoader;

impl RuleLoader {
    /// Parse rule records from a CSV reader.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<RuleRecord>, RuleLoaderError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: RuleRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Store `records` atomically and return the stored versions.
    ///
    /// With `supersede`, every open version a new row would overlap and that
    /// starts earlier is closed the day before the new row starts, in the
    /// same batch. Without it such a row is rejected as an overlap.
    pub async fn load<S: RuleStore + ?Sized>(
        store: &S,
        records: &[RuleRecord],
        supersede: bool,
    ) -> Result<Vec<RuleVersion>, RuleLoaderError> {
        let inserts = records
            .iter()
            .enumerate()
            .map(|(index, record)| record.to_new_rule(index + 1))
            .collect::<Result<Vec<_>, _>>()?;

        let closures = if supersede {
            Self::closures_for(store, &inserts).await?
        } else {
            Vec::new()
        };
        debug!(
            inserts = inserts.len(),
            closures = closures.len(),
            "loading rule batch"
        );

        let stored = store.save_all(RuleBatch { closures, inserts }).await?;
        Ok(stored)
    }

    async fn closures_for<S: RuleStore + ?Sized>(
        store: &S,
        inserts: &[NewRuleVersion],
    ) -> Result<Vec<RuleClosure>, RuleLoaderError> {
        let mut open = Vec::new();
        for family in RuleFamily::ALL {
            if inserts.iter().any(|rule| rule.family() == family) {
                open.extend(store.find_all_open(family, None, None).await?);
            }
        }

        let mut seen = HashSet::new();
        let mut closures = Vec::new();
        for rule in inserts {
            let starts = rule.validity().valid_from;
            let Some(valid_to) = starts.pred_opt() else {
                continue;
            };
            for existing in &open {
                if existing.validity().valid_from < starts
                    && rule.conflicts_with(existing)
                    && seen.insert(existing.rule_ref())
                {
                    closures.push(RuleClosure {
                        rule: existing.rule_ref(),
                        valid_to,
                    });
                }
            }
        }
        Ok(closures)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use vehicle_tax_core::db::MemoryRuleStore;
    use vehicle_tax_core::RuleKey;

    use super::*;

    const HEADER: &str = "family,region,tax_type,key,min_value,max_value,value,valid_from,valid_to";

    fn csv(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ========================================================================
    // parse
    // ========================================================================

    #[test]
    fn parse_bracket_with_open_range() {
        let text = csv(&["bracket,wallonia,tmc,power_kw,156,,4957.00,2025-07-01,"]);

        let records = RuleLoader::parse(text.as_bytes()).expect("Failed to parse CSV");

        assert_eq!(
            records,
            vec![RuleRecord {
                family: "bracket".into(),
                region: "wallonia".into(),
                tax_type: "tmc".into(),
                key: "power_kw".into(),
                min_value: Some(156),
                max_value: None,
                value: Some(dec!(4957.00)),
                valid_from: date(2025, 7, 1),
                valid_to: None,
            }]
        );
    }

    #[test]
    fn parse_mixed_families() {
        let text = csv(&[
            "parameter,brussels,tmc,lpg_reduction,,,359.95,2024-07-01,",
            "age_coefficient,brussels,tmc,,3,,0.70,2024-07-01,",
            "exemption,flanders,annual,fuel_electric,,,,2021-01-01,2025-12-31",
        ]);

        let records = RuleLoader::parse(text.as_bytes()).unwrap();
        let rules: Vec<_> = records
            .iter()
            .enumerate()
            .map(|(i, r)| r.to_new_rule(i + 1).unwrap())
            .collect();

        assert_eq!(rules[0].family(), RuleFamily::Parameter);
        assert_eq!(rules[1].key(), RuleKey::AgeCoefficient);
        assert_eq!(
            rules[2].validity().valid_to,
            Some(date(2025, 12, 31))
        );
    }

    #[test]
    fn parse_rejects_malformed_dates() {
        let text = csv(&["parameter,wallonia,tmc,min_amount,,,50,01/07/2025,"]);

        let result = RuleLoader::parse(text.as_bytes());

        assert!(matches!(result, Err(RuleLoaderError::CsvParse(_))));
    }

    // ========================================================================
    // to_new_rule
    // ========================================================================

    #[test]
    fn unknown_region_names_the_record() {
        let text = csv(&[
            "parameter,wallonia,tmc,min_amount,,,50,2025-07-01,",
            "parameter,luxembourg,tmc,min_amount,,,50,2025-07-01,",
        ]);
        let records = RuleLoader::parse(text.as_bytes()).unwrap();

        let err = records[1].to_new_rule(2).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Invalid record 2: unknown region 'luxembourg'"
        );
    }

    #[test]
    fn bracket_needs_an_amount_and_a_sane_range() {
        let text = csv(&[
            "bracket,wallonia,tmc,power_kw,0,70,,2025-07-01,",
            "bracket,wallonia,tmc,power_kw,85,71,123,2025-07-01,",
        ]);
        let records = RuleLoader::parse(text.as_bytes()).unwrap();

        assert!(matches!(
            records[0].to_new_rule(1),
            Err(RuleLoaderError::InvalidRecord { record: 1, .. })
        ));
        assert!(matches!(
            records[1].to_new_rule(2),
            Err(RuleLoaderError::InvalidRecord { reason, .. }) if reason.contains("max_value below")
        ));
    }

    #[test]
    fn inverted_validity_is_rejected() {
        let text = csv(&["exemption,flanders,tmc,fuel_electric,,,,2026-01-01,2025-12-31"]);
        let records = RuleLoader::parse(text.as_bytes()).unwrap();

        assert!(records[0].to_new_rule(1).is_err());
    }

    // ========================================================================
    // load
    // ========================================================================

    #[tokio::test]
    async fn load_is_all_or_nothing() {
        let store = MemoryRuleStore::new();
        let text = csv(&[
            "parameter,wallonia,tmc,min_amount,,,50,2025-07-01,",
            "parameter,wallonia,tmc,min_amount,,,51,2026-01-01,",
        ]);
        let records = RuleLoader::parse(text.as_bytes()).unwrap();

        let err = RuleLoader::load(&store, &records, false).await.unwrap_err();

        assert!(matches!(
            err,
            RuleLoaderError::Repository(RepositoryError::Overlap(_))
        ));
        let stored = store
            .list_rules(RuleFamily::Parameter, None, None)
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn supersede_closes_the_open_predecessor() {
        let store = MemoryRuleStore::new();
        let first = csv(&["parameter,wallonia,tmc,min_amount,,,50,2025-07-01,"]);
        RuleLoader::load(&store, &RuleLoader::parse(first.as_bytes()).unwrap(), false)
            .await
            .unwrap();

        let second = csv(&["parameter,wallonia,tmc,min_amount,,,51,2026-01-01,"]);
        let stored = RuleLoader::load(&store, &RuleLoader::parse(second.as_bytes()).unwrap(), true)
            .await
            .unwrap();

        assert_eq!(stored.len(), 1);
        let history = store
            .list_rules(RuleFamily::Parameter, Some(Region::Wallonia), None)
            .await
            .unwrap();
        let closed = history
            .iter()
            .find(|rule| rule.value() == Some(dec!(50)))
            .unwrap();
        assert_eq!(closed.validity().valid_to, Some(date(2025, 12, 31)));
    }
}
