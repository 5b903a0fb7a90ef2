use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite};
use tracing::{debug, info};
use vehicle_tax_core::{
    AgeCoefficient, NewRuleVersion, NewUserReduction, NewUserReductionType, ReductionStore,
    Region, RepositoryError, RuleBatch, RuleClosure, RuleFamily, RuleKey, RuleStore, RuleVersion,
    TaxBracket, TaxExemption, TaxParameter, TaxType, UserReduction, UserReductionType, Versioned,
};

use crate::decimal::{decimal_to_text, get_decimal};

/// How long a caller waits for a pooled connection before the store reports
/// itself unavailable.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Versioned rule tables in a SQLite database.
pub struct SqliteRuleStore {
    pool: SqlitePool,
}

impl SqliteRuleStore {
    /// Opens `connection_string`, which is either `:memory:`, a sqlx URL
    /// (`sqlite:rules.db?mode=rwc`) or a bare file path. Files are created
    /// when missing.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let in_memory = connection_string.contains(":memory:");
        let options = connect_options(connection_string)?;

        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(ACQUIRE_TIMEOUT);
        if in_memory {
            // Each connection to :memory: is its own database.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", connection_string))?;
        Ok(Self { pool })
    }

    pub fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Load and execute all SQL seed files from the specified directory.
    /// Files are executed in alphabetical order by filename.
    pub async fn run_seeds(&self, seeds_dir: &Path) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(seeds_dir)
            .with_context(|| format!("Failed to read seeds directory '{}'", seeds_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"))
            .collect();

        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;

            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute seed file '{}'", path.display()))?;
            info!(file = %path.display(), "seed file loaded");
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn connect_options(connection_string: &str) -> Result<SqliteConnectOptions> {
    let options = if connection_string == ":memory:" {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else if connection_string.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(connection_string)
            .with_context(|| format!("Invalid SQLite URL '{}'", connection_string))?
    } else {
        SqliteConnectOptions::new()
            .filename(connection_string)
            .create_if_missing(true)
    };
    Ok(options.foreign_keys(true))
}

// ============================================================================
// Table layout per rule family
// ============================================================================

struct FamilyTable {
    table: &'static str,
    columns: &'static str,
    /// Column holding the lookup key; age coefficients have none.
    key_column: Option<&'static str>,
    order_by: &'static str,
}

fn family_table(family: RuleFamily) -> FamilyTable {
    match family {
        RuleFamily::Bracket => FamilyTable {
            table: "tax_brackets",
            columns: "id, region, tax_type, bracket_key, min_value, max_value, amount, \
                      valid_from, valid_to",
            key_column: Some("bracket_key"),
            order_by: "region, tax_type, bracket_key, valid_from, min_value",
        },
        RuleFamily::Parameter => FamilyTable {
            table: "tax_parameters",
            columns: "id, region, tax_type, param_key, param_value, valid_from, valid_to",
            key_column: Some("param_key"),
            order_by: "region, tax_type, param_key, valid_from",
        },
        RuleFamily::AgeCoefficient => FamilyTable {
            table: "age_coefficients",
            columns: "id, region, tax_type, vehicle_age_years, coefficient, valid_from, valid_to",
            key_column: None,
            order_by: "region, tax_type, valid_from, vehicle_age_years",
        },
        RuleFamily::Exemption => FamilyTable {
            table: "tax_exemptions",
            columns: "id, region, tax_type, condition_key, valid_from, valid_to",
            key_column: Some("condition_key"),
            order_by: "region, tax_type, condition_key, valid_from",
        },
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::Database(format!("Failed to get {}: {}", name, e)))
}

fn region_column(row: &SqliteRow) -> Result<Region, RepositoryError> {
    let raw: String = column(row, "region")?;
    Region::parse(&raw)
        .ok_or_else(|| RepositoryError::Database(format!("Invalid region: {}", raw)))
}

fn tax_type_column(row: &SqliteRow) -> Result<TaxType, RepositoryError> {
    let raw: String = column(row, "tax_type")?;
    TaxType::parse(&raw)
        .ok_or_else(|| RepositoryError::Database(format!("Invalid tax type: {}", raw)))
}

fn row_to_rule(family: RuleFamily, row: &SqliteRow) -> Result<RuleVersion, RepositoryError> {
    let id: i64 = column(row, "id")?;
    let region = region_column(row)?;
    let tax_type = tax_type_column(row)?;
    let valid_from: NaiveDate = column(row, "valid_from")?;
    let valid_to: Option<NaiveDate> = column(row, "valid_to")?;

    Ok(match family {
        RuleFamily::Bracket => RuleVersion::Bracket(TaxBracket {
            id,
            region,
            tax_type,
            bracket_key: column(row, "bracket_key")?,
            min_value: column(row, "min_value")?,
            max_value: column(row, "max_value")?,
            amount: get_decimal(row, "amount")?,
            valid_from,
            valid_to,
        }),
        RuleFamily::Parameter => RuleVersion::Parameter(TaxParameter {
            id,
            region,
            tax_type,
            param_key: column(row, "param_key")?,
            param_value: get_decimal(row, "param_value")?,
            valid_from,
            valid_to,
        }),
        RuleFamily::AgeCoefficient => RuleVersion::AgeCoefficient(AgeCoefficient {
            id,
            region,
            tax_type,
            vehicle_age_years: column(row, "vehicle_age_years")?,
            coefficient: get_decimal(row, "coefficient")?,
            valid_from,
            valid_to,
        }),
        RuleFamily::Exemption => RuleVersion::Exemption(TaxExemption {
            id,
            region,
            tax_type,
            condition_key: column(row, "condition_key")?,
            valid_from,
            valid_to,
        }),
    })
}

fn rows_to_rules(
    family: RuleFamily,
    rows: &[SqliteRow],
) -> Result<Vec<RuleVersion>, RepositoryError> {
    rows.iter().map(|row| row_to_rule(family, row)).collect()
}

fn row_to_reduction(row: &SqliteRow) -> Result<UserReduction, RepositoryError> {
    Ok(UserReduction {
        id: column(row, "id")?,
        region: region_column(row)?,
        tax_type: tax_type_column(row)?,
        reduction_type_code: column(row, "reduction_type_code")?,
        is_percentage: column(row, "is_percentage")?,
        value: get_decimal(row, "value")?,
        max_co2: column(row, "max_co2")?,
        valid_from: column(row, "valid_from")?,
        valid_to: column(row, "valid_to")?,
    })
}

/// Pool exhaustion and I/O failures are transient; everything else is a
/// database error.
fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::PoolTimedOut => {
            RepositoryError::Unavailable("timed out waiting for a SQLite connection".into())
        }
        sqlx::Error::PoolClosed => RepositoryError::Connection("SQLite pool is closed".into()),
        sqlx::Error::Io(e) => RepositoryError::Connection(e.to_string()),
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        other => {
            let busy = other
                .as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|code| code == "5" || code == "6");
            if busy {
                RepositoryError::Unavailable(other.to_string())
            } else {
                RepositoryError::Database(other.to_string())
            }
        }
    }
}

// ============================================================================
// Queries shared by plain calls and transactions
// ============================================================================

/// Every stored version of the rule `rule` would be inserted next to.
async fn versions_of(
    conn: &mut SqliteConnection,
    rule: &NewRuleVersion,
) -> Result<Vec<RuleVersion>, RepositoryError> {
    let family = rule.family();
    let table = family_table(family);
    let key = rule.key();

    let mut sql = format!(
        "SELECT {} FROM {} WHERE region = ? AND tax_type = ?",
        table.columns, table.table
    );
    if let Some(key_column) = table.key_column {
        sql.push_str(&format!(" AND {} = ?", key_column));
    }

    let mut query = sqlx::query(&sql)
        .bind(rule.region().as_str())
        .bind(rule.tax_type().as_str());
    if table.key_column.is_some() {
        query = query.bind(key.name());
    }

    let rows = query.fetch_all(&mut *conn).await.map_err(map_sqlx_error)?;
    rows_to_rules(family, &rows)
}

async fn check_insertable(
    conn: &mut SqliteConnection,
    rule: &NewRuleVersion,
) -> Result<(), RepositoryError> {
    if rule.validity().is_empty() {
        return Err(RepositoryError::Database(format!(
            "{} ends before it starts",
            rule.key()
        )));
    }
    let existing = versions_of(conn, rule).await?;
    match existing.iter().find(|version| rule.conflicts_with(version)) {
        Some(version) => Err(RepositoryError::Overlap(format!(
            "{} for {}/{} overlaps {} #{}",
            rule.key(),
            rule.region(),
            rule.tax_type(),
            version.family(),
            version.id()
        ))),
        None => Ok(()),
    }
}

async fn insert_rule(
    conn: &mut SqliteConnection,
    rule: NewRuleVersion,
) -> Result<RuleVersion, RepositoryError> {
    let result = match &rule {
        NewRuleVersion::Bracket(r) => {
            sqlx::query(
                "INSERT INTO tax_brackets
                    (region, tax_type, bracket_key, min_value, max_value, amount,
                     valid_from, valid_to)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(r.region.as_str())
            .bind(r.tax_type.as_str())
            .bind(&r.bracket_key)
            .bind(r.min_value)
            .bind(r.max_value)
            .bind(decimal_to_text(r.amount))
            .bind(r.valid_from)
            .bind(r.valid_to)
            .execute(&mut *conn)
            .await
        }
        NewRuleVersion::Parameter(r) => {
            sqlx::query(
                "INSERT INTO tax_parameters
                    (region, tax_type, param_key, param_value, valid_from, valid_to)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(r.region.as_str())
            .bind(r.tax_type.as_str())
            .bind(&r.param_key)
            .bind(decimal_to_text(r.param_value))
            .bind(r.valid_from)
            .bind(r.valid_to)
            .execute(&mut *conn)
            .await
        }
        NewRuleVersion::AgeCoefficient(r) => {
            sqlx::query(
                "INSERT INTO age_coefficients
                    (region, tax_type, vehicle_age_years, coefficient, valid_from, valid_to)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(r.region.as_str())
            .bind(r.tax_type.as_str())
            .bind(r.vehicle_age_years)
            .bind(decimal_to_text(r.coefficient))
            .bind(r.valid_from)
            .bind(r.valid_to)
            .execute(&mut *conn)
            .await
        }
        NewRuleVersion::Exemption(r) => {
            sqlx::query(
                "INSERT INTO tax_exemptions
                    (region, tax_type, condition_key, valid_from, valid_to)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(r.region.as_str())
            .bind(r.tax_type.as_str())
            .bind(&r.condition_key)
            .bind(r.valid_from)
            .bind(r.valid_to)
            .execute(&mut *conn)
            .await
        }
    }
    .map_err(map_sqlx_error)?;

    Ok(rule.with_id(result.last_insert_rowid()))
}

/// Compare-and-swap close: only an open row is updated.
async fn close_rule(
    conn: &mut SqliteConnection,
    closure: &RuleClosure,
) -> Result<(), RepositoryError> {
    let table = family_table(closure.rule.family).table;

    let start: Option<NaiveDate> = sqlx::query_scalar(&format!(
        "SELECT valid_from FROM {} WHERE id = ?",
        table
    ))
    .bind(closure.rule.id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    let start = start.ok_or(RepositoryError::NotFound)?;
    if closure.valid_to < start {
        return Err(RepositoryError::Database(format!(
            "closing {} #{} at {} precedes its start",
            closure.rule.family, closure.rule.id, closure.valid_to
        )));
    }

    let updated = sqlx::query(&format!(
        "UPDATE {} SET valid_to = ? WHERE id = ? AND valid_to IS NULL",
        table
    ))
    .bind(closure.valid_to)
    .bind(closure.rule.id)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    if updated.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "{} #{} is no longer open",
            closure.rule.family, closure.rule.id
        )));
    }
    Ok(())
}

#[async_trait]
impl RuleStore for SqliteRuleStore {
    async fn find_valid(
        &self,
        region: Region,
        tax_type: TaxType,
        key: &RuleKey,
        date: NaiveDate,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        let family = key.family();
        let table = family_table(family);

        let mut sql = format!(
            "SELECT {} FROM {} WHERE region = ? AND tax_type = ?",
            table.columns, table.table
        );
        if let Some(key_column) = table.key_column {
            sql.push_str(&format!(" AND {} = ?", key_column));
        }
        sql.push_str(" AND valid_from <= ? AND (valid_to IS NULL OR valid_to >= ?)");
        sql.push_str(&format!(" ORDER BY {}", table.order_by));

        let mut query = sqlx::query(&sql)
            .bind(region.as_str())
            .bind(tax_type.as_str());
        if table.key_column.is_some() {
            query = query.bind(key.name());
        }

        let rows = query
            .bind(date)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows_to_rules(family, &rows)
    }

    async fn find_all_open(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        let table = family_table(family);
        let sql = format!(
            "SELECT {} FROM {}
             WHERE valid_to IS NULL
               AND (? IS NULL OR region = ?)
               AND (? IS NULL OR tax_type = ?)
             ORDER BY {}",
            table.columns, table.table, table.order_by
        );

        let region = region.map(|r| r.as_str());
        let tax_type = tax_type.map(|t| t.as_str());
        let rows = sqlx::query(&sql)
            .bind(region)
            .bind(region)
            .bind(tax_type)
            .bind(tax_type)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows_to_rules(family, &rows)
    }

    async fn list_rules(
        &self,
        family: RuleFamily,
        region: Option<Region>,
        tax_type: Option<TaxType>,
    ) -> Result<Vec<RuleVersion>, RepositoryError> {
        let table = family_table(family);
        let sql = format!(
            "SELECT {} FROM {}
             WHERE (? IS NULL OR region = ?)
               AND (? IS NULL OR tax_type = ?)
             ORDER BY {}",
            table.columns, table.table, table.order_by
        );

        let region = region.map(|r| r.as_str());
        let tax_type = tax_type.map(|t| t.as_str());
        let rows = sqlx::query(&sql)
            .bind(region)
            .bind(region)
            .bind(tax_type)
            .bind(tax_type)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows_to_rules(family, &rows)
    }

    async fn save(&self, rule: NewRuleVersion) -> Result<RuleVersion, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        check_insertable(&mut tx, &rule).await?;
        let saved = insert_rule(&mut tx, rule).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(saved)
    }

    async fn save_all(&self, batch: RuleBatch) -> Result<Vec<RuleVersion>, RepositoryError> {
        let closures = batch.closures.len();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Dropping `tx` on an early return rolls the whole batch back.
        for closure in &batch.closures {
            close_rule(&mut tx, closure).await?;
        }

        let mut inserted = Vec::with_capacity(batch.inserts.len());
        for rule in batch.inserts {
            check_insertable(&mut tx, &rule).await?;
            inserted.push(insert_rule(&mut tx, rule).await?);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(closures, inserts = inserted.len(), "rule batch committed");
        Ok(inserted)
    }
}

#[async_trait]
impl ReductionStore for SqliteRuleStore {
    async fn list_reduction_types(&self) -> Result<Vec<UserReductionType>, RepositoryError> {
        let rows =
            sqlx::query("SELECT id, code, description FROM user_reduction_types ORDER BY code")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                Ok(UserReductionType {
                    id: column(row, "id")?,
                    code: column(row, "code")?,
                    description: column(row, "description")?,
                })
            })
            .collect()
    }

    async fn find_valid_reductions(
        &self,
        region: Region,
        tax_type: TaxType,
        code: &str,
        date: NaiveDate,
    ) -> Result<Vec<UserReduction>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, region, tax_type, reduction_type_code, is_percentage, value, max_co2,
                    valid_from, valid_to
             FROM user_reductions
             WHERE region = ? AND tax_type = ? AND reduction_type_code = ?
               AND valid_from <= ? AND (valid_to IS NULL OR valid_to >= ?)
             ORDER BY valid_from",
        )
        .bind(region.as_str())
        .bind(tax_type.as_str())
        .bind(code)
        .bind(date)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_reduction).collect()
    }

    async fn save_reduction_type(
        &self,
        reduction_type: NewUserReductionType,
    ) -> Result<UserReductionType, RepositoryError> {
        let sql = "INSERT INTO user_reduction_types (code, description) VALUES (?, ?)";
        let result = sqlx::query(sql)
            .bind(&reduction_type.code)
            .bind(&reduction_type.description)
            .execute(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => RepositoryError::Database(format!(
                    "reduction type '{}' already exists",
                    reduction_type.code
                )),
                _ => map_sqlx_error(e),
            })?;

        Ok(UserReductionType {
            id: result.last_insert_rowid(),
            code: reduction_type.code,
            description: reduction_type.description,
        })
    }

    async fn save_reduction(
        &self,
        reduction: NewUserReduction,
    ) -> Result<UserReduction, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let known: Option<i64> =
            sqlx::query_scalar("SELECT id FROM user_reduction_types WHERE code = ?")
                .bind(&reduction.reduction_type_code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        if known.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let overlapping: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM user_reductions
             WHERE region = ? AND tax_type = ? AND reduction_type_code = ?
               AND (valid_to IS NULL OR valid_to >= ?)
               AND (? IS NULL OR valid_from <= ?)
             LIMIT 1",
        )
        .bind(reduction.region.as_str())
        .bind(reduction.tax_type.as_str())
        .bind(&reduction.reduction_type_code)
        .bind(reduction.valid_from)
        .bind(reduction.valid_to)
        .bind(reduction.valid_to)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if overlapping.is_some() {
            return Err(RepositoryError::Overlap(format!(
                "reduction '{}' for {}/{}",
                reduction.reduction_type_code, reduction.region, reduction.tax_type
            )));
        }

        let result = sqlx::query(
            "INSERT INTO user_reductions
                (region, tax_type, reduction_type_code, is_percentage, value, max_co2,
                 valid_from, valid_to)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(reduction.region.as_str())
        .bind(reduction.tax_type.as_str())
        .bind(&reduction.reduction_type_code)
        .bind(reduction.is_percentage)
        .bind(decimal_to_text(reduction.value))
        .bind(reduction.max_co2)
        .bind(reduction.valid_from)
        .bind(reduction.valid_to)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(reduction.with_id(result.last_insert_rowid()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use vehicle_tax_core::{
        NewAgeCoefficient, NewTaxBracket, NewTaxExemption, NewTaxParameter, RuleRef,
    };

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup_test_db() -> SqliteRuleStore {
        let store = SqliteRuleStore::connect(":memory:")
            .await
            .expect("Failed to create in-memory database");
        store
            .run_migrations()
            .await
            .expect("Failed to run migrations");
        store
    }

    fn power_bracket(min: i32, max: Option<i32>, amount: Decimal) -> NewRuleVersion {
        NewRuleVersion::Bracket(NewTaxBracket {
            region: Region::Wallonia,
            tax_type: TaxType::Tmc,
            bracket_key: "power_kw".into(),
            min_value: min,
            max_value: max,
            amount,
            valid_from: date(2025, 7, 1),
            valid_to: None,
        })
    }

    fn parameter(key: &str, value: Decimal, valid_from: NaiveDate) -> NewRuleVersion {
        NewRuleVersion::Parameter(NewTaxParameter {
            region: Region::Wallonia,
            tax_type: TaxType::Tmc,
            param_key: key.into(),
            param_value: value,
            valid_from,
            valid_to: None,
        })
    }

    fn reduction(
        code: &str,
        valid_from: NaiveDate,
        valid_to: Option<NaiveDate>,
    ) -> NewUserReduction {
        NewUserReduction {
            region: Region::Brussels,
            tax_type: TaxType::Annual,
            reduction_type_code: code.into(),
            is_percentage: true,
            value: dec!(25),
            max_co2: Some(120),
            valid_from,
            valid_to,
        }
    }

    // ========================================================================
    // find_valid
    // ========================================================================

    #[tokio::test]
    async fn find_valid_returns_brackets_in_range_order() {
        let store = setup_test_db().await;
        store.save(power_bracket(86, Some(100), dec!(495))).await.unwrap();
        store.save(power_bracket(0, Some(70), dec!(61.50))).await.unwrap();
        store.save(power_bracket(71, Some(85), dec!(123))).await.unwrap();

        let found = store
            .find_valid(
                Region::Wallonia,
                TaxType::Tmc,
                &RuleKey::bracket("power_kw"),
                date(2025, 8, 1),
            )
            .await
            .unwrap();

        let amounts: Vec<_> = found.iter().filter_map(RuleVersion::value).collect();
        assert_eq!(amounts, vec![dec!(61.50), dec!(123), dec!(495)]);
        assert_eq!(amounts[0].to_string(), "61.50");
    }

    #[tokio::test]
    async fn find_valid_respects_both_validity_bounds() {
        let store = setup_test_db().await;
        let mut closed = parameter("min_amount", dec!(50), date(2025, 7, 1));
        if let NewRuleVersion::Parameter(p) = &mut closed {
            p.valid_to = Some(date(2026, 6, 30));
        }
        store.save(closed).await.unwrap();
        store
            .save(parameter("min_amount", dec!(51), date(2026, 7, 1)))
            .await
            .unwrap();

        assert_eq!(min_amount_on(&store, date(2025, 6, 30)).await, None);
        assert_eq!(min_amount_on(&store, date(2025, 7, 1)).await, Some(dec!(50)));
        assert_eq!(min_amount_on(&store, date(2026, 6, 30)).await, Some(dec!(50)));
        assert_eq!(min_amount_on(&store, date(2026, 7, 1)).await, Some(dec!(51)));
    }

    async fn min_amount_on(store: &SqliteRuleStore, on: NaiveDate) -> Option<Decimal> {
        let found = store
            .find_valid(
                Region::Wallonia,
                TaxType::Tmc,
                &RuleKey::parameter("min_amount"),
                on,
            )
            .await
            .unwrap();
        assert!(found.len() <= 1);
        found.first().and_then(RuleVersion::value)
    }

    #[tokio::test]
    async fn find_valid_age_coefficients_ignores_key_names() {
        let store = setup_test_db().await;
        for (age, coefficient) in [(0, dec!(1)), (1, dec!(0.9))] {
            store
                .save(NewRuleVersion::AgeCoefficient(NewAgeCoefficient {
                    region: Region::Flanders,
                    tax_type: TaxType::Tmc,
                    vehicle_age_years: age,
                    coefficient,
                    valid_from: date(2024, 7, 1),
                    valid_to: None,
                }))
                .await
                .unwrap();
        }

        let found = store
            .find_valid(
                Region::Flanders,
                TaxType::Tmc,
                &RuleKey::AgeCoefficient,
                date(2025, 1, 1),
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[1].value(), Some(dec!(0.9)));
    }

    // ========================================================================
    // save / overlap
    // ========================================================================

    #[tokio::test]
    async fn save_rejects_overlapping_versions() {
        let store = setup_test_db().await;
        store.save(power_bracket(0, Some(70), dec!(61.50))).await.unwrap();

        let err = store
            .save(power_bracket(60, Some(85), dec!(123)))
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Overlap(_)));
        let all = store
            .list_rules(RuleFamily::Bracket, None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn save_rejects_an_inverted_interval() {
        let store = setup_test_db().await;
        let err = store
            .save(NewRuleVersion::Exemption(NewTaxExemption {
                region: Region::Flanders,
                tax_type: TaxType::Annual,
                condition_key: "fuel_electric".into(),
                valid_from: date(2025, 1, 1),
                valid_to: Some(date(2024, 12, 31)),
            }))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Database(msg) if msg.contains("ends before it starts")
        ));
    }

    // ========================================================================
    // save_all
    // ========================================================================

    #[tokio::test]
    async fn save_all_closes_then_inserts() {
        let store = setup_test_db().await;
        let old = store
            .save(parameter("mma_reference", dec!(1838), date(2025, 7, 1)))
            .await
            .unwrap();

        let inserted = store
            .save_all(RuleBatch {
                closures: vec![RuleClosure {
                    rule: old.rule_ref(),
                    valid_to: date(2026, 6, 30),
                }],
                inserts: vec![parameter("mma_reference", dec!(1874.76), date(2026, 7, 1))],
            })
            .await
            .unwrap();

        assert_eq!(inserted.len(), 1);
        let open = store
            .find_all_open(RuleFamily::Parameter, Some(Region::Wallonia), None)
            .await
            .unwrap();
        assert_eq!(open, inserted);
        let history = store
            .list_rules(RuleFamily::Parameter, None, Some(TaxType::Tmc))
            .await
            .unwrap();
        assert_eq!(history[0], old.closed_at(date(2026, 6, 30)));
    }

    #[tokio::test]
    async fn save_all_reports_a_lost_race_and_writes_nothing() {
        let store = setup_test_db().await;
        let old = store
            .save(parameter("mma_reference", dec!(1838), date(2025, 7, 1)))
            .await
            .unwrap();
        let closure = RuleClosure {
            rule: old.rule_ref(),
            valid_to: date(2026, 6, 30),
        };
        store
            .save_all(RuleBatch {
                closures: vec![closure],
                inserts: vec![],
            })
            .await
            .unwrap();

        let err = store
            .save_all(RuleBatch {
                closures: vec![closure],
                inserts: vec![parameter("mma_reference", dec!(1874.76), date(2026, 7, 1))],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Conflict(_)));
        let all = store
            .list_rules(RuleFamily::Parameter, None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn save_all_rolls_back_earlier_closures_on_failure() {
        let store = setup_test_db().await;
        let old = store.save(power_bracket(0, None, dec!(61.50))).await.unwrap();

        let err = store
            .save_all(RuleBatch {
                closures: vec![
                    RuleClosure {
                        rule: old.rule_ref(),
                        valid_to: date(2026, 6, 30),
                    },
                    RuleClosure {
                        rule: RuleRef {
                            family: RuleFamily::Bracket,
                            id: 9_999,
                        },
                        valid_to: date(2026, 6, 30),
                    },
                ],
                inserts: vec![],
            })
            .await
            .unwrap_err();

        assert_eq!(err, RepositoryError::NotFound);
        let open = store
            .find_all_open(RuleFamily::Bracket, None, None)
            .await
            .unwrap();
        assert_eq!(open, vec![old]);
    }

    // ========================================================================
    // reductions
    // ========================================================================

    #[tokio::test]
    async fn reductions_round_trip_through_their_type() {
        let store = setup_test_db().await;
        store
            .save_reduction_type(NewUserReductionType {
                code: "large_family".into(),
                description: Some("Three or more children".into()),
            })
            .await
            .unwrap();
        let saved = store
            .save_reduction(reduction("large_family", date(2025, 1, 1), None))
            .await
            .unwrap();

        let found = store
            .find_valid_reductions(
                Region::Brussels,
                TaxType::Annual,
                "large_family",
                date(2025, 6, 1),
            )
            .await
            .unwrap();

        assert_eq!(found, vec![saved]);
        assert_eq!(found[0].max_co2, Some(120));
        assert!(found[0].is_percentage);
    }

    #[tokio::test]
    async fn duplicate_reduction_type_is_rejected() {
        let store = setup_test_db().await;
        let new_type = NewUserReductionType {
            code: "disability".into(),
            description: None,
        };
        store.save_reduction_type(new_type.clone()).await.unwrap();

        let err = store.save_reduction_type(new_type).await.unwrap_err();

        assert_eq!(
            err,
            RepositoryError::Database("reduction type 'disability' already exists".into())
        );
    }

    #[tokio::test]
    async fn reduction_needs_a_known_type_and_a_free_interval() {
        let store = setup_test_db().await;
        let unknown = store
            .save_reduction(reduction("large_family", date(2025, 1, 1), None))
            .await
            .unwrap_err();
        assert_eq!(unknown, RepositoryError::NotFound);

        store
            .save_reduction_type(NewUserReductionType {
                code: "large_family".into(),
                description: None,
            })
            .await
            .unwrap();
        store
            .save_reduction(reduction("large_family", date(2025, 1, 1), Some(date(2025, 12, 31))))
            .await
            .unwrap();

        let overlap = store
            .save_reduction(reduction("large_family", date(2025, 6, 1), None))
            .await
            .unwrap_err();
        assert!(matches!(overlap, RepositoryError::Overlap(_)));

        store
            .save_reduction(reduction("large_family", date(2026, 1, 1), None))
            .await
            .unwrap();
    }
}
