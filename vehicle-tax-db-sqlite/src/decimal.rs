use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};
use vehicle_tax_core::RepositoryError;

/// Reads a decimal column. Rule tables store amounts as TEXT; INTEGER and
/// REAL cells written by hand are accepted as well.
pub fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    let value_ref = row
        .try_get_raw(column)
        .map_err(|e| RepositoryError::Database(format!("Column '{}' not found: {}", column, e)))?;

    let type_info = value_ref.type_info();
    let type_name = type_info.name();

    match type_name {
        "TEXT" => {
            let text: String = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!("Failed to get TEXT from '{}': {}", column, e))
            })?;
            Decimal::from_str(text.trim()).map_err(|e| {
                RepositoryError::Database(format!(
                    "Column '{}' holds '{}', not a decimal: {}",
                    column, text, e
                ))
            })
        }
        "INTEGER" => {
            let val: i64 = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!(
                    "Failed to get INTEGER from '{}': {}",
                    column, e
                ))
            })?;
            Ok(Decimal::from(val))
        }
        "REAL" => {
            let val: f64 = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!("Failed to get REAL from '{}': {}", column, e))
            })?;
            Decimal::try_from(val).map_err(|e| {
                RepositoryError::Database(format!("Failed to convert {} to Decimal: {}", val, e))
            })
        }
        "NULL" => Err(RepositoryError::Database(format!(
            "Column '{}' is NULL",
            column
        ))),
        _ => Err(RepositoryError::Database(format!(
            "Unexpected type '{}' for column '{}'",
            type_name, column
        ))),
    }
}

/// Like [`get_decimal`], with NULL read as `None`.
pub fn get_optional_decimal(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, RepositoryError> {
    let value_ref = row
        .try_get_raw(column)
        .map_err(|e| RepositoryError::Database(format!("Column '{}' not found: {}", column, e)))?;

    if value_ref.is_null() {
        return Ok(None);
    }

    get_decimal(row, column).map(Some)
}

/// Text form written to decimal columns. Keeps the scale, so `61.50`
/// reads back as `61.50`.
pub fn decimal_to_text(d: Decimal) -> String {
    d.to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        sqlx::query(
            "CREATE TABLE test_decimals (
                id INTEGER PRIMARY KEY,
                text_value TEXT,
                int_value INTEGER,
                real_value REAL,
                null_value TEXT,
                blob_value BLOB
            )",
        )
        .execute(&pool)
        .await
        .expect("Failed to create test table");
        pool
    }

    async fn fetch(pool: &SqlitePool, insert: &str, column: &str) -> SqliteRow {
        sqlx::query(insert)
            .execute(pool)
            .await
            .expect("Failed to insert test data");
        sqlx::query(&format!("SELECT {} FROM test_decimals WHERE id = 1", column))
            .fetch_one(pool)
            .await
            .expect("Failed to fetch row")
    }

    // ========================================================================
    // get_decimal tests
    // ========================================================================

    #[tokio::test]
    async fn text_keeps_its_scale() {
        let pool = setup_test_db().await;
        let row = fetch(
            &pool,
            "INSERT INTO test_decimals (id, text_value) VALUES (1, '61.50')",
            "text_value",
        )
        .await;

        let value = get_decimal(&row, "text_value").unwrap();

        assert_eq!(value, dec!(61.50));
        assert_eq!(value.to_string(), "61.50");
    }

    #[tokio::test]
    async fn text_that_is_not_a_number_is_rejected() {
        let pool = setup_test_db().await;
        let row = fetch(
            &pool,
            "INSERT INTO test_decimals (id, text_value) VALUES (1, 'not a number')",
            "text_value",
        )
        .await;

        let result = get_decimal(&row, "text_value");

        assert!(matches!(
            result,
            Err(RepositoryError::Database(msg)) if msg.contains("'not a number', not a decimal")
        ));
    }

    #[tokio::test]
    async fn integer_and_real_cells_are_accepted() {
        let pool = setup_test_db().await;
        let row = fetch(
            &pool,
            "INSERT INTO test_decimals (id, int_value, real_value) VALUES (1, -4957, 0.26)",
            "int_value, real_value",
        )
        .await;

        assert_eq!(get_decimal(&row, "int_value"), Ok(dec!(-4957)));
        assert_eq!(get_decimal(&row, "real_value"), Ok(dec!(0.26)));
    }

    #[tokio::test]
    async fn null_is_an_error() {
        let pool = setup_test_db().await;
        let row = fetch(
            &pool,
            "INSERT INTO test_decimals (id, null_value) VALUES (1, NULL)",
            "null_value",
        )
        .await;

        assert_eq!(
            get_decimal(&row, "null_value"),
            Err(RepositoryError::Database("Column 'null_value' is NULL".to_string()))
        );
    }

    #[tokio::test]
    async fn blob_is_an_unexpected_type() {
        let pool = setup_test_db().await;
        let row = fetch(
            &pool,
            "INSERT INTO test_decimals (id, blob_value) VALUES (1, x'00ff')",
            "blob_value",
        )
        .await;

        assert_eq!(
            get_decimal(&row, "blob_value"),
            Err(RepositoryError::Database(
                "Unexpected type 'BLOB' for column 'blob_value'".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn missing_column_is_reported() {
        let pool = setup_test_db().await;
        let row = fetch(&pool, "INSERT INTO test_decimals (id) VALUES (1)", "id").await;

        let result = get_decimal(&row, "nonexistent_column");

        assert!(matches!(
            result,
            Err(RepositoryError::Database(msg))
                if msg.starts_with("Column 'nonexistent_column' not found:")
        ));
    }

    // ========================================================================
    // get_optional_decimal tests
    // ========================================================================

    #[tokio::test]
    async fn optional_null_is_none() {
        let pool = setup_test_db().await;
        let row = fetch(
            &pool,
            "INSERT INTO test_decimals (id, null_value) VALUES (1, NULL)",
            "null_value",
        )
        .await;

        assert_eq!(get_optional_decimal(&row, "null_value"), Ok(None));
    }

    #[tokio::test]
    async fn optional_text_is_some() {
        let pool = setup_test_db().await;
        let row = fetch(
            &pool,
            "INSERT INTO test_decimals (id, text_value) VALUES (1, '0.003')",
            "text_value",
        )
        .await;

        assert_eq!(get_optional_decimal(&row, "text_value"), Ok(Some(dec!(0.003))));
    }

    #[test]
    fn decimal_text_round_trips_the_scale() {
        assert_eq!(decimal_to_text(dec!(300.9204)), "300.9204");
        assert_eq!(decimal_to_text(dec!(74.290)), "74.290");
    }
}
