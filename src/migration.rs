//! Idempotent bootstrap DDL: enum types, the four library tables, foreign keys and indexes.
//! Every statement can be re-run against an already migrated database.

use crate::error::AppError;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

const ENUM_TYPES: &[(&str, &[&str])] = &[
    ("book_status", &["available", "removed"]),
    ("reader_type", &["student", "teacher", "public"]),
    ("reader_status", &["active", "frozen", "deleted"]),
    ("borrow_status", &["borrowed", "returned", "overdue", "lost"]),
    ("reservation_status", &["pending", "ready", "cancelled", "completed"]),
];

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS books (
        isbn TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        publisher TEXT NOT NULL,
        publish_year INTEGER NOT NULL,
        category TEXT NOT NULL,
        total_quantity INTEGER NOT NULL,
        available_quantity INTEGER NOT NULL,
        location TEXT NOT NULL,
        description TEXT,
        status book_status NOT NULL DEFAULT 'available',
        CONSTRAINT books_stock_check CHECK (available_quantity BETWEEN 0 AND total_quantity)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS readers (
        reader_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        id_card TEXT NOT NULL,
        phone TEXT NOT NULL,
        email TEXT,
        reader_type reader_type NOT NULL,
        register_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        valid_until DATE NOT NULL,
        status reader_status NOT NULL DEFAULT 'active',
        credit_score INTEGER NOT NULL DEFAULT 100,
        CONSTRAINT readers_credit_check CHECK (credit_score BETWEEN 0 AND 100)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS borrow_records (
        borrow_id TEXT PRIMARY KEY,
        reader_id TEXT NOT NULL REFERENCES readers (reader_id),
        isbn TEXT NOT NULL REFERENCES books (isbn),
        borrow_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        due_date DATE NOT NULL,
        return_date TIMESTAMPTZ,
        renew_count INTEGER NOT NULL DEFAULT 0,
        status borrow_status NOT NULL DEFAULT 'borrowed',
        fine_cents BIGINT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reservation_records (
        reservation_id TEXT PRIMARY KEY,
        reader_id TEXT NOT NULL REFERENCES readers (reader_id),
        isbn TEXT NOT NULL REFERENCES books (isbn),
        reserve_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        status reservation_status NOT NULL DEFAULT 'pending',
        notify_date TIMESTAMPTZ,
        expire_date TIMESTAMPTZ
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS books_title_idx ON books (title)",
    "CREATE INDEX IF NOT EXISTS books_category_idx ON books (category)",
    "CREATE INDEX IF NOT EXISTS readers_id_card_idx ON readers (id_card)",
    "CREATE INDEX IF NOT EXISTS readers_phone_idx ON readers (phone)",
    "CREATE INDEX IF NOT EXISTS borrow_records_reader_idx ON borrow_records (reader_id, status)",
    "CREATE INDEX IF NOT EXISTS borrow_records_isbn_idx ON borrow_records (isbn, status)",
    "CREATE INDEX IF NOT EXISTS reservation_records_isbn_idx ON reservation_records (isbn, status, reserve_date)",
    "CREATE INDEX IF NOT EXISTS reservation_records_reader_idx ON reservation_records (reader_id, status)",
];

fn enum_ddl(name: &str, values: &[&str]) -> String {
    let values: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect();
    format!("CREATE TYPE {} AS ENUM ({})", quote_ident(name), values.join(", "))
}

/// Create enum types, tables and indexes. Types that already exist are skipped.
pub async fn apply_migrations(pool: &PgPool) -> Result<(), AppError> {
    for (name, values) in ENUM_TYPES {
        // CREATE TYPE has no IF NOT EXISTS; a duplicate is the expected failure on re-run.
        let _ = sqlx::query(&enum_ddl(name, values)).execute(pool).await;
    }
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!(tables = TABLES.len(), "migrations applied");
    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::Config(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&db_name)
            .fetch_one(&mut conn)
            .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::Config("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_swaps_database_name() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/library?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "library");
    }

    #[test]
    fn url_without_path_is_a_config_error() {
        assert!(matches!(parse_db_name_from_url("library"), Err(AppError::Config(_))));
    }

    #[test]
    fn enum_ddl_quotes_name_and_values() {
        assert_eq!(
            enum_ddl("book_status", &["available", "removed"]),
            "CREATE TYPE \"book_status\" AS ENUM ('available', 'removed')"
        );
    }

    #[test]
    fn every_enum_type_is_created_before_tables_use_it() {
        for (name, _) in ENUM_TYPES {
            assert!(TABLES.iter().any(|t| t.contains(&format!(" {} ", name))));
        }
    }
}
