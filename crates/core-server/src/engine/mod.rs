//! Per-table engine (component D).
//!
//! Every table is one DuckDB file holding a single table, `main.data`.
//! Operations here assume the caller already holds the table's lock
//! (component B) for anything mutating; reads open a fresh read-only
//! connection per §5's "readers open read-only connections" rule.
//! Connections are opened fresh per call and dropped at the end of the
//! function — there is no pooling, matching the file-per-table model
//! where at most one mutating connection exists at a time anyway.

pub mod profile;
pub mod sql;

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use duckdb::{params, AccessMode, Config as DuckdbConfig, Connection};
use serde::Serialize;

use crate::error::AppError;
use crate::metadata::models::ColumnDef;

pub(crate) const DATA_TABLE: &str = "data";

fn open(path: &Path) -> Result<Connection, AppError> {
    crate::paths::ensure_parent_dir(path)?;
    Connection::open(path).map_err(AppError::from)
}

pub(crate) fn open_readonly(path: &Path) -> Result<Connection, AppError> {
    let config = DuckdbConfig::default()
        .access_mode(AccessMode::ReadOnly)
        .map_err(AppError::from)?;
    Connection::open_with_flags(path, config).map_err(AppError::from)
}

fn render_column_def(col: &ColumnDef) -> String {
    let mut s = format!("{} {}", sql::quote_ident(&col.name), col.r#type);
    if !col.nullable {
        s.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        s.push_str(&format!(" DEFAULT {default}"));
    }
    s
}

pub(crate) fn get_columns(conn: &Connection) -> Result<Vec<ColumnDef>, AppError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info('{DATA_TABLE}')"))?;
    let rows = stmt.query_map(params![], |row| {
        Ok((
            row.get::<_, String>(1)?,           // name
            row.get::<_, String>(2)?,           // type
            row.get::<_, i64>(3)?,               // notnull
            row.get::<_, Option<String>>(4)?,   // dflt_value
        ))
    })?;
    let mut cols = Vec::new();
    for (i, row) in rows.enumerate() {
        let (name, r#type, notnull, default) = row?;
        cols.push(ColumnDef {
            name,
            r#type,
            nullable: notnull == 0,
            default,
            ordinal_position: i as i32,
        });
    }
    Ok(cols)
}

fn get_primary_key(conn: &Connection) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info('{DATA_TABLE}')"))?;
    let rows = stmt.query_map(params![], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))?;
    let mut pk: Vec<(i64, String)> = Vec::new();
    for row in rows {
        let (name, pk_index) = row?;
        if pk_index > 0 {
            pk.push((pk_index, name));
        }
    }
    pk.sort_by_key(|(index, _)| *index);
    Ok(pk.into_iter().map(|(_, name)| name).collect())
}

fn scalar_row_count(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {DATA_TABLE}"), params![], |r| r.get(0))
        .map_err(AppError::from)
}

// ---------------------------------------------------------------------------
// create_table / drop_table / get_table_info
// ---------------------------------------------------------------------------

pub fn create_table(path: &Path, columns: &[ColumnDef], primary_key: &[String]) -> Result<(), AppError> {
    if path.exists() {
        return Err(AppError::Conflict("table file already exists".into()));
    }
    if columns.is_empty() {
        return Err(AppError::Validation("a table needs at least one column".into()));
    }
    let conn = open(path)?;
    let cols_sql = columns.iter().map(render_column_def).collect::<Vec<_>>().join(", ");
    let pk_sql = if primary_key.is_empty() {
        String::new()
    } else {
        format!(
            ", PRIMARY KEY ({})",
            primary_key.iter().map(|c| sql::quote_ident(c)).collect::<Vec<_>>().join(", ")
        )
    };
    let result = conn.execute_batch(&format!("CREATE TABLE {DATA_TABLE} ({cols_sql}{pk_sql})"));
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result?;
    Ok(())
}

/// Idempotent: dropping a file that does not exist succeeds.
pub fn drop_table(path: &Path) -> Result<(), AppError> {
    if !path.exists() {
        return Ok(());
    }
    std::fs::remove_file(path).map_err(AppError::from)
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub row_count: i64,
    pub size_bytes: i64,
}

pub fn get_table_info(path: &Path) -> Result<TableInfo, AppError> {
    let conn = open_readonly(path)?;
    let columns = get_columns(&conn)?;
    let primary_key = get_primary_key(&conn)?;
    let row_count = scalar_row_count(&conn)?;
    let size_bytes = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);
    Ok(TableInfo { columns, primary_key, row_count, size_bytes })
}

// ---------------------------------------------------------------------------
// preview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResult {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<serde_json::Value>,
}

pub fn preview(path: &Path, limit: i64) -> Result<PreviewResult, AppError> {
    let conn = open_readonly(path)?;
    let columns = get_columns(&conn)?;
    let limit = limit.clamp(0, 10_000);
    let mut stmt = conn.prepare(&format!("SELECT * FROM {DATA_TABLE} LIMIT {limit}"))?;
    let mut rows_out = Vec::new();
    let mut rows = stmt.query(params![])?;
    while let Some(row) = rows.next()? {
        let mut record = serde_json::Map::new();
        for (i, col) in columns.iter().enumerate() {
            let value: duckdb::types::Value = row.get(i)?;
            record.insert(col.name.clone(), duckdb_value_to_json(value));
        }
        rows_out.push(serde_json::Value::Object(record));
    }
    Ok(PreviewResult { columns, rows: rows_out })
}

fn duckdb_value_to_json(value: duckdb::types::Value) -> serde_json::Value {
    use duckdb::types::Value as V;
    match value {
        V::Null => serde_json::Value::Null,
        V::Boolean(b) => serde_json::Value::Bool(b),
        V::TinyInt(i) => serde_json::json!(i),
        V::SmallInt(i) => serde_json::json!(i),
        V::Int(i) => serde_json::json!(i),
        V::BigInt(i) => serde_json::json!(i),
        V::HugeInt(i) => serde_json::Value::String(i.to_string()),
        V::UTinyInt(i) => serde_json::json!(i),
        V::USmallInt(i) => serde_json::json!(i),
        V::UInt(i) => serde_json::json!(i),
        V::UBigInt(i) => serde_json::json!(i),
        V::Float(f) => serde_json::json!(f),
        V::Double(f) => serde_json::json!(f),
        V::Text(s) => serde_json::Value::String(s),
        V::Blob(b) => serde_json::Value::String(BASE64.encode(b)),
        other => serde_json::Value::String(format!("{other:?}")),
    }
}

// ---------------------------------------------------------------------------
// add_column / drop_column / alter_column
// ---------------------------------------------------------------------------

pub fn add_column(path: &Path, column: &ColumnDef) -> Result<(), AppError> {
    if !column.nullable && column.default.is_none() {
        return Err(AppError::Validation(
            "adding a NOT NULL column to an existing table requires a default".into(),
        ));
    }
    let conn = open(path)?;
    let existing = get_columns(&conn)?;
    if existing.iter().any(|c| c.name == column.name) {
        return Err(AppError::Conflict(format!("column '{}' already exists", column.name)));
    }
    conn.execute_batch(&format!("ALTER TABLE {DATA_TABLE} ADD COLUMN {}", render_column_def(column)))?;
    Ok(())
}

pub fn drop_column(path: &Path, column_name: &str, primary_key: &[String]) -> Result<(), AppError> {
    if primary_key.iter().any(|c| c == column_name) {
        return Err(AppError::Validation(format!("cannot drop '{column_name}': part of the primary key")));
    }
    let conn = open(path)?;
    let existing = get_columns(&conn)?;
    if !existing.iter().any(|c| c.name == column_name) {
        return Err(AppError::NotFound(format!("column '{column_name}' not found")));
    }
    if existing.len() <= 1 {
        return Err(AppError::Validation("cannot drop the last remaining column".into()));
    }
    conn.execute_batch(&format!("ALTER TABLE {DATA_TABLE} DROP COLUMN {}", sql::quote_ident(column_name)))?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct AlterColumnChange {
    pub new_name: Option<String>,
    pub new_type: Option<String>,
    pub new_nullable: Option<bool>,
    pub new_default: Option<String>,
}

impl AlterColumnChange {
    pub fn is_empty(&self) -> bool {
        self.new_name.is_none() && self.new_type.is_none() && self.new_nullable.is_none() && self.new_default.is_none()
    }
}

pub fn alter_column(path: &Path, column_name: &str, change: &AlterColumnChange) -> Result<(), AppError> {
    if change.is_empty() {
        return Err(AppError::Validation("at least one change is required".into()));
    }
    let conn = open(path)?;
    let existing = get_columns(&conn)?;
    if !existing.iter().any(|c| c.name == column_name) {
        return Err(AppError::NotFound(format!("column '{column_name}' not found")));
    }
    if let Some(new_name) = &change.new_name {
        if new_name != column_name && existing.iter().any(|c| &c.name == new_name) {
            return Err(AppError::Conflict(format!("column '{new_name}' already exists")));
        }
    }

    let quoted = sql::quote_ident(column_name);
    if let Some(new_type) = &change.new_type {
        conn.execute_batch(&format!("ALTER TABLE {DATA_TABLE} ALTER COLUMN {quoted} TYPE {new_type}"))?;
    }
    if let Some(nullable) = change.new_nullable {
        let clause = if nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
        conn.execute_batch(&format!("ALTER TABLE {DATA_TABLE} ALTER COLUMN {quoted} {clause}"))?;
    }
    if let Some(default) = &change.new_default {
        conn.execute_batch(&format!("ALTER TABLE {DATA_TABLE} ALTER COLUMN {quoted} SET DEFAULT {default}"))?;
    }
    if let Some(new_name) = &change.new_name {
        if new_name != column_name {
            conn.execute_batch(&format!(
                "ALTER TABLE {DATA_TABLE} RENAME COLUMN {quoted} TO {}",
                sql::quote_ident(new_name)
            ))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// add_primary_key / drop_primary_key
// ---------------------------------------------------------------------------

fn recreate_with_primary_key(conn: &Connection, columns: &[ColumnDef], primary_key: &[String]) -> Result<(), AppError> {
    let cols_sql = columns.iter().map(render_column_def).collect::<Vec<_>>().join(", ");
    let pk_sql = if primary_key.is_empty() {
        String::new()
    } else {
        format!(
            ", PRIMARY KEY ({})",
            primary_key.iter().map(|c| sql::quote_ident(c)).collect::<Vec<_>>().join(", ")
        )
    };
    conn.execute_batch(&format!(
        "BEGIN TRANSACTION;\
         CREATE TABLE {DATA_TABLE}__new ({cols_sql}{pk_sql});\
         INSERT INTO {DATA_TABLE}__new SELECT * FROM {DATA_TABLE};\
         DROP TABLE {DATA_TABLE};\
         ALTER TABLE {DATA_TABLE}__new RENAME TO {DATA_TABLE};\
         COMMIT;"
    ))?;
    Ok(())
}

pub fn add_primary_key(path: &Path, primary_key: &[String]) -> Result<(), AppError> {
    if primary_key.is_empty() {
        return Err(AppError::Validation("primary_key requires at least one column".into()));
    }
    let conn = open(path)?;
    if !get_primary_key(&conn)?.is_empty() {
        return Err(AppError::Conflict("table already has a primary key".into()));
    }
    let existing = get_columns(&conn)?;
    for c in primary_key {
        if !existing.iter().any(|e| &e.name == c) {
            return Err(AppError::Validation(format!("column '{c}' does not exist")));
        }
    }
    let pk_list = primary_key.iter().map(|c| sql::quote_ident(c)).collect::<Vec<_>>().join(", ");
    let dup_count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM (SELECT {pk_list} FROM {DATA_TABLE} GROUP BY {pk_list} HAVING COUNT(*) > 1) t"),
        params![],
        |r| r.get(0),
    )?;
    if dup_count > 0 {
        return Err(AppError::Conflict("existing data violates the requested primary key uniqueness".into()));
    }
    recreate_with_primary_key(&conn, &existing, primary_key)
}

pub fn drop_primary_key(path: &Path) -> Result<(), AppError> {
    let conn = open(path)?;
    if get_primary_key(&conn)?.is_empty() {
        return Err(AppError::Validation("table has no primary key".into()));
    }
    let existing = get_columns(&conn)?;
    recreate_with_primary_key(&conn, &existing, &[])
}

// ---------------------------------------------------------------------------
// delete_rows
// ---------------------------------------------------------------------------

/// `;`, `--`, and `/*` are rejected outright — the engine never builds a
/// multi-statement or commented-out WHERE clause.
pub fn validate_where_clause(where_clause: &str) -> Result<(), AppError> {
    if where_clause.contains(';') || where_clause.contains("--") || where_clause.contains("/*") {
        return Err(AppError::Validation("where_clause contains forbidden tokens".into()));
    }
    Ok(())
}

/// True if the clause is the empty string or an unconditional tautology
/// (`1=1`, `TRUE`) — the shapes that the auto-snapshot "delete all rows"
/// trigger matches against.
pub fn is_delete_all(where_clause: &str) -> bool {
    let normalized = where_clause.trim().to_uppercase();
    normalized.is_empty() || normalized == "1=1" || normalized == "TRUE"
}

pub fn delete_rows(path: &Path, where_clause: &str) -> Result<u64, AppError> {
    validate_where_clause(where_clause)?;
    let conn = open(path)?;
    let sql_text = if where_clause.trim().is_empty() {
        format!("DELETE FROM {DATA_TABLE}")
    } else {
        format!("DELETE FROM {DATA_TABLE} WHERE {where_clause}")
    };
    let affected = conn.execute(&sql_text, params![])?;
    Ok(affected as u64)
}

// ---------------------------------------------------------------------------
// import_from_file / export_to_file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ImportFormat {
    Csv { delimiter: char, quote: char, escape: char, header: bool },
    Parquet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    AppendOnly,
    UpdateDuplicates,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub incremental: bool,
    pub dedup_mode: DedupMode,
}

#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportStats {
    pub imported_rows: u64,
    pub total_rows: u64,
    pub size_bytes: u64,
    pub columns: Vec<String>,
}

fn configure_httpfs_credentials(conn: &Connection, creds: &RemoteCredentials) -> Result<(), AppError> {
    conn.execute_batch("INSTALL httpfs; LOAD httpfs;")?;
    conn.execute(
        &format!("SET s3_access_key_id='{}'", sql::escape_sql_literal(&creds.access_key_id)),
        params![],
    )?;
    conn.execute(
        &format!("SET s3_secret_access_key='{}'", sql::escape_sql_literal(&creds.secret_access_key)),
        params![],
    )?;
    if let Some(region) = &creds.region {
        conn.execute(&format!("SET s3_region='{}'", sql::escape_sql_literal(region)), params![])?;
    }
    if let Some(endpoint) = &creds.endpoint {
        conn.execute(&format!("SET s3_endpoint='{}'", sql::escape_sql_literal(endpoint)), params![])?;
    }
    Ok(())
}

fn read_expr(source_path: &str, format: &ImportFormat) -> String {
    let escaped = sql::escape_sql_literal(source_path);
    match format {
        ImportFormat::Csv { delimiter, quote, escape, header } => format!(
            "read_csv('{escaped}', delim='{delimiter}', quote='{quote}', escape='{escape}', header={header})"
        ),
        ImportFormat::Parquet => format!("read_parquet('{escaped}')"),
    }
}

fn upsert_from_source(conn: &Connection, source_sql: &str, primary_key: &[String]) -> Result<u64, AppError> {
    let cols = get_columns(conn)?;
    let set_clause = cols
        .iter()
        .filter(|c| !primary_key.contains(&c.name))
        .map(|c| {
            let q = sql::quote_ident(&c.name);
            format!("{q} = EXCLUDED.{q}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    let pk_list = primary_key.iter().map(|c| sql::quote_ident(c)).collect::<Vec<_>>().join(", ");
    let before = scalar_row_count(conn)?;
    let stmt = if set_clause.is_empty() {
        format!("INSERT INTO {DATA_TABLE} SELECT * FROM {source_sql} ON CONFLICT ({pk_list}) DO NOTHING")
    } else {
        format!("INSERT INTO {DATA_TABLE} SELECT * FROM {source_sql} ON CONFLICT ({pk_list}) DO UPDATE SET {set_clause}")
    };
    conn.execute(&stmt, params![])?;
    let after = scalar_row_count(conn)?;
    Ok((after - before).max(0) as u64)
}

#[allow(clippy::too_many_arguments)]
pub fn import_from_file(
    path: &Path,
    source_path: &str,
    format: &ImportFormat,
    options: &ImportOptions,
    primary_key: &[String],
    credentials: Option<&RemoteCredentials>,
) -> Result<ImportStats, AppError> {
    let conn = open(path)?;
    if let Some(creds) = credentials {
        configure_httpfs_credentials(&conn, creds)?;
    }
    let source_sql = read_expr(source_path, format);

    if !options.incremental {
        conn.execute(&format!("DELETE FROM {DATA_TABLE}"), params![])?;
    }

    let imported_rows = if options.incremental && options.dedup_mode == DedupMode::UpdateDuplicates && !primary_key.is_empty() {
        upsert_from_source(&conn, &source_sql, primary_key)?
    } else {
        let before = scalar_row_count(&conn)?;
        conn.execute(&format!("INSERT INTO {DATA_TABLE} SELECT * FROM {source_sql}"), params![])?;
        let after = scalar_row_count(&conn)?;
        (after - before).max(0) as u64
    };

    let total_rows = scalar_row_count(&conn)? as u64;
    let columns = get_columns(&conn)?.into_iter().map(|c| c.name).collect();
    let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    Ok(ImportStats { imported_rows, total_rows, size_bytes, columns })
}

#[derive(Debug, Clone, Copy)]
pub enum ExportFormat {
    Csv,
    Parquet,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub columns: Option<Vec<String>>,
    pub where_clause: Option<String>,
    pub compression: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportStats {
    pub rows_exported: u64,
    pub file_size_bytes: u64,
}

pub fn export_to_file(path: &Path, dest_path: &str, format: ExportFormat, options: &ExportOptions) -> Result<ExportStats, AppError> {
    let conn = open_readonly(path)?;
    let projection = options
        .columns
        .as_ref()
        .map(|cols| cols.iter().map(|c| sql::quote_ident(c)).collect::<Vec<_>>().join(", "))
        .unwrap_or_else(|| "*".to_string());
    let where_sql = options.where_clause.as_ref().map(|w| format!(" WHERE {w}")).unwrap_or_default();
    let select = format!("SELECT {projection} FROM {DATA_TABLE}{where_sql}");

    let copy_opts = match format {
        ExportFormat::Csv => "(FORMAT CSV, HEADER)".to_string(),
        ExportFormat::Parquet => match &options.compression {
            Some(c) => format!("(FORMAT PARQUET, COMPRESSION '{c}')"),
            None => "(FORMAT PARQUET)".to_string(),
        },
    };

    let rows_exported: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM ({select}) t"), params![], |r| r.get(0))?;
    conn.execute(
        &format!("COPY ({select}) TO '{}' {copy_opts}", sql::escape_sql_literal(dest_path)),
        params![],
    )?;
    let file_size_bytes = std::fs::metadata(dest_path).map(|m| m.len()).unwrap_or(0);

    Ok(ExportStats { rows_exported: rows_exported as u64, file_size_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_semicolon_in_where_clause() {
        assert!(validate_where_clause("id = 1; DROP TABLE data").is_err());
    }

    #[test]
    fn rejects_sql_comment_markers() {
        assert!(validate_where_clause("id = 1 -- comment").is_err());
        assert!(validate_where_clause("id = 1 /* comment */").is_err());
    }

    #[test]
    fn accepts_plain_predicate() {
        assert!(validate_where_clause("amount > 100 AND status = 'paid'").is_ok());
    }

    #[test]
    fn recognizes_delete_all_shapes() {
        assert!(is_delete_all(""));
        assert!(is_delete_all("1=1"));
        assert!(is_delete_all("true"));
        assert!(!is_delete_all("id = 5"));
    }

    #[test]
    fn alter_column_change_requires_at_least_one_field() {
        assert!(AlterColumnChange::default().is_empty());
        let change = AlterColumnChange { new_type: Some("VARCHAR".into()), ..Default::default() };
        assert!(!change.is_empty());
    }
}
