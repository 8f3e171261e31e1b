//! Materializing result tables into SQLite.
//!
//! [`TableMaterializer`] creates a table from an inferred schema on first
//! use and merges rows into it afterwards. Each [`TableMaterializer::upsert`]
//! runs in a single transaction and commits once at the end; a row that
//! cannot be stored is recorded in the report and the batch carries on.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqlitePool};
use sqlx::{Row, Sqlite};

use crate::models::{ResultTable, Scalar};
use crate::schema::{coerce, infer_schema, quote_ident, ColumnDef, ColumnType, TableSchema, ID_COLUMN};

/// Result of [`TableMaterializer::ensure_table`].
#[derive(Debug, Clone, PartialEq)]
pub enum TableState {
    Created(TableSchema),
    /// `new_columns` are incoming columns the table lacks. They are reported
    /// and skipped, never added.
    Existing {
        schema: TableSchema,
        new_columns: Vec<String>,
    },
}

impl TableState {
    pub fn schema(&self) -> &TableSchema {
        match self {
            TableState::Created(schema) => schema,
            TableState::Existing { schema, .. } => schema,
        }
    }

    pub fn new_columns(&self) -> &[String] {
        match self {
            TableState::Created(_) => &[],
            TableState::Existing { new_columns, .. } => new_columns,
        }
    }
}

/// A row that could not be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertError {
    /// `id` value, else `sku` value, else `row <n>` (1-based).
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializeReport {
    pub table: String,
    pub created: bool,
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<UpsertError>,
    pub new_columns: Vec<String>,
}

pub struct TableMaterializer {
    pool: SqlitePool,
    sample_rows: usize,
}

impl TableMaterializer {
    pub fn new(pool: SqlitePool, sample_rows: usize) -> Self {
        Self {
            pool,
            sample_rows: sample_rows.max(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create `name` from the schema inferred for `table` if it does not
    /// exist yet; otherwise read its current columns.
    pub async fn ensure_table(&self, name: &str, table: &ResultTable) -> Result<TableState> {
        match self.existing_schema(name).await? {
            None => {
                let schema = infer_schema(table, self.sample_rows);
                sqlx::query(&schema.create_sql(name))
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to create table {}", name))?;
                tracing::info!(table = name, columns = schema.columns.len(), "created table");
                Ok(TableState::Created(schema))
            }
            Some(schema) => {
                let mut new_columns: Vec<String> = Vec::new();
                for column in table.columns() {
                    if schema.column(column).is_none() && !new_columns.contains(column) {
                        new_columns.push(column.clone());
                    }
                }
                if !new_columns.is_empty() {
                    tracing::warn!(
                        table = name,
                        columns = ?new_columns,
                        "incoming columns missing from table; skipped"
                    );
                }
                Ok(TableState::Existing {
                    schema,
                    new_columns,
                })
            }
        }
    }

    async fn existing_schema(&self, name: &str) -> Result<Option<TableSchema>> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        if found.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(name)))
            .fetch_all(&self.pool)
            .await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let column: String = row.try_get("name")?;
            let declared: String = row.try_get("type")?;
            let pk: i64 = row.try_get("pk")?;
            columns.push(ColumnDef {
                ty: ColumnType::from_declared(&declared, pk > 0),
                name: column,
            });
        }
        Ok(Some(TableSchema { columns }))
    }

    /// Merge every row of `table` into `name`.
    pub async fn upsert(&self, name: &str, table: &ResultTable) -> Result<MaterializeReport> {
        let state = self.ensure_table(name, table).await?;
        let schema = state.schema();

        let mut report = MaterializeReport {
            table: name.to_string(),
            created: matches!(state, TableState::Created(_)),
            new_columns: state.new_columns().to_vec(),
            ..MaterializeReport::default()
        };

        // (position in the incoming row, target column)
        let mut targets: Vec<(usize, &ColumnDef)> = Vec::new();
        for def in &schema.columns {
            if let Some(idx) = table.column_index(&def.name) {
                targets.push((idx, def));
            }
        }
        let sku_idx = table.column_index("sku");

        let mut tx = self.pool.begin().await?;

        for (n, row) in table.rows().iter().enumerate() {
            let key = row_key(row, table.column_index(ID_COLUMN), sku_idx, n);

            let mut names = Vec::with_capacity(targets.len());
            let mut values = Vec::with_capacity(targets.len());
            let mut failure = None;
            for (idx, def) in &targets {
                match coerce(&def.name, &row[*idx], def.ty) {
                    Ok(Scalar::Null) if def.name == ID_COLUMN => {}
                    Ok(value) => {
                        names.push(def.name.as_str());
                        values.push(value);
                    }
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }
            if let Some(error) = failure {
                tracing::warn!(table = name, key = %key, error = %error, "row skipped");
                report.errors.push(UpsertError { key, error });
                continue;
            }

            let id = names
                .iter()
                .position(|c| *c == ID_COLUMN)
                .and_then(|pos| match &values[pos] {
                    Scalar::Int(id) => Some(*id),
                    _ => None,
                });

            match merge_row(&mut *tx, name, &names, values, id).await {
                Ok(Merge::Updated) => report.updated += 1,
                Ok(Merge::Inserted) => report.inserted += 1,
                Err(e) => {
                    tracing::warn!(table = name, key = %key, error = %e, "row skipped");
                    report.errors.push(UpsertError {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            table = name,
            inserted = report.inserted,
            updated = report.updated,
            errors = report.errors.len(),
            "upsert committed"
        );
        Ok(report)
    }
}

enum Merge {
    Inserted,
    Updated,
}

async fn merge_row(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[&str],
    values: Vec<Scalar>,
    id: Option<i64>,
) -> Result<Merge, sqlx::Error> {
    let exists = match id {
        Some(id) => {
            let sql = format!(
                "SELECT 1 FROM {} WHERE {} = ?",
                quote_ident(table),
                quote_ident(ID_COLUMN)
            );
            sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
                .is_some()
        }
        None => false,
    };

    let sql = upsert_sql(table, columns);
    let mut query = sqlx::query(&sql);
    for value in values {
        query = bind_scalar(query, value);
    }
    query.execute(&mut *conn).await?;
    Ok(if exists { Merge::Updated } else { Merge::Inserted })
}

fn row_key(row: &[Scalar], id_idx: Option<usize>, sku_idx: Option<usize>, n: usize) -> String {
    [id_idx, sku_idx]
        .into_iter()
        .flatten()
        .map(|idx| &row[idx])
        .find(|v| !v.is_null())
        .map(Scalar::render)
        .unwrap_or_else(|| format!("row {}", n + 1))
}

/// `INSERT … ON CONFLICT(id) DO UPDATE` when an id is present, plain insert
/// (fresh auto-increment key) otherwise.
fn upsert_sql(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        quoted.join(", "),
        placeholders
    );
    if columns.contains(&ID_COLUMN) {
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| **c != ID_COLUMN)
            .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
            .collect();
        if updates.is_empty() {
            sql.push_str(" ON CONFLICT(\"id\") DO NOTHING");
        } else {
            sql.push_str(&format!(" ON CONFLICT(\"id\") DO UPDATE SET {}", updates.join(", ")));
        }
    }
    sql
}

fn bind_scalar<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Scalar,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Scalar::Null => query.bind(Option::<String>::None),
        Scalar::Int(v) => query.bind(v),
        Scalar::Float(v) => query.bind(v),
        Scalar::Text(s) => query.bind(s),
    }
}
