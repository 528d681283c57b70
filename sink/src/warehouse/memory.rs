//! An in-memory warehouse used by the test suites.
//!
//! The memory warehouse accepts the exact statement shapes the generators in
//! [`crate::warehouse::sql`] produce and applies their effects to an
//! in-memory catalog, so pipeline tests observe real table states and the
//! full statement log. Errors can be injected to exercise the retry path.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{ErrorKind, SinkError, SinkResult};
use crate::sink_error;
use crate::types::Record;
use crate::warehouse::{ConnectionFactory, WarehouseConnection};

#[derive(Debug, Default, Clone)]
struct TableState {
    /// `(name, native type)` in position order.
    columns: Vec<(String, String)>,
    primary_key: Vec<String>,
    rows: Vec<Record>,
}

#[derive(Debug, Default)]
struct Inner {
    schemas: BTreeMap<String, BTreeMap<String, TableState>>,
    executed: Vec<String>,
    failures: VecDeque<SinkError>,
    connections: u32,
}

/// Shared in-memory warehouse state, usable as a [`ConnectionFactory`].
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error; the next connection call consumes and returns it.
    pub async fn inject_failure(&self, error: SinkError) {
        self.inner.lock().await.failures.push_back(error);
    }

    /// Returns every statement executed so far, in order.
    pub async fn executed_statements(&self) -> Vec<String> {
        self.inner.lock().await.executed.clone()
    }

    /// Returns how many connections were handed out.
    pub async fn connections(&self) -> u32 {
        self.inner.lock().await.connections
    }

    pub async fn table_rows(&self, schema: &str, table: &str) -> Vec<Record> {
        let inner = self.inner.lock().await;
        inner
            .schemas
            .get(schema)
            .and_then(|tables| tables.get(table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, schema: &str, table: &str) -> usize {
        self.table_rows(schema, table).await.len()
    }

    pub async fn column_types(&self, schema: &str, table: &str) -> Vec<(String, String)> {
        let inner = self.inner.lock().await;
        inner
            .schemas
            .get(schema)
            .and_then(|tables| tables.get(table))
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    pub async fn has_table(&self, schema: &str, table: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .schemas
            .get(schema)
            .is_some_and(|tables| tables.contains_key(table))
    }
}

impl ConnectionFactory for MemoryWarehouse {
    type Conn = MemoryConnection;

    async fn connect(&self) -> SinkResult<Self::Conn> {
        let mut inner = self.inner.lock().await;
        inner.connections += 1;

        Ok(MemoryConnection {
            inner: Arc::clone(&self.inner),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnection {
    inner: Arc<Mutex<Inner>>,
}

impl WarehouseConnection for MemoryConnection {
    async fn execute(&self, sql: &str) -> SinkResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }

        inner.executed.push(sql.to_string());
        apply(&mut inner, sql)
    }

    async fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Record],
    ) -> SinkResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }

        let state = table_mut(&mut inner, schema, table)?;
        for row in rows {
            let projected: Record = columns
                .iter()
                .map(|column| {
                    let value = row.get(column).cloned().unwrap_or(Value::Null);
                    (column.clone(), value)
                })
                .collect();
            state.rows.push(projected);
        }

        Ok(())
    }

    async fn schema_names(&self) -> SinkResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }

        Ok(inner.schemas.keys().cloned().collect())
    }

    async fn table_names(&self, schema: &str) -> SinkResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }

        Ok(inner
            .schemas
            .get(schema)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn table_columns(&self, schema: &str, table: &str) -> SinkResult<Vec<(String, String)>> {
        let mut inner = self.inner.lock().await;
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }

        Ok(inner
            .schemas
            .get(schema)
            .and_then(|tables| tables.get(table))
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

fn unquote(identifier: &str) -> String {
    identifier.trim().trim_matches('"').to_string()
}

fn parse_qualified(name: &str) -> (String, String) {
    match name.split_once('.') {
        Some((schema, table)) => (unquote(schema), unquote(table)),
        None => (String::new(), unquote(name)),
    }
}

fn table_mut<'a>(
    inner: &'a mut Inner,
    schema: &str,
    table: &str,
) -> SinkResult<&'a mut TableState> {
    inner
        .schemas
        .get_mut(schema)
        .and_then(|tables| tables.get_mut(table))
        .ok_or_else(|| {
            sink_error!(
                ErrorKind::WarehouseQueryFailed,
                "Table does not exist",
                format!("{schema}.{table}")
            )
        })
}

/// Splits a parenthesized clause list on top-level commas only, so a
/// `PRIMARY KEY (a, b)` clause stays in one piece.
fn split_clauses(body: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                clauses.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if !current.trim().is_empty() {
        clauses.push(current.trim().to_string());
    }

    clauses
}

fn apply(inner: &mut Inner, sql: &str) -> SinkResult<()> {
    if let Some(schema) = sql.strip_prefix("CREATE SCHEMA ") {
        inner.schemas.entry(unquote(schema)).or_default();
        return Ok(());
    }

    if let Some(rest) = sql
        .strip_prefix("CREATE TEMPORARY TABLE ")
        .or_else(|| sql.strip_prefix("CREATE TABLE "))
    {
        return apply_create_table(inner, rest);
    }

    if let Some(name) = sql.strip_prefix("DROP TABLE IF EXISTS ") {
        let (schema, table) = parse_qualified(name);
        if let Some(tables) = inner.schemas.get_mut(&schema) {
            tables.remove(&table);
        }
        return Ok(());
    }

    if let Some(name) = sql.strip_prefix("DROP TABLE ") {
        let (schema, table) = parse_qualified(name);
        let removed = inner
            .schemas
            .get_mut(&schema)
            .and_then(|tables| tables.remove(&table));
        return match removed {
            Some(_) => Ok(()),
            None => bail_unsupported(sql, "table does not exist"),
        };
    }

    if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
        return apply_alter_table(inner, sql, rest);
    }

    if sql.starts_with("GRANT ") {
        return Ok(());
    }

    if let Some(rest) = sql.strip_prefix("MERGE INTO ") {
        return apply_merge(inner, sql, rest);
    }

    bail_unsupported(sql, "unrecognized statement")
}

fn bail_unsupported(sql: &str, reason: &str) -> SinkResult<()> {
    Err(sink_error!(
        ErrorKind::WarehouseQueryFailed,
        "Statement failed",
        format!("{reason}: {sql}")
    ))
}

fn apply_create_table(inner: &mut Inner, rest: &str) -> SinkResult<()> {
    let Some((name, body)) = rest.split_once(" (") else {
        return bail_unsupported(rest, "malformed CREATE TABLE");
    };
    let body = body.strip_suffix(')').unwrap_or(body);

    let (schema, table) = parse_qualified(name);
    let mut state = TableState::default();

    for clause in split_clauses(body) {
        if let Some(keys) = clause
            .strip_prefix("PRIMARY KEY (")
            .and_then(|k| k.strip_suffix(')'))
        {
            state.primary_key = keys.split(',').map(unquote).collect();
            continue;
        }

        let mut parts = clause.split_whitespace();
        let (Some(column), Some(native)) = (parts.next(), parts.next()) else {
            return bail_unsupported(&clause, "malformed column clause");
        };
        state
            .columns
            .push((unquote(column), native.to_string()));
    }

    inner
        .schemas
        .entry(schema)
        .or_default()
        .insert(table, state);

    Ok(())
}

fn apply_alter_table(inner: &mut Inner, sql: &str, rest: &str) -> SinkResult<()> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    match tokens.as_slice() {
        [name, "ADD", "COLUMN", column, native] => {
            let (schema, table) = parse_qualified(name);
            let state = table_mut(inner, &schema, &table)?;
            state.columns.push((unquote(column), (*native).to_string()));
            Ok(())
        }
        [name, "ALTER", column, "TYPE", native] => {
            let (schema, table) = parse_qualified(name);
            let column = unquote(column);
            let state = table_mut(inner, &schema, &table)?;
            match state.columns.iter_mut().find(|(c, _)| *c == column) {
                Some((_, ty)) => {
                    *ty = (*native).to_string();
                    Ok(())
                }
                None => bail_unsupported(sql, "column does not exist"),
            }
        }
        _ => bail_unsupported(sql, "malformed ALTER TABLE"),
    }
}

fn apply_merge(inner: &mut Inner, sql: &str, rest: &str) -> SinkResult<()> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let (Some(target), Some(source)) = (tokens.first(), tokens.get(2)) else {
        return bail_unsupported(sql, "malformed MERGE");
    };

    let (source_schema, source_table) = parse_qualified(source);
    let source_state = match inner
        .schemas
        .get(&source_schema)
        .and_then(|tables| tables.get(&source_table))
    {
        Some(state) => state.clone(),
        None => return bail_unsupported(sql, "merge source does not exist"),
    };

    let (target_schema, target_table) = parse_qualified(target);
    let target_state = table_mut(inner, &target_schema, &target_table)?;
    let keys = target_state.primary_key.clone();
    if keys.is_empty() {
        return bail_unsupported(sql, "merge target has no primary key");
    }

    for row in source_state.rows {
        let matched = target_state.rows.iter_mut().find(|existing| {
            keys.iter()
                .all(|key| existing.get(key) == row.get(key))
        });

        match matched {
            Some(existing) => {
                for (column, value) in row.iter() {
                    if !keys.contains(column) {
                        existing.insert(column.clone(), value.clone());
                    }
                }
            }
            None => target_state.rows.push(row),
        }
    }

    Ok(())
}
