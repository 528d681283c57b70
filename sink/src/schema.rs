//! Idempotent reconciliation of declared tables against the live warehouse.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{ErrorKind, SinkResult};
use crate::sink_error;
use crate::types::{ColumnDef, TableDef, transition_allowed};
use crate::warehouse::{ConnectionFactory, Session, WarehouseLocation, sql};

/// The full set of structural changes one reconciliation will apply.
///
/// The plan is computed against the live catalog before any DDL runs, so a
/// disallowed type transition rejects the whole reconciliation without
/// leaving a half-applied table behind.
#[derive(Debug, Default, PartialEq)]
struct ColumnPlan {
    add: Vec<ColumnDef>,
    retype: Vec<(String, &'static str)>,
}

impl ColumnPlan {
    fn is_empty(&self) -> bool {
        self.add.is_empty() && self.retype.is_empty()
    }
}

/// Applies declared table definitions to the warehouse.
///
/// Reconciliation is additive: schemas and tables are created when missing,
/// new columns are appended, and a column's native type may only change
/// within the text-synonym allow-list. Columns are never dropped. After any
/// structural change the configured role is re-granted read access, since
/// fresh objects do not inherit it.
pub struct SchemaManager<F: ConnectionFactory> {
    session: Arc<Session<F>>,
    location: WarehouseLocation,
}

impl<F: ConnectionFactory> SchemaManager<F> {
    pub fn new(session: Arc<Session<F>>, location: WarehouseLocation) -> Self {
        Self { session, location }
    }

    /// Schema namespace all stream tables are created under.
    pub fn schema_namespace(&self) -> &str {
        &self.location.schema
    }

    /// Brings the live warehouse in line with `table`. Safe to repeat; a
    /// definition matching the live state executes no DDL at all.
    pub async fn reconcile(&self, table: &TableDef) -> SinkResult<()> {
        let mut changed = false;

        let schemas = self.session.schema_names().await?;
        if !contains_ignore_case(&schemas, &table.schema) {
            info!(schema = %table.schema, "creating schema");
            self.session.execute(&sql::create_schema(&table.schema)).await?;
            changed = true;
        }

        let tables = self.session.table_names(&table.schema).await?;
        if !contains_ignore_case(&tables, &table.name) {
            info!(table = %table.qualified_name(), "creating table");
            self.session.execute(&sql::create_table(table, false)).await?;
            changed = true;
        } else {
            let live = self.session.table_columns(&table.schema, &table.name).await?;
            let plan = plan_changes(table, &live)?;

            for column in &plan.add {
                info!(
                    table = %table.qualified_name(),
                    column = %column.name,
                    "adding column"
                );
                self.session.execute(&sql::add_column(table, column)).await?;
            }
            for (column, native) in &plan.retype {
                info!(
                    table = %table.qualified_name(),
                    column = %column,
                    to = %native,
                    "changing column type"
                );
                self.session
                    .execute(&sql::alter_column_type(table, column, native))
                    .await?;
            }

            changed = changed || !plan.is_empty();
        }

        if changed {
            self.grant_read_access().await?;
        } else {
            debug!(table = %table.qualified_name(), "table is up to date");
        }

        Ok(())
    }

    async fn grant_read_access(&self) -> SinkResult<()> {
        let WarehouseLocation {
            database,
            schema,
            role,
        } = &self.location;

        self.session
            .execute(&sql::grant_usage_on_schema(database, schema, role))
            .await?;
        self.session
            .execute(&sql::grant_select_on_all_tables(database, schema, role))
            .await
    }
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|s| s.eq_ignore_ascii_case(needle))
}

/// Diffs the declared definition against the live columns.
fn plan_changes(table: &TableDef, live: &[(String, String)]) -> SinkResult<ColumnPlan> {
    let mut plan = ColumnPlan::default();

    for column in &table.columns {
        let declared = column.ty.native();
        let current = live
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&column.name))
            .map(|(_, ty)| ty.as_str());

        match current {
            None => plan.add.push(column.clone()),
            Some(current) if current.eq_ignore_ascii_case(declared) => {}
            Some(current) => {
                if !transition_allowed(current, declared) {
                    return Err(sink_error!(
                        ErrorKind::SchemaUpdateNotAllowed,
                        "Column type change is not allowed",
                        format!(
                            "{}.{}: {current} -> {declared}",
                            table.qualified_name(),
                            column.name
                        )
                    ));
                }
                plan.retype.push((column.name.clone(), declared));
            }
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn users_table() -> TableDef {
        TableDef::new(
            "raw",
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer, true),
                ColumnDef::new("name", ColumnType::Text, false),
            ],
        )
    }

    fn live(columns: &[(&str, &str)]) -> Vec<(String, String)> {
        columns
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn matching_live_state_plans_nothing() {
        let plan = plan_changes(&users_table(), &live(&[("id", "BIGINT"), ("name", "VARCHAR")]))
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn missing_columns_are_added() {
        let plan = plan_changes(&users_table(), &live(&[("id", "BIGINT")])).unwrap();
        assert_eq!(plan.add.len(), 1);
        assert_eq!(plan.add[0].name, "name");
        assert!(plan.retype.is_empty());
    }

    #[test]
    fn text_synonym_retype_is_planned() {
        let plan =
            plan_changes(&users_table(), &live(&[("id", "BIGINT"), ("name", "TEXT")])).unwrap();
        assert_eq!(plan.retype, vec![("name".to_string(), "VARCHAR")]);
    }

    #[test]
    fn live_type_casing_does_not_trigger_changes() {
        let plan = plan_changes(
            &users_table(),
            &live(&[("ID", "bigint"), ("NAME", "varchar")]),
        )
        .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn disallowed_transition_rejects_the_whole_plan() {
        let err = plan_changes(
            &users_table(),
            &live(&[("id", "VARCHAR"), ("name", "TEXT")]),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaUpdateNotAllowed);
        assert!(err.detail().unwrap().contains("raw.users.id"));
    }
}
