//! Batch loading of buffered records into one target table.

use std::sync::Arc;

use tracing::debug;

use crate::error::SinkResult;
use crate::types::{Record, TableDef};
use crate::warehouse::{ConnectionFactory, Session, sql};

/// Loads batches for one stream's table.
///
/// Tables with a primary key are loaded by staging the batch in a temporary
/// table and merging it in, which makes redelivery of the same rows
/// idempotent. Keyless tables are append-only and take a plain bulk insert.
pub struct Loader<F: ConnectionFactory> {
    session: Arc<Session<F>>,
    table: TableDef,
}

impl<F: ConnectionFactory> Loader<F> {
    pub fn new(session: Arc<Session<F>>, table: TableDef) -> Self {
        Self { session, table }
    }

    pub fn table(&self) -> &TableDef {
        &self.table
    }

    /// Loads one batch. An empty batch is a no-op.
    pub async fn load(&self, records: &[Record]) -> SinkResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        debug!(
            table = %self.table.qualified_name(),
            records = records.len(),
            "loading batch"
        );

        if self.table.has_primary_key() {
            self.load_with_merge(records).await
        } else {
            self.session
                .insert_rows(
                    &self.table.schema,
                    &self.table.name,
                    &self.table.column_names(),
                    records,
                )
                .await
        }
    }

    async fn load_with_merge(&self, records: &[Record]) -> SinkResult<()> {
        let tmp = self.table.temp_table_def();

        self.session.execute(&sql::drop_table(&tmp, true)).await?;
        self.session.execute(&sql::create_table(&tmp, true)).await?;

        // The staging table must not outlive the load, so the drop runs even
        // when staging or merging fails, and the first error wins.
        let staged = async {
            self.session
                .insert_rows(&tmp.schema, &tmp.name, &tmp.column_names(), records)
                .await?;
            self.session
                .execute(&sql::merge_from_temp_table(&self.table))
                .await
        }
        .await;

        let dropped = self.session.execute(&sql::drop_table(&tmp, false)).await;

        staged.and(dropped)
    }
}
