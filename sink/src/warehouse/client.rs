use std::future::Future;

use tokio::sync::Mutex;

use crate::error::SinkResult;
use crate::types::Record;
use crate::warehouse::retry;

/// One live, authenticated connection to the warehouse.
///
/// Implementations report credential expiry as
/// [`ErrorKind::AuthenticationExpired`](crate::error::ErrorKind::AuthenticationExpired)
/// so the session wrapper can rebuild them transparently.
pub trait WarehouseConnection: Send + Sync {
    /// Executes one statement for its side effects.
    fn execute(&self, sql: &str) -> impl Future<Output = SinkResult<()>> + Send;

    /// Bulk-inserts rows into an existing table, projecting each record onto
    /// `columns`.
    fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Record],
    ) -> impl Future<Output = SinkResult<()>> + Send;

    /// Lists the schemas of the configured database.
    fn schema_names(&self) -> impl Future<Output = SinkResult<Vec<String>>> + Send;

    /// Lists the tables of one schema.
    fn table_names(&self, schema: &str) -> impl Future<Output = SinkResult<Vec<String>>> + Send;

    /// Lists `(column name, native type)` pairs of one table, in position
    /// order.
    fn table_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> impl Future<Output = SinkResult<Vec<(String, String)>>> + Send;
}

/// Builds fresh connections, both at startup and when credentials expire.
pub trait ConnectionFactory: Send + Sync {
    type Conn: WarehouseConnection;

    fn connect(&self) -> impl Future<Output = SinkResult<Self::Conn>> + Send;
}

/// A warehouse session that survives credential expiry.
///
/// Every operation is routed through a retry wrapper: when a statement fails
/// because the session token lapsed, the connection is rebuilt from the
/// factory and the statement is replayed exactly once. Any other error, or a
/// second expiry in a row, propagates to the caller.
pub struct Session<F: ConnectionFactory> {
    factory: F,
    conn: Mutex<F::Conn>,
}

impl<F: ConnectionFactory> Session<F> {
    pub async fn connect(factory: F) -> SinkResult<Self> {
        let conn = factory.connect().await?;

        Ok(Self {
            factory,
            conn: Mutex::new(conn),
        })
    }

    async fn refresh(&self) -> SinkResult<()> {
        let mut guard = self.conn.lock().await;
        *guard = self.factory.connect().await?;

        Ok(())
    }

    pub async fn execute(&self, sql: &str) -> SinkResult<()> {
        retry::with_refresh(
            retry::MAX_ATTEMPTS,
            retry::is_auth_expiry,
            || self.refresh(),
            move || async move {
                let guard = self.conn.lock().await;
                guard.execute(sql).await
            },
        )
        .await
    }

    pub async fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Record],
    ) -> SinkResult<()> {
        retry::with_refresh(
            retry::MAX_ATTEMPTS,
            retry::is_auth_expiry,
            || self.refresh(),
            move || async move {
                let guard = self.conn.lock().await;
                guard.insert_rows(schema, table, columns, rows).await
            },
        )
        .await
    }

    pub async fn schema_names(&self) -> SinkResult<Vec<String>> {
        retry::with_refresh(
            retry::MAX_ATTEMPTS,
            retry::is_auth_expiry,
            || self.refresh(),
            move || async move {
                let guard = self.conn.lock().await;
                guard.schema_names().await
            },
        )
        .await
    }

    pub async fn table_names(&self, schema: &str) -> SinkResult<Vec<String>> {
        retry::with_refresh(
            retry::MAX_ATTEMPTS,
            retry::is_auth_expiry,
            || self.refresh(),
            move || async move {
                let guard = self.conn.lock().await;
                guard.table_names(schema).await
            },
        )
        .await
    }

    pub async fn table_columns(&self, schema: &str, table: &str) -> SinkResult<Vec<(String, String)>> {
        retry::with_refresh(
            retry::MAX_ATTEMPTS,
            retry::is_auth_expiry,
            || self.refresh(),
            move || async move {
                let guard = self.conn.lock().await;
                guard.table_columns(schema, table).await
            },
        )
        .await
    }
}
