//! The message pipeline: parses protocol lines, maintains per-stream state,
//! and decides when batches reach the warehouse and checkpoints reach the
//! caller.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use config::shared::BatchConfig;

use crate::bail;
use crate::buffer::{CheckpointTracker, RecordBuffer};
use crate::conversions::{flatten_key, flatten_record, table_definition_from_schema};
use crate::error::{ErrorKind, SinkResult};
use crate::loader::Loader;
use crate::schema::SchemaManager;
use crate::types::{Message, Record, TableDef};
use crate::validation::RecordValidator;
use crate::warehouse::{ConnectionFactory, Session, WarehouseLocation};

/// Everything the pipeline tracks for one known stream.
struct StreamState<F: ConnectionFactory> {
    table: TableDef,
    /// Column names of the declared definition; flattening stops at these.
    declared_columns: BTreeSet<String>,
    /// All-null record at the full width of the live table.
    template: Record,
    validator: RecordValidator,
    buffer: RecordBuffer,
    loader: Loader<F>,
}

/// Consumes protocol lines and materializes them in the warehouse.
///
/// Records buffer per stream and flush when the batch size is reached, when
/// the stream's buffer goes quiet past its time-to-live, when a new SCHEMA
/// arrives for the stream, or when the caller drains at end of input.
/// Checkpoints pass through only once every stream they cover has flushed;
/// when several become eligible at the same flush, only the most recent one
/// is emitted.
pub struct Pipeline<F: ConnectionFactory, W: Write> {
    session: Arc<Session<F>>,
    schema_manager: SchemaManager<F>,
    batch: BatchConfig,
    ttl: Duration,
    streams: HashMap<String, StreamState<F>>,
    checkpoints: CheckpointTracker,
    last_emitted: Option<Value>,
    out: W,
}

impl<F: ConnectionFactory, W: Write> Pipeline<F, W> {
    pub fn new(
        session: Session<F>,
        location: WarehouseLocation,
        batch: BatchConfig,
        out: W,
    ) -> Self {
        let session = Arc::new(session);
        let schema_manager = SchemaManager::new(Arc::clone(&session), location);
        let ttl = Duration::seconds(batch.buffer_ttl_secs as i64);

        Self {
            session,
            schema_manager,
            batch,
            ttl,
            streams: HashMap::new(),
            checkpoints: CheckpointTracker::new(),
            last_emitted: None,
            out,
        }
    }

    /// Processes one line of input against the current wall clock.
    pub async fn process_line(&mut self, line: &str) -> SinkResult<()> {
        self.process_line_at(line, Utc::now()).await
    }

    /// Processes one line of input with an explicit clock reading.
    pub async fn process_line_at(&mut self, line: &str, now: DateTime<Utc>) -> SinkResult<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        match Message::parse(line)? {
            Message::Record { stream, record } => {
                self.handle_record(&stream, record, now).await?;
            }
            Message::Schema {
                stream,
                schema,
                key_properties,
            } => {
                if let Err(err) = self
                    .handle_schema(&stream, &schema, &key_properties, now)
                    .await
                {
                    error!(%err, stream, "failed to apply schema message");
                    return Err(err);
                }
            }
            Message::State { value } => {
                self.handle_state(value)?;
            }
            Message::ActivateVersion { stream } => {
                warn!(stream = ?stream, "ACTIVATE_VERSION messages are not supported, ignoring");
            }
        }

        self.flush_expired(now).await
    }

    /// Flushes every non-empty buffer. Call once at end of input.
    pub async fn drain(&mut self) -> SinkResult<()> {
        let mut dirty = self.dirty_streams();
        dirty.sort();

        for stream in dirty {
            self.flush_stream(&stream).await?;
        }

        Ok(())
    }

    /// The checkpoint most recently written to the output, if any.
    pub fn last_emitted_checkpoint(&self) -> Option<&Value> {
        self.last_emitted.as_ref()
    }

    async fn handle_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
        now: DateTime<Utc>,
    ) -> SinkResult<()> {
        let keys: Vec<String> = key_properties.iter().map(|k| flatten_key(k, &[])).collect();

        if let Some(state) = self.streams.get(stream) {
            let existing: BTreeSet<String> = state.table.primary_key_names().into_iter().collect();
            let incoming: BTreeSet<String> = keys.iter().cloned().collect();
            if existing != incoming {
                bail!(
                    ErrorKind::SchemaUpdateNotAllowed,
                    "Primary key membership cannot change",
                    format!("stream {stream}")
                );
            }

            // Rows buffered under the old shape go out before it changes.
            self.flush_stream(stream).await?;
        }

        let table = table_definition_from_schema(
            self.schema_manager.schema_namespace(),
            stream,
            schema,
            &keys,
            &self.batch.timestamp_column,
        )?;

        self.schema_manager.reconcile(&table).await?;

        let validator = RecordValidator::new(schema, keys.clone())?;
        let live = self.session.table_columns(&table.schema, &table.name).await?;
        let template = Record::template(live.into_iter().map(|(name, _)| name));
        let declared_columns: BTreeSet<String> = table.column_names().into_iter().collect();
        let buffer = if keys.is_empty() {
            RecordBuffer::append(self.ttl, now)
        } else {
            RecordBuffer::keyed(keys, self.ttl, now)
        };
        let loader = Loader::new(Arc::clone(&self.session), table.clone());

        info!(stream, table = %table.qualified_name(), "stream is ready");

        self.streams.insert(
            stream.to_string(),
            StreamState {
                table,
                declared_columns,
                template,
                validator,
                buffer,
                loader,
            },
        );

        Ok(())
    }

    async fn handle_record(
        &mut self,
        stream: &str,
        raw: Value,
        now: DateTime<Utc>,
    ) -> SinkResult<()> {
        let Some(state) = self.streams.get_mut(stream) else {
            bail!(
                ErrorKind::RecordBeforeSchema,
                "Record arrived before its stream's schema",
                format!("stream {stream}")
            );
        };

        state.validator.validate(stream, &raw)?;

        let mut flat = flatten_record(&raw, &state.declared_columns);
        state.validator.check_key_presence(stream, &flat)?;

        if !flat.contains_column(&self.batch.timestamp_column) {
            flat.insert(
                &self.batch.timestamp_column,
                Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true)),
            );
        }

        let full = state.template.clone().overlay(flat);
        state.buffer.add(full, now);

        if state.buffer.len() >= self.batch.batch_size {
            info!(stream, "batch size reached, flushing");
            self.flush_stream(stream).await?;
        }

        Ok(())
    }

    fn handle_state(&mut self, value: Value) -> SinkResult<()> {
        let mut dirty = self.dirty_streams();
        dirty.sort();

        if dirty.is_empty() {
            self.emit_checkpoint(value)
        } else {
            self.checkpoints.push(value, dirty);
            Ok(())
        }
    }

    async fn flush_stream(&mut self, stream: &str) -> SinkResult<()> {
        let Some(state) = self.streams.get_mut(stream) else {
            return Ok(());
        };

        let records = state.buffer.values();
        // The buffer stays intact until the load succeeds, so a failed batch
        // is retried in full on the next flush.
        state.loader.load(&records).await?;
        state.buffer.clear();

        if !records.is_empty() {
            info!(stream, records = records.len(), "flushed buffer");
        }

        self.checkpoints.mark_clean(stream);
        if let Some(checkpoint) = self.checkpoints.take_ready().pop() {
            self.emit_checkpoint(checkpoint)?;
        }

        Ok(())
    }

    async fn flush_expired(&mut self, now: DateTime<Utc>) -> SinkResult<()> {
        let expired: Vec<String> = self
            .streams
            .iter()
            .filter(|(_, state)| state.buffer.expired(now))
            .map(|(name, _)| name.clone())
            .collect();

        for stream in expired {
            info!(stream = %stream, "buffer went quiet past its deadline, flushing");
            self.flush_stream(&stream).await?;
        }

        Ok(())
    }

    fn dirty_streams(&self) -> Vec<String> {
        self.streams
            .iter()
            .filter(|(_, state)| !state.buffer.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn emit_checkpoint(&mut self, value: Value) -> SinkResult<()> {
        let line = serde_json::to_string(&value)?;
        writeln!(self.out, "{line}")?;
        self.out.flush()?;

        debug!(checkpoint = %line, "emitted checkpoint");
        self.last_emitted = Some(value);

        Ok(())
    }
}
