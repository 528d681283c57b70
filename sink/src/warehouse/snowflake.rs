//! Snowflake SQL API client with key-pair authentication.
//!
//! Connections authenticate with a short-lived JWT signed by the configured
//! RSA key. Snowflake reports a lapsed token with error code 390114, which is
//! surfaced as [`ErrorKind::AuthenticationExpired`] so the session wrapper
//! can mint a fresh token and replay the statement.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Duration, Utc};
use config::shared::SnowflakeConnectionConfig;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ErrorKind, SinkResult};
use crate::types::Record;
use crate::warehouse::{ConnectionFactory, WarehouseConnection};
use crate::{bail, sink_error};

const AUTH_EXPIRED_CODE: &str = "390114";
const TOKEN_LIFETIME_MINUTES: i64 = 59;

/// Builds authenticated [`SnowflakeConnection`]s from the target config.
#[derive(Debug, Clone)]
pub struct SnowflakeFactory {
    config: SnowflakeConnectionConfig,
}

impl SnowflakeFactory {
    pub fn new(config: SnowflakeConnectionConfig) -> Self {
        Self { config }
    }
}

impl ConnectionFactory for SnowflakeFactory {
    type Conn = SnowflakeConnection;

    async fn connect(&self) -> SinkResult<Self::Conn> {
        SnowflakeConnection::open(&self.config)
    }
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct StatementResponse {
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    data: Option<Vec<Vec<Option<String>>>>,
}

/// One authenticated connection to the Snowflake SQL API.
///
/// The JWT is fixed for the lifetime of the connection; expiry is handled by
/// rebuilding the whole connection through the factory.
pub struct SnowflakeConnection {
    http: reqwest::Client,
    url: String,
    token: String,
    database: String,
    schema: String,
    warehouse: String,
    role: String,
}

impl SnowflakeConnection {
    fn open(config: &SnowflakeConnectionConfig) -> SinkResult<Self> {
        let token = generate_jwt(config)?;
        let http = reqwest::Client::builder().build().map_err(|err| {
            sink_error!(
                ErrorKind::WarehouseConnectionFailed,
                "Failed to build the HTTP client",
                err
            )
        })?;

        debug!(account = %config.account, "opened snowflake connection");

        Ok(Self {
            http,
            url: format!(
                "https://{}.snowflakecomputing.com/api/v2/statements",
                config.account
            ),
            token,
            database: config.database.clone(),
            schema: config.schema.clone(),
            warehouse: config.warehouse.clone(),
            role: config.role.clone(),
        })
    }

    async fn submit(&self, statement: &str) -> SinkResult<StatementResponse> {
        let body = serde_json::json!({
            "statement": statement,
            "database": self.database,
            "schema": self.schema,
            "warehouse": self.warehouse,
            "role": self.role,
        });

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT")
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                sink_error!(
                    ErrorKind::WarehouseConnectionFailed,
                    "Failed to reach the SQL API",
                    err
                )
            })?;

        let status = response.status();
        let payload: StatementResponse = response.json().await.map_err(|err| {
            sink_error!(
                ErrorKind::WarehouseQueryFailed,
                "Failed to decode the SQL API response",
                err
            )
        })?;

        if !status.is_success() {
            if payload.code.as_deref() == Some(AUTH_EXPIRED_CODE) {
                bail!(
                    ErrorKind::AuthenticationExpired,
                    "Authentication token has expired",
                    payload.message.unwrap_or_default()
                );
            }

            bail!(
                ErrorKind::WarehouseQueryFailed,
                "Statement failed",
                format!(
                    "status {status}: {}",
                    payload.message.unwrap_or_default()
                )
            );
        }

        Ok(payload)
    }

    async fn query_strings(&self, statement: &str) -> SinkResult<Vec<Vec<Option<String>>>> {
        Ok(self.submit(statement).await?.data.unwrap_or_default())
    }
}

impl WarehouseConnection for SnowflakeConnection {
    async fn execute(&self, sql: &str) -> SinkResult<()> {
        self.submit(sql).await.map(|_| ())
    }

    async fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Record],
    ) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let quoted: Vec<String> = columns
            .iter()
            .map(|c| crate::warehouse::sql::quote_identifier(c))
            .collect();

        let selects: Vec<String> = rows
            .iter()
            .map(|row| {
                let values: Vec<String> = columns
                    .iter()
                    .map(|column| render_value(row.get(column).unwrap_or(&Value::Null)))
                    .collect();
                format!("SELECT {}", values.join(", "))
            })
            .collect();

        // VARIANT values go through PARSE_JSON, which is only valid in a
        // SELECT source, hence the UNION ALL form instead of VALUES.
        let sql = format!(
            "INSERT INTO {}.{} ({}) {}",
            crate::warehouse::sql::quote_identifier(schema),
            crate::warehouse::sql::quote_identifier(table),
            quoted.join(", "),
            selects.join(" UNION ALL ")
        );

        self.execute(&sql).await
    }

    async fn schema_names(&self) -> SinkResult<Vec<String>> {
        let rows = self
            .query_strings(&format!(
                "SELECT SCHEMA_NAME FROM {}.INFORMATION_SCHEMA.SCHEMATA",
                self.database
            ))
            .await?;

        Ok(rows.into_iter().flatten().flatten().collect())
    }

    async fn table_names(&self, schema: &str) -> SinkResult<Vec<String>> {
        let rows = self
            .query_strings(&format!(
                "SELECT TABLE_NAME FROM {}.INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA ILIKE '{}'",
                self.database,
                escape_literal(schema)
            ))
            .await?;

        Ok(rows.into_iter().flatten().flatten().collect())
    }

    async fn table_columns(&self, schema: &str, table: &str) -> SinkResult<Vec<(String, String)>> {
        let rows = self
            .query_strings(&format!(
                "SELECT COLUMN_NAME, DATA_TYPE FROM {}.INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA ILIKE '{}' AND TABLE_NAME ILIKE '{}' \
                 ORDER BY ORDINAL_POSITION",
                self.database,
                escape_literal(schema),
                escape_literal(table)
            ))
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let mut row = row.into_iter();
                match (row.next().flatten(), row.next().flatten()) {
                    (Some(name), Some(ty)) => Some((name, ty)),
                    _ => None,
                }
            })
            .collect())
    }
}

/// Signs a short-lived JWT for key-pair authentication.
///
/// The issuer carries the SHA-256 fingerprint of the public key registered
/// for the user; account and username are uppercased as the API requires.
fn generate_jwt(config: &SnowflakeConnectionConfig) -> SinkResult<String> {
    let pem = config.private_key_pem.expose_secret();

    let private_key = RsaPrivateKey::from_pkcs8_pem(pem).map_err(|err| {
        sink_error!(
            ErrorKind::ConfigError,
            "Failed to parse the private key",
            err
        )
    })?;
    let public_der = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|err| {
            sink_error!(
                ErrorKind::ConfigError,
                "Failed to encode the public key",
                err
            )
        })?;

    let fingerprint = BASE64.encode(Sha256::digest(public_der.as_bytes()));
    let qualified_user = format!(
        "{}.{}",
        config.account.to_uppercase(),
        config.username.to_uppercase()
    );

    let now = Utc::now();
    let claims = Claims {
        iss: format!("{qualified_user}.SHA256:{fingerprint}"),
        sub: qualified_user,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(TOKEN_LIFETIME_MINUTES)).timestamp(),
    };

    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|err| {
        sink_error!(
            ErrorKind::ConfigError,
            "Failed to load the signing key",
            err
        )
    })?;

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|err| {
        sink_error!(ErrorKind::ConfigError, "Failed to sign the JWT", err)
    })
}

/// Escapes a string for use inside a single-quoted literal.
///
/// Snowflake literals interpret backslash escapes, so backslashes must be
/// doubled as well as quotes; a trailing `\` would otherwise swallow the
/// closing quote and `\'` would terminate the string early.
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// Renders one JSON value as a SQL literal.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", escape_literal(s)),
        Value::Array(_) | Value::Object(_) => {
            let rendered = value.to_string();
            format!("PARSE_JSON('{}')", escape_literal(&rendered))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_render_as_plain_literals() {
        assert_eq!(render_value(&Value::Null), "NULL");
        assert_eq!(render_value(&json!(true)), "TRUE");
        assert_eq!(render_value(&json!(42)), "42");
        assert_eq!(render_value(&json!("ada")), "'ada'");
    }

    #[test]
    fn quotes_in_strings_are_doubled() {
        assert_eq!(render_value(&json!("o'brien")), "'o''brien'");
    }

    #[test]
    fn backslashes_in_strings_are_escaped() {
        // A trailing backslash must not swallow the closing quote.
        assert_eq!(render_value(&json!("C:\\")), r"'C:\\'");
        // Backslash followed by a quote must not terminate the literal.
        assert_eq!(render_value(&json!(r"\'")), r#"'\\'''"#);
    }

    #[test]
    fn semistructured_values_go_through_parse_json() {
        assert_eq!(
            render_value(&json!({"path": "a\\b"})),
            r#"PARSE_JSON('{"path":"a\\\\b"}')"#
        );
    }
}
