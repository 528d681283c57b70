use thiserror::Error;

/// Errors raised while validating configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("the snowflake account identifier must not be empty")]
    MissingAccount,
    #[error("the snowflake account identifier must not contain a domain name")]
    AccountContainsDomain,
    #[error("the snowflake username must not be empty")]
    MissingUsername,
    #[error("the private key must be a PEM-encoded PKCS#8 document")]
    InvalidPrivateKey,
    #[error("batch_size must be greater than zero")]
    ZeroBatchSize,
}
