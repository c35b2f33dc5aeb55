/// Errors raised while decoding or validating domain values.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),
}
