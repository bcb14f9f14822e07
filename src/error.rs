use thiserror::Error;

/// Problems with start-up configuration. These are fatal: the binary refuses
/// to accept queries until they are fixed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "OPENAI_API_KEY is not set. Export it in your environment (or add it to a .env file) and restart."
    )]
    MissingApiKey,
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Failures while talking to the generation service. Callers render these as
/// text in place of the generated artifact.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation service returned an unreadable response: {0}")]
    Decode(String),
    #[error("generation service returned no content")]
    EmptyResponse,
}
