use std::time::Duration;

/// Errors surfaced at the crate boundary.
///
/// Collaborators (`CatalogSource`, `RemoteGenerator`) speak `anyhow`; they are
/// wrapped here so callers can match on what went wrong.
#[derive(Debug, thiserror::Error)]
pub enum ConciergeError {
    #[error("remote generator failed: {0:#}")]
    Remote(anyhow::Error),

    #[error("remote generator timed out after {0:?}")]
    RemoteTimeout(Duration),

    #[error("catalog fetch failed: {0:#}")]
    Catalog(anyhow::Error),

    #[error("catalog fetch timed out after {0:?}")]
    CatalogTimeout(Duration),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid knowledge base: {0}")]
    Knowledge(String),
}

pub type Result<T> = std::result::Result<T, ConciergeError>;
