use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArbError>;

#[derive(Error, Debug)]
pub enum ArbError {
    /// Empty or insufficient market data. Aborts the run.
    #[error("data error: {0}")]
    Data(String),

    /// Singular system, non-finite values, malformed distance structure.
    /// Recovered inside the driver, never surfaced from a run.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Invalid configuration. Raised before any simulation step.
    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("date parse error: {0}")]
    Date(#[from] chrono::ParseError),

    #[error("number parse error: {0}")]
    Number(#[from] std::num::ParseFloatError),
}

impl ArbError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::Numerical(_))
    }
}
