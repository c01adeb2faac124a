use thiserror::Error;

#[derive(Error, Debug)]
pub enum VahtiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] ureq::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] refinery::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("No reference data for locale: {0}")]
    LocaleNotFound(String),

    #[error("Unknown {level} '{name}' in the {locale} taxonomy")]
    Lookup {
        level: &'static str,
        name: String,
        locale: &'static str,
    },

    #[error("Owner {0} already tracks the maximum of {1} items")]
    ItemLimitReached(i64, usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, VahtiError>;
