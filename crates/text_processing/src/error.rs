use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextProcessingError {
    #[error("Invalid substitution pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid country code '{0}': expected 1-3 digits")]
    InvalidCountryCode(String),
}

pub type Result<T> = std::result::Result<T, TextProcessingError>;
