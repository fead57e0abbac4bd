//! Run identifier parsing and validation
//!
//! The run identifier keys every piece of durable state for one relay: the
//! checkpoint file (`<identifier>.checkpoint`) and the log file
//! (`<identifier>.log`). Because it becomes a file name it is restricted to a
//! conservative character set.

use std::fmt;

/// Maximum accepted identifier length
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Validated run identifier
///
/// # Examples
///
/// ```
/// use usage_event_relay::identifier::RunIdentifier;
///
/// let id = RunIdentifier::parse("web-usage.prod").unwrap();
/// assert_eq!(id.checkpoint_file_name(), "web-usage.prod.checkpoint");
/// assert_eq!(id.log_file_name(), "web-usage.prod.log");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunIdentifier(String);

impl RunIdentifier {
    /// Parse and validate an identifier
    ///
    /// Surrounding whitespace is trimmed. Case is preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty, too long, starts with a
    /// dot, or contains characters outside `[A-Za-z0-9._-]`.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let value = s.trim();

        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if value.len() > MAX_IDENTIFIER_LEN {
            return Err(IdentifierError::TooLong {
                len: value.len(),
                max: MAX_IDENTIFIER_LEN,
            });
        }

        if value.starts_with('.') {
            return Err(IdentifierError::InvalidFormat(
                "identifier cannot start with '.'".to_string(),
            ));
        }

        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(IdentifierError::InvalidFormat(format!(
                "identifier contains invalid character {bad:?}; allowed: letters, digits, '.', '_', '-'"
            )));
        }

        Ok(Self(value.to_string()))
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the checkpoint for this identifier
    pub fn checkpoint_file_name(&self) -> String {
        format!("{}.checkpoint", self.0)
    }

    /// File name of the log for this identifier
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.0)
    }
}

impl fmt::Display for RunIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur during identifier parsing
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// Identifier is empty
    #[error("identifier cannot be empty")]
    Empty,

    /// Identifier exceeds the maximum length
    #[error("identifier is {len} characters long (max: {max})")]
    TooLong {
        /// Actual length
        len: usize,
        /// Maximum length
        max: usize,
    },

    /// Invalid identifier format
    #[error("identifier error: {0}")]
    InvalidFormat(String),
}
