//! Identifier validation and quoting.
//!
//! SQLite cannot bind identifiers as parameters, so table and column names
//! are interpolated into statement text. Every interpolated name passes
//! through [`quote_identifier`], which rejects names that cannot be quoted
//! safely and doubles embedded quote characters.
//!
//! # Examples
//!
//! ```
//! use databased_core::{quote_identifier, validate_identifier};
//!
//! assert_eq!(quote_identifier("cereals").unwrap(), "\"cereals\"");
//! assert_eq!(quote_identifier("odd\"name").unwrap(), "\"odd\"\"name\"");
//! assert!(validate_identifier("").is_err());
//! ```

use thiserror::Error;

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Name is empty or whitespace-only.
    #[error("identifier cannot be empty")]
    EmptyIdentifier,
    /// Name contains a NUL byte, which SQLite truncates at.
    #[error("identifier contains a NUL byte: {0:?}")]
    NulInIdentifier(String),
}

/// Checks that `name` can be used as a quoted SQL identifier.
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }
    if name.contains('\0') {
        return Err(ValidationError::NulInIdentifier(name.to_string()));
    }
    Ok(())
}

/// Wraps `name` in double quotes, doubling any embedded double quotes.
pub fn quote_identifier(name: &str) -> Result<String, ValidationError> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quotes every name in `names` and joins them with `", "`.
pub fn quote_identifier_list<S: AsRef<str>>(names: &[S]) -> Result<String, ValidationError> {
    let quoted = names
        .iter()
        .map(|name| quote_identifier(name.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(", "))
}
