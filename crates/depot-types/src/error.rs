/// Errors from parsing or constructing foundation types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// A hex string could not be decoded.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// A decoded byte string has the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A nexus string contains a character other than '0' or '1'.
    #[error("invalid nexus character {found:?} at position {position}")]
    InvalidNexusChar { found: char, position: usize },
}
