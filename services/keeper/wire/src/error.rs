//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Record ended before all of its fields were read
    #[error("incomplete record")]
    Incomplete,

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Negative length other than the null marker
    #[error("invalid length {0}")]
    Length(i32),

    /// String field was not valid UTF-8
    #[error("string field is not valid utf-8")]
    Utf8,

    /// Unknown operation code
    #[error("unknown opcode {0}")]
    OpCode(i32),
}
