//! Table error types.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
use super::store::TableType;

/// Errors raised by table operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// The table was closed by its owner
    #[error("Table is closed")]
    Closed,

    /// The operation is not defined for this table type
    #[error("Operation {op} not supported on {table_type:?} table")]
    WrongTableType {
        /// Name of the rejected operation
        op: &'static str,
        /// The table's type
        table_type: TableType,
    },

    /// `update_counter` on a key that has no entry
    #[error("No entry under key for counter update")]
    MissingKey,
}
