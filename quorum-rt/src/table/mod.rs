//! ETS-style in-memory keyed tables.

pub mod error;
pub mod store;

pub use error::TableError;
pub use store::{utf16_string_order, KeyOrder, Table, TableType};
