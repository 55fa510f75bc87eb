//! Join a customer export with a billing-provider export and turn the joined
//! rows into a subscription import file for the new provider.

pub mod config;
pub mod error;
pub mod migrate;
pub mod pipeline;
pub mod table;

pub use error::{MigrateError, Result};
