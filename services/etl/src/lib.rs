//! Work-tracking ETL - builds a star schema from allocation and task-log
//! extracts and loads it into the warehouse.
//!
//! CRITICAL: the transform is DETERMINISTIC.
//! Same extracts = same dimension ids, same fact rows, same order.

pub mod calendar;
pub mod config;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod identity;
pub mod loader;
pub mod pipeline;
pub mod schema;
pub mod table;
pub mod validate;
pub mod warehouse;

pub use error::{EtlError, Result, SchemaError};
