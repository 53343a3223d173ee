//! Core types for MangoSQL
//!
//! This crate contains the schema model shared by the normalizer, the
//! schema builder, the query resolver and the CLI:
//! - Tables, columns, constraints, indexes and references
//! - Resolved queries and the query macros that name them
//! - The portable logical type vocabulary
//! - Configuration (mangosql.toml)

pub mod schema;
pub mod config;

pub use schema::{
    Column, Constraint, ConstraintKind, Index, LogicalType, Query, QueryMacro, Reference, Schema,
    Table, TableDeps,
};
pub use config::{Config, ConfigError, DriverConfig, InputConfig, LoggerConfig};
