//! Layered configuration documents resolved into typed values.
//!
//! A document may name a parent through `parentConfigurationFile` or
//! `parentConfigurationUrl`. The chain is merged ancestor first, then
//! overrides and `${...}` references are applied before the result is bound
//! to a `serde` type and validated.

pub mod config;

pub use config::{
    BindError, Config, ConfigError, CyclePolicy, DefaultSourceProvider, ErrorKind, Node, Origin,
    Overrides, Scalar, SourceProvider,
};
