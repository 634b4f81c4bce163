//! # Agent Catalog Core
//!
//! Shared logic for Agent Catalog: record and catalog descriptors, version
//! comparison, annotation predicates, the [`Catalog`](catalog::Catalog)
//! search contract with its in-memory and chained implementations, the
//! incremental merge step, and the closest-cluster refiner.
//!
//! This crate has no network, database, or version-control dependencies.
//! Embedding backends, source indexers, and the remote store live in the
//! `agent-catalog` app crate.

pub mod annotation;
pub mod catalog;
pub mod embedding;
pub mod error;
pub mod merge;
pub mod models;
pub mod refiner;
pub mod version;

pub use error::{CatalogError, Result};
