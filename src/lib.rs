//! # Agent Catalog
//!
//! Index, version, and search the tools and prompts an LLM agent can use.
//!
//! Agent Catalog scans a source tree for tool and prompt definitions
//! (Python functions, SQL++ templates, YAML tool specs, prompt files),
//! versions each one against git, embeds its description, and keeps the
//! result as a local JSON catalog. Catalogs can be published to a shared
//! document store and searched by name or by natural-language query.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Scanner    │──▶│  Indexers   │──▶│   Builder     │──▶ <kind>-catalog.json
//! │ dirs+globs  │   │ py/sqlpp/.. │   │ merge+embed   │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ publish
//!                                            ▼
//!        ┌──────────┐   chain    ┌──────────────────┐
//!        │CatalogMem│◀──────────▶│ CatalogDb (store) │
//!        └────┬─────┘            └──────────────────┘
//!             └──────▶ Provider ──▶ refiner ──▶ activity sinks
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! agentc index                          # build tool and prompt catalogs
//! agentc find "book a flight"           # semantic search over tools
//! agentc find --name greet --kind prompt
//! agentc publish                        # push to the remote store
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`scanner`] | Directory walk with ignore files and globs |
//! | [`indexer`] | Per-format descriptor extraction |
//! | [`builder`] | Catalog build: scan, merge, embed |
//! | [`vcs`] | Git and content-hash versioning |
//! | [`embedding`] | OpenAI, Ollama, and local embedding models |
//! | [`store`] | Document store abstraction |
//! | [`sqlite_store`] | SQLite document store |
//! | [`catalog_db`] | Remote catalog over a document store |
//! | [`provider`] | Search facade: chain, refine, record |
//! | [`activity`] | Activity records and sinks |
//! | [`secrets`] | Explicit secrets map |
//! | [`progress`] | Index progress reporting |
//! | [`ls_cmd`] | Catalog item listing |
//! | [`db`] | SQLite connection |

pub mod activity;
pub mod builder;
pub mod catalog_db;
pub mod config;
pub mod db;
pub mod embedding;
pub mod find_cmd;
pub mod index_cmd;
pub mod indexer;
pub mod ls_cmd;
pub mod progress;
pub mod provider;
pub mod publish_cmd;
pub mod scanner;
pub mod secrets;
pub mod sqlite_store;
pub mod status;
pub mod store;
pub mod vcs;
