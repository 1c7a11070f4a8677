//! litestash Core Library
//!
//! Document and signal tables over a single embedded SQLite file.
//!
//! # Architecture
//!
//! - **SQLite**: one connection per `Repository`, opened in WAL mode with
//!   `synchronous = NORMAL`
//! - **serde_json**: documents and signal metadata are stored as JSON text
//!
//! # Quick Start
//!
//! ```text
//! let repo = Repository::open("data/store.db")?;
//! repo.create_document_table("people")?;
//!
//! repo.upsert("people", "1", &person)?;
//! let person: Option<Person> = repo.get("people", "1")?;
//!
//! repo.execute_in_transaction(|r| {
//!     r.upsert("people", "2", &other)?;
//!     r.delete("people", "1")?;
//!     Ok(())
//! })?;
//! ```
//!
//! # Modules
//!
//! - `repository`: The store handle and CRUD operations (main entry point)
//! - `transaction`: Atomic batches
//! - `asynchronous`: tokio wrapper with the same operations
//! - `models`: Row shapes for documents and signals
//! - `schema`: Table DDL and pragmas
//! - `error`: Error taxonomy
//! - `config`: Store configuration

pub mod asynchronous;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod schema;
mod transaction;

pub use asynchronous::AsyncRepository;
pub use config::Config;
pub use error::{OpenError, StoreError, StoreResult};
pub use models::{Document, Signal, SignalRecord};
pub use repository::Repository;
