//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the durable template record contract.
//! - Isolate SQLite query details from registry orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod template_repo;
