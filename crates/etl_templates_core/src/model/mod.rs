//! Template registry domain model.
//!
//! # Responsibility
//! - Define statements and the tagged template union used by core logic.
//! - Keep durable record headers separate from in-memory templates.
//!
//! # Invariants
//! - Every template is addressed by a unique iri in memory and by a stable
//!   `RecordId` in storage.

pub mod statement;
pub mod template;
