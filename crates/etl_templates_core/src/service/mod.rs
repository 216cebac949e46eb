//! Template registry services.
//!
//! # Responsibility
//! - Orchestrate repository calls into registry-level operations.
//! - Own reference resolution, interface patching and schema migration.
//!
//! # Invariants
//! - Callers outside the core go through `TemplateManager`; the other
//!   modules are public for tooling and tests.

pub mod bundled;
pub mod error;
pub mod loader;
pub mod migration;
pub mod patch;
pub mod resolver;
pub mod template_manager;
