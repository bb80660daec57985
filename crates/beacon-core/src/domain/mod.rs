//! Domain entities for the classroom beacon bridge.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: colors, the table range, the table store and its clock.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code has no imports from OS APIs,
//! serial drivers, network libraries or UI frameworks, so it can be compiled
//! and tested anywhere.  The serial link and the WebSocket server depend on
//! the domain; the domain never depends on them.

pub mod clock;
pub mod color;

/// The authoritative table model.
///
/// See [`table_store::TableStore`] for the main type.
pub mod table_store;
