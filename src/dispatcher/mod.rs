//! Dispatcher module.
//!
//! The entry point of the engine: turns host operations into connection
//! work and connection activity into host events.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Dispatcher`] | Per-connection FIFO lanes over the registry |
//! | [`DispatcherBuilder`] | Fluent configuration builder |
//! | [`MuxConfig`] | Engine tunables |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for dispatcher configuration.
pub mod builder;

/// Core dispatcher implementation.
pub mod core;

/// Engine configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::DispatcherBuilder;
pub use core::Dispatcher;
pub use options::{DEFAULT_CONNECT_TIMEOUT, MuxConfig};
