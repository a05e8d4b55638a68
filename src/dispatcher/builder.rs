//! Builder pattern for dispatcher configuration.
//!
//! # Example
//!
//! ```
//! use socket_mux::{ConnectionId, Dispatcher, Event, MemoryFactory, MuxConfig, StaticCookies};
//!
//! # fn example() -> socket_mux::Result<()> {
//! let (factory, _peers) = MemoryFactory::new();
//! let dispatcher = Dispatcher::builder()
//!     .factory(factory)
//!     .event_sink(|id: ConnectionId, event: Event| println!("{id}: {}", event.name()))
//!     .cookies(StaticCookies::new().with_cookie("example.com", "session=1"))
//!     .config(MuxConfig::new().with_fragment_size(16 * 1024))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::transport::{CookieProvider, EventSink, NoCookies, SocketFactory};

use super::core::Dispatcher;
use super::options::MuxConfig;

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builder for a [`Dispatcher`].
///
/// Use [`Dispatcher::builder()`] to create one. A socket factory and an
/// event sink are required; cookies default to [`NoCookies`].
#[derive(Default)]
pub struct DispatcherBuilder {
    factory: Option<Arc<dyn SocketFactory>>,
    events: Option<Arc<dyn EventSink>>,
    cookies: Option<Arc<dyn CookieProvider>>,
    config: MuxConfig,
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("factory", &self.factory.is_some())
            .field("events", &self.events.is_some())
            .field("cookies", &self.cookies.is_some())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// DispatcherBuilder Implementation
// ============================================================================

impl DispatcherBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the socket factory.
    #[inline]
    #[must_use]
    pub fn factory(mut self, factory: impl SocketFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Sets the event sink.
    #[inline]
    #[must_use]
    pub fn event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Some(Arc::new(sink));
        self
    }

    /// Sets the cookie provider.
    #[inline]
    #[must_use]
    pub fn cookies(mut self, cookies: impl CookieProvider + 'static) -> Self {
        self.cookies = Some(Arc::new(cookies));
        self
    }

    /// Sets the engine configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: MuxConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the dispatcher with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the factory or event sink is not set
    /// - [`Error::Config`] if the configuration is invalid
    pub fn build(self) -> Result<Dispatcher> {
        let factory = self.factory.ok_or_else(|| {
            Error::config(
                "Socket factory is required. Use .factory() to set it.\n\
                 Example: Dispatcher::builder().factory(StreamFactory::new())",
            )
        })?;

        let events = self.events.ok_or_else(|| {
            Error::config(
                "Event sink is required. Use .event_sink() to set it.\n\
                 Example: Dispatcher::builder().event_sink(ChannelSink::new().0)",
            )
        })?;

        self.config.validate()?;

        let cookies = self.cookies.unwrap_or_else(|| Arc::new(NoCookies));

        Ok(Dispatcher::new(factory, events, cookies, self.config))
    }
}

// ============================================================================
// Tests
// ============================================================================
