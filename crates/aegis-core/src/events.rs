//! Listener registry for control-plane events.
//!
//! Every component exposes observability through a typed event enum and an
//! [`EventListeners`] collection. Emission is panic-isolated: one
//! misbehaving listener never prevents the rest from running.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Trait implemented by the event enums of each component.
pub trait ControlEvent: Send + Sync + fmt::Debug {
    /// Stable event type label, e.g. `breaker:opened`.
    fn event_type(&self) -> &'static str;

    /// Clock offset at which the event occurred.
    fn at(&self) -> Duration;

    /// The target (or `system`) the event concerns.
    fn target(&self) -> &str;
}

/// Trait for receiving events.
pub trait EventListener<E: ControlEvent>: Send + Sync {
    /// Called for each emitted event.
    fn on_event(&self, event: &E);
}

/// Type alias for shared listeners.
pub type BoxedListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: ControlEvent> {
    listeners: Vec<BoxedListener<E>>,
}

impl<E: ControlEvent> EventListeners<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to every listener, isolating panics so the remaining
    /// listeners still run.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if result.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    listener_index = index,
                    id = event.target(),
                    event_type = event.event_type(),
                    "event listener panicked"
                );

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "aegis_event_listener_panics_total",
                    "event_type" => event.event_type()
                )
                .increment(1);

                #[cfg(not(feature = "tracing"))]
                let _ = index;
            }
        }
    }

    /// Returns true when no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ControlEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A function-based listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps a closure as a listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ControlEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
