//! Circuit breaker registry for the aegis control plane.
//!
//! One breaker state machine per registered target, addressed by id.
//! The breaker controls *admission*: whether a protected call may proceed
//! right now. Outcomes are reported back through *observation*.
//!
//! ## States
//! - **Closed**: calls admitted; consecutive failures counted, decayed by
//!   one on each success.
//! - **Open**: calls rejected until the cooldown deadline; the first
//!   admission at or after the deadline transitions to half-open.
//! - **HalfOpen**: a bounded budget of probe calls is admitted; any probe
//!   failure reopens immediately, a full budget of successes closes.
//!
//! ## Example
//!
//! ```rust
//! use aegis_breaker::{Admission, BreakerConfig, BreakerRegistry, BreakerState, Outcome};
//! use aegis_core::{ErrorKind, ManualClock, Tier};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let registry = BreakerRegistry::new(Arc::new(clock.clone()));
//!
//! let config = BreakerConfig::builder()
//!     .failure_threshold(2)
//!     .cooldown(Duration::from_millis(100))
//!     .build()
//!     .unwrap();
//! registry.register("payments-api", Tier::Critical, config);
//!
//! // Two failures trip the breaker.
//! for _ in 0..2 {
//!     assert!(registry.admit("payments-api").unwrap().is_admitted());
//!     registry.observe("payments-api", Outcome::Failure(ErrorKind::Network));
//! }
//! assert_eq!(registry.state("payments-api"), Some(BreakerState::Open));
//!
//! // Rejected during cooldown, admitted as a half-open probe after it.
//! assert!(matches!(registry.admit("payments-api"), Some(Admission::Rejected(_))));
//! clock.advance(Duration::from_millis(100));
//! assert!(registry.admit("payments-api").unwrap().is_admitted());
//! assert_eq!(registry.state("payments-api"), Some(BreakerState::HalfOpen));
//! ```

mod cell;
mod config;
mod events;
mod registry;
mod store;

pub use cell::{BreakerSnapshot, BreakerState};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use events::BreakerEvent;
pub use registry::{Admission, BreakerRegistry, Outcome, RejectReason};
pub use store::{BreakerStore, InMemoryBreakerStore, PersistedBreaker};
