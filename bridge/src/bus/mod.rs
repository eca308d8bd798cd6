//! Change event bus.
//!
//! Native change notifications enter the process here and are dispatched to
//! every subscribed listener. Tracked collections subscribe to object-level
//! changes and filter them by their tracking key; application code can
//! subscribe to library-level changes and to correlated progress events.

mod dispatcher;
mod protocol;

pub use dispatcher::{ChangeEventBus, CorrelatedSubscription, ListenerId, Subscription};
pub use protocol::*;
