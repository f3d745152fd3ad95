//! Fan-out delivery of alerts to subscribers, plus the bounded backing
//! store the HTTP query API reads from.

pub mod dispatcher;

pub use dispatcher::{AlertDispatcher, Subscription, SubscriberId};
