//! `errand-middleware` – event signalling and report delivery.
//!
//! Carries asynchronous signals between the simulated controllers, the
//! executor, and whoever is watching, without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.  Dropping a [`TopicReceiver`] is the unsubscribe.
//! - [`sink`] – the [`ReportSink`] interface plus tracing, in-memory, bus
//!   and fan-out implementations.

pub mod bus;
pub mod sink;

pub use bus::{DEFAULT_CAPACITY, EventBus, Topic, TopicReceiver};
pub use sink::{BusSink, FanoutSink, MemorySink, ReportSink, TracingSink};
