//! Session layer
//!
//! Everything between the HTTP handlers and the Kafka client: request
//! classification, format negotiation, the record envelope codec, base-URI
//! derivation, the two session types and the registry that owns them.

pub mod classifier;
pub mod codec;
pub mod consumer;
pub mod format;
pub mod forwarded;
pub mod producer;
pub mod registry;

pub use classifier::{classify, HttpOperation};
pub use consumer::{ConsumerSession, SubscriptionState};
pub use format::EmbeddedFormat;
pub use producer::ProducerSession;
pub use registry::{ConsumerCreateOptions, ConsumerEntry, SessionRegistry};
