//! Event publishing.
//!
//! # Responsibilities
//! - Parse and validate CloudEvents posted by callers (`envelope`)
//! - Wrap arbitrary webhook payloads into events (`webhook`)
//! - Deliver events to namespace brokers and classify the result (`publisher`, `bus`)
//!
//! # Data Flow
//! ```text
//! POST /eventing/{ns}/{broker}          → Event::from_request ─┐
//! POST /eventing/{ns}/{broker}/webhook  → webhook::translate  ─┴→ EventPublisher::deliver
//!                                                                   → EventBus::send → DeliveryOutcome
//! ```

pub mod bus;
pub mod envelope;
pub mod publisher;
pub mod webhook;

pub use bus::{DeliveryOutcome, DeliveryTarget, EventBus, HttpEventBus};
pub use envelope::{Event, EventData, EventError};
pub use publisher::EventPublisher;
pub use webhook::WebhookTranslator;
