//! Event bus client.
//!
//! # Responsibilities
//! - Deliver one event to a broker ingress
//! - Classify the result as delivered, undelivered or nacked
//!
//! # Design Decisions
//! - [`EventBus`] is the seam between the publisher and the wire; the
//!   default [`HttpEventBus`] speaks CloudEvents HTTP binary content mode
//! - One attempt per event; the broker owns redelivery

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::config::TimeoutConfig;
use crate::error::error_chain;
use crate::eventing::envelope::Event;
use crate::observability::TraceContext;

/// Longest broker response body kept in a nack reason.
const MAX_REASON_LEN: usize = 512;

/// Where and under which trace span an event is sent.
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    pub url: Url,
    pub trace: TraceContext,
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Broker accepted the event (2xx).
    Delivered,
    /// The event never reached a broker decision (connect, timeout, I/O).
    Undelivered(String),
    /// Broker answered and refused the event.
    Nacked { status: u16, reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn send(&self, target: &DeliveryTarget, event: &Event) -> DeliveryOutcome;
}

/// Bytes escaped in binary-mode attribute headers, besides non-ASCII.
const ATTRIBUTE_ESCAPES: &AsciiSet = &CONTROLS.add(b'"').add(b'%');

/// Percent-encode a binary-mode header value: printable ASCII except `"`
/// and `%` passes through, everything else becomes `%XX`.
fn encode_attribute(value: &str) -> HeaderValue {
    let encoded = utf8_percent_encode(value, ATTRIBUTE_ESCAPES).to_string();
    // Only visible ASCII remains.
    HeaderValue::from_str(&encoded).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Binary content mode headers for `event`.
pub fn binary_headers(event: &Event) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut put = |name: &str, value: &str| {
        if let Ok(name) = HeaderName::try_from(format!("ce-{}", name)) {
            headers.insert(name, encode_attribute(value));
        }
    };

    put("specversion", &event.specversion);
    put("id", &event.id);
    put("source", &event.source);
    put("type", &event.ty);
    if let Some(subject) = &event.subject {
        put("subject", subject);
    }
    if let Some(time) = &event.time {
        put("time", time);
    }
    for (name, value) in &event.extensions {
        put(name, value);
    }

    if let Some(content_type) = event
        .datacontenttype
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    headers
}

/// Delivers events over HTTP with `reqwest`.
#[derive(Clone)]
pub struct HttpEventBus {
    client: reqwest::Client,
}

impl HttpEventBus {
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventBus for HttpEventBus {
    async fn send(&self, target: &DeliveryTarget, event: &Event) -> DeliveryOutcome {
        let mut headers = binary_headers(event);
        target.trace.inject(&mut headers);
        let body = event.data.as_ref().map(|d| d.to_bytes()).unwrap_or_default();

        let response = self
            .client
            .post(target.url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => DeliveryOutcome::Delivered,
            Ok(response) => {
                let status = response.status().as_u16();
                let mut reason = response.text().await.unwrap_or_default();
                if reason.len() > MAX_REASON_LEN {
                    let mut cut = MAX_REASON_LEN;
                    while !reason.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    reason.truncate(cut);
                }
                DeliveryOutcome::Nacked { status, reason }
            }
            Err(e) => DeliveryOutcome::Undelivered(error_chain(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binary_headers_carry_attributes() {
        let mut event = Event::new("curl/8.0", "Webhook").with_json_data(json!({}));
        event.subject = Some("orders".into());
        event.extensions.insert("tenant".into(), "acme".into());

        let headers = binary_headers(&event);
        assert_eq!(headers["ce-specversion"], "1.0");
        assert_eq!(headers["ce-id"], event.id.as_str());
        assert_eq!(headers["ce-source"], "curl/8.0");
        assert_eq!(headers["ce-type"], "Webhook");
        assert_eq!(headers["ce-subject"], "orders");
        assert_eq!(headers["ce-tenant"], "acme");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn attribute_values_are_percent_encoded() {
        assert_eq!(encode_attribute("plain value"), "plain value");
        assert_eq!(encode_attribute("100% \"ok\""), "100%25 %22ok%22");
        assert_eq!(encode_attribute("é"), "%C3%A9");
    }

    #[tokio::test]
    async fn unreachable_broker_is_undelivered() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let bus = HttpEventBus::new(&TimeoutConfig::default()).unwrap();
        let target = DeliveryTarget {
            url: Url::parse(&format!("http://127.0.0.1:{port}/ns/default")).unwrap(),
            trace: TraceContext::new_root(),
        };
        let outcome = bus.send(&target, &Event::new("s", "t")).await;
        assert!(matches!(outcome, DeliveryOutcome::Undelivered(_)), "{outcome:?}");
    }
}
