// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Inbound webhook payloads.
//!
//! Transport-agnostic logical shape:
//!
//! ```json
//! {
//!   "type": "catalog_updated",
//!   "eventId": "evt-1",
//!   "merchantId": "MERCHANT_1",
//!   "updatedAt": "2026-01-01T12:00:00Z"
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use catalog_sync::webhook::{EntityKind, WebhookEvent};
//!
//! let event = WebhookEvent::from_json(
//!     r#"{"type":"inventory_updated","eventId":"e1","merchantId":"M","updatedAt":"2026-01-01T00:00:00Z"}"#,
//! ).unwrap();
//! assert_eq!(event.entity_kind, EntityKind::Inventory);
//! assert_eq!(event.event_id, "e1");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unsupported webhook type '{0}'")]
    UnsupportedType(String),
    #[error("Webhook is missing an event id")]
    MissingEventId,
    #[error("Invalid updatedAt timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Which part of the catalog changed remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Catalog,
    Inventory,
}

impl EntityKind {
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "catalog_updated" => Some(Self::Catalog),
            "inventory_updated" => Some(Self::Inventory),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::Inventory => write!(f, "inventory"),
        }
    }
}

/// Raw webhook body as delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub event_id: String,
    pub merchant_id: String,
    pub updated_at: String,
}

/// Validated, immutable webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_id: String,
    pub entity_kind: EntityKind,
    pub merchant_id: String,
    pub remote_timestamp: DateTime<Utc>,
    /// Original body, kept for the embedding application
    pub payload: Value,
}

impl WebhookEvent {
    pub fn from_json(body: &str) -> Result<Self, WebhookError> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, WebhookError> {
        let payload: WebhookPayload = serde_json::from_value(value.clone())?;
        Self::build(payload, value)
    }

    pub fn from_payload(payload: WebhookPayload) -> Result<Self, WebhookError> {
        let value = serde_json::to_value(&payload)?;
        Self::build(payload, value)
    }

    fn build(payload: WebhookPayload, raw: Value) -> Result<Self, WebhookError> {
        let entity_kind = EntityKind::from_type(&payload.kind)
            .ok_or_else(|| WebhookError::UnsupportedType(payload.kind.clone()))?;
        if payload.event_id.trim().is_empty() {
            return Err(WebhookError::MissingEventId);
        }
        let remote_timestamp = DateTime::parse_from_rfc3339(&payload.updated_at)
            .map_err(|_| WebhookError::InvalidTimestamp(payload.updated_at.clone()))?
            .with_timezone(&Utc);

        Ok(Self {
            event_id: payload.event_id,
            entity_kind,
            merchant_id: payload.merchant_id,
            remote_timestamp,
            payload: raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_catalog_update() {
        let event = WebhookEvent::from_value(json!({
            "type": "catalog_updated",
            "eventId": "evt-1",
            "merchantId": "M1",
            "updatedAt": "2026-03-01T10:00:02+00:00"
        }))
        .unwrap();
        assert_eq!(event.entity_kind, EntityKind::Catalog);
        assert_eq!(event.merchant_id, "M1");
        assert_eq!(event.remote_timestamp.timestamp() % 60, 2);
    }

    #[test]
    fn test_offset_timestamp_normalized_to_utc() {
        let event = WebhookEvent::from_value(json!({
            "type": "catalog_updated",
            "eventId": "evt-1",
            "merchantId": "M1",
            "updatedAt": "2026-03-01T12:00:00+02:00"
        }))
        .unwrap();
        assert_eq!(event.remote_timestamp.to_rfc3339(), "2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = WebhookEvent::from_value(json!({
            "type": "customer_created",
            "eventId": "evt-1",
            "merchantId": "M1",
            "updatedAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap_err();
        assert!(matches!(err, WebhookError::UnsupportedType(t) if t == "customer_created"));
    }

    #[test]
    fn test_blank_event_id_rejected() {
        let err = WebhookEvent::from_value(json!({
            "type": "catalog_updated",
            "eventId": "  ",
            "merchantId": "M1",
            "updatedAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap_err();
        assert!(matches!(err, WebhookError::MissingEventId));
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let err = WebhookEvent::from_json(
            r#"{"type":"catalog_updated","eventId":"e","merchantId":"M","updatedAt":"yesterday"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = WebhookEvent::from_json(r#"{"type":"catalog_updated"}"#).unwrap_err();
        assert!(matches!(err, WebhookError::Malformed(_)));
    }
}
