use serde_json::Value;

use crate::types::InboundEvent;
use crate::WebhookError;

/// Parses a delivery body. Only a body that is not a JSON object is an error;
/// missing or oddly shaped fields are handled by [`events`].
pub fn parse_payload(body: &[u8]) -> Result<Value, WebhookError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    if !payload.is_object() {
        return Err(WebhookError::MalformedPayload(
            "expected a JSON object at the top level".to_string(),
        ));
    }
    Ok(payload)
}

/// Lazily walks `entry[].messaging[]` in array order.
///
/// A missing `entry` yields nothing, an entry without `messaging` is skipped,
/// and a messaging item without `message.text` still yields an event with
/// `text: None`.
pub fn events(payload: &Value) -> impl Iterator<Item = InboundEvent> + '_ {
    payload
        .get("entry")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("messaging").and_then(Value::as_array))
        .flatten()
        .map(event_from_value)
}

/// Eager convenience over [`parse_payload`] and [`events`].
pub fn extract_events(body: &[u8]) -> Result<Vec<InboundEvent>, WebhookError> {
    let payload = parse_payload(body)?;
    Ok(events(&payload).collect())
}

fn event_from_value(item: &Value) -> InboundEvent {
    let message = item.get("message");
    InboundEvent {
        sender_id: id_of(item.get("sender")),
        recipient_id: id_of(item.get("recipient")),
        message_id: message
            .and_then(|m| m.get("mid"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        text: message
            .and_then(|m| m.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string),
        timestamp: item.get("timestamp").and_then(Value::as_i64),
        has_attachments: message
            .and_then(|m| m.get("attachments"))
            .and_then(Value::as_array)
            .is_some_and(|a| !a.is_empty()),
    }
}

/// Ids usually arrive as strings, occasionally as bare numbers.
fn id_of(party: Option<&Value>) -> String {
    match party.and_then(|p| p.get("id")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
