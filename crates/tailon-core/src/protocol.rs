use chrono::{DateTime, Local, SecondsFormat};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

use crate::command::CommandRequest;
use crate::entry::NewEntry;
use crate::error::ProtocolError;

/// A decoded push from the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Raw lines per source, in the order the remote sent them.
    Lines(Vec<(String, Vec<String>)>),
    Truncated { source: String },
    Errors(Vec<String>),
}

/// JSON object that keeps its keys in document order.
struct OrderedObject(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for OrderedObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedObjectVisitor;

        impl<'de> Visitor<'de> for OrderedObjectVisitor {
            type Value = OrderedObject;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(1));
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    fields.push((key, value));
                }
                Ok(OrderedObject(fields))
            }
        }

        deserializer.deserialize_map(OrderedObjectVisitor)
    }
}

pub fn encode_request(request: &CommandRequest) -> Result<String, ProtocolError> {
    serde_json::to_string(request).map_err(|err| ProtocolError::Encode(err.to_string()))
}

pub fn decode_inbound(raw: &str) -> Result<Inbound, ProtocolError> {
    let OrderedObject(fields) =
        serde_json::from_str(raw).map_err(|err| ProtocolError::Decode(err.to_string()))?;

    if let Some((_, err)) = fields.iter().find(|(key, _)| key == "err") {
        return match err {
            Value::String(kind) if kind == "truncated" => {
                let source = fields
                    .iter()
                    .find(|(key, _)| key == "fn")
                    .and_then(|(_, value)| value.as_str())
                    .ok_or_else(|| ProtocolError::Shape("truncated notice without fn".to_string()))?;
                Ok(Inbound::Truncated {
                    source: source.to_string(),
                })
            }
            Value::String(message) => Ok(Inbound::Errors(vec![message.clone()])),
            Value::Array(items) => Ok(Inbound::Errors(items.iter().map(value_text).collect())),
            other => Err(ProtocolError::Shape(format!(
                "err must be a string or a list, got {other}"
            ))),
        };
    }

    let mut batches = Vec::with_capacity(fields.len());
    for (source, value) in fields {
        let Value::Array(items) = value else {
            return Err(ProtocolError::Shape(format!(
                "lines for '{source}' are not a list"
            )));
        };
        batches.push((source, items.iter().map(value_text).collect()));
    }
    Ok(Inbound::Lines(batches))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Entries to append for one inbound message.
pub fn entries_for(inbound: Inbound) -> Vec<NewEntry> {
    entries_at(inbound, Local::now())
}

pub fn entries_at(inbound: Inbound, now: DateTime<Local>) -> Vec<NewEntry> {
    match inbound {
        Inbound::Lines(batches) => batches
            .iter()
            .flat_map(|(_, lines)| lines.iter())
            .map(|line| NewEntry::line(line))
            .collect(),
        Inbound::Truncated { source } => {
            let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, false);
            vec![NewEntry::notice(&format!("{stamp} - {source} - truncated"))]
        }
        Inbound::Errors(messages) => messages
            .iter()
            .map(|message| NewEntry::notice(message))
            .collect(),
    }
}

/// Diagnostic shown in place of a frame that could not be decoded.
pub fn malformed_notice(err: &ProtocolError) -> NewEntry {
    NewEntry::notice(&format!("dropped malformed message: {err}"))
}
