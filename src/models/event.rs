use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Call event kinds the relay reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    IncomingCall,
    Answer,
    Hangup,
    #[serde(other)]
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::IncomingCall => "incomingcall",
            EventType::Answer => "answer",
            EventType::Hangup => "hangup",
            EventType::Other => "other",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call event pushed by the provider to `/users/{userName}/callback`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    #[serde(rename = "callId", default)]
    pub call_id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Correlation id echoed back on legs the relay created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(rename = "callState", default, skip_serializing_if = "Option::is_none")]
    pub call_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_time", skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl CallEvent {
    /// Tag of the peer leg, if the provider echoed a non-empty one
    pub fn peer_tag(&self) -> Option<&str> {
        self.tag.as_deref().filter(|t| !t.is_empty())
    }
}

// Unparseable timestamps must not reject the whole event.
fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_incoming_call() {
        let event: CallEvent = serde_json::from_str(
            r#"{
                "eventType": "incomingcall",
                "callId": "c-L1",
                "from": "+15550001111",
                "to": "+19195551234",
                "callState": "started",
                "time": "2016-03-01T13:15:47.587Z"
            }"#,
        )
        .unwrap();

        assert_eq!(event.event_type, EventType::IncomingCall);
        assert_eq!(event.call_id, "c-L1");
        assert_eq!(event.peer_tag(), None);
        assert!(event.time.is_some());
    }

    #[test]
    fn test_unknown_event_type_and_bad_time() {
        let event: CallEvent = serde_json::from_str(
            r#"{"eventType": "speak", "callId": "c-1", "time": "yesterday", "tag": ""}"#,
        )
        .unwrap();

        assert_eq!(event.event_type, EventType::Other);
        assert!(event.time.is_none());
        assert_eq!(event.peer_tag(), None);
        assert_eq!(event.from, "");
    }
}
