//! Typed decoding of inbound push frames.
//!
//! Every inbound text frame is a JSON object with a mandatory `type`
//! discriminator. Unknown types and malformed JSON decode to
//! [`PushEvent::Unrecognized`] — a bad frame is dropped by the consumer,
//! never a reason to tear down the connection.

use serde::Deserialize;

/// A decoded server-pushed event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Server acknowledged the subscription.
    ConnectionEstablished { message: String },
    /// A fall was detected; the alert references the post documenting it.
    AlertRaised {
        title: String,
        body: String,
        related_post_id: i64,
    },
    /// Reply to our keepalive ping.
    Pong,
    /// Unknown type or unparseable frame, kept raw for diagnostics.
    Unrecognized { raw: String },
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "connection_established")]
    ConnectionEstablished {
        #[serde(default)]
        message: String,
    },
    // The server also attaches timestamp/image_url/video_url; serde drops
    // what we don't consume.
    #[serde(rename = "fall_detected")]
    FallDetected {
        #[serde(default = "default_alert_title")]
        title: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        post_id: i64,
    },
    #[serde(rename = "pong")]
    Pong,
}

fn default_alert_title() -> String {
    "Fall detected".to_string()
}

/// Decodes one inbound text frame into a [`PushEvent`].
pub fn decode_frame(frame: &str) -> PushEvent {
    match serde_json::from_str::<WireEvent>(frame) {
        Ok(WireEvent::ConnectionEstablished { message }) => {
            PushEvent::ConnectionEstablished { message }
        }
        Ok(WireEvent::FallDetected {
            title,
            text,
            post_id,
        }) => PushEvent::AlertRaised {
            title,
            body: text,
            related_post_id: post_id,
        },
        Ok(WireEvent::Pong) => PushEvent::Pong,
        Err(e) => {
            tracing::debug!(error = %e, frame = %frame, "Unrecognized push frame");
            PushEvent::Unrecognized {
                raw: frame.to_string(),
            }
        }
    }
}

/// The outbound keepalive frame.
pub fn ping_frame() -> String {
    serde_json::json!({"type": "ping"}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fall_detected_decodes_to_alert() {
        let event = decode_frame(
            r#"{"type":"fall_detected","title":"Fall","text":"Room 2","post_id":7}"#,
        );
        assert_eq!(
            event,
            PushEvent::AlertRaised {
                title: "Fall".to_string(),
                body: "Room 2".to_string(),
                related_post_id: 7,
            }
        );
    }

    #[test]
    fn fall_detected_tolerates_extra_server_fields() {
        let event = decode_frame(
            r#"{"type":"fall_detected","title":"Fall","text":"","post_id":3,
                "timestamp":"2025-11-02T09:15:00Z","image_url":"http://x/a.jpg","video_url":""}"#,
        );
        assert!(matches!(
            event,
            PushEvent::AlertRaised {
                related_post_id: 3,
                ..
            }
        ));
    }

    #[test]
    fn fall_detected_defaults_missing_fields() {
        let event = decode_frame(r#"{"type":"fall_detected"}"#);
        assert_eq!(
            event,
            PushEvent::AlertRaised {
                title: "Fall detected".to_string(),
                body: String::new(),
                related_post_id: 0,
            }
        );
    }

    #[test]
    fn connection_established_decodes_message() {
        let event = decode_frame(r#"{"type":"connection_established","message":"ok"}"#);
        assert_eq!(
            event,
            PushEvent::ConnectionEstablished {
                message: "ok".to_string()
            }
        );
    }

    #[test]
    fn pong_decodes() {
        assert_eq!(decode_frame(r#"{"type":"pong"}"#), PushEvent::Pong);
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let event = decode_frame(r#"{"type":"unknown_x"}"#);
        assert_eq!(
            event,
            PushEvent::Unrecognized {
                raw: r#"{"type":"unknown_x"}"#.to_string()
            }
        );
    }

    #[test]
    fn malformed_json_is_unrecognized() {
        for frame in ["not json at all", "{", r#"{"no_type": true}"#, "42"] {
            assert!(
                matches!(decode_frame(frame), PushEvent::Unrecognized { .. }),
                "frame {frame:?} should be unrecognized"
            );
        }
    }

    #[test]
    fn ping_frame_is_typed_json() {
        let value: serde_json::Value = serde_json::from_str(&ping_frame()).unwrap();
        assert_eq!(value["type"], "ping");
    }
}
