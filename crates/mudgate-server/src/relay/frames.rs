//! Typed frames carried on the browser channel (JSON, UTF-8).

use serde::{Deserialize, Serialize};

/// Frames the client sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Open an upstream session, or attach to one pre-created over REST
    /// when host is absent.
    Connect {
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        port: Option<u32>,
    },
    /// Tear down the upstream session.
    Disconnect,
    /// Text to forward to the upstream.
    Data { data: String },
}

/// Frames the server sends.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Status { status: &'static str },
    Data { data: String },
    Error { error: String },
    Disconnect { status: &'static str },
}

impl ServerFrame {
    pub fn connected() -> Self {
        Self::Status {
            status: "connected",
        }
    }

    pub fn disconnected() -> Self {
        Self::Disconnect {
            status: "disconnected",
        }
    }

    pub fn data(text: String) -> Self {
        Self::Data { data: text }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_frame_parses_with_and_without_target() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"connect","host":"mud.example.com","port":4000}"#)
                .unwrap();
        match frame {
            ClientFrame::Connect { host, port } => {
                assert_eq!(host.as_deref(), Some("mud.example.com"));
                assert_eq!(port, Some(4000));
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"connect"}"#).unwrap();
        assert!(matches!(
            frame,
            ClientFrame::Connect {
                host: None,
                port: None
            }
        ));
    }

    #[test]
    fn data_and_disconnect_frames_parse() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"data","data":"look"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Data { data } if data == "look"));

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"disconnect"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Disconnect));
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"shout","data":"hi"}"#).is_err());
    }

    #[test]
    fn server_frames_serialize_to_wire_shape() {
        assert_eq!(
            serde_json::to_string(&ServerFrame::connected()).unwrap(),
            r#"{"type":"status","status":"connected"}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerFrame::disconnected()).unwrap(),
            r#"{"type":"disconnect","status":"disconnected"}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerFrame::data("Hi".into())).unwrap(),
            r#"{"type":"data","data":"Hi"}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerFrame::error("Rate limit exceeded")).unwrap(),
            r#"{"type":"error","error":"Rate limit exceeded"}"#
        );
    }
}
