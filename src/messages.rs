//! Control messages exchanged between pages and the controller.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// A structured message posted from a page to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
  /// Activate the waiting instance immediately
  SkipWaiting,
  /// Ask for the active instance's version; answered on the reply channel
  GetVersion,
}

/// Reply to [`ControlMessage::GetVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
  pub version: String,
}

/// A message plus the optional channel its answer goes to.
#[derive(Debug)]
pub struct Envelope {
  pub message: ControlMessage,
  pub reply: Option<oneshot::Sender<VersionReply>>,
}

impl Envelope {
  pub fn post(message: ControlMessage) -> Self {
    Self {
      message,
      reply: None,
    }
  }

  /// A message with a reply channel, and the receiving end of that channel.
  pub fn request(message: ControlMessage) -> (Self, oneshot::Receiver<VersionReply>) {
    let (tx, rx) = oneshot::channel();
    (
      Self {
        message,
        reply: Some(tx),
      },
      rx,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_wire_format() {
    assert_eq!(
      serde_json::to_string(&ControlMessage::SkipWaiting).unwrap(),
      r#"{"type":"SKIP_WAITING"}"#
    );
    assert_eq!(
      serde_json::to_string(&ControlMessage::GetVersion).unwrap(),
      r#"{"type":"GET_VERSION"}"#
    );
    let reply = VersionReply {
      version: "pera-nai-vai-v1.0.0".into(),
    };
    assert_eq!(
      serde_json::to_string(&reply).unwrap(),
      r#"{"version":"pera-nai-vai-v1.0.0"}"#
    );
  }

  #[test]
  fn test_parse_incoming() {
    let msg: ControlMessage = serde_json::from_str(r#"{ "type": "GET_VERSION" }"#).unwrap();
    assert_eq!(msg, ControlMessage::GetVersion);
    assert!(serde_json::from_str::<ControlMessage>(r#"{ "type": "RELOAD" }"#).is_err());
  }
}
