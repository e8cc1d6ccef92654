//! Encodings for LogSwarm
//!
//! - Records and control-channel messages are JSON (the application-facing,
//!   extensible encoding; unknown fields are ignored).
//! - Frame payloads on the wire are postcard (see `logswarm-net`).

use crate::error::{Error, Result};
use crate::types::*;

/// Encode a record into the JSON payload stored in a log entry.
pub fn encode_record(record: &Record) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(Error::from)
}

/// Decode a log entry payload.
pub fn decode_record(payload: &[u8]) -> Result<Record> {
    serde_json::from_slice(payload).map_err(Error::from)
}

/// Encode a control-channel message.
pub fn encode_control(message: &ControlMessage) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(Error::from)
}

/// Decode a control-channel message.
///
/// Messages with an unrecognized `type` decode to [`ControlMessage::Unknown`];
/// only malformed payloads are errors.
pub fn decode_control(payload: &[u8]) -> Result<ControlMessage> {
    serde_json::from_slice(payload).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_record_keeps_extra_fields() {
        let payload = br#"{"type":"message","timestamp":5,"message":"hi","mood":"good"}"#;
        let record = decode_record(payload).unwrap();
        assert_eq!(record.kind, "message");
        assert_eq!(record.timestamp, 5);
        assert_eq!(record.message_text(), Some("hi"));
        assert_eq!(record.fields["mood"], "good");
    }

    #[test]
    fn test_decode_record_requires_type() {
        assert!(decode_record(br#"{"timestamp":5}"#).is_err());
        assert!(decode_record(b"not json").is_err());
    }

    #[test]
    fn test_decode_control_bootstrap() {
        let payload = format!(r#"{{"type":"bootstrap","keys":["{}"]}}"#, "0a".repeat(32));
        let message = decode_control(payload.as_bytes()).unwrap();
        assert_eq!(message, ControlMessage::bootstrap(vec![LogId([0x0a; 32])]));
    }

    #[test]
    fn test_decode_control_malformed() {
        assert!(decode_control(b"{").is_err());
        assert!(decode_control(br#"{"keys":[]}"#).is_err());
        assert!(decode_control(br#"{"type":"bootstrap","keys":"0a"}"#).is_err());
        assert!(decode_control(br#"{"type":"bootstrap","keys":[7]}"#).is_err());
    }
}
