//! Encoding and decoding of camlink protocol messages.
//!
//! The session stream carries JSON values without a length prefix, so the
//! decoders here are incremental: they report
//! [`ProtocolError::InsufficientData`] while a value is still incomplete and
//! return the number of bytes consumed once it parses.

use std::net::IpAddr;

use serde_json::{Deserializer, Value};
use thiserror::Error;

use crate::domain::server::ServerRecord;
use crate::protocol::messages::{Beacon, SelectCameraRequest, SELECT_ACK};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The bytes received so far do not yet form a complete message.
    #[error("insufficient data: {available} byte(s) do not form a complete message")]
    InsufficientData { available: usize },

    /// A discovery datagram is not a valid beacon.
    #[error("malformed beacon: {0}")]
    MalformedBeacon(String),

    /// The handshake response has no `cameras` field.
    #[error("server response has no camera list")]
    MissingCameraList,

    /// The `cameras` field is not a list of integers.
    #[error("invalid camera list: {0}")]
    InvalidCameraList(String),

    /// The payload is not valid JSON or could not be serialized.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A camera selection was answered with something other than the ack byte.
    #[error("unexpected acknowledgment byte 0x{0:02x}")]
    UnexpectedAck(u8),
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Parses a discovery datagram received from `sender`.
///
/// The sender address always wins over any `ip` field inside the beacon.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedBeacon`] if the datagram is not a JSON
/// object with a valid `heartbeat_port`.
///
/// # Examples
///
/// ```rust
/// use camlink_core::parse_beacon;
///
/// let sender = "192.168.1.20".parse().unwrap();
/// let record = parse_beacon(br#"{"heartbeat_port": 9000, "name": "yard"}"#, sender).unwrap();
/// assert_eq!(record.heartbeat_port, 9000);
/// assert_eq!(record.name, "yard");
/// assert_eq!(record.ip, sender);
/// ```
pub fn parse_beacon(datagram: &[u8], sender: IpAddr) -> Result<ServerRecord, ProtocolError> {
    let mut beacon: Beacon = serde_json::from_slice(datagram)
        .map_err(|e| ProtocolError::MalformedBeacon(e.to_string()))?;
    beacon.extra.remove("ip");

    Ok(ServerRecord {
        ip: sender,
        heartbeat_port: beacon.heartbeat_port,
        name: beacon.name,
        extra: beacon.extra,
    })
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Decodes the camera list from the beginning of `bytes`.
///
/// Returns the camera identifiers in server order and the number of bytes
/// consumed.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] if the JSON value is incomplete.
/// - [`ProtocolError::MalformedPayload`] if the bytes are not JSON.
/// - [`ProtocolError::MissingCameraList`] if there is no `cameras` field.
/// - [`ProtocolError::InvalidCameraList`] if `cameras` is not a list of
///   integers.
///
/// # Examples
///
/// ```rust
/// use camlink_core::decode_camera_list;
///
/// let bytes = br#"{"cameras": [2, 5, 7]}"#;
/// let (cameras, consumed) = decode_camera_list(bytes).unwrap();
/// assert_eq!(cameras, vec![2, 5, 7]);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn decode_camera_list(bytes: &[u8]) -> Result<(Vec<i32>, usize), ProtocolError> {
    let mut stream = Deserializer::from_slice(bytes).into_iter::<Value>();

    let value = match stream.next() {
        None => {
            return Err(ProtocolError::InsufficientData {
                available: bytes.len(),
            })
        }
        Some(Err(e)) if e.is_eof() => {
            return Err(ProtocolError::InsufficientData {
                available: bytes.len(),
            })
        }
        Some(Err(e)) => return Err(ProtocolError::MalformedPayload(e.to_string())),
        Some(Ok(value)) => value,
    };
    let consumed = stream.byte_offset();

    let cameras = value
        .get("cameras")
        .cloned()
        .ok_or(ProtocolError::MissingCameraList)?;
    let cameras: Vec<i32> = serde_json::from_value(cameras)
        .map_err(|e| ProtocolError::InvalidCameraList(e.to_string()))?;

    Ok((cameras, consumed))
}

// ── Camera selection ──────────────────────────────────────────────────────────

/// Encodes a camera selection request, newline terminated.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if serialization fails.
pub fn encode_select_request(camera_index: i32) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(&SelectCameraRequest { camera_index })
        .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Returns `true` if `byte` acknowledges a camera selection.
pub fn is_select_ack(byte: u8) -> bool {
    byte == SELECT_ACK
}

/// Checks a camera selection acknowledgment.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedAck`] for any byte other than `'1'`.
pub fn check_select_ack(byte: u8) -> Result<(), ProtocolError> {
    if is_select_ack(byte) {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedAck(byte))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> IpAddr {
        "192.168.1.40".parse().unwrap()
    }

    #[test]
    fn test_check_select_ack_rejects_other_bytes() {
        assert_eq!(check_select_ack(b'1'), Ok(()));
        assert_eq!(check_select_ack(b'0'), Err(ProtocolError::UnexpectedAck(b'0')));
    }

    #[test]
    fn test_parse_beacon_keeps_extra_fields() {
        // Arrange
        let datagram = br#"{"heartbeat_port": 9000, "name": "dock", "version": "1.2"}"#;

        // Act
        let record = parse_beacon(datagram, sender()).unwrap();

        // Assert
        assert_eq!(record.extra.get("version"), Some(&Value::from("1.2")));
        assert_eq!(record.name, "dock");
    }

    #[test]
    fn test_parse_beacon_sender_overrides_embedded_ip() {
        let datagram = br#"{"heartbeat_port": 9000, "ip": "10.9.9.9"}"#;

        let record = parse_beacon(datagram, sender()).unwrap();

        assert_eq!(record.ip, sender());
        assert!(!record.extra.contains_key("ip"));
    }

    #[test]
    fn test_parse_beacon_without_name_uses_empty_name() {
        let record = parse_beacon(br#"{"heartbeat_port": 1}"#, sender()).unwrap();
        assert!(record.name.is_empty());
    }

    #[test]
    fn test_parse_beacon_rejects_missing_port() {
        let result = parse_beacon(br#"{"name": "no port"}"#, sender());
        assert!(matches!(result, Err(ProtocolError::MalformedBeacon(_))));
    }

    #[test]
    fn test_parse_beacon_rejects_out_of_range_port() {
        let result = parse_beacon(br#"{"heartbeat_port": 70000}"#, sender());
        assert!(matches!(result, Err(ProtocolError::MalformedBeacon(_))));
    }

    #[test]
    fn test_parse_beacon_rejects_non_json() {
        let result = parse_beacon(b"hello there", sender());
        assert!(matches!(result, Err(ProtocolError::MalformedBeacon(_))));
    }

    #[test]
    fn test_decode_camera_list_preserves_order() {
        let (cameras, _) = decode_camera_list(br#"{"cameras":[7,2,5]}"#).unwrap();
        assert_eq!(cameras, vec![7, 2, 5]);
    }

    #[test]
    fn test_decode_camera_list_reports_partial_value_as_insufficient() {
        // Arrange: the response split mid-array across two TCP segments.
        let partial = br#"{"cameras": [2, 5"#;

        // Act
        let result = decode_camera_list(partial);

        // Assert
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData {
                available: partial.len()
            })
        );
    }

    #[test]
    fn test_decode_camera_list_empty_input_is_insufficient() {
        assert!(matches!(
            decode_camera_list(b""),
            Err(ProtocolError::InsufficientData { available: 0 })
        ));
    }

    #[test]
    fn test_decode_camera_list_missing_field() {
        assert_eq!(
            decode_camera_list(br#"{"status": "ok"}"#),
            Err(ProtocolError::MissingCameraList)
        );
    }

    #[test]
    fn test_decode_camera_list_rejects_non_integer_entries() {
        let result = decode_camera_list(br#"{"cameras": [1, "two"]}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidCameraList(_))));
    }

    #[test]
    fn test_decode_camera_list_rejects_garbage() {
        let result = decode_camera_list(b"}{not json");
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_camera_list_consumed_stops_after_first_value() {
        // Arrange: a heartbeat byte already follows the camera list.
        let bytes = br#"{"cameras":[1]}HB"#;

        // Act
        let (_, consumed) = decode_camera_list(bytes).unwrap();

        // Assert
        assert_eq!(&bytes[consumed..], b"HB");
    }

    #[test]
    fn test_decode_empty_camera_list_is_valid() {
        let (cameras, _) = decode_camera_list(br#"{"cameras":[]}"#).unwrap();
        assert!(cameras.is_empty());
    }

    #[test]
    fn test_encode_select_request_is_newline_terminated_json() {
        let bytes = encode_select_request(3).unwrap();
        assert_eq!(bytes, b"{\"camera_index\":3}\n");
    }

    #[test]
    fn test_is_select_ack_accepts_only_ascii_one() {
        assert!(is_select_ack(b'1'));
        assert!(!is_select_ack(b'0'));
        assert!(!is_select_ack(1));
    }
}
