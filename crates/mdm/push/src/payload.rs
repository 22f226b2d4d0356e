//! Gateway request construction.

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use mdm_core::PushTarget;

use crate::PushError;

/// Largest body the gateway accepts.
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// How long the gateway should keep trying to deliver a push.
pub const EXPIRATION: Duration = Duration::from_secs(60);

#[derive(serde::Serialize)]
struct MdmPayload<'a> {
    mdm: &'a str,
}

/// Encode the `{"mdm": <push magic>}` body, enforcing the size limit.
pub fn encode_payload(push_magic: &str) -> Result<Bytes, PushError> {
    let body = serde_json::to_vec(&MdmPayload { mdm: push_magic })
        .map_err(|e| PushError::Transport(format!("failed to encode payload: {e}")))?;

    if body.len() > MAX_PAYLOAD_SIZE {
        return Err(PushError::PayloadTooLarge {
            size: body.len(),
            limit: MAX_PAYLOAD_SIZE,
        });
    }

    Ok(Bytes::from(body))
}

/// Build the request head for one push.
pub fn build_request(
    authority: &str,
    target: &PushTarget,
    body_len: usize,
    now: SystemTime,
) -> Result<http::Request<()>, PushError> {
    let expiration = now
        .checked_add(EXPIRATION)
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());

    http::Request::builder()
        .method(http::Method::POST)
        .uri(format!("https://{authority}/3/device/{}", target.token))
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::CONTENT_LENGTH, body_len)
        .header("apns-expiration", expiration)
        .header("apns-priority", "10")
        .header("apns-topic", target.topic.as_str())
        .header("apns-push-type", "mdm")
        .body(())
        .map_err(|e| PushError::Transport(format!("invalid push request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> PushTarget {
        PushTarget {
            id: "UDID-1".into(),
            topic: "com.apple.mgmt.External.1234".into(),
            push_magic: "MAGIC-1".into(),
            token: "deadbeef".into(),
        }
    }

    #[test]
    fn test_payload_body() {
        let body = encode_payload("MAGIC-1").unwrap();
        assert_eq!(&body[..], br#"{"mdm":"MAGIC-1"}"#);
    }

    #[test]
    fn test_payload_size_limit() {
        // {"mdm":""} is 10 bytes of framing
        assert!(encode_payload(&"a".repeat(MAX_PAYLOAD_SIZE - 10)).is_ok());

        let err = encode_payload(&"a".repeat(MAX_PAYLOAD_SIZE)).unwrap_err();
        assert_eq!(
            err,
            PushError::PayloadTooLarge {
                size: MAX_PAYLOAD_SIZE + 10,
                limit: MAX_PAYLOAD_SIZE
            }
        );
    }

    #[test]
    fn test_request_headers() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let request = build_request("api.push.apple.com", &target(), 17, now).unwrap();

        assert_eq!(request.method(), http::Method::POST);
        assert_eq!(
            request.uri().to_string(),
            "https://api.push.apple.com/3/device/deadbeef"
        );

        let headers = request.headers();
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["content-length"], "17");
        assert_eq!(headers["apns-expiration"], "1700000060");
        assert_eq!(headers["apns-priority"], "10");
        assert_eq!(headers["apns-topic"], "com.apple.mgmt.External.1234");
        assert_eq!(headers["apns-push-type"], "mdm");
    }
}
