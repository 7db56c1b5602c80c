//! Request body re-encoding.
//!
//! The outbound body is chosen by a small closed set of strategies keyed by
//! the normalized content type. JSON that already parses is forwarded with its
//! original bytes; structured bodies are serialized for their content type;
//! everything else passes through untouched.

use axum::body::Bytes;
use axum::http::Method;
use serde_json::{Map, Value};

/// The inbound body as the gateway received it.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundBody {
    /// Opaque bytes, possibly binary.
    Raw(Bytes),
    /// Key/value pairs decoded from a form body.
    Structured(Map<String, Value>),
}

impl InboundBody {
    /// Decode the received bytes for `content_type`. Form bodies become
    /// structured (last value wins for repeated keys), anything else stays raw.
    pub fn from_bytes(bytes: Bytes, content_type: Option<&str>) -> Self {
        match BodyCodec::for_content_type(content_type) {
            BodyCodec::Form => {
                let fields = url::form_urlencoded::parse(&bytes)
                    .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                    .collect();
                Self::Structured(fields)
            }
            BodyCodec::Json | BodyCodec::PassThrough => Self::Raw(bytes),
        }
    }

    /// The `url` field of a JSON object or form body, if any.
    pub fn url_field(&self) -> Option<String> {
        match self {
            Self::Structured(fields) => fields.get("url").and_then(Value::as_str).map(str::to_string),
            Self::Raw(bytes) => serde_json::from_slice::<Value>(bytes)
                .ok()?
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Strategy used to produce the outbound body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyCodec {
    Json,
    Form,
    PassThrough,
}

impl BodyCodec {
    /// Pick a strategy from a declared content type such as `application/json; charset=utf-8`.
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::PassThrough;
        };
        let normalized = content_type.to_ascii_lowercase();
        if normalized.contains("application/json") {
            Self::Json
        } else if normalized.contains("application/x-www-form-urlencoded") {
            Self::Form
        } else {
            Self::PassThrough
        }
    }

    /// Produce the outbound representation of `body`.
    pub fn encode(self, body: &InboundBody) -> Bytes {
        match (self, body) {
            (Self::Json, InboundBody::Raw(bytes)) => {
                if serde_json::from_slice::<Value>(bytes).is_err() {
                    tracing::debug!(len = bytes.len(), "Declared JSON body does not parse, forwarding unchanged");
                }
                bytes.clone()
            }
            (Self::Form, InboundBody::Structured(fields)) => Bytes::from(encode_form(fields)),
            (Self::Json | Self::PassThrough, InboundBody::Structured(fields)) => {
                // A map of JSON values always serializes.
                Bytes::from(serde_json::to_vec(fields).unwrap_or_default())
            }
            (Self::Form | Self::PassThrough, InboundBody::Raw(bytes)) => bytes.clone(),
        }
    }
}

/// Whether a request with this method carries a body upstream.
pub fn method_carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Outbound body for `method`, or `None` for GET/HEAD/OPTIONS.
pub fn encode_body(method: &Method, content_type: Option<&str>, body: &InboundBody) -> Option<Bytes> {
    method_carries_body(method).then(|| BodyCodec::for_content_type(content_type).encode(body))
}

fn encode_form(fields: &Map<String, Value>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        match value {
            Value::String(s) => serializer.append_pair(key, s),
            Value::Null => serializer.append_pair(key, ""),
            other => serializer.append_pair(key, &other.to_string()),
        };
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_codec_selection() {
        assert_eq!(BodyCodec::for_content_type(Some("application/json")), BodyCodec::Json);
        assert_eq!(
            BodyCodec::for_content_type(Some("Application/JSON; charset=utf-8")),
            BodyCodec::Json
        );
        assert_eq!(
            BodyCodec::for_content_type(Some("application/x-www-form-urlencoded")),
            BodyCodec::Form
        );
        assert_eq!(BodyCodec::for_content_type(Some("text/plain")), BodyCodec::PassThrough);
        assert_eq!(BodyCodec::for_content_type(None), BodyCodec::PassThrough);
    }

    #[test]
    fn test_json_bytes_preserved_exactly() {
        let original = "{ \"url\" : \"https://api.example.com\",\n  \"n\": 1.50, \"z\": [1,2] }";
        let body = InboundBody::from_bytes(Bytes::from(original), Some("application/json"));
        let encoded = encode_body(&Method::POST, Some("application/json"), &body).unwrap();
        assert_eq!(encoded, Bytes::from(original));
    }

    #[test]
    fn test_invalid_json_forwarded_unchanged() {
        let body = InboundBody::Raw(Bytes::from_static(b"{not json"));
        assert_eq!(BodyCodec::Json.encode(&body), Bytes::from_static(b"{not json"));
    }

    #[test]
    fn test_structured_body_serialized_as_json() {
        let mut fields = Map::new();
        fields.insert("name".into(), json!("widget"));
        fields.insert("count".into(), json!(3));
        let encoded = BodyCodec::Json.encode(&InboundBody::Structured(fields));
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value, json!({"name": "widget", "count": 3}));
    }

    #[test]
    fn test_form_body_reencoded() {
        let body = InboundBody::from_bytes(
            Bytes::from_static(b"url=https%3A%2F%2Fapi.example.com&q=hello+world&q=again&empty="),
            Some("application/x-www-form-urlencoded"),
        );
        assert_eq!(body.url_field().as_deref(), Some("https://api.example.com"));

        let encoded = encode_body(&Method::PUT, Some("application/x-www-form-urlencoded"), &body).unwrap();
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(&encoded).into_owned().collect();
        assert!(pairs.contains(&("url".into(), "https://api.example.com".into())));
        assert!(pairs.contains(&("q".into(), "again".into())));
        assert!(pairs.contains(&("empty".into(), String::new())));
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn test_binary_passthrough() {
        let payload = Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x00, 0xff, 0x10]);
        let body = InboundBody::from_bytes(payload.clone(), Some("image/png"));
        assert_eq!(encode_body(&Method::POST, Some("image/png"), &body), Some(payload));
    }

    #[test]
    fn test_bodyless_methods() {
        let body = InboundBody::Raw(Bytes::from_static(b"{\"a\":1}"));
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert_eq!(encode_body(&method, Some("application/json"), &body), None);
        }
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(encode_body(&method, Some("application/json"), &body).is_some());
        }
    }

    #[test]
    fn test_url_field_from_json() {
        let body = InboundBody::Raw(Bytes::from_static(b"{\"url\":\"https://x.example/a\",\"data\":1}"));
        assert_eq!(body.url_field().as_deref(), Some("https://x.example/a"));

        let no_url = InboundBody::Raw(Bytes::from_static(b"[1,2,3]"));
        assert_eq!(no_url.url_field(), None);

        let binary = InboundBody::Raw(Bytes::from_static(&[0xff, 0xfe]));
        assert_eq!(binary.url_field(), None);
    }
}
