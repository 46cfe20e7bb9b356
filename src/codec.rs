use std::sync::Arc;

use bytes::Bytes;

use crate::error::Error;

/// Body codec contract: a content type plus symmetric encode/decode over
/// `serde_json::Value` as the interchange value. Generated clients convert
/// their typed payloads through `serde` at the edges.
pub trait Codec: std::fmt::Debug + Send + Sync {
    fn content_type(&self) -> &str;

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, Error>;

    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, Error>;
}

#[derive(Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, Error> {
        let encoded =
            serde_json::to_vec(value).map_err(|source| Error::SerializeBody { source })?;
        Ok(Bytes::from(encoded))
    }

    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, Error> {
        serde_json::from_slice(body).map_err(|source| Error::Deserialize {
            source,
            body: crate::util::truncate_body(body),
        })
    }
}

/// Explicitly constructed codec lookup, passed to the client at build time.
/// One registry per client; no process-wide statics, so independently
/// configured clients can coexist in one process.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn Codec>>,
    default: Arc<dyn Codec>,
}

impl CodecRegistry {
    pub fn new(default: Arc<dyn Codec>) -> Self {
        Self {
            codecs: vec![Arc::clone(&default)],
            default,
        }
    }

    pub fn register(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codecs.push(codec);
        self
    }

    /// Codec for a request body, chosen by the caller-specified content type.
    pub fn for_request(&self, content_type: &str) -> Result<&Arc<dyn Codec>, Error> {
        self.lookup(content_type)
            .ok_or_else(|| Error::UnsupportedContentType {
                content_type: content_type.to_owned(),
            })
    }

    /// Codec for a response body, chosen by the response's `Content-Type`
    /// header, falling back to the configured default.
    pub fn for_response(&self, content_type: Option<&str>) -> &Arc<dyn Codec> {
        content_type
            .and_then(|content_type| self.lookup(content_type))
            .unwrap_or(&self.default)
    }

    fn lookup(&self, content_type: &str) -> Option<&Arc<dyn Codec>> {
        let base = media_type(content_type);
        self.codecs
            .iter()
            .find(|codec| codec.content_type().eq_ignore_ascii_case(base))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new(Arc::new(JsonCodec))
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.codecs.iter().map(|codec| codec.content_type()).collect();
        formatter
            .debug_struct("CodecRegistry")
            .field("codecs", &names)
            .field("default", &self.default.content_type())
            .finish()
    }
}

/// Strips media type parameters: `application/json; charset=utf-8` matches
/// the codec registered for `application/json`.
fn media_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}
