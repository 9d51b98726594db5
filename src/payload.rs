use bytes::Bytes;

/// Content handed to a write. Text is always stored as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

/// How a payload is written to a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Text,
    Binary,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Text => "text",
            WriteMode::Binary => "binary",
        }
    }
}

impl Payload {
    pub fn mode(&self) -> WriteMode {
        match self {
            Payload::Text(_) => WriteMode::Text,
            Payload::Binary(_) => WriteMode::Binary,
        }
    }

    pub fn is_binary(&self) -> bool {
        self.mode() == WriteMode::Binary
    }

    /// The exact bytes that get checksummed and stored.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Payload::Text(s) => Bytes::copy_from_slice(s.as_bytes()),
            Payload::Binary(b) => b.clone(),
        }
    }

    /// Rebuild a payload from stored bytes, keeping text as text when the
    /// bytes were classified as non-binary and decode cleanly.
    pub fn from_stored(data: Bytes, is_binary: bool) -> Self {
        if is_binary {
            return Payload::Binary(data);
        }
        match String::from_utf8(data.to_vec()) {
            Ok(text) => Payload::Text(text),
            Err(_) => Payload::Binary(data),
        }
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Binary(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(v))
    }
}
