//! Wire envelope for a batch.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// A batch ready to be posted as a form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    data: String,
    verbose: bool,
}

impl EncodedPayload {
    /// Encode a JSON array of events.
    pub fn from_batch_json(json: &str, verbose: bool) -> Self {
        Self {
            data: BASE64.encode(json.as_bytes()),
            verbose,
        }
    }

    /// The base64-encoded batch.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Form fields in the order they are sent.
    pub fn form_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![("data", self.data.as_str())];
        if self.verbose {
            fields.push(("verbose", "1"));
        }
        fields
    }

    /// Decode the batch back to its JSON text.
    pub fn decode(&self) -> Option<String> {
        let bytes = BASE64.decode(&self.data).ok()?;
        String::from_utf8(bytes).ok()
    }

    /// Size of the encoded batch in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
