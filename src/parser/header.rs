//! RFC 5322 header block: locating, charset recovery and unfolding.

use super::encoded_word::decode_encoded_words;

/// Unfolded message headers, in the order they appeared.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    /// `(lowercase name, raw value)` pairs.
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Parse the header block of a message.
    ///
    /// `raw` may be the whole message; parsing stops at the first blank line.
    pub fn parse(raw: &[u8]) -> Self {
        let text = header_text(&raw[..header_block_len(raw)]);
        let mut fields: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    let more = line.trim();
                    if !value.is_empty() && !more.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(more);
                }
            } else if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }

        Self { fields }
    }

    /// Raw (still encoded) value of the first header with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Value of the first header with this name with encoded-words resolved.
    /// Missing headers decode to the empty string.
    pub fn decoded(&self, name: &str) -> String {
        self.get(name).map(decode_encoded_words).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Length of the header block: up to the first blank line, or everything.
fn header_block_len(raw: &[u8]) -> usize {
    let lf = raw.windows(2).position(|w| w == b"\n\n");
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b).unwrap_or(raw.len()),
    }
}

/// Header bytes as text, line by line: UTF-8 if valid, else Windows-1252
/// (total over bytes).
fn header_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut text = String::with_capacity(bytes.len());
    for line in bytes.split_inclusive(|&b| b == b'\n') {
        match std::str::from_utf8(line) {
            Ok(valid) => text.push_str(valid),
            Err(_) => {
                let (decoded, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(line);
                text.push_str(&decoded);
            }
        }
    }
    text
}
