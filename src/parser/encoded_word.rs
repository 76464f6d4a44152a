//! RFC 2047 encoded-words in header values.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use tracing::debug;

/// Mailers are sloppy about base64 padding in encoded-words.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferEncoding {
    Base64,
    Quoted,
}

/// One `=?charset?enc?text?=` token borrowed from a header value.
#[derive(Debug)]
struct EncodedWord<'a> {
    charset: &'a str,
    encoding: TransferEncoding,
    text: &'a str,
}

impl<'a> EncodedWord<'a> {
    /// Parse a word at the start of `s`; returns it with its length in bytes.
    fn parse(s: &'a str) -> Option<(Self, usize)> {
        let body = s.strip_prefix("=?")?;
        let (charset, rest) = body.split_once('?')?;
        let (encoding, rest) = rest.split_once('?')?;
        let end = rest.find("?=")?;

        let encoding = match encoding {
            "B" | "b" => TransferEncoding::Base64,
            "Q" | "q" => TransferEncoding::Quoted,
            _ => return None,
        };
        if charset.is_empty() || charset.contains(char::is_whitespace) {
            return None;
        }

        let len = 2 + charset.len() + 1 + 1 + 1 + end + 2;
        let word = Self {
            charset,
            encoding,
            text: &rest[..end],
        };
        Some((word, len))
    }

    fn decode(&self) -> Option<String> {
        let bytes = match self.encoding {
            TransferEncoding::Base64 => {
                let compact: Vec<u8> = self
                    .text
                    .bytes()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                LENIENT_BASE64.decode(compact).ok()?
            }
            TransferEncoding::Quoted => q_decode(self.text),
        };
        Some(decode_charset(self.charset, &bytes))
    }
}

/// Resolve every encoded-word in a header value.
///
/// `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` becomes `"Hola mundo"`.
/// Each word uses its own charset. Malformed words are kept verbatim and
/// bytes invalid in their charset become U+FFFD, so this never fails.
pub fn decode_encoded_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (literal, candidate) = rest.split_at(start);
        let decoded = EncodedWord::parse(candidate)
            .and_then(|(word, len)| word.decode().map(|text| (text, len)));

        match decoded {
            Some((text, len)) => {
                // Whitespace between two adjacent words is not part of the text.
                if !(after_word && literal.trim().is_empty()) {
                    out.push_str(literal);
                }
                out.push_str(&text);
                rest = &candidate[len..];
                after_word = true;
            }
            None => {
                out.push_str(literal);
                out.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Q encoding: `_` is a space, `=XX` a hex byte.
fn q_decode(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                if let Some(byte) = bytes.get(i + 1..i + 3).and_then(hex_byte) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(b'=');
            }
            other => out.push(other),
        }
        i += 1;
    }
    out
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    let hi = char::from(pair[0]).to_digit(16)?;
    let lo = char::from(pair[1]).to_digit(16)?;
    u8::try_from(hi * 16 + lo).ok()
}

/// Decode `bytes` in the named charset, or as lossy UTF-8 if the label is
/// unknown. RFC 2231 language suffixes (`utf-8*en`) are ignored.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let label = charset.split('*').next().unwrap_or(charset).trim();
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => encoding
            .decode_without_bom_handling(bytes)
            .0
            .into_owned(),
        None => {
            debug!(charset = label, "Unknown charset, decoding as UTF-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
