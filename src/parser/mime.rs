//! MIME body extraction.

use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::debug;

use crate::model::ContentType;

/// Maximum nesting depth for multipart descent (to bound work on adversarial input).
const MAX_DEPTH: usize = 10;

/// Body text used when a single-part payload cannot be decoded.
pub const UNDECODABLE_BODY: &str = "Could not decode email content";

/// Extracted body of a message, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub text: String,
    pub content_type: ContentType,
}

impl Body {
    fn undecodable() -> Self {
        Self {
            text: UNDECODABLE_BODY.to_string(),
            content_type: ContentType::Plain,
        }
    }
}

/// Extract the body of a complete raw message (headers + body).
///
/// - multipart: every `text/plain` leaf, concatenated in document order
///   (empty if there is none), tagged `Plain`;
/// - single part: the decoded payload, tagged from its MIME type, or
///   [`UNDECODABLE_BODY`] if the payload cannot be turned into text.
///
/// Never fails.
pub fn extract_body(raw_message: &[u8]) -> Body {
    let parser = MessageParser::default();
    let Some(msg) = parser.parse(raw_message) else {
        debug!("mail-parser rejected message, using placeholder body");
        return Body::undecodable();
    };

    let Some(root) = msg.parts.first() else {
        return Body::undecodable();
    };

    match &root.body {
        PartType::Multipart(_) => Body {
            text: collect_plain_text(&msg),
            content_type: ContentType::Plain,
        },
        _ => single_part_body(root),
    }
}

/// Decode a non-multipart root part.
fn single_part_body(part: &MessagePart<'_>) -> Body {
    if part.is_encoding_problem {
        debug!("Transfer encoding problem in single-part body");
        return Body::undecodable();
    }

    let content_type = ContentType::from_mime(&mime_type(part));

    let text = match &part.body {
        PartType::Text(text) | PartType::Html(text) => text.to_string(),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => return Body::undecodable(),
            }
        }
        _ => return Body::undecodable(),
    };

    Body { text, content_type }
}

/// Walk the part tree with an explicit stack and concatenate all `text/plain`
/// leaves, including those of attached messages (`message/rfc822`). Parts
/// deeper than [`MAX_DEPTH`] are ignored.
fn collect_plain_text(msg: &Message<'_>) -> String {
    let mut text = String::new();
    // (message owning the part, part id, depth)
    let mut stack = vec![(msg, 0, 0)];

    while let Some((owner, part_id, depth)) = stack.pop() {
        let Some(part) = owner.parts.get(part_id) else {
            continue;
        };

        match &part.body {
            PartType::Multipart(_) | PartType::Message(_) if depth >= MAX_DEPTH => {
                debug!(depth, "MIME nesting too deep, skipping subtree");
            }
            PartType::Multipart(children) => {
                // Reverse so that the first child is popped first.
                for &child in children.iter().rev() {
                    stack.push((owner, child as usize, depth + 1));
                }
            }
            PartType::Message(attached) => stack.push((attached, 0, depth + 1)),
            PartType::Text(body) if is_plain_text(part) => text.push_str(body),
            _ => {}
        }
    }

    text
}

fn is_plain_text(part: &MessagePart<'_>) -> bool {
    match part.content_type() {
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct
                    .subtype()
                    .map(|sub| sub.eq_ignore_ascii_case("plain"))
                    .unwrap_or(true)
        }
        // RFC 2045: no Content-Type means text/plain
        None => true,
    }
}

/// `type/subtype` of a part, defaulting to `text/plain`.
fn mime_type(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct: &mail_parser::ContentType| {
            let main = ct.ctype();
            match ct.subtype() {
                Some(sub) => format!("{main}/{sub}"),
                None => main.to_string(),
            }
        })
        .unwrap_or_else(|| "text/plain".to_string())
}
