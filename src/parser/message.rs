//! Raw message bytes → normalized [`Email`].

use crate::error::{Error, Result};
use crate::model::Email;
use crate::parser::date::parse_date;
use crate::parser::header::Headers;
use crate::parser::mime;

/// Decode one fetched message.
///
/// Header and body problems are recovered locally (lossy charset decoding,
/// placeholder body), so the only failure is input that contains no message
/// at all.
pub fn decode_message(uid: &str, raw: &[u8]) -> Result<Email> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::Decode {
            uid: uid.to_string(),
            reason: "empty message".to_string(),
        });
    }

    let headers = Headers::parse(raw);
    let date_raw = headers.decoded("date");
    let date_parsed = parse_date(&date_raw);
    let body = mime::extract_body(raw);

    Ok(Email {
        uid: uid.to_string(),
        subject: headers.decoded("subject"),
        from: headers.decoded("from"),
        date_raw,
        date_parsed,
        content: body.text,
        content_type: body.content_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentType;

    #[test]
    fn test_decode_simple_message() {
        let raw = b"From: =?UTF-8?B?Sm9zw6k=?= <jose@example.com>\r\n\
Subject: =?ISO-8859-1?Q?R=E9sum=E9?=\r\n\
Date: Tue, 02 Jan 2024 08:00:00 +0000\r\n\
\r\n\
Hello\r\n";
        let email = decode_message("7", raw).unwrap();
        assert_eq!(email.uid, "7");
        assert_eq!(email.from, "José <jose@example.com>");
        assert_eq!(email.subject, "Résumé");
        assert_eq!(email.date_raw, "Tue, 02 Jan 2024 08:00:00 +0000");
        assert!(email.date_parsed.is_some());
        assert!(email.content.contains("Hello"));
        assert_eq!(email.content_type, ContentType::Plain);
    }

    #[test]
    fn test_decode_bad_date_is_not_fatal() {
        let raw = b"Subject: x\nDate: yesterday-ish\n\nbody\n";
        let email = decode_message("1", raw).unwrap();
        assert_eq!(email.date_raw, "yesterday-ish");
        assert!(email.date_parsed.is_none());
    }

    #[test]
    fn test_decode_missing_headers_are_empty() {
        let raw = b"X-Other: 1\n\nbody\n";
        let email = decode_message("1", raw).unwrap();
        assert_eq!(email.subject, "");
        assert_eq!(email.from, "");
        assert_eq!(email.date_raw, "");
    }

    #[test]
    fn test_decode_empty_input_fails() {
        let err = decode_message("9", b" \r\n").unwrap_err();
        assert!(matches!(err, Error::Decode { ref uid, .. } if uid == "9"));
    }
}
