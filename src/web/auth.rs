//! HTTP basic authentication.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Realm announced in `WWW-Authenticate`.
pub const REALM: &str = "mailblog";

/// Expected credentials, kept only as a SHA-256 digest of `user:password`.
#[derive(Clone)]
pub struct BasicAuth {
    digest: [u8; 32],
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            digest: digest(format!("{username}:{password}").as_bytes()),
        }
    }

    /// Check an `Authorization` header value.
    ///
    /// Missing, malformed and wrong credentials all yield
    /// [`Error::AuthChallenge`].
    pub fn verify(&self, header: Option<&str>) -> Result<()> {
        let presented = header
            .and_then(decode_basic)
            .ok_or(Error::AuthChallenge)?;
        if digest(&presented) == self.digest {
            Ok(())
        } else {
            Err(Error::AuthChallenge)
        }
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BasicAuth(..)")
    }
}

/// `WWW-Authenticate` value for 401 responses.
pub fn challenge() -> String {
    format!("Basic realm=\"{REALM}\", charset=\"UTF-8\"")
}

/// The decoded `user:password` bytes of a `Basic` header.
fn decode_basic(header: &str) -> Option<Vec<u8>> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(token.trim()).ok()?;
    decoded.contains(&b':').then_some(decoded)
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}
