// Time-based one-time passwords (RFC 6238) and backup codes.
//
// Secrets are 20 random bytes shown to the user as unpadded RFC 4648 base32,
// the form authenticator apps expect in an otpauth:// URI.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;
use thiserror::Error;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

pub const SECRET_BYTES: usize = 20;
pub const CODE_DIGITS: u32 = 6;
pub const STEP_SECONDS: u64 = 30;
pub const DEFAULT_BACKUP_CODES: usize = 10;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Backup-code characters, without 0/O and 1/I.
const BACKUP_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TwoFactorError {
    #[error("secret is not valid base32")]
    InvalidSecret,

    #[error("code must be 6 digits")]
    MalformedCode,

    #[error("provisioning uri: {0}")]
    Uri(#[from] url::ParseError),

    #[error("provisioning uri has no path")]
    OpaqueUri,
}

// ---------------------------------------------------------------------------
// Base32
// ---------------------------------------------------------------------------

/// RFC 4648 base32 without padding.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Decodes base32, ignoring case, spaces, dashes and trailing padding.
pub fn base32_decode(text: &str) -> Result<Vec<u8>, TwoFactorError> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in text.trim_end_matches('=').chars() {
        if c == ' ' || c == '-' {
            continue;
        }
        let upper = c.to_ascii_uppercase() as u8;
        let value = BASE32_ALPHABET
            .iter()
            .position(|&a| a == upper)
            .ok_or(TwoFactorError::InvalidSecret)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    if out.is_empty() {
        return Err(TwoFactorError::InvalidSecret);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    base32_encode(&bytes)
}

/// `count` codes formatted `XXXX-XXXX`.
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let chars: String = (0..8)
                .map(|_| BACKUP_ALPHABET[rng.gen_range(0..BACKUP_ALPHABET.len())] as char)
                .collect();
            format!("{}-{}", &chars[..4], &chars[4..])
        })
        .collect()
}

/// Key URI understood by authenticator apps. The `issuer:account` label is
/// a single path segment, so a `/` in either part stays escaped.
pub fn provisioning_uri(
    secret: &str,
    account: &str,
    issuer: &str,
) -> Result<String, TwoFactorError> {
    let mut url = Url::parse("otpauth://totp/")?;
    url.path_segments_mut()
        .map_err(|_| TwoFactorError::OpaqueUri)?
        .clear()
        .push(&format!("{issuer}:{account}"));
    url.query_pairs_mut()
        .append_pair("secret", secret)
        .append_pair("issuer", issuer)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", &CODE_DIGITS.to_string())
        .append_pair("period", &STEP_SECONDS.to_string());
    Ok(url.into())
}

/// Everything the user needs to finish enrolling.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Enrollment {
    pub secret: String,
    pub uri: String,
    pub backup_codes: Vec<String>,
}

pub fn enroll(account: &str, issuer: &str) -> Result<Enrollment, TwoFactorError> {
    let secret = generate_secret();
    Ok(Enrollment {
        uri: provisioning_uri(&secret, account, issuer)?,
        backup_codes: generate_backup_codes(DEFAULT_BACKUP_CODES),
        secret,
    })
}

// ---------------------------------------------------------------------------
// Codes
// ---------------------------------------------------------------------------

fn hotp(key: &[u8], counter: u64) -> Result<u32, TwoFactorError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|_| TwoFactorError::InvalidSecret)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    Ok(binary % 10u32.pow(CODE_DIGITS))
}

/// The 6-digit code for `unix_time`.
pub fn totp(secret: &str, unix_time: u64) -> Result<String, TwoFactorError> {
    let key = base32_decode(secret)?;
    let code = hotp(&key, unix_time / STEP_SECONDS)?;
    Ok(format!("{code:06}"))
}

/// Accepts the code for the current step or one step either side, to
/// tolerate clock drift. Spaces inside the code are ignored.
pub fn verify(secret: &str, code: &str, unix_time: u64) -> Result<bool, TwoFactorError> {
    let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if code.len() != CODE_DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(TwoFactorError::MalformedCode);
    }
    let wanted: u32 = code.parse().map_err(|_| TwoFactorError::MalformedCode)?;

    let key = base32_decode(secret)?;
    let step = unix_time / STEP_SECONDS;
    for counter in step.saturating_sub(1)..=step + 1 {
        if hotp(&key, counter)? == wanted {
            return Ok(true);
        }
    }
    Ok(false)
}
