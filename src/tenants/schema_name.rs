use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Prefix prepended to every encoded tenant schema name.
pub const SCHEMA_NAME_PREFIX: &str = "_";
/// Schemas starting with this prefix are reserved by Postgres.
pub const RESERVED_SCHEMA_PREFIX: &str = "pg_";
pub const MIN_SCHEMA_NAME_LENGTH: usize = 3;
pub const MAX_SCHEMA_NAME_LENGTH: usize = 63;

const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

static SCHEMA_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid schema name regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaNameError {
    #[error("tenant id is empty")]
    EmptyTenantId,
    #[error("encoded schema name must be 3-62 characters, got {0}")]
    EncodedLength(usize),
    #[error("schema name must be 3-63 characters, got {0}")]
    Length(usize),
    #[error("schema name `{0}` contains characters outside [A-Za-z0-9_]")]
    InvalidCharacters(String),
    #[error("schema name `{0}` uses the reserved `pg_` prefix")]
    ReservedPrefix(String),
    #[error("schema name `{0}` is not a base62 tenant encoding")]
    Decoding(String),
}

/// Derives the schema name for a tenant: `_` followed by the base62 encoding of the id bytes.
pub fn encode_schema_name(tenant_id: &str) -> Result<String, SchemaNameError> {
    if tenant_id.is_empty() {
        return Err(SchemaNameError::EmptyTenantId);
    }

    let encoded = base62_encode(tenant_id.as_bytes());
    if encoded.len() < MIN_SCHEMA_NAME_LENGTH || encoded.len() > MAX_SCHEMA_NAME_LENGTH - 1 {
        return Err(SchemaNameError::EncodedLength(encoded.len()));
    }

    Ok(format!("{SCHEMA_NAME_PREFIX}{encoded}"))
}

/// Recovers the tenant id a schema name was derived from.
pub fn decode_schema_name(schema_name: &str) -> Result<String, SchemaNameError> {
    let encoded = schema_name
        .strip_prefix(SCHEMA_NAME_PREFIX)
        .unwrap_or(schema_name);
    let bytes =
        base62_decode(encoded).ok_or_else(|| SchemaNameError::Decoding(schema_name.to_string()))?;
    String::from_utf8(bytes).map_err(|_| SchemaNameError::Decoding(schema_name.to_string()))
}

pub fn validate_schema_name(schema_name: &str) -> Result<(), SchemaNameError> {
    let length = schema_name.len();
    if !(MIN_SCHEMA_NAME_LENGTH..=MAX_SCHEMA_NAME_LENGTH).contains(&length) {
        return Err(SchemaNameError::Length(length));
    }
    if !SCHEMA_NAME_PATTERN.is_match(schema_name) {
        return Err(SchemaNameError::InvalidCharacters(schema_name.to_string()));
    }
    if schema_name
        .to_ascii_lowercase()
        .starts_with(RESERVED_SCHEMA_PREFIX)
    {
        return Err(SchemaNameError::ReservedPrefix(schema_name.to_string()));
    }
    Ok(())
}

// Big-endian base conversion; leading zero bytes map to leading '0' digits.
fn base62_encode(input: &[u8]) -> String {
    let zeros = input.iter().take_while(|byte| **byte == 0).count();
    let mut digits: Vec<u8> = Vec::with_capacity(input.len() * 2);

    for &byte in &input[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 62) as u8;
            carry /= 62;
        }
        while carry > 0 {
            digits.push((carry % 62) as u8);
            carry /= 62;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('0').take(zeros));
    out.extend(
        digits
            .iter()
            .rev()
            .map(|digit| BASE62_ALPHABET[*digit as usize] as char),
    );
    out
}

fn base62_decode(input: &str) -> Option<Vec<u8>> {
    let zeros = input.bytes().take_while(|c| *c == b'0').count();
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());

    for c in input.bytes().skip(zeros) {
        let mut carry = BASE62_ALPHABET.iter().position(|a| *a == c)? as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 62;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; zeros];
    out.extend(bytes.iter().rev());
    Some(out)
}
