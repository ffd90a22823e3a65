//! Wire framing for admin daemon calls.
//!
//! A request is four NUL-terminated fields (source, method, destination,
//! argument) followed by the raw payload. A response starts with a single
//! status byte and a NUL: `0` carries the call result verbatim, `2` carries a
//! daemon exception as `<class>\0<message>\0`. Nothing in this module
//! performs I/O beyond writing into a caller-supplied sink.

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::error::AdminError;

/// Source domain sent with every request.
pub const SOURCE: &str = "dom0";

const STATUS_OK: u8 = b'0';
const STATUS_EXCEPTION: u8 = b'2';

/// Attributes of one entity, keyed by attribute name.
pub type Attributes = BTreeMap<String, String>;

/// Entity listing keyed by entity name.
pub type Listing = BTreeMap<String, Attributes>;

/// Encodes the request header.
///
/// Exactly four NUL-terminated fields are produced; a missing argument is
/// written as an empty field.
#[must_use]
pub fn encode_request(source: &str, method: &str, dest: &str, arg: Option<&str>) -> Vec<u8> {
    let fields = [source, method, dest, arg.unwrap_or_default()];
    let capacity = fields.iter().map(|field| field.len() + 1).sum();
    let mut encoded = Vec::with_capacity(capacity);
    for field in fields {
        encoded.extend_from_slice(field.as_bytes());
        encoded.push(0);
    }
    encoded
}

/// Writes a framed request and its payload into `writer`.
///
/// # Errors
///
/// Propagates any error from the writer.
pub fn write_request(
    mut writer: impl Write,
    method: &str,
    dest: &str,
    arg: Option<&str>,
    payload: &[u8],
) -> io::Result<()> {
    writer.write_all(&encode_request(SOURCE, method, dest, arg))?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Decodes a raw daemon response into the success body.
///
/// # Errors
///
/// Returns [`AdminError::Daemon`] for exception responses and
/// [`AdminError::Protocol`] when the framing is invalid.
pub fn decode_response(raw: &[u8]) -> Result<Vec<u8>, AdminError> {
    let Some(terminator) = raw.iter().position(|byte| *byte == 0) else {
        return Err(AdminError::protocol("missing status terminator"));
    };
    let (status, rest) = raw.split_at(terminator);
    let body = rest.get(1..).unwrap_or_default();
    match status {
        [STATUS_OK] => Ok(body.to_vec()),
        [STATUS_EXCEPTION] => Err(decode_exception(body)),
        other => Err(AdminError::protocol(format!(
            "invalid status field {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn decode_exception(body: &[u8]) -> AdminError {
    let mut fields = body.split(|byte| *byte == 0);
    let class = fields.next().unwrap_or_default();
    let Some(message) = fields.next() else {
        return AdminError::protocol("exception response without message");
    };
    if class.is_empty() {
        return AdminError::protocol("exception response without class name");
    }
    AdminError::daemon(
        String::from_utf8_lossy(class),
        String::from_utf8_lossy(message),
    )
}

/// Interprets a response body as text.
///
/// # Errors
///
/// Returns [`AdminError::Protocol`] when the body is not valid UTF-8.
pub fn body_text<'a>(body: &'a [u8], what: &str) -> Result<&'a str, AdminError> {
    std::str::from_utf8(body)
        .map_err(|error| AdminError::protocol(format!("{what} is not valid text: {error}")))
}

/// Parses `NAME KEY=VALUE ...` lines into a listing.
///
/// Blank lines are skipped and a missing trailing newline is tolerated. A
/// later record for the same name replaces an earlier one.
///
/// # Errors
///
/// Returns [`AdminError::Protocol`] when an attribute lacks `=` or the body is
/// not text.
pub fn parse_entity_listing(body: &[u8]) -> Result<Listing, AdminError> {
    let text = body_text(body, "entity listing")?;
    let mut listing = Listing::new();
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
        let attributes = rest
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(|token| split_assignment(token, "entity listing"))
            .collect::<Result<Attributes, _>>()?;
        listing.insert(name.to_owned(), attributes);
    }
    Ok(listing)
}

/// Parses `NAME WORD WORD ...` lines, such as the pool driver listing.
///
/// # Errors
///
/// Returns [`AdminError::Protocol`] when the body is not text.
pub fn parse_word_listing(body: &[u8]) -> Result<BTreeMap<String, Vec<String>>, AdminError> {
    let text = body_text(body, "word listing")?;
    let mut listing = BTreeMap::new();
    for line in text.lines() {
        let mut words = line.split(' ').filter(|word| !word.is_empty());
        let Some(name) = words.next() else {
            continue;
        };
        listing.insert(name.to_owned(), words.map(str::to_owned).collect());
    }
    Ok(listing)
}

/// Parses one `KEY=VALUE` pair per line.
///
/// Values may contain spaces and further `=` characters.
///
/// # Errors
///
/// Returns [`AdminError::Protocol`] when a line lacks `=` or the body is not
/// text.
pub fn parse_key_value_lines(body: &[u8]) -> Result<Attributes, AdminError> {
    let text = body_text(body, "key=value listing")?;
    text.lines()
        .filter(|line| !line.is_empty())
        .map(|line| split_assignment(line, "key=value listing"))
        .collect()
}

/// Parses one name per line, skipping blank lines.
///
/// # Errors
///
/// Returns [`AdminError::Protocol`] when the body is not text.
pub fn parse_name_lines(body: &[u8]) -> Result<Vec<String>, AdminError> {
    let text = body_text(body, "name listing")?;
    Ok(text
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

fn split_assignment(token: &str, what: &str) -> Result<(String, String), AdminError> {
    token
        .split_once('=')
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| AdminError::protocol(format!("{what} entry '{token}' lacks '='")))
}
