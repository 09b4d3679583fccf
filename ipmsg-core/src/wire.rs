//! Framing: ASCII header lines + body, terminated by a single NUL byte.
//!
//! A request frame is
//!
//! ```text
//! ipmsg
//! from:<ip>
//! len:<decimal length>
//! date:<unix seconds>
//! [alias:<name>]
//! msg:<body>
//! ```
//!
//! followed by one NUL. Field order is fixed; the `alias:` line is optional
//! and sits immediately before `msg:`. The body is everything after the
//! first `"\nmsg:"` up to the terminator and may contain any byte but NUL.

use crate::protocol::{Message, Response, MAGIC};

/// Terminator closing every request frame.
pub const FRAME_END: u8 = 0;

const BODY_MARKER: &str = "\nmsg:";

/// Error encoding a message into a frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("message body contains a NUL byte")]
    NulInBody,
}

/// Error decoding a frame or a response.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("missing NUL terminator")]
    MissingTerminator,
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("missing msg field")]
    MissingBody,
    #[error("missing ipmsg magic")]
    BadMagic,
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("malformed {0} field")]
    BadField(&'static str),
    #[error("unexpected header line")]
    UnexpectedHeader,
}

/// Render `msg` in the fixed field order and append the NUL terminator.
pub fn encode_request(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    if msg.body.contains('\0') {
        return Err(EncodeError::NulInBody);
    }
    let mut out = String::with_capacity(64 + msg.body.len());
    out.push_str(MAGIC);
    out.push_str(&format!("\nfrom:{}\nlen:{}\ndate:{}\n", msg.from, msg.len, msg.date));
    if !msg.alias.is_empty() {
        out.push_str("alias:");
        out.push_str(&msg.alias);
        out.push('\n');
    }
    out.push_str("msg:");
    out.push_str(&msg.body);
    let mut bytes = out.into_bytes();
    bytes.push(FRAME_END);
    Ok(bytes)
}

/// Decode one inbound frame. `bytes` must contain the NUL terminator;
/// anything after it is ignored.
pub fn decode_request(bytes: &[u8]) -> Result<Message, ParseError> {
    let end = bytes
        .iter()
        .position(|&b| b == FRAME_END)
        .ok_or(ParseError::MissingTerminator)?;
    let frame = std::str::from_utf8(&bytes[..end]).map_err(|_| ParseError::NotUtf8)?;

    // The header never contains "\nmsg:", so the first occurrence is the
    // real marker even when the body embeds one.
    let marker = frame.find(BODY_MARKER).ok_or(ParseError::MissingBody)?;
    let header = &frame[..marker];
    let body = &frame[marker + BODY_MARKER.len()..];

    let mut lines = header.lines();
    if lines.next() != Some(MAGIC) {
        return Err(ParseError::BadMagic);
    }
    let from = field(lines.next(), "from")?;
    let len = field(lines.next(), "len")?
        .parse::<u64>()
        .map_err(|_| ParseError::BadField("len"))?;
    let date = field(lines.next(), "date")?
        .parse::<i64>()
        .map_err(|_| ParseError::BadField("date"))?;
    let alias = match lines.next() {
        Some(line) => line
            .strip_prefix("alias:")
            .ok_or(ParseError::UnexpectedHeader)?
            .to_string(),
        None => String::new(),
    };
    if lines.next().is_some() {
        return Err(ParseError::UnexpectedHeader);
    }

    Ok(Message {
        from: from.to_string(),
        alias,
        len,
        date,
        body: body.to_string(),
    })
}

fn field<'a>(line: Option<&'a str>, name: &'static str) -> Result<&'a str, ParseError> {
    line.and_then(|l| l.strip_prefix(name))
        .and_then(|l| l.strip_prefix(':'))
        .ok_or(ParseError::MissingField(name))
}

/// Render a response. No terminator; the connection close ends it.
pub fn encode_response(resp: &Response) -> Vec<u8> {
    let mut out = format!("{}\nsuccess:{}\n", MAGIC, resp.success);
    if !resp.success {
        if let Some(detail) = &resp.error {
            out.push_str("error:");
            out.push_str(detail);
        }
    }
    out.into_bytes()
}

/// Decode a full response as read until EOF.
pub fn decode_response(bytes: &[u8]) -> Result<Response, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
    let rest = text
        .strip_prefix(MAGIC)
        .and_then(|r| r.strip_prefix('\n'))
        .ok_or(ParseError::BadMagic)?;
    let (line, rest) = rest.split_once('\n').ok_or(ParseError::MissingField("success"))?;
    let success = line
        .strip_prefix("success:")
        .ok_or(ParseError::MissingField("success"))?
        .parse::<bool>()
        .map_err(|_| ParseError::BadField("success"))?;
    let error = if rest.is_empty() {
        None
    } else {
        Some(
            rest.strip_prefix("error:")
                .ok_or(ParseError::MissingField("error"))?
                .to_string(),
        )
    };
    Ok(Response { success, error })
}
