//! Request payload decoding.
//!
//! Decodes the request body by Content-Type into a [`Payload`], registered
//! as the `payload` binding. The decode table:
//!
//! - no Content-Type header: `None`
//! - `application/octet-stream`, `audio/*`, `video/*`: raw bytes tagged
//!   with the media type (parameters stripped)
//! - `multipart/form-data`: exactly one uploaded file, else 400
//! - `application/json`: strict decode, 400 on bad JSON
//! - anything else: lenient JSON attempt, falling back to raw bytes under
//!   the declared content type

use crate::endpoint::RequestScope;
use crate::error::Error;
use crate::producer::Producer;
use crate::registry::Registry;

/// Binding name for the decoded request payload.
pub const PAYLOAD_BINDING: &str = "payload";

/// A decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Decoded JSON data
    Json(serde_json::Value),
    /// Raw bytes under a known media type
    Binary {
        content_type: String,
        data: Vec<u8>,
    },
    /// A single uploaded file from a multipart form
    File { filename: String, data: Vec<u8> },
}

/// Register the `payload` binding: resolves to `Option<Payload>`.
pub fn register(registry: &Registry) -> Result<(), Error> {
    registry.register(
        PAYLOAD_BINDING,
        Producer::dynamic_bound(|instance| {
            let scope = instance.downcast::<RequestScope>().ok_or_else(|| {
                Error::Internal("payload binding requires a request scope".into())
            })?;
            decode(
                scope.request.header("Content-Type"),
                &scope.request.body,
            )
        }),
    )?;
    Ok(())
}

/// Decode a request body according to its declared content type.
pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Option<Payload>, Error> {
    let Some(content_type) = content_type else {
        return Ok(None);
    };
    let media_type = content_type.split(';').next().unwrap_or(content_type).trim();

    if media_type == "application/octet-stream" {
        Ok(Some(Payload::Binary {
            content_type: "application/octet-stream".to_string(),
            data: body.to_vec(),
        }))
    } else if media_type.starts_with("audio/") || media_type.starts_with("video/") {
        Ok(Some(Payload::Binary {
            content_type: media_type.to_string(),
            data: body.to_vec(),
        }))
    } else if media_type == "multipart/form-data" {
        decode_multipart(content_type, body).map(Some)
    } else if media_type == "application/json" {
        decode_json(body, true, content_type)
    } else {
        // Unknown type: just try to decode JSON.
        decode_json(body, false, content_type)
    }
}

fn decode_json(
    body: &[u8],
    strict: bool,
    content_type: &str,
) -> Result<Option<Payload>, Error> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(data) => Ok(Some(Payload::Json(data))),
        Err(_) if strict => Err(Error::BadRequest("Bad JSON submitted.".to_string())),
        Err(_) => Ok(Some(Payload::Binary {
            content_type: content_type.to_string(),
            data: body.to_vec(),
        })),
    }
}

/// Extract the single file part of a multipart/form-data body. Zero or
/// more than one file is a 400.
fn decode_multipart(content_type: &str, body: &[u8]) -> Result<Payload, Error> {
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .map(|b| b.split(';').next().unwrap_or(b).trim().trim_matches('"'))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::BadRequest("Multipart body without a boundary.".to_string()))?;

    let delimiter = format!("--{boundary}");
    let mut files = Vec::new();

    for part in split_bytes(body, delimiter.as_bytes()) {
        // The terminator after the last part, and the preamble before the
        // first, are not parts.
        if part.starts_with(b"--") || part.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        let part = strip_leading_crlf(part);
        let Some(split_at) = find_bytes(part, b"\r\n\r\n") else {
            continue;
        };
        let (headers, rest) = part.split_at(split_at);
        // The CRLF before the next delimiter belongs to the framing, not
        // the file.
        let mut data = &rest[4..];
        if data.ends_with(b"\r\n") {
            data = &data[..data.len() - 2];
        }
        let headers = String::from_utf8_lossy(headers);

        if let Some(filename) = headers
            .lines()
            .find(|line| line.to_ascii_lowercase().starts_with("content-disposition"))
            .and_then(|line| line.split("filename=\"").nth(1))
            .and_then(|rest| rest.split('"').next())
        {
            files.push((filename.to_string(), data.to_vec()));
        }
    }

    match files.len() {
        1 => {
            let (filename, data) = files.remove(0);
            Ok(Payload::File { filename, data })
        }
        n => Err(Error::BadRequest(format!(
            "Multipart upload must contain exactly one file, got {n}."
        ))),
    }
}

fn split_bytes<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(found) = find_bytes(&haystack[start..], needle) {
        parts.push(&haystack[start..start + found]);
        start += found + needle.len();
    }
    parts.push(&haystack[start..]);
    parts
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn strip_leading_crlf(mut part: &[u8]) -> &[u8] {
    while part.starts_with(b"\r\n") {
        part = &part[2..];
    }
    part
}
