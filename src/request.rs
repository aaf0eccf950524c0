use std::str;

use anyhow::{Result, bail};
use tokio::io::AsyncRead;

use crate::{error::Error, reader::LineReader, url::Target};

/// Headers the proxy always sends itself; client provided versions are
/// dropped. Matched case-sensitively against the first token of the header
/// line, colon included.
pub(crate) const DENIED_HEADERS: &[&[u8]] = &[b"Host:", b"User-Agent:", b"Connection:", b"Proxy-Connection:"];

const SCHEME: &str = "http://";

/// First line of a client request.
#[derive(Debug, PartialEq)]
pub(crate) struct RequestLine<'a> {
    pub(crate) method: &'a str,
    /// URL with its scheme stripped. The protocol version following it is
    /// ignored, the origin is always spoken to in HTTP/1.0.
    pub(crate) url: &'a str,
}

impl<'a> RequestLine<'a> {
    /// Parses a request line. The method is checked before the URL so that
    /// any non-GET request is reported as such.
    pub(crate) fn parse(line: &'a str) -> Result<Self, Error> {
        let mut tokens = line.split_ascii_whitespace();

        let method = tokens
            .next()
            .ok_or_else(|| Error::MalformedRequest("empty request line".to_string()))?;
        if !method.eq_ignore_ascii_case("GET") {
            return Err(Error::UnsupportedMethod(method.to_string()));
        }

        let url = tokens
            .next()
            .ok_or_else(|| Error::MalformedRequest("no URL in request line".to_string()))?;
        let url = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::MalformedRequest(format!("URL '{url}' is not an {SCHEME} one")))?;

        Ok(Self { method, url })
    }
}

/// A client request, as read from the client stream.
#[derive(Debug)]
pub(crate) struct ParsedRequest {
    pub(crate) method: String,
    /// URL with its scheme stripped; the target is borrowed from it.
    url: String,
    /// Client headers to relay, in order and with their line terminators.
    pub(crate) headers: Vec<Vec<u8>>,
}

impl ParsedRequest {
    pub(crate) fn target(&self) -> Target<'_> {
        Target::from(&self.url)
    }
}

/// Read a full request (request line & headers) from the client. Returns
/// `None` if the client closed the connection without sending anything.
pub(crate) async fn read_request<R>(client: &mut LineReader<R>) -> Result<Option<ParsedRequest>>
where
    R: AsyncRead + Unpin,
{
    let line = match client.read_line().await? {
        Some(line) => line,
        None => return Ok(None),
    };
    let line = str::from_utf8(line)
        .map_err(|_| Error::MalformedRequest("request line is not valid UTF-8".to_string()))?;

    let request_line = RequestLine::parse(line)?;
    let method = request_line.method.to_string();
    let url = request_line.url.to_string();

    Ok(Some(ParsedRequest {
        method,
        url,
        headers: read_headers(client).await?,
    }))
}

/// Read the client headers up to the blank line, dropping the ones in
/// `DENIED_HEADERS`. The blank line itself is not part of the result.
pub(crate) async fn read_headers<R>(client: &mut LineReader<R>) -> Result<Vec<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut headers = Vec::new();
    loop {
        let line = match client.read_line().await? {
            Some(line) => line,
            None => bail!(Error::MalformedRequest(
                "client closed the connection before the end of headers".to_string()
            )),
        };
        if line == b"\r\n" {
            return Ok(headers);
        }
        if !is_denied(line) {
            headers.push(line.to_vec());
        }
    }
}

/// Returns the name of a header line, aka. its first whitespace-delimited
/// token.
fn header_name(line: &[u8]) -> &[u8] {
    line.split(|b| b.is_ascii_whitespace())
        .find(|token| !token.is_empty())
        .unwrap_or_default()
}

/// Should the header line be dropped in favor of the one the proxy injects.
pub(crate) fn is_denied(line: &[u8]) -> bool {
    let name = header_name(line);
    DENIED_HEADERS.iter().any(|denied| *denied == name)
}
