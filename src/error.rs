use std::io;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::reader::MAX_LINE_LEN;

/// Failures a worker can run into while serving a request.
#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Line exceeds the {} bytes limit", MAX_LINE_LEN)]
    LineTooLong,
    #[error("Method '{0}' is not implemented")]
    UnsupportedMethod(String),
    #[error("Could not connect to origin '{target}': {source}")]
    OriginUnreachable { target: String, source: io::Error },
    #[error("Malformed status line from origin")]
    MalformedResponse,
}

impl Error {
    /// Error page to send back to the client, if any.
    pub(crate) fn page(&self) -> ErrorPage<'_> {
        match self {
            Error::MalformedRequest(reason) => ErrorPage {
                code: 400,
                short: "Bad Request",
                long: "Proxy could not understand the request",
                cause: reason,
            },
            Error::LineTooLong => ErrorPage {
                code: 400,
                short: "Bad Request",
                long: "Proxy could not understand the request",
                cause: "line too long",
            },
            Error::UnsupportedMethod(method) => ErrorPage {
                code: 501,
                short: "Not Implemented",
                long: "Proxy does not implement this method",
                cause: method,
            },
            Error::OriginUnreachable { target, .. } => ErrorPage {
                code: 502,
                short: "Bad Gateway",
                long: "Proxy could not connect to the origin server",
                cause: target,
            },
            Error::MalformedResponse => ErrorPage {
                code: 502,
                short: "Bad Gateway",
                long: "Proxy received an invalid response from the origin server",
                cause: "status line",
            },
        }
    }
}

/// Minimal HTML error response.
#[derive(Debug, PartialEq)]
pub(crate) struct ErrorPage<'a> {
    /// Status code.
    pub(crate) code: u16,
    /// Reason phrase, also shown in the body.
    pub(crate) short: &'a str,
    pub(crate) long: &'a str,
    /// What triggered the error, e.g. the offending method.
    pub(crate) cause: &'a str,
}

impl ErrorPage<'_> {
    fn body(&self) -> String {
        format!(
            "<html><title>Proxy Error</title><body bgcolor=ffffff>\r\n\
             {}: {}\r\n\
             <p>{}: {}\r\n\
             <hr><em>The Proxy Web server</em>\r\n",
            self.code,
            self.short,
            self.long,
            escape_html(self.cause),
        )
    }

    /// Full response: status line, headers, blank line and body.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let body = self.body();
        format!(
            "HTTP/1.0 {} {}\r\nContent-type: text/html\r\nContent-length: {}\r\n\r\n{body}",
            self.code,
            self.short,
            body.len(),
        )
        .into_bytes()
    }

    pub(crate) async fn send<W: AsyncWrite + Unpin>(&self, out: &mut W) -> Result<()> {
        out.write_all(&self.to_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

// The cause comes from the client, do not let it inject markup.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
