use std::{io, str};

use anyhow::Result;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{error::Error, reader::LineReader};

/// Size of the reads performed on the origin when relaying the body.
const RELAY_CHUNK: usize = 8192;

/// Rewrite an origin status line to an HTTP/1.0 one, keeping the status code
/// and description as-is.
pub(crate) fn rewrite_status_line(line: &[u8]) -> Result<String, Error> {
    let line = str::from_utf8(line).map_err(|_| Error::MalformedResponse)?;
    let line = line.trim_end_matches(['\r', '\n']);

    let (version, rest) = line
        .split_once(|c: char| c.is_ascii_whitespace())
        .ok_or(Error::MalformedResponse)?;
    if !version.starts_with("HTTP/") {
        return Err(Error::MalformedResponse);
    }

    let rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let (code, description) = match rest.split_once(|c: char| c.is_ascii_whitespace()) {
        Some((code, description)) => (
            code,
            description.trim_start_matches(|c: char| c.is_ascii_whitespace()),
        ),
        None => (rest, ""),
    };
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedResponse);
    }

    Ok(match description {
        "" => format!("HTTP/1.0 {code}\r\n"),
        _ => format!("HTTP/1.0 {code} {description}\r\n"),
    })
}

/// Relay an origin response to the client: the rewritten status line first,
/// then everything else untouched until the origin closes the connection.
///
/// Returns the number of bytes relayed after the status line. Nothing is
/// written to the client if the status line cannot be read.
pub(crate) async fn relay<R, W>(mut origin: LineReader<R>, client: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let status = match origin.read_line().await {
        Ok(Some(line)) => rewrite_status_line(line)?,
        Ok(None) => return Err(Error::MalformedResponse.into()),
        // The client request was fine, the origin is at fault.
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::LineTooLong)) => {
            return Err(Error::MalformedResponse.into());
        }
        Err(e) => return Err(e),
    };
    client.write_all(status.as_bytes()).await?;

    let (mut origin, buffered) = origin.into_parts();
    let mut relayed = 0;
    let ret = async {
        client.write_all(&buffered).await?;
        relayed += buffered.len() as u64;

        let mut buf = vec![0; RELAY_CHUNK];
        loop {
            let read = origin.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            client.write_all(&buf[..read]).await?;
            relayed += read as u64;
        }
        client.flush().await
    }
    .await;

    match ret {
        Ok(()) => Ok(relayed),
        // Either side going away ends the relay like a regular end of stream.
        Err(e) if is_peer_reset(&e) => {
            debug!("Relay interrupted after {relayed} bytes: {e}");
            Ok(relayed)
        }
        Err(e) => Err(e.into()),
    }
}

fn is_peer_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
