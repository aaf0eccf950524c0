use anyhow::Result;
use log::debug;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::{error::Error, request::ParsedRequest, tcp, url::Target};

/// Headers sent to every origin, after the synthesized Host one.
pub(crate) const INJECTED_HEADERS: &[&str] = &[
    "User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:56.0) Gecko/20100101 Firefox/56.0\r\n",
    "Connection: close\r\n",
    "Proxy-Connection: close\r\n",
];

/// Open a connection to the origin server of a request.
pub(crate) async fn connect(target: &Target<'_>) -> Result<TcpStream> {
    if target.host.is_empty() {
        return Err(Error::MalformedRequest("empty host".to_string()).into());
    }
    let port = target
        .port
        .parse::<u16>()
        .map_err(|_| Error::MalformedRequest(format!("invalid port '{}'", target.port)))?;

    let conn = TcpStream::connect((target.host, port))
        .await
        .map_err(|source| Error::OriginUnreachable {
            target: format!("{}:{}", target.host, target.port),
            source,
        })?;
    debug!("Connected to origin at {}", conn.peer_addr()?);

    tcp::set_keepalive(&conn)?;
    Ok(conn)
}

/// Build the request sent to the origin: request line, Host, injected
/// headers, relayed client headers and the blank line, in that order.
pub(crate) fn build_request(request: &ParsedRequest) -> Vec<u8> {
    let target = request.target();

    let mut out = format!("GET {} HTTP/1.0\r\nHost: {}\r\n", target.resource(), target.host).into_bytes();
    INJECTED_HEADERS
        .iter()
        .for_each(|hdr| out.extend_from_slice(hdr.as_bytes()));
    request
        .headers
        .iter()
        .for_each(|hdr| out.extend_from_slice(hdr));
    out.extend_from_slice(b"\r\n");

    out
}

/// Send a request to an origin.
pub(crate) async fn send_request<W>(origin: &mut W, request: &ParsedRequest) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    origin.write_all(&build_request(request)).await?;
    origin.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::reader::LineReader;

    async fn parse(raw: &[u8]) -> ParsedRequest {
        crate::request::read_request(&mut LineReader::new(raw))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn request() {
        let req = parse(
            b"GET http://example.net:8080/index.html HTTP/1.1\r\nHost: example.net:8080\r\n\
              Accept: */*\r\nConnection: keep-alive\r\nX-Foo: bar\r\n\r\n",
        )
        .await;

        let mut out = Vec::new();
        send_request(&mut out, &req).await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "GET /index.html HTTP/1.0\r\n\
             Host: example.net\r\n\
             User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:56.0) Gecko/20100101 Firefox/56.0\r\n\
             Connection: close\r\n\
             Proxy-Connection: close\r\n\
             Accept: */*\r\n\
             X-Foo: bar\r\n\
             \r\n"
        );
    }

    #[tokio::test]
    async fn empty_path() {
        for raw in [
            &b"GET http://example.net HTTP/1.0\r\n\r\n"[..],
            b"GET http://example.net/ HTTP/1.0\r\n\r\n",
            b"GET http://example.net:80 HTTP/1.0\r\n\r\n",
        ] {
            let out = build_request(&parse(raw).await);
            assert!(out.starts_with(b"GET / HTTP/1.0\r\nHost: example.net\r\n"));
        }
    }

    #[tokio::test]
    async fn connect_errors() {
        let e = connect(&Target::from("example.net:http/")).await.unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::MalformedRequest(_))));

        let e = connect(&Target::from(":8080/")).await.unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::MalformedRequest(_))));

        // Get a free port, then close it so the connection is refused.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("127.0.0.1:{port}/");
        let e = connect(&Target::from(&url)).await.unwrap_err();
        match e.downcast_ref::<Error>() {
            Some(Error::OriginUnreachable { target, source }) => {
                assert_eq!(target, &format!("127.0.0.1:{port}"));
                assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused);
            }
            x => panic!("Unexpected error {x:?}"),
        }
    }
}
