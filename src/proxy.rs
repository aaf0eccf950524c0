use anyhow::Result;
use log::{debug, info};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::{context, error::Error, origin, reader::LineReader, request, response, tcp};

/// Handle a client connection: read its request, forward it to the origin and
/// relay the response back. Both connections are closed when returning.
pub(crate) async fn handle_stream(stream: std::net::TcpStream) -> Result<()> {
    tcp::set_keepalive(&stream)?;
    stream.set_nonblocking(true)?;
    let mut client = LineReader::new(TcpStream::from_std(stream)?);

    let ret = forward(&mut client).await;

    // Report errors to the client when we still can.
    if let Err(e) = &ret {
        if let Some(e) = e.downcast_ref::<Error>() {
            let page = e.page();
            debug!("Sending a {} error page", page.code);
            if let Err(e) = page.send(client.get_mut()).await {
                debug!("Could not send the error page: {e}");
            }
        }
    }

    // Not much we can do if the client is already gone.
    let _ = client.get_mut().shutdown().await;
    ret
}

/// Request → origin → response pipeline of a single connection.
async fn forward<S>(client: &mut LineReader<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match request::read_request(client).await? {
        Some(request) => request,
        None => {
            debug!("Client closed the connection without sending a request");
            return Ok(());
        }
    };

    let target = request.target();
    context::set_target(target.host, target.port)?;
    info!("{} {}", request.method, target.resource());

    let mut origin = origin::connect(&target).await?;
    origin::send_request(&mut origin, &request).await?;

    let relayed = response::relay(LineReader::new(origin), client.get_mut()).await?;
    debug!("Response relayed ({relayed} bytes after the status line)");

    Ok(())
}
