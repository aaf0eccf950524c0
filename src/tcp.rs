use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener},
    os::fd::AsFd,
    time::Duration,
};

use anyhow::{Result, anyhow};
use log::{error, info, warn};

use crate::{
    RUNTIME,
    context::{ReqContext, with_req_context},
    proxy, runtime,
};

/// Bind a TCP listener on `bind`.
pub(crate) fn listen(bind: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(bind).map_err(|e| anyhow!("Could not listen on {bind}: {e}"))?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections on `listener` forever, handling each of them in its own
/// task. Only returns if the runtime could not be started.
pub(crate) fn serve(listener: TcpListener) -> Result<()> {
    let runtime = runtime!()?;

    // Do not return an error starting from here, this would close the whole
    // listener.

    for stream in listener.incoming() {
        // Do not fail on stream errors.
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                error!("Connection error: {e}");
                continue;
            }
        };

        // Addresses are only used for logging, do not drop the connection if
        // they can't be retrieved.
        let local = match stream.local_addr() {
            Ok(local) => local,
            // Even in this small window the client could close the connection.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => continue,
            Err(e) => {
                warn!("Could not get local address: {e}");
                unspecified()
            }
        };
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => continue,
            Err(e) => {
                warn!("Could not get peer address: {e}");
                unspecified()
            }
        };
        info!("Accepted connection from {peer}");

        // Fire and forget, the worker owns the connection from now on.
        runtime.spawn(with_req_context(ReqContext::from(local, peer), async move {
            if let Err(e) = proxy::handle_stream(stream).await {
                error!("{e}");
            }
        }));
    }

    Ok(())
}

/// Enable TCP keepalive on a connection.
pub(crate) fn set_keepalive<S: AsFd>(stream: &S) -> io::Result<()> {
    let keep_alive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(60));
    socket2::SockRef::from(stream).set_tcp_keepalive(&keep_alive)
}

fn unspecified() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
}
