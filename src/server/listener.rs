use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::server::connection::{Flow, Output, SocketIo};
use crate::server::files::FileBody;
use crate::server::{Webserver, tls};

pub async fn run(server: Arc<Webserver>) -> anyhow::Result<()> {
    let cfg = server.config();
    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.listen_addr))?;
    let acceptor = if cfg.has_tls() {
        Some(TlsAcceptor::from(tls::server_config(cfg)?))
    } else {
        None
    };
    info!(tls = acceptor.is_some(), "Listening on {}", cfg.listen_addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {}", peer);

        let server = server.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let result = match acceptor {
                Some(acceptor) => match acceptor.accept(socket).await {
                    Ok(stream) => {
                        let domain = stream
                            .get_ref()
                            .1
                            .server_name()
                            .map(str::to_string)
                            .unwrap_or_else(|| server.config().default_domain.clone());
                        drive(&server, stream, peer, &domain).await
                    }
                    Err(e) => Err(anyhow::Error::new(e).context("TLS handshake")),
                },
                None => {
                    let domain = server.config().default_domain.clone();
                    drive(&server, socket, peer, &domain).await
                }
            };
            if let Err(e) = result {
                tracing::error!("Connection error from {}: {:#}", peer, e);
            }
        });
    }
}

/// Runs one socket until either side closes it or the stream turns malformed.
pub async fn drive<S>(server: &Webserver, mut stream: S, peer: SocketAddr, domain: &str) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut conn, mut outbound) = server.accept(peer).await?;
    let socket = conn.socket();
    let read_size = server.config().limits.buffer_size;

    let result = pump(&mut conn, &mut stream, &mut outbound, domain, read_size).await;

    drop(conn);
    server.close(socket).await;
    let _ = stream.shutdown().await;
    tracing::debug!(socket = %socket, "socket closed");
    result
}

async fn pump<C, S>(
    conn: &mut C,
    stream: &mut S,
    outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    domain: &str,
    read_size: usize,
) -> anyhow::Result<()>
where
    C: SocketIo,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(read_size);
    let mut out = Vec::new();

    loop {
        buf.reserve(read_size);
        tokio::select! {
            read = stream.read_buf(&mut buf) => {
                if read? == 0 {
                    return Ok(());
                }
                let data = buf.split();
                let flow = conn.io(domain, &data, &mut out);
                write_output(stream, &mut out).await?;
                if flow? == Flow::Close {
                    return Ok(());
                }
            }
            Some(frames) = outbound.recv() => {
                stream.write_all(&frames).await?;
                stream.flush().await?;
            }
        }
    }
}

async fn write_output<S>(stream: &mut S, out: &mut Vec<Output>) -> anyhow::Result<()>
where
    S: AsyncWrite + Unpin,
{
    for output in out.drain(..) {
        match output {
            Output::Bytes(bytes) => stream.write_all(&bytes).await?,
            Output::File(body) => write_file(stream, body).await?,
        }
    }
    stream.flush().await?;
    Ok(())
}

async fn write_file<S>(stream: &mut S, body: FileBody) -> anyhow::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let (file, mut remaining, chunk_size) = body.into_parts();
    let mut file = tokio::fs::File::from_std(file);
    let mut chunk = vec![0u8; chunk_size];
    while remaining > 0 {
        let want = remaining.min(chunk_size as u64) as usize;
        file.read_exact(&mut chunk[..want])
            .await
            .context("file shrank while being served")?;
        stream.write_all(&chunk[..want]).await?;
        remaining -= want as u64;
    }
    Ok(())
}
