// # Console Feed
//
// TCP adapter streaming the notification bus to remote monitors.
//
// Each connected client gets its own bus subscription and receives every
// decoded message as one compact JSON object per line:
//
// ```text
// {"facility":"auth","severity":"critical","timestamp":"2024-10-11T22:14:15","hostname":"mymachine","text":"su: failure"}
// ```
//
// The feed is write-only; anything a client sends is ignored. A client that
// disconnects or cannot keep up only affects its own subscription.

use std::net::SocketAddr;
use std::sync::Arc;
use syslog_core::{NotificationBus, Subscription};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Accept monitor connections until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    bus: Arc<NotificationBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Console client connected: {}", peer);
                    let subscription = bus.subscribe();
                    tokio::spawn(feed_client(
                        stream,
                        peer,
                        subscription,
                        Arc::clone(&bus),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!("Console accept failed: {}", e),
            },

            _ = shutdown.changed() => {
                debug!("Console feed shutting down");
                break;
            }
        }
    }
}

async fn feed_client(
    stream: TcpStream,
    peer: SocketAddr,
    subscription: Subscription,
    bus: Arc<NotificationBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = subscription.id();
    let mut messages = subscription.into_stream();
    let mut writer = BufWriter::new(stream);

    loop {
        tokio::select! {
            next = messages.next() => {
                let Some(message) = next else { break };

                let mut line = match serde_json::to_vec(&*message) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to encode message for console: {}", e);
                        continue;
                    }
                };
                line.push(b'\n');

                if let Err(e) = write_line(&mut writer, &line).await {
                    debug!("Console client {} went away: {}", peer, e);
                    break;
                }
            }

            _ = shutdown.changed() => break,
        }
    }

    bus.unsubscribe(id);
    info!("Console client disconnected: {}", peer);
}

async fn write_line(writer: &mut BufWriter<TcpStream>, line: &[u8]) -> std::io::Result<()> {
    writer.write_all(line).await?;
    writer.flush().await
}
