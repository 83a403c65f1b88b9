use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;
use tracing::trace;

use super::{Event, ProbeSession, SessionStats, Step, Transport};

async fn deadline<F, T>(limit: Duration, what: &str, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{what} timed out after {}ms", limit.as_millis()),
        )),
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "no open connection")
}

/// Runs a session to retirement, executing each step it asks for under the configured
/// deadlines. Every `https` url the session hands off is passed to `on_spawn` as soon as it
/// appears.
pub async fn drive<T, F>(mut session: ProbeSession, transport: &T, mut on_spawn: F) -> SessionStats
where
    T: Transport,
    F: FnMut(String),
{
    let timeouts = session.context().config.timeouts;
    let body_limit = session.context().config.max_body_bytes;
    let mut addrs: Vec<SocketAddr> = Vec::new();
    let mut conn: Option<T::Conn> = None;

    let mut step = session.handle(Event::Start);
    loop {
        for url in session.take_spawned() {
            on_spawn(url);
        }
        trace!("{}: {:?}", session.url(), step);

        let event = match step {
            Step::Resolve { host, port } => {
                conn = None;
                match deadline(timeouts.connect, "resolve", transport.resolve(&host, port)).await {
                    Ok(found) => {
                        addrs = found;
                        Event::Resolved
                    }
                    Err(e) => Event::Failed(e),
                }
            }
            Step::Connect => {
                conn = None;
                match deadline(timeouts.connect, "connect", transport.connect(&addrs)).await {
                    Ok(c) => {
                        conn = Some(c);
                        Event::Connected
                    }
                    Err(e) => Event::Failed(e),
                }
            }
            Step::Handshake { domain } => match conn.take() {
                Some(c) => {
                    let handshake = transport.handshake(c, &domain);
                    match deadline(timeouts.connect, "handshake", handshake).await {
                        Ok(c) => {
                            conn = Some(c);
                            Event::Handshaken
                        }
                        Err(e) => Event::Failed(e),
                    }
                }
                None => Event::Failed(not_connected()),
            },
            Step::Send(bytes) => {
                session.context().throttle().await;
                match conn.as_mut() {
                    Some(c) => {
                        match deadline(timeouts.connect, "send", transport.send(c, &bytes)).await {
                            Ok(()) => Event::Sent,
                            Err(e) => Event::Failed(e),
                        }
                    }
                    None => Event::Failed(not_connected()),
                }
            }
            Step::Receive => match conn.as_mut() {
                Some(c) => {
                    let receive = transport.receive(c, body_limit);
                    match deadline(timeouts.receive, "receive", receive).await {
                        Ok(response) => Event::Received(response),
                        Err(e) => Event::Failed(e),
                    }
                }
                None => Event::Failed(not_connected()),
            },
            Step::Retire => {
                if let Some(mut c) = conn.take() {
                    let _ = deadline(timeouts.connect, "shutdown", transport.shutdown(&mut c)).await;
                }
                break;
            }
        };
        step = session.handle(event);
    }
    session.stats()
}
