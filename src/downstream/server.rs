// ABOUTME: Thread/connection-per-client HTTP server with a hard concurrent-client cap
// ABOUTME: Classifies each request and either streams the ring, replies inline, or drains on shutdown

use crate::config::{self, ServerOptions};
use crate::downstream::classify::{self, Classification, ParsedRequest};
use crate::downstream::error::ServerError;
use crate::events::{Event, EventBus};
use crate::packet::Packet;
use crate::playlist;
use crate::ring::Ring;
use crate::upstream::ClientState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::connection::Connection;

pub struct Server {
    client_max: usize,
    timeout: Duration,
    countdown: Duration,
    client_num: AtomicUsize,
    terminated: AtomicBool,
    shutdown: Notify,
    server_port: u16,
    events: Arc<EventBus>,
    upstream: Arc<ClientState>,
    ring: Arc<Ring<Packet>>,
}

impl Server {
    pub fn new(
        options: &ServerOptions,
        ring: Arc<Ring<Packet>>,
        upstream: Arc<ClientState>,
        events: Arc<EventBus>,
    ) -> (Server, String, u16) {
        let (bind_host, bind_port) = config::parse_bindings(&options.bindings);
        let server = Server {
            client_max: options.client_max,
            timeout: Duration::from_secs(options.timeout),
            countdown: Duration::from_secs(options.countdown),
            client_num: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
            shutdown: Notify::new(),
            server_port: bind_port,
            events,
            upstream,
            ring,
        };
        (server, bind_host, bind_port)
    }

    pub fn client_num(&self) -> usize {
        self.client_num.load(Ordering::Acquire)
    }

    /// Accepts connections until `shutdown()` is called. The TCP connection
    /// is always accepted; the client cap is expressed in which handler
    /// answers it, never in the listen backlog.
    #[instrument(skip(self, listener))]
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        self.events.notify(Event::Start);
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => { warn!(error = %e, "accept failed"); continue; }
                    };
                    let current = self.client_num();
                    let server = self.clone();
                    if current < self.client_max {
                        tokio::spawn(async move { server.handle_streaming(socket, peer).await });
                    } else {
                        tokio::spawn(async move { server.handle_overflow(socket).await });
                    }
                }
            }
        }
    }

    /// Stops accepting new connections and polls `client_num` until it
    /// reaches zero or `timeout` elapses, logging every `countdown` seconds.
    pub async fn shutdown(&self) {
        self.events.notify(Event::Terminating);
        self.terminated.store(true, Ordering::Release);
        self.shutdown.notify_waiters();

        let start = Instant::now();
        let mut last_logged_countdown = 0u64;
        loop {
            let remaining = self.client_num();
            if remaining == 0 {
                info!("all downstream clients drained, shutdown complete");
                break;
            }
            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                warn!(remaining, "shutdown timed out with clients still connected");
                break;
            }
            let countdown_index = elapsed.as_secs() / self.countdown.as_secs().max(1);
            if countdown_index != last_logged_countdown {
                last_logged_countdown = countdown_index;
                info!(remaining, elapsed = ?elapsed, "waiting for downstream clients to drain");
            }
            sleep(Duration::from_secs(1)).await;
        }
        self.events.notify(Event::Terminate);
    }

    async fn handle_overflow(&self, socket: TcpStream) {
        let mut conn = Connection::new(socket);
        let _ = conn
            .write_all(b"HTTP/1.0 503 Too Many Clients\r\nConnection: close\r\n\r\n")
            .await;
    }

    async fn handle_streaming(self: Arc<Self>, socket: TcpStream, peer: std::net::SocketAddr) {
        let count = self.client_num.fetch_add(1, Ordering::AcqRel) + 1;
        self.events.notify(Event::ClientNum(count));
        let _guard = ClientCountGuard { server: self.clone() };

        if let Err(e) = self.serve_one(socket).await {
            warn!(%peer, error = %e, "downstream connection ended with an error");
        }
    }

    async fn serve_one(&self, socket: TcpStream) -> Result<(), ServerError> {
        let mut conn = Connection::new(socket);

        let request_line = match conn.read_line().await? {
            Some(line) if !line.is_empty() => line,
            _ => return Ok(()),
        };
        let Some(line) = classify::parse_request_line(&request_line) else {
            return Ok(());
        };

        let mut header_lines = Vec::new();
        while let Some(line) = conn.read_line().await? {
            if line.is_empty() {
                break;
            }
            header_lines.push(line);
        }
        let (headers, pragma) = classify::parse_headers(&header_lines);
        let request = ParsedRequest { line, headers, pragma };

        self.events.notify(Event::Request);
        let classification = classify::classify(&request, self.upstream.is_ready(), self.server_port);

        match classification {
            Classification::LogPost => {
                conn.write_all(b"HTTP/1.0 204 No Content\r\nCache-Control: no-cache\r\nPragma: no-cache\r\n\r\n")
                    .await?
            }
            Classification::NotReady => {
                conn.write_all(b"HTTP/1.0 503 Service not ready\r\nConnection: close\r\n\r\n").await?
            }
            Classification::Streaming => self.stream_response(&mut conn).await?,
            Classification::HeaderOnly => self.header_only_response(&mut conn).await?,
            Classification::Playlist { href } => self.playlist_response(&mut conn, &href).await?,
            Classification::ShoutcastProbe => {
                conn.write_all(
                    b"HTTP/1.0 400 Shoutcast Not Supported. Try mms Protocol.\r\nConnection: close\r\n\r\n",
                )
                .await?
            }
            Classification::UnknownHeaders => {
                conn.write_all(b"HTTP/1.0 400 Unknown Headers\r\nConnection: close\r\n\r\n").await?
            }
        }
        Ok(())
    }

    async fn captured_head(&self) -> Option<String> {
        let response = self.upstream.response()?;
        let mut head = format!("{}\r\n", response.status_line);
        for header in &response.headers {
            head.push_str(header);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        Some(head)
    }

    async fn header_only_response(&self, conn: &mut Connection) -> Result<(), ServerError> {
        match self.captured_head().await {
            Some(head) => conn.write_all(head.as_bytes()).await?,
            None => conn.write_all(b"HTTP/1.0 503 Service not ready\r\nConnection: close\r\n\r\n").await?,
        }
        Ok(())
    }

    async fn stream_response(&self, conn: &mut Connection) -> Result<(), ServerError> {
        let Some(head) = self.captured_head().await else {
            conn.write_all(b"HTTP/1.0 503 Service not ready\r\nConnection: close\r\n\r\n").await?;
            return Ok(());
        };
        let Some(info) = self.upstream.info_packet() else {
            conn.write_all(b"HTTP/1.0 503 Service not ready\r\nConnection: close\r\n\r\n").await?;
            return Ok(());
        };

        conn.write_all(head.as_bytes()).await?;
        conn.write_all(info.raw_bytes()).await?;

        let mut reader = self.ring.reader();
        loop {
            match self.ring.get(&mut reader).await {
                Some(packet) => {
                    conn.write_all(&packet.raw).await?;
                    if packet.is_last() {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            }
        }
    }

    async fn playlist_response(&self, conn: &mut Connection, href: &str) -> Result<(), ServerError> {
        let body = playlist::render(href);
        let head = format!(
            "HTTP/1.0 200 OK\r\nContent-Type: video/x-ms-asf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        conn.write_all(head.as_bytes()).await?;
        conn.write_all(body.as_bytes()).await?;
        Ok(())
    }
}

struct ClientCountGuard {
    server: Arc<Server>,
}

impl Drop for ClientCountGuard {
    fn drop(&mut self) {
        let remaining = self.server.client_num.fetch_sub(1, Ordering::AcqRel) - 1;
        self.server.events.notify(Event::ClientNum(remaining));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerOptions;
    use crate::events::EventBus;
    use crate::upstream::ClientState;

    #[tokio::test]
    async fn overflow_handler_responds_503_and_does_not_touch_client_num() {
        let options = ServerOptions {
            bindings: "127.0.0.1:0".to_string(),
            client_max: 0,
            ..ServerOptions::default()
        };
        let ring = Arc::new(Ring::new(4));
        let upstream = Arc::new(ClientState::default());
        let events = Arc::new(EventBus::new());
        let (server, _host, _port) = Server::new(&options, ring, upstream, events);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(server);
        let client = TcpStream::connect(addr);
        let (accepted, client) = tokio::join!(listener.accept(), client);
        let (socket, _) = accepted.unwrap();
        let mut client = client.unwrap();

        server.handle_overflow(socket).await;

        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.starts_with("HTTP/1.0 503 Too Many Clients"));
        assert_eq!(server.client_num(), 0);
    }
}
