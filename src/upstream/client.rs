// ABOUTME: Drives the two-phase MMS-HTTP session to the origin and feeds packets into the ring
// ABOUTME: Owns the outbound socket; the ring and captured response/info packet are the only outputs

use crate::config::ClientOptions;
use crate::connection::Connection;
use crate::events::{Event, EventBus};
use crate::packet::{InfoPacket, Packet};
use crate::pragma::{self, PragmaMap};
use crate::ring::Ring;
use crate::upstream::error::ClientError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// How many phase-2 packets must arrive before the session is considered
/// "started" (heuristic for the pre-stream header burst some origins send).
const STARTED_AFTER_PACKETS: usize = 3;

#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status_line: String,
    pub headers: Vec<String>,
}

/// State shared between the upstream client and every downstream sender.
/// Written once by the client, read many times by servers; `RwLock` is
/// appropriate because writes happen only during the brief capture moment.
#[derive(Default)]
pub struct ClientState {
    response: RwLock<Option<CapturedResponse>>,
    info: RwLock<Option<Arc<InfoPacket>>>,
    started: AtomicBool,
    terminated: AtomicBool,
    notify: Notify,
}

impl ClientState {
    /// False until the info packet and response header are captured *and*
    /// the started heuristic has fired; false again once terminated.
    pub fn is_ready(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.terminated.load(Ordering::Acquire)
    }

    pub fn response(&self) -> Option<CapturedResponse> {
        self.response.read().unwrap().clone()
    }

    pub fn info_packet(&self) -> Option<Arc<InfoPacket>> {
        self.info.read().unwrap().clone()
    }
}

pub struct UpstreamClient {
    options: ClientOptions,
    ring: Arc<Ring<Packet>>,
    events: Arc<EventBus>,
    state: Arc<ClientState>,
}

impl UpstreamClient {
    pub fn new(
        options: ClientOptions,
        ring: Arc<Ring<Packet>>,
        events: Arc<EventBus>,
    ) -> (UpstreamClient, Arc<ClientState>) {
        let state = Arc::new(ClientState::default());
        (
            UpstreamClient {
                options,
                ring,
                events,
                state: state.clone(),
            },
            state,
        )
    }

    pub fn state(&self) -> Arc<ClientState> {
        self.state.clone()
    }

    /// Requests termination: any in-flight read unblocks and the run loop
    /// exits without retrying, as if the socket itself had failed.
    pub fn terminate(&self) {
        self.state.terminated.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    fn terminating(&self) -> bool {
        self.state.terminated.load(Ordering::Acquire)
    }

    /// Runs the session to completion: phase 1 (if not already captured),
    /// then phase 2 streaming with retry/backoff on socket errors.
    #[instrument(skip(self), fields(host = %self.options.host, port = self.options.port))]
    pub async fn run(&self) {
        self.events.notify(Event::Start);

        let mut retries_left = self.options.retry;

        loop {
            if self.terminating() {
                break;
            }

            if self.state.info_packet().is_none() {
                match self.phase1().await {
                    Ok(()) => {}
                    Err(e) if e.is_retryable() && self.should_retry(retries_left) => {
                        warn!(error = %e, "phase 1 failed, retrying");
                        retries_left -= 1;
                        self.backoff().await;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "phase 1 failed terminally");
                        break;
                    }
                }
            }

            match self.phase2().await {
                Ok(()) => break,
                Err(e) if e.is_retryable() && self.should_retry(retries_left) => {
                    warn!(error = %e, "phase 2 failed, retrying (phase 1 already captured, skipping)");
                    retries_left -= 1;
                    self.backoff().await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "phase 2 failed terminally");
                    break;
                }
            }
        }

        self.state.terminated.store(true, Ordering::Release);
        self.ring.terminate();
        self.events.notify(Event::Terminate);
    }

    fn should_retry(&self, retries_left: u32) -> bool {
        !self.terminating() && retries_left > 0 && self.options.retrysec > 0.0
    }

    async fn backoff(&self) {
        sleep(Duration::from_secs_f64(self.options.retrysec)).await;
    }

    async fn connect(&self) -> Result<Connection, ClientError> {
        self.events.notify(Event::Connecting);
        let stream = TcpStream::connect((self.options.host.as_str(), self.options.port)).await?;
        self.events.notify(Event::Connected);
        Ok(Connection::new(stream))
    }

    fn request_line(&self, pragma: &PragmaMap) -> String {
        format!(
            "GET {path} HTTP/1.1\r\nAccept: */*\r\nUser-Agent: NSPlayer/4.1.0.3928\r\nHost: {host}:{port}\r\nPragma: {pragma}\r\n\r\n",
            path = self.options.path,
            host = self.options.host,
            port = self.options.port,
            pragma = pragma::render(pragma),
        )
    }

    fn info_pragma(&self) -> PragmaMap {
        let mut map = PragmaMap::new();
        map.insert("no-cache".to_string(), String::new());
        map.insert("rate".to_string(), "1.000000".to_string());
        map.insert("stream-time".to_string(), "0".to_string());
        map.insert("stream-offset".to_string(), "0:0".to_string());
        map.insert("request-context".to_string(), "1".to_string());
        map.insert("max-duration".to_string(), "0".to_string());
        map
    }

    fn streaming_pragma(&self) -> PragmaMap {
        let mut map = self.info_pragma();
        map.insert("request-context".to_string(), "2".to_string());
        map.insert("xPlayStrm".to_string(), "1".to_string());
        map.insert("stream-switch-count".to_string(), "2".to_string());
        map.insert("stream-switch-entry".to_string(), "ffff:1:0 ffff:2:0".to_string());
        map
    }

    async fn send_request(&self, conn: &mut Connection, pragma: &PragmaMap) -> Result<(String, Vec<String>), ClientError> {
        self.events.notify(Event::Request);
        conn.write_all(self.request_line(pragma).as_bytes()).await?;
        let head = conn
            .read_response_head()
            .await?
            .ok_or_else(|| ClientError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed before response")))?;
        self.events.notify(Event::Response);
        validate_status(&head.0)?;
        Ok(head)
    }

    async fn phase1(&self) -> Result<(), ClientError> {
        self.events.notify(Event::Processing);
        let mut conn = self.connect().await?;
        let pragma = self.info_pragma();
        let (status_line, headers) = self.send_request(&mut conn, &pragma).await?;

        let packet = conn
            .read_packet()
            .await?
            .ok_or_else(|| ClientError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no info packet")))?;
        let info = InfoPacket::from_packet(packet);

        *self.state.response.write().unwrap() = Some(CapturedResponse { status_line, headers });
        *self.state.info.write().unwrap() = Some(Arc::new(info));
        self.events.notify(Event::InfoPacket);
        self.events.notify(Event::Processed);
        Ok(())
    }

    async fn phase2(&self) -> Result<(), ClientError> {
        self.events.notify(Event::Processing);
        let mut conn = self.connect().await?;
        let pragma = self.streaming_pragma();
        self.send_request(&mut conn, &pragma).await?;

        let mut packets_seen = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = self.state.notify.notified() => {
                    info!("terminate requested, stopping phase 2 without retry");
                    return Ok(());
                }
                result = conn.read_packet() => {
                    match result? {
                        None => return Ok(()),
                        Some(packet) => {
                            let is_last = packet.is_last();
                            self.ring.push(packet.clone());

                            packets_seen += 1;
                            if packets_seen == STARTED_AFTER_PACKETS && !self.state.started.load(Ordering::Acquire) {
                                self.state.started.store(true, Ordering::Release);
                                self.events.notify(Event::StartStreaming);
                            }

                            if is_last {
                                self.events.notify(Event::FinishStreaming);
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

fn validate_status(status_line: &str) -> Result<(), ClientError> {
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ClientError::BadStatusLine(status_line.to_string()))?;

    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(ClientError::RequestNotSucceeded {
            status: code,
            reason: status_line.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_2xx_as_success() {
        assert!(validate_status("HTTP/1.1 200 OK").is_ok());
    }

    #[test]
    fn rejects_non_2xx() {
        let err = validate_status("HTTP/1.1 404 Not Found").unwrap_err();
        assert!(matches!(err, ClientError::RequestNotSucceeded { status: 404, .. }));
    }

    #[test]
    fn rejects_unparseable_status_line() {
        let err = validate_status("not a status line").unwrap_err();
        assert!(matches!(err, ClientError::BadStatusLine(_)));
    }
}
