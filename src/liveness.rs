// ABOUTME: Liveness monitor: polls TCP ports to decide whether a reflector should be running
// ABOUTME: Not part of the streaming path; only ever reads a bare-connect result and emits events

use crate::events::{Event, EventBus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum LivenessError {
    #[error("watched address {0:?} has no port")]
    MissingPort(String),

    #[error("watched address {0:?} has a port that is not a valid u16")]
    BadPort(String),
}

/// One watched endpoint. The original implementation parsed the port with an
/// unguarded `int(...)` that would panic on a missing or non-numeric port;
/// here that's a constructor-time `Result` instead (see module docs).
#[derive(Debug)]
pub struct MonitorClient {
    pub address: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    terminating: AtomicBool,
}

impl MonitorClient {
    pub fn new(address: &str, timeout: Duration) -> Result<MonitorClient, LivenessError> {
        let (host, port) = parse_address(address)?;
        Ok(MonitorClient {
            address: address.to_string(),
            host,
            port,
            timeout,
            terminating: AtomicBool::new(false),
        })
    }

    /// A bare TCP connect attempt, nothing more: the monitor only cares
    /// whether *something* is listening.
    pub async fn check_alive(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port))).await,
            Ok(Ok(_))
        )
    }

    /// Stops just this client's own `watch()` loop, independent of the
    /// monitor-wide terminate.
    pub fn terminate(&self) {
        self.terminating.store(true, Ordering::Release);
    }
}

fn parse_address(address: &str) -> Result<(String, u16), LivenessError> {
    let without_scheme = address.split("://").last().unwrap_or(address);
    let host_port = without_scheme.split('/').next().unwrap_or(without_scheme);
    let (host, port_str) = host_port
        .rsplit_once(':')
        .ok_or_else(|| LivenessError::MissingPort(address.to_string()))?;
    let port = port_str
        .parse::<u16>()
        .map_err(|_| LivenessError::BadPort(address.to_string()))?;
    Ok((host.to_string(), port))
}

/// Polls a set of [`MonitorClient`]s on a shared interval, staggering each
/// client's first check by `delay` so a large client list doesn't open every
/// socket in the same instant.
pub struct PortMonitor {
    clients: Mutex<HashMap<String, Arc<MonitorClient>>>,
    events: Arc<EventBus>,
    interval: Duration,
    delay: Duration,
    terminating: AtomicBool,
}

impl PortMonitor {
    pub fn new(events: Arc<EventBus>, interval: Duration, delay: Duration) -> PortMonitor {
        PortMonitor {
            clients: Mutex::new(HashMap::new()),
            events,
            interval,
            delay,
            terminating: AtomicBool::new(false),
        }
    }

    pub fn append(&self, client: MonitorClient) {
        self.clients
            .lock()
            .unwrap()
            .insert(client.address.clone(), Arc::new(client));
    }

    pub fn remove(&self, address: &str) {
        if let Some(client) = self.clients.lock().unwrap().remove(address) {
            client.terminate();
        }
    }

    pub fn clear(&self) {
        self.clients.lock().unwrap().clear();
    }

    pub fn terminate(&self) {
        self.terminating.store(true, Ordering::Release);
    }

    /// Spawns one watch task per registered client, staggering their starts.
    #[instrument(skip(self))]
    pub async fn start(self: Arc<Self>) {
        self.events.notify(Event::Start);
        let clients: Vec<_> = self.clients.lock().unwrap().values().cloned().collect();
        for client in clients {
            let monitor = self.clone();
            tokio::spawn(async move { monitor.watch(client).await });
            sleep(self.delay).await;
        }
    }

    async fn watch(&self, client: Arc<MonitorClient>) {
        let mut last_alive: Option<bool> = None;

        while !self.terminating.load(Ordering::Acquire) && !client.terminating.load(Ordering::Acquire) {
            self.events.notify(Event::Checking);
            let alive = client.check_alive().await;
            if last_alive != Some(alive) {
                self.events.notify(Event::Change);
                self.events.notify(if alive { Event::Alive } else { Event::Dead });
            }
            last_alive = Some(alive);
            self.events.notify(Event::Checked);

            let mut waited = Duration::ZERO;
            while waited < self.interval {
                if self.terminating.load(Ordering::Acquire) || client.terminating.load(Ordering::Acquire) {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
                waited += Duration::from_secs(1);
            }
        }

        self.remove(&client.address);
    }
}
