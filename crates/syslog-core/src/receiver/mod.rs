//! Core syslog receiver
//!
//! The Receiver is responsible for:
//! - Receiving datagrams on the listen socket
//! - Decoding and publishing every message on the notification bus
//! - Forwarding raw datagrams to other collectors
//! - Parsing routed messages and buffering them for their storer
//! - Driving the periodic flush, and a final flush on stop
//!
//! ## Architecture
//!
//! ```text
//!   UDP datagram
//!        │
//!        ▼
//! ┌──────────────┐   decode   ┌─────────────────┐
//! │ receive loop │───────────►│ NotificationBus │──► monitors
//! └──────────────┘            └─────────────────┘
//!        │ route(sender)
//!        ├──────────────────────────────► forward (fire-and-forget)
//!        ▼
//! ┌──────────────┐  parse   ┌─────────────┐  flush timer  ┌─────────┐
//! │ ModuleRegistry│────────►│ FlushBuffer │──────────────►│ Storer  │
//! └──────────────┘          └─────────────┘               └─────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Created → Bound → Receiving → Stopped`. A failed [`Receiver::start`]
//! leaves the receiver `Created` so it can be started again. `Stopped` is
//! terminal.

use crate::buffer::{FlushBuffer, FlushReport};
use crate::bus::NotificationBus;
use crate::codec;
use crate::config::{CollectorConfig, HandlerConfig};
use crate::dispatch::DispatchTable;
use crate::error::{Error, Result};
use crate::registry::ModuleRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a [`Receiver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Constructed, or a start attempt failed
    Created,
    /// Listen socket bound
    Bound,
    /// Receive loop and flush timer running
    Receiving,
    /// Stopped; the instance cannot be restarted
    Stopped,
}

/// Tasks and sockets owned while the receiver runs
struct Running {
    shutdown: watch::Sender<bool>,
    receive_task: JoinHandle<()>,
    flush_task: JoinHandle<()>,
}

/// Syslog receiver
///
/// Owns the listen socket, the receive loop and the flush timer. The bus and
/// buffer exist from construction, so monitors may subscribe before start.
///
/// Dropping a running receiver ends its tasks without a final flush; call
/// [`Receiver::stop`] to flush pending records.
pub struct Receiver {
    config: CollectorConfig,
    registry: Arc<ModuleRegistry>,
    bus: Arc<NotificationBus>,
    buffer: Arc<FlushBuffer>,
    state: ReceiverState,
    local_addr: Option<SocketAddr>,
    running: Option<Running>,
}

impl Receiver {
    /// Create a receiver
    ///
    /// # Parameters
    ///
    /// - `config`: Listener settings and handlers
    /// - `registry`: Registry the handlers' parser and storer names resolve against
    pub fn new(config: CollectorConfig, registry: Arc<ModuleRegistry>) -> Self {
        let bus = Arc::new(NotificationBus::new(config.listener.subscriber_capacity));

        Self {
            config,
            registry,
            bus,
            buffer: Arc::new(FlushBuffer::new()),
            state: ReceiverState::Created,
            local_addr: None,
            running: None,
        }
    }

    /// Bind the listen socket and start receiving
    ///
    /// # Errors
    ///
    /// - Invalid configuration (listen address, handler addresses, duplicate ids)
    /// - Socket bind failure
    /// - Called on a receiver that is not `Created`
    ///
    /// On error the receiver stays `Created`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ReceiverState::Created {
            return Err(Error::invalid_input(format!(
                "Receiver cannot start from state {:?}",
                self.state
            )));
        }

        self.config.validate()?;
        let table = DispatchTable::build(&self.config.handlers)?;
        let bind_addr = self.config.listener.socket_addr()?;

        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            Error::config(format!("Failed to bind syslog socket {}: {}", bind_addr, e))
        })?;

        let forward_socket = if table.has_forwards() {
            let socket = UdpSocket::bind(("0.0.0.0", 0)).await.map_err(|e| {
                Error::config(format!("Failed to bind forwarding socket: {}", e))
            })?;
            Some(Arc::new(socket))
        } else {
            None
        };

        let local_addr = socket.local_addr()?;
        self.local_addr = Some(local_addr);
        self.state = ReceiverState::Bound;
        info!(
            "Syslog receiver bound to {} ({} filtered senders)",
            local_addr,
            table.filter_count()
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let flush_period = self.config.listener.flush_period();
        let flush_task = self.buffer.spawn_periodic(flush_period, shutdown_rx.clone());

        let pipeline = Pipeline {
            table,
            registry: Arc::clone(&self.registry),
            bus: Arc::clone(&self.bus),
            buffer: Arc::clone(&self.buffer),
            forward_socket,
        };
        let max_datagram_size = self.config.listener.max_datagram_size;
        let receive_task = tokio::spawn(pipeline.run(socket, max_datagram_size, shutdown_rx));

        self.running = Some(Running {
            shutdown: shutdown_tx,
            receive_task,
            flush_task,
        });
        self.state = ReceiverState::Receiving;
        debug!("Receive loop armed, flushing every {:?}", flush_period);

        Ok(())
    }

    /// Stop receiving and flush whatever is buffered
    ///
    /// Idempotent: calling it again, or on a receiver that never started,
    /// only returns an empty report once stopped.
    pub async fn stop(&mut self) -> FlushReport {
        if self.state == ReceiverState::Stopped {
            return FlushReport::default();
        }

        if let Some(running) = self.running.take() {
            // Receivers may already be gone if a task panicked
            let _ = running.shutdown.send(true);

            if let Err(e) = running.receive_task.await {
                warn!("Receive loop ended abnormally: {}", e);
            }
            if let Err(e) = running.flush_task.await {
                warn!("Flush timer ended abnormally: {}", e);
            }
        }

        let report = self.buffer.flush_all().await;
        self.state = ReceiverState::Stopped;
        self.local_addr = None;

        info!(
            "Syslog receiver stopped, final flush stored {} records and dropped {}",
            report.records_stored, report.records_dropped
        );
        report
    }

    /// Current lifecycle state
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Bound listen address, while bound or receiving
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bus carrying every decoded message
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Per-handler record buffer
    pub fn buffer(&self) -> &Arc<FlushBuffer> {
        &self.buffer
    }

    /// Module registry handlers resolve against
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Configuration the receiver was built with
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }
}

/// Per-datagram processing, owned by the receive task
struct Pipeline {
    table: DispatchTable,
    registry: Arc<ModuleRegistry>,
    bus: Arc<NotificationBus>,
    buffer: Arc<FlushBuffer>,
    forward_socket: Option<Arc<UdpSocket>>,
}

impl Pipeline {
    async fn run(
        self,
        socket: UdpSocket,
        max_datagram_size: usize,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut buf = vec![0u8; max_datagram_size];

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    debug!("Receive loop shutting down");
                    break;
                }

                result = socket.recv_from(&mut buf) => match result {
                    Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                    Err(e) => {
                        if *shutdown.borrow() {
                            break;
                        }
                        // e.g. ICMP port unreachable from an earlier forward
                        warn!("Receive failed: {}", e);
                    }
                },
            }
        }
    }

    fn handle_datagram(&self, payload: &[u8], peer: SocketAddr) {
        let sender = peer.ip().to_string();
        let received_at = chrono::Local::now().naive_local();

        let Some(message) = codec::decode(payload, received_at, &sender) else {
            trace!("Discarding empty datagram from {}", sender);
            return;
        };
        let message = Arc::new(message);

        self.bus.publish(Arc::clone(&message));

        let route = self.table.route(&sender);

        if !route.forwards.is_empty() {
            self.forward(payload, route.forwards);
        }

        if let Some(handler) = route.handler {
            self.process(handler, &message);
        }
    }

    fn forward(&self, payload: &[u8], targets: &[SocketAddr]) {
        let Some(socket) = &self.forward_socket else {
            return;
        };

        let data: Arc<[u8]> = Arc::from(payload);
        for &target in targets {
            let socket = Arc::clone(socket);
            let data = Arc::clone(&data);
            tokio::spawn(async move {
                if let Err(e) = socket.send_to(&data, target).await {
                    debug!("Forward to {} failed: {}", target, e);
                }
            });
        }
    }

    fn process(&self, handler: &HandlerConfig, message: &codec::DecodedMessage) {
        let parser = match self.registry.resolve_parser(handler) {
            Ok(Some(parser)) => parser,
            Ok(None) => return,
            Err(e) => {
                warn!("Handler {}: parser unavailable: {}", handler.id, e);
                return;
            }
        };

        let record = match parser.parse(message) {
            Ok(Some(record)) if !record.is_empty() => record,
            Ok(_) => return,
            Err(e) => {
                debug!("Handler {}: {}", handler.id, e);
                return;
            }
        };

        let storer = match self.registry.resolve_storer(handler) {
            Ok(Some(storer)) => storer,
            Ok(None) => return,
            Err(e) => {
                warn!("Handler {}: storer unavailable: {}", handler.id, e);
                return;
            }
        };

        self.buffer.enqueue(&handler.id, &storer, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;

    fn loopback_config() -> CollectorConfig {
        CollectorConfig {
            listener: ListenerConfig::new("127.0.0.1", 0),
            handlers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn start_moves_to_receiving_and_stop_is_terminal() {
        let mut receiver = Receiver::new(loopback_config(), Arc::new(ModuleRegistry::new()));
        assert_eq!(receiver.state(), ReceiverState::Created);
        assert!(receiver.local_addr().is_none());

        receiver.start().await.unwrap();
        assert_eq!(receiver.state(), ReceiverState::Receiving);
        assert_ne!(receiver.local_addr().unwrap().port(), 0);

        assert!(receiver.start().await.is_err());

        receiver.stop().await;
        assert_eq!(receiver.state(), ReceiverState::Stopped);
        assert!(receiver.start().await.is_err());
    }

    #[tokio::test]
    async fn invalid_configuration_leaves_receiver_created() {
        let mut config = loopback_config();
        config.listener.address = "not-an-address".to_string();

        let mut receiver = Receiver::new(config, Arc::new(ModuleRegistry::new()));
        assert!(receiver.start().await.is_err());
        assert_eq!(receiver.state(), ReceiverState::Created);
    }
}
