use crate::identifier::Identifier;
use crate::networking::callback::{encode_response, CallbackRegistry, Response, CALLBACK_CONSUMER};
use crate::networking::contact::Contact;
use crate::networking::packet::{FrameError, Packet, Payload};
use crate::routing::RoutingTable;
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, event, trace, warn, Level};

/// Largest payload a UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65507;
/// Consumer name used for call tokens allocated by `ping`.
pub const PING_CONSUMER: &str = "ping";

/// A decoded Data packet on its way to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub sender: Contact,
    /// Address the datagram arrived from, as seen by the socket.
    pub source: SocketAddr,
    pub consumer: String,
    pub body: Vec<u8>,
}

///
/// A consumer of Data packets.
///
/// `handle` runs on the receive loop. It may complete a call token, do a
/// bounded amount of local work, or spawn a task. It must never wait for
/// another response itself, because that response can only arrive through the
/// loop it is blocking.
///
pub trait PacketHandler: Send + Sync {
    fn handle(&self, delivery: Delivery);
}

impl PacketHandler for CallbackRegistry {
    fn handle(&self, delivery: Delivery) {
        if let Err(err) = self.handle_response_body(delivery.sender, &delivery.body) {
            debug!("dropping malformed callback body: {}", err);
        }
    }
}

///
/// The node's single UDP socket and the loop that reads it.
///
/// Every datagram is decoded into a `Packet`. Pings are answered right away
/// through the callback path and reported to the routing table. Data packets
/// are handed to the consumer registered under their consumer name. Anything
/// that fails to decode, comes from another network, or names an unknown
/// consumer is logged and dropped; the loop keeps going.
///
/// Sends are fire-and-forget and serialized through one lock. Failures are
/// logged and reported as `false`, never retried here.
///
pub struct Network {
    socket: Arc<UdpSocket>,
    local_contact: Contact,
    routing: Arc<dyn RoutingTable>,
    registry: CallbackRegistry,
    consumers: RwLock<AHashMap<String, Arc<dyn PacketHandler>>>,
    send_lock: tokio::sync::Mutex<()>,
    max_datagram: usize,
    notify_shutdown: broadcast::Sender<()>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

/// Bind a UDP socket and describe it as a contact. Port 0 picks a free port;
/// the contact carries the port actually bound.
pub async fn bind_socket(
    host: IpAddr,
    port: u16,
    identifier: Identifier,
    network_tag: &str,
) -> crate::Result<(UdpSocket, Contact)> {
    let socket = UdpSocket::bind(SocketAddr::new(host, port)).await?;
    let bound = socket.local_addr()?;
    let contact = Contact::new(identifier, network_tag, bound.ip(), bound.port());
    Ok((socket, contact))
}

impl Network {
    ///
    /// Take ownership of a bound socket and start the receive loop.
    ///
    /// The callback registry is registered as the `callback` consumer before
    /// the first datagram is read.
    ///
    pub fn listen(
        socket: UdpSocket,
        local_contact: Contact,
        routing: Arc<dyn RoutingTable>,
        max_datagram: usize,
    ) -> Arc<Network> {
        let (notify_shutdown, shutdown_receiver) = broadcast::channel(1);
        let registry = CallbackRegistry::new();
        let network = Arc::new(Network {
            socket: Arc::new(socket),
            local_contact,
            routing,
            registry: registry.clone(),
            consumers: RwLock::new(AHashMap::new()),
            send_lock: tokio::sync::Mutex::new(()),
            max_datagram: max_datagram.min(MAX_DATAGRAM_SIZE),
            notify_shutdown,
            receive_task: Mutex::new(None),
        });
        network.register_consumer(CALLBACK_CONSUMER, Arc::new(registry));

        let handle = tokio::spawn(receive_loop(network.clone(), shutdown_receiver));
        *network.receive_task.lock() = Some(handle);
        event!(Level::INFO, "listening on {}", network.local_contact);
        network
    }

    pub fn local_contact(&self) -> &Contact {
        &self.local_contact
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn routing(&self) -> &Arc<dyn RoutingTable> {
        &self.routing
    }

    pub fn register_consumer(&self, consumer: &str, handler: Arc<dyn PacketHandler>) {
        self.consumers.write().insert(consumer.to_string(), handler);
    }

    pub fn unregister_consumer(&self, consumer: &str) {
        self.consumers.write().remove(consumer);
    }

    /// Write one datagram. Returns whether the socket accepted it.
    pub async fn send(&self, bytes: &[u8], destination: &Contact) -> bool {
        if bytes.len() > self.max_datagram {
            let err = FrameError::Oversized {
                size: bytes.len(),
                max: self.max_datagram,
            };
            warn!("not sending to {}: {}", destination, err);
            return false;
        }
        let _guard = self.send_lock.lock().await;
        match self.socket.send_to(bytes, destination.socket_addr()).await {
            Ok(_) => true,
            Err(err) => {
                warn!("error sending to {}: {}", destination, err);
                false
            }
        }
    }

    pub async fn send_packet(&self, destination: &Contact, payload: Payload) -> bool {
        let packet = Packet::new(self.local_contact.clone(), payload);
        self.send(&packet.serialize(), destination).await
    }

    pub async fn send_data(&self, destination: &Contact, consumer: &str, body: Vec<u8>) -> bool {
        self.send_packet(
            destination,
            Payload::Data {
                consumer: consumer.to_string(),
                body,
            },
        )
        .await
    }

    /// Answer a request: `payload` goes back tagged with the requester's token id.
    pub async fn send_response(&self, destination: &Contact, token_id: u64, payload: &[u8]) -> bool {
        self.send_data(
            destination,
            CALLBACK_CONSUMER,
            encode_response(token_id, payload),
        )
        .await
    }

    ///
    /// One request/response round trip to `destination`.
    ///
    /// `build` receives the allocated token id and returns the request body for
    /// `consumer`. `None` means the send failed or nothing came back in time.
    /// Only a response from `destination` itself completes the call. The token
    /// is freed before returning either way.
    ///
    pub async fn request<F>(
        &self,
        destination: &Contact,
        consumer: &str,
        timeout: Duration,
        build: F,
    ) -> Option<Response>
    where
        F: FnOnce(u64) -> Vec<u8>,
    {
        let mut token = self.registry.allocate_token_for(consumer, destination);
        let body = build(token.id());
        if !self.send_data(destination, consumer, body).await {
            return None;
        }
        if token.wait(timeout).await {
            token.take_response()
        } else {
            debug!("no response from {} to {} request", destination, consumer);
            None
        }
    }

    /// Liveness check. A peer that answers is reported to the routing table.
    pub async fn ping(&self, destination: &Contact, timeout: Duration) -> bool {
        let mut token = self.registry.allocate_token(PING_CONSUMER);
        let sent = self
            .send_packet(
                destination,
                Payload::Ping {
                    token_id: token.id(),
                },
            )
            .await;
        if sent && token.wait(timeout).await {
            if let Some(response) = token.response() {
                self.routing.deliver_ping(&response.source);
            }
            true
        } else {
            false
        }
    }

    /// Hand a delivery to its consumer on this node.
    pub fn dispatch_local(&self, delivery: Delivery) -> bool {
        let handler = self.consumers.read().get(&delivery.consumer).cloned();
        match handler {
            Some(handler) => {
                handler.handle(delivery);
                true
            }
            None => {
                debug!(
                    "dropping delivery from {} for unknown consumer {:?}",
                    delivery.sender, delivery.consumer
                );
                false
            }
        }
    }

    fn process_datagram(self: &Arc<Self>, bytes: &[u8], source: SocketAddr) {
        let packet = match Packet::deserialize(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("dropping datagram from {}: {}", source, err);
                return;
            }
        };
        let mut sender = packet.sender;
        if !sender.is_same_network(&self.local_contact) {
            warn!(
                "dropping datagram from {} on network {:?}",
                source, sender.network_tag
            );
            return;
        }
        // a peer bound to 0.0.0.0 cannot know its own address, we can
        if sender.address.is_unspecified() {
            sender.address = source.ip();
        }

        match packet.payload {
            Payload::Ping { token_id } => {
                trace!("ping {} from {}", token_id, sender);
                self.routing.deliver_ping(&sender);
                let network = self.clone();
                tokio::spawn(async move {
                    network.send_response(&sender, token_id, &[]).await;
                });
            }
            Payload::Data { consumer, body } => {
                self.dispatch_local(Delivery {
                    sender,
                    source,
                    consumer,
                    body,
                });
            }
        }
    }

    /// Tell the receive loop to stop and drop every consumer without waiting.
    pub fn stop(&self) {
        let _ = self.notify_shutdown.send(());
        // consumers hold services which hold this network
        self.consumers.write().clear();
    }

    /// Stop the receive loop and wait for it. In-flight sends finish or fail
    /// on their own.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.receive_task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("receive loop ended abnormally: {}", err);
            }
        }
        event!(Level::INFO, "network {} shut down", self.local_contact);
    }

    pub fn is_running(&self) -> bool {
        self.receive_task
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

async fn receive_loop(network: Arc<Network>, mut shutdown: broadcast::Receiver<()>) {
    let mut buffer = vec![0u8; network.max_datagram];
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                break;
            }
            result = network.socket.recv_from(&mut buffer) => {
                match result {
                    Ok((len, source)) => network.process_datagram(&buffer[..len], source),
                    Err(err) => {
                        // e.g. ICMP port unreachable surfacing on some platforms
                        debug!("error receiving datagram: {}", err);
                    }
                }
            }
        }
    }
}
