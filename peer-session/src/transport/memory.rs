//! In-process transport.
//!
//! A [`MemoryNetwork`] is a shared switchboard; every transport it allocates
//! is an endpoint on it. Descriptors and fragments carry the endpoint id as
//! JSON, so two engines in the same process can run the full offer/answer
//! exchange and then talk over an ordered, reliable channel.

use super::{EventSender, Transport, TransportError, TransportEvent, TransportFactory};
use crate::config::TransportConfig;
use async_trait::async_trait;
use peer_types::{Fragment, HandshakeDescriptor, HandshakeRole};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Close reason reported to the surviving side.
pub const REMOTE_CLOSED: &str = "remote closed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChannelSpec {
    label: String,
    ordered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct EndpointBlob {
    endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<ChannelSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CandidateBlob {
    endpoint: String,
    candidate: u32,
}

#[derive(Debug)]
struct EndpointSlot {
    events: EventSender,
    peer: Option<String>,
    channel: Option<ChannelSpec>,
    channel_open: bool,
    candidates: u32,
}

#[derive(Debug, Default)]
struct NetworkInner {
    endpoints: HashMap<String, EndpointSlot>,
    unavailable: Option<String>,
}

/// Shared in-process network; also the factory for its transports.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent allocations fail, as on a platform without data
    /// channel support.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.lock().unavailable = reason.map(str::to_string);
    }

    /// Number of live endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.lock().endpoints.len()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransportFactory for MemoryNetwork {
    type Transport = MemoryTransport;

    fn allocate(
        &self,
        config: &TransportConfig,
        events: EventSender,
    ) -> Result<MemoryTransport, TransportError> {
        let mut inner = self.lock();
        if let Some(reason) = &inner.unavailable {
            return Err(TransportError::Unavailable(reason.clone()));
        }
        config
            .validate()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        inner.endpoints.insert(
            id.clone(),
            EndpointSlot {
                events,
                peer: None,
                channel: None,
                channel_open: false,
                candidates: 0,
            },
        );
        // No NAT to traverse in-process; the ICE servers are only reported.
        debug!(
            endpoint = %id,
            ice_servers = config.stun_servers.len(),
            "Allocated memory endpoint"
        );

        Ok(MemoryTransport {
            id,
            network: self.clone(),
        })
    }
}

/// One endpoint on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    id: String,
    network: MemoryNetwork,
}

impl MemoryTransport {
    /// Endpoint id on the network.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Label and ordering of the negotiated message channel.
    ///
    /// The initiator sets them in `open_channel`; the responder learns them
    /// from the offer. Delivery is always in order, which also satisfies an
    /// unordered channel.
    pub fn channel(&self) -> Option<(String, bool)> {
        self.network
            .lock()
            .endpoints
            .get(&self.id)
            .and_then(|slot| slot.channel.clone())
            .map(|spec| (spec.label, spec.ordered))
    }

    /// Whether the message channel is open.
    pub fn is_channel_open(&self) -> bool {
        self.network
            .lock()
            .endpoints
            .get(&self.id)
            .is_some_and(|slot| slot.channel_open)
    }

    fn descriptor_blob(&self, channel: Option<ChannelSpec>) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(&EndpointBlob {
            endpoint: self.id.clone(),
            channel,
        })
        .map_err(|e| TransportError::NegotiationRejected(e.to_string()))
    }

    fn parse_descriptor(
        descriptor: &HandshakeDescriptor,
        expected: HandshakeRole,
    ) -> Result<EndpointBlob, TransportError> {
        if descriptor.role != expected {
            return Err(TransportError::InvalidDescriptor(format!(
                "expected {}, got {}",
                expected, descriptor.role
            )));
        }
        serde_json::from_slice(&descriptor.blob)
            .map_err(|e| TransportError::InvalidDescriptor(e.to_string()))
    }

    /// Queue a locally generated candidate on our own event stream.
    fn gather_candidate(&self, inner: &mut NetworkInner) -> Result<(), TransportError> {
        let slot = inner
            .endpoints
            .get_mut(&self.id)
            .ok_or(TransportError::Closed)?;
        slot.candidates += 1;

        let blob = serde_json::to_vec(&CandidateBlob {
            endpoint: self.id.clone(),
            candidate: slot.candidates,
        })
        .map_err(|e| TransportError::NegotiationRejected(e.to_string()))?;

        // The engine may already be gone; losing a candidate is harmless.
        let _ = slot
            .events
            .send(TransportEvent::FragmentGenerated(Fragment::new(blob)));
        Ok(())
    }

    fn detach(&self) {
        let mut inner = self.network.lock();
        let Some(slot) = inner.endpoints.remove(&self.id) else {
            return;
        };
        debug!(endpoint = %self.id, "Closed memory endpoint");

        let Some(peer_id) = slot.peer else {
            return;
        };
        if let Some(peer) = inner.endpoints.get_mut(&peer_id) {
            if peer.peer.as_deref() == Some(self.id.as_str()) {
                peer.peer = None;
                peer.channel_open = false;
                let _ = peer.events.send(TransportEvent::ChannelClosed {
                    reason: REMOTE_CLOSED.to_string(),
                });
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open_channel(&self, label: &str, ordered: bool) -> Result<(), TransportError> {
        let mut inner = self.network.lock();
        let slot = inner
            .endpoints
            .get_mut(&self.id)
            .ok_or(TransportError::Closed)?;
        slot.channel = Some(ChannelSpec {
            label: label.to_string(),
            ordered,
        });
        debug!(endpoint = %self.id, label, ordered, "Opened memory channel");
        Ok(())
    }

    async fn create_offer(&self) -> Result<HandshakeDescriptor, TransportError> {
        let mut inner = self.network.lock();

        let slot = inner.endpoints.get(&self.id).ok_or(TransportError::Closed)?;
        let Some(channel) = slot.channel.clone() else {
            return Err(TransportError::NegotiationRejected(
                "no message channel to negotiate".into(),
            ));
        };
        let blob = self.descriptor_blob(Some(channel))?;

        self.gather_candidate(&mut inner)?;
        Ok(HandshakeDescriptor::offer(blob))
    }

    async fn accept_offer(
        &self,
        offer: &HandshakeDescriptor,
    ) -> Result<HandshakeDescriptor, TransportError> {
        let EndpointBlob {
            endpoint: remote,
            channel,
        } = Self::parse_descriptor(offer, HandshakeRole::Offer)?;
        if remote == self.id {
            return Err(TransportError::InvalidDescriptor(
                "offer came from this endpoint".into(),
            ));
        }
        let Some(channel) = channel else {
            return Err(TransportError::InvalidDescriptor(
                "offer carries no message channel".into(),
            ));
        };

        let blob = self.descriptor_blob(None)?;
        let mut inner = self.network.lock();

        if !inner.endpoints.contains_key(&remote) {
            return Err(TransportError::InvalidDescriptor(format!(
                "unknown endpoint {}",
                remote
            )));
        }
        let slot = inner
            .endpoints
            .get_mut(&self.id)
            .ok_or(TransportError::Closed)?;
        slot.peer = Some(remote);
        slot.channel = Some(channel);

        self.gather_candidate(&mut inner)?;
        Ok(HandshakeDescriptor::answer(blob))
    }

    async fn accept_answer(&self, answer: &HandshakeDescriptor) -> Result<(), TransportError> {
        let remote = Self::parse_descriptor(answer, HandshakeRole::Answer)?.endpoint;
        let mut inner = self.network.lock();

        if !inner.endpoints.contains_key(&self.id) {
            return Err(TransportError::Closed);
        }
        let peer = inner.endpoints.get_mut(&remote).ok_or_else(|| {
            TransportError::InvalidDescriptor(format!("unknown endpoint {}", remote))
        })?;
        if peer.peer.as_deref() != Some(self.id.as_str()) {
            return Err(TransportError::InvalidDescriptor(
                "answer does not belong to our offer".into(),
            ));
        }
        peer.channel_open = true;
        let _ = peer.events.send(TransportEvent::ChannelOpen);

        if let Some(slot) = inner.endpoints.get_mut(&self.id) {
            slot.peer = Some(remote);
            slot.channel_open = true;
            let _ = slot.events.send(TransportEvent::ChannelOpen);
        }
        Ok(())
    }

    async fn add_fragment(&self, fragment: &Fragment) -> Result<(), TransportError> {
        let candidate: CandidateBlob = serde_json::from_slice(&fragment.blob)
            .map_err(|e| TransportError::InvalidFragment(e.to_string()))?;
        debug!(
            endpoint = %self.id,
            from = %candidate.endpoint,
            candidate = candidate.candidate,
            "Applied remote candidate"
        );
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let inner = self.network.lock();
        let slot = inner
            .endpoints
            .get(&self.id)
            .filter(|slot| slot.channel_open)
            .ok_or(TransportError::ChannelNotOpen)?;

        let peer = slot
            .peer
            .as_ref()
            .and_then(|id| inner.endpoints.get(id))
            .ok_or_else(|| TransportError::SendFailed("peer is gone".into()))?;

        peer.events
            .send(TransportEvent::Message(data.to_vec()))
            .map_err(|_| TransportError::SendFailed("peer stopped listening".into()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.detach();
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.detach();
    }
}
