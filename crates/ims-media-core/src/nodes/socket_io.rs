//! Socket-boundary nodes (spec.md §4.13 / C13). The original engine's
//! socket reader runs on its own OS thread, independent of the node
//! scheduler's run loop, blocking on `recv()`; [`SocketReader`] mirrors that
//! by owning its own background task rather than being polled by
//! [`crate::scheduler::StreamScheduler`]. The writer side stays
//! schedulable: it's fed by upstream encoder nodes and only needs to hand
//! off to the socket, so it's an ordinary data-driven [`Node`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use ims_rtp_core::socket::RtpSocket;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::descriptor::{MediaSubtype, PacketDescriptor};
use crate::node::{BaseNode, DescriptorQueue, Node};
use crate::scheduler::StreamScheduler;

/// Owns a UDP socket's receive loop and feeds arriving datagrams directly
/// into a rear node's queue, waking the scheduler so it doesn't wait out a
/// full poll interval.
pub struct SocketReader {
    socket: Arc<RtpSocket>,
    rear: Arc<DescriptorQueue>,
    scheduler: Arc<StreamScheduler>,
    subtype: MediaSubtype,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SocketReader {
    pub fn new(socket: Arc<RtpSocket>, rear: Arc<DescriptorQueue>, scheduler: Arc<StreamScheduler>, subtype: MediaSubtype) -> Self {
        Self { socket, rear, scheduler, subtype, handle: Mutex::new(None) }
    }

    pub fn start(&self) {
        let rear = self.rear.clone();
        let scheduler = self.scheduler.clone();
        let subtype = self.subtype;
        let handle = self.socket.spawn_listener(move |bytes, _from| {
            let mut desc = PacketDescriptor::new(Bytes::from(bytes), subtype);
            let now_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            desc.arrival_time_ms = Some(now_ms);
            rear.add(desc);
            scheduler.awake();
            true
        });
        *self.handle.lock() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

/// Forwards queued outbound descriptors to the network. The actual
/// `send_to` is async, so `process_data` only moves work onto an unbounded
/// channel a background task drains — keeping [`Node::process_data`]
/// synchronous the way the scheduler expects.
pub struct SocketWriterNode {
    base: BaseNode,
    sender: mpsc::UnboundedSender<Bytes>,
    _drain_task: JoinHandle<()>,
}

impl SocketWriterNode {
    pub fn new(name: impl Into<String>, socket: Arc<RtpSocket>, target: SocketAddr) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let drain_task = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if let Err(err) = socket.send_to(&bytes, target).await {
                    warn!(%target, error = %err, "socket write failed");
                }
            }
        });
        Self { base: BaseNode::new(name), sender: tx, _drain_task: drain_task }
    }
}

impl Node for SocketWriterNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        while let Some(desc) = self.base.input_queue().get() {
            let _ = self.sender.send(desc.data);
        }
        Ok(())
    }
}
