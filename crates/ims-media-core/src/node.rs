//! Pipeline node base type and lifecycle trait (spec.md §4.11 / C11).
//!
//! The original engine models nodes as a class hierarchy (`BaseNode` with
//! virtual `Start`/`Stop`/`ProcessData`/`IsSourceNode`/`OnDataFromFrontNode`).
//! Per spec.md §9 Design Notes we restate that as an explicit capability
//! trait plus a composable `BaseNode` helper that concrete nodes embed
//! rather than inherit from.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ims_rtp_core::queue::DataQueue;

use crate::descriptor::PacketDescriptor;

/// A node's inbound mailbox: front nodes push descriptors in, the node's
/// own `process_data` drains them.
pub type DescriptorQueue = DataQueue<PacketDescriptor>;

/// Shared plumbing every node needs: a name for logging/diagnostics, an
/// inbound queue the front node feeds (`OnDataFromFrontNode`), and the set
/// of rear nodes this one forwards to (`SendDataToRearNode`).
pub struct BaseNode {
    name: String,
    input: Arc<DescriptorQueue>,
    rear: Mutex<Vec<Arc<DescriptorQueue>>>,
    running: AtomicBool,
}

impl BaseNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Arc::new(DescriptorQueue::new()),
            rear: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue a front node pushes into to hand this node data
    /// (`OnDataFromFrontNode`).
    pub fn input_queue(&self) -> Arc<DescriptorQueue> {
        self.input.clone()
    }

    /// Wires this node's output to a rear node's input queue. A node may
    /// have more than one rear (e.g. an RTCP compound-packet encoder feeding
    /// both the socket writer and a local statistics sink).
    pub fn connect_rear(&self, rear_input: Arc<DescriptorQueue>) {
        self.rear.lock().push(rear_input);
    }

    /// `SendDataToRearNode`: pushes one descriptor to every connected rear
    /// node. Cloning `PacketDescriptor` is cheap (the payload is a
    /// refcounted `Bytes`).
    pub fn send_to_rear(&self, desc: PacketDescriptor) {
        for q in self.rear.lock().iter() {
            q.add(desc.clone());
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.input.count()
    }

    pub fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Capability set a [`crate::scheduler::StreamScheduler`] drives every
/// registered node through.
pub trait Node: Send {
    fn base(&self) -> &BaseNode;

    /// `IsSourceNode`: self-driven nodes (encoders pacing off a wall clock,
    /// a socket reader blocking on recv) are polled every scheduler tick
    /// regardless of queue depth. Data-driven nodes are only run when their
    /// input queue has a backlog.
    fn is_source(&self) -> bool {
        false
    }

    fn start(&mut self) -> crate::Result<()> {
        self.base().set_running(true);
        Ok(())
    }

    fn stop(&mut self) {
        self.base().set_running(false);
    }

    fn is_running(&self) -> bool {
        self.base().is_running()
    }

    /// One unit of work: for a data-driven node, drain (some of) the input
    /// queue and forward to rear nodes; for a source node, pull/produce one
    /// unit and forward it.
    fn process_data(&mut self) -> crate::Result<()>;

    fn queue_depth(&self) -> usize {
        self.base().queue_depth()
    }

    fn name(&self) -> &str {
        self.base().name()
    }
}
