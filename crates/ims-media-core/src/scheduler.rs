//! Cooperative stream scheduler (spec.md §4.12 / C12), grounded directly on
//! the original `StreamScheduler`'s run loop: source nodes are polled every
//! tick; among data-driven nodes with a backlog, the one with the largest
//! queue depth runs first (anti-starvation), one node serviced per
//! iteration. A 1ms poll interval and a 1000ms stop-wait timeout match the
//! original's constants.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::node::Node;

const RUN_POLL_INTERVAL: Duration = Duration::from_millis(1);
const STOP_WAIT_TIMEOUT: Duration = Duration::from_millis(1000);

struct Registered {
    id: u64,
    node: Arc<SyncMutex<Box<dyn Node>>>,
}

/// Drives a set of registered nodes on a single background task, the way
/// one `StreamGraph` shares one scheduler thread in the original engine.
pub struct StreamScheduler {
    nodes: SyncMutex<Vec<Registered>>,
    next_id: std::sync::atomic::AtomicU64,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: SyncMutex<Option<JoinHandle<()>>>,
}

impl StreamScheduler {
    pub fn new() -> Self {
        Self {
            nodes: SyncMutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            task: SyncMutex::new(None),
        }
    }

    /// `RegisterNode`.
    pub fn register_node(&self, node: Box<dyn Node>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.nodes.lock().push(Registered { id, node: Arc::new(SyncMutex::new(node)) });
        id
    }

    /// `DeRegisterNode`.
    pub fn deregister_node(&self, id: u64) {
        self.nodes.lock().retain(|r| r.id != id);
    }

    /// Nudges the scheduler to run a pass immediately instead of waiting out
    /// the poll interval (`Awake`), e.g. right after a socket reader enqueues
    /// a freshly arrived packet.
    pub fn awake(&self) {
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// `Start`: spawns the run loop. Starts every registered node first.
    pub fn start(self: &Arc<Self>) -> crate::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for reg in self.nodes.lock().iter() {
            reg.node.lock().start()?;
        }

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            scheduler.run_loop().await;
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn run_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            self.run_registered_nodes();
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(RUN_POLL_INTERVAL) => {}
            }
        }
    }

    /// `RunRegisteredNode`: one scheduling pass. Every source node runs;
    /// among data-driven nodes, only the single busiest one runs, so no node
    /// can starve the rest by queueing indefinitely in one pass.
    fn run_registered_nodes(&self) {
        let nodes = self.nodes.lock();

        for reg in nodes.iter() {
            let mut node = reg.node.lock();
            if node.is_source() && node.is_running() {
                if let Err(err) = node.process_data() {
                    warn!(node = node.name(), error = %err, "source node processing failed");
                }
            }
        }

        let busiest = nodes
            .iter()
            .filter(|r| {
                let n = r.node.lock();
                !n.is_source() && n.is_running() && n.queue_depth() > 0
            })
            .max_by_key(|r| r.node.lock().queue_depth());

        if let Some(reg) = busiest {
            let mut node = reg.node.lock();
            debug!(node = node.name(), depth = node.queue_depth(), "servicing busiest data-driven node");
            if let Err(err) = node.process_data() {
                warn!(node = node.name(), error = %err, "data-driven node processing failed");
            }
        }
    }

    /// `Stop`: signals the run loop to exit and waits up to
    /// [`STOP_WAIT_TIMEOUT`] for it to actually stop before giving up.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.wake.notify_one();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_WAIT_TIMEOUT, handle).await.is_err() {
                warn!("stream scheduler did not stop within the timeout");
            }
        }

        for reg in self.nodes.lock().iter() {
            reg.node.lock().stop();
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }
}

impl Default for StreamScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BaseNode;
    use std::sync::atomic::AtomicUsize;

    struct CountingSourceNode {
        base: BaseNode,
        runs: Arc<AtomicUsize>,
    }

    impl Node for CountingSourceNode {
        fn base(&self) -> &BaseNode {
            &self.base
        }

        fn is_source(&self) -> bool {
            true
        }

        fn process_data(&mut self) -> crate::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn source_node_runs_repeatedly_while_started() {
        let scheduler = Arc::new(StreamScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));
        scheduler.register_node(Box::new(CountingSourceNode { base: BaseNode::new("src"), runs: runs.clone() }));

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.stop().await;

        assert!(runs.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn deregistered_node_stops_being_serviced() {
        let scheduler = Arc::new(StreamScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let id = scheduler.register_node(Box::new(CountingSourceNode { base: BaseNode::new("src"), runs: runs.clone() }));

        scheduler.deregister_node(id);
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.stop().await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
