use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::AckError;
use crate::message::InboundMessage;
use crate::processor::SettlementProcessor;

/// Commits progress for a partition up to and including `offset`.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, partition: i32, offset: i64) -> Result<(), AckError>;
}

/// Stops and restarts delivery for a single partition while its worker catches up.
pub trait FlowControl: Send + Sync {
    fn pause(&self, partition: i32);
    fn resume(&self, partition: i32);
}

/// For sources that cannot pause. Partition queues then grow without bound.
pub struct NoFlowControl;

impl FlowControl for NoFlowControl {
    fn pause(&self, _partition: i32) {}
    fn resume(&self, _partition: i32) {}
}

#[derive(Default)]
struct LaneState {
    queued: usize,
    paused: bool,
}

/// Queue depth bookkeeping for one partition. Intake is paused at `high_water` queued
/// messages and resumed once the worker has taken the queue down to half of that.
struct Lane {
    partition: i32,
    high_water: usize,
    flow: Arc<dyn FlowControl>,
    state: Mutex<LaneState>,
}

impl Lane {
    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enqueued(&self) {
        let mut state = self.lock();
        state.queued += 1;
        if !state.paused && state.queued >= self.high_water {
            state.paused = true;
            self.flow.pause(self.partition);
            warn!(partition = self.partition, queued = state.queued, "partition queue full, pausing intake");
        }
    }

    fn taken(&self, count: usize) {
        let mut state = self.lock();
        state.queued = state.queued.saturating_sub(count);
        if state.paused && state.queued <= self.high_water / 2 {
            state.paused = false;
            self.flow.resume(self.partition);
            info!(partition = self.partition, queued = state.queued, "partition queue drained, resuming intake");
        }
    }
}

/// One sequential worker per partition; partitions run in parallel.
///
/// Dispatch never waits on a worker, so a partition whose worker is stuck only stops its own
/// intake (through [`FlowControl`]) and never the delivery of other partitions.
pub struct WorkerPool {
    processor: Arc<SettlementProcessor>,
    acknowledger: Arc<dyn Acknowledger>,
    flow: Arc<dyn FlowControl>,
    batch_size: usize,
    queue_capacity: usize,
    senders: HashMap<i32, (mpsc::UnboundedSender<InboundMessage>, Arc<Lane>)>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        processor: Arc<SettlementProcessor>,
        acknowledger: Arc<dyn Acknowledger>,
        batch_size: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            processor,
            acknowledger,
            flow: Arc::new(NoFlowControl),
            batch_size: batch_size.max(1),
            queue_capacity: queue_capacity.max(1),
            senders: HashMap::new(),
            handles: Vec::new(),
        }
    }

    pub fn with_flow_control(mut self, flow: Arc<dyn FlowControl>) -> Self {
        self.flow = flow;
        self
    }

    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Queues a message on its partition's worker, starting the worker on first sight.
    /// Pauses the partition once its queue reaches capacity.
    pub fn dispatch(&mut self, message: InboundMessage) -> Result<(), InboundMessage> {
        let partition = message.metadata.partition;
        if !self.senders.contains_key(&partition) {
            let lane = self.spawn_worker(partition);
            self.senders.insert(partition, lane);
        }
        let Some((sender, lane)) = self.senders.get(&partition) else {
            return Err(message);
        };
        lane.enqueued();
        sender.send(message).map_err(|e| {
            lane.taken(1);
            e.0
        })
    }

    fn spawn_worker(&mut self, partition: i32) -> (mpsc::UnboundedSender<InboundMessage>, Arc<Lane>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let lane = Arc::new(Lane {
            partition,
            high_water: self.queue_capacity,
            flow: self.flow.clone(),
            state: Mutex::new(LaneState::default()),
        });
        let handle = tokio::spawn(run_partition_worker(
            lane.clone(),
            rx,
            self.processor.clone(),
            self.acknowledger.clone(),
            self.batch_size,
        ));
        self.handles.push(handle);
        info!(partition, "partition worker started");
        (tx, lane)
    }

    /// Stops accepting messages and waits for every queued message to be settled and acked.
    pub async fn shutdown(mut self) {
        self.senders.clear();
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                error!(?err, "partition worker panicked");
            }
        }
    }
}

async fn run_partition_worker(
    lane: Arc<Lane>,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
    processor: Arc<SettlementProcessor>,
    acknowledger: Arc<dyn Acknowledger>,
    batch_size: usize,
) {
    let partition = lane.partition;
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(next) => batch.push(next),
                Err(_) => break,
            }
        }
        lane.taken(batch.len());
        let report = processor.process_batch(&batch).await;
        // Dead-lettered messages are acknowledged like settled ones.
        let Some(last_offset) = batch.iter().map(|m| m.metadata.offset).max() else { continue };
        if let Err(err) = acknowledger.ack(partition, last_offset).await {
            error!(?err, partition, offset = last_offset, "offset commit failed");
            processor.metrics().ack_failures.inc();
        }
        tracing::debug!(
            partition,
            batch = batch.len(),
            attempts = report.attempts,
            dead_lettered = report.dead_lettered(),
            "batch acknowledged"
        );
    }
    info!(partition, "partition worker stopped");
}
