//! Settlement of one batch of participation messages.
//!
//! Per message: decode, resolve the campaign, conditionally decrement its stock and append a
//! settlement record carrying the broker metadata and a fresh global sequence. All decodable
//! messages of a batch share one ledger transaction. Decode failures and missing campaigns
//! are permanent and dead-lettered one by one; a transient store failure rolls the batch back
//! and retries it with backoff, and once the attempts run out (or the store rejects the batch
//! outright) the whole batch goes to the dead-letter topic as a unit.

use std::sync::Arc;
use std::time::Instant;

use common_events::ParticipationEvent;
use common_ledger::{NewParticipationRecord, ParticipationStatus, SettlementStore, SettlementTx};
use common_observability::SettlementMetrics;
use tracing::{debug, warn};

use crate::dead_letter::DeadLetterPublisher;
use crate::error::{DeadLetterReason, SettlementError};
use crate::message::InboundMessage;
use crate::retry::{RetryPolicy, Sleeper};
use crate::sequence::GlobalSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Settled { status: ParticipationStatus, global_sequence: i64 },
    DeadLettered { reason: DeadLetterReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// One entry per input message, in input order.
    pub outcomes: Vec<MessageOutcome>,
    /// Ledger transactions started for this batch; zero when nothing was decodable.
    pub attempts: u32,
}

impl BatchReport {
    pub fn dead_lettered(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, MessageOutcome::DeadLettered { .. })).count()
    }
}

struct Pending {
    index: usize,
    event: ParticipationEvent,
    // Kept across retries so a record never consumes two sequence values.
    sequence: Option<i64>,
}

enum ItemResult {
    Settled { status: ParticipationStatus, sequence: i64 },
    CampaignMissing,
}

pub struct SettlementProcessor {
    store: Arc<dyn SettlementStore>,
    sequence: Arc<GlobalSequence>,
    dead_letters: DeadLetterPublisher,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    metrics: Arc<SettlementMetrics>,
}

impl SettlementProcessor {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        sequence: Arc<GlobalSequence>,
        dead_letters: DeadLetterPublisher,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        metrics: Arc<SettlementMetrics>,
    ) -> Self {
        Self { store, sequence, dead_letters, retry, sleeper, metrics }
    }

    pub fn metrics(&self) -> &Arc<SettlementMetrics> {
        &self.metrics
    }

    pub async fn process_batch(&self, messages: &[InboundMessage]) -> BatchReport {
        let started = Instant::now();
        let mut outcomes: Vec<Option<MessageOutcome>> = vec![None; messages.len()];
        let mut pending = Vec::with_capacity(messages.len());

        for (index, message) in messages.iter().enumerate() {
            match message.decode() {
                Ok(event) => pending.push(Pending { index, event, sequence: None }),
                Err(err) => {
                    let reason = DeadLetterReason::DeserializationFailed;
                    self.dead_letters.single(message, reason, &err.to_string()).await;
                    outcomes[index] = Some(MessageOutcome::DeadLettered { reason });
                }
            }
        }

        let mut attempts = 0;
        if !pending.is_empty() {
            let delays = self.retry.delays();
            loop {
                attempts += 1;
                match self.settle(messages, &mut pending).await {
                    Ok(results) => {
                        for (item, result) in pending.iter().zip(results) {
                            let message = &messages[item.index];
                            outcomes[item.index] = Some(match result {
                                ItemResult::Settled { status, sequence } => {
                                    debug!(
                                        campaign_id = item.event.campaign_id,
                                        user_id = item.event.user_id,
                                        status = status.as_str(),
                                        global_sequence = sequence,
                                        partition = message.metadata.partition,
                                        offset = message.metadata.offset,
                                        "participation settled"
                                    );
                                    MessageOutcome::Settled { status, global_sequence: sequence }
                                }
                                ItemResult::CampaignMissing => {
                                    let reason = DeadLetterReason::CampaignNotFound;
                                    let detail = format!("campaign {} not found", item.event.campaign_id);
                                    self.dead_letters.single(message, reason, &detail).await;
                                    MessageOutcome::DeadLettered { reason }
                                }
                            });
                        }
                        break;
                    }
                    Err(err) if err.is_transient() && attempts < self.retry.max_attempts => {
                        let delay = delays.get(attempts as usize - 1).copied().unwrap_or(self.retry.max_delay);
                        warn!(?err, attempt = attempts, max_attempts = self.retry.max_attempts, ?delay, "transient settlement failure, retrying batch");
                        self.metrics.retries_total.inc();
                        self.sleeper.sleep(delay).await;
                    }
                    Err(err) => {
                        let reason = if err.is_transient() {
                            DeadLetterReason::RetriesExhausted
                        } else {
                            DeadLetterReason::StoreRejected
                        };
                        let group: Vec<&InboundMessage> = pending.iter().map(|p| &messages[p.index]).collect();
                        self.dead_letters.batch(&group, reason, &err.to_string()).await;
                        for item in &pending {
                            outcomes[item.index] = Some(MessageOutcome::DeadLettered { reason });
                        }
                        break;
                    }
                }
            }
        }

        let outcomes: Vec<MessageOutcome> = outcomes
            .into_iter()
            .map(|o| o.unwrap_or(MessageOutcome::DeadLettered { reason: DeadLetterReason::StoreRejected }))
            .collect();
        for outcome in &outcomes {
            let label = match outcome {
                MessageOutcome::Settled { status: ParticipationStatus::Success, .. } => "success",
                MessageOutcome::Settled { status: ParticipationStatus::Fail, .. } => "fail",
                MessageOutcome::DeadLettered { .. } => "dead_lettered",
            };
            self.metrics.messages_total.with_label_values(&[label]).inc();
        }
        self.metrics.global_sequence.set(self.sequence.current());
        self.metrics.batch_duration_seconds.observe(started.elapsed().as_secs_f64());
        BatchReport { outcomes, attempts }
    }

    async fn settle(&self, messages: &[InboundMessage], pending: &mut [Pending]) -> Result<Vec<ItemResult>, SettlementError> {
        let mut tx = self.store.begin().await?;
        match self.apply(tx.as_mut(), messages, pending).await {
            Ok(results) => {
                tx.commit().await?;
                Ok(results)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(?rollback_err, "settlement rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn SettlementTx,
        messages: &[InboundMessage],
        pending: &mut [Pending],
    ) -> Result<Vec<ItemResult>, SettlementError> {
        let mut results = Vec::with_capacity(pending.len());
        for item in pending.iter_mut() {
            let event = item.event;
            if !tx.campaign_exists(event.campaign_id).await? {
                results.push(ItemResult::CampaignMissing);
                continue;
            }
            let status = if tx.decrement_stock(event.campaign_id).await? {
                ParticipationStatus::Success
            } else {
                ParticipationStatus::Fail
            };
            let sequence = *item.sequence.get_or_insert_with(|| self.sequence.next());
            let metadata = messages[item.index].metadata;
            tx.append_record(&NewParticipationRecord {
                campaign_id: event.campaign_id,
                user_id: event.user_id,
                status,
                broker_partition: Some(metadata.partition),
                broker_offset: Some(metadata.offset),
                broker_timestamp: metadata.timestamp_ms,
                global_sequence: sequence,
            })
            .await?;
            results.push(ItemResult::Settled { status, sequence });
        }
        Ok(results)
    }
}
