//! In-memory ledger implementing both store seams, with fault injection for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::daily_stats::{AggregationWindow, DailyStatsStore};
use crate::error::StoreError;
use crate::model::{Campaign, DailyStat, NewParticipationRecord, ParticipationRecord, ParticipationStatus};
use crate::settlement::{SettlementStore, SettlementTx};

/// Fault counters set to this value never run out.
pub const FOREVER: u32 = u32::MAX;

#[derive(Default)]
struct LedgerState {
    campaigns: HashMap<i64, Campaign>,
    records: Vec<ParticipationRecord>,
    stats: BTreeMap<(i64, NaiveDate), DailyStat>,
    next_record_id: i64,
    clock: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Faults {
    begin_failures: AtomicU32,
    append_failures: AtomicU32,
    reject_appends: AtomicBool,
    stats_unavailable: AtomicBool,
    failing_stats_campaigns: Mutex<HashSet<i64>>,
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
            0 => None,
            FOREVER => Some(FOREVER),
            n => Some(n - 1),
        })
        .is_ok()
}

#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    faults: Arc<Faults>,
    begins: Arc<AtomicU32>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_campaign(&self, id: i64, stock: i64) -> Campaign {
        let now = Utc::now();
        let campaign = Campaign {
            id,
            name: format!("campaign-{id}"),
            total_stock: stock,
            current_stock: stock,
            status: "OPEN".into(),
            created_at: now,
            updated_at: now,
        };
        self.lock().campaigns.insert(id, campaign.clone());
        campaign
    }

    pub fn campaign(&self, id: i64) -> Option<Campaign> {
        self.lock().campaigns.get(&id).cloned()
    }

    pub fn records(&self) -> Vec<ParticipationRecord> {
        self.lock().records.clone()
    }

    pub fn records_for(&self, campaign_id: i64) -> Vec<ParticipationRecord> {
        self.lock().records.iter().filter(|r| r.campaign_id == campaign_id).cloned().collect()
    }

    /// Inserts an already-settled record, bypassing the transactional path.
    pub fn insert_record(&self, record: ParticipationRecord) {
        self.lock().records.push(record);
    }

    pub fn stats(&self) -> Vec<DailyStat> {
        self.lock().stats.values().cloned().collect()
    }

    /// Pins `created_at` for records committed from now on.
    pub fn set_clock(&self, at: DateTime<Utc>) {
        self.lock().clock = Some(at);
    }

    /// Number of `begin` calls, failed ones included.
    pub fn begins(&self) -> u32 {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn fail_next_begins(&self, n: u32) {
        self.faults.begin_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` appends fail as if the connection dropped.
    pub fn fail_next_appends(&self, n: u32) {
        self.faults.append_failures.store(n, Ordering::SeqCst);
    }

    pub fn reject_appends(&self, reject: bool) {
        self.faults.reject_appends.store(reject, Ordering::SeqCst);
    }

    pub fn set_stats_unavailable(&self, unavailable: bool) {
        self.faults.stats_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_stats_for(&self, campaign_id: i64) {
        if let Ok(mut set) = self.faults.failing_stats_campaigns.lock() {
            set.insert(campaign_id);
        }
    }

    fn stats_fault(&self, campaign_id: Option<i64>) -> Option<StoreError> {
        if self.faults.stats_unavailable.load(Ordering::SeqCst) {
            return Some(StoreError::Unavailable("stats store unavailable".into()));
        }
        let failing = self.faults.failing_stats_campaigns.lock().ok()?;
        let hit = match campaign_id {
            Some(id) => failing.contains(&id),
            None => !failing.is_empty(),
        };
        hit.then(|| StoreError::Unavailable("lock not available".into()))
    }
}

pub struct MemoryTx {
    ledger: MemoryLedger,
    decremented: Vec<i64>,
    appended: Vec<(i64, NewParticipationRecord)>,
}

#[async_trait]
impl SettlementStore for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn SettlementTx>, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        if take(&self.faults.begin_failures) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(Box::new(MemoryTx { ledger: self.clone(), decremented: Vec::new(), appended: Vec::new() }))
    }
}

#[async_trait]
impl SettlementTx for MemoryTx {
    async fn campaign_exists(&mut self, campaign_id: i64) -> Result<bool, StoreError> {
        Ok(self.ledger.lock().campaigns.contains_key(&campaign_id))
    }

    async fn decrement_stock(&mut self, campaign_id: i64) -> Result<bool, StoreError> {
        let mut state = self.ledger.lock();
        let Some(campaign) = state.campaigns.get_mut(&campaign_id) else { return Ok(false) };
        if campaign.current_stock <= 0 {
            return Ok(false);
        }
        campaign.current_stock -= 1;
        self.decremented.push(campaign_id);
        Ok(true)
    }

    async fn append_record(&mut self, record: &NewParticipationRecord) -> Result<i64, StoreError> {
        if take(&self.ledger.faults.append_failures) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        if self.ledger.faults.reject_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("check constraint violated".into()));
        }
        let id = {
            let mut state = self.ledger.lock();
            state.next_record_id += 1;
            state.next_record_id
        };
        self.appended.push((id, record.clone()));
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { ledger, appended, .. } = *self;
        let mut state = ledger.lock();
        let created_at = state.clock.unwrap_or_else(Utc::now);
        for (id, record) in appended {
            state.records.push(ParticipationRecord {
                id,
                campaign_id: record.campaign_id,
                user_id: record.user_id,
                status: record.status.as_str().to_string(),
                broker_partition: record.broker_partition,
                broker_offset: record.broker_offset,
                broker_timestamp: record.broker_timestamp,
                global_sequence: Some(record.global_sequence),
                created_at,
            });
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { ledger, decremented, .. } = *self;
        let mut state = ledger.lock();
        for campaign_id in decremented {
            if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
                campaign.current_stock += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DailyStatsStore for MemoryLedger {
    async fn campaigns_in_window(&self, window: &AggregationWindow) -> Result<Vec<i64>, StoreError> {
        if self.faults.stats_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("stats store unavailable".into()));
        }
        let state = self.lock();
        let mut ids: Vec<i64> = state
            .records
            .iter()
            .filter(|r| r.created_at >= window.start() && r.created_at < window.end())
            .map(|r| r.campaign_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn upsert_window(&self, window: &AggregationWindow, campaign_id: Option<i64>) -> Result<u64, StoreError> {
        if let Some(err) = self.stats_fault(campaign_id) {
            return Err(err);
        }
        let mut state = self.lock();
        let mut totals: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
        for record in state.records.iter().filter(|r| {
            r.created_at >= window.start()
                && r.created_at < window.end()
                && campaign_id.map_or(true, |id| r.campaign_id == id)
        }) {
            let entry = totals.entry(record.campaign_id).or_default();
            match record.status() {
                Some(ParticipationStatus::Success) => entry.0 += 1,
                Some(ParticipationStatus::Fail) => entry.1 += 1,
                None => {}
            }
        }
        let date = window.stats_date();
        for (&id, &(success_count, fail_count)) in &totals {
            state.stats.insert(
                (id, date),
                DailyStat { campaign_id: id, stats_date: date, success_count, fail_count },
            );
        }
        Ok(totals.len() as u64)
    }
}
