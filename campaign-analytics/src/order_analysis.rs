//! Measures how far processing order drifted from broker arrival order for one campaign.
//!
//! Arrival order is `(broker_timestamp, broker_partition, broker_offset)`: partition and
//! offset alone only order records within one partition. Processing order is the global
//! sequence assigned by the consumer. Every pair processed against arrival order counts as
//! one inversion.

use std::collections::BTreeMap;

use common_ledger::{settlement_log, ParticipationRecord, StoreError};
use serde::Serialize;
use sqlx::PgPool;

use crate::inversions::{count_inversions, order_accuracy, total_pairs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    pub user_id: i64,
    pub partition: i32,
    pub offset: i64,
    pub broker_timestamp: i64,
    pub global_sequence: i64,
}

/// Two neighbours in arrival order whose processing order is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationSample {
    pub arrived_first: SampleRecord,
    pub arrived_second: SampleRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAnalysis {
    pub total_records: usize,
    pub analyzed_records: usize,
    /// Records lacking broker metadata or a global sequence.
    pub excluded_records: usize,
    pub inversion_count: u64,
    pub total_pairs: u64,
    pub order_accuracy_percent: f64,
    pub partition_count: usize,
    pub partition_distribution: BTreeMap<i32, usize>,
    /// Inversions inside each partition, with offset order as arrival order.
    pub partition_mismatches: BTreeMap<i32, u64>,
    pub violation_samples: Vec<ViolationSample>,
}

fn qualifying(record: &ParticipationRecord) -> Option<SampleRecord> {
    Some(SampleRecord {
        user_id: record.user_id,
        partition: record.broker_partition?,
        offset: record.broker_offset?,
        broker_timestamp: record.broker_timestamp?,
        global_sequence: record.global_sequence?,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn analyze(records: &[ParticipationRecord], sample_limit: usize) -> OrderAnalysis {
    let mut arrivals: Vec<SampleRecord> = records.iter().filter_map(qualifying).collect();
    let excluded = records.len() - arrivals.len();
    arrivals.sort_by_key(|r| (r.broker_timestamp, r.partition, r.offset));

    let sequences: Vec<i64> = arrivals.iter().map(|r| r.global_sequence).collect();
    let inversion_count = count_inversions(&sequences);
    let pairs = total_pairs(arrivals.len());

    let mut by_partition: BTreeMap<i32, Vec<SampleRecord>> = BTreeMap::new();
    for record in &arrivals {
        by_partition.entry(record.partition).or_default().push(*record);
    }
    let partition_distribution = by_partition.iter().map(|(p, rs)| (*p, rs.len())).collect();
    let partition_mismatches = by_partition
        .iter_mut()
        .map(|(p, rs)| {
            rs.sort_by_key(|r| r.offset);
            let seqs: Vec<i64> = rs.iter().map(|r| r.global_sequence).collect();
            (*p, count_inversions(&seqs))
        })
        .collect();

    let violation_samples = arrivals
        .windows(2)
        .filter(|w| w[0].global_sequence > w[1].global_sequence)
        .take(sample_limit)
        .map(|w| ViolationSample { arrived_first: w[0], arrived_second: w[1] })
        .collect();

    OrderAnalysis {
        total_records: records.len(),
        analyzed_records: arrivals.len(),
        excluded_records: excluded,
        inversion_count,
        total_pairs: pairs,
        order_accuracy_percent: round2(order_accuracy(inversion_count, pairs)),
        partition_count: by_partition.len(),
        partition_distribution,
        partition_mismatches,
        violation_samples,
    }
}

/// Read-only: loads a campaign's settlement log and analyses it.
pub async fn analyze_campaign(db: &PgPool, campaign_id: i64, sample_limit: usize) -> Result<OrderAnalysis, StoreError> {
    let records = settlement_log::records_for_campaign(db, campaign_id).await?;
    tracing::debug!(campaign_id, records = records.len(), "order analysis loaded records");
    Ok(analyze(&records, sample_limit))
}
