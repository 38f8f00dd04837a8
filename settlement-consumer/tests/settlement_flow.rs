mod support;

use std::sync::Arc;

use common_ledger::memory::FOREVER;
use common_ledger::ParticipationStatus;
use common_observability::encode_text;
use settlement_consumer::{DeadLetterReason, MessageOutcome, WorkerPool};
use support::{garbage, participation, Harness, RecordingAck};

#[tokio::test]
async fn last_unit_goes_to_exactly_one_of_two_users() {
    let h = Harness::new(3);
    h.ledger.add_campaign(1, 1);
    let ack = Arc::new(RecordingAck::default());
    let mut pool = WorkerPool::new(h.processor.clone(), ack.clone(), 1, 16);

    pool.dispatch(participation(0, 0, 1_000, 1, 100)).unwrap();
    pool.dispatch(participation(1, 0, 1_001, 1, 200)).unwrap();
    pool.shutdown().await;

    let records = h.ledger.records_for(1);
    assert_eq!(records.len(), 2);
    let successes = records.iter().filter(|r| r.status == "SUCCESS").count();
    let fails = records.iter().filter(|r| r.status == "FAIL").count();
    assert_eq!((successes, fails), (1, 1));
    let campaign = h.ledger.campaign(1).unwrap();
    assert_eq!(campaign.current_stock, 0);
    assert_eq!(campaign.status, "OPEN");
    assert!(h.dead_letters().is_empty());
}

#[tokio::test]
async fn decode_failures_are_dead_lettered_and_acked_once() {
    let h = Harness::new(3);
    h.ledger.add_campaign(1, 10);
    let ack = Arc::new(RecordingAck::default());
    let mut pool = WorkerPool::new(h.processor.clone(), ack.clone(), 1, 16);

    let messages = vec![
        participation(0, 0, 10, 1, 1),
        garbage(0, 1),
        participation(0, 2, 12, 1, 2),
        garbage(0, 3),
        garbage(0, 4),
    ];
    for m in messages {
        pool.dispatch(m).unwrap();
    }
    pool.shutdown().await;

    let dlq = h.dead_letters();
    assert_eq!(dlq.len(), 3);
    assert!(dlq.iter().all(|e| e["errorReason"] == "DESERIALIZATION_FAILED" && e["errorType"] == "PERMANENT"));
    assert!(dlq.iter().all(|e| e["originalMessage"] == "{not-json"));
    assert_eq!(ack.acks(), vec![(0, 0), (0, 1), (0, 2), (0, 3), (0, 4)]);
    assert_eq!(h.ledger.records_for(1).len(), 2);
}

#[tokio::test]
async fn missing_campaign_is_permanent_and_never_retried() {
    let h = Harness::new(5);
    h.ledger.add_campaign(1, 10);
    let report = h
        .processor
        .process_batch(&[participation(0, 0, 1, 1, 1), participation(0, 1, 2, 99, 2)])
        .await;

    assert_eq!(report.attempts, 1);
    assert!(matches!(report.outcomes[0], MessageOutcome::Settled { status: ParticipationStatus::Success, .. }));
    assert_eq!(report.outcomes[1], MessageOutcome::DeadLettered { reason: DeadLetterReason::CampaignNotFound });
    let dlq = h.dead_letters();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0]["errorReason"], "CAMPAIGN_NOT_FOUND");
    assert!(dlq[0]["originalMessage"].as_str().unwrap().contains("\"campaignId\":99"));
    assert!(h.sleeper.delays.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unrelenting_transient_failure_stops_at_attempt_bound() {
    let h = Harness::new(4);
    h.ledger.add_campaign(1, 10);
    h.ledger.fail_next_begins(FOREVER);

    let report = h.processor.process_batch(&[participation(0, 7, 1, 1, 1)]).await;

    assert_eq!(report.attempts, 4);
    assert_eq!(h.ledger.begins(), 4);
    assert_eq!(h.sleeper.delays.lock().unwrap().len(), 3);
    assert_eq!(report.outcomes, vec![MessageOutcome::DeadLettered { reason: DeadLetterReason::RetriesExhausted }]);
    let dlq = h.dead_letters();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0]["errorReason"], "RETRIES_EXHAUSTED");
    assert_eq!(dlq[0]["errorType"], "TRANSIENT");
    assert_eq!(h.ledger.campaign(1).unwrap().current_stock, 10);
}

#[tokio::test]
async fn transient_failure_that_clears_keeps_first_sequence() {
    let h = Harness::new(3);
    h.ledger.add_campaign(1, 10);
    h.ledger.fail_next_appends(1);

    let report = h.processor.process_batch(&[participation(0, 0, 1, 1, 1)]).await;

    assert_eq!(report.attempts, 2);
    assert_eq!(
        report.outcomes,
        vec![MessageOutcome::Settled { status: ParticipationStatus::Success, global_sequence: 1 }]
    );
    assert_eq!(h.sequence.current(), 1);
    assert_eq!(h.ledger.campaign(1).unwrap().current_stock, 9);
    let records = h.ledger.records_for(1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].global_sequence, Some(1));
    assert!(h.dead_letters().is_empty());
}

#[tokio::test]
async fn rejected_batch_rolls_back_and_dead_letters_as_a_unit() {
    let h = Harness::new(3);
    h.ledger.add_campaign(1, 10);
    h.ledger.reject_appends(true);

    let batch = vec![
        participation(2, 0, 1, 1, 1),
        participation(2, 1, 2, 1, 2),
        garbage(2, 2),
        participation(2, 3, 4, 1, 3),
    ];
    let report = h.processor.process_batch(&batch).await;

    assert_eq!(report.attempts, 1);
    assert_eq!(report.dead_lettered(), 4);
    assert_eq!(h.ledger.campaign(1).unwrap().current_stock, 10);
    assert!(h.ledger.records().is_empty());

    let dlq = h.dead_letters();
    assert_eq!(dlq.len(), 2);
    let batch_env = dlq.iter().find(|e| e.get("batchSize").is_some()).unwrap();
    assert_eq!(batch_env["batchSize"], 3);
    assert_eq!(batch_env["errorReason"], "STORE_REJECTED");
    assert_eq!(batch_env["originalMessages"].as_array().unwrap().len(), 3);
    assert!(dlq.iter().any(|e| e["errorReason"] == "DESERIALIZATION_FAILED"));

    let text = encode_text(&h.processor.metrics().registry).unwrap();
    assert!(text.contains("settlement_dead_letters_total{reason=\"STORE_REJECTED\"} 3"));
    assert!(text.contains("settlement_dead_letters_total{reason=\"DESERIALIZATION_FAILED\"} 1"));
}

#[tokio::test]
async fn batch_is_acked_once_through_its_last_offset() {
    let h = Harness::new(3);
    h.ledger.add_campaign(1, 100);
    let ack = Arc::new(RecordingAck::default());
    let mut pool = WorkerPool::new(h.processor.clone(), ack.clone(), 50, 64);
    for offset in 0..20 {
        pool.dispatch(participation(3, offset, offset, 1, offset)).unwrap();
    }
    pool.shutdown().await;

    let acks = ack.acks();
    assert!(!acks.is_empty());
    assert!(acks.windows(2).all(|w| w[0].1 < w[1].1));
    assert_eq!(acks.last(), Some(&(3, 19)));
    assert_eq!(h.ledger.records_for(1).len(), 20);
}

#[tokio::test]
async fn dead_letter_publish_failure_does_not_block_ack() {
    let h = Harness::new(3);
    h.sink.set_failing(true);
    let ack = Arc::new(RecordingAck::default());
    let mut pool = WorkerPool::new(h.processor.clone(), ack.clone(), 1, 4);
    pool.dispatch(garbage(0, 0)).unwrap();
    pool.dispatch(garbage(0, 1)).unwrap();
    pool.shutdown().await;

    assert_eq!(ack.acks(), vec![(0, 0), (0, 1)]);
    assert_eq!(h.processor.metrics().dead_letter_publish_failures.get(), 2);
}
