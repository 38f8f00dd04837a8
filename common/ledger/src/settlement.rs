//! Transactional access to the stock ledger and the settlement log.
//!
//! The consumer opens one [`SettlementTx`] per batch; every decrement and append in the
//! batch becomes visible together on `commit` or not at all.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StoreError;
use crate::model::NewParticipationRecord;

#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn SettlementTx>, StoreError>;
}

#[async_trait]
pub trait SettlementTx: Send {
    async fn campaign_exists(&mut self, campaign_id: i64) -> Result<bool, StoreError>;

    /// Takes one unit of stock if any is left. `Ok(false)` means the stock is exhausted.
    async fn decrement_stock(&mut self, campaign_id: i64) -> Result<bool, StoreError>;

    async fn append_record(&mut self, record: &NewParticipationRecord) -> Result<i64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgSettlementStore {
    db: PgPool,
}

impl PgSettlementStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    async fn begin(&self) -> Result<Box<dyn SettlementTx>, StoreError> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgSettlementTx { tx }))
    }
}

pub struct PgSettlementTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SettlementTx for PgSettlementTx {
    async fn campaign_exists(&mut self, campaign_id: i64) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM campaign WHERE id = $1")
            .bind(campaign_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(found.is_some())
    }

    async fn decrement_stock(&mut self, campaign_id: i64) -> Result<bool, StoreError> {
        // Conditional decrement only; never read-then-write the stock column.
        let result = sqlx::query(
            r#"UPDATE campaign
                  SET current_stock = current_stock - 1, updated_at = now()
                WHERE id = $1 AND current_stock > 0"#,
        )
        .bind(campaign_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_record(&mut self, record: &NewParticipationRecord) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO participation_history
                   (campaign_id, user_id, status, broker_partition, broker_offset, broker_timestamp, global_sequence)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id"#,
        )
        .bind(record.campaign_id)
        .bind(record.user_id)
        .bind(record.status.as_str())
        .bind(record.broker_partition)
        .bind(record.broker_offset)
        .bind(record.broker_timestamp)
        .bind(record.global_sequence)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
