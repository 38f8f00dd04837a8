use sqlx::PgPool;

use crate::error::StoreError;
use crate::model::Campaign;

pub async fn fetch_campaign(db: &PgPool, campaign_id: i64) -> Result<Option<Campaign>, StoreError> {
    let campaign = sqlx::query_as::<_, Campaign>(
        r#"SELECT id, name, total_stock, current_stock, status, created_at, updated_at
             FROM campaign WHERE id = $1"#,
    )
    .bind(campaign_id)
    .fetch_optional(db)
    .await?;
    Ok(campaign)
}
