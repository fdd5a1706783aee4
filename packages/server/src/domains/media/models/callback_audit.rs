use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use crate::common::{MediaBatchId, ProcessingJobId};

/// Raw processing callback kept for audit, with what the engine made of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAudit {
    pub job_id: Option<ProcessingJobId>,
    pub batch_id: Option<MediaBatchId>,
    pub execution_arn: Option<String>,
    pub status: String,
    pub outcome: String,
    pub raw_body: String,
    pub received_at: DateTime<Utc>,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl CallbackAudit {
    pub async fn insert(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO media_callback_audit
                (job_id, batch_id, execution_arn, status, outcome, raw_body, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(self.job_id)
        .bind(self.batch_id)
        .bind(&self.execution_arn)
        .bind(&self.status)
        .bind(&self.outcome)
        .bind(&self.raw_body)
        .bind(self.received_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Whether this pipeline execution already changed the job's batch.
    pub async fn was_applied(
        job_id: ProcessingJobId,
        execution_arn: &str,
        conn: &mut PgConnection,
    ) -> Result<bool> {
        let seen: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM media_callback_audit
                WHERE job_id = $1 AND execution_arn = $2 AND outcome IN ('applied', 'retrying')
            )
            "#,
        )
        .bind(job_id)
        .bind(execution_arn)
        .fetch_one(conn)
        .await?;
        Ok(seen)
    }
}
