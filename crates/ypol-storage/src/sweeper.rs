//! Transactional removal of expired or closed policies and everything that references them.

use chrono::NaiveDate;
use sqlx::{Any, AnyPool, Row, Transaction};
use tracing::{info, warn};
use ypol_core::{codes, is_sweep_candidate, SweepReport};

use crate::repository::{placeholders, PolicyRepository, RepositoryError};

pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 1000;

/// Tables emptied for each id batch, children before the parent.
const DELETE_ORDER: [(&str, &str); 3] = [
    ("policy_comments", "policy_id"),
    ("policy_ratings", "policy_id"),
    ("policies", "id"),
];

#[derive(Debug, Clone)]
pub struct LifecycleSweeper {
    pool: AnyPool,
    batch_size: usize,
}

impl LifecycleSweeper {
    pub fn new(repository: &PolicyRepository) -> Self {
        Self {
            pool: repository.pool().clone(),
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Delete every stored policy that is closed or whose application window ended before
    /// `today`, together with its comments and ratings. All-or-nothing: any failure rolls
    /// back the whole sweep.
    pub async fn sweep_expired(&self, today: NaiveDate) -> Result<SweepReport, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let outcome = self.sweep_in(&mut tx, today).await;
        match outcome {
            Ok(report) => {
                tx.commit().await?;
                Ok(report)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "sweep rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn sweep_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        today: NaiveDate,
    ) -> Result<SweepReport, RepositoryError> {
        let ids = expired_policy_ids(tx, today).await?;
        if ids.is_empty() {
            info!(%today, "no expired policies to sweep");
            return Ok(SweepReport::default());
        }

        let mut report = SweepReport::default();
        for (batch_no, batch) in ids.chunks(self.batch_size).enumerate() {
            let mut deleted = [0u64; 3];
            for (slot, (table, column)) in DELETE_ORDER.iter().enumerate() {
                deleted[slot] = delete_where_in(tx, table, column, batch).await?;
            }
            report.deleted_comments += deleted[0];
            report.deleted_ratings += deleted[1];
            report.deleted_policies += deleted[2];
            info!(
                batch_no,
                ids = batch.len(),
                comments = deleted[0],
                ratings = deleted[1],
                policies = deleted[2],
                "swept batch"
            );
        }
        Ok(report)
    }
}

async fn expired_policy_ids(
    tx: &mut Transaction<'static, Any>,
    today: NaiveDate,
) -> Result<Vec<i64>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT id, aply_prd_se_cd, aply_ymd
          FROM policies
         WHERE aply_prd_se_cd IN ($1, $2, $3, $4)
         ORDER BY id
        "#,
    )
    .bind(codes::CLOSED_LABEL)
    .bind(codes::APPLY_CLOSED)
    .bind(codes::WINDOW_LABEL)
    .bind(codes::APPLY_WINDOW)
    .fetch_all(&mut **tx)
    .await?;

    let mut ids = Vec::new();
    for row in rows {
        let period: Option<String> = row.try_get("aply_prd_se_cd")?;
        let apply_ymd: Option<String> = row.try_get("aply_ymd")?;
        if is_sweep_candidate(period.as_deref(), apply_ymd.as_deref(), today) {
            ids.push(row.try_get("id")?);
        }
    }
    Ok(ids)
}

async fn delete_where_in(
    tx: &mut Transaction<'static, Any>,
    table: &str,
    column: &str,
    ids: &[i64],
) -> Result<u64, RepositoryError> {
    let sql = format!(
        "DELETE FROM {table} WHERE {column} IN ({})",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    Ok(query.execute(&mut **tx).await?.rows_affected())
}
