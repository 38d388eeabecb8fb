use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::tenants::list_tenants;

use super::engine::WorkflowEngine;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub tenants: usize,
    pub expired: u64,
    pub removed: u64,
}

/// Sweeps every tenant on `interval`, expiring overdue workflows and pruning old terminal ones.
pub fn spawn(pool: PgPool, engine: Arc<WorkflowEngine>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = process_tick(&pool, &engine, Utc::now()).await {
                warn!(?err, "workflow maintenance tick failed");
            }
        }
    });
}

pub async fn process_tick(
    pool: &PgPool,
    engine: &WorkflowEngine,
    now: DateTime<Utc>,
) -> Result<MaintenanceReport> {
    let tenants = list_tenants(pool).await?;
    let mut report = MaintenanceReport {
        tenants: tenants.len(),
        ..MaintenanceReport::default()
    };

    // one tenant failing must not hold up the others
    for tenant in &tenants {
        match engine.expire_due(tenant, now).await {
            Ok(expired) => report.expired += expired,
            Err(err) => {
                warn!(err = %err, tenant_id = %tenant.id, "expiring workflows failed");
                continue;
            }
        }
        match engine.cleanup_terminal(tenant, now).await {
            Ok(removed) => report.removed += removed,
            Err(err) => warn!(err = %err, tenant_id = %tenant.id, "workflow cleanup failed"),
        }
    }

    if report.expired > 0 || report.removed > 0 {
        info!(
            tenants = report.tenants,
            expired = report.expired,
            removed = report.removed,
            "workflow maintenance completed"
        );
    } else {
        debug!(tenants = report.tenants, "workflow maintenance found nothing to do");
    }
    Ok(report)
}
