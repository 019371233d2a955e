use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::services::ConfirmationReconciler;

/// Runs the background expiry loop. Links are also checked on every access, so
/// the sweep only keeps the stored status and merchant listings honest.
pub async fn run_expiry_sweeper(reconciler: Arc<ConfirmationReconciler>, interval: Duration) {
    info!(
        interval_secs = interval.as_secs(),
        "Payment link expiry sweeper started"
    );

    loop {
        sleep(interval).await;

        if let Err(e) = reconciler.sweep_expired(Utc::now()).await {
            error!("Expiry sweep error: {}", e);
        }
    }
}
