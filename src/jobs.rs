use std::time::Duration;

use tokio::{signal, sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info, warn};

use crate::users::service::UserService;

const COUNT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves once SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Waits until the shutdown flag flips (or its sender is gone).
pub async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn report_user_count(users: &UserService) -> Option<i64> {
    match tokio::time::timeout(COUNT_TIMEOUT, users.count_live_users()).await {
        Ok(Ok(count)) => {
            info!(count, "live users");
            Some(count)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "user count failed");
            None
        }
        Err(_) => {
            warn!("user count timed out");
            None
        }
    }
}

/// Logs the live-user count every `every` until shutdown.
pub fn spawn_user_counter(
    users: UserService,
    every: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stop = wait_for_shutdown(shutdown);
        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    report_user_count(&users).await;
                }
            }
        }
        info!("user counter stopped");
    })
}
