//! Daemon wiring: builds every component and owns the background tasks.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use courier_core::retry::ReconnectPolicy;
use courier_gateway::{ConnectionManager, GatewayClient, GatewayConfig};
use courier_queue::EventBroker;
use courier_runtime::{Consumer, Dispatcher, ScheduleWorker};
use courier_settings::CourierSettings;
use courier_store::Store;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The running daemon: store, queue, supervisors, and worker tasks.
pub struct App {
    manager: Arc<ConnectionManager>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    workers: usize,
    shutdown_grace: Duration,
}

impl App {
    /// Build every component from settings and start the background tasks.
    pub fn build(
        settings: &CourierSettings,
        db_path: &Path,
        workers_override: Option<usize>,
    ) -> Result<Self> {
        let store = Arc::new(Store::open(db_path).context("failed to open database")?);
        let broker = Arc::new(EventBroker::new(settings.queue.max_delivery_attempts));
        let client = Arc::new(
            GatewayClient::new(GatewayConfig {
                base_url: settings.gateway.base_url.clone(),
                username: settings.gateway.username.clone(),
                password: settings.gateway.password.clone(),
                connect_timeout: Duration::from_secs(settings.gateway.connect_timeout_secs),
                send_timeout: Duration::from_secs(settings.gateway.send_timeout_secs),
            })
            .context("failed to build gateway client")?,
        );

        let policy = ReconnectPolicy {
            base: Duration::from_secs(settings.reconnect.base_secs),
            cap: Duration::from_secs(settings.reconnect.cap_secs),
            stability_window: Duration::from_secs(settings.reconnect.stability_secs),
            ..ReconnectPolicy::default()
        };
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&client),
            Arc::clone(&broker),
            policy,
        ));

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), Arc::clone(&client)));
        let workers = workers_override
            .unwrap_or(settings.consumer.workers)
            .max(1);
        for _ in 0..workers {
            let consumer = Consumer::new(
                Arc::clone(&store),
                Arc::clone(&broker),
                Arc::clone(&dispatcher),
            );
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { consumer.run(cancel).await }));
        }

        let scheduler = ScheduleWorker::new(
            Arc::clone(&store),
            Arc::clone(&client),
            Duration::from_secs(settings.scheduler.poll_interval_secs.max(1)),
        );
        {
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { scheduler.run(cancel).await }));
        }

        tasks.push(tokio::spawn(reconcile_loop(
            Arc::clone(&store),
            Arc::clone(&manager),
            Duration::from_secs(settings.manager.reconcile_interval_secs.max(1)),
            cancel.clone(),
        )));

        Ok(Self {
            manager,
            cancel,
            tasks,
            workers,
            shutdown_grace: Duration::from_secs(settings.manager.shutdown_grace_secs),
        })
    }

    /// Consumer worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Stop all supervisors and workers.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.manager.shutdown(self.shutdown_grace).await;
        for task in self.tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "worker task panicked");
                }
            }
        }
    }
}

/// Converge the supervisor set to the active-account registry on a fixed
/// cadence. Account registration takes effect within one interval without a
/// restart.
async fn reconcile_loop(
    store: Arc<Store>,
    manager: Arc<ConnectionManager>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match store.list_active_accounts() {
            Ok(accounts) => {
                let desired: Vec<String> = accounts.into_iter().map(|a| a.id).collect();
                info!(count = desired.len(), "reconciling supervisors");
                manager.reconcile(desired).await;
            }
            Err(err) => warn!(error = %err, "could not list active accounts"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> CourierSettings {
        let mut settings = CourierSettings::default();
        // Unreachable gateway: supervisors just cycle their backoff.
        settings.gateway.base_url = "http://127.0.0.1:9".to_string();
        settings.gateway.connect_timeout_secs = 1;
        settings.gateway.send_timeout_secs = 1;
        settings.reconnect.base_secs = 1;
        settings.manager.reconcile_interval_secs = 1;
        settings.manager.shutdown_grace_secs = 1;
        settings
    }

    #[tokio::test]
    async fn builds_and_shuts_down_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("courier.db");
        let app = App::build(&test_settings(), &db_path, Some(2)).unwrap();
        assert_eq!(app.worker_count(), 2);
        assert!(db_path.exists());

        tokio::time::timeout(Duration::from_secs(5), app.shutdown())
            .await
            .expect("shutdown within grace");
    }

    #[tokio::test]
    async fn reconcile_loop_picks_up_registered_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("courier.db");
        let store = Arc::new(Store::open(&db_path).unwrap());
        let account = store.create_account("Test").unwrap();

        let settings = test_settings();
        let client = Arc::new(
            GatewayClient::new(GatewayConfig {
                base_url: settings.gateway.base_url.clone(),
                username: "admin".into(),
                password: String::new(),
                connect_timeout: Duration::from_millis(200),
                send_timeout: Duration::from_millis(200),
            })
            .unwrap(),
        );
        let broker = Arc::new(EventBroker::new(3));
        let manager = Arc::new(ConnectionManager::new(
            client,
            broker,
            ReconnectPolicy::default(),
        ));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(reconcile_loop(
            Arc::clone(&store),
            Arc::clone(&manager),
            Duration::from_millis(50),
            cancel.clone(),
        ));

        for _ in 0..100 {
            if manager.supervised_accounts().contains(&account.id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(manager.supervised_accounts().contains(&account.id));

        // Deactivation drops the supervisor on the next pass.
        let _ = store.deactivate_account(&account.id).unwrap();
        for _ in 0..100 {
            if manager.supervised_accounts().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(manager.supervised_accounts().is_empty());

        cancel.cancel();
        task.await.unwrap();
        manager.shutdown(Duration::from_secs(1)).await;
    }
}
