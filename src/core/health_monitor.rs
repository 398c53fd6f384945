// Background polling of the analysis service's health endpoint

use crate::core::session_controller::SessionController;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct HealthMonitor;

impl HealthMonitor {
    /// Check once now and then every `interval` until `token` is cancelled
    pub fn spawn(
        controller: SessionController,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // A slow service must not hold up cancellation
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = controller.check_backend_health() => {}
                        }
                    }
                }
            }
            debug!("health monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::remote_client::AnalysisService;
    use crate::core::session_controller::tests::ScriptedService;
    use crate::models::pose::PoseFrame;
    use crate::models::remote::{
        AnalyzeResult, HealthStatus, ResetAck, ServiceError, ServiceResult,
    };
    use crate::models::workout::Activity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct FlakyHealth {
        healthy: AtomicBool,
        checks: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisService for FlakyHealth {
        fn session_id(&self) -> &str {
            "session_health"
        }

        async fn analyze(&self, _: &PoseFrame, _: Option<Activity>) -> ServiceResult<AnalyzeResult> {
            Err(ServiceError::Transport("unused".into()))
        }

        async fn reset(&self) -> ServiceResult<ResetAck> {
            Err(ServiceError::Transport("unused".into()))
        }

        async fn health(&self) -> Option<HealthStatus> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.healthy.load(Ordering::SeqCst).then(|| HealthStatus {
                status: "ok".to_string(),
                model_loaded: true,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_immediately_then_on_interval() {
        let service = Arc::new(FlakyHealth::default());
        service.healthy.store(true, Ordering::SeqCst);
        let controller = SessionController::new(service.clone(), 100);
        let token = CancellationToken::new();

        let handle = HealthMonitor::spawn(controller.clone(), Duration::from_secs(30), token.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(service.checks.load(Ordering::SeqCst), 1);
        assert!(controller.snapshot().backend_reachable);

        service.healthy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(service.checks.load(Ordering::SeqCst), 2);
        assert!(!controller.snapshot().backend_reachable);

        token.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(service.checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_slow_check() {
        let service = Arc::new(ScriptedService {
            health_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let controller = SessionController::new(service, 100);
        let token = CancellationToken::new();

        let handle = HealthMonitor::spawn(controller, Duration::from_secs(30), token.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = tokio::time::Instant::now();
        token.cancel();
        handle.await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
