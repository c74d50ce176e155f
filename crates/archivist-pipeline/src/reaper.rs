use crate::pipeline::SessionPipeline;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Starts a background loop closing idle sessions every `every`.
///
/// Returns the task handle so the caller can abort it on shutdown.
pub fn spawn_idle_reaper(pipeline: Arc<SessionPipeline>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(every);
        // The first tick completes immediately.
        timer.tick().await;
        loop {
            timer.tick().await;
            let reaped = pipeline.reap_idle(Utc::now()).await;
            if reaped > 0 {
                info!(reaped, "Idle sessions closed");
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use archivist_channels::LocalChannel;
    use archivist_core::OwnerId;
    use archivist_session::InMemorySessionStore;

    #[tokio::test]
    async fn test_reaper_closes_expired_session() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = Arc::new(LocalChannel::new(tmp.path().join("out")));
        let config = PipelineConfig {
            staging_root: tmp.path().join("staging"),
            idle_timeout: Duration::from_secs(60),
            ..PipelineConfig::default()
        };
        let pipeline = Arc::new(SessionPipeline::new(
            config,
            Arc::new(InMemorySessionStore::new(100)),
            channel.clone(),
            channel,
        ));
        // Opened well in the past, so it is already idle.
        pipeline
            .open(OwnerId(1), Utc::now() - chrono::Duration::hours(2))
            .await
            .unwrap();

        let reaper = spawn_idle_reaper(pipeline.clone(), Duration::from_millis(10));
        for _ in 0..100 {
            if !pipeline.has_session(OwnerId(1)).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        reaper.abort();
        assert!(!pipeline.has_session(OwnerId(1)).await);
    }
}
