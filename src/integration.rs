use crate::config::{MeterConfig, MeterOptions};
use crate::coordinator::{PollCoordinator, PollHandle};
use crate::error::SetupError;
use crate::meter_client::{MeterClient, SnapshotSource};
use crate::platform::{DeviceInfo, EntityPlatform, StatePublisher};
use crate::sensor::MetricView;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One configured meter wired up to a host platform.
///
/// Owns the coordinator, its poll timer and the state publisher. Dropping the
/// integration without [`Integration::unload`] still stops the poll timer.
pub struct Integration<P: EntityPlatform> {
    config: MeterConfig,
    coordinator: Arc<PollCoordinator>,
    views: Vec<MetricView>,
    poll: PollHandle,
    publisher_shutdown: oneshot::Sender<()>,
    publisher: JoinHandle<P>,
}

impl<P: EntityPlatform> Integration<P> {
    pub async fn setup(config: MeterConfig, platform: P) -> Result<Self, SetupError> {
        config.validate()?;
        let client = MeterClient::new(&config)?;
        info!(url = client.endpoint_url(), "setting up meter");
        Self::setup_with_source(config, client, platform).await
    }

    /// Sets up against any snapshot source instead of the meter's HTTP endpoint.
    pub async fn setup_with_source(
        config: MeterConfig,
        source: impl SnapshotSource + 'static,
        platform: P,
    ) -> Result<Self, SetupError> {
        config.validate()?;

        let coordinator = Arc::new(PollCoordinator::new(config.host.clone(), source));

        // Views are only handed out once the first refresh has settled
        coordinator.request_refresh().await;
        if !coordinator.is_available() {
            warn!(host = %config.host, "first refresh failed, entities start unavailable");
        }

        let views = MetricView::all(&coordinator);
        let mut publisher = StatePublisher::new(platform, views.clone());
        publisher.register(&DeviceInfo::for_host(&config.host));
        publisher.publish_changes();

        let (publisher_shutdown, shutdown_rx) = oneshot::channel();
        let publisher = publisher.spawn(coordinator.subscribe(), shutdown_rx);
        let poll = coordinator.spawn_polling(config.poll_interval());

        info!(
            host = %config.host,
            entities = views.len(),
            interval_secs = config.scan_interval,
            "meter set up"
        );

        Ok(Self {
            config,
            coordinator,
            views,
            poll,
            publisher_shutdown,
            publisher,
        })
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<PollCoordinator> {
        &self.coordinator
    }

    pub fn views(&self) -> &[MetricView] {
        &self.views
    }

    /// Stops polling and publishing and returns the platform.
    pub async fn unload(self) -> Result<P, SetupError> {
        let Self {
            config,
            poll,
            publisher_shutdown,
            publisher,
            ..
        } = self;

        poll.shutdown().await;
        let _ = publisher_shutdown.send(());
        let platform = publisher.await?;
        info!(host = %config.host, "meter unloaded");
        Ok(platform)
    }

    /// Tears everything down and sets up again from `config`.
    pub async fn reload(self, config: MeterConfig) -> Result<Self, SetupError> {
        let platform = self.unload().await?;
        Self::setup(config, platform).await
    }

    /// Applies edited options on top of the current record and reloads.
    pub async fn apply_options(self, options: &MeterOptions) -> Result<Self, SetupError> {
        let config = self.config.with_options(options);
        config.validate()?;
        self.reload(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::{snapshot, ScriptedSource};
    use crate::coordinator::CoordinatorPhase;
    use crate::error::FetchError;
    use crate::metric::MetricKey;
    use crate::platform::tests::RecordingPlatform;
    use std::sync::atomic::Ordering;

    fn unreachable_config() -> MeterConfig {
        // nothing listens on port 1, so polls fail fast
        let mut config = MeterConfig::new("127.0.0.1:1", "admin", "pw");
        config.scan_interval = 3600;
        config
    }

    #[tokio::test]
    async fn test_setup_refreshes_before_registering() {
        let source = ScriptedSource::new(vec![Ok(snapshot(&[(MetricKey::Power, 1234.5)]))]);
        let calls = Arc::clone(&source.calls);

        let integration = Integration::setup_with_source(
            unreachable_config(),
            source,
            RecordingPlatform::default(),
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(integration.coordinator().phase(), CoordinatorPhase::Ready);
        assert_eq!(integration.views().len(), 8);

        let platform = integration.unload().await.unwrap();
        let device = platform.device.unwrap();
        assert_eq!(device.manufacturer, "Garo");
        assert_eq!(platform.entities.len(), 8);
        assert!(platform.published.contains(&(
            "garo_entity_balance_meter_power".to_string(),
            crate::platform::EntityState {
                value: Some(1234.5),
                available: true
            }
        )));
    }

    #[tokio::test]
    async fn test_setup_with_failing_meter_still_registers() {
        let integration = Integration::setup_with_source(
            unreachable_config(),
            ScriptedSource::new(vec![Err(FetchError::Status(503))]),
            RecordingPlatform::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            integration.coordinator().phase(),
            CoordinatorPhase::FailedNeverSucceeded
        );
        assert!(integration.views().iter().all(|view| !view.is_available()));

        let platform = integration.unload().await.unwrap();
        assert_eq!(platform.entities.len(), 8);
        assert!(platform.published.iter().all(|(_, state)| !state.available));
    }

    #[tokio::test]
    async fn test_setup_rejects_invalid_config() {
        let mut config = unreachable_config();
        config.scan_interval = 0;
        let result = Integration::setup_with_source(
            config,
            ScriptedSource::new(vec![]),
            RecordingPlatform::default(),
        )
        .await;
        assert!(matches!(result, Err(SetupError::Config(_))));
    }

    #[tokio::test]
    async fn test_unload_closes_coordinator() {
        let integration = Integration::setup_with_source(
            unreachable_config(),
            ScriptedSource::new(vec![Ok(snapshot(&[]))]),
            RecordingPlatform::default(),
        )
        .await
        .unwrap();
        let coordinator = Arc::clone(integration.coordinator());

        integration.unload().await.unwrap();
        assert!(coordinator.is_closed());
    }

    #[tokio::test]
    async fn test_apply_options_recreates_coordinator() {
        let integration = Integration::setup(unreachable_config(), RecordingPlatform::default())
            .await
            .unwrap();
        assert_eq!(
            integration.coordinator().phase(),
            CoordinatorPhase::FailedNeverSucceeded
        );
        let old_coordinator = Arc::clone(integration.coordinator());

        let options = MeterOptions {
            scan_interval: Some(7200),
            ignore_tls_errors: Some(false),
            ..Default::default()
        };
        let integration = integration.apply_options(&options).await.unwrap();

        assert!(old_coordinator.is_closed());
        assert!(!Arc::ptr_eq(&old_coordinator, integration.coordinator()));
        assert_eq!(integration.config().scan_interval, 7200);
        assert!(!integration.config().ignore_tls_errors);

        integration.unload().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_invalid_options_rejected() {
        let integration = Integration::setup_with_source(
            unreachable_config(),
            ScriptedSource::new(vec![Ok(snapshot(&[]))]),
            RecordingPlatform::default(),
        )
        .await
        .unwrap();

        let options = MeterOptions {
            scan_interval: Some(0),
            ..Default::default()
        };
        let result = integration.apply_options(&options).await;
        assert!(matches!(result, Err(SetupError::Config(_))));
    }
}
