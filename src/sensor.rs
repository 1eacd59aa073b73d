use crate::coordinator::PollCoordinator;
use crate::metric::{MetricDescriptor, MetricKey, DESCRIPTORS};
use crate::platform::{EntityDescription, EntityState, DOMAIN};
use std::sync::Arc;

/// Read-only view of one metric in the coordinator's cached snapshot.
#[derive(Clone)]
pub struct MetricView {
    coordinator: Arc<PollCoordinator>,
    descriptor: &'static MetricDescriptor,
}

impl MetricView {
    pub fn new(coordinator: Arc<PollCoordinator>, key: MetricKey) -> Self {
        Self {
            coordinator,
            descriptor: key.descriptor(),
        }
    }

    /// One view per entry of the descriptor table, all sharing `coordinator`.
    pub fn all(coordinator: &Arc<PollCoordinator>) -> Vec<MetricView> {
        DESCRIPTORS
            .iter()
            .map(|descriptor| MetricView::new(Arc::clone(coordinator), descriptor.key))
            .collect()
    }

    pub fn key(&self) -> MetricKey {
        self.descriptor.key
    }

    pub fn descriptor(&self) -> &'static MetricDescriptor {
        self.descriptor
    }

    pub fn unique_id(&self) -> String {
        format!("{DOMAIN}_{}", self.descriptor.key)
    }

    /// `None` when the key is missing from the snapshot or there is no snapshot.
    pub fn read_value(&self) -> Option<f64> {
        let (snapshot, _) = self.coordinator.read_snapshot();
        snapshot.and_then(|snapshot| snapshot.get(self.descriptor.key))
    }

    pub fn is_available(&self) -> bool {
        self.coordinator.is_available()
    }

    pub fn state(&self) -> EntityState {
        let (snapshot, available) = self.coordinator.read_snapshot();
        EntityState {
            value: snapshot.and_then(|snapshot| snapshot.get(self.descriptor.key)),
            available,
        }
    }

    pub fn description(&self) -> EntityDescription {
        EntityDescription {
            unique_id: self.unique_id(),
            name: self.descriptor.display_name.to_string(),
            unit: self.descriptor.unit.to_string(),
            device_class: self.descriptor.device_class,
            state_class: self.descriptor.state_class,
        }
    }

    /// Asks the shared coordinator for a refresh on this view's behalf.
    pub async fn request_update(&self) {
        self.coordinator.request_refresh().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::{snapshot, ScriptedSource};
    use crate::error::FetchError;
    use crate::metric::{DeviceClass, MetricSnapshot, StateClass};
    use std::sync::atomic::Ordering;

    async fn refreshed(results: Vec<Result<MetricSnapshot, FetchError>>) -> Arc<PollCoordinator> {
        let coordinator = Arc::new(PollCoordinator::new("test", ScriptedSource::new(results)));
        coordinator.request_refresh().await;
        coordinator
    }

    #[tokio::test]
    async fn test_views_cover_all_metrics() {
        let coordinator = refreshed(vec![Ok(MetricSnapshot::new())]).await;
        let views = MetricView::all(&coordinator);
        let keys: Vec<MetricKey> = views.iter().map(MetricView::key).collect();
        assert_eq!(keys, MetricKey::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_read_value_and_missing_key() {
        let coordinator = refreshed(vec![Ok(snapshot(&[(MetricKey::Power, 1234.5)]))]).await;

        let power = MetricView::new(Arc::clone(&coordinator), MetricKey::Power);
        let energy = MetricView::new(Arc::clone(&coordinator), MetricKey::Energy);

        assert_eq!(power.read_value(), Some(1234.5));
        assert!(power.is_available());
        assert_eq!(energy.read_value(), None);
        assert!(energy.is_available());
    }

    #[tokio::test]
    async fn test_empty_snapshot_all_unknown_but_available() {
        let coordinator = refreshed(vec![Ok(MetricSnapshot::new())]).await;
        for view in MetricView::all(&coordinator) {
            assert_eq!(
                view.state(),
                EntityState {
                    value: None,
                    available: true
                }
            );
        }
    }

    #[tokio::test]
    async fn test_never_succeeded_all_unavailable() {
        let coordinator = refreshed(vec![Err(FetchError::Status(503))]).await;
        for view in MetricView::all(&coordinator) {
            assert_eq!(view.read_value(), None);
            assert!(!view.is_available());
        }
    }

    #[tokio::test]
    async fn test_stale_value_kept_but_unavailable() {
        let coordinator = refreshed(vec![
            Ok(snapshot(&[(MetricKey::VoltageL2, 229.8)])),
            Err(FetchError::Status(503)),
        ])
        .await;
        coordinator.request_refresh().await;

        let view = MetricView::new(coordinator, MetricKey::VoltageL2);
        assert_eq!(
            view.state(),
            EntityState {
                value: Some(229.8),
                available: false
            }
        );
    }

    #[tokio::test]
    async fn test_description() {
        let coordinator = refreshed(vec![Ok(MetricSnapshot::new())]).await;
        let description = MetricView::new(coordinator, MetricKey::Energy).description();
        assert_eq!(description.unique_id, "garo_entity_balance_meter_energy");
        assert_eq!(description.name, "Energy Total");
        assert_eq!(description.unit, "Wh");
        assert_eq!(description.device_class, DeviceClass::Energy);
        assert_eq!(description.state_class, StateClass::TotalIncreasing);
    }

    #[tokio::test]
    async fn test_request_update_goes_through_coordinator() {
        let source = ScriptedSource::new(vec![
            Ok(MetricSnapshot::new()),
            Ok(snapshot(&[(MetricKey::CurrentL3, 6.0)])),
        ]);
        let calls = Arc::clone(&source.calls);
        let coordinator = Arc::new(PollCoordinator::new("test", source));
        coordinator.request_refresh().await;

        let view = MetricView::new(Arc::clone(&coordinator), MetricKey::CurrentL3);
        assert_eq!(view.read_value(), None);
        view.request_update().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(view.read_value(), Some(6.0));
    }
}
