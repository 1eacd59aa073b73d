//! What the bridge hands to the host automation platform: one device, eight
//! entities, and their states whenever they change.

use crate::coordinator::CoordinatorStatus;
use crate::metric::{DeviceClass, StateClass};
use crate::sensor::MetricView;
use serde_derive::Serialize;
use std::collections::HashMap;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DOMAIN: &str = "garo_entity_balance_meter";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

impl DeviceInfo {
    pub fn for_host(host: &str) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), host.to_string())],
            name: "Garo Entity Balance Meter".to_string(),
            manufacturer: "Garo".to_string(),
            model: "DLB Energy Meter".to_string(),
            sw_version: "1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescription {
    pub unique_id: String,
    pub name: String,
    pub unit: String,
    pub device_class: DeviceClass,
    pub state_class: StateClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntityState {
    /// `None` is reported to the host as "unknown".
    pub value: Option<f64>,
    pub available: bool,
}

/// The host side of the bridge.
pub trait EntityPlatform: Send + 'static {
    fn register(&mut self, device: &DeviceInfo, entities: &[EntityDescription]);
    fn publish(&mut self, unique_id: &str, state: &EntityState);
}

/// Platform that just logs what it is given.
#[derive(Debug, Default)]
pub struct LogPlatform;

impl EntityPlatform for LogPlatform {
    fn register(&mut self, device: &DeviceInfo, entities: &[EntityDescription]) {
        match serde_json::to_string(&entities) {
            Ok(json) => info!(device = %device.name, "registered entities {json}"),
            Err(e) => warn!("failed to render entity registrations: {e}"),
        }
    }

    fn publish(&mut self, unique_id: &str, state: &EntityState) {
        match serde_json::to_string(state) {
            Ok(json) => info!(entity = unique_id, "state {json}"),
            Err(e) => warn!(entity = unique_id, "failed to render state: {e}"),
        }
    }
}

/// Pushes entity states to a platform whenever they change.
pub struct StatePublisher<P> {
    platform: P,
    views: Vec<MetricView>,
    published: HashMap<String, EntityState>,
}

impl<P: EntityPlatform> StatePublisher<P> {
    pub fn new(platform: P, views: Vec<MetricView>) -> Self {
        Self {
            platform,
            views,
            published: HashMap::new(),
        }
    }

    pub fn register(&mut self, device: &DeviceInfo) {
        let descriptions: Vec<EntityDescription> =
            self.views.iter().map(MetricView::description).collect();
        self.platform.register(device, &descriptions);
    }

    /// Publishes every view whose state differs from what was last sent.
    /// Returns how many states were published.
    pub fn publish_changes(&mut self) -> usize {
        let mut count = 0;
        for view in &self.views {
            let unique_id = view.unique_id();
            let state = view.state();
            if self.published.get(&unique_id) == Some(&state) {
                continue;
            }
            self.platform.publish(&unique_id, &state);
            self.published.insert(unique_id, state);
            count += 1;
        }
        count
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Runs until `shutdown` fires, then hands the platform back.
    pub fn spawn(
        mut self,
        mut updates: watch::Receiver<CoordinatorStatus>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> JoinHandle<P> {
        tokio::spawn(async move {
            self.publish_changes();
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let published = self.publish_changes();
                        if published > 0 {
                            debug!(published, "pushed entity updates");
                        }
                    }
                }
            }
            self.platform
        })
    }
}
