use std::collections::HashMap;

use tokio::sync::Mutex;

use climate_sync_common::{DeviceSnapshot, StatePayload};

#[derive(Debug, Clone, Default)]
struct EntityRecord {
    payload: Option<StatePayload>,
    online: Option<bool>,
}

/// Last-known state of every entity the bridge listens to.
///
/// State and availability arrive on separate retained topics in either
/// order, so they are stored separately and only combined into a snapshot
/// when read. An entity with no availability message yet counts as online.
#[derive(Debug, Default)]
pub struct StateRegistry {
    entities: Mutex<HashMap<String, EntityRecord>>,
}

/// Interpreted state around one applied message.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub entity_id: String,
    pub old: Option<DeviceSnapshot>,
    pub new: Option<DeviceSnapshot>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply_state_payload(&self, entity_id: &str, payload: StatePayload) -> StateChange {
        let mut entities = self.entities.lock().await;
        let record = entities.entry(entity_id.to_string()).or_default();
        let old = snapshot_of(entity_id, record);
        record.payload = Some(payload);
        let new = snapshot_of(entity_id, record);
        StateChange {
            entity_id: entity_id.to_string(),
            old,
            new,
        }
    }

    pub async fn apply_availability(&self, entity_id: &str, online: bool) -> StateChange {
        let mut entities = self.entities.lock().await;
        let record = entities.entry(entity_id.to_string()).or_default();
        let old = snapshot_of(entity_id, record);
        record.online = Some(online);
        let new = snapshot_of(entity_id, record);
        StateChange {
            entity_id: entity_id.to_string(),
            old,
            new,
        }
    }

    /// `None` until the entity has published at least one state payload.
    pub async fn read_state(&self, entity_id: &str) -> Option<DeviceSnapshot> {
        let entities = self.entities.lock().await;
        entities
            .get(entity_id)
            .and_then(|record| snapshot_of(entity_id, record))
    }
}

fn snapshot_of(entity_id: &str, record: &EntityRecord) -> Option<DeviceSnapshot> {
    let payload = record.payload.as_ref()?;
    Some(DeviceSnapshot::from_payload(
        entity_id,
        payload,
        record.online.unwrap_or(true),
    ))
}
