//! Read access to persisted alarms and ringtones.
//!
//! The store is owned by the application; the engine only reads from it
//! at fire time and when arming. [`MemoryStore`] keeps everything in memory
//! and can be loaded from a JSON document:
//!
//! ```json
//! {
//!   "alarms": [
//!     { "id": 1, "hour": 6, "minute": 30, "repeat_days": [0, 1, 2, 3, 4],
//!       "ringtone": { "kind": "composed", "value": 3 },
//!       "snooze_minutes": 9, "challenges": ["MATH PROBLEM"] }
//!   ],
//!   "ringtones": [
//!     { "id": 3, "name": "Sunrise", "sequence": "SINE|440|0;SINE|554.37|250" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::audio::ComposedRingtone;
use crate::error::Result;
use crate::types::{AlarmId, AlarmSpec};

#[async_trait]
pub trait AlarmStore: Send + Sync {
    async fn alarm(&self, id: AlarmId) -> Result<Option<AlarmSpec>>;

    async fn alarms(&self) -> Result<Vec<AlarmSpec>>;

    async fn ringtone(&self, id: u32) -> Result<Option<ComposedRingtone>>;
}

/// Ringtone as persisted: the note list in its sequence text form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRingtone {
    pub id: u32,
    pub name: String,
    pub sequence: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub alarms: Vec<AlarmSpec>,
    #[serde(default)]
    pub ringtones: Vec<StoredRingtone>,
}

#[derive(Default)]
pub struct MemoryStore {
    alarms: RwLock<BTreeMap<AlarmId, AlarmSpec>>,
    ringtones: RwLock<BTreeMap<u32, ComposedRingtone>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: StoreDocument) -> Self {
        let store = Self::new();
        for alarm in doc.alarms {
            store.put_alarm(alarm);
        }
        for ringtone in doc.ringtones {
            store.put_ringtone(ComposedRingtone::from_sequence(
                ringtone.id,
                ringtone.name,
                &ringtone.sequence,
            ));
        }
        store
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::from_document(serde_json::from_str(json)?))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    pub fn to_document(&self) -> StoreDocument {
        StoreDocument {
            alarms: self.alarms.read().values().cloned().collect(),
            ringtones: self
                .ringtones
                .read()
                .values()
                .map(|r| StoredRingtone {
                    id: r.id,
                    name: r.name.clone(),
                    sequence: r.sequence(),
                })
                .collect(),
        }
    }

    /// Insert or replace an alarm.
    pub fn put_alarm(&self, alarm: AlarmSpec) {
        self.alarms.write().insert(alarm.id, alarm);
    }

    pub fn remove_alarm(&self, id: AlarmId) -> Option<AlarmSpec> {
        self.alarms.write().remove(&id)
    }

    pub fn put_ringtone(&self, ringtone: ComposedRingtone) {
        self.ringtones.write().insert(ringtone.id, ringtone);
    }
}

#[async_trait]
impl AlarmStore for MemoryStore {
    async fn alarm(&self, id: AlarmId) -> Result<Option<AlarmSpec>> {
        Ok(self.alarms.read().get(&id).cloned())
    }

    async fn alarms(&self) -> Result<Vec<AlarmSpec>> {
        Ok(self.alarms.read().values().cloned().collect())
    }

    async fn ringtone(&self, id: u32) -> Result<Option<ComposedRingtone>> {
        Ok(self.ringtones.read().get(&id).cloned())
    }
}
