//! ZoneMonitor - polygon zones and the alerts they raise
//!
//! ## Per (zone, subject) state
//!
//! - NotInZone -> InZone: entry recorded, `total_entries` incremented,
//!   one INTRUSION for restricted zones
//! - InZone: one LOITERING once dwell exceeds `max_time_secs`
//! - InZone -> exited: `total_exits` incremented, occupancy discarded
//!
//! OVERCROWD fires on every evaluation while the count exceeds `max_people`.
//! Zones outside their active hours are not evaluated and hold no occupants.

mod geometry;
mod repository;
mod types;

pub use geometry::{area, contains_point};
pub use repository::{ZoneFileStore, ZoneSnapshot};
pub use types::{
    ActiveHours, AlertType, NewZone, SubjectKey, Zone, ZoneEvent, ZoneObject, ZoneOccupancy,
    ZoneStats, ZoneSummary, ZoneType,
};

use crate::error::{Error, Result};
use chrono::{DateTime, Local, Timelike, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Default event log capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Zone plus its live occupancy
struct ZoneEntry {
    zone: Zone,
    occupancy: HashMap<SubjectKey, ZoneOccupancy>,
}

/// ZoneMonitor instance
pub struct ZoneMonitor {
    zones: RwLock<BTreeMap<u64, Arc<Mutex<ZoneEntry>>>>,
    next_zone_id: AtomicU64,
    events: Mutex<VecDeque<ZoneEvent>>,
    next_event_id: AtomicU64,
    event_capacity: usize,
    store: Option<ZoneFileStore>,
}

impl ZoneMonitor {
    /// Monitor without persistence
    pub fn in_memory() -> Self {
        Self::from_snapshot(ZoneSnapshot::default(), None)
    }

    /// Load zones from the store
    pub async fn load(store: ZoneFileStore) -> Result<Self> {
        let snapshot = store.load().await?;
        tracing::info!(path = %store.path().display(), zones = snapshot.zones.len(), "Zones loaded");
        Ok(Self::from_snapshot(snapshot, Some(store)))
    }

    fn from_snapshot(snapshot: ZoneSnapshot, store: Option<ZoneFileStore>) -> Self {
        let max_id = snapshot.zones.iter().map(|z| z.zone_id).max().unwrap_or(0);
        let zones = snapshot
            .zones
            .into_iter()
            .filter(|zone| match validate_zone(zone) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(zone_id = zone.zone_id, name = %zone.name, error = %e, "Dropping invalid stored zone");
                    false
                }
            })
            .map(|mut zone| {
                // Occupancy is not persisted
                zone.current_count = 0;
                (
                    zone.zone_id,
                    Arc::new(Mutex::new(ZoneEntry { zone, occupancy: HashMap::new() })),
                )
            })
            .collect();

        Self {
            zones: RwLock::new(zones),
            next_zone_id: AtomicU64::new(snapshot.next_id.max(max_id + 1)),
            events: Mutex::new(VecDeque::new()),
            next_event_id: AtomicU64::new(1),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            store,
        }
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate and add a zone, then rewrite the store
    pub async fn create_zone(&self, new: NewZone) -> Result<Zone> {
        validate(&new)?;

        let mut zones = self.zones.write().await;
        let zone_id = self.next_zone_id.fetch_add(1, Ordering::SeqCst);
        let zone = Zone {
            zone_id,
            name: new.name,
            zone_type: new.zone_type,
            camera_id: new.camera_id,
            points: new.points,
            max_people: new.max_people,
            max_time_secs: new.max_time_secs,
            active_hours: new.active_hours,
            current_count: 0,
            total_entries: 0,
            total_exits: 0,
            created_at: Utc::now(),
        };
        zones.insert(
            zone_id,
            Arc::new(Mutex::new(ZoneEntry { zone: zone.clone(), occupancy: HashMap::new() })),
        );

        if let Err(e) = self.persist(&zones).await {
            zones.remove(&zone_id);
            return Err(e);
        }

        tracing::info!(zone_id, name = %zone.name, camera_id = %zone.camera_id, "Zone created");
        Ok(zone)
    }

    /// Remove a zone; false when it does not exist
    pub async fn delete_zone(&self, zone_id: u64) -> Result<bool> {
        let mut zones = self.zones.write().await;
        let Some(entry) = zones.remove(&zone_id) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&zones).await {
            zones.insert(zone_id, entry);
            return Err(e);
        }

        tracing::info!(zone_id, "Zone deleted");
        Ok(true)
    }

    async fn persist(&self, zones: &BTreeMap<u64, Arc<Mutex<ZoneEntry>>>) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut snapshot = ZoneSnapshot {
            zones: Vec::with_capacity(zones.len()),
            next_id: self.next_zone_id.load(Ordering::SeqCst),
        };
        for entry in zones.values() {
            snapshot.zones.push(entry.lock().await.zone.clone());
        }
        store.save(&snapshot).await
    }

    /// Zones, optionally for one camera, ordered by id
    pub async fn zones(&self, camera_id: Option<&str>) -> Vec<Zone> {
        let entries: Vec<_> = self.zones.read().await.values().cloned().collect();
        let mut zones = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.lock().await;
            if camera_id.map_or(true, |c| entry.zone.camera_id == c) {
                zones.push(entry.zone.clone());
            }
        }
        zones
    }

    pub async fn get_zone(&self, zone_id: u64) -> Option<Zone> {
        let entry = self.zones.read().await.get(&zone_id).cloned()?;
        let zone = entry.lock().await.zone.clone();
        Some(zone)
    }

    /// Evaluate one zone against the objects of the current batch
    pub async fn update(&self, zone_id: u64, objects: &[ZoneObject], now: DateTime<Utc>) -> Vec<ZoneEvent> {
        let Some(entry) = self.zones.read().await.get(&zone_id).cloned() else {
            return Vec::new();
        };
        let mut entry = entry.lock().await;

        let ZoneEntry { zone, occupancy } = &mut *entry;

        if !is_active_at(zone, now) {
            // Whoever was inside when the window closed is gone for counting purposes
            if !occupancy.is_empty() {
                zone.total_exits += occupancy.len() as u64;
                occupancy.clear();
                zone.current_count = 0;
                tracing::debug!(zone_id, "Zone inactive, occupancy cleared");
            }
            return Vec::new();
        }

        let mut events = Vec::new();
        let mut inside_now: HashSet<SubjectKey> = HashSet::new();

        for obj in objects {
            if !contains_point(&zone.points, obj.bbox.centroid()) {
                continue;
            }
            inside_now.insert(obj.subject.clone());

            match occupancy.get_mut(&obj.subject) {
                None => {
                    occupancy.insert(
                        obj.subject.clone(),
                        ZoneOccupancy { entered_at: now, last_bbox: obj.bbox, loitering_alerted: false },
                    );
                    zone.total_entries += 1;
                    tracing::debug!(zone_id, subject = %obj.subject, "Zone entered");

                    if zone.zone_type == ZoneType::Restricted {
                        events.push(self.new_event(
                            zone,
                            AlertType::Intrusion,
                            Some(obj),
                            format!("{} entered restricted zone {}", obj.class_label, zone.name),
                            now,
                        ));
                    }
                }
                Some(occ) => {
                    occ.last_bbox = obj.bbox;
                    let dwell = (now - occ.entered_at).num_milliseconds() as f64 / 1000.0;
                    if dwell > zone.max_time_secs as f64 && !occ.loitering_alerted {
                        occ.loitering_alerted = true;
                        events.push(self.new_event(
                            zone,
                            AlertType::Loitering,
                            Some(obj),
                            format!(
                                "{} loitering in {} for {:.1} min",
                                obj.class_label,
                                zone.name,
                                dwell / 60.0
                            ),
                            now,
                        ));
                    }
                }
            }
        }

        let before = occupancy.len();
        occupancy.retain(|subject, _| inside_now.contains(subject));
        let exited = before - occupancy.len();
        zone.total_exits += exited as u64;
        zone.current_count = occupancy.len() as u32;

        if zone.current_count > zone.max_people {
            events.push(self.new_event(
                zone,
                AlertType::Overcrowd,
                None,
                format!(
                    "{} people in {} (limit {})",
                    zone.current_count, zone.name, zone.max_people
                ),
                now,
            ));
        }

        if !events.is_empty() {
            self.append_events(&events).await;
        }
        events
    }

    /// Evaluate every zone bound to `camera_id`
    pub async fn process_frame(&self, camera_id: &str, objects: &[ZoneObject], now: DateTime<Utc>) -> Vec<ZoneEvent> {
        let ids: Vec<u64> = self
            .zones(Some(camera_id))
            .await
            .into_iter()
            .map(|z| z.zone_id)
            .collect();

        let mut events = Vec::new();
        for zone_id in ids {
            events.extend(self.update(zone_id, objects, now).await);
        }
        events
    }

    fn new_event(
        &self,
        zone: &Zone,
        alert_type: AlertType,
        subject: Option<&ZoneObject>,
        description: String,
        now: DateTime<Utc>,
    ) -> ZoneEvent {
        let event = ZoneEvent {
            event_id: self.next_event_id.fetch_add(1, Ordering::SeqCst),
            zone_id: zone.zone_id,
            camera_id: zone.camera_id.clone(),
            alert_type,
            subject: subject.map(|o| o.subject.clone()),
            confidence: subject.and_then(|o| o.confidence),
            description,
            timestamp: now,
        };
        tracing::info!(
            zone_id = zone.zone_id,
            alert = %alert_type,
            description = %event.description,
            "Zone alert"
        );
        event
    }

    async fn append_events(&self, events: &[ZoneEvent]) {
        let mut log = self.events.lock().await;
        log.extend(events.iter().cloned());
        while log.len() > self.event_capacity {
            log.pop_front();
        }
    }

    /// Counters for one zone
    pub async fn stats(&self, zone_id: u64, now: DateTime<Utc>) -> Option<ZoneStats> {
        let zone = self.get_zone(zone_id).await?;
        let events_count = self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| e.zone_id == zone_id)
            .count();
        Some(ZoneStats {
            zone_id,
            name: zone.name.clone(),
            zone_type: zone.zone_type,
            current_count: zone.current_count,
            total_entries: zone.total_entries,
            total_exits: zone.total_exits,
            events_count,
            is_active: is_active_at(&zone, now),
        })
    }

    /// Events newer than `hours`, newest first
    pub async fn recent_events(&self, hours: i64, zone_id: Option<u64>, now: DateTime<Utc>) -> Vec<ZoneEvent> {
        let cutoff = now - chrono::Duration::hours(hours);
        let mut events: Vec<ZoneEvent> = self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| e.timestamp > cutoff && zone_id.map_or(true, |z| e.zone_id == z))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.event_id.cmp(&a.event_id)));
        events
    }

    /// Totals over the zones of one camera, or all zones
    pub async fn summary(&self, camera_id: Option<&str>, now: DateTime<Utc>) -> ZoneSummary {
        let zones = self.zones(camera_id).await;
        let zone_ids: HashSet<u64> = zones.iter().map(|z| z.zone_id).collect();
        let events: Vec<ZoneEvent> = self
            .recent_events(24, None, now)
            .await
            .into_iter()
            .filter(|e| zone_ids.contains(&e.zone_id))
            .collect();

        ZoneSummary {
            total_zones: zones.len(),
            active_zones: zones.iter().filter(|z| is_active_at(z, now)).count(),
            total_people: zones.iter().map(|z| z.current_count as u64).sum(),
            events_24h: events.len(),
            intrusions: events.iter().filter(|e| e.alert_type == AlertType::Intrusion).count(),
            loitering: events.iter().filter(|e| e.alert_type == AlertType::Loitering).count(),
        }
    }
}

fn is_active_at(zone: &Zone, now: DateTime<Utc>) -> bool {
    zone.active_hours.contains(now.with_timezone(&Local).hour())
}

/// Stored zones go through the same checks as new ones
fn validate_zone(zone: &Zone) -> Result<()> {
    validate(&NewZone {
        name: zone.name.clone(),
        zone_type: zone.zone_type,
        camera_id: zone.camera_id.clone(),
        points: zone.points.clone(),
        max_people: zone.max_people,
        max_time_secs: zone.max_time_secs,
        active_hours: zone.active_hours,
    })
}

fn validate(new: &NewZone) -> Result<()> {
    if new.name.trim().is_empty() {
        return Err(Error::Validation("zone name is empty".to_string()));
    }
    if new.camera_id.trim().is_empty() {
        return Err(Error::Validation("zone camera_id is empty".to_string()));
    }
    if new.points.len() < 3 {
        return Err(Error::Validation(format!(
            "zone polygon needs at least 3 points, got {}",
            new.points.len()
        )));
    }
    if new.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(Error::Validation("zone polygon has non-finite coordinates".to_string()));
    }
    if area(&new.points) <= f64::EPSILON {
        return Err(Error::Validation("zone polygon has zero area".to_string()));
    }
    if new.max_people == 0 {
        return Err(Error::Validation("max_people must be positive".to_string()));
    }
    if new.max_time_secs == 0 {
        return Err(Error::Validation("max_time_secs must be positive".to_string()));
    }
    if !new.active_hours.is_valid() {
        return Err(Error::Validation(format!(
            "invalid active hours {}-{}",
            new.active_hours.start_hour, new.active_hours.end_hour
        )));
    }
    Ok(())
}
