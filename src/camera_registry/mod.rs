//! CameraRegistry - camera id to CameraConnection
//!
//! ## Responsibilities
//!
//! - Lazily build connections from the configuration source
//! - At most one connection per camera id for the process lifetime
//! - Reconnect handles found disconnected on lookup
//! - Disabled cameras are never connected
//!
//! The map is guarded by a RwLock. Each connection sits behind its own
//! Mutex so a single socket is only driven by one caller at a time.
//! Listing reads each connection's [`ConnectionMonitor`] and never waits on
//! that Mutex. Removing a camera closes its connection, so a loop still
//! holding the handle cannot bring the stream back.

use crate::camera_connection::{
    CameraConnection, CameraInfo, ConnectionConfig, ConnectionMonitor, ConnectionTest,
    StreamBackend,
};
use crate::config_store::CameraConfigSource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Connection shared between the registry and its driving loop
pub type SharedConnection = Arc<Mutex<CameraConnection>>;

struct Entry {
    conn: SharedConnection,
    monitor: ConnectionMonitor,
}

/// CameraRegistry instance
pub struct CameraRegistry {
    connections: RwLock<HashMap<String, Entry>>,
    source: Arc<dyn CameraConfigSource>,
    backend: Arc<dyn StreamBackend>,
    config: ConnectionConfig,
}

impl CameraRegistry {
    pub fn new(
        source: Arc<dyn CameraConfigSource>,
        backend: Arc<dyn StreamBackend>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            source,
            backend,
            config,
        }
    }

    /// Configuration source backing this registry
    pub fn source(&self) -> &Arc<dyn CameraConfigSource> {
        &self.source
    }

    /// Connected handle for a camera, or None when unknown or unreachable
    pub async fn get_or_connect(&self, camera_id: &str) -> Option<SharedConnection> {
        let (conn, created) = self.get_or_create(camera_id, false).await?;

        {
            let mut guard = conn.lock().await;
            if !guard.is_connected() {
                let connected = if created {
                    guard.connect().await
                } else {
                    guard.reconnect().await
                };
                if !connected {
                    tracing::warn!(camera_id = %camera_id, "Camera unavailable");
                    return None;
                }
            }
        }

        Some(conn)
    }

    /// Existing handle without connecting
    pub async fn get(&self, camera_id: &str) -> Option<SharedConnection> {
        self.connections
            .read()
            .await
            .get(camera_id)
            .map(|e| e.conn.clone())
    }

    /// Monitor of a registered handle
    pub async fn monitor(&self, camera_id: &str) -> Option<ConnectionMonitor> {
        self.connections
            .read()
            .await
            .get(camera_id)
            .map(|e| e.monitor.clone())
    }

    /// Latest snapshot of a registered handle
    pub async fn info(&self, camera_id: &str) -> Option<CameraInfo> {
        self.monitor(camera_id).await.map(|m| m.info())
    }

    /// Handle for a camera, creating it from configuration if needed.
    /// The bool is true when this call created the handle.
    async fn get_or_create(
        &self,
        camera_id: &str,
        allow_disabled: bool,
    ) -> Option<(SharedConnection, bool)> {
        if let Some(conn) = self.get(camera_id).await {
            return Some((conn, false));
        }

        let camera = match self.source.get_camera(camera_id).await {
            Ok(Some(camera)) if !camera.enabled && !allow_disabled => {
                tracing::warn!(camera_id = %camera_id, "Camera is disabled");
                return None;
            }
            Ok(Some(camera)) => camera,
            Ok(None) => {
                tracing::warn!(camera_id = %camera_id, "Camera not found in configuration");
                return None;
            }
            Err(e) => {
                tracing::error!(camera_id = %camera_id, error = %e, "Failed to load camera configuration");
                return None;
            }
        };

        // A concurrent caller may have inserted meanwhile; entry() keeps the first
        let mut connections = self.connections.write().await;
        let mut created = false;
        let conn = connections
            .entry(camera_id.to_string())
            .or_insert_with(|| {
                created = true;
                let conn =
                    CameraConnection::new(camera, self.backend.clone(), self.config.clone());
                let monitor = conn.monitor();
                Entry {
                    conn: Arc::new(Mutex::new(conn)),
                    monitor,
                }
            })
            .conn
            .clone();

        if created {
            tracing::info!(camera_id = %camera_id, "Camera added to registry");
        }
        Some((conn, created))
    }

    /// Close and evict. A busy handle releases its stream on the owner's next read.
    pub async fn remove(&self, camera_id: &str) -> bool {
        let removed = self.connections.write().await.remove(camera_id);
        let Some(entry) = removed else {
            return false;
        };

        entry.monitor.close();
        match entry.conn.try_lock() {
            Ok(mut conn) => conn.disconnect().await,
            Err(_) => {
                tracing::debug!(camera_id = %camera_id, "Connection busy, owner will release it");
            }
        }
        tracing::info!(camera_id = %camera_id, "Camera removed from registry");
        true
    }

    /// Connect every enabled camera; returns how many are connected
    pub async fn connect_all(&self) -> usize {
        let cameras = match self.source.list_cameras().await {
            Ok(cameras) => cameras,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list cameras");
                return 0;
            }
        };

        let mut connected = 0;
        for camera in cameras.into_iter().filter(|c| c.enabled) {
            if self.get_or_connect(&camera.camera_id).await.is_some() {
                connected += 1;
            }
        }
        connected
    }

    /// Disconnect every handle (handles stay registered)
    pub async fn disconnect_all(&self) {
        let connections: Vec<_> = self
            .connections
            .read()
            .await
            .values()
            .map(|e| e.conn.clone())
            .collect();
        for conn in connections {
            conn.lock().await.disconnect().await;
        }
    }

    /// Info for every registered handle, from published snapshots
    pub async fn list(&self) -> Vec<CameraInfo> {
        let mut infos: Vec<CameraInfo> = self
            .connections
            .read()
            .await
            .values()
            .map(|e| e.monitor.info())
            .collect();
        infos.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        infos
    }

    /// Run `test_connection` for a camera
    pub async fn test_camera(&self, camera_id: &str) -> ConnectionTest {
        match self.get_or_create(camera_id, true).await {
            Some((conn, _)) => conn.lock().await.test_connection().await,
            None => ConnectionTest {
                success: false,
                message: format!("Camera {} not found", camera_id),
            },
        }
    }

    /// Registered handle count
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_connection::testing::{camera, Script, ScriptedBackend};
    use crate::camera_connection::ConnectFailure;
    use crate::config_store::StaticCameraSource;
    use std::time::Duration;

    fn registry(backend: Arc<ScriptedBackend>) -> CameraRegistry {
        let source = Arc::new(StaticCameraSource::new(vec![camera("cam-1"), camera("cam-2")]));
        CameraRegistry::new(source, backend, ConnectionConfig::default())
    }

    fn steady() -> Script {
        Script::Steady { interval: Duration::from_millis(66) }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_instance_per_camera() {
        let backend = ScriptedBackend::new(vec![steady()]);
        let registry = Arc::new(registry(backend.clone()));

        let (a, b) = tokio::join!(
            registry.get_or_connect("cam-1"),
            registry.get_or_connect("cam-1")
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
        assert_eq!(backend.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_camera_is_none() {
        let registry = registry(ScriptedBackend::new(vec![steady()]));
        assert!(registry.get_or_connect("nope").await.is_none());
        assert!(registry.is_empty().await);

        let test = registry.test_camera("nope").await;
        assert!(!test.success);
        assert!(test.message.contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_camera_is_none_but_registered() {
        let registry = registry(ScriptedBackend::new(vec![Script::Refuse(
            ConnectFailure::Unreachable,
        )]));
        assert!(registry.get_or_connect("cam-1").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_handle_reconnects() {
        let backend = ScriptedBackend::new(vec![steady()]);
        let registry = registry(backend.clone());

        let conn = registry.get_or_connect("cam-1").await.unwrap();
        conn.lock().await.disconnect().await;

        let again = registry.get_or_connect("cam-1").await.unwrap();
        assert!(Arc::ptr_eq(&conn, &again));
        assert!(again.lock().await.is_connected());
        assert_eq!(backend.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_disconnects_and_evicts() {
        let registry = registry(ScriptedBackend::new(vec![steady()]));
        let conn = registry.get_or_connect("cam-2").await.unwrap();

        assert!(registry.remove("cam-2").await);
        assert!(!conn.lock().await.is_connected());
        assert!(registry.get("cam-2").await.is_none());
        assert!(!registry.remove("cam-2").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_camera_is_not_revived_by_its_holder() {
        let backend = ScriptedBackend::new(vec![steady()]);
        let registry = registry(backend.clone());
        let old = registry.get_or_connect("cam-1").await.unwrap();

        // Held by another driver while removed
        let guard = old.lock().await;
        assert!(registry.remove("cam-1").await);
        drop(guard);

        let mut old_conn = old.lock().await;
        assert!(old_conn.is_closed());
        assert!(old_conn.read_frame().await.is_none());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(old_conn.read_frame().await.is_none());
        assert!(!old_conn.is_connected());
        drop(old_conn);

        let fresh = registry.get_or_connect("cam-1").await.unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(backend.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_does_not_wait_on_busy_connection() {
        let registry = registry(ScriptedBackend::new(vec![steady()]));
        let conn = registry.get_or_connect("cam-1").await.unwrap();
        let _busy = conn.lock().await;

        let infos = tokio::time::timeout(Duration::from_millis(10), registry.list())
            .await
            .expect("list blocked on a locked connection");
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].state, crate::camera_connection::ConnectionState::Connected);

        let info = registry.info("cam-1").await.unwrap();
        assert_eq!(info.width, Some(640));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_camera_is_not_connected() {
        let mut off = camera("cam-off");
        off.enabled = false;
        let backend = ScriptedBackend::new(vec![steady()]);
        let source = Arc::new(StaticCameraSource::new(vec![camera("cam-1"), off]));
        let registry = CameraRegistry::new(source, backend.clone(), ConnectionConfig::default());

        assert!(registry.get_or_connect("cam-off").await.is_none());
        assert_eq!(registry.connect_all().await, 1);
        assert_eq!(backend.open_count(), 1);

        // Testing a disabled camera is still allowed
        assert!(registry.test_camera("cam-off").await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_all_and_list() {
        let registry = registry(ScriptedBackend::new(vec![steady()]));
        assert_eq!(registry.connect_all().await, 2);

        let infos = registry.list().await;
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].camera_id, "cam-1");
        assert!(!infos[0].uri.contains("pw"));

        registry.disconnect_all().await;
        assert!(registry
            .list()
            .await
            .iter()
            .all(|i| i.state == crate::camera_connection::ConnectionState::Disconnected));
    }
}
