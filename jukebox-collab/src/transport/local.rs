use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use jukebox_core::{handle_id, random_base36, Config, Room, RoomId};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle};

use super::{OnChange, Subscription, Transport, TransportError, TransportKind};

handle_id! {
    pub struct ListenerId;
}

type Listeners = Arc<DashMap<RoomId, Vec<Listener>>>;

pub struct Listener {
    id: ListenerId,
    on_change: OnChange,
}

/// Fans room snapshots out to listeners in this process,
/// and to sibling processes through marker files in a shared directory.
pub struct BroadcastRegistry {
    listeners: Listeners,
    markers: Option<MarkerSignal>,
}

/// Writes a short lived file per published snapshot, and watches for the files of others.
struct MarkerSignal {
    dir: PathBuf,
    /// Identifies the writing registry, so it can skip its own markers
    origin: String,
    seq: AtomicU64,
    ttl: Duration,
    scan_interval: Duration,
    scanner: Mutex<Option<JoinHandle<()>>>,
}

/// A parsed `<ROOMID>.<origin>.<seq>.marker` file name
#[derive(Debug, PartialEq)]
struct MarkerName<'a> {
    room_id: &'a str,
    origin: &'a str,
}

impl BroadcastRegistry {
    /// A registry that only reaches listeners in this process.
    pub fn new() -> Self {
        Self {
            listeners: Default::default(),
            markers: None,
        }
    }

    /// A registry that also signals other processes through the given directory.
    pub fn with_markers(dir: impl Into<PathBuf>, config: &Config) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let origin = format!("{}-{}", std::process::id(), random_base36(6));

        Ok(Self {
            listeners: Default::default(),
            markers: Some(MarkerSignal {
                dir,
                origin,
                seq: AtomicU64::new(0),
                ttl: config.marker_ttl(),
                scan_interval: config.marker_scan_interval(),
                scanner: Mutex::new(None),
            }),
        })
    }

    pub fn listen(&self, id: &RoomId, on_change: OnChange) -> ListenerId {
        let listener = Listener {
            id: ListenerId::new(),
            on_change,
        };
        let listener_id = listener.id;

        self.listeners.entry(id.clone()).or_default().push(listener);

        if let Some(markers) = &self.markers {
            markers.ensure_scanner(&self.listeners);
        }

        listener_id
    }

    pub fn unlisten(&self, id: &RoomId, listener_id: ListenerId) {
        if let Some(mut listeners) = self.listeners.get_mut(id) {
            listeners.retain(|l| l.id != listener_id);
        }

        self.listeners.remove_if(id, |_, listeners| listeners.is_empty());
    }

    pub fn listener_count(&self, id: &RoomId) -> usize {
        self.listeners.get(id).map(|l| l.len()).unwrap_or_default()
    }

    /// Delivers a snapshot to every listener of the room, here and in sibling processes.
    pub async fn publish(&self, room: &Room) {
        deliver(&self.listeners, room);

        if let Some(markers) = &self.markers {
            if let Err(e) = markers.write(room).await {
                warn!("Could not signal room {} to other processes: {}", room.id, e);
            }
        }
    }
}

impl Default for BroadcastRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BroadcastRegistry {
    fn drop(&mut self) {
        if let Some(markers) = &self.markers {
            if let Some(scanner) = markers.scanner.lock().take() {
                scanner.abort()
            }
        }
    }
}

fn deliver(listeners: &Listeners, room: &Room) {
    // Callbacks must not run while the map is locked, they may subscribe themselves
    let callbacks: Vec<OnChange> = listeners
        .get(&room.id)
        .map(|l| l.iter().map(|l| l.on_change.clone()).collect())
        .unwrap_or_default();

    for callback in callbacks {
        callback(room.clone());
    }
}

impl MarkerSignal {
    fn ensure_scanner(&self, listeners: &Listeners) {
        let mut scanner = self.scanner.lock();

        if scanner.is_some() {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!("No runtime available, markers from other processes will not be observed");
            return;
        };

        *scanner = Some(handle.spawn(scan_markers(
            self.dir.clone(),
            self.origin.clone(),
            self.scan_interval,
            listeners.clone(),
        )));
    }

    async fn write(&self, room: &Room) -> io::Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}.{}.{}.marker", room.id, self.origin, seq);

        let path = self.dir.join(&name);
        let partial = self.dir.join(format!("{name}.tmp"));

        // Observers only look at complete markers
        tokio::fs::write(&partial, serde_json::to_vec(room)?).await?;
        tokio::fs::rename(&partial, &path).await?;

        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = tokio::fs::remove_file(&path).await;
        });

        Ok(())
    }
}

impl<'a> MarkerName<'a> {
    fn parse(name: &'a str) -> Option<Self> {
        let mut parts = name.split('.');

        let room_id = parts.next()?;
        let origin = parts.next()?;
        parts.next()?.parse::<u64>().ok()?;

        match (parts.next(), parts.next()) {
            (Some("marker"), None) => Some(Self { room_id, origin }),
            _ => None,
        }
    }
}

async fn scan_markers(dir: PathBuf, origin: String, period: Duration, listeners: Listeners) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;

        match scan_once(&dir, &origin, &mut seen).await {
            Ok(rooms) => {
                for room in rooms {
                    deliver(&listeners, &room)
                }
            }
            Err(e) => debug!("Could not scan markers in {}: {}", dir.display(), e),
        }
    }
}

/// Returns the rooms of markers not seen before, and forgets markers that disappeared.
async fn scan_once(dir: &Path, origin: &str, seen: &mut HashSet<String>) -> io::Result<Vec<Room>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut present = HashSet::new();
    let mut rooms = vec![];

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();

        let Some(marker) = MarkerName::parse(&file_name) else {
            continue;
        };

        if marker.origin == origin {
            continue;
        }

        let room_id = marker.room_id.to_string();
        present.insert(file_name.clone());

        if !seen.insert(file_name) {
            continue;
        }

        // The writer may have removed it in the meantime
        let Ok(contents) = tokio::fs::read(entry.path()).await else {
            continue;
        };

        match serde_json::from_slice::<Room>(&contents) {
            Ok(room) if room.id.as_str() == room_id => rooms.push(room),
            Ok(_) => debug!("Ignoring marker with mismatched room id"),
            Err(e) => debug!("Ignoring unreadable marker: {}", e),
        }
    }

    seen.retain(|name| present.contains(name));
    Ok(rooms)
}

/// Subscribes through a [BroadcastRegistry]. Always succeeds.
pub struct LocalTransport {
    registry: Arc<BroadcastRegistry>,
}

impl LocalTransport {
    pub fn new(registry: Arc<BroadcastRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    async fn subscribe(
        &self,
        id: &RoomId,
        on_change: OnChange,
    ) -> Result<Subscription, TransportError> {
        let listener_id = self.registry.listen(id, on_change);

        let registry = self.registry.clone();
        let room_id = id.clone();

        Ok(Subscription::new(id.clone(), TransportKind::Local, move || {
            registry.unlisten(&room_id, listener_id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, time::Duration};

    use jukebox_core::{Config, Room, RoomId};
    use parking_lot::Mutex;

    use super::{scan_once, BroadcastRegistry, LocalTransport, MarkerName};
    use crate::Transport;

    fn room(id: &str) -> Room {
        Room::new(RoomId::parse(id).unwrap(), "Room", "u1", 1)
    }

    fn fast_config() -> Config {
        Config {
            marker_scan_in_millis: 20,
            marker_ttl_in_seconds: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn parses_marker_names() {
        assert_eq!(
            MarkerName::parse("AB12CD.123-4.7.marker"),
            Some(MarkerName {
                room_id: "AB12CD",
                origin: "123-4"
            })
        );

        assert_eq!(MarkerName::parse("AB12CD.123-4.7.marker.tmp"), None);
        assert_eq!(MarkerName::parse("AB12CD.123-4.x.marker"), None);
        assert_eq!(MarkerName::parse("room_AB12CD.json"), None);
    }

    #[tokio::test]
    async fn fans_out_in_process() {
        let registry = Arc::new(BroadcastRegistry::new());
        let transport = LocalTransport::new(registry.clone());
        let received: Arc<Mutex<Vec<String>>> = Default::default();

        let sink = received.clone();
        let a = transport
            .subscribe(
                &room("AB12CD").id,
                Arc::new(move |r: Room| sink.lock().push(format!("a:{}", r.id))),
            )
            .await
            .unwrap();

        let sink = received.clone();
        let _b = transport
            .subscribe(
                &room("AB12CD").id,
                Arc::new(move |r: Room| sink.lock().push(format!("b:{}", r.id))),
            )
            .await
            .unwrap();

        registry.publish(&room("AB12CD")).await;
        registry.publish(&room("ZZZZZZ")).await;

        a.unsubscribe();
        registry.publish(&room("AB12CD")).await;

        assert_eq!(
            *received.lock(),
            vec!["a:AB12CD", "b:AB12CD", "b:AB12CD"]
        );
    }

    #[tokio::test]
    async fn markers_reach_other_registries() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config();

        let writer = BroadcastRegistry::with_markers(dir.path(), &config).unwrap();
        let reader = BroadcastRegistry::with_markers(dir.path(), &config).unwrap();

        let received: Arc<Mutex<Vec<Room>>> = Default::default();
        let sink = received.clone();
        reader.listen(&room("AB12CD").id, Arc::new(move |r: Room| sink.lock().push(r)));

        let mut snapshot = room("AB12CD");
        snapshot.synced_time = 42.;
        writer.publish(&snapshot).await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Delivered once, even though the marker is still there for later scans
        assert_eq!(*received.lock(), vec![snapshot]);
    }

    #[tokio::test]
    async fn own_markers_are_skipped_and_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config();

        let registry = BroadcastRegistry::with_markers(dir.path(), &config).unwrap();
        let other = BroadcastRegistry::with_markers(dir.path(), &config).unwrap();

        registry.publish(&room("AB12CD")).await;
        other.publish(&room("AB12CD")).await;

        let origin = registry.markers.as_ref().unwrap().origin.clone();
        let mut seen = HashSet::new();

        let rooms = scan_once(dir.path(), &origin, &mut seen).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(seen.len(), 1);

        assert!(scan_once(dir.path(), &origin, &mut seen).await.unwrap().is_empty());

        // Markers are removed after their ttl, and then forgotten
        tokio::time::sleep(Duration::from_millis(700)).await;
        scan_once(dir.path(), &origin, &mut seen).await.unwrap();
        assert!(seen.is_empty());
    }
}
