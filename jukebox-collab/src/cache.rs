use std::{fs, io, path::PathBuf};

use jukebox_core::{Room, RoomId};
use log::warn;

/// Keeps the last known snapshot of every room on disk,
/// so rooms can still be shown while the store is unreachable.
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    /// The platform cache directory, if there is one
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("jukebox"))
    }

    fn path(&self, id: &RoomId) -> PathBuf {
        self.dir.join(format!("room_{id}.json"))
    }

    /// Returns the cached snapshot. Unreadable entries are removed.
    pub fn load(&self, id: &RoomId) -> Option<Room> {
        let path = self.path(id);
        let contents = fs::read_to_string(&path).ok()?;

        match serde_json::from_str(&contents) {
            Ok(room) => Some(room),
            Err(e) => {
                warn!("Removing corrupt cache entry for room {}: {}", id, e);
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    pub fn store(&self, room: &Room) {
        let result = serde_json::to_vec(room)
            .map_err(io::Error::from)
            .and_then(|json| fs::write(self.path(&room.id), json));

        if let Err(e) = result {
            warn!("Could not cache room {}: {}", room.id, e);
        }
    }

    /// Every readable snapshot in the cache, in no particular order.
    pub fn all(&self) -> Vec<Room> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not read the room cache: {}", e);
                return vec![];
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let id = name.to_str()?.strip_prefix("room_")?.strip_suffix(".json")?;

                RoomId::parse(id).ok()
            })
            .filter_map(|id| self.load(&id))
            .collect()
    }

    pub fn remove(&self, id: &RoomId) {
        let _ = fs::remove_file(self.path(id));
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use jukebox_core::{Room, RoomId};

    use super::LocalCache;

    #[test]
    fn stores_and_loads_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path()).unwrap();

        let room = Room::new(RoomId::parse("AB12CD").unwrap(), "Cached", "u1", 5);
        cache.store(&room);

        assert!(dir.path().join("room_AB12CD.json").exists());
        assert_eq!(cache.load(&room.id), Some(room.clone()));

        cache.remove(&room.id);
        assert_eq!(cache.load(&room.id), None);
    }

    #[test]
    fn corrupt_entries_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path()).unwrap();
        let path = dir.path().join("room_AB12CD.json");

        fs::write(&path, "{not json").unwrap();

        assert_eq!(cache.load(&RoomId::parse("ab12cd").unwrap()), None);
        assert!(!path.exists());
    }

    #[test]
    fn lists_every_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path()).unwrap();

        let first = Room::new(RoomId::parse("AB12CD").unwrap(), "First", "u1", 5);
        let second = Room::new(RoomId::parse("ZZ99ZZ").unwrap(), "Second", "u2", 6);
        cache.store(&first);
        cache.store(&second);

        fs::write(dir.path().join("notes.txt"), "unrelated").unwrap();
        fs::write(dir.path().join("room_nope.json"), "{}").unwrap();

        let mut rooms = cache.all();
        rooms.sort_by_key(|room| room.created_at);

        assert_eq!(rooms, vec![first, second]);
    }
}
