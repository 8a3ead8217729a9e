use std::cell::Cell;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{self, Value};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::data::Entry;
use crate::errors::*;

/// Load/save boundary for the shelf file.
///
/// The file holds a JSON array of entry records and is rewritten in full on
/// every save. A file that cannot be read back is treated as an empty shelf
/// and moved aside so the next save does not overwrite it. If it cannot be
/// moved aside either, saving is refused until the next successful load.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    guarded: Cell<bool>,
}

impl Store {
    pub fn new<P: Into<PathBuf>>(path: P) -> Store {
        Store {
            path: path.into(),
            guarded: Cell::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Vec<Entry> {
        self.guarded.set(false);

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No shelf at {}, starting empty", self.path.display());
                return Vec::new();
            }
            Err(e) => {
                warn!("Could not read shelf at {} ({}); starting empty", self.path.display(), e);
                self.quarantine();
                return Vec::new();
            }
        };

        match parse_entries(&bytes) {
            Ok(entries) => {
                debug!("Loaded {} entries from {}", entries.len(), self.path.display());
                entries
            }
            Err(e) => {
                warn!("Shelf at {} is corrupt ({}); starting empty", self.path.display(), e);
                self.quarantine();
                Vec::new()
            }
        }
    }

    pub fn save(&self, entries: &[Entry]) -> Result<()> {
        if self.guarded.get() {
            let cause = io::Error::new(
                io::ErrorKind::Other,
                "the existing file could not be read or moved aside",
            );
            return Err(Error::with_chain(
                cause,
                ErrorKind::PersistenceFailure(self.path.display().to_string()),
            ));
        }

        let records = entries
            .iter()
            .map(Entry::to_record)
            .collect::<Result<Vec<Value>>>()?;
        let text = serde_json::to_string_pretty(&records)?;

        self.write_atomic(text.as_bytes())
            .chain_err(|| ErrorKind::PersistenceFailure(self.path.display().to_string()))?;

        debug!("Saved {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.sibling(".tmp");
        let written = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, &self.path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    fn quarantine(&self) {
        let stamp = format!(".corrupt-{}", OffsetDateTime::now_utc().unix_timestamp());
        let mut backup = self.sibling(&stamp);
        let mut attempt = 0;
        while backup.exists() {
            attempt += 1;
            backup = self.sibling(&format!("{}-{}", stamp, attempt));
        }

        match fs::rename(&self.path, &backup) {
            Ok(()) => warn!("Moved corrupt shelf to {}", backup.display()),
            Err(e) => {
                warn!("Could not move corrupt shelf aside ({}); saving is disabled", e);
                self.guarded.set(true);
            }
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("shelf"));
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

fn parse_entries(bytes: &[u8]) -> Result<Vec<Entry>> {
    let records: Vec<Value> = serde_json::from_slice(bytes)?;
    records.into_iter().map(Entry::from_record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Status;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> Store {
        Store::new(dir.path().join("shelf.json"))
    }

    fn leftovers(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().is_empty());
    }

    #[test]
    fn invalid_json_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "not valid json").unwrap();

        assert!(store.load().is_empty());
    }

    #[test]
    fn bad_record_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"[{"title": "Akira", "author": "Katsuhiro Otomo"}, {"author": "nobody"}]"#,
        )
        .unwrap();

        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "[{\"title\": ").unwrap();

        assert!(store.load().is_empty());

        let names = leftovers(&dir);
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("shelf.json.corrupt-"));
        let kept = fs::read_to_string(dir.path().join(&names[0])).unwrap();
        assert_eq!(kept, "[{\"title\": ");
    }

    #[test]
    fn invalid_utf8_is_corrupt_and_survives_the_next_save() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut original = br#"[{"title": "Berserk", "author": "Kentaro Miura", "notes": ""#.to_vec();
        original.push(0xff);
        original.extend_from_slice(br#""}]"#);
        fs::write(store.path(), &original).unwrap();

        assert!(store.load().is_empty());
        store.save(&[Entry::new("Akira", "Katsuhiro Otomo")]).unwrap();

        let names = leftovers(&dir);
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], "shelf.json");
        assert!(names[1].starts_with("shelf.json.corrupt-"));
        assert_eq!(fs::read(dir.path().join(&names[1])).unwrap(), original);
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn unreadable_path_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir(store.path()).unwrap();
        fs::write(store.path().join("inside"), "keep me").unwrap();

        assert!(store.load().is_empty());

        let names = leftovers(&dir);
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("shelf.json.corrupt-"));
        let kept = dir.path().join(&names[0]).join("inside");
        assert_eq!(fs::read_to_string(kept).unwrap(), "keep me");
    }

    #[test]
    fn save_is_refused_while_guarded() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "[]").unwrap();
        store.guarded.set(true);

        let err = store.save(&[Entry::new("Akira", "Katsuhiro Otomo")]).unwrap_err();
        match *err.kind() {
            ErrorKind::PersistenceFailure(_) => {}
            ref other => panic!("unexpected error: {}", other),
        }
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");

        assert!(store.load().is_empty());
        assert!(!store.guarded.get());
    }

    #[test]
    fn repeated_corruption_keeps_every_backup() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        fs::write(store.path(), "first").unwrap();
        store.load();
        fs::write(store.path(), "second").unwrap();
        store.load();

        let names = leftovers(&dir);
        assert_eq!(names.len(), 2);
        let mut contents: Vec<String> = names
            .iter()
            .map(|n| fs::read_to_string(dir.path().join(n)).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn long_ratings_survive_the_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let entries = vec![
            Entry::new("Akira", "Katsuhiro Otomo").with_rating(Some(7.2316896362404055)),
            Entry::new("Monster", "Naoki Urasawa").with_rating(Some(0.1 + 0.2)),
        ];

        store.save(&entries).unwrap();

        assert_eq!(store.load(), entries);
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir(store.path()).unwrap();
        fs::write(store.path().join("inside"), "").unwrap();

        assert!(store.save(&[Entry::new("Akira", "Katsuhiro Otomo")]).is_err());
        assert_eq!(leftovers(&dir), vec!["shelf.json".to_string()]);
    }

    #[test]
    fn save_then_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let entries = vec![
            Entry::new("Vinland Saga", "Makoto Yukimura").with_status(Status::Reading),
            Entry::new("Akira", "Katsuhiro Otomo").with_rating(Some(8.0)),
            Entry::new("Blame!", "Tsutomu Nihei").with_total_chapters(Some(65)),
        ];

        store.save(&entries).unwrap();

        assert_eq!(store.load(), entries);
        assert_eq!(leftovers(&dir), vec!["shelf.json".to_string()]);
    }

    #[test]
    fn berserk_reloads_with_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let berserk = Entry::new("Berserk", "Kentaro Miura").with_current_chapter(50);

        store.save(&[berserk]).unwrap();
        let reloaded = store.load();

        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].current_chapter(), 50);
        assert_eq!(reloaded[0].status(), Status::PlanToRead);
        assert_eq!(reloaded[0].rating(), None);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("nested").join("deeper").join("shelf.json"));

        store.save(&[Entry::new("Monster", "Naoki Urasawa")]).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn save_overwrites_previous_contents() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&[Entry::new("Monster", "Naoki Urasawa")]).unwrap();
        store.save(&[]).unwrap();

        assert!(store.load().is_empty());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
    }

    #[test]
    fn unwritable_location_is_a_persistence_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let store = Store::new(blocker.join("shelf.json"));

        let err = store.save(&[Entry::new("Monster", "Naoki Urasawa")]).unwrap_err();
        match *err.kind() {
            ErrorKind::PersistenceFailure(ref path) => assert!(path.ends_with("shelf.json")),
            ref other => panic!("unexpected error: {}", other),
        }
    }
}
