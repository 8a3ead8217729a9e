use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::data::{Entry, EntryId, Status};
use crate::errors::*;
use crate::store::Store;

/// Display orderings for a listing.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum SortKey {
    #[default]
    Title,
    Rating,
    Updated,
}

impl SortKey {
    pub const NAMES: [&'static str; 3] = ["title", "rating", "updated"];
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<SortKey> {
        match s.trim().to_lowercase().as_str() {
            "title" => Ok(SortKey::Title),
            "rating" => Ok(SortKey::Rating),
            "updated" => Ok(SortKey::Updated),
            other => Err(format!("Cannot sort by `{}`", other).into()),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Stats {
    pub total: usize,
    /// `None` when nothing has been rated yet.
    pub average_rating: Option<f64>,
    /// One count per status, in `Status::ALL` order.
    pub by_status: Vec<(Status, usize)>,
}

/// The loaded collection together with the file it came from.
///
/// Every successful mutation is followed by a full save. When the save fails
/// the change stays in memory and the `PersistenceFailure` is returned.
#[derive(Debug)]
pub struct Shelf {
    store: Store,
    entries: Vec<Entry>,
    // `None` once every u32 id has been handed out
    next_id: Option<EntryId>,
}

impl Shelf {
    pub fn open(store: Store) -> Shelf {
        let entries = store.load();
        let mut shelf = Shelf {
            store,
            entries,
            next_id: Some(1),
        };
        shelf.assign_missing_ids();
        shelf
    }

    // Records from older files carry no id; duplicates are renumbered as well.
    fn assign_missing_ids(&mut self) {
        let highest = self.entries.iter().map(Entry::id).max().unwrap_or(0);
        self.next_id = highest.checked_add(1);
        if self.next_id.is_none() {
            self.renumber();
            return;
        }

        let mut seen = HashSet::new();
        let missing: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|&(_, entry)| entry.id() == 0 || !seen.insert(entry.id()))
            .map(|(index, _)| index)
            .collect();

        for &index in &missing {
            match self.take_id() {
                Some(id) => self.entries[index].assign_id(id),
                None => {
                    self.renumber();
                    return;
                }
            }
        }

        if !missing.is_empty() {
            info!("Assigned ids to {} entries", missing.len());
        }
    }

    // Ids are compacted to 1..=n in stored order.
    fn renumber(&mut self) {
        warn!("Entry ids ran out; renumbering {} entries", self.entries.len());
        for (id, entry) in (1..).zip(self.entries.iter_mut()) {
            entry.assign_id(id);
        }
        self.next_id = (self.entries.len() as EntryId).checked_add(1);
    }

    fn take_id(&mut self) -> Option<EntryId> {
        let id = self.next_id?;
        self.next_id = id.checked_add(1);
        Some(id)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    fn position(&self, id: EntryId) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| ErrorKind::NoSuchEntry(id).into())
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.entries)
    }

    pub fn add(&mut self, mut entry: Entry) -> Result<EntryId> {
        let id = self.take_id().ok_or_else(|| Error::from(ErrorKind::IdsExhausted))?;
        entry.assign_id(id);

        debug!("Adding entry {} ({})", id, entry.title());
        self.entries.push(entry);
        self.save()?;
        Ok(id)
    }

    /// Applies `change` to one entry and saves the shelf.
    pub fn update<F>(&mut self, id: EntryId, change: F) -> Result<&Entry>
    where
        F: FnOnce(&mut Entry),
    {
        let index = self.position(id)?;
        change(&mut self.entries[index]);
        debug!("Updated entry {}", id);

        self.save()?;
        Ok(&self.entries[index])
    }

    /// Sets the current chapter. Returns true when a known total has been
    /// reached; with `complete_when_done` the entry is then marked Completed.
    pub fn set_progress(&mut self, id: EntryId, chapter: u32, complete_when_done: bool) -> Result<bool> {
        let entry = self.update(id, |entry| {
            entry.set_current_chapter(chapter);
            if complete_when_done && entry.is_caught_up() {
                entry.set_status(Status::Completed);
            }
        })?;
        Ok(entry.is_caught_up())
    }

    pub fn set_status(&mut self, id: EntryId, status: Status) -> Result<&Entry> {
        self.update(id, |entry| entry.set_status(status))
    }

    /// Rates an entry (clamped by `Entry::set_rating`). Notes are replaced only
    /// when given.
    pub fn rate(&mut self, id: EntryId, rating: f64, notes: Option<String>) -> Result<&Entry> {
        self.update(id, |entry| {
            entry.set_rating(Some(rating));
            if let Some(notes) = notes {
                entry.set_notes(notes);
            }
        })
    }

    pub fn remove(&mut self, id: EntryId) -> Result<Entry> {
        let index = self.position(id)?;
        let removed = self.entries.remove(index);
        debug!("Removed entry {} ({})", id, removed.title());

        self.save()?;
        Ok(removed)
    }

    /// Case-insensitive substring match over title, author and status.
    pub fn search(&self, query: &str) -> Vec<&Entry> {
        let query = query.trim().to_lowercase();
        self.entries()
            .iter()
            .filter(|e| {
                e.title().to_lowercase().contains(&query)
                    || e.author().to_lowercase().contains(&query)
                    || e.status().label().to_lowercase().contains(&query)
            })
            .collect()
    }

    /// A sorted view; the stored order is left alone.
    pub fn sorted(&self, key: SortKey) -> Vec<&Entry> {
        let mut view: Vec<&Entry> = self.entries.iter().collect();
        sort_entries(&mut view, key);
        view
    }

    pub fn stats(&self) -> Stats {
        let ratings: Vec<f64> = self.entries.iter().filter_map(Entry::rating).collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };

        let by_status = Status::ALL
            .iter()
            .map(|&status| {
                let count = self.entries.iter().filter(|e| e.status() == status).count();
                (status, count)
            })
            .collect();

        Stats {
            total: self.entries.len(),
            average_rating,
            by_status,
        }
    }
}

pub fn sort_entries(entries: &mut [&Entry], key: SortKey) {
    match key {
        SortKey::Title => entries.sort_by_key(|e| e.title().to_lowercase()),
        SortKey::Rating => entries.sort_by(|a, b| by_rating_desc(a.rating(), b.rating())),
        SortKey::Updated => entries.sort_by(|a, b| b.last_updated().cmp(&a.last_updated())),
    }
}

// unrated entries go last
fn by_rating_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
