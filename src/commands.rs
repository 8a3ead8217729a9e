use std::fmt;

use prettytable::{Cell, Row, Table};
use time::format_description::FormatItem;
use time::macros::format_description;

use crate::data::{Entry, EntryId, Status};
use crate::errors::*;
use crate::shelf::{Shelf, SortKey, Stats};

const DATE_FMT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]");

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Add(Entry),
    List(SortKey),
    Search(String),
    Progress {
        id: EntryId,
        chapter: u32,
        complete: bool,
    },
    SetStatus(EntryId, Status),
    Rate {
        id: EntryId,
        rating: f64,
        notes: Option<String>,
    },
    /// `total` is `Some(None)` to forget a known total.
    Edit {
        id: EntryId,
        title: Option<String>,
        author: Option<String>,
        total: Option<Option<u32>>,
    },
    Stats,
    Remove(EntryId),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Command::Add(ref e) => write!(f, "Add '{}' by '{}'", e.title(), e.author()),
            Command::List(ref key) => write!(f, "List entries by {:?}", key),
            Command::Search(ref query) => write!(f, "Search with query '{}'", query),
            Command::Progress { id, chapter, .. } => {
                write!(f, "Set current chapter to {} for entry #{}", chapter, id)
            }
            Command::SetStatus(id, status) => write!(f, "Set status of entry #{} to {}", id, status),
            Command::Rate { id, rating, .. } => write!(f, "Rate entry #{} {}/10", id, rating),
            Command::Edit { id, .. } => write!(f, "Edit entry #{}", id),
            Command::Stats => write!(f, "Show statistics"),
            Command::Remove(id) => write!(f, "Remove entry #{}", id),
        }
    }
}

/// Runs one command against the shelf and returns the message for the user.
/// Listings are printed to stdout as they are built.
pub fn exec_command(shelf: &mut Shelf, command: Command) -> Result<String> {
    match command {
        Command::Add(entry) => do_add(shelf, entry),
        Command::List(key) => do_list(shelf, key),
        Command::Search(ref query) => do_search(shelf, query),
        Command::Progress { id, chapter, complete } => do_progress(shelf, id, chapter, complete),
        Command::SetStatus(id, status) => do_set_status(shelf, id, status),
        Command::Rate { id, rating, notes } => do_rate(shelf, id, rating, notes),
        Command::Edit { id, title, author, total } => do_edit(shelf, id, title, author, total),
        Command::Stats => do_stats(shelf),
        Command::Remove(id) => do_remove(shelf, id),
    }
}

fn do_add(shelf: &mut Shelf, entry: Entry) -> Result<String> {
    let message = format!("Successfully added '{}' by {}", entry.title(), entry.author());
    let id = shelf.add(entry)?;

    Ok(format!("{} (entry #{})", message, id))
}

fn do_list(shelf: &Shelf, key: SortKey) -> Result<String> {
    if shelf.is_empty() {
        return Ok("Your shelf is empty! Add something first.".into());
    }

    print_entries(&shelf.sorted(key));

    Ok("End of List".into())
}

fn do_search(shelf: &Shelf, query: &str) -> Result<String> {
    let results = shelf.search(query);
    if results.is_empty() {
        return Ok(format!("No results found for '{}'", query));
    }

    let n = print_entries(&results);

    Ok(format!("Found {} result(s)", n))
}

fn do_progress(shelf: &mut Shelf, id: EntryId, chapter: u32, complete: bool) -> Result<String> {
    let caught_up = shelf.set_progress(id, chapter, complete)?;

    let mut message = format!("Set current chapter to {} for entry {}", chapter, id);
    if caught_up {
        if complete {
            message.push_str("; marked as Completed");
        } else {
            message.push_str("; you've reached the last chapter (use --complete to mark it Completed)");
        }
    }

    Ok(message)
}

fn do_set_status(shelf: &mut Shelf, id: EntryId, status: Status) -> Result<String> {
    let entry = shelf.set_status(id, status)?;

    Ok(format!("Status of '{}' changed to {}", entry.title(), entry.status()))
}

fn do_rate(shelf: &mut Shelf, id: EntryId, rating: f64, notes: Option<String>) -> Result<String> {
    let entry = shelf.rate(id, rating, notes)?;

    Ok(format!(
        "Rated '{}' {}/10",
        entry.title(),
        format_rating(entry.rating())
    ))
}

fn do_edit(
    shelf: &mut Shelf,
    id: EntryId,
    title: Option<String>,
    author: Option<String>,
    total: Option<Option<u32>>,
) -> Result<String> {
    if title.is_none() && author.is_none() && total.is_none() {
        return Ok(format!("Nothing to change for entry {}", id));
    }

    let entry = shelf.update(id, |entry| {
        if let Some(title) = title {
            entry.set_title(title);
        }
        if let Some(author) = author {
            entry.set_author(author);
        }
        if let Some(total) = total {
            entry.set_total_chapters(total);
        }
    })?;

    Ok(format!(
        "Entry {} is now '{}' by {} ({})",
        id,
        entry.title(),
        entry.author(),
        entry.progress()
    ))
}

fn do_stats(shelf: &Shelf) -> Result<String> {
    if shelf.is_empty() {
        return Ok("No data to show stats for.".into());
    }

    print_stats(&shelf.stats());

    Ok(String::new())
}

fn do_remove(shelf: &mut Shelf, id: EntryId) -> Result<String> {
    let removed = shelf.remove(id)?;

    Ok(format!("Removed '{}' from your shelf", removed.title()))
}

fn status_style(status: Status) -> &'static str {
    match status {
        Status::Reading => "Fb",
        Status::Completed => "Fg",
        Status::OnHold => "Fy",
        Status::Dropped => "Fr",
        Status::PlanToRead => "Fm",
    }
}

fn format_rating(rating: Option<f64>) -> String {
    match rating {
        Some(r) => format!("{:.1}", r),
        None => "N/A".into(),
    }
}

fn format_date(entry: &Entry) -> String {
    entry
        .last_updated()
        .format(DATE_FMT)
        .unwrap_or_else(|_| "?".into())
}

fn entry_row(entry: &Entry) -> Row {
    Row::new(vec![
        Cell::new(&entry.id().to_string()).style_spec("r"),
        Cell::new(entry.title()).style_spec("b"),
        Cell::new(entry.author()).style_spec("Fg"),
        Cell::new(&entry.progress()).style_spec("c"),
        Cell::new(entry.status().label()).style_spec(status_style(entry.status())),
        Cell::new(&format_rating(entry.rating())).style_spec("c"),
        Cell::new(&format_date(entry)),
    ])
}

fn print_entries(entries: &[&Entry]) -> usize {
    let mut table = Table::new();
    table.set_titles(row!["ID", "TITLE", "AUTHOR", "PROGRESS", "STATUS", "RATING", "LAST UPDATED"]);

    for entry in entries {
        table.add_row(entry_row(entry));
    }

    table.printstd();

    entries.len()
}

fn print_stats(stats: &Stats) {
    let mut table = Table::new();
    table.add_row(row!["Total", r->stats.total]);
    table.add_row(row![
        "Average rating",
        r->format!("{:.2}/10", stats.average_rating.unwrap_or(0.0))
    ]);

    for &(status, count) in &stats.by_status {
        table.add_row(Row::new(vec![
            Cell::new(status.label()).style_spec(status_style(status)),
            Cell::new(&count.to_string()).style_spec("r"),
        ]));
    }

    table.printstd();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use tempfile::TempDir;

    fn shelf_in(dir: &TempDir) -> Shelf {
        Shelf::open(Store::new(dir.path().join("shelf.json")))
    }

    #[test]
    fn add_reports_the_new_id() {
        let dir = TempDir::new().unwrap();
        let mut shelf = shelf_in(&dir);

        let msg = exec_command(&mut shelf, Command::Add(Entry::new("Berserk", "Kentaro Miura"))).unwrap();

        assert_eq!(msg, "Successfully added 'Berserk' by Kentaro Miura (entry #1)");
        assert_eq!(shelf.len(), 1);
    }

    #[test]
    fn empty_listing_has_a_hint() {
        let dir = TempDir::new().unwrap();
        let mut shelf = shelf_in(&dir);

        let msg = exec_command(&mut shelf, Command::List(SortKey::Title)).unwrap();
        assert_eq!(msg, "Your shelf is empty! Add something first.");
    }

    #[test]
    fn search_counts_results() {
        let dir = TempDir::new().unwrap();
        let mut shelf = shelf_in(&dir);
        shelf.add(Entry::new("Planetes", "Makoto Yukimura")).unwrap();
        shelf.add(Entry::new("Vinland Saga", "Makoto Yukimura")).unwrap();

        let found = exec_command(&mut shelf, Command::Search("yukimura".into())).unwrap();
        let missing = exec_command(&mut shelf, Command::Search("otomo".into())).unwrap();

        assert_eq!(found, "Found 2 result(s)");
        assert_eq!(missing, "No results found for 'otomo'");
    }

    #[test]
    fn progress_mentions_completion() {
        let dir = TempDir::new().unwrap();
        let mut shelf = shelf_in(&dir);
        let id = shelf
            .add(Entry::new("Blame!", "Tsutomu Nihei").with_total_chapters(Some(65)))
            .unwrap();

        let hint = exec_command(
            &mut shelf,
            Command::Progress { id, chapter: 65, complete: false },
        )
        .unwrap();
        assert!(hint.contains("--complete"));

        let done = exec_command(
            &mut shelf,
            Command::Progress { id, chapter: 65, complete: true },
        )
        .unwrap();
        assert!(done.ends_with("marked as Completed"));
        assert_eq!(shelf.get(id).unwrap().status(), Status::Completed);
    }

    #[test]
    fn rate_reports_clamped_value() {
        let dir = TempDir::new().unwrap();
        let mut shelf = shelf_in(&dir);
        let id = shelf.add(Entry::new("Akira", "Katsuhiro Otomo")).unwrap();

        let msg = exec_command(&mut shelf, Command::Rate { id, rating: 15.0, notes: None }).unwrap();
        assert_eq!(msg, "Rated 'Akira' 10.0/10");
    }

    #[test]
    fn unknown_ids_are_errors() {
        let dir = TempDir::new().unwrap();
        let mut shelf = shelf_in(&dir);

        assert!(exec_command(&mut shelf, Command::Remove(3)).is_err());
        assert!(exec_command(&mut shelf, Command::SetStatus(3, Status::Dropped)).is_err());
    }

    #[test]
    fn edit_changes_only_what_is_given() {
        let dir = TempDir::new().unwrap();
        let mut shelf = shelf_in(&dir);
        let id = shelf
            .add(Entry::new("Blame", "Tsutomu Nihei").with_current_chapter(3).with_total_chapters(Some(65)))
            .unwrap();

        let msg = exec_command(
            &mut shelf,
            Command::Edit { id, title: Some("Blame!".into()), author: None, total: Some(None) },
        )
        .unwrap();

        assert_eq!(msg, "Entry 1 is now 'Blame!' by Tsutomu Nihei (3/?)");
        let unchanged = exec_command(
            &mut shelf,
            Command::Edit { id, title: None, author: None, total: None },
        )
        .unwrap();
        assert_eq!(unchanged, "Nothing to change for entry 1");
    }

    #[test]
    fn remove_names_the_entry() {
        let dir = TempDir::new().unwrap();
        let mut shelf = shelf_in(&dir);
        let id = shelf.add(Entry::new("Akira", "Katsuhiro Otomo")).unwrap();

        let msg = exec_command(&mut shelf, Command::Remove(id)).unwrap();
        assert_eq!(msg, "Removed 'Akira' from your shelf");
        assert!(shelf.is_empty());
    }

    #[test]
    fn display_describes_the_command() {
        assert_eq!(Command::Remove(4).to_string(), "Remove entry #4");
        assert_eq!(
            Command::SetStatus(2, Status::OnHold).to_string(),
            "Set status of entry #2 to On Hold"
        );
    }
}
