#[macro_use]
extern crate clap;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate prettytable;

mod commands;
mod data;
mod errors;
mod shelf;
mod store;

use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use linefeed::{Interface, ReadResult};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use xdg::BaseDirectories;

use commands::{exec_command, Command};
use data::{Entry, Status};
use errors::*;
use shelf::{Shelf, SortKey};
use store::Store;

const NAME: &str = "shelf";
const DATA_FILE: &str = "shelf.json";
const FILE_ENV: &str = "SHELF_FILE";

fn build_app() -> App<'static, 'static> {
    let entry_id = || {
        Arg::with_name("ENTRY_ID")
            .required(true)
            .index(1)
            .help("ID of entry (acquire from `list` or `search`)")
    };

    App::new(NAME)
        .about("Keep track of the comics and manga you are reading")
        .version(crate_version!())
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name("file")
                .long("file")
                .short("f")
                .takes_value(true)
                .global(true)
                .env(FILE_ENV)
                .help("Shelf file to use instead of the one in the XDG data directory"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .global(true)
                .help("More logging (repeat for more)"),
        )
        .subcommand(
            SubCommand::with_name("add")
                .about("add an entry")
                .arg(
                    Arg::with_name("TITLE")
                        .required(true)
                        .index(1)
                        .help("title of the series"),
                )
                .arg(
                    Arg::with_name("AUTHOR")
                        .required(true)
                        .index(2)
                        .help("author of the series"),
                )
                .arg(
                    Arg::with_name("chapter")
                        .long("chapter")
                        .takes_value(true)
                        .default_value("0")
                        .help("chapter you are currently at"),
                )
                .arg(
                    Arg::with_name("total")
                        .long("total")
                        .takes_value(true)
                        .help("total number of chapters, if known"),
                )
                .arg(
                    Arg::with_name("status")
                        .long("status")
                        .takes_value(true)
                        .default_value("plan to read")
                        .help("reading, completed, on hold, dropped or plan to read"),
                )
                .arg(
                    Arg::with_name("notes")
                        .long("notes")
                        .takes_value(true)
                        .help("initial notes"),
                ),
        )
        .subcommand(
            SubCommand::with_name("list").about("list entries").arg(
                Arg::with_name("sort")
                    .long("sort")
                    .takes_value(true)
                    .possible_values(&SortKey::NAMES)
                    .default_value("title")
                    .help("order of the listing"),
            ),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("find entries. case insensitive match on title, author and status")
                .arg(
                    Arg::with_name("QUERY")
                        .required(true)
                        .index(1)
                        .help("search query"),
                ),
        )
        .subcommand(
            SubCommand::with_name("progress")
                .about("set the current chapter of an entry")
                .arg(entry_id())
                .arg(
                    Arg::with_name("CHAPTER")
                        .required(true)
                        .index(2)
                        .help("the chapter you are now at"),
                )
                .arg(
                    Arg::with_name("complete")
                        .long("complete")
                        .help("mark as Completed if this reaches the last chapter"),
                ),
        )
        .subcommand(
            SubCommand::with_name("status")
                .about("change the status of an entry")
                .arg(entry_id())
                .arg(
                    Arg::with_name("STATUS")
                        .required(true)
                        .index(2)
                        .help("reading, completed, on hold, dropped or plan to read"),
                ),
        )
        .subcommand(
            SubCommand::with_name("rate")
                .about("rate and review an entry")
                .setting(AppSettings::AllowNegativeNumbers)
                .arg(entry_id())
                .arg(
                    Arg::with_name("RATING")
                        .required(true)
                        .index(2)
                        .help("rating from 0 to 10, clamped into range"),
                )
                .arg(
                    Arg::with_name("notes")
                        .long("notes")
                        .takes_value(true)
                        .help("replace the notes of this entry"),
                ),
        )
        .subcommand(
            SubCommand::with_name("edit")
                .about("correct the title, author or chapter count of an entry")
                .arg(entry_id())
                .arg(
                    Arg::with_name("title")
                        .long("title")
                        .takes_value(true)
                        .help("new title"),
                )
                .arg(
                    Arg::with_name("author")
                        .long("author")
                        .takes_value(true)
                        .help("new author"),
                )
                .arg(
                    Arg::with_name("total")
                        .long("total")
                        .takes_value(true)
                        .conflicts_with("unknown-total")
                        .help("new total number of chapters"),
                )
                .arg(
                    Arg::with_name("unknown-total")
                        .long("unknown-total")
                        .help("forget the total number of chapters"),
                ),
        )
        .subcommand(
            SubCommand::with_name("stats").about("count entries per status and average rating"),
        )
        .subcommand(
            SubCommand::with_name("remove")
                .about("remove an entry")
                .arg(entry_id()),
        )
        .subcommand(SubCommand::with_name("shell").about("run commands interactively"))
}

fn parse_command(matches: &ArgMatches) -> Result<Option<Command>> {
    let command = match matches.subcommand() {
        ("add", Some(add)) => {
            let total = match add.value_of("total") {
                Some(_) => Some(value_t!(add, "total", u32)?),
                None => None,
            };
            let status: Status = add.value_of("status").unwrap_or_default().parse()?;

            let entry = Entry::new(
                add.value_of("TITLE").unwrap_or_default(),
                add.value_of("AUTHOR").unwrap_or_default(),
            )
                .with_current_chapter(value_t!(add, "chapter", u32)?)
                .with_total_chapters(total)
                .with_status(status)
                .with_notes(add.value_of("notes").unwrap_or_default());

            Command::Add(entry)
        }
        ("list", Some(list)) => {
            Command::List(list.value_of("sort").unwrap_or_default().parse()?)
        }
        ("search", Some(search)) => {
            Command::Search(search.value_of("QUERY").unwrap_or_default().into())
        }
        ("progress", Some(progress)) => {
            Command::Progress {
                id: value_t!(progress, "ENTRY_ID", u32)?,
                chapter: value_t!(progress, "CHAPTER", u32)?,
                complete: progress.is_present("complete"),
            }
        }
        ("status", Some(status)) => {
            Command::SetStatus(
                value_t!(status, "ENTRY_ID", u32)?,
                status.value_of("STATUS").unwrap_or_default().parse()?,
            )
        }
        ("rate", Some(rate)) => {
            Command::Rate {
                id: value_t!(rate, "ENTRY_ID", u32)?,
                rating: value_t!(rate, "RATING", f64)?,
                notes: rate.value_of("notes").map(String::from),
            }
        }
        ("edit", Some(edit)) => {
            let total = if edit.is_present("unknown-total") {
                Some(None)
            } else if edit.is_present("total") {
                Some(Some(value_t!(edit, "total", u32)?))
            } else {
                None
            };

            Command::Edit {
                id: value_t!(edit, "ENTRY_ID", u32)?,
                title: edit.value_of("title").map(String::from),
                author: edit.value_of("author").map(String::from),
                total,
            }
        }
        ("stats", Some(_)) => Command::Stats,
        ("remove", Some(remove)) => Command::Remove(value_t!(remove, "ENTRY_ID", u32)?),
        _ => return Ok(None),
    };

    Ok(Some(command))
}

// Global args given after the subcommand only show up in the subcommand's matches.
fn file_arg<'a>(matches: &'a ArgMatches) -> Option<&'a OsStr> {
    matches
        .subcommand()
        .1
        .and_then(|sub| sub.value_of_os("file"))
        .or_else(|| matches.value_of_os("file"))
}

fn occurrences(matches: &ArgMatches, name: &str) -> u64 {
    let below = matches.subcommand().1.map_or(0, |sub| sub.occurrences_of(name));
    matches.occurrences_of(name).max(below)
}

/// `--file`, then `$SHELF_FILE`, then the XDG data directory.
fn data_path(matches: &ArgMatches) -> Result<PathBuf> {
    if let Some(path) = file_arg(matches) {
        return Ok(PathBuf::from(path));
    }

    let bd = BaseDirectories::with_prefix(NAME)?;
    let path = bd.place_data_file(DATA_FILE)?;

    Ok(path)
}

fn init_logging(verbose: u64) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(verbose >= 2)
        .init();
}

fn run_shell(shelf: &mut Shelf) -> Result<()> {
    let reader = Interface::new(NAME)?;
    reader.set_prompt(&format!("{}> ", NAME))?;

    println!("Type a command (`help` for a list), or `quit` to leave.");

    while let ReadResult::Input(line) = reader.read_line()? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        reader.add_history_unique(line.to_string());

        if line == "quit" || line == "exit" {
            break;
        }

        match run_line(shelf, line) {
            Ok(msg) => {
                if !msg.is_empty() {
                    println!("{}", msg);
                }
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    println!("Goodbye! Happy reading!");
    Ok(())
}

fn run_line(shelf: &mut Shelf, line: &str) -> Result<String> {
    let mut args = vec![NAME.to_string()];
    args.extend(shell_words::split(line)?);

    let matches = match build_app().get_matches_from_safe(args) {
        Ok(matches) => matches,
        // --help and --version land here as well
        Err(e) => return Ok(e.message),
    };

    if occurrences(&matches, "file") > 0 {
        return Err("The shelf file cannot be changed inside the shell".into());
    }

    match parse_command(&matches)? {
        Some(command) => {
            debug!("Running: {}", command);
            exec_command(shelf, command)
        }
        None => Err("Already in the shell".into()),
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let path = data_path(matches)?;
    let mut shelf = Shelf::open(Store::new(path));
    info!("{} entries on the shelf at {}", shelf.len(), shelf.store().path().display());

    match parse_command(matches)? {
        Some(command) => {
            debug!("Running: {}", command);
            let msg = exec_command(&mut shelf, command)?;
            if !msg.is_empty() {
                println!("{}", msg);
            }
        }
        None => run_shell(&mut shelf)?,
    }

    Ok(())
}

fn main() {
    let matches = build_app().get_matches();

    init_logging(occurrences(&matches, "verbose"));

    if let Err(ref e) = run(&matches) {
        let stderr = &mut io::stderr();
        let _ = writeln!(stderr, "Error: {}", e);

        for cause in e.iter().skip(1) {
            let _ = writeln!(stderr, "Caused by: {}", cause);
        }

        process::exit(1);
    }
}
