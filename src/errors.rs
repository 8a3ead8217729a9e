use std::io;

error_chain! {
    foreign_links {
        Io(io::Error);
        Json(serde_json::Error);
        Clap(clap::Error);
        Xdg(xdg::BaseDirectoriesError);
        Split(shell_words::ParseError);
    }

    errors {
        MalformedRecord(reason: String) {
            description("Stored entry could not be reconstructed")
            display("Malformed record: {}", reason)
        }
        PersistenceFailure(path: String) {
            description("Could not save the shelf")
            display("Could not save the shelf to `{}`", path)
        }
        NoSuchEntry(id: u32) {
            description("Invalid entry id")
            display("No entry with id `{}`", id)
        }
        IdsExhausted {
            description("No entry ids left")
            display("No entry ids left; reopen the shelf to renumber it")
        }
        BadStatus(status: String) {
            description("Unknown reading status")
            display("`{}` is not a status (expected one of: reading, completed, \
                     on hold, dropped, plan to read)", status)
        }
    }
}
