//! Command-line front end for the technical note register.
//!
//! # Responsibility
//! - Parse commands and map them onto `NoteStore` operations.
//! - Render records and report failures as one-line messages.
//!
//! # Invariants
//! - Every mutation goes through `NoteStore`; this binary never touches storage.
//! - Failures exit with status 1.

mod render;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use notas_core::{
    default_log_level, init_logging, Collaborator, NewNote, NoteEdit, NoteId, NoteStatus,
    NotasConfig, Published,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "notas", version, about = "Register and number technical notes")]
struct Cli {
    /// JSON configuration file; missing files fall back to defaults.
    #[arg(long, global = true, env = "NOTAS_CONFIG", default_value = "notas.json")]
    config: PathBuf,

    /// Note table location; overrides the configured data file.
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Shows the number the next note entering review would receive.
    Next,
    /// Lists every note, most recent number first.
    List {
        /// Print records as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Shows one note.
    Show { id: NoteId },
    /// Lists the collaborators notes can be assigned to.
    Collaborators,
    /// Registers a new note.
    Create {
        #[arg(long)]
        subject: String,
        /// External process (SEI) reference.
        #[arg(long)]
        sei: Option<String>,
        #[arg(long, value_parser = parse_collaborator)]
        assignee: Collaborator,
        #[arg(long, value_enum, default_value_t = InitialStatusArg::Drafting)]
        status: InitialStatusArg,
        /// Number the note right away, even while drafting.
        #[arg(long)]
        requires_initial_number: bool,
    },
    /// Edits a note; omitted fields keep their current values.
    Update {
        id: NoteId,
        #[arg(long)]
        subject: Option<String>,
        /// External process (SEI) reference; pass an empty value to clear it.
        #[arg(long)]
        sei: Option<String>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long, value_name = "BOOL")]
        requires_initial_number: Option<bool>,
        /// Publication answer; required when the note ends up concluded.
        #[arg(long, value_enum)]
        published: Option<PublishedArg>,
    },
    /// Deletes one note (admin).
    Delete {
        id: NoteId,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: bool,
    },
    /// Deletes every note (admin).
    Clear {
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InitialStatusArg {
    Drafting,
    UnderReview,
}

impl From<InitialStatusArg> for NoteStatus {
    fn from(value: InitialStatusArg) -> Self {
        match value {
            InitialStatusArg::Drafting => NoteStatus::Drafting,
            InitialStatusArg::UnderReview => NoteStatus::UnderReview,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Drafting,
    UnderReview,
    Concluded,
}

impl From<StatusArg> for NoteStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Drafting => NoteStatus::Drafting,
            StatusArg::UnderReview => NoteStatus::UnderReview,
            StatusArg::Concluded => NoteStatus::Concluded,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PublishedArg {
    Yes,
    No,
}

impl From<PublishedArg> for Published {
    fn from(value: PublishedArg) -> Self {
        match value {
            PublishedArg::Yes => Published::Yes,
            PublishedArg::No => Published::No,
        }
    }
}

fn parse_collaborator(value: &str) -> Result<Collaborator, String> {
    value.parse::<Collaborator>().map_err(|err| {
        let known: Vec<&str> = Collaborator::ALL.iter().map(|c| c.name()).collect();
        format!("{err}; expected one of: {}", known.join(", "))
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    if let Some(log_dir) = config.log_dir.as_deref() {
        let level = config.log_level.as_deref().unwrap_or_else(|| default_log_level());
        init_logging(level, log_dir).context("failed to initialize logging")?;
    }

    let mut store = config
        .open_store()
        .with_context(|| format!("failed to open `{}`", config.data_file.display()))?;
    let report = store.last_load_report();
    if report.repaired() {
        eprintln!(
            "note: repaired table on load (dropped {}, re-identified {}, quarantined {})",
            report.dropped_blank,
            report.reassigned_ids.len(),
            report.quarantined.len()
        );
    }

    match cli.command {
        Command::Next => {
            println!("{}", store.preview_next_serial()?);
        }
        Command::List { json } => {
            let records = store.sorted_for_display();
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print!("{}", render::render_table(&records));
            }
        }
        Command::Show { id } => {
            let Some(record) = store.get(id) else {
                bail!("note {id} not found");
            };
            print!("{}", render::render_detail(record));
        }
        Command::Collaborators => {
            for collaborator in Collaborator::ALL {
                println!("{:<8}  {}", collaborator.name(), collaborator.role());
            }
        }
        Command::Create {
            subject,
            sei,
            assignee,
            status,
            requires_initial_number,
        } => {
            let mut new_note = NewNote::new(subject, assignee, status.into())
                .requiring_initial_number(requires_initial_number);
            new_note.external_process_ref = sei;
            let id = store.create(new_note)?;
            match store.get(id).and_then(|record| record.formatted_number()) {
                Some(number) => println!("created note {id} with number {number}"),
                None => println!("created note {id}"),
            }
        }
        Command::Update {
            id,
            subject,
            sei,
            status,
            requires_initial_number,
            published,
        } => {
            let Some(current) = store.get(id) else {
                bail!("note {id} not found");
            };
            let mut edit = NoteEdit::from_record(current);
            if let Some(subject) = subject {
                edit.subject = subject;
            }
            if let Some(sei) = sei {
                edit.external_process_ref = Some(sei);
            }
            if let Some(status) = status {
                edit.status = status.into();
            }
            if let Some(required) = requires_initial_number {
                edit.requires_initial_number = required;
            }
            if let Some(published) = published {
                edit.published = Some(published.into());
            }
            let updated = store.update(id, edit)?;
            match updated.formatted_number() {
                Some(number) => println!("updated note {id} ({number})"),
                None => println!("updated note {id}"),
            }
        }
        Command::Delete {
            id,
            password,
            confirm,
        } => {
            if store.delete(id, &password, confirm)? {
                println!("deleted note {id}");
            } else {
                println!("note {id} does not exist; nothing deleted");
            }
        }
        Command::Clear { password, confirm } => {
            let removed = store.clear(&password, confirm)?;
            println!("removed {removed} notes");
        }
    }

    info!("event=cli_command module=cli status=ok");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<NotasConfig> {
    let mut config = NotasConfig::load(&cli.config)?;
    config.apply_env_overrides();
    if let Some(data) = &cli.data {
        config.data_file = data.clone();
    }
    Ok(config)
}
