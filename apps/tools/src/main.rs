mod config;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use roster_core::{compose, AppStore};
use shared::domain::{CollectionKind, Role, Volunteer};
use storage::{Backend, CollectionStore, JsonImportFile};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "roster", about = "Volunteer shift roster maintenance")]
struct Cli {
    #[arg(long, default_value = "roster.toml")]
    config: PathBuf,
    /// Overrides the configured data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Stores collections in SQLite instead of JSON files.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List {
        #[arg(value_enum)]
        kind: ListKind,
    },
    AddRole {
        name: String,
    },
    RemoveRole {
        name: String,
    },
    ImportVolunteers {
        file: PathBuf,
    },
    ImportRoles {
        file: PathBuf,
    },
    Preview {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// SHIFT=VOLUNTEER, matched by shift description and volunteer name.
        #[arg(long = "assign", value_parser = parse_pair)]
        assignments: Vec<(String, String)>,
        /// PROPERTY=VALUE, overriding the property default for this event.
        #[arg(long = "set", value_parser = parse_pair)]
        properties: Vec<(String, String)>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListKind {
    Volunteers,
    Roles,
    Shifts,
    Managers,
    EventProperties,
    EmailTemplate,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut settings, config_error) = config::load_settings(&cli.config);
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    if cli.database_url.is_some() {
        settings.database_url = cli.database_url;
    }

    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .with_writer(std::io::stderr)
        .init();
    if let Some(err) = config_error {
        warn!(path = %cli.config.display(), error = %err, "ignoring malformed config file");
    }

    let backend = Backend::open(&settings.data_dir, settings.database_url.as_deref())?;
    info!(backend = %backend.describe(), "opening roster");
    let store = AppStore::open(backend, settings.eligibility());
    for kind in CollectionKind::ALL {
        store.observe(kind, |store, kind| {
            info!(collection = %kind, items = collection_len(store, kind), "collection updated");
        });
    }

    match cli.command {
        Command::List { kind } => list(&store, kind),
        Command::AddRole { name } => {
            let role = Role::new(name.trim());
            let mut roles = store.roles();
            if roles.contains(&role) {
                println!("role '{role}' already exists");
                return Ok(());
            }
            roles.push(role);
            store.replace_all(roles)?;
        }
        Command::RemoveRole { name } => {
            let mut roles = store.roles();
            let before = roles.len();
            roles.retain(|role| role.name != name.trim());
            if roles.len() == before {
                return Err(anyhow!("no role named '{}'", name.trim()));
            }
            store.replace_all(roles)?;
        }
        Command::ImportVolunteers { file } => {
            let added = store.import_and_merge::<Volunteer, _>(&JsonImportFile::new(&file))?;
            println!("imported {added} volunteer(s) from {}", file.display());
        }
        Command::ImportRoles { file } => {
            let added = store.import_and_merge::<Role, _>(&JsonImportFile::new(&file))?;
            println!("imported {added} role(s) from {}", file.display());
        }
        Command::Preview {
            date,
            assignments,
            properties,
        } => preview(&store, date, &assignments, &properties)?,
    }
    Ok(())
}

fn collection_len<P: CollectionStore>(store: &AppStore<P>, kind: CollectionKind) -> usize {
    match kind {
        CollectionKind::Volunteers => store.volunteers().len(),
        CollectionKind::Roles => store.roles().len(),
        CollectionKind::Shifts => store.shifts().len(),
        CollectionKind::Managers => store.managers().len(),
        CollectionKind::EventProperties => store.event_properties().len(),
        CollectionKind::EmailTemplate => 1,
    }
}

fn list<P: CollectionStore>(store: &AppStore<P>, kind: ListKind) {
    let lines: Vec<String> = match kind {
        ListKind::Volunteers => store
            .volunteers()
            .iter()
            .map(|volunteer| {
                let roles: Vec<&str> = volunteer.roles.iter().map(|role| role.name.as_str()).collect();
                let status = if volunteer.active { "" } else { " [inactive]" };
                format!("{volunteer}{status} roles=[{}]", roles.join(", "))
            })
            .collect(),
        ListKind::Roles => store.roles().iter().map(ToString::to_string).collect(),
        ListKind::Shifts => store
            .shifts()
            .iter()
            .map(|shift| {
                let roles: Vec<&str> = shift.roles.iter().map(|role| role.name.as_str()).collect();
                format!("{shift} needs=[{}]", roles.join(", "))
            })
            .collect(),
        ListKind::Managers => store.managers().iter().map(ToString::to_string).collect(),
        ListKind::EventProperties => store
            .event_properties()
            .iter()
            .map(|property| format!("{property} (default '{}')", property.default_value))
            .collect(),
        ListKind::EmailTemplate => {
            let template = store.email_template();
            vec![
                format!("send_type: {:?}", template.send_type),
                format!("subject: {}", template.subject_line_template),
                format!("date_format: {}", template.date_format.as_str()),
                format!("pre: {}", template.pre_schedule_text),
                format!("post: {}", template.post_schedule_text),
            ]
        }
    };
    for line in lines {
        println!("{line}");
    }
}

fn preview<P: CollectionStore>(
    store: &AppStore<P>,
    date: Option<NaiveDate>,
    assignments: &[(String, String)],
    properties: &[(String, String)],
) -> Result<()> {
    let mut event = store.new_event(date);
    let volunteers = store.volunteers();

    for (shift_description, volunteer_name) in assignments {
        let index = event
            .shifts
            .iter()
            .position(|shift| shift.description == *shift_description)
            .ok_or_else(|| anyhow!("no shift described as '{shift_description}'"))?;
        let volunteer = volunteers
            .iter()
            .find(|volunteer| volunteer.name == *volunteer_name)
            .cloned()
            .ok_or_else(|| anyhow!("no volunteer named '{volunteer_name}'"))?;
        event
            .assign(index, volunteer, store.policy())
            .with_context(|| format!("assigning '{volunteer_name}' to '{shift_description}'"))?;
    }
    for (name, value) in properties {
        event.set_property_value(name, value.as_str())?;
    }

    let email = compose(&event, &store.email_template(), &store.managers());
    println!("To: {}", email.to.join(", "));
    if !email.cc.is_empty() {
        println!("Cc: {}", email.cc.join(", "));
    }
    if !email.bcc.is_empty() {
        println!("Bcc: {}", email.bcc.join(", "));
    }
    println!("Subject: {}", email.subject);
    println!();
    println!("{}", email.body);
    Ok(())
}
