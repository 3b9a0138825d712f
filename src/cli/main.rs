use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use incident_ledger::{
    config::Config,
    incidents::IncidentService,
    models::{EventType, NewIncident, TagPair},
    notifications::NotificationService,
    search::IncidentFilter,
    sources::SourceRegistry,
    state::create_store,
    telemetry,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "incident-ledger-cli")]
#[command(about = "Incident ledger CLI", long_about = None, version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<String>,

    /// Acting user recorded on events
    #[arg(short, long, default_value = "cli")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,

    /// Register a source system type
    SourceType {
        name: String,
    },

    /// Register a source system
    Source {
        #[arg(short, long)]
        name: String,

        #[arg(short = 't', long = "type")]
        type_name: String,

        #[arg(short, long)]
        owner: String,
    },

    /// List source systems
    Sources,

    /// Create an incident
    Create {
        #[arg(short, long)]
        source: Uuid,

        #[arg(short, long)]
        description: String,

        #[arg(short, long, default_value = "5")]
        level: u8,

        /// Tag of the form key=value; repeatable
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        ticket_url: Option<String>,
    },

    /// List incidents
    List {
        #[arg(long)]
        open: Option<bool>,

        #[arg(long)]
        acked: Option<bool>,

        #[arg(long)]
        max_level: Option<u8>,

        /// Required tag of the form key=value; repeatable
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Comma separated search terms
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show an incident with its status, events and acknowledgements
    Get {
        #[arg(value_name = "INCIDENT_ID")]
        id: Uuid,
    },

    /// Acknowledge an incident
    Ack {
        #[arg(value_name = "INCIDENT_ID")]
        id: Uuid,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Hours until the acknowledgement expires; never when omitted
        #[arg(short, long)]
        expires_in_hours: Option<i64>,
    },

    /// Close an incident
    Close {
        #[arg(value_name = "INCIDENT_ID")]
        id: Uuid,
    },

    /// Add an OTHER event to an incident
    Event {
        #[arg(value_name = "INCIDENT_ID")]
        id: Uuid,

        #[arg(short, long)]
        description: String,
    },

    /// Attach a tag to an incident
    Tag {
        #[arg(value_name = "INCIDENT_ID")]
        id: Uuid,

        tag: String,
    },

    /// Detach a tag from an incident
    Untag {
        #[arg(value_name = "INCIDENT_ID")]
        id: Uuid,

        tag: String,
    },

    /// Search incidents by comma separated terms
    Search {
        query: Option<String>,
    },

    /// List the events of all incidents
    Events,

    /// Create the default timeslot of a user
    Provision {
        user: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `now` plus `hours`, failing instead of overflowing
fn expiration_after(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    Duration::try_hours(hours)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| anyhow!("--expires-in-hours {} is out of range", hours))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    telemetry::init_tracing(&config.observability)?;

    let store = create_store(&config.state).context("Failed to open store")?;
    let incidents = IncidentService::new(store.clone());
    let sources = SourceRegistry::new(store.clone());
    let actor = cli.actor.as_str();

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::SourceType { name } => {
            print_json(&sources.create_source_type(&name).await?)?;
        }

        Commands::Source {
            name,
            type_name,
            owner,
        } => {
            print_json(&sources.create_source_system(&name, &type_name, &owner).await?)?;
        }

        Commands::Sources => {
            print_json(&sources.list_source_systems().await?)?;
        }

        Commands::Create {
            source,
            description,
            level,
            tags,
            ticket_url,
        } => {
            let mut new = NewIncident::new(description, level, source);
            new.tags = tags;
            new.ticket_url = ticket_url;
            print_json(&incidents.create_incident(new).await?)?;
        }

        Commands::List {
            open,
            acked,
            max_level,
            tags,
            search,
        } => {
            let filter = IncidentFilter {
                search,
                open,
                acked,
                tags: tags
                    .iter()
                    .map(|text| text.parse::<TagPair>())
                    .collect::<Result<_, _>>()?,
                sources: Vec::new(),
                max_level,
            };
            print_json(&incidents.list_incidents(&filter, Utc::now()).await?)?;
        }

        Commands::Get { id } => {
            let now = Utc::now();
            let incident = incidents.get_incident(&id).await?;
            print_json(&json!({
                "incident": incident,
                "status": incident.status_at(now),
                "events": incident.ordered_events(),
                "acknowledgements": incident.acknowledgements(),
                "tags": incident.tag_strings(),
            }))?;
        }

        Commands::Ack {
            id,
            description,
            expires_in_hours,
        } => {
            let now = Utc::now();
            let expiration = expires_in_hours
                .map(|hours| expiration_after(now, hours))
                .transpose()?;
            let ack = incidents
                .acknowledge_incident(&id, &description, now, expiration, actor)
                .await?;
            print_json(&ack)?;
        }

        Commands::Close { id } => {
            print_json(&incidents.close_incident(&id, Utc::now(), actor).await?)?;
        }

        Commands::Event { id, description } => {
            let event = incidents
                .add_event(&id, EventType::Other, &description, Utc::now(), actor)
                .await?;
            print_json(&event)?;
        }

        Commands::Tag { id, tag } => {
            print_json(&incidents.attach_tag(&id, &tag, actor).await?)?;
        }

        Commands::Untag { id, tag } => {
            print_json(&incidents.detach_tag(&id, &tag).await?)?;
        }

        Commands::Search { query } => {
            print_json(&incidents.search(query.as_deref()).await?)?;
        }

        Commands::Events => {
            print_json(&incidents.list_all_events().await?)?;
        }

        Commands::Provision { user } => {
            let notifications = NotificationService::from_config(store, &config.notifications)?;
            print_json(&notifications.provision_user(&user).await?)?;
        }
    }

    Ok(())
}
