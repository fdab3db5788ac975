use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, PlannerEngine};
use shared::{
    domain::{TourBundle, TripId, TripTarget},
    protocol::{AuthEvent, Session},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long, requires = "user_id")]
    token: Option<String>,
    #[arg(long, requires = "token")]
    user_id: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the merged trip list as JSON.
    List,
    New {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        destination: String,
    },
    /// Insert a multi-day tour into a saved trip, or into a new one with `--trip new`.
    AddTour {
        #[arg(long)]
        trip: String,
        #[arg(long, default_value_t = 1)]
        start_day: u32,
        #[arg(long)]
        days: u32,
        #[arg(long, default_value_t = 0.0)]
        price: f64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        location: String,
    },
    Delete {
        trip_id: String,
    },
    /// Upload guest trips to the signed-in account.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = Some(api_url);
    }
    let engine = PlannerEngine::initialize(&settings).await?;

    let session = match (cli.token, cli.user_id) {
        (Some(access_token), Some(user_id)) => Some(Session {
            user_id,
            access_token,
        }),
        _ => None,
    };

    if let Command::Migrate = cli.command {
        let session = session.ok_or_else(|| anyhow!("migrate needs --token and --user-id"))?;
        let outcome = engine
            .migration()
            .handle_event(AuthEvent::SignedIn(session))
            .await?;
        info!(?outcome, "migration finished");
        println!("{}", serde_json::to_string_pretty(&engine.trips().trips())?);
        return Ok(());
    }

    match session {
        Some(session) => {
            engine
                .migration()
                .handle_event(AuthEvent::SessionRestored(session))
                .await?;
        }
        None => {
            engine.trips().fetch_trips().await;
        }
    }

    match cli.command {
        Command::List => {
            println!("{}", serde_json::to_string_pretty(&engine.trips().trips())?);
        }
        Command::New { title, destination } => {
            let draft = engine.draft();
            draft.create_new_trip().await;
            draft.set_title(title).await;
            draft.set_destination(destination).await;
            draft.cancel_autosave();
            let trip_id = draft
                .save_current_trip()
                .await
                .ok_or_else(|| anyhow!("trip could not be saved"))?;
            println!("created trip_id={trip_id}");
        }
        Command::AddTour {
            trip,
            start_day,
            days,
            price,
            title,
            location,
        } => {
            let target = if trip.eq_ignore_ascii_case("new") {
                TripTarget::CreateNew
            } else {
                TripTarget::Existing(TripId::from(trip))
            };
            let bundle = TourBundle {
                id: format!("cli-{}", title.to_ascii_lowercase().replace(' ', "-")),
                title,
                duration_days: days,
                price,
                location,
                image: None,
                days: Vec::new(),
            };

            let draft = engine.draft();
            let inserted = draft.add_tour_to_trip(&bundle, start_day, target).await?;
            let trip_id = draft
                .flush_autosave()
                .await
                .ok_or_else(|| anyhow!("trip could not be saved"))?;
            println!(
                "trip_id={trip_id} inserted={} day_count={}",
                inserted.len(),
                draft.day_count().await
            );
        }
        Command::Delete { trip_id } => {
            let trip_id = TripId::from(trip_id);
            if !engine.trips().delete_trip(&trip_id).await {
                return Err(anyhow!("trip {trip_id} could not be deleted"));
            }
            println!("deleted trip_id={trip_id}");
        }
        Command::Migrate => {}
    }

    Ok(())
}
