use std::{process::ExitCode, sync::Arc, time::Duration};

use crate::{
    backend::ClubBackend,
    configuration::{Configuration, Profile},
    configuration_handler::{Command, ConfigurationHandler},
    confirmation::{confirm, ConfirmationPhrase},
    database_interface::DatabaseInterface,
    error::ClubError,
    http::create_app,
    local_club::LocalClub,
    reservation_rules::ReservationPolicy,
    session::SessionStore,
};
use axum::Router;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod backend;
mod configuration;
mod configuration_handler;
mod confirmation;
mod database_interface;
mod error;
mod forms;
mod http;
mod local_club;
mod maintenance;
mod pages;
mod reservation_rules;
mod schema;
mod session;
#[cfg(test)]
mod testutils;
mod types;

#[derive(Clone)]
pub struct AppState<T: ClubBackend> {
    pub backend: T,
    pub sessions: SessionStore,
    pub site: Arc<SiteSettings>,
}

pub struct SiteSettings {
    pub title: String,
    pub secure_cookies: bool,
    pub policy: ReservationPolicy,
}

#[tokio::main]
async fn main() -> ExitCode {
    let configuration = ConfigurationHandler::parse_arguments();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configuration.profile().default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(configuration).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "Command failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(configuration: ConfigurationHandler) -> Result<(), ClubError> {
    match configuration.command() {
        Command::Serve => serve(configuration).await,
        Command::Seed { demo } => {
            let admin = configuration.admin_account();
            let profile = configuration.profile();
            let report = match configuration.database_url() {
                Some(database_url) => {
                    let database =
                        DatabaseInterface::new(&database_url, configuration.reservation_policy())?;
                    database.run_migrations()?;
                    maintenance::seed(&database, &admin, profile, demo)?
                }
                None => {
                    warn!("No DATABASE_URL configured, seeding an in-memory club that is gone on exit");
                    let local_club = LocalClub::new(configuration.reservation_policy());
                    maintenance::seed(&local_club, &admin, profile, demo)?
                }
            };
            println!("{report}");
            Ok(())
        }
        Command::Recreate { yes } => {
            let database = require_database(&configuration)?;
            if !confirm(
                "This drops every club table and all of its data.",
                ConfirmationPhrase::Exact("YES"),
                yes,
            )? {
                println!("Aborted, nothing was changed");
                return Ok(());
            }
            let applied = maintenance::recreate(&database)?;
            println!("Schema recreated, applied migrations: {}", applied.join(", "));
            Ok(())
        }
        Command::Inspect => {
            let database = require_database(&configuration)?;
            println!("{}", maintenance::inspect(&database)?);
            Ok(())
        }
        Command::FixMigration { target, yes } => {
            let database = require_database(&configuration)?;
            let prompt = match &target {
                Some(target) => format!("Mark migrations up to {target} as the applied ones?"),
                None => "Mark all embedded migrations as applied?".to_string(),
            };
            if !confirm(&prompt, ConfirmationPhrase::CaseInsensitive("yes"), yes)? {
                println!("Aborted, nothing was changed");
                return Ok(());
            }
            let plan = maintenance::fix_migration(&database, target.as_deref())?;
            if plan.is_empty() {
                println!("Migration markers already match");
            } else {
                println!(
                    "Inserted markers: {:?}\nDeleted markers: {:?}",
                    plan.insert, plan.delete
                );
            }
            Ok(())
        }
    }
}

fn require_database(configuration: &ConfigurationHandler) -> Result<DatabaseInterface, ClubError> {
    let database_url = configuration.database_url().ok_or_else(|| {
        ClubError::Configuration("this command needs DATABASE_URL to be set".into())
    })?;
    DatabaseInterface::new(&database_url, configuration.reservation_policy())
}

fn app<T: ClubBackend>(backend: T, configuration: &ConfigurationHandler) -> Router {
    let state = AppState {
        backend,
        sessions: SessionStore::new(configuration.session_ttl()),
        site: Arc::new(SiteSettings {
            title: configuration.website_title(),
            secure_cookies: configuration.profile().secure_cookies(),
            policy: configuration.reservation_policy(),
        }),
    };
    create_app(state)
}

async fn serve(configuration: ConfigurationHandler) -> Result<(), ClubError> {
    println!("################");
    println!("# Club Manager #");
    println!("################");

    let address = format!("0.0.0.0:{}", configuration.port());
    let listener = tokio::net::TcpListener::bind(&address).await?;
    println!("Accessible at:\n{address}");

    let profile = configuration.profile();
    let app = if let Some(database_url) = configuration.database_url() {
        let backend = loop {
            match DatabaseInterface::new(&database_url, configuration.reservation_policy()) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(%err, "Failed to establish database connection. Retry in 1 sec. Unset DATABASE_URL to run with an in-memory club instead.");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        backend.run_migrations()?;
        app(backend, &configuration)
    } else {
        warn!("No DATABASE_URL configured, club data is kept in memory only");
        let backend = LocalClub::new(configuration.reservation_policy());
        maintenance::seed(
            &backend,
            &configuration.admin_account(),
            profile,
            profile == Profile::Development,
        )?;
        app(backend, &configuration)
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "Can't listen for Ctrl-C, shut down by killing the process");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
