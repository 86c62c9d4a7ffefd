use crate::configuration::{AdminAccount, Configuration, Profile};
use crate::reservation_rules::ReservationPolicy;
use chrono::Duration;
use clap::{builder::RangedU64ValueParser, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "club_manager",
    version,
    about = "Members, courts, reservations and favourites of a tennis club"
)]
pub struct ConfigurationHandler {
    /// PostgreSQL connection string. Without it the club lives in memory.
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[arg(long, env = "CLUB_PORT", default_value = "3000")]
    port: String,

    #[arg(long, env = "CLUB_WEBSITE_TITLE", default_value = "Club Manager")]
    website_title: String,

    #[arg(long, env = "CLUB_CONFIG", value_enum, default_value_t = Profile::Development, global = true)]
    profile: Profile,

    #[arg(
        long,
        env = "CLUB_SESSION_HOURS",
        default_value_t = 12,
        value_parser = clap::value_parser!(i64).range(1..=8760)
    )]
    session_hours: i64,

    #[arg(
        long,
        env = "CLUB_MIN_RESERVATION_MINUTES",
        default_value_t = 30,
        value_parser = clap::value_parser!(i64).range(1..=1440)
    )]
    min_reservation_minutes: i64,

    #[arg(
        long,
        env = "CLUB_MAX_RESERVATION_MINUTES",
        default_value_t = 120,
        value_parser = clap::value_parser!(i64).range(1..=1440)
    )]
    max_reservation_minutes: i64,

    #[arg(
        long,
        env = "CLUB_BOOKING_HORIZON_DAYS",
        default_value_t = 14,
        value_parser = clap::value_parser!(i64).range(1..=365)
    )]
    booking_horizon_days: i64,

    #[arg(
        long,
        env = "CLUB_MAX_ACTIVE_RESERVATIONS",
        default_value_t = 3,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=100)
    )]
    max_active_reservations: usize,

    #[arg(long, env = "ADMIN_EMAIL", default_value = "admin@club.local", global = true)]
    admin_email: String,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true, global = true)]
    admin_password: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Run the web server (default)
    Serve,
    /// Create the default courts and the admin account if they are missing
    Seed {
        /// Also create a handful of demo members
        #[arg(long)]
        demo: bool,
    },
    /// Drop every club table and rebuild the schema from the migrations
    Recreate {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show tables, row counts and the migration state
    Inspect,
    /// Bring the migration version marker in line with the embedded migrations
    FixMigration {
        /// Mark migrations up to and including this version as applied
        #[arg(long)]
        target: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                eprintln!("Ignoring unreadable .env file: {err}");
            }
        }
        Self::parse()
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

impl Configuration for ConfigurationHandler {
    fn website_title(&self) -> String {
        self.website_title.clone()
    }

    fn port(&self) -> String {
        self.port.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url
            .clone()
            .filter(|database_url| !database_url.trim().is_empty())
    }

    fn profile(&self) -> Profile {
        self.profile
    }

    fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_hours)
    }

    fn reservation_policy(&self) -> ReservationPolicy {
        ReservationPolicy {
            min_duration: Duration::minutes(self.min_reservation_minutes),
            max_duration: Duration::minutes(self.max_reservation_minutes),
            booking_horizon: Duration::days(self.booking_horizon_days),
            max_active_per_member: self.max_active_reservations,
        }
    }

    fn admin_account(&self) -> AdminAccount {
        AdminAccount {
            email: self.admin_email.clone(),
            password: self.admin_password.clone(),
        }
    }
}
