use crate::reservation_rules::ReservationPolicy;
use chrono::Duration;
use clap::ValueEnum;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn website_title(&self) -> String;
    fn port(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn profile(&self) -> Profile;
    fn session_ttl(&self) -> Duration;
    fn reservation_policy(&self) -> ReservationPolicy;
    fn admin_account(&self) -> AdminAccount;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    Development,
    Testing,
    Production,
}

impl Profile {
    pub fn secure_cookies(&self) -> bool {
        matches!(self, Profile::Production)
    }

    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Profile::Development => "club_manager=debug,tower_http=debug,info",
            Profile::Testing => "warn",
            Profile::Production => "club_manager=info,warn",
        }
    }

    /// Whether seeding may fall back to a well-known admin password.
    pub fn allows_default_admin_password(&self) -> bool {
        !matches!(self, Profile::Production)
    }
}

#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub email: String,
    pub password: Option<String>,
}
