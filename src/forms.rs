use crate::error::ClubError;
use crate::reservation_rules::ReservationPolicy;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

lazy_static! {
    static ref PHONE_REGEX: Regex = Regex::new(r"^(\+?[0-9][0-9 /-]{4,19})?$").unwrap();
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(
        custom(function = not_blank, message = "First name is required"),
        length(max = 100, message = "First name is too long")
    )]
    pub first_name: String,
    #[validate(
        custom(function = not_blank, message = "Last name is required"),
        length(max = 100, message = "Last name is too long")
    )]
    pub last_name: String,
    #[serde(default)]
    #[validate(regex(path = *PHONE_REGEX, message = "Phone number may only contain digits, spaces and a leading +"))]
    pub phone: String,
    #[validate(length(min = 8, message = "Password needs at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileForm {
    #[validate(
        custom(function = not_blank, message = "First name is required"),
        length(max = 100, message = "First name is too long")
    )]
    pub first_name: String,
    #[validate(
        custom(function = not_blank, message = "Last name is required"),
        length(max = 100, message = "Last name is too long")
    )]
    pub last_name: String,
    #[serde(default)]
    #[validate(regex(path = *PHONE_REGEX, message = "Phone number may only contain digits, spaces and a leading +"))]
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FavouriteForm {
    pub favourite_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReservationForm {
    pub court_id: Uuid,
    pub starts_at: String,
    #[validate(range(min = 15, max = 480, message = "Unsupported duration"))]
    pub duration_minutes: i64,
    #[serde(default)]
    #[validate(length(max = 200, message = "Notes are limited to 200 characters"))]
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CourtForm {
    #[validate(
        custom(function = not_blank, message = "Court name is required"),
        length(max = 50, message = "Court name is too long")
    )]
    pub name: String,
    #[validate(
        custom(function = not_blank, message = "Surface is required"),
        length(max = 30, message = "Surface is too long")
    )]
    pub surface: String,
    #[serde(default)]
    pub indoor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiReservationRequest {
    pub court_id: Uuid,
    pub starts_at: DateTime<Utc>,
    #[validate(range(min = 15, max = 480))]
    pub duration_minutes: i64,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub notes: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationQuery {
    pub court_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileQuery {
    #[serde(default)]
    pub saved: bool,
}

pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| match &error.message {
                Some(message) => message.to_string(),
                None => format!("{} is invalid", field.replace('_', " ")),
            })
        })
        .collect();
    messages.sort();
    messages.dedup();
    messages
}

/// Parses the value of an `<input type="datetime-local">` in the server's
/// local time zone.
pub fn parse_local_datetime(value: &str) -> Result<DateTime<Utc>, ClubError> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| ClubError::InvalidInput(format!("Invalid start time: {value}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|datetime| datetime.with_timezone(&Utc))
        .ok_or_else(|| ClubError::InvalidInput(format!("Start time {value} does not exist")))
}

/// Durations offered in the booking form, in 30 minute steps.
pub fn offered_durations(policy: &ReservationPolicy) -> Vec<i64> {
    const STEP: i64 = 30;
    let min = policy.min_duration.num_minutes().max(1);
    let max = policy.max_duration.num_minutes();
    let mut durations: Vec<i64> = (0..)
        .map(|step| min + step * STEP)
        .take_while(|minutes| *minutes <= max)
        .collect();
    if durations.last() != Some(&max) && max >= min {
        durations.push(max);
    }
    durations
}

impl From<ProfileForm> for crate::types::ProfileUpdate {
    fn from(form: ProfileForm) -> Self {
        Self {
            first_name: form.first_name,
            last_name: form.last_name,
            phone: Some(form.phone),
        }
    }
}
