use crate::schema::{courts, favourites, members, reservations};
use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = members)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Member {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = courts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Court {
    pub id: Uuid,
    pub name: String,
    pub surface: String,
    pub indoor: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = reservations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Reservation {
    pub id: Uuid,
    pub member_id: Uuid,
    pub court_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = favourites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Favourite {
    pub member_id: Uuid,
    pub favourite_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub is_admin: bool,
}

impl NewMember {
    pub fn into_member(self) -> Member {
        Member {
            id: Uuid::new_v4(),
            email: normalize_email(&self.email),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone: normalize_phone(self.phone),
            password_hash: self.password_hash,
            is_admin: self.is_admin,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCourt {
    pub name: String,
    pub surface: String,
    pub indoor: bool,
}

impl NewCourt {
    pub fn into_court(self) -> Court {
        Court {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            surface: self.surface.trim().to_string(),
            indoor: self.indoor,
            active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
    pub member_id: Uuid,
    pub court_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: String,
}

impl NewReservation {
    pub fn into_reservation(self) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            member_id: self.member_id,
            court_id: self.court_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            notes: self.notes.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Narrows a reservation listing. Time bounds select reservations that
/// intersect `[from, until)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub member_id: Option<Uuid>,
    pub court_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.member_id.is_none_or(|id| reservation.member_id == id)
            && self.court_id.is_none_or(|id| reservation.court_id == id)
            && self.from.is_none_or(|from| reservation.ends_at > from)
            && self.until.is_none_or(|until| reservation.starts_at < until)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn normalize_phone(phone: Option<String>) -> Option<String> {
    phone
        .map(|phone| phone.trim().to_string())
        .filter(|phone| !phone.is_empty())
}

pub fn sort_members(members: &mut [Member]) {
    members.sort_by(|a, b| {
        (a.last_name.to_lowercase(), a.first_name.to_lowercase())
            .cmp(&(b.last_name.to_lowercase(), b.first_name.to_lowercase()))
    });
}

impl ProfileUpdate {
    /// Trimmed names, and no phone number instead of a blank one.
    pub fn normalized(self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone: normalize_phone(self.phone),
        }
    }

    pub fn apply(self, member: &mut Member) {
        let update = self.normalized();
        member.first_name = update.first_name;
        member.last_name = update.last_name;
        member.phone = update.phone;
    }
}
