use crate::backend::ClubBackend;
use crate::error::ClubError;
use crate::reservation_rules::{self, ReservationPolicy};
use crate::types::{
    normalize_email, sort_members, Court, Favourite, Member, NewCourt, NewMember, NewReservation,
    ProfileUpdate, Reservation, ReservationFilter,
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct ClubData {
    members: HashMap<Uuid, Member>,
    courts: HashMap<Uuid, Court>,
    reservations: HashMap<Uuid, Reservation>,
    favourites: Vec<Favourite>,
}

/// Club state kept in memory. Used when no database is configured; everything
/// is lost on restart.
#[derive(Debug, Clone, Default)]
pub struct LocalClub {
    data: Arc<Mutex<ClubData>>,
    policy: ReservationPolicy,
}

impl LocalClub {
    pub fn new(policy: ReservationPolicy) -> Self {
        Self {
            data: Arc::default(),
            policy,
        }
    }

    fn data(&self) -> MutexGuard<'_, ClubData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClubBackend for LocalClub {
    fn members(&self) -> Result<Vec<Member>, ClubError> {
        let mut members: Vec<Member> = self.data().members.values().cloned().collect();
        sort_members(&mut members);
        Ok(members)
    }

    fn member(&self, id: Uuid) -> Result<Member, ClubError> {
        self.data()
            .members
            .get(&id)
            .cloned()
            .ok_or(ClubError::NotFound("member"))
    }

    fn member_by_email(&self, email: &str) -> Result<Option<Member>, ClubError> {
        let email = normalize_email(email);
        Ok(self
            .data()
            .members
            .values()
            .find(|member| member.email == email)
            .cloned())
    }

    fn add_member(&self, new_member: NewMember) -> Result<Member, ClubError> {
        let member = new_member.into_member();
        let mut data = self.data();
        if data.members.values().any(|other| other.email == member.email) {
            let err = "A member with this email already exists";
            error!(email = %member.email, "{err}");
            return Err(ClubError::Conflict(err.into()));
        }
        data.members.insert(member.id, member.clone());
        info!(id = %member.id, "Member added");
        Ok(member)
    }

    fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Member, ClubError> {
        let mut data = self.data();
        let member = data
            .members
            .get_mut(&id)
            .ok_or(ClubError::NotFound("member"))?;
        update.apply(member);
        Ok(member.clone())
    }

    fn remove_member(&self, id: Uuid) -> Result<(), ClubError> {
        let mut data = self.data();
        if data.members.remove(&id).is_none() {
            return Err(ClubError::NotFound("member"));
        }
        data.reservations
            .retain(|_, reservation| reservation.member_id != id);
        data.favourites
            .retain(|favourite| favourite.member_id != id && favourite.favourite_id != id);
        info!(%id, "Member removed");
        Ok(())
    }

    fn courts(&self) -> Result<Vec<Court>, ClubError> {
        let mut courts: Vec<Court> = self.data().courts.values().cloned().collect();
        courts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(courts)
    }

    fn add_court(&self, new_court: NewCourt) -> Result<Court, ClubError> {
        let court = new_court.into_court();
        let mut data = self.data();
        if data.courts.values().any(|other| other.name == court.name) {
            return Err(ClubError::Conflict(format!(
                "A court named {} already exists",
                court.name
            )));
        }
        data.courts.insert(court.id, court.clone());
        Ok(court)
    }

    fn set_court_active(&self, id: Uuid, active: bool) -> Result<Court, ClubError> {
        let mut data = self.data();
        let court = data
            .courts
            .get_mut(&id)
            .ok_or(ClubError::NotFound("court"))?;
        court.active = active;
        Ok(court.clone())
    }

    fn remove_court(&self, id: Uuid) -> Result<(), ClubError> {
        let mut data = self.data();
        if data.courts.remove(&id).is_none() {
            return Err(ClubError::NotFound("court"));
        }
        data.reservations
            .retain(|_, reservation| reservation.court_id != id);
        Ok(())
    }

    fn reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, ClubError> {
        let mut reservations: Vec<Reservation> = self
            .data()
            .reservations
            .values()
            .filter(|reservation| filter.matches(reservation))
            .cloned()
            .collect();
        reservations.sort_unstable_by(|a, b| a.starts_at.cmp(&b.starts_at));
        Ok(reservations)
    }

    fn reserve(&self, request: NewReservation) -> Result<Reservation, ClubError> {
        let now = Utc::now();
        let mut data = self.data();

        if !data.members.contains_key(&request.member_id) {
            return Err(ClubError::NotFound("member"));
        }
        let court = data
            .courts
            .get(&request.court_id)
            .ok_or(ClubError::NotFound("court"))?;

        let on_court: Vec<Reservation> = data
            .reservations
            .values()
            .filter(|reservation| reservation.court_id == request.court_id)
            .cloned()
            .collect();
        let active_for_member = data
            .reservations
            .values()
            .filter(|reservation| {
                reservation.member_id == request.member_id
                    && reservation_rules::is_active(reservation, now)
            })
            .count();

        reservation_rules::check_reservation(
            &self.policy,
            &request,
            court,
            &on_court,
            active_for_member,
            now,
        )?;

        let reservation = request.into_reservation();
        data.reservations
            .insert(reservation.id, reservation.clone());
        info!(id = %reservation.id, court = %reservation.court_id, "Reservation created");
        Ok(reservation)
    }

    fn cancel_reservation(&self, id: Uuid, actor: &Member) -> Result<(), ClubError> {
        let mut data = self.data();
        let reservation = data
            .reservations
            .get(&id)
            .ok_or(ClubError::NotFound("reservation"))?;
        reservation_rules::may_cancel(reservation, actor, Utc::now())?;
        data.reservations.remove(&id);
        info!(%id, by = %actor.id, "Reservation cancelled");
        Ok(())
    }

    fn favourites(&self, member_id: Uuid) -> Result<Vec<Member>, ClubError> {
        let data = self.data();
        let mut favourites: Vec<Member> = data
            .favourites
            .iter()
            .filter(|favourite| favourite.member_id == member_id)
            .filter_map(|favourite| data.members.get(&favourite.favourite_id))
            .cloned()
            .collect();
        sort_members(&mut favourites);
        Ok(favourites)
    }

    fn add_favourite(&self, member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError> {
        reservation_rules::check_favourite(member_id, favourite_id)?;
        let mut data = self.data();
        if !data.members.contains_key(&member_id) || !data.members.contains_key(&favourite_id) {
            return Err(ClubError::NotFound("member"));
        }
        if data
            .favourites
            .iter()
            .any(|favourite| favourite.member_id == member_id && favourite.favourite_id == favourite_id)
        {
            return Err(ClubError::Conflict(
                "Member is already one of your favourites".into(),
            ));
        }
        data.favourites.push(Favourite {
            member_id,
            favourite_id,
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn remove_favourite(&self, member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError> {
        let mut data = self.data();
        let before = data.favourites.len();
        data.favourites.retain(|favourite| {
            !(favourite.member_id == member_id && favourite.favourite_id == favourite_id)
        });
        if data.favourites.len() == before {
            return Err(ClubError::NotFound("favourite"));
        }
        Ok(())
    }
}
