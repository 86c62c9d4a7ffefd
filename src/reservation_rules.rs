use crate::error::ClubError;
use crate::types::{Court, Member, NewReservation, Reservation};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservationPolicy {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub booking_horizon: Duration,
    pub max_active_per_member: usize,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            min_duration: Duration::minutes(30),
            max_duration: Duration::minutes(120),
            booking_horizon: Duration::days(14),
            max_active_per_member: 3,
        }
    }
}

pub fn check_window(
    policy: &ReservationPolicy,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ClubError> {
    if ends_at <= starts_at {
        return Err(ClubError::InvalidInput(
            "Reservation must end after it starts".into(),
        ));
    }
    let duration = ends_at - starts_at;
    if duration < policy.min_duration || duration > policy.max_duration {
        return Err(ClubError::InvalidInput(format!(
            "Reservation must last between {} and {} minutes",
            policy.min_duration.num_minutes(),
            policy.max_duration.num_minutes()
        )));
    }
    if starts_at < now {
        return Err(ClubError::InvalidInput("Reservation lies in the past".into()));
    }
    if starts_at > now + policy.booking_horizon {
        return Err(ClubError::InvalidInput(format!(
            "Reservations open at most {} days in advance",
            policy.booking_horizon.num_days()
        )));
    }
    Ok(())
}

/// Half-open interval overlap: a reservation ending at 10:00 and one starting
/// at 10:00 do not collide.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn is_active(reservation: &Reservation, now: DateTime<Utc>) -> bool {
    reservation.ends_at > now
}

pub fn check_reservation(
    policy: &ReservationPolicy,
    request: &NewReservation,
    court: &Court,
    existing_on_court: &[Reservation],
    active_for_member: usize,
    now: DateTime<Utc>,
) -> Result<(), ClubError> {
    check_window(policy, request.starts_at, request.ends_at, now)?;

    if !court.active {
        return Err(ClubError::InvalidInput(format!(
            "{} is currently closed",
            court.name
        )));
    }

    let collision = existing_on_court.iter().any(|existing| {
        existing.court_id == request.court_id
            && overlaps(
                existing.starts_at,
                existing.ends_at,
                request.starts_at,
                request.ends_at,
            )
    });
    if collision {
        return Err(ClubError::Conflict(format!(
            "{} is already reserved at that time",
            court.name
        )));
    }

    if active_for_member >= policy.max_active_per_member {
        return Err(ClubError::Conflict(format!(
            "At most {} upcoming reservations are allowed per member",
            policy.max_active_per_member
        )));
    }
    Ok(())
}

pub fn may_cancel(reservation: &Reservation, actor: &Member, now: DateTime<Utc>) -> Result<(), ClubError> {
    if actor.is_admin {
        return Ok(());
    }
    if reservation.member_id != actor.id {
        return Err(ClubError::Forbidden(
            "Only the member who made a reservation can cancel it".into(),
        ));
    }
    if reservation.starts_at <= now {
        return Err(ClubError::Forbidden(
            "Reservations that already started can't be cancelled".into(),
        ));
    }
    Ok(())
}

pub fn check_favourite(member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError> {
    if member_id == favourite_id {
        return Err(ClubError::InvalidInput(
            "You can't add yourself as a favourite".into(),
        ));
    }
    Ok(())
}

/// Members offered in the add-favourite dropdown: everybody except `me` and
/// the members `me` already favourited.
pub fn favourite_candidates(members: &[Member], me: Uuid, favourites: &[Member]) -> Vec<Member> {
    let taken: HashSet<Uuid> = favourites.iter().map(|favourite| favourite.id).collect();

    let mut candidates: Vec<Member> = members
        .iter()
        .filter(|member| member.id != me && !taken.contains(&member.id))
        .cloned()
        .collect();
    crate::types::sort_members(&mut candidates);
    candidates
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{NewCourt, NewMember};
    use test_case::test_case;

    fn member(name: &str, is_admin: bool) -> Member {
        NewMember {
            email: format!("{name}@example.com"),
            first_name: name.into(),
            last_name: "Member".into(),
            phone: None,
            password_hash: String::new(),
            is_admin,
        }
        .into_member()
    }

    fn court() -> Court {
        NewCourt {
            name: "Court 1".into(),
            surface: "clay".into(),
            indoor: false,
        }
        .into_court()
    }

    fn request(court: &Court, starts_in_minutes: i64, minutes: i64) -> NewReservation {
        let starts_at = Utc::now() + Duration::minutes(starts_in_minutes);
        NewReservation {
            member_id: Uuid::new_v4(),
            court_id: court.id,
            starts_at,
            ends_at: starts_at + Duration::minutes(minutes),
            notes: String::new(),
        }
    }

    #[test_case(60, 60, true ; "one hour soon")]
    #[test_case(60, 0, false ; "empty window")]
    #[test_case(60, -30, false ; "ends before start")]
    #[test_case(60, 15, false ; "too short")]
    #[test_case(60, 180, false ; "too long")]
    #[test_case(-60, 60, false ; "in the past")]
    #[test_case(60 * 24 * 15, 60, false ; "beyond horizon")]
    fn test_check_window(starts_in_minutes: i64, minutes: i64, valid: bool) {
        let now = Utc::now();
        let starts_at = now + Duration::minutes(starts_in_minutes);
        let ends_at = starts_at + Duration::minutes(minutes);
        let result = check_window(&ReservationPolicy::default(), starts_at, ends_at, now);
        assert_eq!(result.is_ok(), valid, "{result:?}");
    }

    #[test]
    fn test_overlaps_is_half_open() {
        let start = Utc::now();
        let hour = Duration::hours(1);

        assert!(overlaps(start, start + hour, start, start + hour));
        assert!(overlaps(start, start + hour * 2, start + hour, start + hour * 3));
        assert!(!overlaps(start, start + hour, start + hour, start + hour * 2));
        assert!(!overlaps(start + hour, start + hour * 2, start, start + hour));
    }

    #[test]
    fn test_check_reservation_rejects_collision() {
        let policy = ReservationPolicy::default();
        let court = court();
        let existing = request(&court, 60, 60).into_reservation();

        let colliding = NewReservation {
            starts_at: existing.starts_at + Duration::minutes(30),
            ends_at: existing.ends_at + Duration::minutes(30),
            ..request(&court, 0, 0)
        };
        let err = check_reservation(&policy, &colliding, &court, &[existing.clone()], 0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ClubError::Conflict(_)));

        let adjacent = NewReservation {
            starts_at: existing.ends_at,
            ends_at: existing.ends_at + Duration::minutes(60),
            ..request(&court, 0, 0)
        };
        check_reservation(&policy, &adjacent, &court, &[existing], 0, Utc::now()).unwrap();
    }

    #[test]
    fn test_check_reservation_rejects_closed_court_and_quota() {
        let policy = ReservationPolicy::default();
        let mut court = court();
        let new_reservation = request(&court, 60, 60);

        let err = check_reservation(&policy, &new_reservation, &court, &[], 3, Utc::now()).unwrap_err();
        assert!(matches!(err, ClubError::Conflict(_)));

        court.active = false;
        let err = check_reservation(&policy, &new_reservation, &court, &[], 0, Utc::now()).unwrap_err();
        assert!(matches!(err, ClubError::InvalidInput(_)));
    }

    #[test]
    fn test_may_cancel() {
        let owner = member("owner", false);
        let other = member("other", false);
        let admin = member("admin", true);
        let court = court();
        let now = Utc::now();

        let mut reservation = request(&court, 60, 60).into_reservation();
        reservation.member_id = owner.id;

        may_cancel(&reservation, &owner, now).unwrap();
        may_cancel(&reservation, &admin, now).unwrap();
        assert!(matches!(
            may_cancel(&reservation, &other, now),
            Err(ClubError::Forbidden(_))
        ));

        reservation.starts_at = now - Duration::minutes(10);
        assert!(may_cancel(&reservation, &owner, now).is_err());
        may_cancel(&reservation, &admin, now).unwrap();
    }

    #[test]
    fn test_favourite_candidates_exclude_self_and_existing() {
        let me = member("me", false);
        let liked = member("liked", false);
        let other = member("other", false);
        let members = vec![me.clone(), liked.clone(), other.clone()];

        let candidates = favourite_candidates(&members, me.id, &[liked.clone()]);
        assert_eq!(candidates, vec![other.clone()]);

        let candidates = favourite_candidates(&members, me.id, &[]);
        assert_eq!(candidates.len(), 2);
        assert!(!candidates.contains(&me));

        check_favourite(me.id, me.id).unwrap_err();
        check_favourite(me.id, liked.id).unwrap();
    }
}
