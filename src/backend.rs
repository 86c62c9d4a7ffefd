use crate::error::ClubError;
use crate::types::{
    Court, Member, NewCourt, NewMember, NewReservation, ProfileUpdate, Reservation,
    ReservationFilter,
};
use uuid::Uuid;

pub trait ClubBackend: Clone + Send + Sync + 'static {
    fn members(&self) -> Result<Vec<Member>, ClubError>;
    fn member(&self, id: Uuid) -> Result<Member, ClubError>;
    fn member_by_email(&self, email: &str) -> Result<Option<Member>, ClubError>;
    fn add_member(&self, new_member: NewMember) -> Result<Member, ClubError>;
    fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Member, ClubError>;
    fn remove_member(&self, id: Uuid) -> Result<(), ClubError>;

    fn courts(&self) -> Result<Vec<Court>, ClubError>;
    fn add_court(&self, new_court: NewCourt) -> Result<Court, ClubError>;
    fn set_court_active(&self, id: Uuid, active: bool) -> Result<Court, ClubError>;
    fn remove_court(&self, id: Uuid) -> Result<(), ClubError>;

    fn reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, ClubError>;
    fn reserve(&self, request: NewReservation) -> Result<Reservation, ClubError>;
    fn cancel_reservation(&self, id: Uuid, actor: &Member) -> Result<(), ClubError>;

    fn favourites(&self, member_id: Uuid) -> Result<Vec<Member>, ClubError>;
    fn add_favourite(&self, member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError>;
    fn remove_favourite(&self, member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError>;
}
