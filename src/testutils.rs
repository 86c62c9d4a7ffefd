use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    thread,
    time::Duration as StdDuration,
};

use chrono::Duration;
use reqwest::{redirect::Policy, Client, StatusCode};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    auth::hash_password,
    backend::ClubBackend,
    error::ClubError,
    http::create_app,
    local_club::LocalClub,
    reservation_rules::ReservationPolicy,
    session::SessionStore,
    types::{
        Court, Member, NewCourt, NewMember, NewReservation, ProfileUpdate, Reservation,
        ReservationFilter,
    },
    AppState, SiteSettings,
};

pub const EXAMPLE_PASSWORD: &str = "correct horse battery";

/// A regular member called `name` whose email is `<name>@example.com`.
pub fn example_member(name: &str) -> NewMember {
    NewMember {
        email: format!("{}@example.com", name.to_lowercase()),
        first_name: name.into(),
        last_name: "Member".into(),
        phone: None,
        password_hash: hash_password(EXAMPLE_PASSWORD),
        is_admin: false,
    }
}

pub fn example_court(name: &str) -> NewCourt {
    NewCourt {
        name: name.into(),
        surface: "clay".into(),
        indoor: false,
    }
}

pub fn test_state<T: ClubBackend>(backend: T) -> AppState<T> {
    AppState {
        backend,
        sessions: SessionStore::new(Duration::hours(1)),
        site: Arc::new(SiteSettings {
            title: "Test Club".into(),
            secure_cookies: false,
            policy: ReservationPolicy::default(),
        }),
    }
}

/// Serves the app on an ephemeral port and returns its base url.
pub async fn spawn_app<T: ClubBackend>(state: AppState<T>) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    let app = create_app(state);
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (address, server)
}

/// Keeps cookies and never follows redirects, so tests can inspect them.
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .build()
        .unwrap()
}

pub async fn login(client: &Client, address: &str, email: &str) {
    let response = client
        .post(format!("{address}/login"))
        .form(&[("email", email), ("password", EXAMPLE_PASSWORD)])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER, "login of {email} failed");
}

pub struct MockClubBackendInner {
    pub club: LocalClub,
    pub failing: Mutex<HashSet<&'static str>>,
    pub calls: Mutex<HashMap<&'static str, u64>>,
    pub delays: Mutex<HashMap<&'static str, StdDuration>>,
}

/// Forwards to a [`LocalClub`] and counts calls per operation. Operations
/// passed to [`MockClubBackend::fail`] return an internal error instead, and
/// operations passed to [`MockClubBackend::delay`] block the calling thread
/// first, like a slow database would.
#[derive(Clone)]
pub struct MockClubBackend(pub Arc<MockClubBackendInner>);

impl MockClubBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockClubBackendInner {
            club: LocalClub::default(),
            failing: Mutex::default(),
            calls: Mutex::default(),
            delays: Mutex::default(),
        }))
    }

    pub fn delay(&self, operation: &'static str, delay: StdDuration) {
        self.0.delays.lock().unwrap().insert(operation, delay);
    }

    pub fn fail(&self, operation: &'static str) {
        self.0.failing.lock().unwrap().insert(operation);
    }

    pub fn calls(&self, operation: &str) -> u64 {
        self.0
            .calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    fn record(&self, operation: &'static str) -> Result<&LocalClub, ClubError> {
        *self.0.calls.lock().unwrap().entry(operation).or_default() += 1;
        let delay = self.0.delays.lock().unwrap().get(operation).copied();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        match self.0.failing.lock().unwrap().contains(operation) {
            true => Err(ClubError::Connection("Supposed to fail".into())),
            false => Ok(&self.0.club),
        }
    }
}

impl ClubBackend for MockClubBackend {
    fn members(&self) -> Result<Vec<Member>, ClubError> {
        self.record("members")?.members()
    }

    fn member(&self, id: Uuid) -> Result<Member, ClubError> {
        self.record("member")?.member(id)
    }

    fn member_by_email(&self, email: &str) -> Result<Option<Member>, ClubError> {
        self.record("member_by_email")?.member_by_email(email)
    }

    fn add_member(&self, new_member: NewMember) -> Result<Member, ClubError> {
        self.record("add_member")?.add_member(new_member)
    }

    fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Member, ClubError> {
        self.record("update_profile")?.update_profile(id, update)
    }

    fn remove_member(&self, id: Uuid) -> Result<(), ClubError> {
        self.record("remove_member")?.remove_member(id)
    }

    fn courts(&self) -> Result<Vec<Court>, ClubError> {
        self.record("courts")?.courts()
    }

    fn add_court(&self, new_court: NewCourt) -> Result<Court, ClubError> {
        self.record("add_court")?.add_court(new_court)
    }

    fn set_court_active(&self, id: Uuid, active: bool) -> Result<Court, ClubError> {
        self.record("set_court_active")?.set_court_active(id, active)
    }

    fn remove_court(&self, id: Uuid) -> Result<(), ClubError> {
        self.record("remove_court")?.remove_court(id)
    }

    fn reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, ClubError> {
        self.record("reservations")?.reservations(filter)
    }

    fn reserve(&self, request: NewReservation) -> Result<Reservation, ClubError> {
        self.record("reserve")?.reserve(request)
    }

    fn cancel_reservation(&self, id: Uuid, actor: &Member) -> Result<(), ClubError> {
        self.record("cancel_reservation")?.cancel_reservation(id, actor)
    }

    fn favourites(&self, member_id: Uuid) -> Result<Vec<Member>, ClubError> {
        self.record("favourites")?.favourites(member_id)
    }

    fn add_favourite(&self, member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError> {
        self.record("add_favourite")?.add_favourite(member_id, favourite_id)
    }

    fn remove_favourite(&self, member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError> {
        self.record("remove_favourite")?
            .remove_favourite(member_id, favourite_id)
    }
}
