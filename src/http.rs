use crate::auth;
use crate::backend::ClubBackend;
use crate::error::{ApiError, ClubError};
use crate::forms::{
    offered_durations, parse_local_datetime, validation_messages, ApiReservationRequest,
    CourtForm, FavouriteForm, LoginForm, LoginQuery, ProfileForm, ProfileQuery, RegisterForm,
    ReservationForm, ReservationQuery,
};
use crate::pages::{self, PageContext, RegisterValues, ReservationRow};
use crate::reservation_rules::favourite_candidates;
use crate::session::{removal_cookie, session_cookie, session_token};
use crate::types::{
    Court, Member, NewCourt, NewMember, NewReservation, Reservation, ReservationFilter,
};
use crate::AppState;
use axum::extract::{Path, Query, Request};
use axum::http::uri::PathAndQuery;
use axum::middleware::{self, Next};
use axum::response::{Html, Redirect, Response};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Form, Json};
use axum::{
    routing::{get, post},
    Router,
};
use axum_extra::extract::{cookie::CookieJar, WithRejection};
use axum_valid::Valid;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

const HOME: &str = "/members/favourites";

/// The member behind the session cookie, inserted by [`require_login`].
#[derive(Debug, Clone)]
pub struct CurrentMember(pub Member);

pub fn create_app<T: ClubBackend>(state: AppState<T>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/", get(index::<T>))
        .route("/health", get(health))
        .route("/login", get(get_login::<T>).post(post_login::<T>))
        .route("/logout", post(logout::<T>))
        .route("/register", get(get_register::<T>).post(post_register::<T>));

    let members = Router::new()
        .route("/members", get(get_members::<T>))
        .route("/members/profile", get(get_profile::<T>).post(post_profile::<T>))
        .route(
            "/members/favourites",
            get(get_favourites::<T>).post(add_favourite::<T>),
        )
        .route(
            "/members/favourites/{id}/remove",
            post(remove_favourite::<T>),
        )
        .route("/courts", get(get_courts::<T>))
        .route(
            "/reservations",
            get(get_reservations::<T>).post(post_reservation::<T>),
        )
        .route("/reservations/{id}/cancel", post(cancel_reservation::<T>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_login::<T>,
        ));

    let api = Router::new()
        .route("/api/courts", get(api_courts::<T>))
        .route(
            "/api/reservations",
            get(api_reservations::<T>).post(api_reserve::<T>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_login::<T>,
        ))
        .layer(cors);

    let admin = Router::new()
        .route("/admin", get(get_admin_page::<T>))
        .route("/admin/courts", post(admin_add_court::<T>))
        .route("/admin/courts/{id}/toggle", post(admin_toggle_court::<T>))
        .route("/admin/courts/{id}/remove", post(admin_remove_court::<T>))
        .route("/admin/members/{id}/remove", post(admin_remove_member::<T>))
        .route(
            "/admin/reservations/{id}/remove",
            post(admin_remove_reservation::<T>),
        )
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_login::<T>,
        ));

    Router::new()
        .merge(public)
        .merge(members)
        .merge(api)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_login<T: ClubBackend>(
    State(state): State<AppState<T>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let is_api = request.uri().path().starts_with("/api/");
    let member = match session_token(&jar).and_then(|token| state.sessions.member_id(token)) {
        Some(id) => Some(blocking(&state, move |state| state.backend.member(id)).await),
        None => None,
    };

    match member {
        Some(Ok(member)) => {
            request.extensions_mut().insert(CurrentMember(member));
            next.run(request).await
        }
        Some(Err(ClubError::NotFound(_))) | None => {
            if is_api {
                ApiError(ClubError::Unauthorized).into_response()
            } else {
                let target = format!("/login?next={}", request.uri().path());
                Redirect::to(&target).into_response()
            }
        }
        Some(Err(err)) if is_api => ApiError(err).into_response(),
        Some(Err(err)) => err.into_response(),
    }
}

async fn require_admin(
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    request: Request,
    next: Next,
) -> Response {
    if !member.is_admin {
        return ClubError::Forbidden("Administrator rights required".into()).into_response();
    }
    next.run(request).await
}

/// Runs backend work on tokio's blocking pool. Database calls wait on the
/// connection pool and on transactions, which must not stall the async workers.
async fn blocking<T, R, F>(state: &AppState<T>, work: F) -> Result<R, ClubError>
where
    T: ClubBackend,
    R: Send + 'static,
    F: FnOnce(&AppState<T>) -> Result<R, ClubError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || work(&state)).await?
}

fn page_context<'a, T: ClubBackend>(
    state: &'a AppState<T>,
    member: Option<&'a Member>,
) -> PageContext<'a> {
    PageContext {
        site_title: &state.site.title,
        member,
    }
}

/// Only local absolute paths are accepted as redirect targets after login.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(next) if is_local_path(next) => next,
        _ => HOME,
    }
}

fn is_local_path(target: &str) -> bool {
    target.bytes().all(|byte| byte.is_ascii_graphic())
        && target.starts_with('/')
        && !target.starts_with("//")
        && !target.contains('\\')
        && target.parse::<PathAndQuery>().is_ok()
}

fn see_other(target: &str) -> Response {
    Redirect::to(target).into_response()
}

fn reservation_rows<T: ClubBackend>(
    backend: &T,
    reservations: Vec<Reservation>,
) -> Result<Vec<ReservationRow>, ClubError> {
    let courts: HashMap<Uuid, Court> = backend
        .courts()?
        .into_iter()
        .map(|court| (court.id, court))
        .collect();
    let members: HashMap<Uuid, Member> = backend
        .members()?
        .into_iter()
        .map(|member| (member.id, member))
        .collect();

    Ok(reservations
        .into_iter()
        .map(|reservation| ReservationRow {
            court_name: courts
                .get(&reservation.court_id)
                .map(|court| court.name.clone())
                .unwrap_or_default(),
            member_name: members
                .get(&reservation.member_id)
                .map(Member::full_name)
                .unwrap_or_default(),
            reservation,
        })
        .collect())
}

fn upcoming() -> ReservationFilter {
    ReservationFilter {
        from: Some(Utc::now()),
        ..Default::default()
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn index<T: ClubBackend>(State(state): State<AppState<T>>, jar: CookieJar) -> Redirect {
    let logged_in = session_token(&jar)
        .and_then(|token| state.sessions.member_id(token))
        .is_some();
    if logged_in {
        Redirect::to(HOME)
    } else {
        Redirect::to("/login")
    }
}

async fn get_login<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Query(query): Query<LoginQuery>,
) -> Html<String> {
    Html(pages::login_page(
        &page_context(&state, None),
        &[],
        "",
        query.next.as_deref(),
    ))
}

async fn post_login<T: ClubBackend>(
    State(state): State<AppState<T>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let (email, password) = (form.email.clone(), form.password);
    let result = blocking(&state, move |state| {
        auth::authenticate(&state.backend, &email, &password)
    })
    .await;

    match result {
        Ok(member) => {
            if let Some(previous) = session_token(&jar) {
                state.sessions.destroy(previous);
            }
            let token = state.sessions.create(member.id);
            info!(member = %member.id, "Member logged in");
            let jar = jar.add(session_cookie(token, state.site.secure_cookies));
            (jar, Redirect::to(safe_next(form.next.as_deref()))).into_response()
        }
        Err(err) => {
            let page = pages::login_page(
                &page_context(&state, None),
                &[err.public_message()],
                &form.email,
                form.next.as_deref(),
            );
            (err.status_code(), Html(page)).into_response()
        }
    }
}

async fn logout<T: ClubBackend>(State(state): State<AppState<T>>, jar: CookieJar) -> Response {
    if let Some(token) = session_token(&jar) {
        state.sessions.destroy(token);
    }
    (jar.remove(removal_cookie()), Redirect::to("/login")).into_response()
}

async fn get_register<T: ClubBackend>(State(state): State<AppState<T>>) -> Html<String> {
    Html(pages::register_page(
        &page_context(&state, None),
        &[],
        &RegisterValues::default(),
    ))
}

async fn post_register<T: ClubBackend>(
    State(state): State<AppState<T>>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Response {
    let values = RegisterValues {
        email: form.email.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        phone: form.phone.clone(),
    };
    let render = |status: StatusCode, errors: Vec<String>| {
        let page = pages::register_page(&page_context(&state, None), &errors, &values);
        (status, Html(page)).into_response()
    };

    if let Err(errors) = form.validate() {
        return render(StatusCode::BAD_REQUEST, validation_messages(&errors));
    }

    let result = blocking(&state, move |state| {
        state.backend.add_member(NewMember {
            email: form.email,
            first_name: form.first_name,
            last_name: form.last_name,
            phone: Some(form.phone),
            password_hash: auth::hash_password(&form.password),
            is_admin: false,
        })
    })
    .await;
    match result {
        Ok(member) => {
            info!(member = %member.id, "Member registered");
            let token = state.sessions.create(member.id);
            let jar = jar.add(session_cookie(token, state.site.secure_cookies));
            (jar, Redirect::to(HOME)).into_response()
        }
        Err(err) => render(err.status_code(), vec![err.public_message()]),
    }
}

async fn get_members<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
) -> Result<Html<String>, ClubError> {
    let member_id = member.id;
    let (members, favourites) = blocking(&state, move |state| {
        Ok((state.backend.members()?, state.backend.favourites(member_id)?))
    })
    .await?;
    Ok(Html(pages::members_page(
        &page_context(&state, Some(&member)),
        &members,
        &favourites,
    )))
}

async fn get_profile<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Query(query): Query<ProfileQuery>,
) -> Html<String> {
    Html(pages::profile_page(
        &page_context(&state, Some(&member)),
        &[],
        query.saved,
    ))
}

async fn post_profile<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Form(form): Form<ProfileForm>,
) -> Result<Response, ClubError> {
    if let Err(errors) = form.validate() {
        let page = pages::profile_page(
            &page_context(&state, Some(&member)),
            &validation_messages(&errors),
            false,
        );
        return Ok((StatusCode::BAD_REQUEST, Html(page)).into_response());
    }

    let id = member.id;
    blocking(&state, move |state| state.backend.update_profile(id, form.into())).await?;
    Ok(see_other("/members/profile?saved=true"))
}

fn render_favourites<T: ClubBackend>(
    state: &AppState<T>,
    member: &Member,
    status: StatusCode,
    errors: &[String],
) -> Result<Response, ClubError> {
    let favourites = state.backend.favourites(member.id)?;
    let members = state.backend.members()?;
    let candidates = favourite_candidates(&members, member.id, &favourites);
    let page = pages::favourites_page(
        &page_context(state, Some(member)),
        &favourites,
        &candidates,
        errors,
    );
    Ok((status, Html(page)).into_response())
}

async fn get_favourites<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        render_favourites(state, &member, StatusCode::OK, &[])
    })
    .await
}

async fn add_favourite<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Form(form): Form<FavouriteForm>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        match state.backend.add_favourite(member.id, form.favourite_id) {
            Ok(()) => Ok(see_other(HOME)),
            Err(err) if err.status_code().is_client_error() => render_favourites(
                state,
                &member,
                err.status_code(),
                &[err.public_message()],
            ),
            Err(err) => Err(err),
        }
    })
    .await
}

async fn remove_favourite<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Path(favourite_id): Path<Uuid>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        state.backend.remove_favourite(member.id, favourite_id)
    })
    .await?;
    Ok(see_other(HOME))
}

async fn get_courts<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
) -> Result<Html<String>, ClubError> {
    let courts = blocking(&state, |state| state.backend.courts()).await?;
    Ok(Html(pages::courts_page(
        &page_context(&state, Some(&member)),
        &courts,
    )))
}

fn render_reservations<T: ClubBackend>(
    state: &AppState<T>,
    member: &Member,
    status: StatusCode,
    errors: &[String],
) -> Result<Response, ClubError> {
    let reservations = state.backend.reservations(&upcoming())?;
    let rows = reservation_rows(&state.backend, reservations)?;
    let courts = state.backend.courts()?;
    let page = pages::reservations_page(
        &page_context(state, Some(member)),
        &rows,
        &courts,
        errors,
        &offered_durations(&state.site.policy),
    );
    Ok((status, Html(page)).into_response())
}

async fn get_reservations<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        render_reservations(state, &member, StatusCode::OK, &[])
    })
    .await
}

async fn post_reservation<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Form(form): Form<ReservationForm>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        if let Err(errors) = form.validate() {
            return render_reservations(
                state,
                &member,
                StatusCode::BAD_REQUEST,
                &validation_messages(&errors),
            );
        }

        let result = parse_local_datetime(&form.starts_at).and_then(|starts_at| {
            state.backend.reserve(NewReservation {
                member_id: member.id,
                court_id: form.court_id,
                starts_at,
                ends_at: starts_at + Duration::minutes(form.duration_minutes),
                notes: form.notes,
            })
        });
        match result {
            Ok(_) => Ok(see_other("/reservations")),
            Err(err) if err.status_code().is_client_error() => render_reservations(
                state,
                &member,
                err.status_code(),
                &[err.public_message()],
            ),
            Err(err) => Err(err),
        }
    })
    .await
}

async fn cancel_reservation<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Path(id): Path<Uuid>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        state.backend.cancel_reservation(id, &member)
    })
    .await?;
    Ok(see_other("/reservations"))
}

async fn api_courts<T: ClubBackend>(
    State(state): State<AppState<T>>,
) -> Result<Json<Vec<Court>>, ApiError> {
    Ok(Json(blocking(&state, |state| state.backend.courts()).await?))
}

async fn api_reservations<T: ClubBackend>(
    State(state): State<AppState<T>>,
    WithRejection(Query(query), _): WithRejection<Query<ReservationQuery>, ApiError>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let filter = ReservationFilter {
        member_id: None,
        court_id: query.court_id,
        from: query.from,
        until: query.until,
    };
    let reservations = blocking(&state, move |state| state.backend.reservations(&filter)).await?;
    Ok(Json(reservations))
}

async fn api_reserve<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    WithRejection(Valid(Json(request)), _): WithRejection<
        Valid<Json<ApiReservationRequest>>,
        ApiError,
    >,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let new_reservation = NewReservation {
        member_id: member.id,
        court_id: request.court_id,
        starts_at: request.starts_at,
        ends_at: request.starts_at + Duration::minutes(request.duration_minutes),
        notes: request.notes,
    };
    let reservation = blocking(&state, move |state| state.backend.reserve(new_reservation)).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

fn render_admin_page<T: ClubBackend>(
    state: &AppState<T>,
    member: &Member,
    status: StatusCode,
    errors: &[String],
) -> Result<Response, ClubError> {
    let members = state.backend.members()?;
    let courts = state.backend.courts()?;
    let reservations = state.backend.reservations(&upcoming())?;
    let rows = reservation_rows(&state.backend, reservations)?;
    let page = pages::admin_page(
        &page_context(state, Some(member)),
        &members,
        &courts,
        &rows,
        errors,
    );
    Ok((status, Html(page)).into_response())
}

async fn get_admin_page<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        render_admin_page(state, &member, StatusCode::OK, &[])
    })
    .await
}

async fn admin_add_court<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Form(form): Form<CourtForm>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        if let Err(errors) = form.validate() {
            return render_admin_page(
                state,
                &member,
                StatusCode::BAD_REQUEST,
                &validation_messages(&errors),
            );
        }

        let new_court = NewCourt {
            name: form.name,
            surface: form.surface,
            indoor: form.indoor,
        };
        match state.backend.add_court(new_court) {
            Ok(court) => {
                info!(court = %court.id, name = %court.name, "Court added");
                Ok(see_other("/admin"))
            }
            Err(err) if err.status_code().is_client_error() => render_admin_page(
                state,
                &member,
                err.status_code(),
                &[err.public_message()],
            ),
            Err(err) => Err(err),
        }
    })
    .await
}

async fn admin_toggle_court<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ClubError> {
    let court = blocking(&state, move |state| {
        let court = state
            .backend
            .courts()?
            .into_iter()
            .find(|court| court.id == id)
            .ok_or(ClubError::NotFound("court"))?;
        state.backend.set_court_active(id, !court.active)
    })
    .await?;
    info!(court = %court.id, active = court.active, "Court toggled");
    Ok(see_other("/admin"))
}

async fn admin_remove_court<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| state.backend.remove_court(id)).await?;
    info!(court = %id, "Court removed");
    Ok(see_other("/admin"))
}

async fn admin_remove_member<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Path(id): Path<Uuid>,
) -> Result<Response, ClubError> {
    if id == member.id {
        return Err(ClubError::InvalidInput(
            "Administrators can't delete their own account".into(),
        ));
    }
    blocking(&state, move |state| state.backend.remove_member(id)).await?;
    state.sessions.destroy_for_member(id);
    info!(member = %id, by = %member.id, "Member removed");
    Ok(see_other("/admin"))
}

async fn admin_remove_reservation<T: ClubBackend>(
    State(state): State<AppState<T>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    Path(id): Path<Uuid>,
) -> Result<Response, ClubError> {
    blocking(&state, move |state| {
        state.backend.cancel_reservation(id, &member)
    })
    .await?;
    Ok(see_other("/admin"))
}
