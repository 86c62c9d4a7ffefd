use crate::backend::ClubBackend;
use crate::error::ClubError;
use crate::reservation_rules::{self, ReservationPolicy};
use crate::schema::{courts, favourites, members, reservations};
use crate::types::{
    normalize_email, sort_members, Court, Favourite, Member, NewCourt, NewMember, NewReservation,
    ProfileUpdate, Reservation, ReservationFilter,
};
use chrono::Utc;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, PgConnection, QueryDsl,
    RunQueryDsl, SelectableHelper,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
type DbConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct DatabaseInterface {
    pool: DbPool,
    policy: ReservationPolicy,
}

impl DatabaseInterface {
    pub fn new(database_url: &str, policy: ReservationPolicy) -> Result<Self, ClubError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .map_err(|err| ClubError::Connection(err.to_string()))?;
        Ok(Self { pool, policy })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn connection(&self) -> Result<DbConnection, ClubError> {
        self.pool
            .get()
            .map_err(|err| ClubError::Connection(err.to_string()))
    }

    /// Applies pending migrations and returns the versions that were run.
    pub fn run_migrations(&self) -> Result<Vec<String>, ClubError> {
        let mut connection = self.connection()?;
        let connection: &mut PgConnection = &mut connection;
        let applied = connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| ClubError::Migration(err.to_string()))?;
        let applied: Vec<String> = applied.iter().map(ToString::to_string).collect();
        if !applied.is_empty() {
            info!(?applied, "Applied database migrations");
        }
        Ok(applied)
    }
}

fn unique_violation(err: DieselError, message: &str) -> ClubError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            warn!("{message}");
            ClubError::Conflict(message.into())
        }
        err => err.into(),
    }
}

fn member_exists(connection: &mut PgConnection, id: Uuid) -> Result<bool, ClubError> {
    Ok(members::table
        .find(id)
        .select(members::id)
        .first::<Uuid>(connection)
        .optional()?
        .is_some())
}

impl ClubBackend for DatabaseInterface {
    fn members(&self) -> Result<Vec<Member>, ClubError> {
        let mut connection = self.connection()?;
        let mut members = members::table
            .select(Member::as_select())
            .load(&mut connection)?;
        sort_members(&mut members);
        Ok(members)
    }

    fn member(&self, id: Uuid) -> Result<Member, ClubError> {
        let mut connection = self.connection()?;
        members::table
            .find(id)
            .select(Member::as_select())
            .first(&mut connection)
            .optional()?
            .ok_or(ClubError::NotFound("member"))
    }

    fn member_by_email(&self, email: &str) -> Result<Option<Member>, ClubError> {
        let mut connection = self.connection()?;
        Ok(members::table
            .filter(members::email.eq(normalize_email(email)))
            .select(Member::as_select())
            .first(&mut connection)
            .optional()?)
    }

    fn add_member(&self, new_member: NewMember) -> Result<Member, ClubError> {
        let mut connection = self.connection()?;
        let member = new_member.into_member();
        diesel::insert_into(members::table)
            .values(&member)
            .execute(&mut connection)
            .map_err(|err| unique_violation(err, "A member with this email already exists"))?;
        info!(id = %member.id, "Member added");
        Ok(member)
    }

    fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Member, ClubError> {
        let update = update.normalized();
        let mut connection = self.connection()?;
        diesel::update(members::table.find(id))
            .set((
                members::first_name.eq(update.first_name),
                members::last_name.eq(update.last_name),
                members::phone.eq(update.phone),
            ))
            .returning(Member::as_returning())
            .get_result(&mut connection)
            .optional()?
            .ok_or(ClubError::NotFound("member"))
    }

    fn remove_member(&self, id: Uuid) -> Result<(), ClubError> {
        let mut connection = self.connection()?;
        // reservations and favourites go with the member (ON DELETE CASCADE)
        match diesel::delete(members::table.find(id)).execute(&mut connection)? {
            0 => Err(ClubError::NotFound("member")),
            _ => {
                info!(%id, "Member removed");
                Ok(())
            }
        }
    }

    fn courts(&self) -> Result<Vec<Court>, ClubError> {
        let mut connection = self.connection()?;
        Ok(courts::table
            .select(Court::as_select())
            .order(courts::name.asc())
            .load(&mut connection)?)
    }

    fn add_court(&self, new_court: NewCourt) -> Result<Court, ClubError> {
        let mut connection = self.connection()?;
        let court = new_court.into_court();
        diesel::insert_into(courts::table)
            .values(&court)
            .execute(&mut connection)
            .map_err(|err| {
                unique_violation(err, &format!("A court named {} already exists", court.name))
            })?;
        Ok(court)
    }

    fn set_court_active(&self, id: Uuid, active: bool) -> Result<Court, ClubError> {
        let mut connection = self.connection()?;
        diesel::update(courts::table.find(id))
            .set(courts::active.eq(active))
            .returning(Court::as_returning())
            .get_result(&mut connection)
            .optional()?
            .ok_or(ClubError::NotFound("court"))
    }

    fn remove_court(&self, id: Uuid) -> Result<(), ClubError> {
        let mut connection = self.connection()?;
        match diesel::delete(courts::table.find(id)).execute(&mut connection)? {
            0 => Err(ClubError::NotFound("court")),
            _ => Ok(()),
        }
    }

    fn reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, ClubError> {
        let mut connection = self.connection()?;
        let mut query = reservations::table
            .select(Reservation::as_select())
            .order(reservations::starts_at.asc())
            .into_boxed();
        if let Some(member_id) = filter.member_id {
            query = query.filter(reservations::member_id.eq(member_id));
        }
        if let Some(court_id) = filter.court_id {
            query = query.filter(reservations::court_id.eq(court_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(reservations::ends_at.gt(from));
        }
        if let Some(until) = filter.until {
            query = query.filter(reservations::starts_at.lt(until));
        }
        Ok(query.load(&mut connection)?)
    }

    fn reserve(&self, request: NewReservation) -> Result<Reservation, ClubError> {
        let mut connection = self.connection()?;
        let now = Utc::now();

        // Serializable so two concurrent requests can't both pass the overlap check.
        let reservation = connection
            .build_transaction()
            .serializable()
            .run(|connection| {
                if !member_exists(connection, request.member_id)? {
                    return Err(ClubError::NotFound("member"));
                }
                let court = courts::table
                    .find(request.court_id)
                    .select(Court::as_select())
                    .first(connection)
                    .optional()?
                    .ok_or(ClubError::NotFound("court"))?;

                let on_court = reservations::table
                    .filter(reservations::court_id.eq(request.court_id))
                    .filter(
                        reservations::ends_at
                            .gt(request.starts_at)
                            .and(reservations::starts_at.lt(request.ends_at)),
                    )
                    .select(Reservation::as_select())
                    .load(connection)?;
                let active_for_member: i64 = reservations::table
                    .filter(reservations::member_id.eq(request.member_id))
                    .filter(reservations::ends_at.gt(now))
                    .count()
                    .get_result(connection)?;

                reservation_rules::check_reservation(
                    &self.policy,
                    &request,
                    &court,
                    &on_court,
                    usize::try_from(active_for_member).unwrap_or(usize::MAX),
                    now,
                )?;

                let reservation = request.into_reservation();
                diesel::insert_into(reservations::table)
                    .values(&reservation)
                    .execute(connection)?;
                Ok(reservation)
            })?;

        info!(id = %reservation.id, court = %reservation.court_id, "Reservation created");
        Ok(reservation)
    }

    fn cancel_reservation(&self, id: Uuid, actor: &Member) -> Result<(), ClubError> {
        let mut connection = self.connection()?;
        connection.build_transaction().run(|connection| {
            let reservation = reservations::table
                .find(id)
                .select(Reservation::as_select())
                .first(connection)
                .optional()?
                .ok_or(ClubError::NotFound("reservation"))?;
            reservation_rules::may_cancel(&reservation, actor, Utc::now())?;
            diesel::delete(reservations::table.find(id)).execute(connection)?;
            Ok::<_, ClubError>(())
        })?;
        info!(%id, by = %actor.id, "Reservation cancelled");
        Ok(())
    }

    fn favourites(&self, member_id: Uuid) -> Result<Vec<Member>, ClubError> {
        let mut connection = self.connection()?;
        let mut favourites = favourites::table
            .inner_join(members::table)
            .filter(favourites::member_id.eq(member_id))
            .select(Member::as_select())
            .load(&mut connection)?;
        sort_members(&mut favourites);
        Ok(favourites)
    }

    fn add_favourite(&self, member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError> {
        reservation_rules::check_favourite(member_id, favourite_id)?;
        let mut connection = self.connection()?;
        if !member_exists(&mut connection, member_id)?
            || !member_exists(&mut connection, favourite_id)?
        {
            return Err(ClubError::NotFound("member"));
        }

        let favourite = Favourite {
            member_id,
            favourite_id,
            created_at: Utc::now(),
        };
        diesel::insert_into(favourites::table)
            .values(&favourite)
            .execute(&mut connection)
            .map_err(|err| unique_violation(err, "Member is already one of your favourites"))?;
        Ok(())
    }

    fn remove_favourite(&self, member_id: Uuid, favourite_id: Uuid) -> Result<(), ClubError> {
        let mut connection = self.connection()?;
        match diesel::delete(favourites::table.find((member_id, favourite_id)))
            .execute(&mut connection)?
        {
            0 => Err(ClubError::NotFound("favourite")),
            _ => Ok(()),
        }
    }
}
