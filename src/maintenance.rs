//! Administrative commands that run next to (not inside) the web server:
//! seeding, rebuilding the schema, inspecting it and repairing the migration
//! version markers.

use crate::auth::hash_password;
use crate::backend::ClubBackend;
use crate::configuration::{AdminAccount, Profile};
use crate::database_interface::{DatabaseInterface, MIGRATIONS};
use crate::error::ClubError;
use crate::types::{NewCourt, NewMember};
use diesel::migration::{MigrationConnection, MigrationSource};
use diesel::pg::Pg;
use diesel::sql_types::{BigInt, Text};
use diesel::{Connection, PgConnection, QueryableByName, RunQueryDsl};
use std::fmt;
use tracing::{info, warn};

const MIGRATION_TABLE: &str = "__diesel_schema_migrations";

/// Tables owned by the club, children first.
const CLUB_TABLES: [&str; 4] = ["favourites", "reservations", "courts", "members"];

const DEFAULT_COURTS: [(&str, &str, bool); 4] = [
    ("Court 1", "clay", false),
    ("Court 2", "clay", false),
    ("Court 3", "hard", false),
    ("Court 4", "grass", true),
];

const DEFAULT_ADMIN_PASSWORD: &str = "change-me-now";

pub const DEMO_PASSWORD: &str = "demo-password";

const DEMO_MEMBERS: [(&str, &str, &str); 4] = [
    ("anna.berger@example.com", "Anna", "Berger"),
    ("lukas.huber@example.com", "Lukas", "Huber"),
    ("sophie.wagner@example.com", "Sophie", "Wagner"),
    ("felix.gruber@example.com", "Felix", "Gruber"),
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub courts_created: usize,
    pub admin_created: bool,
    pub demo_members_created: usize,
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} court(s) created, admin {}, {} demo member(s) created",
            self.courts_created,
            if self.admin_created {
                "created"
            } else {
                "already present"
            },
            self.demo_members_created
        )
    }
}

/// Creates whatever is missing of the default courts, the admin account and
/// (with `demo`) the demo members. Running it twice changes nothing.
pub fn seed<T: ClubBackend>(
    backend: &T,
    admin: &AdminAccount,
    profile: Profile,
    demo: bool,
) -> Result<SeedReport, ClubError> {
    if demo && profile == Profile::Production {
        return Err(ClubError::Configuration(
            "demo members are not created in production".into(),
        ));
    }
    let mut report = SeedReport::default();

    let courts = backend.courts()?;
    for (name, surface, indoor) in DEFAULT_COURTS {
        if courts.iter().any(|court| court.name == name) {
            continue;
        }
        backend.add_court(NewCourt {
            name: name.into(),
            surface: surface.into(),
            indoor,
        })?;
        report.courts_created += 1;
    }

    if backend.member_by_email(&admin.email)?.is_none() {
        let password = match (&admin.password, profile.allows_default_admin_password()) {
            (Some(password), _) => password.as_str(),
            (None, true) => {
                warn!(email = %admin.email, "ADMIN_PASSWORD not set, using the default password");
                DEFAULT_ADMIN_PASSWORD
            }
            (None, false) => {
                return Err(ClubError::Configuration(
                    "ADMIN_PASSWORD is required to create the admin account".into(),
                ))
            }
        };
        backend.add_member(NewMember {
            email: admin.email.clone(),
            first_name: "Club".into(),
            last_name: "Admin".into(),
            phone: None,
            password_hash: hash_password(password),
            is_admin: true,
        })?;
        report.admin_created = true;
    }

    if demo {
        for (email, first_name, last_name) in DEMO_MEMBERS {
            if backend.member_by_email(email)?.is_some() {
                continue;
            }
            backend.add_member(NewMember {
                email: email.into(),
                first_name: first_name.into(),
                last_name: last_name.into(),
                phone: None,
                password_hash: hash_password(DEMO_PASSWORD),
                is_admin: false,
            })?;
            report.demo_members_created += 1;
        }
    }

    info!(%report, "Seeding finished");
    Ok(report)
}

/// Versions of the migrations compiled into the binary, oldest first.
pub fn known_versions() -> Result<Vec<String>, ClubError> {
    let migrations = MigrationSource::<Pg>::migrations(&MIGRATIONS)
        .map_err(|err| ClubError::Migration(err.to_string()))?;
    let mut versions: Vec<String> = migrations
        .iter()
        .map(|migration| migration.name().version().to_string())
        .collect();
    versions.sort();
    Ok(versions)
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    table_name: String,
}

#[derive(QueryableByName)]
struct RowCount {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct MarkerVersion {
    #[diesel(sql_type = Text)]
    version: String,
}

fn connection(
    database: &DatabaseInterface,
) -> Result<
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>,
    ClubError,
> {
    database
        .pool()
        .get()
        .map_err(|err| ClubError::Connection(err.to_string()))
}

fn table_names(connection: &mut PgConnection) -> Result<Vec<String>, ClubError> {
    let tables = diesel::sql_query(
        "SELECT table_name::text AS table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name",
    )
    .load::<TableName>(connection)?;
    Ok(tables.into_iter().map(|table| table.table_name).collect())
}

fn marker_versions(connection: &mut PgConnection) -> Result<Vec<String>, ClubError> {
    let versions = diesel::sql_query(format!(
        "SELECT version::text AS version FROM {MIGRATION_TABLE} ORDER BY version"
    ))
    .load::<MarkerVersion>(connection)?;
    Ok(versions.into_iter().map(|marker| marker.version).collect())
}

/// Drops every club table together with the migration markers and builds the
/// schema again from the embedded migrations.
pub fn recreate(database: &DatabaseInterface) -> Result<Vec<String>, ClubError> {
    let mut connection = connection(database)?;
    let tables = CLUB_TABLES
        .iter()
        .copied()
        .chain([MIGRATION_TABLE])
        .collect::<Vec<_>>()
        .join(", ");
    diesel::sql_query(format!("DROP TABLE IF EXISTS {tables} CASCADE"))
        .execute(&mut connection)?;
    warn!(%tables, "Dropped club tables");
    drop(connection);

    database.run_migrations()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied: Vec<String>,
    pub pending: Vec<String>,
    pub unknown: Vec<String>,
}

impl MigrationStatus {
    pub fn compare(known: &[String], markers: &[String]) -> Self {
        Self {
            applied: known
                .iter()
                .filter(|version| markers.contains(version))
                .cloned()
                .collect(),
            pending: known
                .iter()
                .filter(|version| !markers.contains(version))
                .cloned()
                .collect(),
            unknown: markers
                .iter()
                .filter(|version| !known.contains(version))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InspectReport {
    pub tables: Vec<(String, i64)>,
    pub migrations: MigrationStatus,
}

fn version_list(versions: &[String]) -> String {
    if versions.is_empty() {
        "none".into()
    } else {
        versions.join(", ")
    }
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tables:")?;
        if self.tables.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (name, rows) in &self.tables {
            writeln!(f, "  {name:<30} {rows:>8} row(s)")?;
        }
        writeln!(
            f,
            "Applied migrations: {}",
            version_list(&self.migrations.applied)
        )?;
        writeln!(
            f,
            "Pending migrations: {}",
            version_list(&self.migrations.pending)
        )?;
        write!(
            f,
            "Unknown migration markers: {}",
            version_list(&self.migrations.unknown)
        )
    }
}

/// Read-only overview of the database. The marker table is not created if it
/// is missing.
pub fn inspect(database: &DatabaseInterface) -> Result<InspectReport, ClubError> {
    let mut connection = connection(database)?;
    let names = table_names(&mut connection)?;

    let mut tables = Vec::with_capacity(names.len());
    for name in &names {
        let query = format!(
            "SELECT COUNT(*) AS count FROM \"{}\"",
            name.replace('"', "\"\"")
        );
        let rows = diesel::sql_query(query).get_result::<RowCount>(&mut connection)?;
        tables.push((name.clone(), rows.count));
    }

    let markers = if names.iter().any(|name| name == MIGRATION_TABLE) {
        marker_versions(&mut connection)?
    } else {
        Vec::new()
    };
    Ok(InspectReport {
        tables,
        migrations: MigrationStatus::compare(&known_versions()?, &markers),
    })
}

/// Marker rows to add and remove so that exactly the known migrations up to
/// the target count as applied.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MarkerPlan {
    pub insert: Vec<String>,
    pub delete: Vec<String>,
}

impl MarkerPlan {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }
}

pub fn reconcile_versions(
    known: &[String],
    markers: &[String],
    target: Option<&str>,
) -> Result<MarkerPlan, ClubError> {
    let wanted = match target {
        Some(target) => {
            let position = known
                .iter()
                .position(|version| version == target)
                .ok_or_else(|| {
                    ClubError::InvalidInput(format!("Unknown migration version {target}"))
                })?;
            &known[..=position]
        }
        None => known,
    };

    Ok(MarkerPlan {
        insert: wanted
            .iter()
            .filter(|version| !markers.contains(version))
            .cloned()
            .collect(),
        delete: markers
            .iter()
            .filter(|version| !wanted.contains(version))
            .cloned()
            .collect(),
    })
}

/// Rewrites the marker table so that the migrations up to `target` (default:
/// the latest one) are recorded as applied. The schema itself is not touched.
pub fn fix_migration(
    database: &DatabaseInterface,
    target: Option<&str>,
) -> Result<MarkerPlan, ClubError> {
    let mut connection = connection(database)?;
    let connection: &mut PgConnection = &mut connection;
    MigrationConnection::setup(connection)?;

    let markers = marker_versions(connection)?;
    let plan = reconcile_versions(&known_versions()?, &markers, target)?;
    if plan.is_empty() {
        info!("Migration markers are already consistent");
        return Ok(plan);
    }

    connection.transaction(|connection| {
        for version in &plan.delete {
            diesel::sql_query(format!("DELETE FROM {MIGRATION_TABLE} WHERE version = $1"))
                .bind::<Text, _>(version)
                .execute(connection)?;
        }
        for version in &plan.insert {
            diesel::sql_query(format!(
                "INSERT INTO {MIGRATION_TABLE} (version) VALUES ($1) ON CONFLICT DO NOTHING"
            ))
            .bind::<Text, _>(version)
            .execute(connection)?;
        }
        Ok::<_, ClubError>(())
    })?;
    info!(inserted = ?plan.insert, deleted = ?plan.delete, "Migration markers fixed");
    Ok(plan)
}
