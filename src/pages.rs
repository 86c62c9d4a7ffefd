//! Server-rendered HTML pages.
//!
//! Every value that originates from a member (names, notes, form input) goes
//! through [`escape`] before it is placed into markup.

use crate::types::{Court, Member, Reservation};
use axum::http::StatusCode;
use chrono::{DateTime, Local, Utc};

pub struct PageContext<'a> {
    pub site_title: &'a str,
    pub member: Option<&'a Member>,
}

/// A reservation together with the names needed to display it.
pub struct ReservationRow {
    pub reservation: Reservation,
    pub court_name: String,
    pub member_name: String,
}

#[derive(Debug, Default, Clone)]
pub struct RegisterValues {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn format_time(datetime: DateTime<Utc>) -> String {
    datetime
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn layout(context: &PageContext, heading: &str, body: &str) -> String {
    let nav = match context.member {
        Some(member) => {
            let admin_link = if member.is_admin {
                r#"<a href="/admin">Admin</a>"#
            } else {
                ""
            };
            format!(
                r#"<nav id="main-nav">
<a href="/members/favourites">Favourites</a>
<a href="/reservations">Reservations</a>
<a href="/courts">Courts</a>
<a href="/members">Members</a>
<a href="/members/profile">Profile</a>
{admin_link}
<form method="post" action="/logout" class="inline"><button type="submit" id="logout-button">Log out ({name})</button></form>
</nav>"#,
                name = escape(&member.full_name()),
            )
        }
        None => r#"<nav id="main-nav"><a href="/login">Log in</a> <a href="/register">Register</a></nav>"#
            .to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{heading} | {site}</title>
</head>
<body>
<header><h1>{site}</h1>
{nav}
</header>
<main>
<h2>{heading}</h2>
{body}
</main>
</body>
</html>
"#,
        site = escape(context.site_title),
        heading = escape(heading),
    )
}

fn error_list(errors: &[String]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let items: String = errors
        .iter()
        .map(|error| format!("<li>{}</li>", escape(error)))
        .collect();
    format!(r#"<ul class="errors" id="form-errors">{items}</ul>"#)
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let context = PageContext {
        site_title: status.canonical_reason().unwrap_or("Error"),
        member: None,
    };
    let body = format!(
        r#"<p class="error" id="error-message">{}</p><p><a href="/">Back to start</a></p>"#,
        escape(message)
    );
    layout(&context, &status.as_u16().to_string(), &body)
}

pub fn login_page(context: &PageContext, errors: &[String], email: &str, next: Option<&str>) -> String {
    let next_field = next
        .map(|next| format!(r#"<input type="hidden" name="next" value="{}">"#, escape(next)))
        .unwrap_or_default();
    let body = format!(
        r#"{errors}
<form method="post" action="/login" id="login-form">
{next_field}
<label>Email <input type="email" name="email" id="email" value="{email}" required></label>
<label>Password <input type="password" name="password" id="password" required></label>
<button type="submit">Log in</button>
</form>
<p>No account yet? <a href="/register">Register</a></p>"#,
        errors = error_list(errors),
        email = escape(email),
    );
    layout(context, "Log in", &body)
}

pub fn register_page(context: &PageContext, errors: &[String], values: &RegisterValues) -> String {
    let body = format!(
        r#"{errors}
<form method="post" action="/register" id="register-form">
<label>Email <input type="email" name="email" value="{email}" required></label>
<label>First name <input type="text" name="first_name" value="{first_name}" required></label>
<label>Last name <input type="text" name="last_name" value="{last_name}" required></label>
<label>Phone <input type="tel" name="phone" value="{phone}"></label>
<label>Password <input type="password" name="password" required></label>
<label>Repeat password <input type="password" name="password_confirmation" required></label>
<button type="submit">Register</button>
</form>"#,
        errors = error_list(errors),
        email = escape(&values.email),
        first_name = escape(&values.first_name),
        last_name = escape(&values.last_name),
        phone = escape(&values.phone),
    );
    layout(context, "Register", &body)
}

pub fn members_page(context: &PageContext, members: &[Member], favourites: &[Member]) -> String {
    let rows: String = members
        .iter()
        .map(|member| {
            let marker = if favourites.iter().any(|favourite| favourite.id == member.id) {
                " &#9733;"
            } else {
                ""
            };
            format!(
                r#"<li data-member-id="{id}">{name}{marker}</li>"#,
                id = member.id,
                name = escape(&member.full_name()),
            )
        })
        .collect();
    let body = format!(r#"<ul id="members-list">{rows}</ul>"#);
    layout(context, "Members", &body)
}

pub fn profile_page(context: &PageContext, errors: &[String], saved: bool) -> String {
    let Some(member) = context.member else {
        return error_page(StatusCode::UNAUTHORIZED, "login required");
    };
    let notice = if saved {
        r#"<p class="notice" id="profile-saved">Profile saved</p>"#
    } else {
        ""
    };
    let body = format!(
        r#"{notice}{errors}
<p>Email: <span id="profile-email">{email}</span></p>
<form method="post" action="/members/profile" id="profile-form">
<label>First name <input type="text" name="first_name" value="{first_name}" required></label>
<label>Last name <input type="text" name="last_name" value="{last_name}" required></label>
<label>Phone <input type="tel" name="phone" value="{phone}"></label>
<button type="submit">Save</button>
</form>"#,
        errors = error_list(errors),
        email = escape(&member.email),
        first_name = escape(&member.first_name),
        last_name = escape(&member.last_name),
        phone = escape(member.phone.as_deref().unwrap_or_default()),
    );
    layout(context, "Profile", &body)
}

pub fn favourites_page(
    context: &PageContext,
    favourites: &[Member],
    candidates: &[Member],
    errors: &[String],
) -> String {
    let items: String = favourites
        .iter()
        .map(|favourite| {
            format!(
                r#"<li data-member-id="{id}">{name}
<form method="post" action="/members/favourites/{id}/remove" class="inline"><button type="submit">Remove</button></form></li>"#,
                id = favourite.id,
                name = escape(&favourite.full_name()),
            )
        })
        .collect();
    let empty = if favourites.is_empty() {
        r#"<p id="no-favourites">You have no favourites yet.</p>"#
    } else {
        ""
    };
    let options: String = candidates
        .iter()
        .map(|candidate| {
            format!(
                r#"<option value="{id}">{name}</option>"#,
                id = candidate.id,
                name = escape(&candidate.full_name()),
            )
        })
        .collect();
    let add_form = if candidates.is_empty() {
        String::new()
    } else {
        format!(
            r#"<form method="post" action="/members/favourites" id="add-favourite-form">
<select name="favourite_id" id="add-favourite-select">{options}</select>
<button type="submit">Add favourite</button>
</form>"#
        )
    };
    let body = format!(
        r#"{errors}{empty}
<ul id="favourites-list">{items}</ul>
{add_form}"#,
        errors = error_list(errors),
    );
    layout(context, "Favourites", &body)
}

pub fn courts_page(context: &PageContext, courts: &[Court]) -> String {
    let rows: String = courts
        .iter()
        .map(|court| {
            format!(
                r#"<tr data-court-id="{id}"><td>{name}</td><td>{surface}</td><td>{kind}</td><td>{state}</td></tr>"#,
                id = court.id,
                name = escape(&court.name),
                surface = escape(&court.surface),
                kind = if court.indoor { "indoor" } else { "outdoor" },
                state = if court.active { "open" } else { "closed" },
            )
        })
        .collect();
    let body = format!(
        r#"<table id="courts-table"><thead><tr><th>Court</th><th>Surface</th><th></th><th>Status</th></tr></thead><tbody>{rows}</tbody></table>"#
    );
    layout(context, "Courts", &body)
}

fn reservation_items(rows: &[ReservationRow], cancel_action: impl Fn(&Reservation) -> Option<String>) -> String {
    rows.iter()
        .map(|row| {
            let cancel = cancel_action(&row.reservation)
                .map(|action| {
                    format!(
                        r#"<form method="post" action="{action}" class="inline"><button type="submit">Cancel</button></form>"#
                    )
                })
                .unwrap_or_default();
            let notes = if row.reservation.notes.is_empty() {
                String::new()
            } else {
                format!(" ({})", escape(&row.reservation.notes))
            };
            format!(
                r#"<li data-reservation-id="{id}">{start} - {end} {court}, {member}{notes} {cancel}</li>"#,
                id = row.reservation.id,
                start = format_time(row.reservation.starts_at),
                end = row.reservation.ends_at.with_timezone(&Local).format("%H:%M"),
                court = escape(&row.court_name),
                member = escape(&row.member_name),
            )
        })
        .collect()
}

pub fn reservations_page(
    context: &PageContext,
    rows: &[ReservationRow],
    courts: &[Court],
    errors: &[String],
    durations: &[i64],
) -> String {
    let me = context.member.map(|member| member.id);
    let now = Utc::now();
    let items = reservation_items(rows, |reservation| {
        (Some(reservation.member_id) == me && reservation.starts_at > now)
            .then(|| format!("/reservations/{}/cancel", reservation.id))
    });
    let court_options: String = courts
        .iter()
        .filter(|court| court.active)
        .map(|court| {
            format!(
                r#"<option value="{id}">{name}</option>"#,
                id = court.id,
                name = escape(&court.name)
            )
        })
        .collect();
    let duration_options: String = durations
        .iter()
        .map(|minutes| format!(r#"<option value="{minutes}">{minutes} min</option>"#))
        .collect();
    let body = format!(
        r#"{errors}
<h3>Upcoming reservations</h3>
<ul id="reservations-list">{items}</ul>
<h3>Reserve a court</h3>
<form method="post" action="/reservations" id="reservation-form">
<label>Court <select name="court_id" id="reservation-court">{court_options}</select></label>
<label>Start <input type="datetime-local" name="starts_at" required></label>
<label>Duration <select name="duration_minutes">{duration_options}</select></label>
<label>Notes <input type="text" name="notes"></label>
<button type="submit">Reserve</button>
</form>"#,
        errors = error_list(errors),
    );
    layout(context, "Reservations", &body)
}

pub fn admin_page(
    context: &PageContext,
    members: &[Member],
    courts: &[Court],
    rows: &[ReservationRow],
    errors: &[String],
) -> String {
    let me = context.member.map(|member| member.id);
    let member_items: String = members
        .iter()
        .map(|member| {
            let remove = if Some(member.id) == me {
                String::new()
            } else {
                format!(
                    r#"<form method="post" action="/admin/members/{}/remove" class="inline"><button type="submit">Delete</button></form>"#,
                    member.id
                )
            };
            format!(
                r#"<li data-member-id="{id}">{name} &lt;{email}&gt;{admin} {remove}</li>"#,
                id = member.id,
                name = escape(&member.full_name()),
                email = escape(&member.email),
                admin = if member.is_admin { " (admin)" } else { "" },
            )
        })
        .collect();
    let court_items: String = courts
        .iter()
        .map(|court| {
            format!(
                r#"<li data-court-id="{id}">{name} ({surface}, {state})
<form method="post" action="/admin/courts/{id}/toggle" class="inline"><button type="submit">{toggle}</button></form>
<form method="post" action="/admin/courts/{id}/remove" class="inline"><button type="submit">Delete</button></form></li>"#,
                id = court.id,
                name = escape(&court.name),
                surface = escape(&court.surface),
                state = if court.active { "open" } else { "closed" },
                toggle = if court.active { "Close" } else { "Open" },
            )
        })
        .collect();
    let reservation_list = reservation_items(rows, |reservation| {
        Some(format!("/admin/reservations/{}/remove", reservation.id))
    });
    let body = format!(
        r#"{errors}
<h3>Members</h3>
<ul id="admin-members">{member_items}</ul>
<h3>Courts</h3>
<ul id="admin-courts">{court_items}</ul>
<form method="post" action="/admin/courts" id="add-court-form">
<label>Name <input type="text" name="name" required></label>
<label>Surface <input type="text" name="surface" required></label>
<label>Indoor <input type="checkbox" name="indoor" value="true"></label>
<button type="submit">Add court</button>
</form>
<h3>Reservations</h3>
<ul id="admin-reservations">{reservation_list}</ul>"#,
        errors = error_list(errors),
    );
    layout(context, "Administration", &body)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::example_member;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x" & 'y')</script>"#),
            "&lt;script&gt;alert(&quot;x&quot; &amp; &#x27;y&#x27;)&lt;/script&gt;"
        );
        assert_eq!(escape("Stefan"), "Stefan");
    }

    #[test]
    fn test_member_names_are_escaped() {
        let mut member = example_member("Stefan").into_member();
        member.last_name = "<b>Bold</b>".into();
        let context = PageContext {
            site_title: "Club",
            member: Some(&member),
        };

        let html = members_page(&context, &[member.clone()], &[]);
        assert!(html.contains("&lt;b&gt;Bold&lt;/b&gt;"));
        assert!(!html.contains("<b>Bold</b>"));
    }

    #[test]
    fn test_favourites_page_lists_only_candidates() {
        let me = example_member("Me").into_member();
        let liked = example_member("Liked").into_member();
        let other = example_member("Other").into_member();
        let context = PageContext {
            site_title: "Club",
            member: Some(&me),
        };

        let html = favourites_page(&context, &[liked.clone()], &[other.clone()], &[]);
        assert!(html.contains(r#"id="favourites-list""#));
        assert!(html.contains(r#"id="add-favourite-select""#));
        assert!(html.contains(&format!(r#"<option value="{}">"#, other.id)));
        assert!(!html.contains(&format!(r#"<option value="{}">"#, liked.id)));

        let html = favourites_page(&context, &[], &[], &[]);
        assert!(html.contains(r#"id="no-favourites""#));
        assert!(!html.contains(r#"id="add-favourite-select""#));
    }

    #[test]
    fn test_admin_link_only_for_admins() {
        let mut member = example_member("Stefan").into_member();
        let context = PageContext {
            site_title: "Club",
            member: Some(&member),
        };
        assert!(!courts_page(&context, &[]).contains(r#"href="/admin""#));

        member.is_admin = true;
        let context = PageContext {
            site_title: "Club",
            member: Some(&member),
        };
        assert!(courts_page(&context, &[]).contains(r#"href="/admin""#));
    }
}
