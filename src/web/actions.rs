use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::Form;
use serde::Deserialize;
use tracing::warn;

use super::{AppState, Portal};
use crate::calendar::{parse_date, weekday_field, TimeRange};
use crate::error::{PortalError, PortalResult};
use crate::models::{Config, NewLecturer, User};
use crate::timetable::import::Lookups;
use crate::timetable::{SessionDraft, SessionKind};
use crate::viva::{DatedSlot, VivaStep};

/// Apply one model operation for the signed-in user and send the browser
/// back to `back`. A failure becomes an error notice; `Ok(Some(text))` a
/// success notice.
fn act<F>(state: &AppState, back: &str, f: F) -> Redirect
where
    F: FnOnce(&mut Portal, &User, &Config) -> PortalResult<Option<String>>,
{
    let mut portal = state.portal();
    let Some(user) = portal.session.user().cloned() else {
        return Redirect::to(&state.href("/login"));
    };
    match f(&mut *portal, &user, &state.config) {
        Ok(Some(message)) => portal.notices.success(message),
        Ok(None) => {}
        Err(e) => {
            warn!("{}: {}", back, e);
            portal.notices.error(e);
        }
    }
    Redirect::to(&state.href(back))
}

fn current_user(state: &AppState) -> Option<User> {
    state.portal().session.user().cloned()
}

fn group_page(group: &str) -> String {
    format!("/timetable/{}", urlencoding::encode(group))
}

// Roster

#[derive(Deserialize)]
pub(crate) struct StudentForm {
    student_id: String,
}

pub(crate) async fn roster_add(State(state): State<AppState>, Form(form): Form<StudentForm>) -> Redirect {
    act(&state, "/dashboard", |portal, _, cfg| {
        let student = cfg
            .students
            .iter()
            .find(|s| s.id == form.student_id)
            .cloned()
            .ok_or(PortalError::StepUnavailable("no such student"))?;
        let message = format!("{} added to {}", student.name, portal.roster.name);
        portal.roster.add(student)?;
        Ok(Some(message))
    })
}

pub(crate) async fn roster_remove(
    State(state): State<AppState>,
    Form(form): Form<StudentForm>,
) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.roster.remove(&form.student_id)?;
        Ok(None)
    })
}

pub(crate) async fn roster_confirm(State(state): State<AppState>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.roster.confirm()?;
        Ok(Some(format!("{} is registered", portal.roster.name)))
    })
}

// Availability

#[derive(Deserialize)]
pub(crate) struct DayForm {
    day: String,
}

#[derive(Deserialize)]
pub(crate) struct SlotForm {
    day: String,
    index: usize,
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
}

pub(crate) async fn availability_add(State(state): State<AppState>, Form(form): Form<DayForm>) -> Redirect {
    act(&state, "/dashboard", |portal, user, _| {
        let day = weekday_field(&form.day)?;
        portal
            .availability
            .entry(user.id.clone())
            .or_default()
            .add_slot(day);
        portal.save_availability();
        Ok(None)
    })
}

pub(crate) async fn availability_edit(
    State(state): State<AppState>,
    Form(form): Form<SlotForm>,
) -> Redirect {
    act(&state, "/dashboard", |portal, user, _| {
        let day = weekday_field(&form.day)?;
        portal
            .availability
            .entry(user.id.clone())
            .or_default()
            .edit_slot(day, form.index, &form.start, &form.end)?;
        portal.save_availability();
        Ok(Some("Availability saved".into()))
    })
}

pub(crate) async fn availability_remove(
    State(state): State<AppState>,
    Form(form): Form<SlotForm>,
) -> Redirect {
    act(&state, "/dashboard", |portal, user, _| {
        let day = weekday_field(&form.day)?;
        portal
            .availability
            .entry(user.id.clone())
            .or_default()
            .remove_slot(day, form.index)?;
        portal.save_availability();
        Ok(None)
    })
}

// Timetable

#[derive(Deserialize)]
pub(crate) struct SessionForm {
    #[serde(default)]
    lecturer: String,
    #[serde(default)]
    module: String,
    day: String,
    start: String,
    end: String,
    kind: String,
    #[serde(default)]
    building: String,
    #[serde(default)]
    classroom: String,
}

#[derive(Deserialize)]
pub(crate) struct SessionIdForm {
    id: String,
}

#[derive(Deserialize)]
pub(crate) struct ImportForm {
    csv: String,
}

pub(crate) async fn timetable_add(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Form(form): Form<SessionForm>,
) -> Redirect {
    act(&state, &group_page(&group), |portal, _, _| {
        let draft = SessionDraft {
            lecturer: form.lecturer,
            module: form.module,
            day: weekday_field(&form.day)?,
            time: TimeRange::from_strs(&form.start, &form.end)?,
            kind: SessionKind::parse(&form.kind)
                .ok_or(PortalError::StepUnavailable("choose lecture or tutorial"))?,
            building: form.building,
            classroom: form.classroom,
        };
        let added = portal.timetable.add(&group, draft)?;
        let message = format!("Added {} on {}", added.module, added.time);
        portal.save_timetable();
        Ok(Some(message))
    })
}

pub(crate) async fn timetable_remove(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Form(form): Form<SessionIdForm>,
) -> Redirect {
    act(&state, &group_page(&group), |portal, _, _| {
        if portal.timetable.remove(&form.id).is_some() {
            portal.save_timetable();
        }
        Ok(None)
    })
}

/// Resolve the CSV against the backend's lecturers and halls, then replace
/// the group's sessions.
pub(crate) async fn timetable_import(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Form(form): Form<ImportForm>,
) -> Redirect {
    let Some(user) = current_user(&state) else {
        return Redirect::to(&state.href("/login"));
    };
    let back = group_page(&group);
    let client = state.client_for(Some(&user));

    let lecturers = match client.list_session_lecturers().await {
        Ok(lecturers) => lecturers,
        Err(e) => {
            state.portal().notices.error(e);
            return Redirect::to(&state.href(&back));
        }
    };
    let halls = match client.list_halls().await {
        Ok(halls) => halls,
        Err(e) => {
            state.portal().notices.error(e);
            return Redirect::to(&state.href(&back));
        }
    };

    act(&state, &back, |portal, _, _| {
        let rows = portal.timetable.import_csv(
            &group,
            &form.csv,
            Lookups {
                lecturers: &lecturers,
                halls: &halls,
            },
        )?;
        portal.save_timetable();
        Ok(Some(format!("Imported {} sessions into {}", rows.len(), group)))
    })
}

#[derive(Deserialize)]
pub(crate) struct LecturerForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    short: String,
    #[serde(default)]
    email: String,
}

pub(crate) async fn lecturer_add(
    State(state): State<AppState>,
    Form(form): Form<LecturerForm>,
) -> Redirect {
    let Some(user) = current_user(&state) else {
        return Redirect::to(&state.href("/login"));
    };
    let result = state
        .client_for(Some(&user))
        .create_lecturer(&NewLecturer {
            name: form.name.trim().to_string(),
            name_short: form.short.trim().to_string(),
            email: form.email.trim().to_string(),
        })
        .await;

    let mut portal = state.portal();
    match result {
        Ok(created) => portal.notices.success(format!("Created lecturer {}", created.name)),
        Err(e) => {
            warn!("Failed to create lecturer: {}", e);
            portal.notices.error(e);
        }
    }
    Redirect::to(&state.href("/dashboard"))
}

// Booking

#[derive(Deserialize)]
pub(crate) struct DateForm {
    date: String,
}

#[derive(Deserialize)]
pub(crate) struct MentorForm {
    mentor_id: String,
}

#[derive(Deserialize)]
pub(crate) struct DetailsForm {
    #[serde(default)]
    time_slot: String,
    #[serde(default)]
    group_number: String,
    #[serde(default)]
    session_focus: String,
    #[serde(default)]
    notes: String,
}

pub(crate) async fn booking_date(State(state): State<AppState>, Form(form): Form<DateForm>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.booking.select_date(parse_date(&form.date)?);
        Ok(None)
    })
}

pub(crate) async fn booking_mentor(
    State(state): State<AppState>,
    Form(form): Form<MentorForm>,
) -> Redirect {
    act(&state, "/dashboard", |portal, _, cfg| {
        portal.booking.select_mentor(&form.mentor_id, &cfg.mentors)?;
        Ok(None)
    })
}

pub(crate) async fn booking_review(
    State(state): State<AppState>,
    Form(form): Form<DetailsForm>,
) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        if !form.time_slot.trim().is_empty() {
            portal.booking.set_time_slot(&form.time_slot)?;
        }
        portal
            .booking
            .set_details(&form.group_number, &form.session_focus, &form.notes);
        portal.booking.review()?;
        Ok(None)
    })
}

pub(crate) async fn booking_cancel(State(state): State<AppState>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.booking.cancel_review();
        Ok(None)
    })
}

pub(crate) async fn booking_back(State(state): State<AppState>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.booking.back();
        Ok(None)
    })
}

pub(crate) async fn booking_confirm(State(state): State<AppState>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        let confirmation = portal.booking.confirm()?;
        Ok(Some(confirmation.message))
    })
}

// Viva wizard

#[derive(Deserialize)]
pub(crate) struct GroupForm {
    group: String,
}

#[derive(Deserialize)]
pub(crate) struct DatedSlotForm {
    date: String,
    start: String,
    end: String,
    #[serde(default)]
    lecturer: String,
}

#[derive(Deserialize)]
pub(crate) struct IndexForm {
    index: usize,
}

pub(crate) async fn viva_group(State(state): State<AppState>, Form(form): Form<GroupForm>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.viva.toggle_group(&form.group)?;
        Ok(None)
    })
}

pub(crate) async fn viva_slot(State(state): State<AppState>, Form(form): Form<DatedSlotForm>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        let slot = DatedSlot {
            date: parse_date(&form.date)?,
            time: TimeRange::from_strs(&form.start, &form.end)?,
        };
        if portal.viva.step() == VivaStep::LecturerAvailability {
            let lecturer = form.lecturer.trim();
            if lecturer.is_empty() {
                return Err(PortalError::MissingField("lecturer"));
            }
            portal.viva.add_lecturer_slot(lecturer, slot)?;
        } else {
            portal.viva.add_admin_slot(slot)?;
        }
        Ok(None)
    })
}

pub(crate) async fn viva_slot_remove(
    State(state): State<AppState>,
    Form(form): Form<IndexForm>,
) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.viva.remove_admin_slot(form.index)?;
        Ok(None)
    })
}

pub(crate) async fn viva_next(State(state): State<AppState>) -> Redirect {
    let mut processing = false;
    let redirect = act(&state, "/dashboard", |portal, _, _| {
        processing = portal.viva.next()? == VivaStep::Processing;
        Ok(None)
    });
    if processing {
        state.spawn_viva_processing();
    }
    redirect
}

pub(crate) async fn viva_back(State(state): State<AppState>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.viva.back()?;
        Ok(None)
    })
}

pub(crate) async fn viva_reset(State(state): State<AppState>) -> Redirect {
    act(&state, "/dashboard", |portal, _, _| {
        portal.viva.reset()?;
        Ok(None)
    })
}

// Team review

#[derive(Deserialize)]
pub(crate) struct LeaderForm {
    team_id: String,
    member_id: String,
}

#[derive(Deserialize)]
pub(crate) struct TeamForm {
    team_id: String,
}

pub(crate) async fn team_leader(State(state): State<AppState>, Form(form): Form<LeaderForm>) -> Redirect {
    if current_user(&state).is_none() {
        return Redirect::to(&state.href("/login"));
    }
    let result = state
        .board
        .lock()
        .await
        .select_leader(&form.team_id, &form.member_id);
    if let Err(e) = result {
        state.portal().notices.error(e);
    }
    Redirect::to(&state.href("/dashboard"))
}

pub(crate) async fn team_approve(State(state): State<AppState>, Form(form): Form<TeamForm>) -> Redirect {
    let Some(user) = current_user(&state) else {
        return Redirect::to(&state.href("/login"));
    };
    let client = state.client_for(Some(&user));
    let result = state.board.lock().await.approve(&client, &form.team_id).await;

    let mut portal = state.portal();
    match result {
        Ok(()) => portal.notices.success(format!("Team {} approved", form.team_id)),
        Err(e) => {
            warn!("Approval of team {} failed: {}", form.team_id, e);
            portal.notices.error(e);
        }
    }
    Redirect::to(&state.href("/dashboard"))
}

pub(crate) async fn team_reject(State(state): State<AppState>, Form(form): Form<TeamForm>) -> Redirect {
    let Some(user) = current_user(&state) else {
        return Redirect::to(&state.href("/login"));
    };
    let client = state.client_for(Some(&user));
    let result = state.board.lock().await.reject(&client, &form.team_id).await;

    let mut portal = state.portal();
    match result {
        Ok(()) => portal.notices.success(format!("Team {} rejected", form.team_id)),
        Err(e) => {
            warn!("Rejection of team {} failed: {}", form.team_id, e);
            portal.notices.error(e);
        }
    }
    Redirect::to(&state.href("/dashboard"))
}
