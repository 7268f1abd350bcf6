use chrono::NaiveDate;
use leptos::prelude::*;

use crate::availability::{Availability, Slot};
use crate::booking::{BookingStep, BookingWizard, TIME_SLOTS};
use crate::calendar::weekday_name;
use crate::models::{Lecturer, Mentor, Role, Student, User};
use crate::notice::Notice;
use crate::team::{Roster, RosterState, TeamBoard};
use crate::timetable::grid::{self, Cell};
use crate::timetable::import::COLUMNS;
use crate::timetable::{Session, SessionKind};
use crate::viva::{VivaStep, VivaWizard};

const STYLE: &str = include_str!("../style.css");

/// The bits every page shares.
pub(super) struct Frame<'a> {
    pub(super) base: &'a str,
    pub(super) user: Option<&'a User>,
    pub(super) notices: &'a [Notice],
    pub(super) updated: String,
}

pub(super) fn role_title(role: Role) -> &'static str {
    match role {
        Role::Admin => "Administrator",
        Role::Student => "Student",
        Role::Lecturer => "Lecturer",
        Role::SdgpAdmin => "SDGP Administrator",
    }
}

pub(super) fn render_page(frame: &Frame<'_>, title: &str, body_html: String) -> String {
    let title = title.to_string();
    let notices_html = render_notices(frame.notices);
    let updated = frame.updated.clone();
    let header_html = match frame.user {
        Some(user) => {
            let who = format!("{} ({})", user.name, role_title(user.role));
            let logout = format!("{}/logout", frame.base);
            view! {
                <div class="user">
                    <span>{who}</span>
                    <form method="post" action=logout>
                        <button type="submit">"Sign out"</button>
                    </form>
                </div>
            }
            .to_html()
        }
        None => String::new(),
    };

    view! {
        <html lang="en">
            <head>
                <meta charset="utf-8" />
                <meta name="viewport" content="width=device-width, initial-scale=1" />
                <title>{title.clone()}</title>
                <style>{STYLE}</style>
            </head>
            <body>
                <header>
                    <h1>{title}</h1>
                    <div inner_html=header_html />
                </header>
                <p class="timestamp">"Updated: " {updated}</p>
                <div class="notices" inner_html=notices_html />
                <main inner_html=body_html />
            </body>
        </html>
    }
    .to_html()
}

fn render_notices(notices: &[Notice]) -> String {
    notices
        .iter()
        .map(|n| {
            let css = n.kind.css_class();
            let text = n.text.clone();
            view! { <div class=css>{text}</div> }.to_html()
        })
        .collect()
}

pub(super) fn render_login(base: &str) -> String {
    let action = format!("{base}/login");
    let roles: String = [Role::Student, Role::Lecturer, Role::Admin, Role::SdgpAdmin]
        .iter()
        .map(|role| {
            let value = role.as_str();
            let label = role_title(*role);
            view! { <option value=value>{label}</option> }.to_html()
        })
        .collect();

    view! {
        <section>
            <h2>"Sign in"</h2>
            <form method="post" action=action class="stack">
                <label>"Username" <input type="text" name="username" /></label>
                <label>"Password" <input type="password" name="password" /></label>
                <label>"Role" <select name="role" inner_html=roles /></label>
                <label>"Or paste an access token" <input type="text" name="token" /></label>
                <button type="submit">"Sign in"</button>
            </form>
        </section>
    }
    .to_html()
}

fn post_button(action: String, name: &'static str, value: String, label: &'static str) -> String {
    view! {
        <form method="post" action=action class="inline">
            <input type="hidden" name=name value=value />
            <button type="submit">{label}</button>
        </form>
    }
    .to_html()
}

fn empty(text: &'static str) -> String {
    view! { <p class="empty">{text}</p> }.to_html()
}

// Student: team registration

pub(super) fn render_roster(
    base: &str,
    roster: &Roster,
    candidates: &[&Student],
    query: &str,
) -> String {
    let state = roster.state();
    let editable = state != RosterState::Confirmed;
    let heading = format!(
        "{} ({}/{})",
        roster.name,
        roster.members().len(),
        roster.capacity()
    );
    let status = match state {
        RosterState::Assembling => "Assembling",
        RosterState::Full => "Full, ready to confirm",
        RosterState::Confirmed => "Confirmed",
    };

    let members_html: String = if roster.members().is_empty() {
        empty("No members yet.")
    } else {
        let rows: String = roster
            .members()
            .iter()
            .map(|m| {
                let name = m.name.clone();
                let email = m.email.clone();
                let remove = if editable {
                    post_button(format!("{base}/roster/remove"), "student_id", m.id.clone(), "Remove")
                } else {
                    String::new()
                };
                view! {
                    <tr>
                        <td>{name}</td>
                        <td>{email}</td>
                        <td inner_html=remove />
                    </tr>
                }
                .to_html()
            })
            .collect();
        view! {
            <table>
                <thead><tr><th>"Name"</th><th>"Email"</th><th></th></tr></thead>
                <tbody inner_html=rows />
            </table>
        }
        .to_html()
    };

    let search_html = if editable {
        let search = format!("{base}/dashboard");
        let query = query.to_string();
        let rows: String = candidates
            .iter()
            .map(|s| {
                let name = s.name.clone();
                let email = s.email.clone();
                let add = post_button(format!("{base}/roster/add"), "student_id", s.id.clone(), "Add");
                view! {
                    <tr>
                        <td>{name}</td>
                        <td>{email}</td>
                        <td inner_html=add />
                    </tr>
                }
                .to_html()
            })
            .collect();
        let results = if candidates.is_empty() {
            empty("No matching students.")
        } else {
            view! { <table><tbody inner_html=rows /></table> }.to_html()
        };
        let confirm = post_button(format!("{base}/roster/confirm"), "team", roster.name.clone(), "Confirm team");
        view! {
            <form method="get" action=search class="inline">
                <input type="search" name="q" value=query />
                <button type="submit">"Search"</button>
            </form>
            <div inner_html=results />
            <div inner_html=confirm />
        }
        .to_html()
    } else {
        String::new()
    };

    view! {
        <section>
            <h2>"Team registration"</h2>
            <h3>{heading}</h3>
            <p class="status">{status}</p>
            <div inner_html=members_html />
            <div inner_html=search_html />
        </section>
    }
    .to_html()
}

// Student: feedback booking

pub(super) fn render_booking(
    base: &str,
    wizard: &BookingWizard,
    mentors: &[Mentor],
    today: NaiveDate,
) -> String {
    let step_html = match wizard.step() {
        BookingStep::SelectDate => {
            let action = format!("{base}/booking/date");
            let min = today.format("%Y-%m-%d").to_string();
            view! {
                <form method="post" action=action class="inline">
                    <input type="date" name="date" min=min />
                    <button type="submit">"Find mentors"</button>
                </form>
            }
            .to_html()
        }
        BookingStep::SelectMentor => {
            let list = match wizard.no_mentor_message(mentors) {
                Some(message) => view! { <p class="empty">{message}</p> }.to_html(),
                None => wizard
                    .available_mentors(mentors)
                    .iter()
                    .map(|m| {
                        let name = m.name.clone();
                        let specialty = m.specialty.clone();
                        let pick = post_button(format!("{base}/booking/mentor"), "mentor_id", m.id.clone(), "Choose");
                        view! {
                            <div class="card">
                                <strong>{name}</strong>
                                <span>{specialty}</span>
                                <div inner_html=pick />
                            </div>
                        }
                        .to_html()
                    })
                    .collect(),
            };
            let back = post_button(format!("{base}/booking/back"), "step", "mentor".into(), "Back");
            view! { <div inner_html=list /> <div inner_html=back /> }.to_html()
        }
        BookingStep::SelectDetails => {
            let action = format!("{base}/booking/review");
            let slots: String = TIME_SLOTS
                .iter()
                .map(|&slot| view! { <option value=slot>{slot}</option> }.to_html())
                .collect();
            let mentor = wizard.mentor().map(|m| m.name.clone()).unwrap_or_default();
            let back = post_button(format!("{base}/booking/back"), "step", "details".into(), "Back");
            view! {
                <p>"Mentor: " {mentor}</p>
                <form method="post" action=action class="stack">
                    <label>"Time slot" <select name="time_slot" inner_html=slots /></label>
                    <label>"Group number" <input type="text" name="group_number" /></label>
                    <label>"Session focus" <input type="text" name="session_focus" /></label>
                    <label>"Notes" <textarea name="notes"></textarea></label>
                    <button type="submit">"Review booking"</button>
                </form>
                <div inner_html=back />
            }
            .to_html()
        }
        BookingStep::Confirm => {
            let details = wizard.details();
            let summary = format!(
                "{} with {} at {}",
                wizard
                    .date()
                    .map(|d| d.format("%A, %-d %B %Y").to_string())
                    .unwrap_or_default(),
                wizard.mentor().map(|m| m.name.as_str()).unwrap_or("?"),
                details
                    .time_slot
                    .map(|t| t.to_string())
                    .unwrap_or_default()
            );
            let extra = format!(
                "Group {} / Focus: {}",
                or_dash(&details.group_number),
                or_dash(&details.session_focus)
            );
            let confirm = post_button(format!("{base}/booking/confirm"), "step", "confirm".into(), "Confirm");
            let cancel = post_button(format!("{base}/booking/cancel"), "step", "confirm".into(), "Cancel");
            view! {
                <div class="modal">
                    <p>{summary}</p>
                    <p>{extra}</p>
                    <div inner_html=confirm />
                    <div inner_html=cancel />
                </div>
            }
            .to_html()
        }
    };

    view! {
        <section>
            <h2>"Book a feedback session"</h2>
            <div inner_html=step_html />
        </section>
    }
    .to_html()
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

// Lecturer: weekly availability

pub(super) fn render_availability(base: &str, availability: &Availability) -> String {
    let days_html: String = availability
        .days()
        .iter()
        .map(|entry| {
            let day = weekday_name(entry.day).to_string();
            let heading = match availability.ranges(entry.day).count() {
                0 => day.clone(),
                n => format!("{day} ({n} saved)"),
            };
            let slots: String = entry
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| render_slot(base, &day, index, slot))
                .collect();
            let add = post_button(format!("{base}/availability/add"), "day", day.clone(), "Add slot");
            view! {
                <div class="day">
                    <h3>{heading}</h3>
                    <div inner_html=slots />
                    <div inner_html=add />
                </div>
            }
            .to_html()
        })
        .collect();

    view! {
        <section>
            <h2>"My availability"</h2>
            <div class="week" inner_html=days_html />
        </section>
    }
    .to_html()
}

fn render_slot(base: &str, day: &str, index: usize, slot: &Slot) -> String {
    let (start, end) = match slot {
        Slot::Range(range) => (
            range.start().format("%H:%M").to_string(),
            range.end().format("%H:%M").to_string(),
        ),
        Slot::Placeholder => ("00:00".to_string(), "00:00".to_string()),
    };
    let edit = format!("{base}/availability/edit");
    let remove = format!("{base}/availability/remove");
    let label = slot.to_string();
    let index = index.to_string();
    view! {
        <div class="slot">
            <span>{label}</span>
            <form method="post" action=edit class="inline">
                <input type="hidden" name="day" value=day.to_string() />
                <input type="hidden" name="index" value=index.clone() />
                <input type="time" name="start" value=start />
                <input type="time" name="end" value=end />
                <button type="submit">"Save"</button>
            </form>
            <form method="post" action=remove class="inline">
                <input type="hidden" name="day" value=day.to_string() />
                <input type="hidden" name="index" value=index />
                <button type="submit">"Remove"</button>
            </form>
        </div>
    }
    .to_html()
}

// Administrator: viva scheduling

pub(super) fn render_viva(base: &str, wizard: &VivaWizard, groups: &[String]) -> String {
    let step = wizard.step();
    let steps: String = [
        VivaStep::AdminAvailability,
        VivaStep::LecturerAvailability,
        VivaStep::Processing,
        VivaStep::Complete,
    ]
    .iter()
    .map(|s| {
        let css = if *s == step { "step current" } else { "step" };
        view! { <li class=css>{s.label()}</li> }.to_html()
    })
    .collect();

    let body = match step {
        VivaStep::AdminAvailability => {
            let toggle_action = format!("{base}/viva/group");
            let toggles: String = groups
                .iter()
                .map(|g| {
                    let label = if wizard.groups().contains(g) {
                        format!("[x] {g}")
                    } else {
                        format!("[ ] {g}")
                    };
                    view! {
                        <form method="post" action=toggle_action.clone() class="inline">
                            <input type="hidden" name="group" value=g.clone() />
                            <button type="submit">{label}</button>
                        </form>
                    }
                    .to_html()
                })
                .collect();
            let slots: String = wizard
                .admin_slots()
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let text = format!("{} {}", s.date.format("%Y-%m-%d"), s.time);
                    let remove = post_button(format!("{base}/viva/slot/remove"), "index", i.to_string(), "Remove");
                    view! { <li>{text} <span inner_html=remove /></li> }.to_html()
                })
                .collect();
            let slot_form = render_dated_slot_form(base, false);
            let next = post_button(format!("{base}/viva/next"), "step", step.label().into(), "Next");
            view! {
                <h3>"Groups"</h3>
                <div class="groups" inner_html=toggles />
                <h3>"Your availability"</h3>
                <ul inner_html=slots />
                <div inner_html=slot_form />
                <div inner_html=next />
            }
            .to_html()
        }
        VivaStep::LecturerAvailability => {
            let collected: String = wizard
                .lecturer_slots()
                .iter()
                .flat_map(|(lecturer, slots)| {
                    slots.iter().map(move |s| {
                        let text = format!("{lecturer}: {} {}", s.date.format("%Y-%m-%d"), s.time);
                        view! { <li>{text}</li> }.to_html()
                    })
                })
                .collect();
            let slot_form = render_dated_slot_form(base, true);
            let back = post_button(format!("{base}/viva/back"), "step", step.label().into(), "Back");
            let next = post_button(format!("{base}/viva/next"), "step", step.label().into(), "Schedule vivas");
            view! {
                <h3>"Lecturer availability"</h3>
                <ul inner_html=collected />
                <div inner_html=slot_form />
                <div inner_html=back />
                <div inner_html=next />
            }
            .to_html()
        }
        VivaStep::Processing => view! { <p class="status">"Processing..."</p> }.to_html(),
        VivaStep::Complete => {
            let summary = match wizard.request() {
                Some(request) => format!(
                    "Request recorded for {} groups with {} admin slots and {} lecturers.",
                    request.groups.len(),
                    request.admin_slots.len(),
                    request.lecturer_slots.len()
                ),
                None => String::new(),
            };
            let reset = post_button(format!("{base}/viva/reset"), "step", step.label().into(), "Start over");
            view! { <p>{summary}</p> <div inner_html=reset /> }.to_html()
        }
    };

    view! {
        <section>
            <h2>"Viva scheduling"</h2>
            <ol class="steps" inner_html=steps />
            <div inner_html=body />
        </section>
    }
    .to_html()
}

fn render_dated_slot_form(base: &str, with_lecturer: bool) -> String {
    let action = format!("{base}/viva/slot");
    let lecturer = if with_lecturer {
        view! { <label>"Lecturer" <input type="text" name="lecturer" /></label> }.to_html()
    } else {
        String::new()
    };
    view! {
        <form method="post" action=action class="inline">
            <span inner_html=lecturer />
            <input type="date" name="date" />
            <input type="time" name="start" />
            <input type="time" name="end" />
            <button type="submit">"Add slot"</button>
        </form>
    }
    .to_html()
}

// Administrator: team review

pub(super) fn render_teams(base: &str, board: &TeamBoard, error: Option<&str>) -> String {
    let body = if let Some(err) = error {
        let err = err.to_string();
        view! { <div class="error">{err}</div> }.to_html()
    } else if board.teams().is_empty() {
        empty("No teams registered.")
    } else {
        let rows: String = board
            .teams()
            .iter()
            .map(|team| {
                let name = team.name.clone();
                let status = team.status.as_str();
                let css = format!("status-{status}");
                let chosen = board.leader(&team.id);
                let options: String = team
                    .members
                    .iter()
                    .map(|m| {
                        let label = if chosen == Some(m.id.as_str()) {
                            format!("{} (leader)", m.name)
                        } else {
                            m.name.clone()
                        };
                        view! { <option value=m.id.clone()>{label}</option> }.to_html()
                    })
                    .collect();
                let leader_action = format!("{base}/teams/leader");
                let approve = post_button(format!("{base}/teams/approve"), "team_id", team.id.clone(), "Approve");
                let reject = post_button(format!("{base}/teams/reject"), "team_id", team.id.clone(), "Reject");
                view! {
                    <tr>
                        <td>{name}</td>
                        <td class=css>{status}</td>
                        <td>
                            <form method="post" action=leader_action class="inline">
                                <input type="hidden" name="team_id" value=team.id.clone() />
                                <select name="member_id" inner_html=options />
                                <button type="submit">"Set leader"</button>
                            </form>
                        </td>
                        <td inner_html=approve />
                        <td inner_html=reject />
                    </tr>
                }
                .to_html()
            })
            .collect();
        view! {
            <table>
                <thead>
                    <tr><th>"Team"</th><th>"Status"</th><th>"Leader"</th><th></th><th></th></tr>
                </thead>
                <tbody inner_html=rows />
            </table>
        }
        .to_html()
    };

    view! {
        <section>
            <h2>"Registered teams"</h2>
            <div inner_html=body />
        </section>
    }
    .to_html()
}

// Program administrator: lecturers and timetables

pub(super) fn render_lecturers(base: &str, lecturers: &[Lecturer], error: Option<&str>) -> String {
    let list = if let Some(err) = error {
        let err = err.to_string();
        view! { <div class="error">{err}</div> }.to_html()
    } else if lecturers.is_empty() {
        empty("No lecturers registered.")
    } else {
        let rows: String = lecturers
            .iter()
            .map(|l| {
                let name = l.name.clone();
                let short = l.name_short.clone().unwrap_or_default();
                let email = l.email.clone().unwrap_or_default();
                view! { <tr><td>{name}</td><td>{short}</td><td>{email}</td></tr> }.to_html()
            })
            .collect();
        view! {
            <table>
                <thead><tr><th>"Name"</th><th>"Short"</th><th>"Email"</th></tr></thead>
                <tbody inner_html=rows />
            </table>
        }
        .to_html()
    };
    let action = format!("{base}/lecturers/add");

    view! {
        <section>
            <h2>"Lecturers"</h2>
            <div inner_html=list />
            <form method="post" action=action class="inline">
                <input type="text" name="name" placeholder="Name" />
                <input type="text" name="short" placeholder="Short name" />
                <input type="email" name="email" placeholder="Email" />
                <button type="submit">"Add lecturer"</button>
            </form>
        </section>
    }
    .to_html()
}

pub(super) fn render_group_links(base: &str, groups: &[String]) -> String {
    let links: String = groups
        .iter()
        .map(|g| {
            let href = format!("{base}/timetable/{}", urlencoding::encode(g));
            let label = g.clone();
            view! { <li><a href=href>{label}</a></li> }.to_html()
        })
        .collect();
    view! {
        <section>
            <h2>"Timetables"</h2>
            <ul class="groups" inner_html=links />
        </section>
    }
    .to_html()
}

fn render_card(session: &Session) -> String {
    let module = session.module.clone();
    let lecturer = session.lecturer.clone();
    let place = format!("{} {}", session.building, session.classroom);
    let time = format!("{} ({})", session.time, session.kind);
    view! {
        <div class="card">
            <strong>{module}</strong>
            <span>{lecturer}</span>
            <span>{place}</span>
            <span>{time}</span>
        </div>
    }
    .to_html()
}

pub(super) fn render_grid(sessions: &[&Session]) -> String {
    let days: String = crate::calendar::TEACHING_DAYS
        .iter()
        .map(|d| view! { <th>{weekday_name(*d)}</th> }.to_html())
        .collect();
    let header = format!("<th></th>{days}");
    let rows: String = grid::build(sessions.iter().copied())
        .iter()
        .map(|row| {
            let cells: String = row
                .cells
                .iter()
                .map(|cell| match cell {
                    Cell::Free => view! { <td></td> }.to_html(),
                    Cell::Start(starting) => {
                        let card: String = starting.iter().map(|s| render_card(s)).collect();
                        view! { <td class="session" inner_html=card /> }.to_html()
                    }
                    Cell::Continued(_) => view! { <td class="session continued"></td> }.to_html(),
                })
                .collect();
            let row_html = format!("<th>{}</th>{cells}", row.at.format("%H:%M"));
            view! { <tr inner_html=row_html /> }.to_html()
        })
        .collect();

    view! {
        <table class="grid">
            <thead><tr inner_html=header /></thead>
            <tbody inner_html=rows />
        </table>
    }
    .to_html()
}

pub(super) fn render_timetable_editor(base: &str, group: &str, sessions: &[&Session]) -> String {
    let encoded = urlencoding::encode(group).into_owned();
    let remove_action = format!("{base}/timetable/{encoded}/remove");
    let list: String = sessions
        .iter()
        .map(|s| {
            let text = format!(
                "{} {} {} {}",
                weekday_name(s.day),
                s.time,
                s.module,
                s.lecturer
            );
            let remove = post_button(remove_action.clone(), "id", s.id.clone(), "Remove");
            view! { <li>{text} <span inner_html=remove /></li> }.to_html()
        })
        .collect();
    let kinds: String = [SessionKind::Lecture, SessionKind::Tutorial]
        .iter()
        .map(|k| {
            let value = k.to_string();
            let label = value.clone();
            view! { <option value=value>{label}</option> }.to_html()
        })
        .collect();
    let days: String = crate::calendar::TEACHING_DAYS
        .iter()
        .map(|d| {
            let name = weekday_name(*d);
            view! { <option value=name>{name}</option> }.to_html()
        })
        .collect();
    let add_action = format!("{base}/timetable/{encoded}/add");
    let import_action = format!("{base}/timetable/{encoded}/import");
    let header = COLUMNS.join(",");

    view! {
        <section>
            <h2>"Sessions"</h2>
            <ul inner_html=list />
            <form method="post" action=add_action class="inline">
                <input type="text" name="lecturer" placeholder="Lecturer" />
                <input type="text" name="module" placeholder="Module" />
                <select name="day" inner_html=days />
                <input type="time" name="start" />
                <input type="time" name="end" />
                <select name="kind" inner_html=kinds />
                <input type="text" name="building" placeholder="Building" />
                <input type="text" name="classroom" placeholder="Classroom" />
                <button type="submit">"Add session"</button>
            </form>
        </section>
        <section>
            <h2>"Import CSV"</h2>
            <p class="hint">{header}</p>
            <form method="post" action=import_action class="stack">
                <textarea name="csv" rows="8"></textarea>
                <button type="submit">"Replace group timetable"</button>
            </form>
        </section>
    }
    .to_html()
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::timetable::tests::draft;
    use crate::timetable::Timetable;

    #[test]
    fn test_grid_draws_card_once() {
        let mut timetable = Timetable::default();
        timetable
            .add("CS-G1", draft("Dr Smith", Weekday::Tue, "09:00", "10:30"))
            .unwrap();
        let sessions: Vec<&Session> = timetable.sessions().iter().collect();

        let html = render_grid(&sessions);
        assert_eq!(html.matches("class=\"card\"").count(), 1);
        assert_eq!(html.matches("session continued").count(), 2);
        assert!(html.contains("Dr Smith"));
    }

    #[test]
    fn test_text_is_escaped() {
        let student = Student {
            id: "w1".into(),
            name: "<script>".into(),
            email: "x@uni.ac".into(),
            group: None,
        };
        let roster = Roster::new("T", 6);
        let html = render_roster("", &roster, &[&student], "");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_booking_empty_state() {
        let mut wizard = BookingWizard::default();
        let date = NaiveDate::from_ymd_opt(2025, 3, 22).unwrap();
        wizard.select_date(date);
        let html = render_booking("/portal", &wizard, &[], date);
        assert!(html.contains("No mentors are available on Saturday, 22 March 2025"));
        assert!(html.contains("/portal/booking/back"));
    }
}
