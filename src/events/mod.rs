//! Church calendar and RSVPs.

use chrono::{Duration, NaiveDateTime};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Viewer;
use crate::communication::{
    Mailer,
    notifications::{self, Notice},
};
use crate::core::{
    now,
    reminders::{ReminderBatch, ReminderLine},
};
use crate::entities::{
    event, member, rsvp,
    sea_orm_active_enums::{NotificationCategory, Role, RsvpResponse},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{checkbox, datetime, empty_as_none, trimmed};
use crate::util::pagination::{Page, PageParams, fetch_page};
use crate::util::validation::{check_length, require_text};

pub const MAX_GUESTS: i32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    pub title: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub location: Option<String>,
    #[serde(deserialize_with = "datetime")]
    pub starts_at: NaiveDateTime,
    #[serde(deserialize_with = "datetime")]
    pub ends_at: NaiveDateTime,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub capacity: Option<i32>,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_public: bool,
}

impl EventInput {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "title", &self.title);
        check_length(&mut errors, "title", &self.title, 200);
        if self.ends_at <= self.starts_at {
            errors.add("ends_at", "must be after the start");
        }
        if self.capacity.is_some_and(|c| c < 1) {
            errors.add("capacity", "must be at least 1");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsvpInput {
    pub response: RsvpResponse,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub guests: Option<i32>,
    /// Staff may answer for someone else.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub member_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Upcoming,
    Past,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RsvpSummary {
    pub yes: usize,
    pub no: usize,
    pub maybe: usize,
    pub seats_taken: i32,
    pub seats_left: Option<i32>,
}

impl RsvpSummary {
    pub fn tally(capacity: Option<i32>, rsvps: &[rsvp::Model]) -> Self {
        let mut summary = Self::default();
        for r in rsvps {
            match r.response {
                RsvpResponse::Yes => summary.yes += 1,
                RsvpResponse::No => summary.no += 1,
                RsvpResponse::Maybe => summary.maybe += 1,
            }
            summary.seats_taken += r.seats();
        }
        summary.seats_left = capacity.map(|c| (c - summary.seats_taken).max(0));
        summary
    }
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    pub event: event::Model,
    pub summary: RsvpSummary,
    pub my_rsvp: Option<rsvp::Model>,
}

#[derive(Debug, Serialize)]
pub struct Attendee {
    pub member: member::Model,
    pub rsvp: rsvp::Model,
}

pub async fn list(
    db: &DatabaseConnection,
    scope: Scope,
    params: PageParams,
) -> AppResult<Page<event::Model>> {
    let at = now();
    let select = match scope {
        Scope::Upcoming => event::Entity::find()
            .filter(event::Column::EndsAt.gte(at))
            .order_by_asc(event::Column::StartsAt),
        Scope::Past => event::Entity::find()
            .filter(event::Column::EndsAt.lt(at))
            .order_by_desc(event::Column::StartsAt),
    };
    Ok(fetch_page(select.order_by_asc(event::Column::Id), db, params).await?)
}

/// Upcoming public events for the signed-out landing page.
pub async fn public_upcoming(db: &DatabaseConnection, limit: u64) -> AppResult<Vec<event::Model>> {
    let page = fetch_page(
        event::Entity::find()
            .filter(event::Column::IsPublic.eq(true))
            .filter(event::Column::IsCancelled.eq(false))
            .filter(event::Column::StartsAt.gte(now()))
            .order_by_asc(event::Column::StartsAt),
        db,
        PageParams {
            page: Some(1),
            per_page: Some(limit),
        },
    )
    .await?;
    Ok(page.items)
}

pub(crate) async fn find(db: &DatabaseConnection, id: i32) -> AppResult<event::Model> {
    event::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("event"))
}

async fn rsvps_for(db: &DatabaseConnection, event_id: i32) -> AppResult<Vec<rsvp::Model>> {
    Ok(rsvp::Entity::find()
        .filter(rsvp::Column::EventId.eq(event_id))
        .all(db)
        .await?)
}

pub async fn get(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<EventDetail> {
    let event = find(db, id).await?;
    let rsvps = rsvps_for(db, id).await?;
    let summary = RsvpSummary::tally(event.capacity, &rsvps);
    let my_rsvp = viewer
        .member
        .as_ref()
        .and_then(|m| rsvps.iter().find(|r| r.member_id == m.id).cloned());
    Ok(EventDetail {
        event,
        summary,
        my_rsvp,
    })
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: EventInput,
) -> AppResult<event::Model> {
    viewer.require(Role::can_manage_events, "manage events")?;
    input.validate()?;
    let stamp = now();
    let created = event::ActiveModel {
        title: Set(input.title.trim().to_string()),
        description: Set(input.description),
        location: Set(input.location),
        starts_at: Set(input.starts_at),
        ends_at: Set(input.ends_at),
        capacity: Set(input.capacity),
        is_public: Set(input.is_public),
        is_cancelled: Set(false),
        created_by: Set(Some(viewer.user.id)),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(event_id = created.id, "event created");
    Ok(created)
}

pub async fn update(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: EventInput,
) -> AppResult<event::Model> {
    viewer.require(Role::can_manage_events, "manage events")?;
    input.validate()?;
    let found = find(db, id).await?;
    let rescheduled = found.starts_at != input.starts_at;
    let mut active: event::ActiveModel = found.into();
    active.title = Set(input.title.trim().to_string());
    active.description = Set(input.description);
    active.location = Set(input.location);
    active.starts_at = Set(input.starts_at);
    active.ends_at = Set(input.ends_at);
    active.capacity = Set(input.capacity);
    active.is_public = Set(input.is_public);
    active.updated_at = Set(now());
    let saved = active.update(db).await?;

    // A new start time deserves a fresh reminder.
    if rescheduled {
        rsvp::Entity::update_many()
            .col_expr(rsvp::Column::ReminderSent, Expr::value(false))
            .filter(rsvp::Column::EventId.eq(id))
            .exec(db)
            .await?;
    }
    Ok(saved)
}

/// Cancels the event and tells everyone who planned to come.
pub async fn cancel(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<event::Model> {
    viewer.require(Role::can_manage_events, "manage events")?;
    let found = find(db, id).await?;
    if found.is_cancelled {
        return Ok(found);
    }
    let mut active: event::ActiveModel = found.into();
    active.is_cancelled = Set(true);
    active.updated_at = Set(now());
    let saved = active.update(db).await?;

    let notice = Notice::new(
        NotificationCategory::Events,
        format!("Cancelled: {}", saved.title),
    )
    .body(format!(
        "{} on {} will not take place.",
        saved.title,
        saved.starts_at.format("%A %-d %B at %H:%M")
    ))
    .link(format!("/events/{}", saved.id));
    for r in rsvps_for(db, id).await? {
        if r.response != RsvpResponse::No {
            notifications::notify(db, r.member_id, notice.clone()).await?;
        }
    }
    info!(event_id = id, "event cancelled");
    Ok(saved)
}

fn ensure_open(event: &event::Model) -> AppResult<()> {
    if event.is_cancelled {
        return Err(AppError::conflict("this event has been cancelled"));
    }
    if event.starts_at <= now() {
        return Err(AppError::conflict("this event has already started"));
    }
    Ok(())
}

fn target_member(viewer: &Viewer, requested: Option<i32>) -> AppResult<i32> {
    match requested {
        Some(id) if !viewer.is_self(id) => {
            viewer.require(Role::can_manage_events, "answer for another member")?;
            Ok(id)
        }
        Some(id) => Ok(id),
        None => viewer.member_id(),
    }
}

/// Creates or replaces the member's answer.
pub async fn respond(
    db: &DatabaseConnection,
    viewer: &Viewer,
    event_id: i32,
    input: RsvpInput,
) -> AppResult<rsvp::Model> {
    let member_id = target_member(viewer, input.member_id)?;
    let guests = input.guests.unwrap_or(0);
    if !(0..=MAX_GUESTS).contains(&guests) {
        return Err(FieldErrors::single(
            "guests",
            format!("must be between 0 and {MAX_GUESTS}"),
        ));
    }
    let attending = crate::members::find(db, member_id).await?;
    if !attending.is_active {
        return Err(AppError::conflict("archived members cannot RSVP"));
    }

    let txn = db.begin().await?;
    let event = event::Entity::find_by_id(event_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("event"))?;
    ensure_open(&event)?;

    let rsvps = rsvp::Entity::find()
        .filter(rsvp::Column::EventId.eq(event_id))
        .all(&txn)
        .await?;
    let existing = rsvps.iter().find(|r| r.member_id == member_id).cloned();
    let guests = if input.response == RsvpResponse::Yes { guests } else { 0 };

    if let (Some(capacity), RsvpResponse::Yes) = (event.capacity, input.response) {
        let others: i32 = rsvps
            .iter()
            .filter(|r| r.member_id != member_id)
            .map(rsvp::Model::seats)
            .sum();
        if others + 1 + guests > capacity {
            return Err(AppError::conflict(format!(
                "only {} seat(s) left",
                (capacity - others).max(0)
            )));
        }
    }

    let stamp = now();
    let saved = match existing {
        Some(found) => {
            let mut active: rsvp::ActiveModel = found.into();
            active.response = Set(input.response);
            active.guests = Set(guests);
            active.updated_at = Set(stamp);
            active.update(&txn).await?
        }
        None => {
            rsvp::ActiveModel {
                event_id: Set(event_id),
                member_id: Set(member_id),
                response: Set(input.response),
                guests: Set(guests),
                reminder_sent: Set(false),
                created_at: Set(stamp),
                updated_at: Set(stamp),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };
    txn.commit().await?;
    Ok(saved)
}

pub async fn withdraw(
    db: &DatabaseConnection,
    viewer: &Viewer,
    event_id: i32,
    member_id: Option<i32>,
) -> AppResult<()> {
    let member_id = target_member(viewer, member_id)?;
    let found = rsvp::Entity::find()
        .filter(rsvp::Column::EventId.eq(event_id))
        .filter(rsvp::Column::MemberId.eq(member_id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound("rsvp"))?;
    found.delete(db).await?;
    Ok(())
}

/// Members who answered yes or maybe, by name.
pub async fn attendees(
    db: &DatabaseConnection,
    viewer: &Viewer,
    event_id: i32,
) -> AppResult<Vec<Attendee>> {
    if !(viewer.role().can_manage_events() || viewer.role().can_check_in()) {
        return Err(AppError::forbidden("you may not see the attendee list"));
    }
    find(db, event_id).await?;
    let rows = rsvp::Entity::find()
        .filter(rsvp::Column::EventId.eq(event_id))
        .filter(rsvp::Column::Response.ne(RsvpResponse::No))
        .find_also_related(member::Entity)
        .all(db)
        .await?;
    let mut list: Vec<Attendee> = rows
        .into_iter()
        .filter_map(|(rsvp, member)| {
            member.map(|member| Attendee {
                member: crate::members::redact(viewer, member),
                rsvp,
            })
        })
        .collect();
    list.sort_by(|a, b| {
        (&a.member.last_name, &a.member.first_name).cmp(&(&b.member.last_name, &b.member.first_name))
    });
    Ok(list)
}

/// The viewer's upcoming yes/maybe answers.
pub async fn upcoming_for_member(
    db: &DatabaseConnection,
    member_id: i32,
) -> AppResult<Vec<(rsvp::Model, event::Model)>> {
    let rows = rsvp::Entity::find()
        .filter(rsvp::Column::MemberId.eq(member_id))
        .filter(rsvp::Column::Response.ne(RsvpResponse::No))
        .find_also_related(event::Entity)
        .all(db)
        .await?;
    let at = now();
    let mut list: Vec<(rsvp::Model, event::Model)> = rows
        .into_iter()
        .filter_map(|(r, e)| e.map(|e| (r, e)))
        .filter(|(_, e)| e.starts_at >= at && !e.is_cancelled)
        .collect();
    list.sort_by_key(|(_, e)| e.starts_at);
    Ok(list)
}

/// Reminds yes/maybe respondents of events starting within `lead`.
pub async fn send_reminders(
    db: &DatabaseConnection,
    mailer: &Mailer,
    at: NaiveDateTime,
    lead: Duration,
) -> AppResult<usize> {
    let events = event::Entity::find()
        .filter(event::Column::IsCancelled.eq(false))
        .filter(event::Column::StartsAt.gt(at))
        .filter(event::Column::StartsAt.lte(at + lead))
        .all(db)
        .await?;
    if events.is_empty() {
        return Ok(0);
    }
    let ids: Vec<i32> = events.iter().map(|e| e.id).collect();
    let due = rsvp::Entity::find()
        .filter(rsvp::Column::EventId.is_in(ids))
        .filter(rsvp::Column::Response.ne(RsvpResponse::No))
        .filter(rsvp::Column::ReminderSent.eq(false))
        .all(db)
        .await?;

    let mut batch = ReminderBatch::new(NotificationCategory::Events, "Upcoming events");
    for r in &due {
        if let Some(e) = events.iter().find(|e| e.id == r.event_id) {
            let place = e.location.as_deref().map(|l| format!(" at {l}")).unwrap_or_default();
            batch.push(
                r.member_id,
                ReminderLine {
                    source_id: r.id,
                    text: format!("{} on {}{}", e.title, e.starts_at.format("%a %-d %b %H:%M"), place),
                    link: Some(format!("/events/{}", e.id)),
                },
            );
        }
    }
    let handled = batch.deliver(db, mailer).await?;
    if !handled.is_empty() {
        rsvp::Entity::update_many()
            .col_expr(rsvp::Column::ReminderSent, Expr::value(true))
            .filter(rsvp::Column::Id.is_in(handled.iter().copied()))
            .exec(db)
            .await?;
    }
    Ok(handled.len())
}
