//! Serving rota: positions, assignments, availability and swaps.

pub mod availability;
pub mod swaps;

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Viewer;
use crate::communication::Mailer;
use crate::core::{
    export::to_csv,
    now,
    reminders::{ReminderBatch, ReminderLine},
};
use crate::entities::{
    group, member, volunteer_position, volunteer_schedule, volunteer_unavailability,
    sea_orm_active_enums::{MembershipStatus, NotificationCategory, Role, ScheduleStatus},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{checkbox, empty_as_none, trimmed};
use crate::util::validation::require_text;

#[derive(Debug, Clone, Deserialize)]
pub struct PositionInput {
    pub name: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub group_id: Option<i32>,
    pub slots_needed: i32,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInput {
    pub position_id: i32,
    pub member_id: i32,
    pub serve_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn check(&self) -> AppResult<()> {
        if self.to < self.from {
            return Err(FieldErrors::single("to", "must not be before the start"));
        }
        if (self.to - self.from).num_days() > 366 {
            return Err(FieldErrors::single("to", "range is limited to a year"));
        }
        Ok(())
    }

    /// Today and the following `days - 1` days.
    pub fn next_days(days: i64) -> Self {
        let from = now().date();
        Self {
            from,
            to: from + Duration::days(days - 1),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Assignment {
    pub schedule: volunteer_schedule::Model,
    pub member: Option<member::Model>,
}

/// One position on one day.
#[derive(Debug, Serialize)]
pub struct RotaSlot {
    pub serve_date: NaiveDate,
    pub position: volunteer_position::Model,
    pub assignments: Vec<Assignment>,
    /// Assignments not declined.
    pub filled: i32,
    pub is_full: bool,
}

fn validate_position(input: &PositionInput) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", &input.name);
    if input.slots_needed < 1 {
        errors.add("slots_needed", "must be at least 1");
    }
    errors.into_result()
}

pub async fn list_positions(
    db: &DatabaseConnection,
    include_inactive: bool,
) -> AppResult<Vec<volunteer_position::Model>> {
    let mut select = volunteer_position::Entity::find().order_by_asc(volunteer_position::Column::Name);
    if !include_inactive {
        select = select.filter(volunteer_position::Column::IsActive.eq(true));
    }
    Ok(select.all(db).await?)
}

async fn find_position(db: &DatabaseConnection, id: i32) -> AppResult<volunteer_position::Model> {
    volunteer_position::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("position"))
}

async fn check_group(db: &DatabaseConnection, group_id: Option<i32>) -> AppResult<()> {
    if let Some(id) = group_id {
        if group::Entity::find_by_id(id).one(db).await?.is_none() {
            return Err(FieldErrors::single("group_id", "does not exist"));
        }
    }
    Ok(())
}

pub async fn create_position(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: PositionInput,
) -> AppResult<volunteer_position::Model> {
    viewer.require(Role::can_manage_volunteers, "manage volunteer positions")?;
    validate_position(&input)?;
    check_group(db, input.group_id).await?;
    let stamp = now();
    Ok(volunteer_position::ActiveModel {
        name: Set(input.name.trim().to_string()),
        description: Set(input.description),
        group_id: Set(input.group_id),
        slots_needed: Set(input.slots_needed),
        is_active: Set(input.is_active),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn update_position(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: PositionInput,
) -> AppResult<volunteer_position::Model> {
    viewer.require(Role::can_manage_volunteers, "manage volunteer positions")?;
    validate_position(&input)?;
    check_group(db, input.group_id).await?;
    let mut active: volunteer_position::ActiveModel = find_position(db, id).await?.into();
    active.name = Set(input.name.trim().to_string());
    active.description = Set(input.description);
    active.group_id = Set(input.group_id);
    active.slots_needed = Set(input.slots_needed);
    active.is_active = Set(input.is_active);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

/// A member can take a slot when they are an active member, have not marked
/// the day unavailable and do not already hold that position that day.
pub(crate) async fn ensure_eligible<C: ConnectionTrait>(
    db: &C,
    member_id: i32,
    position_id: i32,
    serve_date: NaiveDate,
) -> AppResult<()> {
    let candidate = member::Entity::find_by_id(member_id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("member"))?;
    if !candidate.is_active || candidate.membership_status != MembershipStatus::Active {
        return Err(AppError::conflict("only active members can be scheduled"));
    }
    let unavailable = volunteer_unavailability::Entity::find()
        .filter(volunteer_unavailability::Column::MemberId.eq(member_id))
        .filter(volunteer_unavailability::Column::UnavailableOn.eq(serve_date))
        .count(db)
        .await?;
    if unavailable > 0 {
        return Err(AppError::conflict(format!(
            "{} is unavailable on {}",
            candidate.full_name(),
            serve_date
        )));
    }
    let taken = volunteer_schedule::Entity::find()
        .filter(volunteer_schedule::Column::MemberId.eq(member_id))
        .filter(volunteer_schedule::Column::PositionId.eq(position_id))
        .filter(volunteer_schedule::Column::ServeDate.eq(serve_date))
        .count(db)
        .await?;
    if taken > 0 {
        return Err(AppError::conflict(format!(
            "{} is already scheduled for this position that day",
            candidate.full_name()
        )));
    }
    Ok(())
}

pub async fn schedule(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: ScheduleInput,
) -> AppResult<volunteer_schedule::Model> {
    viewer.require(Role::can_manage_volunteers, "schedule volunteers")?;
    let position = find_position(db, input.position_id).await?;
    if !position.is_active {
        return Err(FieldErrors::single("position_id", "is not active"));
    }
    if input.serve_date < now().date() {
        return Err(FieldErrors::single("serve_date", "cannot be in the past"));
    }
    ensure_eligible(db, input.member_id, input.position_id, input.serve_date).await?;

    let stamp = now();
    let created = volunteer_schedule::ActiveModel {
        position_id: Set(input.position_id),
        member_id: Set(input.member_id),
        serve_date: Set(input.serve_date),
        status: Set(ScheduleStatus::Scheduled),
        reminder_sent: Set(false),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(schedule_id = created.id, member_id = created.member_id, "volunteer scheduled");
    Ok(created)
}

pub(crate) async fn find_schedule(
    db: &DatabaseConnection,
    id: i32,
) -> AppResult<volunteer_schedule::Model> {
    volunteer_schedule::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("schedule"))
}

/// The assignee confirms or declines; managers may do it for them.
pub async fn respond(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    accept: bool,
) -> AppResult<volunteer_schedule::Model> {
    let found = find_schedule(db, id).await?;
    viewer.require_self_or(found.member_id, Role::can_manage_volunteers, "answer this assignment")?;
    let target = if accept {
        ScheduleStatus::Confirmed
    } else {
        ScheduleStatus::Declined
    };
    if found.status == ScheduleStatus::Completed {
        return Err(AppError::transition(found.status, target));
    }
    if found.serve_date < now().date() {
        return Err(AppError::conflict("this date has passed"));
    }
    let mut active: volunteer_schedule::ActiveModel = found.into();
    active.status = Set(target);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn complete(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
) -> AppResult<volunteer_schedule::Model> {
    viewer.require(Role::can_manage_volunteers, "mark service completed")?;
    let found = find_schedule(db, id).await?;
    if found.status == ScheduleStatus::Declined {
        return Err(AppError::transition(found.status, ScheduleStatus::Completed));
    }
    let mut active: volunteer_schedule::ActiveModel = found.into();
    active.status = Set(ScheduleStatus::Completed);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn unschedule(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<()> {
    viewer.require(Role::can_manage_volunteers, "remove assignments")?;
    find_schedule(db, id).await?.delete(db).await?;
    Ok(())
}

pub async fn rota(db: &DatabaseConnection, range: DateRange) -> AppResult<Vec<RotaSlot>> {
    range.check()?;
    let schedules = volunteer_schedule::Entity::find()
        .filter(volunteer_schedule::Column::ServeDate.between(range.from, range.to))
        .order_by_asc(volunteer_schedule::Column::ServeDate)
        .order_by_asc(volunteer_schedule::Column::Id)
        .find_also_related(member::Entity)
        .all(db)
        .await?;
    let positions: BTreeMap<i32, volunteer_position::Model> = volunteer_position::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut slots: BTreeMap<(NaiveDate, String, i32), Vec<Assignment>> = BTreeMap::new();
    for (schedule, member) in schedules {
        let Some(position) = positions.get(&schedule.position_id) else {
            continue;
        };
        slots
            .entry((schedule.serve_date, position.name.clone(), position.id))
            .or_default()
            .push(Assignment {
                schedule,
                member: member.map(crate::members::without_notes),
            });
    }

    Ok(slots
        .into_iter()
        .filter_map(|((serve_date, _, position_id), assignments)| {
            let position = positions.get(&position_id)?.clone();
            let filled = assignments
                .iter()
                .filter(|a| a.schedule.status != ScheduleStatus::Declined)
                .count() as i32;
            Some(RotaSlot {
                serve_date,
                is_full: filled >= position.slots_needed,
                position,
                assignments,
                filled,
            })
        })
        .collect())
}

/// A member's own assignments from today on.
pub async fn upcoming_for_member(
    db: &DatabaseConnection,
    member_id: i32,
) -> AppResult<Vec<(volunteer_schedule::Model, Option<volunteer_position::Model>)>> {
    Ok(volunteer_schedule::Entity::find()
        .filter(volunteer_schedule::Column::MemberId.eq(member_id))
        .filter(volunteer_schedule::Column::ServeDate.gte(now().date()))
        .order_by_asc(volunteer_schedule::Column::ServeDate)
        .find_also_related(volunteer_position::Entity)
        .all(db)
        .await?)
}

pub async fn export_csv(
    db: &DatabaseConnection,
    viewer: &Viewer,
    range: DateRange,
) -> AppResult<Vec<u8>> {
    viewer.require(Role::can_manage_volunteers, "export the rota")?;
    let slots = rota(db, range).await?;
    let mut rows = Vec::new();
    for slot in slots {
        for a in slot.assignments {
            rows.push(vec![
                slot.serve_date.to_string(),
                slot.position.name.clone(),
                a.member.map(|m| m.full_name()).unwrap_or_default(),
                a.schedule.status.to_value(),
            ]);
        }
    }
    to_csv(&["serve_date", "position", "member", "status"], rows)
}

/// Reminds volunteers serving between now and `at + lead`.
pub async fn send_reminders(
    db: &DatabaseConnection,
    mailer: &Mailer,
    at: NaiveDateTime,
    lead: Duration,
) -> AppResult<usize> {
    let due = volunteer_schedule::Entity::find()
        .filter(volunteer_schedule::Column::ServeDate.between(at.date(), (at + lead).date()))
        .filter(
            volunteer_schedule::Column::Status
                .is_in([ScheduleStatus::Scheduled, ScheduleStatus::Confirmed]),
        )
        .filter(volunteer_schedule::Column::ReminderSent.eq(false))
        .find_also_related(volunteer_position::Entity)
        .all(db)
        .await?;

    let mut batch = ReminderBatch::new(NotificationCategory::Volunteers, "You are serving soon");
    for (schedule, position) in &due {
        let name = position.as_ref().map(|p| p.name.as_str()).unwrap_or("Volunteer");
        batch.push(
            schedule.member_id,
            ReminderLine {
                source_id: schedule.id,
                text: format!("{} on {}", name, schedule.serve_date.format("%A %-d %B")),
                link: Some("/volunteers/mine".to_string()),
            },
        );
    }
    let handled = batch.deliver(db, mailer).await?;
    if !handled.is_empty() {
        volunteer_schedule::Entity::update_many()
            .col_expr(volunteer_schedule::Column::ReminderSent, Expr::value(true))
            .filter(volunteer_schedule::Column::Id.is_in(handled.iter().copied()))
            .exec(db)
            .await?;
    }
    Ok(handled.len())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{create_member, member_viewer, test_db};

    pub(crate) fn ushers() -> PositionInput {
        PositionInput {
            name: "Usher".into(),
            description: None,
            group_id: None,
            slots_needed: 2,
            is_active: true,
        }
    }

    pub(crate) fn next_week() -> NaiveDate {
        now().date() + Duration::days(7)
    }

    #[tokio::test]
    async fn only_active_members_are_scheduled() {
        let db = test_db().await;
        let leader = member_viewer(&db, "Stephen", Role::GroupLeader).await;
        let position = create_position(&db, &leader, ushers()).await.unwrap();
        let visitor = create_member(&db, "Apollos", "Alexandria", MembershipStatus::Visitor).await;

        let result = schedule(
            &db,
            &leader,
            ScheduleInput {
                position_id: position.id,
                member_id: visitor.id,
                serve_date: next_week(),
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn unavailable_and_duplicate_assignments_conflict() {
        let db = test_db().await;
        let leader = member_viewer(&db, "Stephen", Role::GroupLeader).await;
        let position = create_position(&db, &leader, ushers()).await.unwrap();
        let volunteer = member_viewer(&db, "Philip", Role::Volunteer).await;
        let member_id = volunteer.member_id().unwrap();
        let day = next_week();

        let input = ScheduleInput {
            position_id: position.id,
            member_id,
            serve_date: day,
        };
        schedule(&db, &leader, input.clone()).await.unwrap();
        assert!(matches!(
            schedule(&db, &leader, input).await,
            Err(AppError::Conflict(_))
        ));

        availability::add(
            &db,
            &volunteer,
            availability::UnavailabilityInput {
                member_id: None,
                unavailable_on: day + Duration::days(7),
                reason: Some("travelling".into()),
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            schedule(
                &db,
                &leader,
                ScheduleInput {
                    position_id: position.id,
                    member_id,
                    serve_date: day + Duration::days(7),
                },
            )
            .await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn assignee_confirms_and_rota_shows_fill() {
        let db = test_db().await;
        let leader = member_viewer(&db, "Stephen", Role::GroupLeader).await;
        let position = create_position(&db, &leader, ushers()).await.unwrap();
        let a = member_viewer(&db, "Philip", Role::Volunteer).await;
        let b = member_viewer(&db, "Prochorus", Role::Volunteer).await;
        let day = next_week();

        let first = schedule(
            &db,
            &leader,
            ScheduleInput {
                position_id: position.id,
                member_id: a.member_id().unwrap(),
                serve_date: day,
            },
        )
        .await
        .unwrap();
        let second = schedule(
            &db,
            &leader,
            ScheduleInput {
                position_id: position.id,
                member_id: b.member_id().unwrap(),
                serve_date: day,
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            respond(&db, &b, first.id, true).await,
            Err(AppError::Forbidden(_))
        ));
        let confirmed = respond(&db, &a, first.id, true).await.unwrap();
        assert_eq!(confirmed.status, ScheduleStatus::Confirmed);

        let range = DateRange { from: day, to: day };
        let slots = rota(&db, range).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert!(slots[0].is_full);

        respond(&db, &b, second.id, false).await.unwrap();
        let slots = rota(&db, range).await.unwrap();
        assert_eq!(slots[0].filled, 1);
        assert!(!slots[0].is_full);

        let text = String::from_utf8(export_csv(&db, &leader, range).await.unwrap()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("declined"));
    }

    #[tokio::test]
    async fn reminders_cover_the_lead_window_once() {
        let db = test_db().await;
        let leader = member_viewer(&db, "Stephen", Role::GroupLeader).await;
        let position = create_position(&db, &leader, ushers()).await.unwrap();
        let volunteer = member_viewer(&db, "Philip", Role::Volunteer).await;
        let tomorrow = now().date() + Duration::days(1);
        schedule(
            &db,
            &leader,
            ScheduleInput {
                position_id: position.id,
                member_id: volunteer.member_id().unwrap(),
                serve_date: tomorrow,
            },
        )
        .await
        .unwrap();
        schedule(
            &db,
            &leader,
            ScheduleInput {
                position_id: position.id,
                member_id: volunteer.member_id().unwrap(),
                serve_date: next_week(),
            },
        )
        .await
        .unwrap();

        let (mailer, _outbox) = Mailer::capture();
        let lead = Duration::hours(48);
        assert_eq!(send_reminders(&db, &mailer, now(), lead).await.unwrap(), 1);
        assert_eq!(send_reminders(&db, &mailer, now(), lead).await.unwrap(), 0);
    }

    #[test]
    fn ranges_are_bounded() {
        let day = now().date();
        assert!(DateRange { from: day, to: day }.check().is_ok());
        assert!(
            DateRange {
                from: day,
                to: day - Duration::days(1)
            }
            .check()
            .is_err()
        );
        assert_eq!(DateRange::next_days(7).to - DateRange::next_days(7).from, Duration::days(6));
    }
}
