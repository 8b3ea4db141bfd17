//! The membership pipeline: visitor, training, interview, active.

pub mod courses;

use chrono::{Duration, NaiveDateTime};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
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
    interview, lesson, member, scheduled_lesson, user,
    sea_orm_active_enums::{
        InterviewStatus, LessonStatus, MembershipStatus, NotificationCategory, Role,
    },
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{datetime, empty_as_none, trimmed};

/// Statuses shown as columns on the pipeline board.
pub const PIPELINE: [MembershipStatus; 4] = [
    MembershipStatus::Visitor,
    MembershipStatus::InTraining,
    MembershipStatus::TrainingCompleted,
    MembershipStatus::InterviewScheduled,
];

/// Legal membership status moves.
pub fn can_move(from: MembershipStatus, to: MembershipStatus) -> bool {
    use MembershipStatus::*;
    matches!(
        (from, to),
        (Visitor, InTraining)
            | (InTraining, TrainingCompleted)
            | (TrainingCompleted, InterviewScheduled)
            | (InterviewScheduled, Active)
            | (InterviewScheduled, TrainingCompleted)
            | (Active, Inactive)
            | (Inactive, Active)
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollInput {
    pub course_id: i32,
    #[serde(deserialize_with = "datetime")]
    pub starts_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleInput {
    #[serde(deserialize_with = "datetime")]
    pub scheduled_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewInput {
    #[serde(deserialize_with = "datetime")]
    pub scheduled_at: NaiveDateTime,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub interviewer_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeInput {
    pub status: InterviewStatus,
    #[serde(default, deserialize_with = "trimmed")]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LessonProgress {
    pub scheduled: scheduled_lesson::Model,
    pub lesson: Option<lesson::Model>,
}

#[derive(Debug, Serialize)]
pub struct Progress {
    pub member: member::Model,
    pub lessons: Vec<LessonProgress>,
    pub interviews: Vec<interview::Model>,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct BoardCard {
    pub member: member::Model,
    pub completed: usize,
    pub total: usize,
    pub next_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct BoardColumn {
    pub status: MembershipStatus,
    pub cards: Vec<BoardCard>,
}

async fn move_status<C: ConnectionTrait>(
    db: &C,
    member: member::Model,
    to: MembershipStatus,
) -> AppResult<member::Model> {
    if !member.is_active {
        return Err(AppError::conflict("archived members are outside the pipeline"));
    }
    if !can_move(member.membership_status, to) {
        return Err(AppError::transition(member.membership_status, to));
    }
    let joined = member.joined_on;
    let member_id = member.id;
    let mut active: member::ActiveModel = member.into();
    active.membership_status = Set(to);
    if to == MembershipStatus::Active && joined.is_none() {
        active.joined_on = Set(Some(now().date()));
    }
    active.updated_at = Set(now());
    let saved = active.update(db).await?;
    info!(member_id, status = ?to, "membership status changed");
    Ok(saved)
}

async fn tell(db: &DatabaseConnection, member_id: i32, title: &str, body: String) -> AppResult<()> {
    notifications::notify(
        db,
        member_id,
        Notice::new(NotificationCategory::Onboarding, title)
            .body(body)
            .link("/onboarding/me"),
    )
    .await?;
    Ok(())
}

/// Moves a visitor into training and books every lesson one week apart.
pub async fn enroll(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
    input: EnrollInput,
) -> AppResult<Vec<scheduled_lesson::Model>> {
    viewer.require(Role::can_manage_onboarding, "enrol members")?;
    let course = courses::find(db, input.course_id).await?;
    if !course.is_active {
        return Err(FieldErrors::single("course_id", "is not an active course"));
    }
    let lessons = courses::lessons(db, course.id).await?;
    if lessons.is_empty() {
        return Err(FieldErrors::single("course_id", "has no lessons"));
    }
    let member = crate::members::find(db, member_id).await?;

    let txn = db.begin().await?;
    move_status(&txn, member, MembershipStatus::InTraining).await?;
    let stamp = now();
    let mut booked = Vec::with_capacity(lessons.len());
    for (week, lesson) in lessons.iter().enumerate() {
        let row = scheduled_lesson::ActiveModel {
            member_id: Set(member_id),
            lesson_id: Set(lesson.id),
            scheduled_at: Set(input.starts_at + Duration::weeks(week as i64)),
            status: Set(LessonStatus::Scheduled),
            reminder_sent: Set(false),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        booked.push(row);
    }
    txn.commit().await?;

    tell(
        db,
        member_id,
        "Welcome to membership training",
        format!(
            "{} starts {}.",
            course.name,
            input.starts_at.format("%a %-d %b at %H:%M")
        ),
    )
    .await?;
    Ok(booked)
}

async fn find_booking(db: &DatabaseConnection, id: i32) -> AppResult<scheduled_lesson::Model> {
    scheduled_lesson::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("scheduled lesson"))
}

/// Marks a lesson done; finishing the last one completes training.
pub async fn complete_lesson(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
) -> AppResult<scheduled_lesson::Model> {
    viewer.require(Role::can_manage_onboarding, "record lessons")?;
    let booking = find_booking(db, id).await?;
    if !matches!(booking.status, LessonStatus::Scheduled | LessonStatus::Missed) {
        return Err(AppError::transition(booking.status, LessonStatus::Completed));
    }
    let member_id = booking.member_id;

    let txn = db.begin().await?;
    let mut active: scheduled_lesson::ActiveModel = booking.into();
    active.status = Set(LessonStatus::Completed);
    active.updated_at = Set(now());
    let saved = active.update(&txn).await?;

    let outstanding = scheduled_lesson::Entity::find()
        .filter(scheduled_lesson::Column::MemberId.eq(member_id))
        .filter(scheduled_lesson::Column::Status.is_in([LessonStatus::Scheduled, LessonStatus::Missed]))
        .all(&txn)
        .await?;
    let mut finished = false;
    if outstanding.is_empty() {
        let member = member::Entity::find_by_id(member_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound("member"))?;
        if member.membership_status == MembershipStatus::InTraining {
            move_status(&txn, member, MembershipStatus::TrainingCompleted).await?;
            finished = true;
        }
    }
    txn.commit().await?;

    if finished {
        tell(
            db,
            member_id,
            "Training complete",
            "You have finished every lesson. We will be in touch about an interview.".into(),
        )
        .await?;
    }
    Ok(saved)
}

pub async fn miss_lesson(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
) -> AppResult<scheduled_lesson::Model> {
    viewer.require(Role::can_manage_onboarding, "record lessons")?;
    let booking = find_booking(db, id).await?;
    if booking.status != LessonStatus::Scheduled {
        return Err(AppError::transition(booking.status, LessonStatus::Missed));
    }
    let mut active: scheduled_lesson::ActiveModel = booking.into();
    active.status = Set(LessonStatus::Missed);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn reschedule_lesson(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: RescheduleInput,
) -> AppResult<scheduled_lesson::Model> {
    viewer.require(Role::can_manage_onboarding, "reschedule lessons")?;
    if input.scheduled_at <= now() {
        return Err(FieldErrors::single("scheduled_at", "must be in the future"));
    }
    let booking = find_booking(db, id).await?;
    if !matches!(booking.status, LessonStatus::Scheduled | LessonStatus::Missed) {
        return Err(AppError::transition(booking.status, LessonStatus::Scheduled));
    }
    let member_id = booking.member_id;
    let mut active: scheduled_lesson::ActiveModel = booking.into();
    active.status = Set(LessonStatus::Scheduled);
    active.scheduled_at = Set(input.scheduled_at);
    active.reminder_sent = Set(false);
    active.updated_at = Set(now());
    let saved = active.update(db).await?;
    tell(
        db,
        member_id,
        "Lesson rescheduled",
        format!("Your lesson is now on {}.", input.scheduled_at.format("%a %-d %b at %H:%M")),
    )
    .await?;
    Ok(saved)
}

pub async fn schedule_interview(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
    input: InterviewInput,
) -> AppResult<interview::Model> {
    viewer.require(Role::can_manage_onboarding, "schedule interviews")?;
    if input.scheduled_at <= now() {
        return Err(FieldErrors::single("scheduled_at", "must be in the future"));
    }
    if let Some(interviewer_id) = input.interviewer_id {
        user::Entity::find_by_id(interviewer_id)
            .one(db)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| FieldErrors::single("interviewer_id", "is not an active user"))?;
    }
    let member = crate::members::find(db, member_id).await?;

    let txn = db.begin().await?;
    move_status(&txn, member, MembershipStatus::InterviewScheduled).await?;
    let stamp = now();
    let booked = interview::ActiveModel {
        member_id: Set(member_id),
        interviewer_id: Set(input.interviewer_id),
        scheduled_at: Set(input.scheduled_at),
        status: Set(InterviewStatus::Scheduled),
        notes: Set(None),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tell(
        db,
        member_id,
        "Membership interview booked",
        format!("Your interview is on {}.", input.scheduled_at.format("%a %-d %b at %H:%M")),
    )
    .await?;
    Ok(booked)
}

/// Passing makes the member active; anything else sends them back to wait
/// for another interview.
pub async fn record_outcome(
    db: &DatabaseConnection,
    viewer: &Viewer,
    interview_id: i32,
    input: OutcomeInput,
) -> AppResult<interview::Model> {
    viewer.require(Role::can_manage_onboarding, "record interviews")?;
    let found = interview::Entity::find_by_id(interview_id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("interview"))?;
    if found.status != InterviewStatus::Scheduled || input.status == InterviewStatus::Scheduled {
        return Err(AppError::transition(found.status, input.status));
    }
    let member = crate::members::find(db, found.member_id).await?;
    let next = if input.status == InterviewStatus::Passed {
        MembershipStatus::Active
    } else {
        MembershipStatus::TrainingCompleted
    };

    let txn = db.begin().await?;
    let member = move_status(&txn, member, next).await?;
    if next == MembershipStatus::Active {
        let mut joined: member::ActiveModel = member.into();
        joined.joined_on = Set(Some(now().date()));
        joined.update(&txn).await?;
    }
    let mut active: interview::ActiveModel = found.into();
    active.status = Set(input.status);
    active.notes = Set(input.notes);
    active.updated_at = Set(now());
    let saved = active.update(&txn).await?;
    txn.commit().await?;

    if next == MembershipStatus::Active {
        tell(
            db,
            saved.member_id,
            "Welcome, member!",
            "Your membership is now active.".into(),
        )
        .await?;
    }
    Ok(saved)
}

pub async fn deactivate(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
) -> AppResult<member::Model> {
    viewer.require(Role::can_manage_onboarding, "change membership")?;
    let member = crate::members::find(db, member_id).await?;
    move_status(db, member, MembershipStatus::Inactive).await
}

pub async fn reactivate(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
) -> AppResult<member::Model> {
    viewer.require(Role::can_manage_onboarding, "change membership")?;
    let member = crate::members::find(db, member_id).await?;
    move_status(db, member, MembershipStatus::Active).await
}

async fn bookings_for(
    db: &DatabaseConnection,
    member_ids: Vec<i32>,
) -> AppResult<Vec<scheduled_lesson::Model>> {
    Ok(scheduled_lesson::Entity::find()
        .filter(scheduled_lesson::Column::MemberId.is_in(member_ids))
        .filter(scheduled_lesson::Column::Status.ne(LessonStatus::Cancelled))
        .order_by_asc(scheduled_lesson::Column::ScheduledAt)
        .all(db)
        .await?)
}

/// One member's lessons and interviews.
pub async fn progress(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
) -> AppResult<Progress> {
    viewer.require_self_or(member_id, Role::can_manage_onboarding, "see this progress")?;
    let member = crate::members::redact(viewer, crate::members::find(db, member_id).await?);
    let bookings = bookings_for(db, vec![member_id]).await?;
    let lesson_ids: Vec<i32> = bookings.iter().map(|b| b.lesson_id).collect();
    let lessons = lesson::Entity::find()
        .filter(lesson::Column::Id.is_in(lesson_ids))
        .all(db)
        .await?;
    let completed = bookings
        .iter()
        .filter(|b| b.status == LessonStatus::Completed)
        .count();
    let total = bookings.len();
    let lessons = bookings
        .into_iter()
        .map(|scheduled| LessonProgress {
            lesson: lessons.iter().find(|l| l.id == scheduled.lesson_id).cloned(),
            scheduled,
        })
        .collect();
    let interviews = interview::Entity::find()
        .filter(interview::Column::MemberId.eq(member_id))
        .order_by_desc(interview::Column::ScheduledAt)
        .all(db)
        .await?;
    Ok(Progress {
        member,
        lessons,
        interviews,
        completed,
        total,
    })
}

/// Everyone still on the way to membership, grouped by status.
pub async fn board(db: &DatabaseConnection, viewer: &Viewer) -> AppResult<Vec<BoardColumn>> {
    viewer.require(Role::can_manage_onboarding, "see the pipeline")?;
    let members = member::Entity::find()
        .filter(member::Column::IsActive.eq(true))
        .filter(member::Column::MembershipStatus.is_in(PIPELINE))
        .order_by_asc(member::Column::LastName)
        .order_by_asc(member::Column::FirstName)
        .all(db)
        .await?;
    let bookings = bookings_for(db, members.iter().map(|m| m.id).collect()).await?;
    let at = now();

    let mut columns: Vec<BoardColumn> = PIPELINE
        .iter()
        .map(|status| BoardColumn {
            status: *status,
            cards: Vec::new(),
        })
        .collect();
    for member in members {
        let own: Vec<_> = bookings.iter().filter(|b| b.member_id == member.id).collect();
        let card = BoardCard {
            completed: own.iter().filter(|b| b.status == LessonStatus::Completed).count(),
            total: own.len(),
            next_at: own
                .iter()
                .filter(|b| b.status == LessonStatus::Scheduled && b.scheduled_at > at)
                .map(|b| b.scheduled_at)
                .min(),
            member,
        };
        if let Some(column) = columns.iter_mut().find(|c| c.status == card.member.membership_status) {
            column.cards.push(card);
        }
    }
    Ok(columns)
}

/// Member counts for every status, in pipeline order.
pub async fn status_counts(db: &DatabaseConnection) -> AppResult<Vec<(MembershipStatus, u64)>> {
    use sea_orm::Iterable;
    let members = member::Entity::find()
        .filter(member::Column::IsActive.eq(true))
        .all(db)
        .await?;
    Ok(MembershipStatus::iter()
        .map(|status| {
            let count = members.iter().filter(|m| m.membership_status == status).count();
            (status, count as u64)
        })
        .collect())
}

/// Reminds trainees of lessons starting within `lead`.
pub async fn send_reminders(
    db: &DatabaseConnection,
    mailer: &Mailer,
    at: NaiveDateTime,
    lead: Duration,
) -> AppResult<usize> {
    let due = scheduled_lesson::Entity::find()
        .filter(scheduled_lesson::Column::Status.eq(LessonStatus::Scheduled))
        .filter(scheduled_lesson::Column::ReminderSent.eq(false))
        .filter(scheduled_lesson::Column::ScheduledAt.gt(at))
        .filter(scheduled_lesson::Column::ScheduledAt.lte(at + lead))
        .find_also_related(lesson::Entity)
        .all(db)
        .await?;

    let mut batch = ReminderBatch::new(NotificationCategory::Onboarding, "Upcoming lessons");
    for (booking, lesson) in &due {
        let title = lesson.as_ref().map(|l| l.title.as_str()).unwrap_or("Membership lesson");
        batch.push(
            booking.member_id,
            ReminderLine {
                source_id: booking.id,
                text: format!("{} on {}", title, booking.scheduled_at.format("%a %-d %b %H:%M")),
                link: Some("/onboarding/me".into()),
            },
        );
    }
    let handled = batch.deliver(db, mailer).await?;
    if !handled.is_empty() {
        scheduled_lesson::Entity::update_many()
            .col_expr(scheduled_lesson::Column::ReminderSent, Expr::value(true))
            .filter(scheduled_lesson::Column::Id.is_in(handled.iter().copied()))
            .exec(db)
            .await?;
    }
    Ok(handled.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::notifications::unread_count;
    use crate::testing::{create_member, member_viewer, test_db};
    use courses::tests::course_with_lessons;

    #[test]
    fn status_machine() {
        use MembershipStatus::*;
        assert!(can_move(Visitor, InTraining));
        assert!(can_move(InterviewScheduled, TrainingCompleted));
        assert!(can_move(Inactive, Active));
        assert!(!can_move(Visitor, Active));
        assert!(!can_move(InTraining, InterviewScheduled));
        assert!(!can_move(Active, Visitor));
    }

    #[tokio::test]
    async fn visitor_becomes_member() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Priscilla", Role::Pastor).await;
        let course = course_with_lessons(&db, &pastor, 3).await;
        let visitor = create_member(&db, "Apollos", "Alexandria", MembershipStatus::Visitor).await;
        let starts_at = now() + Duration::days(2);

        let booked = enroll(&db, &pastor, visitor.id, EnrollInput { course_id: course.id, starts_at })
            .await
            .unwrap();
        assert_eq!(booked.len(), 3);
        assert_eq!(booked[2].scheduled_at - booked[0].scheduled_at, Duration::weeks(2));
        assert!(matches!(
            enroll(&db, &pastor, visitor.id, EnrollInput { course_id: course.id, starts_at }).await,
            Err(AppError::InvalidTransition { .. })
        ));

        miss_lesson(&db, &pastor, booked[0].id).await.unwrap();
        for booking in &booked {
            complete_lesson(&db, &pastor, booking.id).await.unwrap();
        }
        let member = crate::members::find(&db, visitor.id).await.unwrap();
        assert_eq!(member.membership_status, MembershipStatus::TrainingCompleted);

        let slot = InterviewInput { scheduled_at: now() + Duration::days(30), interviewer_id: Some(pastor.user.id) };
        let first = schedule_interview(&db, &pastor, visitor.id, slot.clone()).await.unwrap();
        record_outcome(&db, &pastor, first.id, OutcomeInput { status: InterviewStatus::Failed, notes: None })
            .await
            .unwrap();
        assert_eq!(
            crate::members::find(&db, visitor.id).await.unwrap().membership_status,
            MembershipStatus::TrainingCompleted
        );

        let second = schedule_interview(&db, &pastor, visitor.id, slot).await.unwrap();
        record_outcome(&db, &pastor, second.id, OutcomeInput { status: InterviewStatus::Passed, notes: Some("Welcome".into()) })
            .await
            .unwrap();
        let member = crate::members::find(&db, visitor.id).await.unwrap();
        assert_eq!(member.membership_status, MembershipStatus::Active);
        assert_eq!(member.joined_on, Some(now().date()));
        assert!(matches!(
            record_outcome(&db, &pastor, second.id, OutcomeInput { status: InterviewStatus::Failed, notes: None }).await,
            Err(AppError::InvalidTransition { .. })
        ));

        // enrol, training complete, interview x2, welcome
        assert_eq!(unread_count(&db, visitor.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn board_groups_by_status_with_progress() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Priscilla", Role::Pastor).await;
        let course = course_with_lessons(&db, &pastor, 2).await;
        let trainee = create_member(&db, "Apollos", "Alexandria", MembershipStatus::Visitor).await;
        create_member(&db, "Eunice", "Lystra", MembershipStatus::Visitor).await;
        let booked = enroll(
            &db,
            &pastor,
            trainee.id,
            EnrollInput { course_id: course.id, starts_at: now() + Duration::days(1) },
        )
        .await
        .unwrap();
        complete_lesson(&db, &pastor, booked[0].id).await.unwrap();

        let columns = board(&db, &pastor).await.unwrap();
        assert_eq!(columns[0].status, MembershipStatus::Visitor);
        assert_eq!(columns[0].cards.len(), 1);
        let card = &columns[1].cards[0];
        assert_eq!((card.completed, card.total), (1, 2));
        assert!(card.next_at.is_some());

        let member = member_viewer(&db, "Lois", Role::Member).await;
        assert!(matches!(board(&db, &member).await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn deactivate_and_reactivate() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Priscilla", Role::Pastor).await;
        let active = create_member(&db, "Demas", "Thessalonica", MembershipStatus::Active).await;
        let visitor = create_member(&db, "Eunice", "Lystra", MembershipStatus::Visitor).await;

        let gone = deactivate(&db, &pastor, active.id).await.unwrap();
        assert_eq!(gone.membership_status, MembershipStatus::Inactive);
        let back = reactivate(&db, &pastor, active.id).await.unwrap();
        assert_eq!(back.membership_status, MembershipStatus::Active);
        assert_eq!(back.joined_on, active.joined_on);
        assert!(matches!(
            deactivate(&db, &pastor, visitor.id).await,
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn lesson_reminders_fire_once() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Priscilla", Role::Pastor).await;
        let course = course_with_lessons(&db, &pastor, 2).await;
        let trainee = create_member(&db, "Apollos", "Alexandria", MembershipStatus::Visitor).await;
        enroll(
            &db,
            &pastor,
            trainee.id,
            EnrollInput { course_id: course.id, starts_at: now() + Duration::hours(5) },
        )
        .await
        .unwrap();
        let (mailer, outbox) = Mailer::capture();

        assert_eq!(send_reminders(&db, &mailer, now(), Duration::hours(24)).await.unwrap(), 1);
        assert_eq!(send_reminders(&db, &mailer, now(), Duration::hours(24)).await.unwrap(), 0);
        assert_eq!(outbox.lock().unwrap().len(), 1);
    }
}
