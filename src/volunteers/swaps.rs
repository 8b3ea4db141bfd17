//! Shift swaps: an assignee offers their slot to a named member or to anyone.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
    sea_query::{Expr, Query},
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::{ensure_eligible, find_schedule};
use crate::auth::Viewer;
use crate::communication::notifications::{self, Notice};
use crate::core::now;
use crate::entities::{
    shift_swap, volunteer_schedule,
    sea_orm_active_enums::{NotificationCategory, ScheduleStatus, SwapStatus},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{empty_as_none, trimmed};

#[derive(Debug, Clone, Deserialize)]
pub struct SwapRequest {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub offered_to: Option<i32>,
    #[serde(default, deserialize_with = "trimmed")]
    pub reason: Option<String>,
}

async fn find(db: &DatabaseConnection, id: i32) -> AppResult<shift_swap::Model> {
    shift_swap::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("swap"))
}

fn ensure_pending(swap: &shift_swap::Model, to: SwapStatus) -> AppResult<()> {
    if swap.status != SwapStatus::Pending {
        return Err(AppError::transition(swap.status, to));
    }
    Ok(())
}

fn notice(title: &str, body: String) -> Notice {
    Notice::new(NotificationCategory::Volunteers, title)
        .body(body)
        .link("/volunteers/swaps")
}

pub async fn request(
    db: &DatabaseConnection,
    viewer: &Viewer,
    schedule_id: i32,
    input: SwapRequest,
) -> AppResult<shift_swap::Model> {
    let schedule = find_schedule(db, schedule_id).await?;
    if !viewer.is_self(schedule.member_id) {
        return Err(AppError::forbidden("only the assigned volunteer can ask for a swap"));
    }
    if schedule.serve_date <= now().date() {
        return Err(AppError::conflict("swaps are only possible for future dates"));
    }
    if matches!(schedule.status, ScheduleStatus::Declined | ScheduleStatus::Completed) {
        return Err(AppError::conflict("this assignment can no longer be swapped"));
    }
    if input.offered_to == Some(schedule.member_id) {
        return Err(FieldErrors::single("offered_to", "cannot be yourself"));
    }
    if let Some(offered_to) = input.offered_to {
        crate::members::find(db, offered_to).await?;
    }
    let pending = shift_swap::Entity::find()
        .filter(shift_swap::Column::ScheduleId.eq(schedule_id))
        .filter(shift_swap::Column::Status.eq(SwapStatus::Pending))
        .count(db)
        .await?;
    if pending > 0 {
        return Err(AppError::conflict("a swap is already pending for this assignment"));
    }

    let stamp = now();
    let created = shift_swap::ActiveModel {
        schedule_id: Set(schedule_id),
        requested_by: Set(schedule.member_id),
        offered_to: Set(input.offered_to),
        accepted_by: Set(None),
        status: Set(SwapStatus::Pending),
        reason: Set(input.reason),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    if let Some(offered_to) = created.offered_to {
        notifications::notify(
            db,
            offered_to,
            notice(
                "Can you cover a shift?",
                format!("A swap was offered to you for {}.", schedule.serve_date),
            ),
        )
        .await?;
    }
    info!(swap_id = created.id, schedule_id, "swap requested");
    Ok(created)
}

/// Pending swaps the viewer may pick up: offered to them, or open to anyone.
pub async fn open_for(
    db: &DatabaseConnection,
    viewer: &Viewer,
) -> AppResult<Vec<(shift_swap::Model, volunteer_schedule::Model)>> {
    let member_id = viewer.member_id()?;
    let swaps = shift_swap::Entity::find()
        .filter(shift_swap::Column::Status.eq(SwapStatus::Pending))
        .filter(shift_swap::Column::RequestedBy.ne(member_id))
        .filter(
            Condition::any()
                .add(shift_swap::Column::OfferedTo.eq(member_id))
                .add(shift_swap::Column::OfferedTo.is_null()),
        )
        .order_by_asc(shift_swap::Column::CreatedAt)
        .all(db)
        .await?;
    let mut rows = Vec::new();
    for swap in swaps {
        if let Some(schedule) = volunteer_schedule::Entity::find_by_id(swap.schedule_id)
            .one(db)
            .await?
        {
            rows.push((swap, schedule));
        }
    }
    Ok(rows)
}

/// Swaps the viewer asked for.
pub async fn mine(db: &DatabaseConnection, viewer: &Viewer) -> AppResult<Vec<shift_swap::Model>> {
    let member_id = viewer.member_id()?;
    Ok(shift_swap::Entity::find()
        .filter(shift_swap::Column::RequestedBy.eq(member_id))
        .order_by_desc(shift_swap::Column::CreatedAt)
        .all(db)
        .await?)
}

pub async fn accept(
    db: &DatabaseConnection,
    viewer: &Viewer,
    swap_id: i32,
) -> AppResult<shift_swap::Model> {
    let swap = find(db, swap_id).await?;
    ensure_pending(&swap, SwapStatus::Accepted)?;
    let accepter = viewer.member_id()?;
    if swap.offered_to.is_some_and(|id| id != accepter) {
        return Err(AppError::forbidden("this swap was offered to someone else"));
    }
    if swap.requested_by == accepter {
        return Err(AppError::conflict("you cannot accept your own swap"));
    }
    let schedule = find_schedule(db, swap.schedule_id).await?;
    if schedule.serve_date < now().date() {
        return Err(AppError::conflict("this date has passed"));
    }

    let txn = db.begin().await?;
    ensure_eligible(&txn, accepter, schedule.position_id, schedule.serve_date).await?;
    let stamp = now();
    let serve_date = schedule.serve_date;
    let mut moved: volunteer_schedule::ActiveModel = schedule.into();
    moved.member_id = Set(accepter);
    moved.status = Set(ScheduleStatus::Scheduled);
    moved.reminder_sent = Set(false);
    moved.updated_at = Set(stamp);
    moved.update(&txn).await?;

    let requested_by = swap.requested_by;
    let mut active: shift_swap::ActiveModel = swap.into();
    active.status = Set(SwapStatus::Accepted);
    active.accepted_by = Set(Some(accepter));
    active.updated_at = Set(stamp);
    let saved = active.update(&txn).await?;
    txn.commit().await?;

    notifications::notify(
        db,
        requested_by,
        notice(
            "Your swap was accepted",
            format!("Someone is covering your shift on {serve_date}."),
        ),
    )
    .await?;
    info!(swap_id, accepter, "swap accepted");
    Ok(saved)
}

pub async fn decline(
    db: &DatabaseConnection,
    viewer: &Viewer,
    swap_id: i32,
) -> AppResult<shift_swap::Model> {
    let swap = find(db, swap_id).await?;
    ensure_pending(&swap, SwapStatus::Declined)?;
    match swap.offered_to {
        Some(id) if viewer.is_self(id) => {}
        _ => return Err(AppError::forbidden("only the member asked can decline")),
    }
    let requested_by = swap.requested_by;
    let mut active: shift_swap::ActiveModel = swap.into();
    active.status = Set(SwapStatus::Declined);
    active.updated_at = Set(now());
    let saved = active.update(db).await?;
    notifications::notify(
        db,
        requested_by,
        notice("Your swap was declined", "Your shift is still yours.".into()),
    )
    .await?;
    Ok(saved)
}

pub async fn cancel(
    db: &DatabaseConnection,
    viewer: &Viewer,
    swap_id: i32,
) -> AppResult<shift_swap::Model> {
    let swap = find(db, swap_id).await?;
    ensure_pending(&swap, SwapStatus::Cancelled)?;
    if !viewer.is_self(swap.requested_by) {
        return Err(AppError::forbidden("only the requester can cancel"));
    }
    let mut active: shift_swap::ActiveModel = swap.into();
    active.status = Set(SwapStatus::Cancelled);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

/// Pending swaps for dates before `today` expire.
pub async fn expire(db: &DatabaseConnection, today: NaiveDate) -> AppResult<u64> {
    let past = Query::select()
        .column(volunteer_schedule::Column::Id)
        .from(volunteer_schedule::Entity)
        .and_where(volunteer_schedule::Column::ServeDate.lt(today))
        .to_owned();
    let result = shift_swap::Entity::update_many()
        .col_expr(shift_swap::Column::Status, Expr::value(SwapStatus::Expired))
        .col_expr(shift_swap::Column::UpdatedAt, Expr::value(now()))
        .filter(shift_swap::Column::Status.eq(SwapStatus::Pending))
        .filter(shift_swap::Column::ScheduleId.in_subquery(past))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::{MembershipStatus, Role};
    use crate::testing::{create_member, member_viewer, test_db};
    use crate::volunteers::tests::{next_week, ushers};
    use crate::volunteers::{ScheduleInput, create_position, schedule};
    use chrono::Duration;

    struct Fixture {
        db: DatabaseConnection,
        assignee: Viewer,
        colleague: Viewer,
        schedule: volunteer_schedule::Model,
    }

    async fn fixture() -> Fixture {
        let db = test_db().await;
        let leader = member_viewer(&db, "Stephen", Role::GroupLeader).await;
        let assignee = member_viewer(&db, "Philip", Role::Volunteer).await;
        let colleague = member_viewer(&db, "Nicanor", Role::Volunteer).await;
        let position = create_position(&db, &leader, ushers()).await.unwrap();
        let schedule = schedule(
            &db,
            &leader,
            ScheduleInput {
                position_id: position.id,
                member_id: assignee.member_id().unwrap(),
                serve_date: next_week(),
            },
        )
        .await
        .unwrap();
        Fixture {
            db,
            assignee,
            colleague,
            schedule,
        }
    }

    fn open() -> SwapRequest {
        SwapRequest {
            offered_to: None,
            reason: Some("family visit".into()),
        }
    }

    #[tokio::test]
    async fn only_the_assignee_requests_and_only_once() {
        let f = fixture().await;
        assert!(matches!(
            request(&f.db, &f.colleague, f.schedule.id, open()).await,
            Err(AppError::Forbidden(_))
        ));
        request(&f.db, &f.assignee, f.schedule.id, open()).await.unwrap();
        assert!(matches!(
            request(&f.db, &f.assignee, f.schedule.id, open()).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn accepting_reassigns_the_shift() {
        let f = fixture().await;
        let swap = request(&f.db, &f.assignee, f.schedule.id, open()).await.unwrap();

        assert!(matches!(
            accept(&f.db, &f.assignee, swap.id).await,
            Err(AppError::Conflict(_))
        ));
        let offers = open_for(&f.db, &f.colleague).await.unwrap();
        assert_eq!(offers.len(), 1);

        let accepted = accept(&f.db, &f.colleague, swap.id).await.unwrap();
        assert_eq!(accepted.status, SwapStatus::Accepted);
        let moved = find_schedule(&f.db, f.schedule.id).await.unwrap();
        assert_eq!(moved.member_id, f.colleague.member_id().unwrap());
        assert_eq!(moved.status, ScheduleStatus::Scheduled);
        assert!(!moved.reminder_sent);

        assert!(matches!(
            cancel(&f.db, &f.assignee, swap.id).await,
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn ineligible_accepters_are_refused() {
        let f = fixture().await;
        let visitor = create_member(&f.db, "Simon", "Magus", MembershipStatus::Visitor).await;
        let user = crate::testing::create_user(
            &f.db,
            "simon@example.org",
            Role::Member,
            Some(visitor.id),
        )
        .await;
        let visitor_viewer = crate::testing::viewer_for(&f.db, user).await;
        let swap = request(&f.db, &f.assignee, f.schedule.id, open()).await.unwrap();

        assert!(matches!(
            accept(&f.db, &visitor_viewer, swap.id).await,
            Err(AppError::Conflict(_))
        ));
        // The failed attempt leaves the shift and swap untouched.
        assert_eq!(
            find_schedule(&f.db, f.schedule.id).await.unwrap().member_id,
            f.assignee.member_id().unwrap()
        );
        assert_eq!(find(&f.db, swap.id).await.unwrap().status, SwapStatus::Pending);
    }

    #[tokio::test]
    async fn directed_swaps_are_declined_by_the_target() {
        let f = fixture().await;
        let directed = SwapRequest {
            offered_to: f.colleague.member_id().ok(),
            reason: None,
        };
        let swap = request(&f.db, &f.assignee, f.schedule.id, directed).await.unwrap();
        assert!(matches!(
            decline(&f.db, &f.assignee, swap.id).await,
            Err(AppError::Forbidden(_))
        ));
        let declined = decline(&f.db, &f.colleague, swap.id).await.unwrap();
        assert_eq!(declined.status, SwapStatus::Declined);

        let again = request(&f.db, &f.assignee, f.schedule.id, open()).await.unwrap();
        let cancelled = cancel(&f.db, &f.assignee, again.id).await.unwrap();
        assert_eq!(cancelled.status, SwapStatus::Cancelled);
    }

    #[tokio::test]
    async fn stale_swaps_expire() {
        let f = fixture().await;
        let swap = request(&f.db, &f.assignee, f.schedule.id, open()).await.unwrap();
        assert_eq!(expire(&f.db, now().date()).await.unwrap(), 0);
        let after = f.schedule.serve_date + Duration::days(1);
        assert_eq!(expire(&f.db, after).await.unwrap(), 1);
        assert_eq!(find(&f.db, swap.id).await.unwrap().status, SwapStatus::Expired);
        assert!(mine(&f.db, &f.assignee).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn expiry_copes_with_years_of_history() {
        let f = fixture().await;
        let swap = request(&f.db, &f.assignee, f.schedule.id, open()).await.unwrap();
        let stamp = now();
        let member_id = f.colleague.member_id().unwrap();
        let history: Vec<volunteer_schedule::ActiveModel> = (1..=35_000)
            .map(|days| volunteer_schedule::ActiveModel {
                position_id: Set(f.schedule.position_id),
                member_id: Set(member_id),
                serve_date: Set(stamp.date() - Duration::days(days)),
                status: Set(ScheduleStatus::Completed),
                reminder_sent: Set(true),
                created_at: Set(stamp),
                updated_at: Set(stamp),
                ..Default::default()
            })
            .collect();
        for chunk in history.chunks(1_000) {
            volunteer_schedule::Entity::insert_many(chunk.to_vec())
                .exec(&f.db)
                .await
                .unwrap();
        }

        assert_eq!(expire(&f.db, now().date()).await.unwrap(), 0);
        let after = f.schedule.serve_date + Duration::days(1);
        assert_eq!(expire(&f.db, after).await.unwrap(), 1);
        assert_eq!(find(&f.db, swap.id).await.unwrap().status, SwapStatus::Expired);
    }
}
