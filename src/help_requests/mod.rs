//! Pastoral care tickets: members ask for help, staff pick requests up.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Viewer;
use crate::communication::notifications::{self, Notice};
use crate::core::now;
use crate::entities::{
    help_request, help_request_comment, member, user,
    sea_orm_active_enums::{HelpCategory, HelpStatus, NotificationCategory, Role, Urgency},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{checkbox, choice};
use crate::util::pagination::{Page, PageParams, fetch_page};
use crate::util::validation::{check_length, require_text};

fn default_urgency() -> Urgency {
    Urgency::Normal
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelpRequestInput {
    pub title: String,
    pub description: String,
    pub category: HelpCategory,
    #[serde(default = "default_urgency")]
    pub urgency: Urgency,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_confidential: bool,
}

impl HelpRequestInput {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "title", &self.title);
        check_length(&mut errors, "title", &self.title, 200);
        require_text(&mut errors, "description", &self.description);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelpFilter {
    #[serde(default, deserialize_with = "choice")]
    pub status: Option<HelpStatus>,
    #[serde(default, deserialize_with = "choice")]
    pub category: Option<HelpCategory>,
    #[serde(default, deserialize_with = "choice")]
    pub urgency: Option<Urgency>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignInput {
    pub user_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusInput {
    pub status: HelpStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentInput {
    pub body: String,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_internal: bool,
}

#[derive(Debug, Serialize)]
pub struct HelpRequestDetail {
    pub request: help_request::Model,
    pub requester: Option<member::Model>,
    pub comments: Vec<help_request_comment::Model>,
    pub can_manage: bool,
}

/// Whether a request may move from `from` to `to`.
pub fn allowed(from: HelpStatus, to: HelpStatus) -> bool {
    use HelpStatus::*;
    matches!(
        (from, to),
        (Open, InProgress)
            | (InProgress, Resolved)
            | (Resolved, InProgress)
            | (Open | InProgress | Resolved, Closed)
    )
}

fn is_assignee(viewer: &Viewer, request: &help_request::Model) -> bool {
    request.assigned_to == Some(viewer.user.id)
}

fn can_view(viewer: &Viewer, request: &help_request::Model) -> bool {
    viewer.role().can_manage_help_requests()
        || viewer.is_self(request.requester_id)
        || is_assignee(viewer, request)
        || (!request.is_confidential && request.status == HelpStatus::Open)
}

fn sees_internal(viewer: &Viewer, request: &help_request::Model) -> bool {
    viewer.role().can_manage_help_requests() || is_assignee(viewer, request)
}

async fn find(db: &DatabaseConnection, id: i32) -> AppResult<help_request::Model> {
    help_request::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("help request"))
}

/// Hidden requests look missing rather than forbidden.
async fn find_visible(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
) -> AppResult<help_request::Model> {
    let request = find(db, id).await?;
    if can_view(viewer, &request) {
        Ok(request)
    } else {
        Err(AppError::NotFound("help request"))
    }
}

pub async fn list(
    db: &DatabaseConnection,
    viewer: &Viewer,
    filter: &HelpFilter,
    params: PageParams,
) -> AppResult<Page<help_request::Model>> {
    let mut query = help_request::Entity::find();
    if !viewer.role().can_manage_help_requests() {
        let mut visible = Condition::any()
            .add(help_request::Column::AssignedTo.eq(viewer.user.id))
            .add(
                Condition::all()
                    .add(help_request::Column::IsConfidential.eq(false))
                    .add(help_request::Column::Status.eq(HelpStatus::Open)),
            );
        if let Some(member_id) = viewer.member.as_ref().map(|m| m.id) {
            visible = visible.add(help_request::Column::RequesterId.eq(member_id));
        }
        query = query.filter(visible);
    }
    if let Some(status) = filter.status {
        query = query.filter(help_request::Column::Status.eq(status));
    }
    if let Some(category) = filter.category {
        query = query.filter(help_request::Column::Category.eq(category));
    }
    if let Some(urgency) = filter.urgency {
        query = query.filter(help_request::Column::Urgency.eq(urgency));
    }
    let query = query.order_by_desc(help_request::Column::CreatedAt);
    Ok(fetch_page(query, db, params).await?)
}

pub async fn get(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
) -> AppResult<HelpRequestDetail> {
    let request = find_visible(db, viewer, id).await?;
    let mut comments = help_request_comment::Entity::find()
        .filter(help_request_comment::Column::RequestId.eq(id))
        .order_by_asc(help_request_comment::Column::CreatedAt);
    if !sees_internal(viewer, &request) {
        comments = comments.filter(help_request_comment::Column::IsInternal.eq(false));
    }
    let comments = comments.all(db).await?;
    let requester = member::Entity::find_by_id(request.requester_id)
        .one(db)
        .await?
        .map(|m| crate::members::redact(viewer, m));
    Ok(HelpRequestDetail {
        can_manage: sees_internal(viewer, &request),
        request,
        requester,
        comments,
    })
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: HelpRequestInput,
) -> AppResult<help_request::Model> {
    let requester_id = viewer.member_id()?;
    input.validate()?;
    let stamp = now();
    let created = help_request::ActiveModel {
        requester_id: Set(requester_id),
        title: Set(input.title.trim().to_string()),
        description: Set(input.description.trim().to_string()),
        category: Set(input.category),
        urgency: Set(input.urgency),
        status: Set(HelpStatus::Open),
        assigned_to: Set(None),
        is_confidential: Set(input.is_confidential),
        resolved_at: Set(None),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(request_id = created.id, urgency = ?created.urgency, "help request opened");
    Ok(created)
}

/// The requester may edit while the request is still open; staff any time
/// before it is closed.
pub async fn update(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: HelpRequestInput,
) -> AppResult<help_request::Model> {
    let request = find_visible(db, viewer, id).await?;
    let staff = viewer.role().can_manage_help_requests();
    let own_open = viewer.is_self(request.requester_id) && request.status == HelpStatus::Open;
    if !staff && !own_open {
        return Err(AppError::forbidden("you may not edit this request"));
    }
    if request.status == HelpStatus::Closed {
        return Err(AppError::conflict("closed requests cannot be edited"));
    }
    input.validate()?;
    let mut active: help_request::ActiveModel = request.into();
    active.title = Set(input.title.trim().to_string());
    active.description = Set(input.description.trim().to_string());
    active.category = Set(input.category);
    active.urgency = Set(input.urgency);
    active.is_confidential = Set(input.is_confidential);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

async fn tell_requester(
    db: &DatabaseConnection,
    request: &help_request::Model,
    title: &str,
    body: String,
) -> AppResult<()> {
    notifications::notify(
        db,
        request.requester_id,
        Notice::new(NotificationCategory::HelpRequests, title)
            .body(body)
            .link(format!("/help/{}", request.id)),
    )
    .await?;
    Ok(())
}

pub async fn assign(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: AssignInput,
) -> AppResult<help_request::Model> {
    viewer.require(Role::can_manage_help_requests, "assign help requests")?;
    let request = find(db, id).await?;
    if !matches!(request.status, HelpStatus::Open | HelpStatus::InProgress) {
        return Err(AppError::transition(request.status, HelpStatus::InProgress));
    }
    let assignee = user::Entity::find_by_id(input.user_id)
        .one(db)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| FieldErrors::single("user_id", "is not an active user"))?;

    let mut active: help_request::ActiveModel = request.into();
    active.assigned_to = Set(Some(assignee.id));
    active.status = Set(HelpStatus::InProgress);
    active.updated_at = Set(now());
    let saved = active.update(db).await?;
    tell_requester(
        db,
        &saved,
        "Someone is helping with your request",
        format!("\"{}\" has been picked up.", saved.title),
    )
    .await?;
    info!(request_id = id, assignee = assignee.id, "help request assigned");
    Ok(saved)
}

/// Staff and the assignee move requests along; requesters may only close
/// their own.
pub async fn change_status(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    to: HelpStatus,
) -> AppResult<help_request::Model> {
    let request = find_visible(db, viewer, id).await?;
    let manages = sees_internal(viewer, &request);
    let closes_own = viewer.is_self(request.requester_id) && to == HelpStatus::Closed;
    if !manages && !closes_own {
        return Err(AppError::forbidden("you may not change this request"));
    }
    if !allowed(request.status, to) {
        return Err(AppError::transition(request.status, to));
    }
    let stamp = now();
    let mut active: help_request::ActiveModel = request.into();
    active.status = Set(to);
    match to {
        HelpStatus::Resolved => active.resolved_at = Set(Some(stamp)),
        HelpStatus::InProgress => active.resolved_at = Set(None),
        _ => {}
    }
    active.updated_at = Set(stamp);
    let saved = active.update(db).await?;
    let label = match to {
        HelpStatus::Open => "open",
        HelpStatus::InProgress => "in progress",
        HelpStatus::Resolved => "resolved",
        HelpStatus::Closed => "closed",
    };
    tell_requester(
        db,
        &saved,
        "Your help request was updated",
        format!("\"{}\" is now {label}.", saved.title),
    )
    .await?;
    Ok(saved)
}

pub async fn comment(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: CommentInput,
) -> AppResult<help_request_comment::Model> {
    let request = find_visible(db, viewer, id).await?;
    if input.is_internal && !sees_internal(viewer, &request) {
        return Err(AppError::forbidden("only staff can write internal notes"));
    }
    if request.status == HelpStatus::Closed {
        return Err(AppError::conflict("closed requests take no comments"));
    }
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "body", &input.body);
    errors.into_result()?;
    let stamp = now();
    Ok(help_request_comment::ActiveModel {
        request_id: Set(id),
        author_id: Set(viewer.user.id),
        body: Set(input.body.trim().to_string()),
        is_internal: Set(input.is_internal),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Open and in-progress requests per urgency, most urgent first.
pub async fn open_by_urgency(db: &DatabaseConnection) -> AppResult<Vec<(Urgency, u64)>> {
    let open = help_request::Entity::find()
        .filter(help_request::Column::Status.is_in([HelpStatus::Open, HelpStatus::InProgress]))
        .all(db)
        .await?;
    let order = [Urgency::Urgent, Urgency::High, Urgency::Normal, Urgency::Low];
    Ok(order
        .into_iter()
        .map(|u| (u, open.iter().filter(|r| r.urgency == u).count() as u64))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::notifications::unread_count;
    use crate::testing::{member_viewer, test_db};

    fn meals(confidential: bool) -> HelpRequestInput {
        HelpRequestInput {
            title: "Meals after surgery".into(),
            description: "Two weeks of dinners".into(),
            category: HelpCategory::Meals,
            urgency: Urgency::High,
            is_confidential: confidential,
        }
    }

    #[test]
    fn transition_table() {
        use HelpStatus::*;
        assert!(allowed(Open, InProgress));
        assert!(allowed(Resolved, InProgress));
        assert!(allowed(Open, Closed));
        assert!(!allowed(Open, Resolved));
        assert!(!allowed(Closed, Open));
        assert!(!allowed(Closed, InProgress));
        assert!(!allowed(InProgress, Open));
    }

    #[tokio::test]
    async fn confidential_requests_stay_private() {
        let db = test_db().await;
        let requester = member_viewer(&db, "Tabitha", Role::Member).await;
        let neighbour = member_viewer(&db, "Lydia", Role::Member).await;
        let pastor = member_viewer(&db, "Timothy", Role::Pastor).await;

        let public = create(&db, &requester, meals(false)).await.unwrap();
        let private = create(&db, &requester, meals(true)).await.unwrap();

        let seen = list(&db, &neighbour, &HelpFilter::default(), PageParams::default())
            .await
            .unwrap();
        assert_eq!(seen.items.iter().map(|r| r.id).collect::<Vec<_>>(), vec![public.id]);
        assert!(matches!(
            get(&db, &neighbour, private.id).await,
            Err(AppError::NotFound(_))
        ));
        let all = list(&db, &pastor, &HelpFilter::default(), PageParams::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(
            list(&db, &requester, &HelpFilter::default(), PageParams::default())
                .await
                .unwrap()
                .total,
            2
        );
    }

    #[tokio::test]
    async fn assignment_moves_work_along_and_notifies() {
        let db = test_db().await;
        let requester = member_viewer(&db, "Tabitha", Role::Member).await;
        let pastor = member_viewer(&db, "Timothy", Role::Pastor).await;
        let requester_id = requester.member_id().unwrap();
        let request = create(&db, &requester, meals(false)).await.unwrap();

        assert!(matches!(
            assign(&db, &requester, request.id, AssignInput { user_id: pastor.user.id }).await,
            Err(AppError::Forbidden(_))
        ));
        let assigned = assign(&db, &pastor, request.id, AssignInput { user_id: pastor.user.id })
            .await
            .unwrap();
        assert_eq!(assigned.status, HelpStatus::InProgress);
        assert_eq!(unread_count(&db, requester_id).await.unwrap(), 1);

        let resolved = change_status(&db, &pastor, request.id, HelpStatus::Resolved)
            .await
            .unwrap();
        assert!(resolved.resolved_at.is_some());
        let reopened = change_status(&db, &pastor, request.id, HelpStatus::InProgress)
            .await
            .unwrap();
        assert!(reopened.resolved_at.is_none());
        assert!(matches!(
            change_status(&db, &requester, request.id, HelpStatus::Resolved).await,
            Err(AppError::Forbidden(_))
        ));
        change_status(&db, &requester, request.id, HelpStatus::Closed)
            .await
            .unwrap();
        assert!(matches!(
            change_status(&db, &pastor, request.id, HelpStatus::InProgress).await,
            Err(AppError::InvalidTransition { .. })
        ));
        assert_eq!(unread_count(&db, requester_id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn internal_notes_are_hidden_from_the_requester() {
        let db = test_db().await;
        let requester = member_viewer(&db, "Tabitha", Role::Member).await;
        let pastor = member_viewer(&db, "Timothy", Role::Pastor).await;
        let request = create(&db, &requester, meals(false)).await.unwrap();

        assert!(matches!(
            comment(
                &db,
                &requester,
                request.id,
                CommentInput { body: "psst".into(), is_internal: true },
            )
            .await,
            Err(AppError::Forbidden(_))
        ));
        comment(
            &db,
            &requester,
            request.id,
            CommentInput { body: "Thank you".into(), is_internal: false },
        )
        .await
        .unwrap();
        comment(
            &db,
            &pastor,
            request.id,
            CommentInput { body: "Check with family".into(), is_internal: true },
        )
        .await
        .unwrap();

        assert_eq!(get(&db, &requester, request.id).await.unwrap().comments.len(), 1);
        assert_eq!(get(&db, &pastor, request.id).await.unwrap().comments.len(), 2);
    }
}
