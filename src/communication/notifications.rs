use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, sea_query::Expr,
};
use serde::Deserialize;

use super::preferences;
use crate::core::now;
use crate::entities::{notification, sea_orm_active_enums::NotificationCategory};
use crate::error::{AppError, AppResult};
use crate::util::pagination::{Page, PageParams, fetch_page};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default, deserialize_with = "crate::util::form::checkbox")]
    pub unread: bool,
}

/// An in-app notice that skips members who have opted out of its category.
#[derive(Debug, Clone)]
pub struct Notice {
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

impl Notice {
    pub fn new(category: NotificationCategory, title: impl Into<String>) -> Self {
        Self {
            category,
            title: title.into(),
            body: String::new(),
            link: None,
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Inserts without checking preferences.
pub async fn insert(
    db: &DatabaseConnection,
    member_id: i32,
    notice: &Notice,
) -> AppResult<notification::Model> {
    let stamp = now();
    Ok(notification::ActiveModel {
        member_id: Set(member_id),
        category: Set(notice.category),
        title: Set(notice.title.clone()),
        body: Set(notice.body.clone()),
        link: Set(notice.link.clone()),
        is_read: Set(false),
        read_at: Set(None),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Notifies `member_id` when their preferences allow it.
pub async fn notify(
    db: &DatabaseConnection,
    member_id: i32,
    notice: Notice,
) -> AppResult<Option<notification::Model>> {
    let prefs = preferences::load(db, member_id).await?;
    if !prefs.wants_in_app(notice.category) {
        return Ok(None);
    }
    insert(db, member_id, &notice).await.map(Some)
}

pub async fn list_for(
    db: &DatabaseConnection,
    member_id: i32,
    filter: &NotificationFilter,
    params: PageParams,
) -> AppResult<Page<notification::Model>> {
    let mut select = notification::Entity::find()
        .filter(notification::Column::MemberId.eq(member_id))
        .order_by_desc(notification::Column::CreatedAt)
        .order_by_desc(notification::Column::Id);
    if filter.unread {
        select = select.filter(notification::Column::IsRead.eq(false));
    }
    Ok(fetch_page(select, db, params).await?)
}

pub async fn unread_count(db: &DatabaseConnection, member_id: i32) -> AppResult<u64> {
    Ok(notification::Entity::find()
        .filter(notification::Column::MemberId.eq(member_id))
        .filter(notification::Column::IsRead.eq(false))
        .count(db)
        .await?)
}

/// Someone else's notification is reported as missing.
pub async fn mark_read(
    db: &DatabaseConnection,
    member_id: i32,
    id: i32,
) -> AppResult<notification::Model> {
    let found = notification::Entity::find_by_id(id)
        .filter(notification::Column::MemberId.eq(member_id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound("notification"))?;
    if found.is_read {
        return Ok(found);
    }
    let stamp = now();
    let mut active: notification::ActiveModel = found.into();
    active.is_read = Set(true);
    active.read_at = Set(Some(stamp));
    active.updated_at = Set(stamp);
    Ok(active.update(db).await?)
}

pub async fn mark_all_read(db: &DatabaseConnection, member_id: i32) -> AppResult<u64> {
    let stamp = now();
    let result = notification::Entity::update_many()
        .col_expr(notification::Column::IsRead, Expr::value(true))
        .col_expr(notification::Column::ReadAt, Expr::value(stamp))
        .col_expr(notification::Column::UpdatedAt, Expr::value(stamp))
        .filter(notification::Column::MemberId.eq(member_id))
        .filter(notification::Column::IsRead.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::preferences::{Preferences, save};
    use crate::entities::sea_orm_active_enums::MembershipStatus;
    use crate::testing::{create_member, test_db};

    #[tokio::test]
    async fn notify_respects_opt_outs() {
        let db = test_db().await;
        let member = create_member(&db, "Tabitha", "Dorcas", MembershipStatus::Active).await;
        save(
            &db,
            member.id,
            Preferences {
                events: false,
                ..Preferences::default()
            },
        )
        .await
        .unwrap();

        let skipped = notify(&db, member.id, Notice::new(NotificationCategory::Events, "Picnic"))
            .await
            .unwrap();
        assert!(skipped.is_none());

        let kept = notify(
            &db,
            member.id,
            Notice::new(NotificationCategory::General, "Office closed").body("Monday"),
        )
        .await
        .unwrap();
        assert!(kept.is_some());
        assert_eq!(unread_count(&db, member.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reading_is_per_owner() {
        let db = test_db().await;
        let owner = create_member(&db, "Anna", "Prophetess", MembershipStatus::Active).await;
        let other = create_member(&db, "Simeon", "Elder", MembershipStatus::Active).await;
        let first = insert(&db, owner.id, &Notice::new(NotificationCategory::General, "One"))
            .await
            .unwrap();
        insert(&db, owner.id, &Notice::new(NotificationCategory::General, "Two"))
            .await
            .unwrap();

        assert!(matches!(
            mark_read(&db, other.id, first.id).await,
            Err(AppError::NotFound(_))
        ));
        let read = mark_read(&db, owner.id, first.id).await.unwrap();
        assert!(read.is_read);
        assert!(read.read_at.is_some());

        let unread = list_for(
            &db,
            owner.id,
            &NotificationFilter { unread: true },
            PageParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(unread.total, 1);

        assert_eq!(mark_all_read(&db, owner.id).await.unwrap(), 1);
        assert_eq!(unread_count(&db, owner.id).await.unwrap(), 0);
    }
}
