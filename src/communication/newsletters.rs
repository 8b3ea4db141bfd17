use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, sea_query::Expr,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::mailer::{Mail, Mailer};
use super::notifications::{self, Notice};
use super::preferences;
use crate::auth::Viewer;
use crate::core::now;
use crate::entities::{
    member, newsletter,
    sea_orm_active_enums::{MembershipStatus, NewsletterStatus, NotificationCategory, Role},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::pagination::{Page, PageParams, fetch_page};
use crate::util::validation::{check_length, require_text};

#[derive(Debug, Clone, Deserialize)]
pub struct NewsletterInput {
    pub subject: String,
    pub body: String,
}

impl NewsletterInput {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "subject", &self.subject);
        check_length(&mut errors, "subject", &self.subject, 200);
        require_text(&mut errors, "body", &self.body);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInput {
    #[serde(deserialize_with = "crate::util::form::datetime")]
    pub scheduled_for: NaiveDateTime,
}

pub async fn list(
    db: &DatabaseConnection,
    viewer: &Viewer,
    params: PageParams,
) -> AppResult<Page<newsletter::Model>> {
    viewer.require(Role::can_send_communications, "manage newsletters")?;
    let select = newsletter::Entity::find()
        .order_by_desc(newsletter::Column::CreatedAt)
        .order_by_desc(newsletter::Column::Id);
    Ok(fetch_page(select, db, params).await?)
}

pub async fn get(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<newsletter::Model> {
    viewer.require(Role::can_send_communications, "manage newsletters")?;
    find(db, id).await
}

async fn find(db: &DatabaseConnection, id: i32) -> AppResult<newsletter::Model> {
    newsletter::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("newsletter"))
}

/// Sent newsletters are a record of what went out.
fn ensure_editable(found: &newsletter::Model) -> AppResult<()> {
    if found.status == NewsletterStatus::Sent {
        return Err(AppError::conflict("a sent newsletter cannot be changed"));
    }
    Ok(())
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: NewsletterInput,
) -> AppResult<newsletter::Model> {
    viewer.require(Role::can_send_communications, "manage newsletters")?;
    input.validate()?;
    let stamp = now();
    Ok(newsletter::ActiveModel {
        subject: Set(input.subject.trim().to_string()),
        body: Set(input.body),
        status: Set(NewsletterStatus::Draft),
        scheduled_for: Set(None),
        sent_at: Set(None),
        recipient_count: Set(0),
        created_by: Set(Some(viewer.user.id)),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn update(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: NewsletterInput,
) -> AppResult<newsletter::Model> {
    viewer.require(Role::can_send_communications, "manage newsletters")?;
    input.validate()?;
    let found = find(db, id).await?;
    ensure_editable(&found)?;
    let mut active: newsletter::ActiveModel = found.into();
    active.subject = Set(input.subject.trim().to_string());
    active.body = Set(input.body);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn delete(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<()> {
    viewer.require(Role::can_send_communications, "manage newsletters")?;
    let found = find(db, id).await?;
    ensure_editable(&found)?;
    found.delete(db).await?;
    Ok(())
}

pub async fn schedule(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: ScheduleInput,
) -> AppResult<newsletter::Model> {
    viewer.require(Role::can_send_communications, "manage newsletters")?;
    let found = find(db, id).await?;
    ensure_editable(&found)?;
    if input.scheduled_for <= now() {
        return Err(FieldErrors::single("scheduled_for", "must be in the future"));
    }
    let mut active: newsletter::ActiveModel = found.into();
    active.status = Set(NewsletterStatus::Scheduled);
    active.scheduled_for = Set(Some(input.scheduled_for));
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn unschedule(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
) -> AppResult<newsletter::Model> {
    viewer.require(Role::can_send_communications, "manage newsletters")?;
    let found = find(db, id).await?;
    if found.status != NewsletterStatus::Scheduled {
        return Err(AppError::transition(found.status, NewsletterStatus::Draft));
    }
    let mut active: newsletter::ActiveModel = found.into();
    active.status = Set(NewsletterStatus::Draft);
    active.scheduled_for = Set(None);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn send_now(
    db: &DatabaseConnection,
    mailer: &Mailer,
    viewer: &Viewer,
    id: i32,
) -> AppResult<newsletter::Model> {
    viewer.require(Role::can_send_communications, "send newsletters")?;
    let found = find(db, id).await?;
    ensure_editable(&found)?;
    deliver(db, mailer, found)
        .await?
        .ok_or_else(|| AppError::conflict("this newsletter has already been sent"))
}

/// Members who currently receive church-wide mailings.
async fn audience(db: &DatabaseConnection) -> AppResult<Vec<member::Model>> {
    Ok(member::Entity::find()
        .filter(member::Column::IsActive.eq(true))
        .filter(member::Column::MembershipStatus.ne(MembershipStatus::Inactive))
        .order_by_asc(member::Column::Id)
        .all(db)
        .await?)
}

/// Sends `letter` unless another sender already claimed it, in which case
/// nothing goes out and `None` comes back.
async fn deliver(
    db: &DatabaseConnection,
    mailer: &Mailer,
    letter: newsletter::Model,
) -> AppResult<Option<newsletter::Model>> {
    let stamp = now();
    let claimed = newsletter::Entity::update_many()
        .col_expr(newsletter::Column::Status, Expr::value(NewsletterStatus::Sent))
        .col_expr(newsletter::Column::SentAt, Expr::value(stamp))
        .col_expr(newsletter::Column::UpdatedAt, Expr::value(stamp))
        .filter(newsletter::Column::Id.eq(letter.id))
        .filter(newsletter::Column::Status.ne(NewsletterStatus::Sent))
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Ok(None);
    }

    let members = audience(db).await?;
    let ids: Vec<i32> = members.iter().map(|m| m.id).collect();
    let prefs = preferences::load_many(db, &ids).await?;
    let category = NotificationCategory::Newsletters;
    let notice = Notice::new(category, letter.subject.clone())
        .body(letter.body.clone())
        .link(format!("/communication/newsletters/{}", letter.id));

    let mut recipients = 0;
    for member in &members {
        let prefs = prefs.get(&member.id).copied().unwrap_or_default();
        if !prefs.accepts(category) {
            continue;
        }
        let mut reached = false;
        if prefs.in_app_enabled {
            notifications::insert(db, member.id, &notice).await?;
            reached = true;
        }
        if prefs.email_enabled {
            if let Some(to) = &member.email {
                let mail = Mail {
                    to: to.clone(),
                    subject: letter.subject.clone(),
                    body: letter.body.clone(),
                };
                match mailer.send(mail).await {
                    Ok(()) => reached = true,
                    Err(error) => warn!(member_id = member.id, %error, "newsletter mail failed"),
                }
            }
        }
        if reached {
            recipients += 1;
        }
    }

    let mut active: newsletter::ActiveModel = letter.into();
    active.status = Set(NewsletterStatus::Sent);
    active.sent_at = Set(Some(stamp));
    active.updated_at = Set(stamp);
    active.recipient_count = Set(recipients);
    let letter = active.update(db).await?;
    info!(newsletter_id = letter.id, recipients, "newsletter sent");
    Ok(Some(letter))
}

/// Sends every scheduled newsletter whose time has come.
pub async fn send_due(
    db: &DatabaseConnection,
    mailer: &Mailer,
    at: NaiveDateTime,
) -> AppResult<usize> {
    let due = newsletter::Entity::find()
        .filter(newsletter::Column::Status.eq(NewsletterStatus::Scheduled))
        .filter(newsletter::Column::ScheduledFor.lte(at))
        .all(db)
        .await?;
    let mut count = 0;
    for letter in due {
        if deliver(db, mailer, letter).await?.is_some() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::preferences::{Preferences, save};
    use crate::testing::{create_member, member_viewer, test_db};
    use chrono::Duration;

    fn input(subject: &str) -> NewsletterInput {
        NewsletterInput {
            subject: subject.into(),
            body: "News from the parish".into(),
        }
    }

    #[tokio::test]
    async fn only_communicators_write_newsletters() {
        let db = test_db().await;
        let member = member_viewer(&db, "Mark", Role::Member).await;
        assert!(matches!(
            create(&db, &member, input("Hi")).await,
            Err(AppError::Forbidden(_))
        ));

        let pastor = member_viewer(&db, "Peter", Role::Pastor).await;
        let blank = create(&db, &pastor, input(" ")).await;
        assert!(matches!(blank, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn send_reaches_opted_in_members_and_freezes_the_letter() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Peter", Role::Pastor).await;
        let reader = create_member(&db, "Lois", "Reader", MembershipStatus::Active).await;
        let quiet = create_member(&db, "Eunice", "Quiet", MembershipStatus::Active).await;
        let gone = create_member(&db, "Demas", "Gone", MembershipStatus::Inactive).await;
        save(
            &db,
            quiet.id,
            Preferences {
                newsletters: false,
                ..Preferences::default()
            },
        )
        .await
        .unwrap();

        let letter = create(&db, &pastor, input("Advent")).await.unwrap();
        let (mailer, outbox) = Mailer::capture();
        let sent = send_now(&db, &mailer, &pastor, letter.id).await.unwrap();

        assert_eq!(sent.status, NewsletterStatus::Sent);
        assert!(sent.sent_at.is_some());
        // The pastor's own member record and Lois.
        assert_eq!(sent.recipient_count, 2);
        let to: Vec<String> = outbox.lock().unwrap().iter().map(|m| m.to.clone()).collect();
        assert!(to.contains(&reader.email.clone().unwrap()));
        assert!(!to.contains(&quiet.email.clone().unwrap()));
        assert!(!to.contains(&gone.email.clone().unwrap()));

        assert!(matches!(
            update(&db, &pastor, letter.id, input("Edited")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            send_now(&db, &mailer, &pastor, letter.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn scheduled_letters_go_out_when_due() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Peter", Role::Pastor).await;
        let letter = create(&db, &pastor, input("Lent")).await.unwrap();

        let past = schedule(
            &db,
            &pastor,
            letter.id,
            ScheduleInput {
                scheduled_for: now() - Duration::hours(1),
            },
        )
        .await;
        assert!(matches!(past, Err(AppError::Validation(_))));

        let when = now() + Duration::hours(2);
        let scheduled = schedule(&db, &pastor, letter.id, ScheduleInput { scheduled_for: when })
            .await
            .unwrap();
        assert_eq!(scheduled.status, NewsletterStatus::Scheduled);

        let (mailer, _outbox) = Mailer::capture();
        assert_eq!(send_due(&db, &mailer, now()).await.unwrap(), 0);
        assert_eq!(
            send_due(&db, &mailer, when + Duration::minutes(1)).await.unwrap(),
            1
        );
        assert_eq!(
            send_due(&db, &mailer, when + Duration::minutes(2)).await.unwrap(),
            0
        );
        assert_eq!(get(&db, &pastor, letter.id).await.unwrap().status, NewsletterStatus::Sent);
    }

    #[tokio::test]
    async fn racing_senders_deliver_once() {
        use crate::entities::notification;
        use sea_orm::PaginatorTrait;

        let db = test_db().await;
        let pastor = member_viewer(&db, "Peter", Role::Pastor).await;
        create_member(&db, "Lois", "Reader", MembershipStatus::Active).await;
        let letter = create(&db, &pastor, input("Harvest")).await.unwrap();
        let when = now() + Duration::hours(1);
        schedule(&db, &pastor, letter.id, ScheduleInput { scheduled_for: when })
            .await
            .unwrap();

        let (mailer, outbox) = Mailer::capture();
        let (manual, due) = tokio::join!(
            send_now(&db, &mailer, &pastor, letter.id),
            send_due(&db, &mailer, when + Duration::minutes(1)),
        );
        let due = due.unwrap();
        assert_eq!(usize::from(manual.is_ok()) + due, 1);
        if let Err(error) = manual {
            assert!(matches!(error, AppError::Conflict(_)));
        }

        assert_eq!(outbox.lock().unwrap().len(), 2);
        assert_eq!(notification::Entity::find().count(&db).await.unwrap(), 2);
        let sent = get(&db, &pastor, letter.id).await.unwrap();
        assert_eq!(sent.recipient_count, 2);
    }

    #[tokio::test]
    async fn unschedule_returns_to_draft() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Peter", Role::Pastor).await;
        let letter = create(&db, &pastor, input("Pentecost")).await.unwrap();
        assert!(matches!(
            unschedule(&db, &pastor, letter.id).await,
            Err(AppError::InvalidTransition { .. })
        ));
        schedule(
            &db,
            &pastor,
            letter.id,
            ScheduleInput {
                scheduled_for: now() + Duration::days(1),
            },
        )
        .await
        .unwrap();
        let draft = unschedule(&db, &pastor, letter.id).await.unwrap();
        assert_eq!(draft.status, NewsletterStatus::Draft);
        assert!(draft.scheduled_for.is_none());
        delete(&db, &pastor, letter.id).await.unwrap();
    }
}
