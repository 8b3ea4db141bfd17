//! Member directory. Rows are never deleted; `is_active` hides them.

pub mod families;
pub mod groups;

use chrono::NaiveDate;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
    sea_query::{Expr, Func},
};
use serde::Deserialize;
use tracing::info;

use crate::auth::Viewer;
use crate::core::{
    export::{opt, to_csv},
    now,
};
use crate::entities::{
    family, member,
    sea_orm_active_enums::{FamilyRole, MembershipStatus, Role},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{checkbox, choice, empty_as_none, trimmed};
use crate::util::pagination::{Page, PageParams, fetch_page};
use crate::util::validation::{
    check_email, check_length, check_not_future, normalize_email, require_text,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryFilter {
    #[serde(default, deserialize_with = "trimmed")]
    pub q: Option<String>,
    #[serde(default, deserialize_with = "choice")]
    pub status: Option<MembershipStatus>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub family_id: Option<i32>,
    #[serde(default, deserialize_with = "checkbox")]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "trimmed")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub family_id: Option<i32>,
    #[serde(default, deserialize_with = "choice")]
    pub family_role: Option<FamilyRole>,
    /// Only honoured on create; afterwards the onboarding pipeline owns it.
    #[serde(default, deserialize_with = "choice")]
    pub membership_status: Option<MembershipStatus>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub joined_on: Option<NaiveDate>,
    #[serde(default, deserialize_with = "trimmed")]
    pub notes: Option<String>,
}

/// Fields members may change on their own record.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactInput {
    #[serde(default, deserialize_with = "trimmed")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub address: Option<String>,
}

impl MemberInput {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "first_name", &self.first_name);
        check_length(&mut errors, "first_name", &self.first_name, 100);
        require_text(&mut errors, "last_name", &self.last_name);
        check_length(&mut errors, "last_name", &self.last_name, 100);
        check_email(&mut errors, "email", self.email.as_deref());
        check_not_future(&mut errors, "birth_date", self.birth_date);
        errors.into_result()
    }
}

/// Staff notes stay with staff.
pub(crate) fn redact(viewer: &Viewer, found: member::Model) -> member::Model {
    if viewer.role().can_manage_members() {
        found
    } else {
        without_notes(found)
    }
}

pub(crate) fn without_notes(mut found: member::Model) -> member::Model {
    found.notes = None;
    found
}

pub async fn list(
    db: &DatabaseConnection,
    viewer: &Viewer,
    filter: &DirectoryFilter,
    params: PageParams,
) -> AppResult<Page<member::Model>> {
    let mut select = member::Entity::find()
        .order_by_asc(member::Column::LastName)
        .order_by_asc(member::Column::FirstName)
        .order_by_asc(member::Column::Id);

    if !(filter.include_inactive && viewer.role().can_manage_members()) {
        select = select.filter(member::Column::IsActive.eq(true));
    }
    if let Some(status) = filter.status {
        select = select.filter(member::Column::MembershipStatus.eq(status));
    }
    if let Some(family_id) = filter.family_id {
        select = select.filter(member::Column::FamilyId.eq(family_id));
    }
    if let Some(q) = &filter.q {
        let pattern = format!("%{}%", q.to_lowercase());
        let lower = |col: member::Column| Expr::expr(Func::lower(Expr::col(col)));
        select = select.filter(
            Condition::any()
                .add(lower(member::Column::FirstName).like(pattern.clone()))
                .add(lower(member::Column::LastName).like(pattern.clone()))
                .add(lower(member::Column::Email).like(pattern)),
        );
    }

    let page = fetch_page(select, db, params).await?;
    Ok(page.map(|m| redact(viewer, m)))
}

pub(crate) async fn find(db: &DatabaseConnection, id: i32) -> AppResult<member::Model> {
    member::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("member"))
}

pub async fn get(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<member::Model> {
    let found = find(db, id).await?;
    if !found.is_active && !viewer.role().can_manage_members() && !viewer.is_self(id) {
        return Err(AppError::NotFound("member"));
    }
    Ok(redact(viewer, found))
}

async fn check_family(db: &DatabaseConnection, family_id: Option<i32>) -> AppResult<()> {
    if let Some(id) = family_id {
        family::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| FieldErrors::single("family_id", "does not exist"))?;
    }
    Ok(())
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: MemberInput,
) -> AppResult<member::Model> {
    viewer.require(Role::can_manage_members, "add members")?;
    input.validate()?;
    check_family(db, input.family_id).await?;

    let stamp = now();
    let created = member::ActiveModel {
        first_name: Set(input.first_name.trim().to_string()),
        last_name: Set(input.last_name.trim().to_string()),
        email: Set(normalize_email(input.email)),
        phone: Set(input.phone),
        birth_date: Set(input.birth_date),
        address: Set(input.address),
        family_id: Set(input.family_id),
        family_role: Set(input.family_role.unwrap_or(FamilyRole::Other)),
        membership_status: Set(input.membership_status.unwrap_or(MembershipStatus::Visitor)),
        joined_on: Set(input.joined_on),
        is_active: Set(true),
        notes: Set(input.notes),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(member_id = created.id, "member created");
    Ok(created)
}

pub async fn update(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: MemberInput,
) -> AppResult<member::Model> {
    viewer.require(Role::can_manage_members, "edit members")?;
    input.validate()?;
    check_family(db, input.family_id).await?;

    let mut active: member::ActiveModel = find(db, id).await?.into();
    active.first_name = Set(input.first_name.trim().to_string());
    active.last_name = Set(input.last_name.trim().to_string());
    active.email = Set(normalize_email(input.email));
    active.phone = Set(input.phone);
    active.birth_date = Set(input.birth_date);
    active.address = Set(input.address);
    active.family_id = Set(input.family_id);
    if let Some(role) = input.family_role {
        active.family_role = Set(role);
    }
    active.joined_on = Set(input.joined_on);
    active.notes = Set(input.notes);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

/// Members editing their own contact details, or staff doing it for them.
pub async fn update_contact(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: ContactInput,
) -> AppResult<member::Model> {
    viewer.require_self_or(id, Role::can_manage_members, "edit this member")?;
    let mut errors = FieldErrors::new();
    check_email(&mut errors, "email", input.email.as_deref());
    errors.into_result()?;

    let mut active: member::ActiveModel = find(db, id).await?.into();
    active.email = Set(normalize_email(input.email));
    active.phone = Set(input.phone);
    active.address = Set(input.address);
    active.updated_at = Set(now());
    Ok(redact(viewer, active.update(db).await?))
}

async fn set_active(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    is_active: bool,
) -> AppResult<member::Model> {
    viewer.require(Role::can_manage_members, "archive or restore members")?;
    let found = find(db, id).await?;
    if found.is_active == is_active {
        return Ok(found);
    }
    let mut active: member::ActiveModel = found.into();
    active.is_active = Set(is_active);
    active.updated_at = Set(now());
    let saved = active.update(db).await?;
    info!(member_id = id, is_active, "member archive state changed");
    Ok(saved)
}

pub async fn soft_delete(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
) -> AppResult<member::Model> {
    set_active(db, viewer, id, false).await
}

pub async fn restore(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
) -> AppResult<member::Model> {
    set_active(db, viewer, id, true).await
}

pub async fn export_csv(db: &DatabaseConnection, viewer: &Viewer) -> AppResult<Vec<u8>> {
    viewer.require(Role::can_manage_members, "export the directory")?;
    let members = member::Entity::find()
        .order_by_asc(member::Column::LastName)
        .order_by_asc(member::Column::FirstName)
        .all(db)
        .await?;
    to_csv(
        &[
            "id",
            "first_name",
            "last_name",
            "email",
            "phone",
            "address",
            "family_id",
            "membership_status",
            "joined_on",
            "is_active",
        ],
        members.into_iter().map(|m| {
            vec![
                m.id.to_string(),
                m.first_name,
                m.last_name,
                opt(&m.email),
                opt(&m.phone),
                opt(&m.address),
                opt(&m.family_id),
                m.membership_status.to_value(),
                opt(&m.joined_on),
                m.is_active.to_string(),
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_member, member_viewer, test_db};

    fn input(first: &str, last: &str) -> MemberInput {
        MemberInput {
            first_name: first.into(),
            last_name: last.into(),
            email: None,
            phone: None,
            birth_date: None,
            address: None,
            family_id: None,
            family_role: None,
            membership_status: None,
            joined_on: None,
            notes: Some("pastoral note".into()),
        }
    }

    #[tokio::test]
    async fn create_validates_and_defaults_to_visitor() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Paul", Role::Pastor).await;

        let mut bad = input(" ", "Smith");
        bad.email = Some("not-an-email".into());
        bad.birth_date = NaiveDate::from_ymd_opt(2999, 1, 1);
        let Err(AppError::Validation(fields)) = create(&db, &pastor, bad).await else {
            panic!("expected validation error");
        };
        assert!(fields.get("first_name").is_some());
        assert!(fields.get("email").is_some());
        assert!(fields.get("birth_date").is_some());

        let mut good = input("Priscilla", "Tentmaker");
        good.email = Some("Priscilla@Example.org".into());
        let created = create(&db, &pastor, good).await.unwrap();
        assert_eq!(created.membership_status, MembershipStatus::Visitor);
        assert_eq!(created.email.as_deref(), Some("priscilla@example.org"));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Paul", Role::Pastor).await;
        let mut first = input("Aquila", "Tentmaker");
        first.email = Some("shop@example.org".into());
        create(&db, &pastor, first.clone()).await.unwrap();
        assert!(matches!(
            create(&db, &pastor, first).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn members_cannot_manage_others() {
        let db = test_db().await;
        let member = member_viewer(&db, "Mary", Role::Member).await;
        let other = create_member(&db, "Martha", "Bethany", MembershipStatus::Active).await;

        assert!(matches!(
            create(&db, &member, input("X", "Y")).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            soft_delete(&db, &member, other.id).await,
            Err(AppError::Forbidden(_))
        ));
        let contact = ContactInput {
            email: None,
            phone: Some("555-0101".into()),
            address: None,
        };
        assert!(matches!(
            update_contact(&db, &member, other.id, contact.clone()).await,
            Err(AppError::Forbidden(_))
        ));

        let own_id = member.member_id().unwrap();
        let updated = update_contact(&db, &member, own_id, contact).await.unwrap();
        assert_eq!(updated.phone.as_deref(), Some("555-0101"));
    }

    #[tokio::test]
    async fn soft_delete_hides_from_directory_until_restored() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Paul", Role::Pastor).await;
        let member = member_viewer(&db, "Mary", Role::Member).await;
        let target = create_member(&db, "Judas", "Iscariot", MembershipStatus::Active).await;

        soft_delete(&db, &pastor, target.id).await.unwrap();
        let visible = list(&db, &member, &DirectoryFilter::default(), PageParams::default())
            .await
            .unwrap();
        assert!(visible.items.iter().all(|m| m.id != target.id));
        assert!(matches!(
            get(&db, &member, target.id).await,
            Err(AppError::NotFound(_))
        ));

        // Non-staff asking for inactive rows still only get active ones.
        let sneaky = DirectoryFilter {
            include_inactive: true,
            ..DirectoryFilter::default()
        };
        let visible = list(&db, &member, &sneaky, PageParams::default()).await.unwrap();
        assert!(visible.items.iter().all(|m| m.is_active));

        let all = list(&db, &pastor, &sneaky, PageParams::default()).await.unwrap();
        assert!(all.items.iter().any(|m| m.id == target.id));

        restore(&db, &pastor, target.id).await.unwrap();
        assert!(get(&db, &member, target.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn search_matches_names_and_email_case_insensitively() {
        let db = test_db().await;
        let viewer = member_viewer(&db, "Mary", Role::Member).await;
        create_member(&db, "Bartholomew", "Nathanael", MembershipStatus::Active).await;
        create_member(&db, "Thomas", "Didymus", MembershipStatus::Visitor).await;

        let by_name = DirectoryFilter {
            q: Some("BARTH".into()),
            ..DirectoryFilter::default()
        };
        let found = list(&db, &viewer, &by_name, PageParams::default()).await.unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].first_name, "Bartholomew");
        assert!(found.items[0].notes.is_none());

        let visitors = DirectoryFilter {
            status: Some(MembershipStatus::Visitor),
            ..DirectoryFilter::default()
        };
        let found = list(&db, &viewer, &visitors, PageParams::default()).await.unwrap();
        assert_eq!(found.total, 1);
    }

    #[tokio::test]
    async fn export_has_header_row() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Paul", Role::Pastor).await;
        let bytes = export_csv(&db, &pastor).await.unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("id,first_name,last_name,email"));
        assert!(lines.next().unwrap().contains("paul.tester@example.org"));
    }
}
