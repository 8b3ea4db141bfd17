//! Giving records, campaigns and annual tax receipts.

pub mod campaigns;
pub mod receipts;

use chrono::{Datelike, NaiveDate};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set,
    sea_query::{Alias, Expr},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Viewer;
use crate::core::{
    export::{format_cents, opt, to_csv},
    now,
};
use crate::entities::{
    campaign, donation, member,
    sea_orm_active_enums::{DonationMethod, Role},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{checkbox, choice, empty_as_none, money, trimmed};
use crate::util::pagination::{Page, PageParams, fetch_page};

#[derive(Debug, Clone, Deserialize)]
pub struct DonationInput {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub member_id: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub campaign_id: Option<i32>,
    #[serde(deserialize_with = "money")]
    pub amount: i64,
    pub donated_on: NaiveDate,
    pub method: DonationMethod,
    #[serde(default, deserialize_with = "trimmed")]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_tax_deductible: bool,
    #[serde(default, deserialize_with = "trimmed")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonationFilter {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub member_id: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub campaign_id: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "choice")]
    pub method: Option<DonationMethod>,
}

/// A page of donations plus the sum over every matching row.
#[derive(Debug, Serialize)]
pub struct DonationList {
    #[serde(flatten)]
    pub page: Page<donation::Model>,
    pub total_cents: i64,
}

/// First and last day of a calendar year.
pub fn year_bounds(year: i32) -> AppResult<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year, 12, 31);
    start
        .zip(end)
        .ok_or_else(|| FieldErrors::single("year", "is out of range"))
}

impl DonationFilter {
    fn apply(&self, mut select: Select<donation::Entity>) -> AppResult<Select<donation::Entity>> {
        if let Some(member_id) = self.member_id {
            select = select.filter(donation::Column::MemberId.eq(member_id));
        }
        if let Some(campaign_id) = self.campaign_id {
            select = select.filter(donation::Column::CampaignId.eq(campaign_id));
        }
        if let Some(year) = self.year {
            let (start, end) = year_bounds(year)?;
            select = select.filter(donation::Column::DonatedOn.between(start, end));
        }
        if let Some(method) = self.method {
            select = select.filter(donation::Column::Method.eq(method));
        }
        Ok(select)
    }
}

async fn validate(db: &DatabaseConnection, input: &DonationInput) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    if input.amount <= 0 {
        errors.add("amount", "must be greater than zero");
    }
    if input.donated_on > now().date() {
        errors.add("donated_on", "cannot be in the future");
    }
    if let Some(member_id) = input.member_id {
        if member::Entity::find_by_id(member_id).one(db).await?.is_none() {
            errors.add("member_id", "does not exist");
        }
    }
    if let Some(campaign_id) = input.campaign_id {
        match campaign::Entity::find_by_id(campaign_id).one(db).await? {
            None => errors.add("campaign_id", "does not exist"),
            Some(c) if !c.is_active => errors.add("campaign_id", "is not accepting donations"),
            Some(_) => {}
        }
    }
    errors.into_result()
}

pub async fn list(
    db: &DatabaseConnection,
    viewer: &Viewer,
    filter: &DonationFilter,
    params: PageParams,
) -> AppResult<DonationList> {
    viewer.require(Role::can_view_donations, "view donations")?;
    let base = filter.apply(donation::Entity::find())?;
    // Postgres widens SUM(bigint) to numeric.
    let total_cents = base
        .clone()
        .select_only()
        .column_as(
            Expr::col(donation::Column::AmountCents)
                .sum()
                .cast_as(Alias::new("BIGINT")),
            "total",
        )
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?
        .flatten()
        .unwrap_or(0);
    let select = base
        .order_by_desc(donation::Column::DonatedOn)
        .order_by_desc(donation::Column::Id);
    Ok(DonationList {
        page: fetch_page(select, db, params).await?,
        total_cents,
    })
}

/// A member's giving history, visible to themselves and to finance staff.
pub async fn for_member(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
    year: Option<i32>,
) -> AppResult<Vec<donation::Model>> {
    viewer.require_self_or(member_id, Role::can_view_donations, "view these donations")?;
    let filter = DonationFilter {
        member_id: Some(member_id),
        year,
        ..DonationFilter::default()
    };
    Ok(filter
        .apply(donation::Entity::find())?
        .order_by_desc(donation::Column::DonatedOn)
        .all(db)
        .await?)
}

async fn find(db: &DatabaseConnection, id: i32) -> AppResult<donation::Model> {
    donation::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("donation"))
}

pub async fn get(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<donation::Model> {
    let found = find(db, id).await?;
    match found.member_id {
        Some(member_id) => {
            viewer.require_self_or(member_id, Role::can_view_donations, "view this donation")?
        }
        None => viewer.require(Role::can_view_donations, "view this donation")?,
    }
    Ok(found)
}

pub async fn record(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: DonationInput,
) -> AppResult<donation::Model> {
    viewer.require(Role::can_manage_donations, "record donations")?;
    validate(db, &input).await?;
    let stamp = now();
    let created = donation::ActiveModel {
        member_id: Set(input.member_id),
        campaign_id: Set(input.campaign_id),
        amount_cents: Set(input.amount),
        donated_on: Set(input.donated_on),
        method: Set(input.method),
        reference: Set(input.reference),
        is_tax_deductible: Set(input.is_tax_deductible),
        notes: Set(input.notes),
        recorded_by: Set(Some(viewer.user.id)),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(donation_id = created.id, amount_cents = created.amount_cents, "donation recorded");
    Ok(created)
}

pub async fn update(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: DonationInput,
) -> AppResult<donation::Model> {
    viewer.require(Role::can_manage_donations, "edit donations")?;
    let found = find(db, id).await?;
    // Only a changed campaign is re-checked; a gift may stay on a closed one.
    let mut checked = input.clone();
    if found.campaign_id == input.campaign_id {
        checked.campaign_id = None;
    }
    validate(db, &checked).await?;

    let mut active: donation::ActiveModel = found.into();
    active.member_id = Set(input.member_id);
    active.campaign_id = Set(input.campaign_id);
    active.amount_cents = Set(input.amount);
    active.donated_on = Set(input.donated_on);
    active.method = Set(input.method);
    active.reference = Set(input.reference);
    active.is_tax_deductible = Set(input.is_tax_deductible);
    active.notes = Set(input.notes);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn delete(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<()> {
    viewer.require(Role::can_manage_donations, "delete donations")?;
    let found = find(db, id).await?;
    found.delete(db).await?;
    info!(donation_id = id, "donation deleted");
    Ok(())
}

pub async fn export_csv(
    db: &DatabaseConnection,
    viewer: &Viewer,
    filter: &DonationFilter,
) -> AppResult<Vec<u8>> {
    viewer.require(Role::can_view_donations, "export donations")?;
    let rows = filter
        .apply(donation::Entity::find())?
        .order_by_asc(donation::Column::DonatedOn)
        .order_by_asc(donation::Column::Id)
        .find_also_related(member::Entity)
        .all(db)
        .await?;
    to_csv(
        &[
            "id",
            "donated_on",
            "member_id",
            "member_name",
            "campaign_id",
            "amount",
            "method",
            "reference",
            "tax_deductible",
        ],
        rows.into_iter().map(|(d, m)| {
            vec![
                d.id.to_string(),
                d.donated_on.to_string(),
                opt(&d.member_id),
                m.map(|m| m.full_name()).unwrap_or_default(),
                opt(&d.campaign_id),
                format_cents(d.amount_cents),
                d.method.to_value(),
                opt(&d.reference),
                d.is_tax_deductible.to_string(),
            ]
        }),
    )
}

/// Export file stem, e.g. `donations-2024`.
pub fn export_stem(filter: &DonationFilter) -> String {
    match filter.year {
        Some(year) => format!("donations-{year}"),
        None => "donations".to_string(),
    }
}

/// Current calendar year, the default for receipts and filters.
pub fn current_year() -> i32 {
    now().date().year()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::MembershipStatus;
    use crate::testing::{create_member, member_viewer, test_db};

    fn gift(member_id: Option<i32>, amount: i64, on: NaiveDate) -> DonationInput {
        DonationInput {
            member_id,
            campaign_id: None,
            amount,
            donated_on: on,
            method: DonationMethod::Check,
            reference: Some("#1001".into()),
            is_tax_deductible: true,
            notes: None,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn amount_must_be_positive_and_date_not_future() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        let mut bad = gift(None, 0, day(2999, 1, 1));
        bad.member_id = Some(9999);
        let Err(AppError::Validation(fields)) = record(&db, &treasurer, bad).await else {
            panic!("expected validation error");
        };
        assert!(fields.get("amount").is_some());
        assert!(fields.get("donated_on").is_some());
        assert!(fields.get("member_id").is_some());
    }

    #[tokio::test]
    async fn pastors_see_but_do_not_record() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Peter", Role::Pastor).await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        assert!(matches!(
            record(&db, &pastor, gift(None, 500, day(2024, 5, 1))).await,
            Err(AppError::Forbidden(_))
        ));
        record(&db, &treasurer, gift(None, 500, day(2024, 5, 1)))
            .await
            .unwrap();
        let listed = list(&db, &pastor, &DonationFilter::default(), PageParams::default())
            .await
            .unwrap();
        assert_eq!(listed.page.total, 1);
        assert_eq!(listed.total_cents, 500);
    }

    #[tokio::test]
    async fn members_see_only_their_own_giving() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        let giver = member_viewer(&db, "Zacchaeus", Role::Member).await;
        let other = create_member(&db, "Levi", "Alphaeus", MembershipStatus::Active).await;
        let own_id = giver.member_id().unwrap();

        let mine = record(&db, &treasurer, gift(Some(own_id), 1000, day(2024, 2, 1)))
            .await
            .unwrap();
        let theirs = record(&db, &treasurer, gift(Some(other.id), 2000, day(2024, 2, 1)))
            .await
            .unwrap();

        assert_eq!(for_member(&db, &giver, own_id, None).await.unwrap().len(), 1);
        assert!(get(&db, &giver, mine.id).await.is_ok());
        assert!(matches!(
            get(&db, &giver, theirs.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            for_member(&db, &giver, other.id, None).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn filters_by_year_and_method_and_exports() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        let giver = create_member(&db, "Joanna", "Chuza", MembershipStatus::Active).await;
        record(&db, &treasurer, gift(Some(giver.id), 1000, day(2023, 12, 31)))
            .await
            .unwrap();
        let mut cash = gift(Some(giver.id), 2550, day(2024, 1, 1));
        cash.method = DonationMethod::Cash;
        record(&db, &treasurer, cash).await.unwrap();

        let filter = DonationFilter {
            year: Some(2024),
            ..DonationFilter::default()
        };
        let listed = list(&db, &treasurer, &filter, PageParams::default())
            .await
            .unwrap();
        assert_eq!(listed.page.total, 1);
        assert_eq!(listed.total_cents, 2550);

        let checks = DonationFilter {
            method: Some(DonationMethod::Check),
            ..DonationFilter::default()
        };
        let listed = list(&db, &treasurer, &checks, PageParams::default())
            .await
            .unwrap();
        assert_eq!(listed.page.items[0].amount_cents, 1000);

        let quiet_year = DonationFilter {
            year: Some(2020),
            ..DonationFilter::default()
        };
        let listed = list(&db, &treasurer, &quiet_year, PageParams::default())
            .await
            .unwrap();
        assert_eq!(listed.total_cents, 0);

        let text = String::from_utf8(export_csv(&db, &treasurer, &filter).await.unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("Joanna Chuza"));
        assert!(lines[1].contains("25.50"));
        assert!(lines[1].contains("cash"));
        assert_eq!(export_stem(&filter), "donations-2024");
    }

    #[tokio::test]
    async fn update_and_delete() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        let created = record(&db, &treasurer, gift(None, 100, day(2024, 3, 3)))
            .await
            .unwrap();
        let updated = update(&db, &treasurer, created.id, gift(None, 300, day(2024, 3, 4)))
            .await
            .unwrap();
        assert_eq!(updated.amount_cents, 300);
        delete(&db, &treasurer, created.id).await.unwrap();
        assert!(matches!(
            get(&db, &treasurer, created.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
