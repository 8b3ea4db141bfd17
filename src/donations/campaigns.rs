use std::collections::HashSet;

use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

use crate::auth::Viewer;
use crate::core::now;
use crate::entities::{campaign, donation, sea_orm_active_enums::Role};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{checkbox, empty_as_none, money, trimmed};
use crate::util::validation::require_text;

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignInput {
    pub name: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub description: Option<String>,
    #[serde(deserialize_with = "money")]
    pub goal: i64,
    pub starts_on: NaiveDate,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub ends_on: Option<NaiveDate>,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub campaign: campaign::Model,
    pub raised_cents: i64,
    pub goal_cents: i64,
    /// Whole percent of the goal, may exceed 100.
    pub percent: i64,
    pub donor_count: usize,
}

impl Progress {
    fn from_donations(campaign: campaign::Model, donations: &[donation::Model]) -> Self {
        let raised_cents: i64 = donations.iter().map(|d| d.amount_cents).sum();
        let donor_count = donations
            .iter()
            .filter_map(|d| d.member_id)
            .collect::<HashSet<_>>()
            .len();
        let percent = if campaign.goal_cents > 0 {
            raised_cents * 100 / campaign.goal_cents
        } else {
            0
        };
        Self {
            goal_cents: campaign.goal_cents,
            campaign,
            raised_cents,
            percent,
            donor_count,
        }
    }
}

fn validate(input: &CampaignInput) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", &input.name);
    if input.goal <= 0 {
        errors.add("goal", "must be greater than zero");
    }
    if let Some(ends_on) = input.ends_on {
        if ends_on <= input.starts_on {
            errors.add("ends_on", "must be after the start date");
        }
    }
    errors.into_result()
}

async fn find(db: &DatabaseConnection, id: i32) -> AppResult<campaign::Model> {
    campaign::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("campaign"))
}

pub async fn list(db: &DatabaseConnection, active_only: bool) -> AppResult<Vec<campaign::Model>> {
    let mut select = campaign::Entity::find().order_by_desc(campaign::Column::StartsOn);
    if active_only {
        select = select.filter(campaign::Column::IsActive.eq(true));
    }
    Ok(select.all(db).await?)
}

pub async fn progress(db: &DatabaseConnection, id: i32) -> AppResult<Progress> {
    let campaign = find(db, id).await?;
    let donations = donation::Entity::find()
        .filter(donation::Column::CampaignId.eq(id))
        .all(db)
        .await?;
    Ok(Progress::from_donations(campaign, &donations))
}

/// Progress for every active campaign.
pub async fn active_progress(db: &DatabaseConnection) -> AppResult<Vec<Progress>> {
    let campaigns = list(db, true).await?;
    let ids: Vec<i32> = campaigns.iter().map(|c| c.id).collect();
    let donations = donation::Entity::find()
        .filter(donation::Column::CampaignId.is_in(ids))
        .all(db)
        .await?;
    Ok(campaigns
        .into_iter()
        .map(|c| {
            let mine: Vec<donation::Model> = donations
                .iter()
                .filter(|d| d.campaign_id == Some(c.id))
                .cloned()
                .collect();
            Progress::from_donations(c, &mine)
        })
        .collect())
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: CampaignInput,
) -> AppResult<campaign::Model> {
    viewer.require(Role::can_manage_donations, "manage campaigns")?;
    validate(&input)?;
    let stamp = now();
    Ok(campaign::ActiveModel {
        name: Set(input.name.trim().to_string()),
        description: Set(input.description),
        goal_cents: Set(input.goal),
        starts_on: Set(input.starts_on),
        ends_on: Set(input.ends_on),
        is_active: Set(input.is_active),
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
    input: CampaignInput,
) -> AppResult<campaign::Model> {
    viewer.require(Role::can_manage_donations, "manage campaigns")?;
    validate(&input)?;
    let mut active: campaign::ActiveModel = find(db, id).await?.into();
    active.name = Set(input.name.trim().to_string());
    active.description = Set(input.description);
    active.goal_cents = Set(input.goal);
    active.starts_on = Set(input.starts_on);
    active.ends_on = Set(input.ends_on);
    active.is_active = Set(input.is_active);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donations::{DonationInput, record};
    use crate::entities::sea_orm_active_enums::{DonationMethod, MembershipStatus};
    use crate::testing::{create_member, member_viewer, test_db};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn roof_fund() -> CampaignInput {
        CampaignInput {
            name: "Roof fund".into(),
            description: None,
            goal: 100_000,
            starts_on: day(2024, 1, 1),
            ends_on: Some(day(2024, 12, 31)),
            is_active: true,
        }
    }

    fn gift(member_id: i32, campaign_id: i32, amount: i64) -> DonationInput {
        DonationInput {
            member_id: Some(member_id),
            campaign_id: Some(campaign_id),
            amount,
            donated_on: day(2024, 6, 1),
            method: DonationMethod::Card,
            reference: None,
            is_tax_deductible: true,
            notes: None,
        }
    }

    #[tokio::test]
    async fn end_must_follow_start() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        let mut backwards = roof_fund();
        backwards.ends_on = Some(day(2023, 1, 1));
        let Err(AppError::Validation(fields)) = create(&db, &treasurer, backwards).await else {
            panic!("expected validation error");
        };
        assert!(fields.get("ends_on").is_some());
    }

    #[tokio::test]
    async fn progress_sums_gifts_and_counts_donors() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        let campaign = create(&db, &treasurer, roof_fund()).await.unwrap();
        let a = create_member(&db, "Barnabas", "Cyprus", MembershipStatus::Active).await;
        let b = create_member(&db, "Mnason", "Cyprus", MembershipStatus::Active).await;
        record(&db, &treasurer, gift(a.id, campaign.id, 30_000)).await.unwrap();
        record(&db, &treasurer, gift(a.id, campaign.id, 10_000)).await.unwrap();
        record(&db, &treasurer, gift(b.id, campaign.id, 15_000)).await.unwrap();

        let progress = progress(&db, campaign.id).await.unwrap();
        assert_eq!(progress.raised_cents, 55_000);
        assert_eq!(progress.percent, 55);
        assert_eq!(progress.donor_count, 2);
        assert_eq!(active_progress(&db).await.unwrap()[0].raised_cents, 55_000);
    }

    #[tokio::test]
    async fn closed_campaigns_refuse_new_gifts() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        let mut closed = roof_fund();
        closed.is_active = false;
        let campaign = create(&db, &treasurer, closed).await.unwrap();
        let giver = create_member(&db, "Barnabas", "Cyprus", MembershipStatus::Active).await;

        let result = record(&db, &treasurer, gift(giver.id, campaign.id, 100)).await;
        assert!(matches!(result, Err(AppError::Validation(ref f)) if f.get("campaign_id").is_some()));
    }
}
