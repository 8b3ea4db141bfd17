//! Online giving through an external card processor.
//!
//! The processor calls back with signed events; a successful payment turns
//! into an `online` donation exactly once.

use chrono::{Duration, NaiveDateTime};
use hmac::{Hmac, Mac};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use crate::auth::Viewer;
use crate::core::now;
use crate::entities::{
    campaign, donation, payment,
    sea_orm_active_enums::{DonationMethod, PaymentStatus},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{empty_as_none, money};

pub const SIGNATURE_HEADER: &str = "x-signature";
/// Pending intents older than this are abandoned checkouts.
pub const PENDING_TTL_HOURS: i64 = 24;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct IntentInput {
    #[serde(deserialize_with = "money")]
    pub amount: i64,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub campaign_id: Option<i32>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    AlreadyApplied,
    Ignored,
}

pub async fn create_intent(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: IntentInput,
) -> AppResult<payment::Model> {
    let mut errors = FieldErrors::new();
    if input.amount <= 0 {
        errors.add("amount", "must be greater than zero");
    }
    if let Some(campaign_id) = input.campaign_id {
        match campaign::Entity::find_by_id(campaign_id).one(db).await? {
            Some(c) if c.is_active => {}
            Some(_) => errors.add("campaign_id", "is not accepting donations"),
            None => errors.add("campaign_id", "does not exist"),
        }
    }
    let currency = input
        .currency
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "usd".to_string());
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        errors.add("currency", "must be a three-letter code");
    }
    errors.into_result()?;

    let stamp = now();
    let created = payment::ActiveModel {
        member_id: Set(viewer.member.as_ref().map(|m| m.id)),
        campaign_id: Set(input.campaign_id),
        amount_cents: Set(input.amount),
        currency: Set(currency),
        provider_ref: Set(format!("pay_{}", uuid::Uuid::new_v4().simple())),
        status: Set(PaymentStatus::Pending),
        donation_id: Set(None),
        failure_reason: Set(None),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(payment_id = created.id, reference = %created.provider_ref, "payment intent created");
    Ok(created)
}

/// The viewer's own payments, newest first.
pub async fn for_viewer(db: &DatabaseConnection, viewer: &Viewer) -> AppResult<Vec<payment::Model>> {
    let member_id = viewer.member_id()?;
    Ok(payment::Entity::find()
        .filter(payment::Column::MemberId.eq(member_id))
        .order_by_desc(payment::Column::CreatedAt)
        .all(db)
        .await?)
}

pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Checks `sha256=<hex>` against the raw request body in constant time.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> AppResult<()> {
    let provided = header
        .and_then(|h| h.trim().strip_prefix("sha256="))
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or(AppError::Unauthorized)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| AppError::Unauthorized)
}

async fn find_by_reference(db: &DatabaseConnection, reference: &str) -> AppResult<payment::Model> {
    payment::Entity::find()
        .filter(payment::Column::ProviderRef.eq(reference))
        .one(db)
        .await?
        .ok_or(AppError::NotFound("payment"))
}

pub async fn apply_event(db: &DatabaseConnection, event: WebhookEvent) -> AppResult<WebhookOutcome> {
    let outcome = match event.kind.as_str() {
        "payment.succeeded" => succeed(db, &event.data.reference).await?,
        "payment.failed" => fail(db, &event.data.reference, event.data.reason).await?,
        "payment.refunded" => refund(db, &event.data.reference).await?,
        other => {
            info!(kind = other, "ignoring payment event type");
            WebhookOutcome::Ignored
        }
    };
    info!(kind = %event.kind, reference = %event.data.reference, ?outcome, "payment event");
    Ok(outcome)
}

async fn succeed(db: &DatabaseConnection, reference: &str) -> AppResult<WebhookOutcome> {
    let found = find_by_reference(db, reference).await?;
    match found.status {
        PaymentStatus::Succeeded => return Ok(WebhookOutcome::AlreadyApplied),
        PaymentStatus::Failed | PaymentStatus::Refunded => {
            warn!(payment_id = found.id, status = ?found.status, "success for a settled payment");
            return Ok(WebhookOutcome::Ignored);
        }
        PaymentStatus::Pending | PaymentStatus::Expired => {}
    }

    let txn = db.begin().await?;
    // Claim the row; a concurrent delivery of the same event loses here.
    let stamp = now();
    let claimed = payment::Entity::update_many()
        .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Succeeded))
        .col_expr(payment::Column::UpdatedAt, Expr::value(stamp))
        .filter(payment::Column::Id.eq(found.id))
        .filter(payment::Column::Status.is_in([PaymentStatus::Pending, PaymentStatus::Expired]))
        .exec(&txn)
        .await?;
    if claimed.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(WebhookOutcome::AlreadyApplied);
    }

    let gift = donation::ActiveModel {
        member_id: Set(found.member_id),
        campaign_id: Set(found.campaign_id),
        amount_cents: Set(found.amount_cents),
        donated_on: Set(stamp.date()),
        method: Set(DonationMethod::Online),
        reference: Set(Some(found.provider_ref.clone())),
        is_tax_deductible: Set(true),
        notes: Set(None),
        recorded_by: Set(None),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let mut active: payment::ActiveModel = found.into();
    active.status = Set(PaymentStatus::Succeeded);
    active.donation_id = Set(Some(gift.id));
    active.updated_at = Set(stamp);
    active.update(&txn).await?;
    txn.commit().await?;
    Ok(WebhookOutcome::Applied)
}

async fn fail(
    db: &DatabaseConnection,
    reference: &str,
    reason: Option<String>,
) -> AppResult<WebhookOutcome> {
    let found = find_by_reference(db, reference).await?;
    match found.status {
        PaymentStatus::Pending | PaymentStatus::Expired => {}
        PaymentStatus::Failed => return Ok(WebhookOutcome::AlreadyApplied),
        _ => return Ok(WebhookOutcome::Ignored),
    }
    let mut active: payment::ActiveModel = found.into();
    active.status = Set(PaymentStatus::Failed);
    active.failure_reason = Set(reason);
    active.updated_at = Set(now());
    active.update(db).await?;
    Ok(WebhookOutcome::Applied)
}

async fn refund(db: &DatabaseConnection, reference: &str) -> AppResult<WebhookOutcome> {
    let found = find_by_reference(db, reference).await?;
    match found.status {
        PaymentStatus::Succeeded => {}
        PaymentStatus::Refunded => return Ok(WebhookOutcome::AlreadyApplied),
        _ => return Ok(WebhookOutcome::Ignored),
    }

    let txn = db.begin().await?;
    if let Some(donation_id) = found.donation_id {
        if let Some(gift) = donation::Entity::find_by_id(donation_id).one(&txn).await? {
            gift.delete(&txn).await?;
        }
    }
    let mut active: payment::ActiveModel = found.into();
    active.status = Set(PaymentStatus::Refunded);
    active.donation_id = Set(None);
    active.updated_at = Set(now());
    active.update(&txn).await?;
    txn.commit().await?;
    Ok(WebhookOutcome::Applied)
}

/// Marks abandoned checkouts as expired. Returns how many changed.
pub async fn expire_stale(db: &DatabaseConnection, at: NaiveDateTime) -> AppResult<u64> {
    let cutoff = at - Duration::hours(PENDING_TTL_HOURS);
    let result = payment::Entity::update_many()
        .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Expired))
        .col_expr(payment::Column::UpdatedAt, Expr::value(at))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .filter(payment::Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::Role;
    use crate::testing::{member_viewer, test_db};

    fn event(kind: &str, reference: &str) -> WebhookEvent {
        WebhookEvent {
            kind: kind.to_string(),
            data: WebhookData {
                reference: reference.to_string(),
                reason: Some("card declined".into()),
            },
        }
    }

    fn intent(amount: i64) -> IntentInput {
        IntentInput {
            amount,
            campaign_id: None,
            currency: None,
        }
    }

    #[test]
    fn signatures_round_trip_and_reject_tampering() {
        let body = br#"{"type":"payment.succeeded"}"#;
        let header = sign("whsec", body);
        assert!(header.starts_with("sha256="));
        assert!(verify_signature("whsec", body, Some(&header)).is_ok());
        assert!(matches!(
            verify_signature("other", body, Some(&header)),
            Err(AppError::Unauthorized)
        ));
        assert!(verify_signature("whsec", b"{}", Some(&header)).is_err());
        assert!(verify_signature("whsec", body, Some("sha256=zz")).is_err());
        assert!(verify_signature("whsec", body, None).is_err());
    }

    #[tokio::test]
    async fn success_creates_one_donation() {
        let db = test_db().await;
        let giver = member_viewer(&db, "Lydia", Role::Member).await;
        let created = create_intent(&db, &giver, intent(5000)).await.unwrap();
        assert!(created.provider_ref.starts_with("pay_"));
        assert_eq!(created.currency, "usd");

        let first = apply_event(&db, event("payment.succeeded", &created.provider_ref))
            .await
            .unwrap();
        assert_eq!(first, WebhookOutcome::Applied);
        let again = apply_event(&db, event("payment.succeeded", &created.provider_ref))
            .await
            .unwrap();
        assert_eq!(again, WebhookOutcome::AlreadyApplied);

        let gifts = donation::Entity::find().all(&db).await.unwrap();
        assert_eq!(gifts.len(), 1);
        assert_eq!(gifts[0].method, DonationMethod::Online);
        assert!(gifts[0].is_tax_deductible);
        assert_eq!(gifts[0].member_id, giver.member_id().ok());

        let stored = find_by_reference(&db, &created.provider_ref).await.unwrap();
        assert_eq!(stored.donation_id, Some(gifts[0].id));
    }

    #[tokio::test]
    async fn refund_removes_the_donation() {
        let db = test_db().await;
        let giver = member_viewer(&db, "Lydia", Role::Member).await;
        let created = create_intent(&db, &giver, intent(5000)).await.unwrap();
        apply_event(&db, event("payment.succeeded", &created.provider_ref))
            .await
            .unwrap();
        let refunded = apply_event(&db, event("payment.refunded", &created.provider_ref))
            .await
            .unwrap();
        assert_eq!(refunded, WebhookOutcome::Applied);
        assert!(donation::Entity::find().all(&db).await.unwrap().is_empty());
        let stored = find_by_reference(&db, &created.provider_ref).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
        assert_eq!(stored.donation_id, None);
    }

    #[tokio::test]
    async fn failure_records_reason_and_unknowns_are_handled() {
        let db = test_db().await;
        let giver = member_viewer(&db, "Lydia", Role::Member).await;
        let created = create_intent(&db, &giver, intent(100)).await.unwrap();
        apply_event(&db, event("payment.failed", &created.provider_ref))
            .await
            .unwrap();
        let stored = find_by_reference(&db, &created.provider_ref).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("card declined"));

        assert!(matches!(
            apply_event(&db, event("payment.succeeded", "pay_missing")).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(
            apply_event(&db, event("payment.disputed", &created.provider_ref))
                .await
                .unwrap(),
            WebhookOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn stale_pending_intents_expire() {
        let db = test_db().await;
        let giver = member_viewer(&db, "Lydia", Role::Member).await;
        let created = create_intent(&db, &giver, intent(100)).await.unwrap();

        assert_eq!(expire_stale(&db, now()).await.unwrap(), 0);
        let later = now() + Duration::hours(PENDING_TTL_HOURS + 1);
        assert_eq!(expire_stale(&db, later).await.unwrap(), 1);
        let stored = find_by_reference(&db, &created.provider_ref).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Expired);

        assert!(matches!(
            create_intent(&db, &giver, intent(0)).await,
            Err(AppError::Validation(_))
        ));
    }
}
