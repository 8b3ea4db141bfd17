use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TryIntoModel,
};
use serde::{Deserialize, Serialize};

use crate::core::now;
use crate::entities::{notification_preference, sea_orm_active_enums::NotificationCategory};
use crate::error::AppResult;
use crate::util::form::checkbox;

/// A member's delivery settings. Members without a stored row get everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, deserialize_with = "checkbox")]
    pub email_enabled: bool,
    #[serde(default, deserialize_with = "checkbox")]
    pub in_app_enabled: bool,
    #[serde(default, deserialize_with = "checkbox")]
    pub events: bool,
    #[serde(default, deserialize_with = "checkbox")]
    pub volunteers: bool,
    #[serde(default, deserialize_with = "checkbox")]
    pub newsletters: bool,
    #[serde(default, deserialize_with = "checkbox")]
    pub help_requests: bool,
    #[serde(default, deserialize_with = "checkbox")]
    pub onboarding: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            email_enabled: true,
            in_app_enabled: true,
            events: true,
            volunteers: true,
            newsletters: true,
            help_requests: true,
            onboarding: true,
        }
    }
}

impl From<&notification_preference::Model> for Preferences {
    fn from(row: &notification_preference::Model) -> Self {
        Self {
            email_enabled: row.email_enabled,
            in_app_enabled: row.in_app_enabled,
            events: row.events,
            volunteers: row.volunteers,
            newsletters: row.newsletters,
            help_requests: row.help_requests,
            onboarding: row.onboarding,
        }
    }
}

impl Preferences {
    /// General notices and giving receipts cannot be switched off.
    pub fn accepts(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::General | NotificationCategory::Donations => true,
            NotificationCategory::Events => self.events,
            NotificationCategory::Volunteers => self.volunteers,
            NotificationCategory::Newsletters => self.newsletters,
            NotificationCategory::HelpRequests => self.help_requests,
            NotificationCategory::Onboarding => self.onboarding,
        }
    }

    pub fn wants_in_app(&self, category: NotificationCategory) -> bool {
        self.in_app_enabled && self.accepts(category)
    }

    pub fn wants_email(&self, category: NotificationCategory) -> bool {
        self.email_enabled && self.accepts(category)
    }
}

pub async fn load(db: &DatabaseConnection, member_id: i32) -> AppResult<Preferences> {
    Ok(notification_preference::Entity::find()
        .filter(notification_preference::Column::MemberId.eq(member_id))
        .one(db)
        .await?
        .as_ref()
        .map(Preferences::from)
        .unwrap_or_default())
}

/// Stored preferences for `member_ids`; absent members are left out.
pub async fn load_many(
    db: &DatabaseConnection,
    member_ids: &[i32],
) -> AppResult<HashMap<i32, Preferences>> {
    if member_ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(notification_preference::Entity::find()
        .filter(notification_preference::Column::MemberId.is_in(member_ids.iter().copied()))
        .all(db)
        .await?
        .iter()
        .map(|row| (row.member_id, Preferences::from(row)))
        .collect())
}

pub async fn save(
    db: &DatabaseConnection,
    member_id: i32,
    prefs: Preferences,
) -> AppResult<Preferences> {
    let existing = notification_preference::Entity::find()
        .filter(notification_preference::Column::MemberId.eq(member_id))
        .one(db)
        .await?;
    let stamp = now();
    let mut row = match existing {
        Some(row) => row.into(),
        None => notification_preference::ActiveModel {
            member_id: Set(member_id),
            created_at: Set(stamp),
            ..Default::default()
        },
    };
    row.email_enabled = Set(prefs.email_enabled);
    row.in_app_enabled = Set(prefs.in_app_enabled);
    row.events = Set(prefs.events);
    row.volunteers = Set(prefs.volunteers);
    row.newsletters = Set(prefs.newsletters);
    row.help_requests = Set(prefs.help_requests);
    row.onboarding = Set(prefs.onboarding);
    row.updated_at = Set(stamp);
    let saved = row.save(db).await?.try_into_model()?;
    Ok(Preferences::from(&saved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::MembershipStatus;
    use crate::testing::{create_member, test_db};

    #[test]
    fn mandatory_categories_ignore_toggles() {
        let prefs = Preferences {
            email_enabled: true,
            in_app_enabled: false,
            events: false,
            volunteers: false,
            newsletters: false,
            help_requests: false,
            onboarding: false,
        };
        assert!(prefs.accepts(NotificationCategory::General));
        assert!(prefs.accepts(NotificationCategory::Donations));
        assert!(!prefs.accepts(NotificationCategory::Events));
        assert!(prefs.wants_email(NotificationCategory::General));
        assert!(!prefs.wants_in_app(NotificationCategory::General));
    }

    #[test]
    fn form_posts_only_ticked_boxes() {
        let prefs: Preferences =
            serde_json::from_value(serde_json::json!({ "email_enabled": "on", "events": true }))
                .unwrap();
        assert!(prefs.email_enabled);
        assert!(prefs.events);
        assert!(!prefs.in_app_enabled);
        assert!(!prefs.newsletters);
    }

    #[tokio::test]
    async fn defaults_until_saved_then_upserts() {
        let db = test_db().await;
        let member = create_member(&db, "Lydia", "Purple", MembershipStatus::Active).await;

        assert_eq!(load(&db, member.id).await.unwrap(), Preferences::default());

        let quiet = Preferences {
            newsletters: false,
            ..Preferences::default()
        };
        save(&db, member.id, quiet).await.unwrap();
        let again = Preferences {
            email_enabled: false,
            ..quiet
        };
        save(&db, member.id, again).await.unwrap();

        assert_eq!(load(&db, member.id).await.unwrap(), again);
        let many = load_many(&db, &[member.id, member.id + 100]).await.unwrap();
        assert_eq!(many.len(), 1);
    }
}
