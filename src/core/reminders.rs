//! Per-member grouping of reminder lines.
//!
//! Jobs push one line per due item, then `deliver` sends a single notice and
//! at most one mail per member. The returned ids are what the caller should
//! flag as reminded; an item is only returned once its member was handled.

use std::collections::BTreeMap;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::warn;

use crate::communication::{
    mailer::{Mail, Mailer},
    notifications::{self, Notice},
    preferences,
};
use crate::entities::{member, sea_orm_active_enums::NotificationCategory};
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderLine {
    /// Id of the row whose `reminder_sent` flag this line clears.
    pub source_id: i32,
    pub text: String,
    pub link: Option<String>,
}

#[derive(Debug)]
pub struct ReminderBatch {
    category: NotificationCategory,
    title: String,
    lines: BTreeMap<i32, Vec<ReminderLine>>,
}

impl ReminderBatch {
    pub fn new(category: NotificationCategory, title: impl Into<String>) -> Self {
        Self {
            category,
            title: title.into(),
            lines: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, member_id: i32, line: ReminderLine) {
        self.lines.entry(member_id).or_default().push(line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.lines.len()
    }

    fn body(lines: &[ReminderLine]) -> String {
        lines
            .iter()
            .map(|line| format!("- {}", line.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn deliver(self, db: &DatabaseConnection, mailer: &Mailer) -> AppResult<Vec<i32>> {
        if self.lines.is_empty() {
            return Ok(Vec::new());
        }
        let member_ids: Vec<i32> = self.lines.keys().copied().collect();
        let members: BTreeMap<i32, member::Model> = member::Entity::find()
            .filter(member::Column::Id.is_in(member_ids.iter().copied()))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let prefs = preferences::load_many(db, &member_ids).await?;

        let mut handled = Vec::new();
        for (member_id, lines) in self.lines {
            let sources = lines.iter().map(|line| line.source_id);
            let Some(member) = members.get(&member_id).filter(|m| m.is_active) else {
                handled.extend(sources);
                continue;
            };
            let prefs = prefs.get(&member_id).copied().unwrap_or_default();
            let body = Self::body(&lines);

            if prefs.wants_in_app(self.category) {
                let mut notice = Notice::new(self.category, self.title.clone()).body(body.clone());
                if let [only] = lines.as_slice() {
                    if let Some(link) = &only.link {
                        notice = notice.link(link.clone());
                    }
                }
                notifications::insert(db, member_id, &notice).await?;
            }

            if prefs.wants_email(self.category) {
                if let Some(to) = &member.email {
                    let mail = Mail {
                        to: to.clone(),
                        subject: self.title.clone(),
                        body: format!("Hello {},\n\n{}\n", member.first_name, body),
                    };
                    if let Err(error) = mailer.send(mail).await {
                        warn!(member_id, %error, "reminder mail failed");
                    }
                }
            }

            handled.extend(sources);
        }
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::preferences::{Preferences, save};
    use crate::communication::notifications::unread_count;
    use crate::entities::sea_orm_active_enums::MembershipStatus;
    use crate::testing::{create_member, test_db};

    fn line(source_id: i32, text: &str) -> ReminderLine {
        ReminderLine {
            source_id,
            text: text.to_string(),
            link: Some(format!("/events/{source_id}")),
        }
    }

    #[tokio::test]
    async fn one_notice_and_mail_per_member() {
        let db = test_db().await;
        let ruth = create_member(&db, "Ruth", "Moab", MembershipStatus::Active).await;
        let boaz = create_member(&db, "Boaz", "Bethlehem", MembershipStatus::Active).await;
        save(
            &db,
            boaz.id,
            Preferences {
                email_enabled: false,
                ..Preferences::default()
            },
        )
        .await
        .unwrap();

        let mut batch = ReminderBatch::new(NotificationCategory::Events, "Coming up");
        batch.push(ruth.id, line(1, "Harvest supper"));
        batch.push(ruth.id, line(2, "Choir practice"));
        batch.push(boaz.id, line(3, "Harvest supper"));
        assert_eq!(batch.member_count(), 2);

        let (mailer, outbox) = Mailer::capture();
        let mut handled = batch.deliver(&db, &mailer).await.unwrap();
        handled.sort();
        assert_eq!(handled, vec![1, 2, 3]);

        let sent = outbox.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ruth.moab@example.org");
        assert!(sent[0].body.contains("- Harvest supper\n- Choir practice"));

        assert_eq!(unread_count(&db, ruth.id).await.unwrap(), 1);
        assert_eq!(unread_count(&db, boaz.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn opted_out_members_are_still_marked_handled() {
        let db = test_db().await;
        let member = create_member(&db, "Silas", "Singer", MembershipStatus::Active).await;
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

        let mut batch = ReminderBatch::new(NotificationCategory::Events, "Coming up");
        batch.push(member.id, line(7, "Prayer night"));
        let (mailer, outbox) = Mailer::capture();

        assert_eq!(batch.deliver(&db, &mailer).await.unwrap(), vec![7]);
        assert!(outbox.lock().unwrap().is_empty());
        assert_eq!(unread_count(&db, member.id).await.unwrap(), 0);
    }
}
