//! Periodic work on a tokio timer: reminders, scheduled sends and expiry.
//!
//! Every job is safe to re-run; each one selects only rows whose status or
//! `reminder_sent` flag says they are still pending.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDateTime;
use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::communication::{Mailer, newsletters};
use crate::config::Config;
use crate::core::now;
use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct Jobs {
    db: DatabaseConnection,
    mailer: Mailer,
    every: Duration,
    lead: chrono::Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub event_reminders: u64,
    pub volunteer_reminders: u64,
    pub lesson_reminders: u64,
    pub newsletters_sent: u64,
    pub swaps_expired: u64,
    pub payments_expired: u64,
}

/// Runs one job, logging instead of propagating a failure.
async fn attempt<F, T>(name: &'static str, job: F) -> u64
where
    F: Future<Output = AppResult<T>>,
    T: TryInto<u64>,
{
    match job.await {
        Ok(count) => count.try_into().unwrap_or(0),
        Err(e) => {
            error!(job = name, error = %e, "job failed");
            0
        }
    }
}

impl Jobs {
    pub fn new(db: DatabaseConnection, mailer: Mailer, config: &Config) -> Self {
        Self {
            db,
            mailer,
            every: Duration::from_secs(config.job_interval_secs.max(1)),
            lead: chrono::Duration::hours(config.reminder_lead_hours),
        }
    }

    pub async fn run_once(&self, at: NaiveDateTime) -> RunReport {
        let db = &self.db;
        let mailer = &self.mailer;
        let report = RunReport {
            event_reminders: attempt(
                "event_reminders",
                crate::events::send_reminders(db, mailer, at, self.lead),
            )
            .await,
            volunteer_reminders: attempt(
                "volunteer_reminders",
                crate::volunteers::send_reminders(db, mailer, at, self.lead),
            )
            .await,
            lesson_reminders: attempt(
                "lesson_reminders",
                crate::onboarding::send_reminders(db, mailer, at, self.lead),
            )
            .await,
            newsletters_sent: attempt("newsletters", newsletters::send_due(db, mailer, at)).await,
            swaps_expired: attempt(
                "swap_expiry",
                crate::volunteers::swaps::expire(db, at.date()),
            )
            .await,
            payments_expired: attempt(
                "payment_expiry",
                crate::payments::expire_stale(db, at),
            )
            .await,
        };
        info!(
            event_reminders = report.event_reminders,
            volunteer_reminders = report.volunteer_reminders,
            lesson_reminders = report.lesson_reminders,
            newsletters_sent = report.newsletters_sent,
            swaps_expired = report.swaps_expired,
            payments_expired = report.payments_expired,
            "jobs ran"
        );
        report
    }

    /// Loops until the returned handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once(now()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::entities::sea_orm_active_enums::{Role, RsvpResponse};
    use crate::events::{EventInput, RsvpInput, create, respond};
    use crate::testing::{member_viewer, test_db};

    fn config() -> Config {
        Config {
            database_url: "sqlite::memory:".into(),
            rust_log: "info".into(),
            bind_addr: "127.0.0.1:0".into(),
            secret_key: "secret".into(),
            payment_webhook_secret: "hook".into(),
            mail: MailConfig { api_url: None, api_key: None, from: "office@example.org".into() },
            admin_email: None,
            admin_password: None,
            job_interval_secs: 60,
            reminder_lead_hours: 24,
            secure_cookies: false,
            church_name: "Grace".into(),
        }
    }

    #[tokio::test]
    async fn a_second_run_finds_nothing_to_do() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Titus", Role::Pastor).await;
        let starts_at = now() + chrono::Duration::hours(3);
        let event = create(
            &db,
            &pastor,
            EventInput {
                title: "Prayer meeting".into(),
                description: None,
                location: None,
                starts_at,
                ends_at: starts_at + chrono::Duration::hours(1),
                capacity: None,
                is_public: false,
            },
        )
        .await
        .unwrap();
        respond(
            &db,
            &pastor,
            event.id,
            RsvpInput { response: RsvpResponse::Yes, guests: None, member_id: None },
        )
        .await
        .unwrap();

        let (mailer, outbox) = Mailer::capture();
        let jobs = Jobs::new(db, mailer, &config());
        let first = jobs.run_once(now()).await;
        assert_eq!(first.event_reminders, 1);
        assert_eq!(jobs.run_once(now()).await, RunReport::default());
        assert_eq!(outbox.lock().unwrap().len(), 1);
    }
}
