//! Read-only dashboards.

use chrono::{Datelike, Duration};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;

use crate::auth::Viewer;
use crate::communication::notifications::{self, NotificationFilter};
use crate::core::now;
use crate::donations::{campaigns, year_bounds};
use crate::entities::{
    donation, event, member, notification, rsvp, volunteer_position, volunteer_schedule,
    sea_orm_active_enums::{MembershipStatus, Role, Urgency},
};
use crate::error::AppResult;
use crate::events::RsvpSummary;
use crate::util::pagination::PageParams;
use crate::volunteers::DateRange;

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: MembershipStatus,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct UrgencyCount {
    pub urgency: Urgency,
    pub count: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MonthTotal {
    pub month: u32,
    pub cents: i64,
}

#[derive(Debug, Serialize)]
pub struct EventRsvps {
    pub event: event::Model,
    pub summary: RsvpSummary,
}

#[derive(Debug, Serialize)]
pub struct EventAttendance {
    pub event: event::Model,
    pub attended: u64,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct FillRate {
    pub needed: i64,
    pub filled: i64,
    pub percent: i64,
}

#[derive(Debug, Serialize)]
pub struct StaffDashboard {
    pub membership: Vec<StatusCount>,
    pub new_members_30d: u64,
    pub year: i32,
    pub donations_ytd_cents: i64,
    pub donations_by_month: Vec<MonthTotal>,
    pub campaigns: Vec<campaigns::Progress>,
    pub upcoming_events: Vec<EventRsvps>,
    pub volunteer_fill: FillRate,
    pub help_by_urgency: Vec<UrgencyCount>,
    pub pipeline: Vec<StatusCount>,
    pub recent_attendance: Vec<EventAttendance>,
}

#[derive(Debug, Serialize)]
pub struct UpcomingRsvp {
    pub rsvp: rsvp::Model,
    pub event: event::Model,
}

#[derive(Debug, Serialize)]
pub struct UpcomingShift {
    pub schedule: volunteer_schedule::Model,
    pub position: Option<volunteer_position::Model>,
}

#[derive(Debug, Serialize)]
pub struct PersonalDashboard {
    pub member: Option<member::Model>,
    pub rsvps: Vec<UpcomingRsvp>,
    pub shifts: Vec<UpcomingShift>,
    pub unread: u64,
    pub notifications: Vec<notification::Model>,
    pub onboarding_status: Option<MembershipStatus>,
}

/// Sums donations per calendar month, January first, all twelve months.
pub fn by_month(donations: &[donation::Model]) -> Vec<MonthTotal> {
    let mut months: Vec<MonthTotal> = (1..=12).map(|month| MonthTotal { month, cents: 0 }).collect();
    for d in donations {
        if let Some(slot) = months.get_mut(d.donated_on.month0() as usize) {
            slot.cents += d.amount_cents;
        }
    }
    months
}

fn fill_rate(slots: &[crate::volunteers::RotaSlot]) -> FillRate {
    let mut rate = FillRate::default();
    for slot in slots {
        let needed = slot.position.slots_needed as i64;
        rate.needed += needed;
        rate.filled += (slot.filled as i64).min(needed);
    }
    rate.percent = if rate.needed > 0 { rate.filled * 100 / rate.needed } else { 0 };
    rate
}

pub async fn staff_dashboard(db: &DatabaseConnection, viewer: &Viewer) -> AppResult<StaffDashboard> {
    viewer.require(Role::can_view_reports, "see reports")?;
    let at = now();
    let today = at.date();

    let counts = crate::onboarding::status_counts(db).await?;
    let membership = counts
        .iter()
        .map(|(status, count)| StatusCount { status: *status, count: *count })
        .collect();
    let pipeline = counts
        .iter()
        .filter(|(status, _)| crate::onboarding::PIPELINE.contains(status))
        .map(|(status, count)| StatusCount { status: *status, count: *count })
        .collect();
    let new_members_30d = member::Entity::find()
        .filter(member::Column::IsActive.eq(true))
        .filter(member::Column::CreatedAt.gte(at - Duration::days(30)))
        .count(db)
        .await?;

    let year = today.year();
    let (start, end) = year_bounds(year)?;
    let donations = donation::Entity::find()
        .filter(donation::Column::DonatedOn.between(start, end.min(today)))
        .all(db)
        .await?;
    let donations_ytd_cents = donations.iter().map(|d| d.amount_cents).sum();

    let events = event::Entity::find()
        .filter(event::Column::IsCancelled.eq(false))
        .filter(event::Column::StartsAt.gte(at))
        .order_by_asc(event::Column::StartsAt)
        .limit(5)
        .all(db)
        .await?;
    let mut upcoming_events = Vec::with_capacity(events.len());
    for event in events {
        let rsvps = rsvp::Entity::find()
            .filter(rsvp::Column::EventId.eq(event.id))
            .all(db)
            .await?;
        upcoming_events.push(EventRsvps {
            summary: RsvpSummary::tally(event.capacity, &rsvps),
            event,
        });
    }

    let past = event::Entity::find()
        .filter(event::Column::IsCancelled.eq(false))
        .filter(event::Column::StartsAt.lt(at))
        .order_by_desc(event::Column::StartsAt)
        .limit(5)
        .all(db)
        .await?;
    let mut recent_attendance = Vec::with_capacity(past.len());
    for event in past {
        recent_attendance.push(EventAttendance {
            attended: crate::attendance::count(db, event.id).await?,
            event,
        });
    }

    let rota = crate::volunteers::rota(db, DateRange::next_days(7)).await?;
    let help_by_urgency = crate::help_requests::open_by_urgency(db)
        .await?
        .into_iter()
        .map(|(urgency, count)| UrgencyCount { urgency, count })
        .collect();

    Ok(StaffDashboard {
        membership,
        new_members_30d,
        year,
        donations_ytd_cents,
        donations_by_month: by_month(&donations),
        campaigns: campaigns::active_progress(db).await?,
        upcoming_events,
        volunteer_fill: fill_rate(&rota),
        help_by_urgency,
        pipeline,
        recent_attendance,
    })
}

pub async fn personal_dashboard(
    db: &DatabaseConnection,
    viewer: &Viewer,
) -> AppResult<PersonalDashboard> {
    let Some(member) = viewer.member.clone() else {
        return Ok(PersonalDashboard {
            member: None,
            rsvps: Vec::new(),
            shifts: Vec::new(),
            unread: 0,
            notifications: Vec::new(),
            onboarding_status: None,
        });
    };
    let rsvps = crate::events::upcoming_for_member(db, member.id)
        .await?
        .into_iter()
        .map(|(rsvp, event)| UpcomingRsvp { rsvp, event })
        .collect();
    let shifts = crate::volunteers::upcoming_for_member(db, member.id)
        .await?
        .into_iter()
        .map(|(schedule, position)| UpcomingShift { schedule, position })
        .collect();
    let unread = notifications::unread_count(db, member.id).await?;
    let latest = notifications::list_for(
        db,
        member.id,
        &NotificationFilter { unread: true },
        PageParams { page: Some(1), per_page: Some(5) },
    )
    .await?;
    let onboarding_status = match member.membership_status {
        MembershipStatus::Active | MembershipStatus::Inactive => None,
        status => Some(status),
    };
    Ok(PersonalDashboard {
        member: Some(crate::members::redact(viewer, member)),
        rsvps,
        shifts,
        unread,
        notifications: latest.items,
        onboarding_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donations::{DonationInput, record};
    use crate::entities::sea_orm_active_enums::DonationMethod;
    use crate::testing::{member_viewer, test_db};
    use chrono::NaiveDate;

    fn gift(on: NaiveDate, cents: i64) -> donation::Model {
        donation::Model {
            id: 0,
            member_id: None,
            campaign_id: None,
            amount_cents: cents,
            donated_on: on,
            method: DonationMethod::Cash,
            reference: None,
            is_tax_deductible: true,
            notes: None,
            recorded_by: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn months_are_summed() {
        let d = |m, day| NaiveDate::from_ymd_opt(2025, m, day).unwrap();
        let totals = by_month(&[gift(d(1, 5), 1000), gift(d(1, 20), 500), gift(d(12, 24), 2500)]);
        assert_eq!(totals.len(), 12);
        assert_eq!(totals[0], MonthTotal { month: 1, cents: 1500 });
        assert_eq!(totals[1].cents, 0);
        assert_eq!(totals[11].cents, 2500);
    }

    #[tokio::test]
    async fn reports_are_for_office_roles() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Erastus", Role::Treasurer).await;
        let member = member_viewer(&db, "Gaius", Role::Member).await;

        record(
            &db,
            &treasurer,
            DonationInput {
                member_id: member.member_id().ok(),
                campaign_id: None,
                amount: 4200,
                donated_on: now().date(),
                method: DonationMethod::Check,
                is_tax_deductible: true,
                reference: None,
                notes: None,
            },
        )
        .await
        .unwrap();

        let dashboard = staff_dashboard(&db, &treasurer).await.unwrap();
        assert_eq!(dashboard.donations_ytd_cents, 4200);
        assert_eq!(dashboard.new_members_30d, 2);
        let active = dashboard
            .membership
            .iter()
            .find(|c| c.status == MembershipStatus::Active)
            .map(|c| c.count);
        assert_eq!(active, Some(2));
        assert_eq!(dashboard.volunteer_fill, FillRate::default());

        assert!(staff_dashboard(&db, &member).await.is_err());
        let mine = personal_dashboard(&db, &member).await.unwrap();
        assert_eq!(mine.unread, 0);
        assert!(mine.onboarding_status.is_none());
    }
}
