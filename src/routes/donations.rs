use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use minijinja::context;
use sea_orm::Iterable;
use serde::Deserialize;

use super::{ShowAll, page};
use crate::{
    auth::{PageViewer, Viewer},
    core::{export::CsvExport, now},
    donations::{
        self, DonationFilter, DonationInput,
        campaigns::{self, CampaignInput},
        receipts,
    },
    entities::sea_orm_active_enums::{DonationMethod, Role},
    error::{AppError, PageError},
    payments,
    router::AppState,
    util::{form::empty_as_none, pagination::PageParams},
};

#[derive(Debug, Default, Deserialize)]
pub struct YearQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub year: Option<i32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/donations", get(self::get::ledger).post(self::post::record))
        .route("/donations/new", get(self::get::new_donation))
        .route("/donations/export.csv", get(self::get::export))
        .route("/donations/{id}", get(self::get::donation).post(self::post::update))
        .route("/donations/{id}/delete", post(self::post::delete))
        .route("/campaigns", get(self::get::campaigns).post(self::post::create_campaign))
        .route("/campaigns/{id}", get(self::get::campaign).post(self::post::update_campaign))
        .route("/giving", get(self::get::giving))
        .route("/members/{id}/giving", get(self::get::member_giving))
        .route("/members/{id}/receipt", get(self::get::receipt))
        .route("/api/v1/donations", get(api::list).post(api::record))
        .route(
            "/api/v1/donations/{id}",
            get(api::get).put(api::update).delete(api::delete),
        )
        .route("/api/v1/members/{id}/donations", get(api::for_member))
        .route("/api/v1/members/{id}/receipts/{year}", get(api::receipt))
        .route("/api/v1/campaigns", get(api::campaigns).post(api::create_campaign))
        .route("/api/v1/campaigns/{id}", get(api::campaign).put(api::update_campaign))
}

mod get {
    use super::*;

    pub async fn ledger(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(filter): Query<DonationFilter>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, PageError> {
        let list = donations::list(&state.db, &viewer, &filter, params).await?;
        let campaigns = campaigns::list(&state.db, false).await?;
        page(
            &state,
            &viewer,
            "donations/list.html",
            context! {
                active => "donations",
                list => list,
                campaigns => campaigns,
                methods => DonationMethod::iter().collect::<Vec<_>>(),
                filter => context! {
                    member_id => filter.member_id,
                    campaign_id => filter.campaign_id,
                    year => filter.year,
                    method => filter.method,
                },
                can_manage => viewer.role().can_manage_donations(),
            },
        )
    }

    pub async fn new_donation(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        viewer.require(Role::can_manage_donations, "record donations")?;
        let campaigns = campaigns::list(&state.db, true).await?;
        page(
            &state,
            &viewer,
            "donations/form.html",
            context! {
                active => "donations",
                campaigns => campaigns,
                methods => DonationMethod::iter().collect::<Vec<_>>(),
                today => now().date(),
            },
        )
    }

    pub async fn donation(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let donation = donations::get(&state.db, &viewer, id).await?;
        let campaigns = campaigns::list(&state.db, false).await?;
        page(
            &state,
            &viewer,
            "donations/form.html",
            context! {
                active => "donations",
                donation => donation,
                campaigns => campaigns,
                methods => DonationMethod::iter().collect::<Vec<_>>(),
                can_manage => viewer.role().can_manage_donations(),
            },
        )
    }

    pub async fn export(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(filter): Query<DonationFilter>,
    ) -> Result<impl IntoResponse, PageError> {
        let bytes = donations::export_csv(&state.db, &viewer, &filter).await?;
        Ok(CsvExport::new(&donations::export_stem(&filter), now().date(), bytes))
    }

    pub async fn campaigns(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(show): Query<ShowAll>,
    ) -> Result<impl IntoResponse, PageError> {
        let progress = if show.all {
            let mut all = Vec::new();
            for campaign in campaigns::list(&state.db, false).await? {
                all.push(campaigns::progress(&state.db, campaign.id).await?);
            }
            all
        } else {
            campaigns::active_progress(&state.db).await?
        };
        page(
            &state,
            &viewer,
            "campaigns/list.html",
            context! {
                active => "campaigns",
                campaigns => progress,
                all => show.all,
                can_manage => viewer.role().can_manage_donations(),
            },
        )
    }

    pub async fn campaign(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let progress = campaigns::progress(&state.db, id).await?;
        page(
            &state,
            &viewer,
            "campaigns/show.html",
            context! {
                active => "campaigns",
                progress => progress,
                can_manage => viewer.role().can_manage_donations(),
            },
        )
    }

    pub async fn giving(
        viewer: PageViewer,
        Query(query): Query<YearQuery>,
    ) -> Result<impl IntoResponse, PageError> {
        let member_id = viewer.member_id()?;
        Ok(Redirect::to(&match query.year {
            Some(year) => format!("/members/{member_id}/giving?year={year}"),
            None => format!("/members/{member_id}/giving"),
        }))
    }

    pub async fn member_giving(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Query(query): Query<YearQuery>,
    ) -> Result<impl IntoResponse, PageError> {
        let year = query.year.unwrap_or_else(donations::current_year);
        let donations = donations::for_member(&state.db, &viewer, id, Some(year)).await?;
        let total_cents: i64 = donations.iter().map(|d| d.amount_cents).sum();
        let payments = if viewer.is_self(id) {
            payments::for_viewer(&state.db, &viewer).await?
        } else {
            Vec::new()
        };
        let campaigns = campaigns::active_progress(&state.db).await?;
        page(
            &state,
            &viewer,
            "donations/giving.html",
            context! {
                active => "giving",
                member_id => id,
                year => year,
                donations => donations,
                total_cents => total_cents,
                payments => payments,
                campaigns => campaigns,
                is_self => viewer.is_self(id),
            },
        )
    }

    pub async fn receipt(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Query(query): Query<YearQuery>,
    ) -> Result<impl IntoResponse, PageError> {
        let year = query.year.unwrap_or_else(|| donations::current_year() - 1);
        let receipt = receipts::tax_receipt(&state.db, &viewer, id, year).await?;
        Ok(state.render(
            "donations/receipt.html",
            context! { receipt => receipt, issued_on => now().date() },
        )?)
    }
}

mod post {
    use super::*;

    pub async fn record(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<DonationInput>,
    ) -> Result<Redirect, PageError> {
        donations::record(&state.db, &viewer, input).await?;
        Ok(Redirect::to("/donations"))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<DonationInput>,
    ) -> Result<Redirect, PageError> {
        donations::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/donations/{id}")))
    }

    pub async fn delete(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        donations::delete(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/donations"))
    }

    pub async fn create_campaign(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<CampaignInput>,
    ) -> Result<Redirect, PageError> {
        let campaign = campaigns::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/campaigns/{}", campaign.id)))
    }

    pub async fn update_campaign(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<CampaignInput>,
    ) -> Result<Redirect, PageError> {
        campaigns::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/campaigns/{id}")))
    }
}

mod api {
    use super::*;

    pub async fn list(
        State(state): State<AppState>,
        viewer: Viewer,
        Query(filter): Query<DonationFilter>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(donations::list(&state.db, &viewer, &filter, params).await?))
    }

    pub async fn get(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(donations::get(&state.db, &viewer, id).await?))
    }

    pub async fn record(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<DonationInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let donation = donations::record(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(donation)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<DonationInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(donations::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn delete(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        donations::delete(&state.db, &viewer, id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn for_member(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Query(query): Query<YearQuery>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(donations::for_member(&state.db, &viewer, id, query.year).await?))
    }

    pub async fn receipt(
        State(state): State<AppState>,
        viewer: Viewer,
        Path((id, year)): Path<(i32, i32)>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(receipts::tax_receipt(&state.db, &viewer, id, year).await?))
    }

    pub async fn campaigns(
        State(state): State<AppState>,
        _viewer: Viewer,
        Query(show): Query<ShowAll>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(campaigns::list(&state.db, !show.all).await?))
    }

    pub async fn campaign(
        State(state): State<AppState>,
        _viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(campaigns::progress(&state.db, id).await?))
    }

    pub async fn create_campaign(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<CampaignInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let campaign = campaigns::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(campaign)))
    }

    pub async fn update_campaign(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<CampaignInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(campaigns::update(&state.db, &viewer, id, input).await?))
    }
}
