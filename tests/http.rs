use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use flock::{
    communication::Mailer,
    config::{Config, MailConfig},
    entities::{
        member,
        sea_orm_active_enums::{GroupKind, MembershipStatus, Role},
    },
    members::{
        families::{self, FamilyInput},
        groups::{self, GroupInput},
    },
    payments::{self, IntentInput, SIGNATURE_HEADER},
    router::{AppState, create_router},
    testing,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::MemoryStore;

const WEBHOOK_SECRET: &str = "whsec_test";

fn config() -> Config {
    Config {
        database_url: "sqlite::memory:".into(),
        rust_log: "warn".into(),
        bind_addr: "127.0.0.1:0".into(),
        secret_key: "test-secret".into(),
        payment_webhook_secret: WEBHOOK_SECRET.into(),
        mail: MailConfig {
            api_url: None,
            api_key: None,
            from: "office@example.org".into(),
        },
        admin_email: None,
        admin_password: None,
        job_interval_secs: 300,
        reminder_lead_hours: 24,
        secure_cookies: false,
        church_name: "Grace Chapel".into(),
    }
}

async fn app() -> (Router, DatabaseConnection) {
    let db = testing::test_db().await;
    let (mailer, _outbox) = Mailer::capture();
    let state = AppState::new(db.clone(), config(), mailer);
    (create_router(state, MemoryStore::default()), db)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get_json(app: &Router, uri: &str, cookie: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::get(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

/// Signs in through the HTML form and returns the session cookie.
async fn sign_in(app: &Router, email: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::post("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("email={email}&password=password123")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _db) = app().await;
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_requires_a_session() {
    let (app, _db) = app().await;
    let response = app
        .oneshot(Request::get("/api/v1/members").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn pages_redirect_to_login() {
    let (app, _db) = app().await;
    let response = app
        .oneshot(Request::get("/members?q=ann").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/login?next=%2Fmembers%3Fq%3Dann"
    );
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (app, db) = app().await;
    testing::member_viewer(&db, "Ruth", Role::Member).await;
    let response = app
        .oneshot(
            Request::post("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("email=ruth.tester@example.org&password=nope"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_in_member_sees_themselves() {
    let (app, db) = app().await;
    let viewer = testing::member_viewer(&db, "Lydia", Role::Member).await;
    let cookie = sign_in(&app, "lydia.tester@example.org").await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await;
    assert_eq!(me["member_id"], viewer.member_id().unwrap());
    assert_eq!(me["role"], "member");

    let response = app
        .oneshot(
            Request::get("/dashboard")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn members_cannot_read_the_donation_ledger() {
    let (app, db) = app().await;
    testing::member_viewer(&db, "Silas", Role::Member).await;
    let cookie = sign_in(&app, "silas.tester@example.org").await;

    let response = app
        .oneshot(
            Request::get("/api/v1/donations")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn staff_can_add_a_member_over_the_api() {
    let (app, db) = app().await;
    testing::member_viewer(&db, "Priscilla", Role::Pastor).await;
    let cookie = sign_in(&app, "priscilla.tester@example.org").await;

    let response = app
        .oneshot(
            Request::post("/api/v1/members")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "first_name": "Aquila",
                        "last_name": "Tentmaker",
                        "email": "aquila@example.org",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let member = body_json(response).await;
    assert_eq!(member["membership_status"], "visitor");
}

#[tokio::test]
async fn signed_webhook_records_the_gift_once() {
    let (app, db) = app().await;
    let donor = testing::member_viewer(&db, "Dorcas", Role::Member).await;
    let payment = payments::create_intent(
        &db,
        &donor,
        IntentInput {
            amount: 2500,
            campaign_id: None,
            currency: None,
        },
    )
    .await
    .unwrap();

    let body = json!({
        "type": "payment.succeeded",
        "data": { "reference": payment.provider_ref },
    })
    .to_string();
    let signature = payments::sign(WEBHOOK_SECRET, body.as_bytes());

    let deliver = |signature: String| {
        Request::post("/webhooks/payments")
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body.clone()))
            .unwrap()
    };

    let first = app.clone().oneshot(deliver(signature.clone())).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await["outcome"], "applied");

    let again = app.clone().oneshot(deliver(signature)).await.unwrap();
    assert_eq!(body_json(again).await["outcome"], "already_applied");

    let forged = app
        .oneshot(deliver(payments::sign("wrong", body.as_bytes())))
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    let gifts = flock::donations::for_member(
        &db,
        &testing::member_viewer(&db, "Treasurer", Role::Treasurer).await,
        donor.member_id().unwrap(),
        None,
    )
    .await
    .unwrap();
    assert_eq!(gifts.len(), 1);
    assert_eq!(gifts[0].amount_cents, 2500);
}

#[tokio::test]
async fn public_calendar_needs_no_login() {
    let (app, db) = app().await;
    testing::create_member(&db, "Visitor", "Only", MembershipStatus::Visitor).await;
    let response = app
        .oneshot(
            Request::get("/api/v1/public/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn request_ids_are_echoed_or_minted() {
    let (app, _db) = app().await;
    let response = app
        .clone()
        .oneshot(
            Request::get("/health")
                .header("x-request-id", "req-abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-abc-123");

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let minted = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(minted).is_ok());
}

#[tokio::test]
async fn changing_the_password_ends_other_sessions() {
    let (app, db) = app().await;
    testing::member_viewer(&db, "Phoebe", Role::Member).await;
    let laptop = sign_in(&app, "phoebe.tester@example.org").await;
    let phone = sign_in(&app, "phoebe.tester@example.org").await;

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/v1/me/password")
                .header(header::COOKIE, &laptop)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "current_password": "password123",
                        "new_password": "a-much-longer-secret",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (status, _) = get_json(&app, "/api/v1/me", &phone).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn staff_notes_stay_out_of_households_and_groups() {
    let (app, db) = app().await;
    let pastor = testing::member_viewer(&db, "Barnabas", Role::Pastor).await;
    testing::member_viewer(&db, "Mark", Role::Member).await;

    let family = families::create(
        &db,
        &pastor,
        FamilyInput {
            name: "Cyprus".into(),
            address: None,
            phone: None,
        },
    )
    .await
    .unwrap();
    let noted = testing::create_member(&db, "Mnason", "Cyprus", MembershipStatus::Active).await;
    let mut active: member::ActiveModel = noted.clone().into();
    active.family_id = Set(Some(family.id));
    active.notes = Set(Some("confidential counselling".into()));
    active.update(&db).await.unwrap();

    let group = groups::create(
        &db,
        &pastor,
        GroupInput {
            name: "Elders".into(),
            description: None,
            kind: GroupKind::Committee,
            leader_id: Some(noted.id),
            is_active: true,
        },
    )
    .await
    .unwrap();
    groups::add_member(&db, &pastor, group.id, noted.id).await.unwrap();

    let cookie = sign_in(&app, "mark.tester@example.org").await;

    let (status, household) =
        get_json(&app, &format!("/api/v1/families/{}", family.id), &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(household["members"][0]["first_name"], "Mnason");
    assert!(household["members"][0]["notes"].is_null());

    let (_, all) = get_json(&app, "/api/v1/families", &cookie).await;
    assert!(all[0]["members"][0]["notes"].is_null());

    let (status, detail) =
        get_json(&app, &format!("/api/v1/groups/{}", group.id), &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert!(detail["leader"]["notes"].is_null());
    assert!(detail["members"][0]["notes"].is_null());

    let staff = sign_in(&app, "barnabas.tester@example.org").await;
    let (_, household) =
        get_json(&app, &format!("/api/v1/families/{}", family.id), &staff).await;
    assert_eq!(household["members"][0]["notes"], "confidential counselling");
}
