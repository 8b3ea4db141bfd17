
use anyhow::Context;
use axum_login::tower_sessions::ExpiredDeletion;
use flock::{
    auth::accounts,
    communication::Mailer,
    config::Config,
    database::setup_database,
    jobs::Jobs,
    router::{AppState, create_router, shutdown_signal},
};
use tokio::net::TcpListener;
use tower_sessions_sqlx_store::PostgresStore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (db, pool) = setup_database(&config.database_url)
        .await
        .context("cannot connect to the database")?;
    accounts::bootstrap_admin(&db, &config).await?;

    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;
    let deletion_task = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );

    let mailer = Mailer::from_config(&config.mail)?;
    let jobs = Jobs::new(db.clone(), mailer.clone(), &config).spawn();

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, interval_secs = config.job_interval_secs, "listening");

    let state = AppState::new(db, config, mailer);
    let app = create_router(state, session_store);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(vec![
            deletion_task.abort_handle(),
            jobs.abort_handle(),
        ]))
        .await?;

    match deletion_task.await {
        Ok(result) => result?,
        Err(e) if e.is_cancelled() => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
