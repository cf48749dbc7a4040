use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use server::{DEFAULT_LOG_FILTER, build_router, normalize_db_url};
use services::{AppServices, Clock, DemoSeed};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lmsd", version, about = "Course progress and certification service")]
struct Cli {
    /// SQLite database URL or file path.
    #[arg(long, global = true, env = "LMS_DB_URL", default_value = "sqlite://lms.sqlite3?mode=rwc")]
    db: String,
    /// Socket address to bind, e.g. 127.0.0.1:8080
    #[arg(long, global = true, env = "LMS_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "LMS_LOG_JSON", default_value_t = false)]
    log_json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Write a demo admin, learner and course.
    Seed,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let db_url = normalize_db_url(&cli.db);
    let app = AppServices::new_sqlite(&db_url, Clock::System).await?;

    match cli.command {
        Some(Command::Seed) => {
            let seed = DemoSeed::default();
            app.seed_demo(&seed).await?;
            info!(
                admin = %seed.admin_id,
                learner = %seed.learner_id,
                course = %seed.course_id,
                "demo data written"
            );
        }
        Some(Command::Serve) | None => serve(app, cli.listen).await?,
    }
    Ok(())
}

async fn serve(app: AppServices, listen: SocketAddr) -> anyhow::Result<()> {
    let router = build_router(app);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("lmsd listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
