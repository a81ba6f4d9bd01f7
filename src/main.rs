use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use site_presence::config::Config;
use site_presence::db::init_db;
use site_presence::docs::ApiDoc;
use site_presence::engine::Engine;
use site_presence::routes::{self, Limiters};

#[get("/")]
async fn index() -> impl Responder {
    "Site presence service is up"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let engine = match &config.database_url {
        Some(url) => {
            let pool = init_db(url).await?;
            Engine::mysql(pool, config.ledger_lock_timeout).await
        }
        None => {
            warn!("DATABASE_URL not set, zones and attendance are kept in memory only");
            Engine::in_memory(config.ledger_lock_timeout).await
        }
    }
    .context("failed to start the attendance engine")?;

    let limiters = Limiters::from_config(&config)?;
    let server_addr = config.server_addr.clone();
    let engine_data = Data::new(engine.clone());
    let config_data = Data::new(config.clone());

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard so the JS/CSS assets resolve
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(engine_data.clone())
            .app_data(config_data.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config, &limiters))
    })
    .bind(&server_addr)
    .with_context(|| format!("failed to bind {}", server_addr))?
    .run()
    .await?;

    // let queued audit entries reach the sink before exit
    engine.audit.flush().await;
    info!("Server stopped");
    Ok(())
}
