use std::{process, sync::Arc, time::Duration};

use quire::{
    application::{
        api_keys::{ApiKeyService, IssueApiKeyCommand},
        endpoints::{AdminApi, AdminDeps},
        error::AppError,
        repos::{
            ApiKeysRepo, MembersRepo, PostsRepo, SettingUpdate, SettingsRepo, UsersRepo,
        },
        route_settings::{RouteSettings, content_hash},
        settings::key_updates::KeyUpdateTokens,
    },
    cache::{CacheConfig, CacheConsumer, CacheTrigger, EventQueue},
    config,
    domain::{routes::validate_routes, settings::ROUTES_HASH},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, ApiState, RouterState},
        mailer::LoggingMailer,
        stripe::HttpStripeGateway,
        telemetry,
        uploads::UploadStaging,
    },
};
use serde_json::json;
use time::OffsetDateTime;
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckRoutes(args) => run_check_routes(args).await,
        config::Command::IssueApiKey(args) => run_issue_api_key(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let routes = RouteSettings::new(settings.routes.directory.clone());
    sync_routes_hash(&routes, repositories.as_ref()).await;

    let cache_trigger = build_cache_trigger(&settings)?;
    let api_state = build_api_state(&settings, repositories.clone(), routes, cache_trigger.clone())?;

    let cache_handle = if cache_trigger.config().is_enabled() {
        let trigger = cache_trigger.clone();
        let interval_ms = trigger.config().auto_consume_interval_ms;
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                trigger.consumer().consume().await;
            }
        }))
    } else {
        None
    };

    let router_state = RouterState {
        api: api_state,
        health: repositories,
    };
    let result = serve_http(&settings, router_state).await;

    if let Some(handle) = cache_handle {
        handle.abort();
        let _ = handle.await;
    }
    // Flush whatever the last requests queued.
    cache_trigger.consumer().consume().await;

    result
}

async fn run_check_routes(args: config::CheckRoutesArgs) -> Result<(), AppError> {
    let contents = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    validate_routes(&contents)?;

    let hash = content_hash(&contents);
    info!(
        target = "quire::check_routes",
        file = %args.file.display(),
        hash = %hash,
        "routes file is valid"
    );
    println!("{hash}");
    Ok(())
}

async fn run_issue_api_key(
    settings: config::Settings,
    args: config::IssueApiKeyArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let api_keys_repo: Arc<dyn ApiKeysRepo> = repositories;
    let service = ApiKeyService::new(api_keys_repo);

    let expires_at = args
        .expires_in_days
        .map(|days| OffsetDateTime::now_utc() + time::Duration::days(i64::from(days)));
    let issued = service
        .issue(IssueApiKeyCommand {
            name: args.name,
            integration_id: args.integration_id.unwrap_or_else(Uuid::new_v4),
            expires_at,
        })
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    info!(
        target = "quire::issue_api_key",
        key_id = %issued.record.id,
        integration_id = %issued.record.integration_id,
        prefix = %issued.record.prefix,
        "api key issued"
    );
    println!("{}", issued.token);
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

/// Record the hash of the routes file present at boot.
async fn sync_routes_hash(routes: &RouteSettings, settings_repo: &dyn SettingsRepo) {
    let hash = match routes.get_current_hash().await {
        Ok(hash) => hash,
        Err(err) => {
            warn!(
                target = "quire::serve",
                error = %err,
                "routes file could not be read at startup"
            );
            return;
        }
    };

    let update = SettingUpdate {
        key: ROUTES_HASH.to_string(),
        value: json!(hash),
    };
    if let Err(err) = settings_repo.edit_batch(&[update]).await {
        warn!(
            target = "quire::serve",
            error = %err,
            "routes hash could not be stored"
        );
    }
}

fn build_cache_trigger(settings: &config::Settings) -> Result<CacheTrigger, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let queue = Arc::new(EventQueue::new());
    let consumer = CacheConsumer::new(cache_config.clone(), queue.clone()).map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "cache purge client could not be built: {err}"
        )))
    })?;
    Ok(CacheTrigger::new(cache_config, queue, Arc::new(consumer)))
}

fn build_api_state(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    routes: RouteSettings,
    cache: CacheTrigger,
) -> Result<ApiState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let settings_repo: Arc<dyn SettingsRepo> = repositories.clone();
    let members_repo: Arc<dyn MembersRepo> = repositories.clone();
    let api_keys_repo: Arc<dyn ApiKeysRepo> = repositories;

    let stripe = HttpStripeGateway::from_settings(&settings.stripe).map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "stripe client could not be built: {err}"
        )))
    })?;
    let validity = time::Duration::try_from(settings.key_verification.validity)
        .map_err(|err| AppError::validation(format!("key verification validity: {err}")))?;

    let admin = AdminApi::new(AdminDeps {
        posts: posts_repo,
        users: users_repo,
        settings: settings_repo,
        members: members_repo,
        stripe: Arc::new(stripe),
        mailer: Arc::new(LoggingMailer::new(settings.site.url.clone())),
        key_tokens: Arc::new(KeyUpdateTokens::new(validity)),
        routes,
        site_url: settings.site.url.clone(),
    });

    let rate_limiter = Arc::new(ApiRateLimiter::new(
        Duration::from_secs(u64::from(settings.api_rate_limit.window_seconds.get())),
        settings.api_rate_limit.max_requests.get(),
    ));
    let max_request_bytes = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes exceeds address space"))?;

    Ok(ApiState {
        admin,
        api_keys: Arc::new(ApiKeyService::new(api_keys_repo)),
        rate_limiter,
        uploads: UploadStaging::new(
            settings.uploads.staging_directory.clone(),
            settings.uploads.max_request_bytes.get(),
        ),
        cache,
        trusted_user_header: settings.auth.trusted_user_header.clone(),
        max_request_bytes,
    })
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "quire::serve",
        addr = %settings.server.addr,
        "admin api listening"
    );

    let grace = settings.server.graceful_shutdown;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(grace))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(target = "quire::serve", error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(target = "quire::serve", error = %err, "sigterm handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        target = "quire::serve",
        grace_seconds = grace.as_secs(),
        "shutdown requested, draining connections"
    );
    // Hard stop if in-flight requests do not drain in time.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(target = "quire::serve", "graceful shutdown timed out");
        process::exit(1);
    });
}
