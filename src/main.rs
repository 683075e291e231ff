use std::sync::Arc;
use std::time::Duration;

use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };
use unifarm::{ AppError, Config, Result };

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "unifarm=debug,tower_http=debug".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| AppError::Config(e.to_string()))?;

    tracing::info!(
        interval_secs = config.accrual.interval_secs,
        referral_levels = config.referral.max_levels,
        boost_packages = config.boost_packages.len(),
        "Starting unifarm ledger"
    );

    // Initialize database connection
    let db = sea_orm::Database::connect(&config.database_url).await.map_err(AppError::Database)?;

    tracing::info!("Database connected successfully");

    // Run migrations
    migration::Migrator::up(&db, None).await.map_err(AppError::Database)?;

    tracing::info!("Migrations completed successfully");

    // Initialize repositories
    let users = Arc::new(unifarm::db::UserRepository::new(db.clone()));
    let transaction_rows = Arc::new(unifarm::db::TransactionRepository::new(db.clone()));

    // Initialize services
    let notifier: Arc<dyn unifarm::notifier::BalanceNotifier> = Arc::new(
        unifarm::notifier::TracingNotifier
    );

    let balance_manager = Arc::new(unifarm::services::BalanceManager::new(users.clone()));

    let transaction_service = Arc::new(
        unifarm::services::TransactionService::new(
            db.clone(),
            users.clone(),
            transaction_rows.clone(),
            balance_manager.clone(),
            notifier
        )
    );

    let referral_service = Arc::new(
        unifarm::services::ReferralService::new(
            users.clone(),
            transaction_rows.clone(),
            transaction_service.clone(),
            config.referral.clone()
        )
    );

    let farming_service = Arc::new(
        unifarm::services::FarmingService::new(
            db.clone(),
            users.clone(),
            transaction_service.clone(),
            referral_service.clone(),
            config.accrual.clone()
        )
    );

    let wallet_service = Arc::new(
        unifarm::services::WalletService::new(
            db.clone(),
            users.clone(),
            transaction_service.clone(),
            config.boost_packages.clone(),
            config.withdrawal_fee_ton,
            config.accrual.uni_daily_rate
        )
    );

    let user_service = Arc::new(unifarm::services::UserService::new(db.clone(), users.clone()));

    let reconciliation_service = Arc::new(
        unifarm::services::ReconciliationService::new(users.clone(), transaction_rows)
    );

    // Start accrual scheduler
    let scheduler = Arc::new(
        unifarm::scheduler::AccrualScheduler::new(
            users,
            farming_service,
            Duration::from_secs(config.accrual.interval_secs)
        )
    );
    let scheduler_handle = scheduler.start();

    // Create app state
    let app_state = unifarm::api::AppState::new(
        user_service,
        wallet_service,
        balance_manager,
        transaction_service,
        reconciliation_service,
        referral_service
    );

    // Build application router
    let app = unifarm::api::router(app_state, Duration::from_secs(config.request_timeout_secs));

    // Start server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener
        ::bind(&addr).await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    axum::serve(listener, app).await.map_err(|e| AppError::Internal(e.to_string()))?;

    scheduler_handle.abort();

    Ok(())
}
