mod alerts;
mod database;
mod error;
mod handlers;
mod middleware;
mod models;
mod reconcile;
mod utils;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::env;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::TraceLayer,
};
use dotenvy::dotenv;

use database::{create_database_pool, run_migrations, Database};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    // Initialize database
    let database_url = env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set");

    let db = create_database_pool(&database_url).await
        .expect("Failed to connect to database");

    run_migrations(&db).await
        .expect("Failed to run database migrations");

    // Daily calendar reminders
    alerts::spawn_alert_scheduler(db.clone());

    // Build the application router
    let app = create_router(db);

    // Get port from environment or use default
    let port = env::var("PORT").unwrap_or_else(|_| "4000".to_string());
    let addr = format!("0.0.0.0:{}", port);

    log::info!("finbook server starting on http://{}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn create_router(db: Database) -> Router {
    Router::new()
        // Auth routes
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/create-user", post(handlers::auth::create_user))
        .route("/api/auth/users", get(handlers::auth::list_users))
        .route("/api/auth/users/:id", delete(handlers::auth::delete_user))

        // Category routes
        .route("/api/categories/expense-category", get(handlers::categories::expense_categories))
        .route("/api/categories/income-category", get(handlers::categories::income_categories))
        .route("/api/categories/expense/add", post(handlers::categories::create_expense_category))
        .route("/api/categories/income/add", post(handlers::categories::create_income_category))
        .route("/api/categories/expense/:id", put(handlers::categories::update_expense_category))
        .route("/api/categories/expense/:id", delete(handlers::categories::delete_expense_category))
        .route("/api/categories/income/:id", put(handlers::categories::update_income_category))
        .route("/api/categories/income/:id", delete(handlers::categories::delete_income_category))

        // Transaction routes
        .route("/api/transactions/add-expense", post(handlers::transactions::add_expense))
        .route("/api/transactions/add-approval", post(handlers::transactions::add_approval))
        .route("/api/transactions/add-income", post(handlers::transactions::add_income))
        .route("/api/transactions/edit-expense", post(handlers::transactions::edit_expense))
        .route("/api/transactions/expenses-transactions", get(handlers::transactions::get_all_expenses))
        .route("/api/transactions/income-transactions", get(handlers::transactions::get_all_income))
        .route("/api/transactions/summary", get(handlers::transactions::get_summary))
        .route("/api/transactions/last-month-summary", get(handlers::transactions::get_last_month_summary))
        .route("/api/transactions/approvals", get(handlers::transactions::get_approvals))
        .route("/api/transactions/approve-expense", post(handlers::transactions::approve_expense))
        .route("/api/transactions/reject-expense", post(handlers::transactions::reject_expense))
        .route("/api/transactions/expenses-paginated", get(handlers::transactions::get_expenses_paginated))
        .route("/api/transactions/income-paginated", get(handlers::transactions::get_income_paginated))
        .route("/api/transactions/user-all-expenses", get(handlers::transactions::get_user_all_expenses))
        .route("/api/transactions/delete-expense/:id", delete(handlers::transactions::delete_expense))

        // Wallet routes
        .route("/api/wallet/add-wallet", post(handlers::wallet::add_wallet))
        .route("/api/wallet/wallet/:user_id", get(handlers::wallet::get_wallet_entries))
        .route("/api/wallet/wallet-paginated/:user_id", get(handlers::wallet::get_wallet_paginated))
        .route("/api/wallet/wallet-details", get(handlers::wallet::get_wallet_details))
        .route("/api/wallet/all-wallet-transactions", get(handlers::wallet::get_all_wallet_transactions))
        .route("/api/wallet/vendors", get(handlers::wallet::get_vendors))
        .route("/api/wallet/add-vendor", post(handlers::wallet::add_vendor))

        // Calendar routes
        .route("/api/calendar/add-event", post(handlers::calendar::add_event))
        .route("/api/calendar/events", get(handlers::calendar::get_events))
        .route("/api/calendar/event/:id", get(handlers::calendar::get_event_by_id))
        .route("/api/calendar/event/:id", put(handlers::calendar::update_event))
        .route("/api/calendar/event/:id", delete(handlers::calendar::delete_event))
        .route("/api/calendar/event/:id/move-next-day", post(handlers::calendar::move_to_next_day))
        .route("/api/calendar/event/:id/move-next-month", post(handlers::calendar::move_to_next_month))
        .route("/api/calendar/event/:id/complete", post(handlers::calendar::mark_event_completed))
        .route("/api/calendar/pending-alerts", get(handlers::calendar::get_pending_alerts))
        .route("/api/calendar/alert/:id/mark-sent", post(handlers::calendar::mark_alert_sent))
        .route("/api/calendar/events-by-date", get(handlers::calendar::get_events_by_date_range))
        .route("/api/calendar/search", get(handlers::calendar::search_events))

        // Health check
        .route("/health", get(handlers::health))

        // Uploaded invoices
        .nest_service("/uploads", ServeDir::new("uploads"))

        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB
        )
        .with_state(db)
}
