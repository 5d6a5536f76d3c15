//! Console session example
//!
//! Rehydrates a session from the environment, walks the role dashboards
//! through the route guard and prints the monitor status as it changes.
//!
//! Usage:
//!   SESSION_REFRESH_URL=http://localhost:5000/api/auth/refresh-token \
//!   ACCESS_TOKEN=... REFRESH_TOKEN=... USER_ROLE=teacher \
//!   cargo run --example console

use campus_session::{PersistedSession, Role, SessionConfig, SessionManager, TokenPair, User};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SessionConfig::from_env()?;

    let access_token = std::env::var("ACCESS_TOKEN").unwrap_or_default();
    let refresh_token = std::env::var("REFRESH_TOKEN").unwrap_or_default();
    let user_id = std::env::var("USER_ID").unwrap_or_else(|_| "1".to_string());
    let role = std::env::var("USER_ROLE").unwrap_or_else(|_| "admin".to_string());

    println!("=== Campus Session Example ===");
    println!("Refresh URL: {}", config.refresh_url);
    println!("Role: {}", role);
    println!();

    let manager = SessionManager::new(config)?;
    println!("✓ Session manager created (token monitor started)");

    let persisted = (!access_token.is_empty() && !refresh_token.is_empty()).then(|| PersistedSession {
        user: User {
            id: user_id,
            role,
            profile: Default::default(),
        },
        tokens: TokenPair::new(access_token, refresh_token),
    });
    manager.store().initialize(persisted);

    println!("Authenticated: {}", manager.store().is_authenticated());
    println!();

    for role in Role::ALL {
        let path = manager.config().landing_pages.for_role(role).to_string();
        let decision = manager.guard().check(&[role]).await;
        println!("{:<22} -> {:?}", path, decision);
    }
    println!();

    let mut status = manager.status();
    println!("Watching token status for 5 minutes (Ctrl+C to exit)");

    let watch = async {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            println!(
                "access valid: {:<5} ({:>5}s left)  refresh valid: {:<5} ({:>6}s left)",
                current.access_token_valid,
                current.time_until_access_expiry.as_secs(),
                current.refresh_token_valid,
                current.time_until_refresh_expiry.as_secs(),
            );
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(300), watch).await;

    manager.shutdown();
    println!();
    println!("Done!");

    Ok(())
}
