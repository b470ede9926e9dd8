//! Hirewire Client - command line entry point
//!
//! Runs one real-time session from environment configuration and logs every
//! change to the connection and the merged streams until Ctrl-C.
//!
//! Environment variables (besides those read by `RealtimeConfig::from_env`):
//! - `HIREWIRE_USER_ID`: identity of the signed-in user (required)
//! - `HIREWIRE_TOKEN`: bearer token for the broker and the REST API (required)

use std::sync::Arc;

use anyhow::Context;
use hirewire_client::{
    adapters::{badge_label, connection_indicator, conversation_list},
    ApiClient, AuthSession, Broker, RealtimeConfig, SessionSlot,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hirewire_client=debug")),
        )
        .init();

    let config = RealtimeConfig::from_env().context("invalid realtime configuration")?;
    let user_id = std::env::var("HIREWIRE_USER_ID").context("HIREWIRE_USER_ID is not set")?;
    let token = std::env::var("HIREWIRE_TOKEN").context("HIREWIRE_TOKEN is not set")?;

    let session = SessionSlot::new();
    session.login(AuthSession::new(user_id.clone(), token));
    let session = Arc::new(session);
    let api = Arc::new(ApiClient::new(config.api_base_url.clone(), session.clone()));

    let broker = Broker::new();
    broker.start(config, session, api).await?;
    if let Err(e) = broker.refresh_notifications().await {
        tracing::warn!("initial notification fetch failed: {}", e);
    }

    let mut status = broker.connection_status()?;
    let mut notifications = broker.notifications()?;
    let mut messages = broker.messages()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = status.changed() => {
                let indicator = connection_indicator(&status.borrow_and_update());
                tracing::info!(
                    state = indicator.label,
                    error = indicator.detail.as_deref().unwrap_or(""),
                    "connection"
                );
            }
            Ok(()) = notifications.changed() => {
                let view = notifications.borrow_and_update().clone();
                if let Some(error) = &view.error {
                    tracing::warn!("notifications failed to load: {}", error);
                }
                tracing::info!(
                    total = view.items.len(),
                    badge = %badge_label(view.unread_count),
                    "notifications"
                );
            }
            Ok(()) = messages.changed() => {
                let view = messages.borrow_and_update().clone();
                for row in conversation_list(&view, &user_id) {
                    tracing::info!(
                        partner = %row.partner_id,
                        unread = row.unread,
                        last = %row.last_message,
                        "conversation"
                    );
                }
            }
        }
    }

    tracing::info!("shutting down");
    broker.stop().await;
    Ok(())
}
