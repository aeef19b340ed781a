use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::{
    Router,
    extract::{RawQuery, State},
    response::Html,
    routing::get,
};
use tracing::debug;

use headlamp_embed::{EmbedFrame, ReadinessPoller, loading_page};

use crate::config::Config;

#[derive(Clone)]
struct FrontendState {
    frame: Arc<EmbedFrame>,
    poller: Arc<ReadinessPoller>,
    refresh_secs: u64,
}

/// Page on the headlamp route that embeds the dashboard once it is healthy
pub fn router(config: &Config) -> Result<Router> {
    let route = &config.frontend.headlamp_route;
    if !route.starts_with('/') {
        bail!("frontend.headlamp_route must start with '/', got '{}'", route);
    }

    let origin = config.dashboard_origin()?;
    let poller = ReadinessPoller::new(&origin, &config.frontend.health_path, config.poll_interval())
        .context("Failed to build dashboard health client")?;
    let state = FrontendState {
        frame: Arc::new(EmbedFrame::new(origin).context("Invalid dashboard origin")?),
        poller: Arc::new(poller),
        refresh_secs: config.poll_interval().as_secs().max(1),
    };

    Ok(Router::new().route(route, get(embed_page)).with_state(state))
}

async fn embed_page(
    State(state): State<FrontendState>,
    RawQuery(query): RawQuery,
) -> Html<String> {
    if !state.poller.check().await {
        debug!(url = %state.poller.url(), "Dashboard not ready, serving loading page");
        return Html(loading_page(state.refresh_secs));
    }
    Html(state.frame.page(query.as_deref().unwrap_or("")))
}
