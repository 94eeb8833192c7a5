mod analysis;
mod analysis_prompt;
mod browser;
mod command;
mod config;
mod gemini;
mod logging;
mod opportunity_chart;
mod opportunity_table;
mod price_feed;
mod state;
mod tui;

use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tokio::sync::broadcast;
use tokio::task;
use tracing::{info, warn};

use crate::analysis::Analyzer;
use crate::command::Command;
use crate::gemini::GeminiClient;
use crate::price_feed::PriceFeed;
use crate::state::AppState;
use crate::tui::TuiApp;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let param = config::CliParams::parse();
    logging::init(&param.log_file, &param.log_level)?;
    info!(
        model = %param.model,
        niche = %param.niche,
        csv = ?param.csv,
        "starting prestake analyst"
    );

    let (tx, mut rx) = broadcast::channel::<Command>(32);

    match PriceFeed::new(param.price_feed_config(), tx.clone()) {
        Ok(feed) => {
            task::spawn(async move { feed.refresh_once().await });
        }
        Err(err) => warn!(error = %format!("{err:#}"), "price feed unavailable, using fallback"),
    }

    let client = GeminiClient::new(&param.gemini_config())?;
    let analyzer = Arc::new(Analyzer::new(Arc::new(client)));
    let state = AppState::new(
        param.initial_niche(),
        param.initial_api_key(),
        param.fallback_price(),
    );

    let mut app = TuiApp::new(state, analyzer, tx.clone());
    app.start(param.csv.clone());
    let app_result = tokio::select! {
        result = app.run(&mut rx) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };
    let _ = tx.send(Command::Exit);
    app.dispose();
    info!("prestake analyst stopped");
    app_result.map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}
