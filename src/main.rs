//! Tailtray agent entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio::sync::{mpsc, RwLock};

mod client;
mod config;
mod console;
mod desktop;
mod handlers;
mod menu;
mod reconciler;
mod registry;
#[cfg(test)]
mod testing;
mod tray;
mod types;

use client::{CliClient, NetworkClient};
use config::Config;
use desktop::{Desktop, SystemDesktop};
use handlers::HandlerContext;
use menu::Menu;
use reconciler::Reconciler;
use tray::{HeadlessTray, Tray};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting tailtray with config: {:?}", cfg);

    // Presentation
    let headless = Arc::new(HeadlessTray::new());
    let tray: Arc<dyn Tray> = headless.clone();
    let (menu, activations) = Menu::build(&tray);

    // External collaborators
    let client: Arc<dyn NetworkClient> =
        Arc::new(CliClient::new(cfg.cli_path.clone(), cfg.elevate_path.clone()));
    let desktop: Arc<dyn Desktop> = Arc::new(SystemDesktop::from_config(&cfg));

    let (reconcile, triggers) = reconciler::trigger_channel();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let ctx = HandlerContext {
        client,
        desktop,
        reconcile,
        self_address: Arc::new(RwLock::new(None)),
        shutdown: shutdown_tx,
        admin_url: cfg.admin_url.clone(),
    };

    // Fixed menu listeners
    let privileged = which::which(&cfg.elevate_path).is_ok();
    let _listeners = handlers::spawn_fixed(&ctx, &menu, activations, privileged);

    // Reconciliation loop
    let reconciler = Reconciler::new(menu, Arc::clone(&tray), ctx);
    let reconciler_handle = tokio::spawn(reconciler.run(cfg.poll_interval(), triggers));

    // Console
    let console_handle = cfg.console.then(|| {
        let headless = Arc::clone(&headless);
        tokio::spawn(async move {
            if let Err(e) = console::run(headless).await {
                error!("Console failed: {}", e);
            }
        })
    });

    // Graceful Shutdown
    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        },
        _ = shutdown_rx.recv() => info!("Exit selected, shutting down..."),
    }

    // Close every activation channel, then stop the loops
    tray.close();
    reconciler_handle.abort();
    if let Some(handle) = console_handle {
        handle.abort();
    }

    info!("Shutdown complete.");
    if cfg.console {
        // a pending stdin read cannot be cancelled and would hold the runtime open
        std::process::exit(0);
    }
    Ok(())
}
