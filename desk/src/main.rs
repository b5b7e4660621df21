use crate::cfg::Config;
use anyhow::Result;
use hmsession::{Credentials, FileStorage, HttpProfileApi, Session};
use std::sync::Arc;
use tracing::{info, warn, Level};

//--------------------------------------------------------------------------------------------------

mod cfg;
mod report;

//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Load config
    let cfg: Config = config::Config::builder()
        .add_source(config::File::with_name("desk").required(false))
        .add_source(config::File::with_name("desk.local").required(false))
        .add_source(config::Environment::with_prefix("HMS").separator("__"))
        .build()?
        .try_deserialize()?;

    // Initialize tracing
    let mut fmt_sub = tracing_subscriber::fmt();
    if cfg.debug {
        fmt_sub = fmt_sub.with_max_level(Level::DEBUG);
    } else {
        fmt_sub = fmt_sub.with_max_level(Level::INFO);
    }
    fmt_sub.init();

    // Wire the session to its storage and the API
    let storage = FileStorage::new(&cfg.storage_path);
    let api = HttpProfileApi::new(
        cfg.session.api_base_url.clone(),
        cfg.session.request_timeout(),
    )?;
    let session = Session::builder(Arc::new(storage), Arc::new(api))
        .navigator(Arc::new(|login_path: &str| {
            warn!("Sign in required, open {}", login_path)
        }))
        .config(cfg.session)
        .build();

    // Rehydrate, falling back to configured credentials
    info!("Using session store {}", cfg.storage_path);
    session.start().await;
    if !session.is_logged_in() {
        if let (Some(email), Some(password)) = (cfg.email, cfg.password) {
            if let Err(err) = session
                .login_with_credentials(Credentials::new(email, password))
                .await
            {
                warn!("Login failed: {}", err);
            }
        }
    }

    // Report transitions until interrupted
    let mut states = session.subscribe();
    info!("{}", report::describe(&states.borrow_and_update()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = report::describe(&states.borrow_and_update());
                info!("{}", line);
                if session.is_expiring_soon() {
                    warn!("Token expires soon, sign in again to keep working");
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    session.shutdown();
    Ok(())
}

//--------------------------------------------------------------------------------------------------
