//! feed-relay — forwards new RSS/Atom entries to a Telegram chat.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌───────────┐  Config   ┌──────────┐  Candidate  ┌───────────┐
//! │ config.rs │ ────────► │ relay.rs │ ◄────────── │ filter.rs │ ◄── source/
//! └───────────┘           └──────────┘             └───────────┘
//!                           │      │
//!              is_new?/save │      │ send()
//!                           ▼      ▼
//!                   ┌──────────┐ ┌───────────┐
//!                   │ store.rs │ │ notify.rs │
//!                   └──────────┘ └───────────┘
//! ```
//!
//! * **`config`** — merges `sources.yml` with `$SOURCES_YML`, reads settings.
//! * **`source/`** — the `DataSource` trait and the HTTP feed source.
//! * **`filter`** — keyword matching; turns feed entries into candidates.
//! * **`store`** — link → title record of what was already pushed.
//! * **`notify`** — Telegram delivery with bounded rate-limit retry.
//! * **`relay`** — runs one poll cycle over all sources.
//!
//! The binary takes no arguments, runs a single cycle and exits.  Run it
//! from cron (or similar) to poll periodically.

mod config;
mod filter;
mod notify;
mod relay;
mod source;
mod store;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Settings;
use notify::Notifier;
use relay::Relay;
use store::DedupStore;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_relay=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .init();
}

fn main() -> Result<()> {
    // A missing .env is normal in CI, where variables come from secrets.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env();
    let config = config::load(&settings.config_path, settings.sources_override.as_deref())?;
    info!(sources = config.sources.len(), "configuration loaded");

    let store = DedupStore::load(&settings.state_path);
    if store.is_empty() {
        info!("record store is empty, every matching entry will be pushed");
    } else {
        info!(records = store.len(), "record store ready");
    }
    let notifier = Notifier::telegram(settings.credentials);

    let mut relay = Relay::new(config, store, notifier);
    relay.run();
    Ok(())
}
