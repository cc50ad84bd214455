//! # Declaration Controller
//!
//! A Kubernetes controller that keeps an external key/value target
//! environment in sync with `Declaration` resources.
//!
//! ## Overview
//!
//! For every `Declaration` the controller:
//!
//! 1. **Registers a finalizer** before anything is created in the target
//! 2. **Validates** the desired state (the same rules `/validate` applies at admission)
//! 3. **Converges** the target incrementally from the last applied snapshot
//! 4. **Records status**: conditions, observed target attributes, failure history
//! 5. **Cleans up** every owned entry on deletion, then releases the finalizer
//!
//! Failed passes are retried with exponential backoff derived from the
//! failure count persisted in status.

use anyhow::Result;
use declaration_controller::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;

    watch_loop::run_watch_loop(
        init.declarations,
        init.reconciler,
        init.server_state,
        &init.config,
    )
    .await
}
