//! SIGINT/SIGTERM handling (spec §4.8). The handler only ever flips a flag;
//! the reactor is the one that notices it and drains in-flight work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::prelude::info;

pub fn install(shutdown: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|e| e.to_string().into())
}
