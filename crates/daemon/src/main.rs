// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardend: the warden init/service supervisor.

use tracing_subscriber::EnvFilter;
use warden_daemon::lifecycle::{self, Config};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("wardend: cannot build runtime: {err}");
            std::process::exit(1);
        }
    };

    // run() only returns when startup itself is impossible; once
    // supervising, the daemon never exits voluntarily.
    if let Err(err) = runtime.block_on(lifecycle::run(Config::from_env())) {
        eprintln!("wardend: {err}");
        std::process::exit(1);
    }
}
