// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber for host applications.
///
/// The filter comes from `RUST_LOG`, falling back to `info`.  Uses
/// `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(json: bool) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        fmt::fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt::fmt().with_env_filter(filter).try_init()
    };
    drop(result);
}
