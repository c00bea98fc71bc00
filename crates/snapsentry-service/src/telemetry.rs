// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tracing subscriber setup.

use std::env;

use anyhow::anyhow;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initializes the global tracing subscriber.
///
/// `level` is the operator-supplied base level; directives from the `RUST_LOG` environment
/// variable are appended and take precedence. The `LOG_FORMAT` environment variable selects the
/// output format: `default`, `compact`, `pretty`, or `json`. Logs go to stderr so command output
/// stays clean.
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    let directive = format!(
        "{level},{}",
        env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default()
    );
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let layer = match env::var("LOG_FORMAT").ok().as_deref() {
        None | Some("default") => layer.boxed(),
        Some("compact") => layer.compact().boxed(),
        Some("pretty") => layer.pretty().boxed(),
        Some("json") => layer.json().boxed(),
        Some(other) => return Err(anyhow!("LOG_FORMAT '{other}' is not supported")),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(EnvFilter::new(directive)))
        .init();
    tracing::debug!("initialized global tracing subscriber");
    Ok(())
}
