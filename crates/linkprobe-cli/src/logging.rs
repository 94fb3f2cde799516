//! Logging setup
//!
//! Events go to stderr so stdout only carries results. The level comes from
//! `RUST_LOG`, defaulting to INFO, or DEBUG with `--verbose`.

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
};

pub fn init(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
