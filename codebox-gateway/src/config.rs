//! Process-wide gateway configuration (§6, §9 DESIGN NOTES).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, about = "The codebox session gateway")]
pub struct Args {
    #[clap(long, env = "CODEBOX_GATEWAY_LISTEN", default_value = "0.0.0.0:8765")]
    pub listen: String,

    #[clap(long, env = "CODEBOX_STORAGE_BASE", default_value = "./storage")]
    pub storage_base: PathBuf,

    #[clap(long, env = "CODEBOX_BACKEND_ADDR", default_value = "127.0.0.1:65432")]
    pub backend_addr: String,

    #[clap(long, env = "CODEBOX_BACKEND_RSA_PUBLIC_KEY", default_value = "keys/backend_public.pem")]
    pub backend_rsa_public_key_path: std::path::PathBuf,

    #[clap(long, env = "CODEBOX_BACKEND_POOL_SIZE", default_value_t = 3)]
    pub backend_pool_size: usize,

    #[clap(long, env = "CODEBOX_SANDBOX_IMAGE", default_value = "python_runner")]
    pub sandbox_image: String,

    #[clap(long, env = "CODEBOX_INNER_TIMEOUT_SECS", default_value_t = 60)]
    pub inner_timeout_secs: u64,

    #[clap(long, env = "CODEBOX_OUTER_TIMEOUT_SECS", default_value_t = 61)]
    pub outer_timeout_secs: u64,

    #[clap(long, env = "CODEBOX_INPUT_POLL_MS", default_value_t = 200)]
    pub input_poll_ms: u64,

    #[clap(short, long, action = clap::ArgAction::Count, help = "show more in logs, may be provided multiple times")]
    pub verbose: u8,
}

/// The immutable record threaded through the gateway once parsed from
/// [`Args`] (§9: "loaded once at startup into an immutable config record
/// and threaded explicitly").
pub struct Config {
    pub listen: String,
    pub storage_base: PathBuf,
    pub backend_addr: String,
    pub backend_rsa_public_key_path: std::path::PathBuf,
    pub backend_pool_size: usize,
    pub sandbox_image: String,
    pub inner_timeout: Duration,
    pub outer_timeout: Duration,
    pub input_poll_interval: Duration,
    pub verbose: u8,
}

impl Config {
    pub fn from_args(args: Args) -> anyhow::Result<Config> {
        anyhow::ensure!(
            args.outer_timeout_secs > args.inner_timeout_secs,
            "outer timeout must exceed inner timeout so the inner `timeout` has a chance to finish first"
        );
        Ok(Config {
            listen: args.listen,
            storage_base: args.storage_base,
            backend_addr: args.backend_addr,
            backend_rsa_public_key_path: args.backend_rsa_public_key_path,
            backend_pool_size: args.backend_pool_size,
            sandbox_image: args.sandbox_image,
            inner_timeout: Duration::from_secs(args.inner_timeout_secs),
            outer_timeout: Duration::from_secs(args.outer_timeout_secs),
            input_poll_interval: Duration::from_millis(args.input_poll_ms),
            verbose: args.verbose,
        })
    }
}
