use std::fs;
use std::net::TcpListener;

use anyhow::Context;
use clap::Parser;
use codebox_backend::{config, server::Server, store::Database};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

fn main() -> anyhow::Result<()> {
    let args = config::Args::parse();
    let trace_level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(trace_level)
        .with_thread_ids(true)
        .with_target(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .init();

    let config = config::Config::from_args(args)?;

    let pem = fs::read_to_string(&config.rsa_private_key_path)
        .with_context(|| format!("reading rsa private key from {:?}", config.rsa_private_key_path))?;
    let rsa_private_key = RsaPrivateKey::from_pkcs8_pem(&pem).context("parsing rsa private key")?;

    let db = Database::open(&config.db_path, config.pepper.clone()).context("opening database")?;
    let listener = TcpListener::bind(&config.listen).with_context(|| format!("binding to {}", config.listen))?;
    info!(listen = %config.listen, "codebox-backend starting");

    let server = Server::new(db, rsa_private_key);
    server.serve(listener)
}
