use std::fs;
use std::net::TcpListener;

use anyhow::Context;
use clap::Parser;
use codebox_gateway::backend_client::BackendClient;
use codebox_gateway::{config, server::Server};
use codebox_transport::BackendPool;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
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

    let pem = fs::read_to_string(&config.backend_rsa_public_key_path)
        .with_context(|| format!("reading backend rsa public key from {:?}", config.backend_rsa_public_key_path))?;
    let backend_public_key = RsaPublicKey::from_public_key_pem(&pem).context("parsing backend rsa public key")?;

    let pool = BackendPool::connect(&config.backend_addr, config.backend_pool_size, backend_public_key)
        .context("connecting to backend")?;
    let backend = BackendClient::new(pool);

    let listener = TcpListener::bind(&config.listen).with_context(|| format!("binding to {}", config.listen))?;
    info!(listen = %config.listen, backend = %config.backend_addr, "codebox-gateway starting");

    let server = Server::new(&backend, &config);
    server.serve(listener)
}
