//! Process-wide backend configuration (§6, §9 DESIGN NOTES: "loaded once
//! at startup into an immutable config record and threaded explicitly").

use std::path::PathBuf;

use anyhow::Context;
use base64::Engine;
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, about = "The codebox backend RPC server")]
pub struct Args {
    #[clap(long, env = "CODEBOX_BACKEND_LISTEN", default_value = "0.0.0.0:65432")]
    pub listen: String,

    #[clap(long, env = "CODEBOX_DB_PATH", default_value = "codebox.sqlite")]
    pub db_path: String,

    #[clap(long, env = "CODEBOX_PEPPER", help = "base64-encoded pepper bytes mixed into every password digest")]
    pub pepper_base64: String,

    #[clap(long, env = "CODEBOX_RSA_PRIVATE_KEY", default_value = "keys/backend_private.pem")]
    pub rsa_private_key_path: PathBuf,

    #[clap(short, long, action = clap::ArgAction::Count, help = "show more in logs, may be provided multiple times")]
    pub verbose: u8,
}

/// The immutable record threaded through the backend once parsed from
/// [`Args`].
pub struct Config {
    pub listen: String,
    pub db_path: String,
    pub pepper: Vec<u8>,
    pub rsa_private_key_path: PathBuf,
    pub verbose: u8,
}

impl Config {
    pub fn from_args(args: Args) -> anyhow::Result<Config> {
        let pepper = base64::engine::general_purpose::STANDARD
            .decode(&args.pepper_base64)
            .context("decoding CODEBOX_PEPPER as base64")?;
        Ok(Config {
            listen: args.listen,
            db_path: args.db_path,
            pepper,
            rsa_private_key_path: args.rsa_private_key_path,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_value() {
        // "pepper" base64-encoded
        let decoded = base64::engine::general_purpose::STANDARD.decode("cGVwcGVy").unwrap();
        assert_eq!(decoded, b"pepper".to_vec());
    }
}
