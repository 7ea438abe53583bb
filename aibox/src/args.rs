use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "aibox", version, long_about = concat!("aibox AI gateway v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the gateway (the default when no subcommand is given).
    Serve,
    /// Probe a running gateway's health endpoint; exits non-zero when
    /// unhealthy.
    Healthcheck {
        /// Health endpoint to probe.
        #[arg(long, default_value = "http://127.0.0.1:50051/health")]
        url: String,
    },
    /// API-key operations against the configured KV store.
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// Mint a new API key and print it once.
    Issue {
        /// Client identifier.
        #[arg(long)]
        client_id: String,

        /// Human-readable label.
        #[arg(long)]
        client_name: Option<String>,

        /// Permissions to grant (admin, chat, chat_stream, files).
        #[arg(long, value_delimiter = ',', default_value = "chat")]
        permissions: Vec<String>,

        /// Requests per minute; zero means unlimited.
        #[arg(long, default_value_t = 0)]
        rpm: u32,

        /// Tokens per minute; zero means unlimited.
        #[arg(long, default_value_t = 0)]
        tpm: u64,

        /// Tenant to bind the key to.
        #[arg(long)]
        tenant_id: Option<String>,
    },
}
