use args::{Args, Command, KeysCommand};
use clap::Parser;
use config::EnvConfig;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration comes first: the logger itself is driven by
    // AIBOX_LOG_LEVEL and AIBOX_LOG_FORMAT.
    let env = match EnvConfig::from_env() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    logger::init(&env);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(env).await,
        Command::Healthcheck { url } => healthcheck(&url).await,
        Command::Keys { command } => keys(env, command).await,
    }
}

async fn serve(env: EnvConfig) -> anyhow::Result<()> {
    let state = match server::build_state(env).await {
        Ok(state) => state,
        Err(e) => {
            log::error!("failed to start: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::serve(state).await {
        log::error!("server failed: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

/// Exit code contract: 0 when the gateway reports healthy, non-zero
/// otherwise. Used as a container health probe.
async fn healthcheck(url: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => {
            println!("healthy");
            Ok(())
        }
        Ok(response) => {
            eprintln!("unhealthy: status {}", response.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("unhealthy: {e}");
            std::process::exit(1);
        }
    }
}

async fn keys(env: EnvConfig, command: KeysCommand) -> anyhow::Result<()> {
    let kv = kv::KvClient::connect(&env.redis)
        .await
        .map_err(|e| anyhow::anyhow!("KV store unreachable: {e}"))?;
    let store = auth::KeyStore::new(kv);

    match command {
        KeysCommand::Issue {
            client_id,
            client_name,
            permissions,
            rpm,
            tpm,
            tenant_id,
        } => {
            let permissions = permissions
                .iter()
                .map(|p| match p.as_str() {
                    "admin" => Ok(auth::Permission::Admin),
                    "chat" => Ok(auth::Permission::Chat),
                    "chat_stream" => Ok(auth::Permission::ChatStream),
                    "files" => Ok(auth::Permission::Files),
                    other => Err(anyhow::anyhow!("unknown permission '{other}'")),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let issued = store
                .issue(auth::IssueParams {
                    client_name: client_name.unwrap_or_else(|| client_id.clone()),
                    client_id,
                    permissions,
                    rate_limits: auth::RateLimits { rpm, tpm },
                    tenant_id,
                    expires_at: None,
                })
                .await
                .map_err(|e| anyhow::anyhow!("issuing key: {e}"))?;

            // The secret is only ever printed here.
            println!("{}", issued.key);
            eprintln!("key_id: {}", issued.key_id);

            Ok(())
        }
    }
}
