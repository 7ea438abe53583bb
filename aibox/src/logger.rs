use std::io::IsTerminal;
use std::str::FromStr;

use config::{EnvConfig, LogFormat};
use logforth::{
    append::Stdout,
    filter::EnvFilter,
    layout::{JsonLayout, TextLayout},
};

/// Initialize logging from the gateway configuration: level from
/// `AIBOX_LOG_LEVEL`, output shape from `AIBOX_LOG_FORMAT`.
pub(super) fn init(config: &EnvConfig) {
    let filter = env_filter(&config.log_level);

    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(filter);

            match config.log_format {
                LogFormat::Json => d.append(Stdout::default().with_layout(JsonLayout::default())),
                LogFormat::Text if std::io::stdout().is_terminal() => {
                    d.append(Stdout::default().with_layout(TextLayout::default()))
                }
                LogFormat::Text => d.append(Stdout::default().with_layout(TextLayout::default().no_color())),
            }
        })
        .apply();
}

fn env_filter(level: &str) -> EnvFilter {
    let level = match level.to_ascii_lowercase().as_str() {
        known @ ("off" | "error" | "warn" | "info" | "debug" | "trace") => known.to_string(),
        other => {
            // The logger is not up yet, so the fallback warning goes to
            // stderr directly.
            eprintln!("invalid AIBOX_LOG_LEVEL '{other}', falling back to info");
            "info".to_string()
        }
    };

    if level == "off" {
        return EnvFilter::from_str("off").expect("'off' is a valid env filter");
    }

    // Default other crates to 'warn', use the selected level for
    // workspace crates.
    let filter = format!(
        "warn,aibox={level},server={level},config={level},kv={level},auth={level},tenant={level},llm={level},rag={level}"
    );

    EnvFilter::from_str(&filter).expect("constructed filters are valid")
}
