use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use profast::app;
use profast::domain::{pricing, regions, ParcelType, TRACKING_STEPS};
use profast::infra::{
    api::ApiClient,
    identity::{Anonymous, StaticToken, TokenSource},
};
use profast::util::{
    persistence::{config_file, Config},
    version::VERSION_LABEL,
};

const ENV_ID_TOKEN: &str = "PROFAST_ID_TOKEN";

#[derive(Parser)]
#[command(name = "profast")]
#[command(about = "ProFast parcel desk", version = VERSION_LABEL)]
struct Cli {
    /// Backend base URL; overrides the saved config and environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Price a parcel without booking it.
    Quote {
        #[arg(long = "type", default_value = "non-document")]
        parcel_type: ParcelType,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Look a parcel up by tracking code or id.
    Track { code: String },
    /// Resolve the role of an account.
    Role { email: String },
    /// Show the effective configuration, optionally saving it.
    Config {
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("profast=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    match cli.command {
        Command::Quote {
            parcel_type,
            weight,
            from,
            to,
        } => {
            for region in [&from, &to] {
                if !regions::is_known_region(region) {
                    bail!("unknown region `{region}`; expected one of {}", regions::REGIONS.join(", "));
                }
            }
            let quote = pricing::quote(parcel_type, weight, &from, &to);
            println!("{parcel_type} {from} -> {to}");
            println!("  base               {:>5} Tk", quote.base);
            if quote.extra_kg > 0 {
                println!(
                    "  extra weight       {:>5} Tk ({} kg)",
                    quote.extra_weight_cost, quote.extra_kg
                );
            }
            if quote.cross_region_surcharge > 0 {
                println!("  outside region     {:>5} Tk", quote.cross_region_surcharge);
            }
            println!("  total              {:>5} Tk", quote.total);
        }
        Command::Track { code } => {
            let api = client(&config)?;
            let tracking = app::track_parcel(&api, &code)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            let parcel = &tracking.parcel;
            println!("{} ({})", parcel.tracking_number, parcel.title);
            println!(
                "  {} -> {}  status: {}  payment: {:?}",
                parcel.sender_region, parcel.receiver_region, parcel.status, parcel.payment_status
            );
            match tracking.step {
                Some(current) => {
                    for (index, step) in TRACKING_STEPS.iter().enumerate() {
                        let mark = if index <= current { "x" } else { " " };
                        println!("  [{mark}] {}", step.label);
                    }
                }
                None => println!("  parcel was cancelled"),
            }
        }
        Command::Role { email } => {
            let api = client(&config)?;
            let info = api
                .get_user_role(&email)
                .await
                .with_context(|| format!("resolving role for {email}"))?;
            println!("{} is {}", info.email, info.role);
        }
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = config.save().context("saving config")?;
                println!("saved to {}", path.display());
            } else if let Some(path) = config_file() {
                println!("config file: {}", path.display());
            }
        }
    }

    Ok(())
}

fn client(config: &Config) -> Result<ApiClient> {
    let tokens: Arc<dyn TokenSource> = match std::env::var(ENV_ID_TOKEN) {
        Ok(token) if !token.trim().is_empty() => Arc::new(StaticToken(token)),
        _ => Arc::new(Anonymous),
    };
    ApiClient::from_config(config, tokens).context("building API client")
}
