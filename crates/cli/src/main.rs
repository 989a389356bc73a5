//! `delaywatch`: command-line client for the Delay Watch API.

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::ApiClient;

#[derive(Parser)]
#[command(name = "delaywatch")]
#[command(about = "Start and control delivery delay monitors", long_about = None)]
#[command(version)]
struct Cli {
    /// Base URL of the Delay Watch API
    #[arg(long, env = "DELAYWATCH_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring a delivery
    Start {
        /// Delivery identifier (alphanumeric, dash, underscore only)
        #[arg(long)]
        delivery_id: String,

        /// Route start address
        #[arg(long)]
        origin: String,

        /// Route end address
        #[arg(long)]
        destination: String,

        /// Recipient of delay notifications
        #[arg(long)]
        email: String,

        /// Delay in minutes at which to notify
        #[arg(long, default_value_t = 30)]
        threshold: i64,

        /// Growth in minutes required before notifying again
        #[arg(long, default_value_t = 10)]
        delta: i64,
    },

    /// Show one monitor's status
    Status { instance_id: String },

    /// List all monitors
    List,

    /// Wait the given number of minutes before the next check
    Snooze { instance_id: String, minutes: f64 },

    /// Tell a monitor the delivery took a new route
    RouteRestarted { instance_id: String },

    /// Check traffic now instead of waiting
    CheckNow { instance_id: String },

    /// Stop a monitor
    Cancel { instance_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delaywatch=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let api = ApiClient::new(&cli.api_url);

    let data = match cli.command {
        Commands::Start {
            delivery_id,
            origin,
            destination,
            email,
            threshold,
            delta,
        } => {
            let body = json!({
                "delivery_id": delivery_id,
                "origin": origin,
                "destination": destination,
                "recipient_email": email,
                "threshold_minutes": threshold,
                "notify_delta_minutes": delta,
            });
            api.post("/monitors", Some(body)).await?
        }
        Commands::Status { instance_id } => api.get(&format!("/monitors/{instance_id}")).await?,
        Commands::List => api.get("/monitors").await?,
        Commands::Snooze {
            instance_id,
            minutes,
        } => {
            api.post(
                &format!("/monitors/{instance_id}/snooze"),
                Some(json!({ "minutes": minutes })),
            )
            .await?
        }
        Commands::RouteRestarted { instance_id } => {
            api.post(&format!("/monitors/{instance_id}/route-restarted"), None)
                .await?
        }
        Commands::CheckNow { instance_id } => {
            api.post(&format!("/monitors/{instance_id}/check-now"), None)
                .await?
        }
        Commands::Cancel { instance_id } => {
            api.post(&format!("/monitors/{instance_id}/cancel"), None)
                .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn start_uses_default_threshold_and_delta() {
        let cli = Cli::try_parse_from([
            "delaywatch",
            "start",
            "--delivery-id",
            "order-1",
            "--origin",
            "Leeds",
            "--destination",
            "York",
            "--email",
            "ops@example.com",
        ])
        .unwrap();

        match cli.command {
            Commands::Start {
                threshold, delta, ..
            } => {
                assert_eq!(threshold, 30);
                assert_eq!(delta, 10);
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn snooze_takes_fractional_minutes() {
        let cli = Cli::try_parse_from(["delaywatch", "snooze", "delivery-a-2026-10-19", "7.5"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Snooze { minutes, .. } if minutes == 7.5
        ));
    }

    #[test]
    fn api_url_flag_overrides_default() {
        let cli = Cli::try_parse_from([
            "delaywatch",
            "--api-url",
            "http://monitor.internal:8080",
            "list",
        ])
        .unwrap();
        assert_eq!(cli.api_url, "http://monitor.internal:8080");
    }

    #[test]
    fn subcommands_use_kebab_case() {
        assert!(Cli::try_parse_from(["delaywatch", "route-restarted", "id"]).is_ok());
        assert!(Cli::try_parse_from(["delaywatch", "check-now", "id"]).is_ok());
    }
}
