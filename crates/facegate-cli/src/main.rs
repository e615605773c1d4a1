//! facegate — thin HTTP client for the facegated daemon.
//!
//! `sell` is the reference checkout flow: verify a face image, and only on
//! an Authenticated verdict submit the sold-item batch. The two calls are
//! not a transaction; a timeout on the inventory call is an *unknown*
//! outcome and is never retried (decrement is not idempotent).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate point-of-sale CLI")]
struct Cli {
    /// Base URL of the facegated daemon.
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current inventory and the audit log
    Status,
    /// (Re)initialize the verification engine and report model status
    Initialize,
    /// Verify a face image against the enrolled identity
    Verify {
        /// Path to an encoded image (PNG, JPEG, ...)
        image: PathBuf,
    },
    /// Checkout: verify, then decrement inventory iff authenticated
    Sell {
        /// Face image to authenticate with
        #[arg(long)]
        image: PathBuf,
        /// Items as sku=qty pairs
        #[arg(required = true)]
        items: Vec<String>,
        /// Timeout for the inventory call, in seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let body: Value = client
                .get(format!("{}/status", cli.server))
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Initialize => {
            let body: Value = client
                .get(format!("{}/initialize", cli.server))
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Verify { image } => {
            let verdict = verify_face(&client, &cli.server, &image).await?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Commands::Sell {
            image,
            items,
            timeout_secs,
        } => {
            let items = parse_items(&items)?;

            let verdict = verify_face(&client, &cli.server, &image).await?;
            let result = verdict["result"].as_str().unwrap_or_default();
            if result != "Authenticated" {
                bail!(
                    "not authenticated (label {}, confidence {}); inventory untouched",
                    verdict["label"],
                    verdict["confidence"]
                );
            }
            tracing::info!(label = %verdict["label"], "authenticated");

            let response = client
                .post(format!("{}/update-inventory", cli.server))
                .timeout(Duration::from_secs(timeout_secs))
                .json(&serde_json::json!({ "items_sold": items }))
                .send()
                .await;

            match response {
                Ok(res) if res.status().is_success() => {
                    let body: Value = res.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Ok(res) => {
                    let status = res.status();
                    let body = res.text().await.unwrap_or_default();
                    bail!("inventory update rejected ({status}): {body}");
                }
                Err(err) if err.is_timeout() => {
                    // The batch may or may not have been applied. Retrying
                    // would risk a double decrement; leave it to the
                    // operator to check /status.
                    bail!("inventory update timed out: outcome unknown, NOT retrying");
                }
                Err(err) => return Err(err).context("inventory update failed"),
            }
        }
    }

    Ok(())
}

async fn verify_face(
    client: &reqwest::Client,
    server: &str,
    image: &PathBuf,
) -> Result<Value> {
    let bytes = std::fs::read(image)
        .with_context(|| format!("reading image {}", image.display()))?;
    let part = reqwest::multipart::Part::bytes(bytes).file_name(
        image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string()),
    );
    let form = reqwest::multipart::Form::new().part("image", part);

    let res = client
        .post(format!("{server}/verify-face"))
        .multipart(form)
        .send()
        .await
        .context("daemon unreachable")?;

    let status = res.status();
    let body: Value = res.json().await.context("malformed daemon response")?;
    if !status.is_success() {
        bail!("verification failed ({status}): {}", body["error"]);
    }
    Ok(body)
}

fn parse_items(items: &[String]) -> Result<BTreeMap<String, i64>> {
    let mut parsed = BTreeMap::new();
    for item in items {
        let Some((sku, qty)) = item.split_once('=') else {
            bail!("invalid item '{item}': expected sku=qty");
        };
        let qty: i64 = qty
            .parse()
            .with_context(|| format!("invalid quantity in '{item}'"))?;
        parsed.insert(sku.to_string(), qty);
    }
    Ok(parsed)
}
