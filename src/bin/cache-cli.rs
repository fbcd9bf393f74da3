use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use url::Url;

#[derive(Parser)]
#[command(name = "cache-cli")]
#[command(about = "Inspect and seed the wayback-proxy cache", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://127.0.0.1:8889")]
    admin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cached response for a URL
    Get {
        url: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
    },
    /// Insert a response body for a URL
    Put {
        url: String,
        /// File holding the response body.
        #[arg(short, long)]
        body: PathBuf,
        #[arg(short, long, default_value_t = 200)]
        code: u16,
        #[arg(long, default_value = "text/html")]
        content_type: String,
        /// Snapshot time in seconds since the epoch (wayback caches).
        #[arg(short, long)]
        timestamp: Option<i64>,
    },
    /// List snapshot times stored for a URL
    Versions {
        url: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = Url::parse(&cli.admin)?;

    match cli.command {
        Commands::Get { url, method } => {
            let target = Url::parse(&url)?;
            let endpoint = Url::parse_with_params(
                base.join("cache")?.as_str(),
                &[("url", target.as_str()), ("method", method.as_str())],
            )?;
            let res = client.get(endpoint).send().await?;
            let status = res.status();
            for (name, value) in res.headers() {
                eprintln!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
            let body = res.text().await?;
            if !status.is_success() {
                eprintln!("Status: {}", status);
            }
            println!("{}", body);
        }
        Commands::Put {
            url,
            body,
            code,
            content_type,
            timestamp,
        } => {
            let target = Url::parse(&url)?;
            let content = tokio::fs::read_to_string(&body).await?;
            let mut entry = json!({
                "request": {"method": "GET", "url": target.as_str()},
                "response": {
                    "url": target.as_str(),
                    "code": code,
                    "headers": {"Content-Type": content_type},
                    "body": content,
                },
            });
            if let Some(ts) = timestamp {
                entry["wayback"] = json!({ "timestamp": ts });
            }
            let res = client.post(base.join("cache")?).json(&entry).send().await?;
            print_response(res).await?;
        }
        Commands::Versions { url, method } => {
            let target = Url::parse(&url)?;
            let endpoint = Url::parse_with_params(
                base.join("cache/versions")?.as_str(),
                &[("url", target.as_str()), ("method", method.as_str())],
            )?;
            let res = client.get(endpoint).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        eprintln!("{}", text);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
