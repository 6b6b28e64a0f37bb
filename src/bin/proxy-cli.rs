use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

/// Environment variable the new session's token is read from.
const TOKEN_ENV: &str = "SESSION_PROXY_TOKEN";

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the session proxy admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9998")]
    url: String,

    /// Admin bearer key
    #[arg(short, long, env = "SESSION_PROXY_ADMIN_KEY", hide_env_values = true)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show lifecycle state, in-flight count and session presence
    Status,
    /// Show the active backend session (never the token)
    Session,
    /// Replace the backend session; the token is read from SESSION_PROXY_TOKEN
    SetSession {
        /// Backend host (defaults to the current one)
        #[arg(long)]
        host: Option<String>,
        /// Backend port
        #[arg(long)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", cli.key))?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Session => {
            let res = client
                .get(format!("{}/admin/session", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::SetSession { host, port } => {
            let token = std::env::var(TOKEN_ENV)
                .ok()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| format!("{} is not set", TOKEN_ENV))?;
            let res = client
                .put(format!("{}/admin/session", cli.url))
                .headers(headers)
                .json(&json!({ "host": host, "port": port, "token": token }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
