use clap::{Parser, Subcommand};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use std::path::PathBuf;

use upload_gate::auth::{secret, CredentialVerifier};
use upload_gate::store::SettingStore;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Management CLI for the upload gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Credential used against the admin API (mint one with `token`).
    #[arg(short, long, default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gate status
    Status,
    /// List blacklist entries
    Blacklist {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Add an IP to the blacklist
    Ban {
        ip: String,
        #[arg(long, default_value = "added manually")]
        reason: String,
    },
    /// Remove a blacklist entry by id
    Unban { id: String },
    /// Show a mode policy (public or private)
    Policy { mode: String },
    /// Mint an admin credential from the local settings store
    Token {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        #[arg(long, default_value = "admin")]
        user_id: String,
        #[arg(long, default_value = "admin")]
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Token {
            data_dir,
            user_id,
            username,
        } => {
            let store = SettingStore::open(&data_dir.join("settings.json"))?;
            let Some(signing_secret) = store.get::<String>(secret::SECRET_SETTING_KEY) else {
                return Err(format!(
                    "no credential secret found under {:?}; start the gate first",
                    data_dir
                )
                .into());
            };
            let token = CredentialVerifier::new(&signing_secret).issue(&user_id, &username)?;
            println!("{}", token);
        }
        Commands::Status => {
            send(reqwest::Method::GET, format!("{}/api/status", cli.url), &cli.token, None).await?;
        }
        Commands::Blacklist { page, limit } => {
            send(
                reqwest::Method::GET,
                format!("{}/api/blacklist?page={}&limit={}", cli.url, page, limit),
                &cli.token,
                None,
            )
            .await?;
        }
        Commands::Ban { ip, reason } => {
            send(
                reqwest::Method::POST,
                format!("{}/api/blacklist", cli.url),
                &cli.token,
                Some(serde_json::json!({ "ip": ip, "reason": reason })),
            )
            .await?;
        }
        Commands::Unban { id } => {
            send(
                reqwest::Method::DELETE,
                format!("{}/api/blacklist/{}", cli.url, id),
                &cli.token,
                None,
            )
            .await?;
        }
        Commands::Policy { mode } => {
            send(
                reqwest::Method::GET,
                format!("{}/api/config/{}", cli.url, mode),
                &cli.token,
                None,
            )
            .await?;
        }
    }

    Ok(())
}

async fn send(
    method: reqwest::Method,
    url: String,
    token: &str,
    body: Option<Value>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let mut request = client
        .request(method, url)
        .header(AUTHORIZATION, format!("Bearer {}", token));
    if let Some(body) = body {
        request = request.json(&body);
    }
    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
