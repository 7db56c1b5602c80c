use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Admin CLI for the CORS forwarding gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4000")]
    url: String,

    /// Admin key, sent as X-Admin-Key.
    #[arg(short, long, env = "ADMIN_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show usage statistics
    Stats,
    /// Show the effective configuration
    Config,
    /// Reset usage statistics
    ResetStats,
    /// Add a domain to the block-list
    Block { domain: String },
    /// Remove a domain from the block-list
    Unblock { domain: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert("x-admin-key", HeaderValue::from_str(&cli.key)?);

    let request = match &cli.command {
        Commands::Stats => client.get(format!("{base}/admin/stats")),
        Commands::Config => client.get(format!("{base}/admin/config")),
        Commands::ResetStats => client.post(format!("{base}/admin/reset-stats")),
        Commands::Block { domain } => client
            .post(format!("{base}/admin/block-domain"))
            .json(&json!({ "domain": domain })),
        Commands::Unblock { domain } => {
            let mut url = reqwest::Url::parse(&format!("{base}/admin/unblock-domain/"))?;
            url.path_segments_mut()
                .map_err(|_| "admin URL cannot be a base")?
                .pop_if_empty()
                .push(domain);
            client.delete(url)
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        eprintln!("Response: {}", text);
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
