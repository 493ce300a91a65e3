use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, ETAG, IF_NONE_MATCH};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "acm-cli")]
#[command(about = "Management CLI for the agent configuration server", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, default_value = "http://localhost:8201")]
    url: String,

    /// Admin API key
    #[arg(short, long, env = "ACM_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Server version and endpoint switches
    Status,
    /// Cache counters
    Cache,
    /// Fetch the configuration an agent would receive
    Get {
        /// Agent endpoint base URL
        #[arg(long, default_value = "http://localhost:8200")]
        server: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        env: Option<String>,
        /// Query the RUM route
        #[arg(long)]
        rum: bool,
        /// Send as If-None-Match
        #[arg(long)]
        etag: Option<String>,
        /// Agent secret token
        #[arg(long, env = "ACM_SECRET_TOKEN")]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(bearer(&cli.key)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Cache => {
            let res = client
                .get(format!("{}/admin/cache", cli.url))
                .headers(bearer(&cli.key)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Get { server, service, env, rum, etag, token } => {
            let path = if rum { "/config/v1/rum/agents" } else { "/config/v1/agents" };
            let mut query = vec![("service.name", service)];
            if let Some(env) = env {
                query.push(("service.environment", env));
            }

            let mut headers = match token {
                Some(token) => bearer(&token)?,
                None => HeaderMap::new(),
            };
            if let Some(etag) = etag {
                headers.insert(IF_NONE_MATCH, HeaderValue::from_str(&etag)?);
            }

            let res = client
                .get(format!("{}{}", server, path))
                .query(&query)
                .headers(headers)
                .send()
                .await?;

            if let Some(etag) = res.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
                println!("ETag: {}", etag);
            }
            if res.status() == reqwest::StatusCode::NOT_MODIFIED {
                println!("Not modified");
                return Ok(());
            }
            print_response(res).await?;
        }
    }

    Ok(())
}

fn bearer(token: &str) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("{}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
