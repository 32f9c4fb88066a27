use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain-cli")]
#[command(about = "CLI client for a powchain node")]
struct Cli {
    /// Node base URL
    #[arg(long, global = true, env = "POWCHAIN_NODE", default_value = "http://127.0.0.1:5000")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        receiver: String,
        #[arg(long)]
        amount: u64,
    },
    /// Print the chain, or only its head
    Chain {
        #[arg(long)]
        head: bool,
    },
    /// Print transactions waiting to be mined
    Pending,
    /// Print peers seen recently
    Peers,
    /// Register a peer address with the node
    Register { address: String },
    /// Check the node is up
    Health,
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    receiver: String,
    amount: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    let res = match cli.cmd {
        Command::Submit {
            sender,
            receiver,
            amount,
        } => {
            let tx = Tx {
                sender,
                receiver,
                amount,
            };
            client
                .post(format!("{node}/transactions/new"))
                .json(&tx)
                .send()
                .await
        }
        Command::Chain { head } => {
            let route = if head { "/chain/head" } else { "/chain" };
            client.get(format!("{node}{route}")).send().await
        }
        Command::Pending => {
            client
                .get(format!("{node}/transactions/pending"))
                .send()
                .await
        }
        Command::Peers => client.get(format!("{node}/peers")).send().await,
        Command::Register { address } => {
            client
                .post(format!("{node}/register"))
                .json(&serde_json::json!({ "address": address }))
                .send()
                .await
        }
        Command::Health => client.get(format!("{node}/health")).send().await,
    }
    .with_context(|| format!("request to {node} failed"))?;

    let status = res.status();
    let body = res.text().await?;
    debug!(%status, "response received");
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    if !status.is_success() {
        bail!("node answered {status}");
    }
    Ok(())
}
