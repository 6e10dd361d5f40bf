use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, load_settings_from},
    ClientEvent, FundMeClient, Settings,
};
use devnet::{Devnet, DevnetConfig};
use serde_json::{json, Value};
use shared::{
    amount::EtherAmount,
    domain::{short_address, Address},
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

const RESYNC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(about = "Drive the FundMe client against an in-memory devnet")]
struct Cli {
    /// Settings file; defaults to ./fundme.toml when present.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Wallet account selected before connecting. 0 and 1 are funders, 2 is the owner.
    #[arg(long, default_value_t = 0)]
    account: usize,
    #[arg(long, default_value_t = 0)]
    block_time_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the session and contract view.
    Status,
    Fund {
        amount: String,
    },
    Withdraw,
    /// Select another wallet account and print the resynced view.
    Switch {
        index: usize,
    },
    /// Fund, attempt a non-owner withdraw, withdraw as owner, then lock the wallet.
    Demo,
}

fn accounts() -> [Address; 3] {
    [
        Address::repeat_byte(0xa1),
        Address::repeat_byte(0xb0),
        Address::repeat_byte(0x0a),
    ]
}

fn owner() -> Address {
    accounts()[2]
}

fn account_at(index: usize) -> Result<Address> {
    accounts()
        .get(index)
        .copied()
        .ok_or_else(|| anyhow!("no wallet account at index {index}"))
}

async fn seeded_devnet(settings: &Settings, block_time: Duration) -> Result<Devnet> {
    let devnet = Devnet::new(
        DevnetConfig {
            chain_id: settings.chain_id,
            contract_address: settings.contract_address,
            block_time,
            ..DevnetConfig::default()
        },
        owner(),
    );
    let starting = EtherAmount::parse_ether("5")?.wei();
    for account in accounts() {
        devnet.add_account(account, starting).await;
    }
    devnet
        .seed_contribution(accounts()[0], EtherAmount::parse_ether("0.02")?.wei())
        .await;
    Ok(devnet)
}

fn snapshot(client: &FundMeClient) -> Value {
    let session = client.session();
    let view = client.view();
    json!({
        "session": {
            "account": session.account.map(|a| a.to_string()),
            "connected": session.connected,
            "chain_id": session.chain_id.map(|c| c.0),
            "expected_network": client.on_expected_network(),
        },
        "view": {
            "caller_contribution": view.caller_contribution.to_string(),
            "aggregate_balance": view.aggregate_balance.to_string(),
            "owner": view.owner_address.map(|a| a.to_string()),
            "is_owner": view.is_owner,
            "can_withdraw": view.can_withdraw(),
        },
    })
}

fn print_snapshot(label: &str, client: &FundMeClient) -> Result<()> {
    println!("== {label}");
    println!("{}", serde_json::to_string_pretty(&snapshot(client))?);
    Ok(())
}

async fn print_notifications(client: &FundMeClient) {
    for notification in client.notifications().await {
        println!("[{:?}] {}", notification.level, notification.message);
        client.dismiss(notification.id).await;
    }
}

/// Switches the wallet to `account` and waits until the client has re-read
/// the contract for it.
async fn switch_and_wait(
    client: &FundMeClient,
    devnet: &Devnet,
    account: Address,
) -> Result<()> {
    let mut events = client.subscribe_events();
    devnet.switch_account(account).await;
    let announced = format!("Wallet connected: {}", short_address(&account));

    tokio::time::timeout(RESYNC_TIMEOUT, async {
        let mut rebound = false;
        loop {
            match events.recv().await {
                Ok(ClientEvent::Notification(n)) if n.message == announced => rebound = true,
                Ok(ClientEvent::ViewChanged(view))
                    if rebound && view.owner_address.is_some() && !view.syncing =>
                {
                    return Ok::<(), anyhow::Error>(());
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => bail!("client event stream closed"),
            }
        }
    })
    .await
    .context("timed out waiting for the view to resync")?
}

async fn run(client: &FundMeClient, devnet: &Devnet, command: Command) -> Result<()> {
    match command {
        Command::Status => print_snapshot("status", client)?,
        Command::Fund { amount } => {
            let confirmed = client.fund(&amount).await?;
            println!("confirmed {}", confirmed.receipt.tx_hash);
            print_snapshot("after fund", client)?;
        }
        Command::Withdraw => {
            let confirmed = client.withdraw().await?;
            println!(
                "confirmed {} ({} ETH)",
                confirmed.receipt.tx_hash,
                EtherAmount::from_wei(confirmed.receipt.value)
            );
            print_snapshot("after withdraw", client)?;
        }
        Command::Switch { index } => {
            switch_and_wait(client, devnet, account_at(index)?).await?;
            print_snapshot("after switch", client)?;
        }
        Command::Demo => {
            print_snapshot("connected", client)?;

            client.fund("0.05").await?;
            print_snapshot("funded 0.05", client)?;
            print_notifications(client).await;

            if let Err(err) = client.withdraw().await {
                info!(kind = ?err.kind(), "demo: funder withdraw rejected as expected");
            }
            print_notifications(client).await;

            switch_and_wait(client, devnet, owner()).await?;
            print_snapshot("owner selected", client)?;
            client.withdraw().await?;
            print_snapshot("withdrawn", client)?;
            print_notifications(client).await;

            let mut view = client.subscribe_view();
            devnet.lock_wallet().await;
            tokio::time::timeout(RESYNC_TIMEOUT, view.wait_for(|view| view.is_zero()))
                .await
                .context("timed out waiting for the wallet to lock")??;
            print_snapshot("wallet locked", client)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from(path, |key| std::env::var(key).ok()),
        None => load_settings(),
    };
    let devnet = seeded_devnet(&settings, Duration::from_millis(cli.block_time_ms)).await?;
    let client = FundMeClient::new(
        settings,
        Arc::new(devnet.wallet()),
        Arc::new(devnet.contract().await),
    );

    client.start().await.context("starting client")?;
    devnet.switch_account(account_at(cli.account)?).await;
    client.connect().await.context("connecting wallet")?;

    let outcome = run(&client, &devnet, cli.command).await;
    print_notifications(&client).await;
    client.stop().await;
    outcome
}
