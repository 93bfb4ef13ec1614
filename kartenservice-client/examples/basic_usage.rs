//! Basic usage example for the card service client
//!
//! This example demonstrates how to:
//! - Create a client for a registered institution
//! - Reuse scraped application credentials
//! - Fetch card info, transactions and their positions
//!
//! Configuration comes from environment variables:
//! - `KARTENSERVICE_LOCATION` (e.g. `Dresden`)
//! - `KARTENSERVICE_CARD` (card number)
//! - `KARTENSERVICE_PASSWORD` (prompted for if unset)
//!
//! Set `RUST_LOG=kartenservice_client=debug` to see each request.

use kartenservice_client::{CardServiceClient, link_positions, supported_locations};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let location = std::env::var("KARTENSERVICE_LOCATION").unwrap_or_else(|_| {
        let known: Vec<_> = supported_locations().collect();
        eprintln!("KARTENSERVICE_LOCATION not set, supported: {}", known.join(", "));
        std::process::exit(2);
    });
    let card_number = std::env::var("KARTENSERVICE_CARD")
        .expect("KARTENSERVICE_CARD environment variable not set");
    let password = match std::env::var("KARTENSERVICE_PASSWORD") {
        Ok(p) => p,
        Err(_) => rpassword::prompt_password("Card password: ")?,
    };

    println!("=== Creating client for {} ===", location);
    let mut client = CardServiceClient::builder()
        .location(&location)
        .card_number(card_number)
        .card_password(password)
        .timeout(Duration::from_secs(20))
        .build()?;
    println!("✓ Application credentials scraped (client id {})", client.api_credentials().client_id);

    println!("\n=== Card Info ===");
    let card = client.get_card_info()?;
    println!("{}", serde_json::to_string_pretty(&card)?);
    if let Some(days) = client.retention_days() {
        println!("Transactions are kept for {} days", days);
    }

    println!("\n=== Last Three Days ===");
    let today = chrono::Local::now().date_naive();
    let from = today - chrono::Duration::days(2);
    let transactions = client.get_transactions(Some(from), Some(today))?;
    let positions = client.get_transaction_positions(Some(from), Some(today))?;

    let linked = link_positions(&transactions, &positions);
    for entry in &linked.transactions {
        let t = entry.transaction;
        println!(
            "{} {:>8} {} ({})",
            t.timestamp()
                .map(|ts| ts.to_string())
                .unwrap_or_else(|| "?".to_string()),
            t.amount().map(|a| format!("{:.2}", a)).unwrap_or_default(),
            t.location_name().unwrap_or("-"),
            t.point_of_sale().unwrap_or("-"),
        );
        for p in &entry.positions {
            println!(
                "    {} x {} = {}",
                p.quantity().unwrap_or(1.0),
                p.name().unwrap_or("?"),
                p.total_price().map(|v| format!("{:.2}", v)).unwrap_or_default(),
            );
        }
    }
    if !linked.orphans.is_empty() {
        println!("{} positions without a matching transaction", linked.orphans.len());
    }

    Ok(())
}
