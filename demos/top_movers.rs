use coin_market_sdk::{DataFreshness, MarketDataConfig, MarketDataService};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coin_market_sdk=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MarketDataConfig::from_env()?;
    let ttl = config.cache_ttl;
    let service = MarketDataService::new(config)?;

    println!("Top movers (provider: {})", service.provider_name());
    println!("-------------------------------------------");

    let movers = service.top_movers(100, 5).await?;
    if let DataFreshness::Stale { reason } = &movers.freshness {
        println!("Warning: showing stale data ({reason})");
    }

    println!("Gainers:");
    for coin in &movers.gainers {
        println!("  {:>6} {:>10.2}%  ${:.4}", coin.symbol.to_uppercase(), coin.change_24h(), coin.current_price);
    }
    println!("Losers:");
    for coin in &movers.losers {
        println!("  {:>6} {:>10.2}%  ${:.4}", coin.symbol.to_uppercase(), coin.change_24h(), coin.current_price);
    }
    println!();

    if let Some(top) = movers.gainers.first() {
        match service.market_chart(&top.id, 7).await {
            Ok(chart) => {
                let first = chart.prices.first().map(|p| p.value).unwrap_or_default();
                let last = chart.prices.last().map(|p| p.value).unwrap_or_default();
                println!("{} over 7 days: ${:.4} -> ${:.4}", top.name, first, last);
            }
            Err(e) => eprintln!("Chart for {} unavailable: {}", top.id, e),
        }
        println!();
    }

    // One poll period with a live subscription
    println!("Polling for {:?}...", ttl);
    let subscription = service.subscribe(|snapshot| {
        println!(
            "  update: {} coins, freshness {:?}",
            snapshot.coins.len(),
            snapshot.freshness
        );
    });
    tokio::time::sleep(ttl + Duration::from_secs(1)).await;
    drop(subscription);

    let metrics = service.metrics().await;
    println!();
    println!("Requests: {} ({} failed)", metrics.total_requests, metrics.failed_requests);
    println!("Cache hits: {}", metrics.cache_hits);
    println!("Latency p50: {:.1}ms", metrics.latency_p50_ms);

    Ok(())
}
