use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use spot_arb_engine::balance::BalanceCache;
use spot_arb_engine::book::{BookCollector, CollectorType};
use spot_arb_engine::config::{load_settings_file, load_venue_credentials, Cli};
use spot_arb_engine::dispatch::DispatchLoop;
use spot_arb_engine::engine::EngineThresholds;
use spot_arb_engine::store::Store;
use spot_arb_engine::types::{market_pair_key, FeeSchedule, MarketMeta};
use spot_arb_engine::venue::{SimulatedVenueAdapter, VenueAdapter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.loglevel.as_filter_directive())))
        .with(fmt::layer())
        .init();

    let base_dir = std::env::current_dir().context("resolving working directory")?;
    let settings = load_settings_file(&base_dir, &cli.worker).context("loading settings file")?;
    let symbol = settings.symbol().context("parsing market symbol")?;

    let ask_venue = settings.exchanges[0].clone();
    let bid_venue = settings.exchanges[1].clone();

    let (ask_adapter, bid_adapter): (Arc<dyn VenueAdapter>, Arc<dyn VenueAdapter>) = if cli.simulate {
        build_simulated_pair(&ask_venue, &bid_venue, &symbol)
    } else {
        for venue in &settings.exchanges {
            load_venue_credentials(venue).with_context(|| format!("loading credentials for {venue}"))?;
        }
        bail!("live venue adapters are out of scope for this build; rerun with --simulate");
    };

    let ask_markets: HashMap<_, _> = ask_adapter.fetch_markets().await.context("fetching ask venue markets")?.into_iter().collect();
    let bid_markets: HashMap<_, _> = bid_adapter.fetch_markets().await.context("fetching bid venue markets")?.into_iter().collect();
    let ask_meta = ask_markets
        .get(&symbol)
        .cloned()
        .with_context(|| format!("symbol {symbol} not present on {ask_venue}"))?;
    let bid_meta = bid_markets
        .get(&symbol)
        .cloned()
        .with_context(|| format!("symbol {symbol} not present on {bid_venue}"))?;

    let ask_fee = ask_adapter.fetch_fees(&symbol).await.context("fetching ask venue fees")?;
    let bid_fee = bid_adapter.fetch_fees(&symbol).await.context("fetching bid venue fees")?;

    let ask_venue_settings = settings
        .settings
        .get(&ask_venue)
        .with_context(|| format!("no per-venue settings for {ask_venue}"))?;
    let bid_venue_settings = settings
        .settings
        .get(&bid_venue)
        .with_context(|| format!("no per-venue settings for {bid_venue}"))?;

    if ask_venue_settings.collector_type != CollectorType::Request
        || bid_venue_settings.collector_type != CollectorType::Request
    {
        bail!("stream collectors are a reserved interface and are not yet implemented");
    }

    let ask_collector = BookCollector::new(ask_venue.clone(), symbol.clone(), Duration::from_secs_f64(ask_venue_settings.sleep_time));
    let bid_collector = BookCollector::new(bid_venue.clone(), symbol.clone(), Duration::from_secs_f64(bid_venue_settings.sleep_time));

    let ask_balance_cache = BalanceCache::new(ask_venue.clone());
    let bid_balance_cache = BalanceCache::new(bid_venue.clone());
    ask_balance_cache.replace(ask_adapter.fetch_balance().await.context("fetching initial ask venue balance")?);
    bid_balance_cache.replace(bid_adapter.fetch_balance().await.context("fetching initial bid venue balance")?);

    let thresholds = EngineThresholds {
        min_base_qty: settings.min_base_qty.unwrap_or(ask_meta.min_base_qty.max(bid_meta.min_base_qty)),
        min_quote_qty: settings.min_quote_qty.unwrap_or(ask_meta.min_quote_qty.max(bid_meta.min_quote_qty)),
        base_precision: settings.base_precision.unwrap_or(ask_meta.base_precision.min(bid_meta.base_precision)),
        quote_precision: settings.quote_precision.unwrap_or(ask_meta.quote_precision.min(bid_meta.quote_precision)),
        min_profit_perc: ask_venue_settings.min_profit_perc.max(bid_venue_settings.min_profit_perc),
        min_profit_amount: ask_venue_settings.min_profit_amount.max(bid_venue_settings.min_profit_amount),
    };

    let db_path = base_dir.join(format!("{}.sqlite3", cli.worker));
    let store = Store::open(&db_path).context("opening document store")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let ask_collector = ask_collector.clone();
        let bid_collector = bid_collector.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.store(true, std::sync::atomic::Ordering::Release);
            ask_collector.shutdown();
            bid_collector.shutdown();
        });
    }

    tokio::spawn(ask_collector.clone().run_request(ask_adapter.clone()));
    tokio::spawn(bid_collector.clone().run_request(bid_adapter.clone()));

    let mut dispatch = DispatchLoop {
        symbol: symbol.clone(),
        market_pair_id: market_pair_key(&ask_venue, &bid_venue, &symbol),
        ask_collector,
        bid_collector,
        ask_adapter,
        bid_adapter,
        ask_fee,
        bid_fee,
        ask_price_precision: ask_meta.price_precision,
        bid_price_precision: bid_meta.price_precision,
        ask_balance_cache,
        bid_balance_cache,
        ask_base_asset_for_bid_cap: symbol.base.clone(),
        ask_quote_asset_for_ask_cap: symbol.quote.clone(),
        thresholds,
        store,
        tick_sleep: Duration::from_secs_f64(settings.sleep_time),
        post_trade_sleep: spot_arb_engine::dispatch::default_post_trade_sleep(),
        shutdown: shutdown.clone(),
    };

    info!(market = %symbol, ask_venue, bid_venue, simulate = cli.simulate, "dispatch loop starting");

    let mut tick: u64 = 0;
    while !dispatch.is_shutdown() {
        tick += 1;
        dispatch.tick(tick, chrono::Utc::now().timestamp_millis()).await;
    }

    info!("dispatch loop stopped, exiting cleanly");
    Ok(())
}

fn build_simulated_pair(ask_venue: &str, bid_venue: &str, symbol: &spot_arb_engine::types::Symbol) -> (Arc<dyn VenueAdapter>, Arc<dyn VenueAdapter>) {
    let meta = MarketMeta {
        min_base_qty: 0.0,
        min_quote_qty: 0.0,
        base_precision: 6,
        quote_precision: 6,
        price_precision: 8,
    };
    let fee = FeeSchedule::new(0.001, 0.002);

    let ask_adapter = SimulatedVenueAdapter::new(ask_venue, fee)
        .with_market(symbol.clone(), meta.clone())
        .with_balance(symbol.quote.clone(), 1_000_000.0);
    let bid_adapter = SimulatedVenueAdapter::new(bid_venue, fee)
        .with_market(symbol.clone(), meta)
        .with_balance(symbol.base.clone(), 100.0);

    (Arc::new(ask_adapter), Arc::new(bid_adapter))
}
