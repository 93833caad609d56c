//! tvfeed-connector: TradingView market data command-line client
//!
//! Fetches candles and symbol metadata over the streaming API, and symbol
//! search / screener results over REST. Results are printed as JSON.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tvfeed_connector_lib::{
    CandleRequest, EnvResolver, Ohlcv, SessionConfig, SessionType, Timeframe, TradingViewClient,
};
use tvfeed_metadata::Feed;

#[derive(Parser, Debug)]
#[command(name = "tvfeed-connector")]
#[command(about = "TradingView market data client")]
struct Args {
    /// Path to feed configuration file (defaults to the public endpoints)
    #[arg(short, long, global = true, env = "TVFEED_FEED")]
    feed: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch OHLCV candles for one symbol at one or more timeframes
    Candles {
        /// Symbol as EXCHANGE:TICKER
        #[arg(short, long)]
        symbol: String,

        /// Timeframe (1, 5, 60, 1D, 1W, 1M, or 1m/1h/1d/1w); repeat for several
        #[arg(short, long = "timeframe", default_value = "1D")]
        timeframes: Vec<Timeframe>,

        /// Number of bars to request
        #[arg(short, long, default_value_t = 300)]
        bars: u32,

        /// History range (e.g. 12M); "none" sizes the series by --bars alone
        #[arg(long, default_value = "12M")]
        range: String,

        /// Include extended-hours bars
        #[arg(long)]
        extended: bool,
    },
    /// Fetch merged symbol metadata
    Symbol {
        /// Symbol as EXCHANGE:TICKER
        #[arg(short, long)]
        symbol: String,
    },
    /// Search symbols by free text
    Search {
        #[arg(short, long)]
        text: String,
    },
    /// List every symbol the screener has for a sector (e.g. america, russia)
    Scan {
        #[arg(long)]
        sector: String,
    },
}

#[derive(Serialize)]
struct Series {
    symbol: String,
    timeframe: Timeframe,
    bars: Vec<Ohlcv>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let feed = match args.feed {
        Some(ref path) => {
            let feed = Feed::load(path)?;
            info!(feed = %feed.name, "Loaded feed configuration");
            feed
        }
        None => Feed::default(),
    };
    let config = SessionConfig::from_feed(&feed, &EnvResolver::new())?;
    let client = TradingViewClient::new(feed, config)?;

    // Ctrl+C cancels outstanding requests
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown.cancel();
    });

    let output = match args.command {
        Command::Candles {
            symbol,
            timeframes,
            bars,
            range,
            extended,
        } => {
            let series = fetch_series(&client, &symbol, &timeframes, bars, &range, extended, &cancel).await?;
            serde_json::to_value(series)?
        }
        Command::Symbol { symbol } => {
            serde_json::to_value(client.fetch_symbol_info(&symbol, &cancel).await?)?
        }
        Command::Search { text } => serde_json::to_value(client.rest().search_symbol(&text).await?)?,
        Command::Scan { sector } => serde_json::to_value(client.rest().sector_symbols(&sector).await?)?,
    };

    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output);
    }
    Ok(())
}

async fn fetch_series(
    client: &TradingViewClient,
    symbol: &str,
    timeframes: &[Timeframe],
    bars: u32,
    range: &str,
    extended: bool,
    cancel: &CancellationToken,
) -> Result<Vec<Series>, Box<dyn std::error::Error>> {
    let requests = candle_requests(symbol, timeframes, bars, range, extended);

    let results = client.fetch_many(&requests, cancel).await?;
    Ok(timeframes
        .iter()
        .zip(results)
        .map(|(&timeframe, bars)| Series {
            symbol: symbol.to_string(),
            timeframe,
            bars,
        })
        .collect())
}

/// One request per timeframe. The session type is left to the server
/// unless extended hours are asked for.
fn candle_requests(
    symbol: &str,
    timeframes: &[Timeframe],
    bars: u32,
    range: &str,
    extended: bool,
) -> Vec<CandleRequest> {
    let range = (!range.eq_ignore_ascii_case("none")).then(|| range.to_string());

    timeframes
        .iter()
        .map(|&timeframe| {
            let request = CandleRequest::new(symbol, timeframe)
                .with_bar_count(bars)
                .with_range(range.clone());
            if extended {
                request.with_session(SessionType::Extended)
            } else {
                request
            }
        })
        .collect()
}
