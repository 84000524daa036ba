use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use qstream_rs::analysis::{crossovers, simple_moving_average, Signal};
use qstream_rs::config::Settings;
use qstream_rs::rest::{AlphaVantageClient, IexRestClient, PriceHistory, QuoteSource};
use qstream_rs::subscription::{QuoteSnapshot, SubscriptionRegistry};
use qstream_rs::telemetry;

#[derive(Parser, Debug)]
#[command(name = "qstream", about = "Stream live IEX quotes and manage ticker subscriptions")]
struct Args {
    /// Tickers to subscribe to on startup (comma separated)
    #[arg(long, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "qstream_rs=info")]
    log: String,

    /// Port for the Prometheus exporter (metrics-exporter feature)
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,
}

fn print_snapshot(symbol: &str, snap: &QuoteSnapshot) {
    let fmt_px = |p: Option<f64>| p.map_or("-".to_string(), |p| format!("{:.4}", p));
    let fmt_sz = |s: Option<u64>| s.map_or("-".to_string(), |s| s.to_string());
    println!(
        "{:<6} last {} x {} | bid {} x {} | ask {} x {} | {}",
        symbol,
        fmt_px(snap.last_price),
        fmt_sz(snap.last_size),
        fmt_px(snap.bid_price),
        fmt_sz(snap.bid_size),
        fmt_px(snap.ask_price),
        fmt_sz(snap.ask_size),
        snap.timestamp.as_deref().unwrap_or("-"),
    );
}

fn print_help() {
    println!("Available commands:");
    println!("  add <ticker>...                 - Subscribe to tickers");
    println!("  remove <ticker>...              - Unsubscribe from tickers");
    println!("  show [ticker]                   - Latest streamed snapshot(s)");
    println!("  list                            - Tracked tickers and stream state");
    println!("  quote <ticker>...               - One-shot REST quote");
    println!("  sma <ticker> <short> <long> <days> - Moving-average crossovers");
    println!("  quit, q                         - Exit");
}

async fn run_sma(history: &AlphaVantageClient, parts: &[&str]) -> anyhow::Result<()> {
    let [ticker, short, long, days] = parts else {
        println!("Usage: sma <ticker> <short> <long> <days>");
        return Ok(());
    };
    let (short, long, days): (usize, usize, usize) = (short.parse()?, long.parse()?, days.parse()?);

    let bars = history.daily_bars(ticker, days).await?;
    let closes: Vec<f64> = bars.iter().map(|b| b.price()).collect();
    let short_avg = simple_moving_average(&closes, short);
    let long_avg = simple_moving_average(&closes, long);

    println!("{} bars for {}", bars.len(), ticker);
    for cross in crossovers(&short_avg, &long_avg) {
        let label = match cross.signal {
            Signal::Buy => "BUY ",
            Signal::Sell => "SELL",
        };
        println!("  {} {} @ {:.2}", label, bars[cross.index].timestamp.date(), cross.price);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env
    let args = Args::parse();
    telemetry::init_tracing(&args.log);
    telemetry::init_metrics(args.metrics_port)?;

    let settings = Settings::load()?;
    let registry = SubscriptionRegistry::new(settings.stream.clone());
    let quotes = IexRestClient::new(&settings.rest);
    let history = AlphaVantageClient::new(&settings.rest);

    registry.start();
    for (ticker, result) in registry.add_symbols(&args.tickers).await {
        if let Err(e) = result {
            eprintln!("Cannot add {}: {}", ticker, e);
        }
    }

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    // CLI loop
    loop {
        stdout.write_all(b"\nqstream> ").await?;
        stdout.flush().await?;

        let Some(input) = lines.next_line().await? else { break };
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((command, rest)) = parts.split_first() else { continue };

        match command.to_lowercase().as_str() {
            "help" | "h" => print_help(),
            "add" => {
                for (ticker, result) in registry.add_symbols(rest).await {
                    match result {
                        Ok(()) => println!("Added {}", ticker),
                        Err(e) => println!("Cannot add {}: {}", ticker, e),
                    }
                }
            }
            "remove" => {
                for ticker in rest {
                    match registry.remove_symbol(ticker).await {
                        Ok(true) => println!("Removed {}", ticker),
                        Ok(false) => println!("{} was not tracked", ticker),
                        Err(e) => println!("Cannot remove {}: {}", ticker, e),
                    }
                }
            }
            "show" => {
                let symbols = if rest.is_empty() {
                    registry.tracked_symbols()
                } else {
                    rest.iter().map(|s| s.to_lowercase()).collect()
                };
                for symbol in symbols {
                    match registry.snapshot(&symbol) {
                        Some(snap) => print_snapshot(&symbol, &snap),
                        None => println!("{:<6} no data yet", symbol),
                    }
                }
            }
            "list" => {
                println!(
                    "State: {:?} | subscription id: {}",
                    registry.state(),
                    registry.subscription_id().as_deref().unwrap_or("-")
                );
                println!("Tracked: {}", registry.tracked_symbols().join(", "));
            }
            "quote" => {
                let tickers: Vec<String> = rest.iter().map(|s| s.to_lowercase()).collect();
                match quotes.latest_quotes(&tickers).await {
                    Ok(found) => {
                        for quote in &found {
                            print_snapshot(&quote.ticker.to_lowercase(), &QuoteSnapshot::from(quote));
                        }
                    }
                    Err(e) => println!("Quote request failed: {}", e),
                }
            }
            "sma" => {
                if let Err(e) = run_sma(&history, rest).await {
                    println!("SMA failed: {}", e);
                }
            }
            "quit" | "q" | "exit" => {
                println!("Goodbye!");
                break;
            }
            _ => {
                println!("Unknown command. Type 'help' for available commands.");
            }
        }
    }

    registry.close().await;
    Ok(())
}
