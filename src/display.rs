use chrono::Local;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use rust_decimal::Decimal;

use crate::evaluator::Opportunity;
use crate::ranker::top;
use crate::scanner::ScanOutcome;
use crate::tokens::{units_to_decimal, TokenCache};

/// Default log file name for detected opportunities
const ARB_LOG_FILE: &str = "arb_opportunities.log";

// Track active routes to only log new ones
static ACTIVE_ARBS: Mutex<Option<HashSet<String>>> = Mutex::new(None);

fn get_arb_log_path() -> PathBuf {
    PathBuf::from(ARB_LOG_FILE)
}

/// Write one opportunity line to the log file
fn write_arb_to_file(message: &str) {
    let log_path = get_arb_log_path();

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{}", message) {
                // Only print error once, avoid spamming stderr
                eprintln!("Warning: Failed to write to arb log file: {}", e);
            }
        }
        Err(e) => {
            // Only print error once, avoid spamming stderr
            eprintln!(
                "Warning: Failed to open arb log file {}: {}",
                log_path.display(),
                e
            );
        }
    }
}

/// Initialize the opportunity log file and return the path for display.
/// Call this at startup to inform the user where logs are written.
pub fn init_arb_log() -> PathBuf {
    let log_path = get_arb_log_path();
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

    let message = format!("\n[{}] === TRIANGLE SCAN SESSION STARTED ===", timestamp);
    write_arb_to_file(&message);

    log_path
}

/// Route rendered as a token cycle, e.g. "USDC → WETH → cbBTC → USDC"
fn route_line(opportunity: &Opportunity, cache: &TokenCache) -> String {
    let [a, b, c] = opportunity.order;
    format!(
        "{} → {} → {} → {}",
        cache.symbol(a),
        cache.symbol(b),
        cache.symbol(c),
        cache.symbol(a)
    )
}

/// Log newly detected routes to the file (only ones absent last cycle)
fn log_new_opportunities(opportunities: &[Opportunity], cache: &TokenCache, timestamp: &str) {
    let mut active_arbs = ACTIVE_ARBS.lock().unwrap();
    let prev_arbs = active_arbs.get_or_insert_with(HashSet::new);

    let mut current_arbs = HashSet::new();
    for opportunity in opportunities {
        let key = format!("{:?}|{:?}", opportunity.route, opportunity.order);
        current_arbs.insert(key.clone());

        if !prev_arbs.contains(&key) {
            let usd = opportunity
                .net_profit_usd
                .map(|v| format!(" | ~${:.2}", v))
                .unwrap_or_default();
            let message = format!(
                "[{}] ARB DETECTED | {} | Gross: {:.4}% | Net: {:.4}%{}",
                timestamp,
                route_line(opportunity, cache),
                opportunity.gross_profit_pct,
                opportunity.net_profit_pct,
                usd
            );
            write_arb_to_file(&message);
        }
    }

    *prev_arbs = current_arbs;
}

/// Clears the terminal screen
pub fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
}

fn usd_cell(value: Option<Decimal>) -> String {
    match value {
        Some(v) => format!("${:.2}", v),
        None => "n/a".to_string(),
    }
}

/// Full report for one cycle: the top-k routes with per-leg detail plus the
/// cycle counters, best route first.
pub fn display_outcome(outcome: &ScanOutcome, cache: &TokenCache, top_k: usize, watch: bool) {
    if watch {
        clear_screen();
    }

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(67));
    println!(
        "\x1b[1;36m  Triangular Arb Scanner | {} | {}\x1b[0m",
        crate::config::CHAIN_NAME,
        timestamp
    );
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(67));
    println!();

    if outcome.stats.pools_loaded == 0 {
        println!("\x1b[1;31m  No pool state available. Check RPC connection.\x1b[0m");
        println!();
        return;
    }

    let shown = top(&outcome.opportunities, top_k);
    log_new_opportunities(shown, cache, &timestamp.to_string());

    if shown.is_empty() {
        println!("  No profitable routes this cycle.");
        println!();
    }

    for (i, opportunity) in shown.iter().enumerate() {
        println!(
            "  \x1b[1m#{}\x1b[0m  {}",
            i + 1,
            route_line(opportunity, cache)
        );
        println!(
            "  Gross: \x1b[1m{:.4}%\x1b[0m | Net: \x1b[1;32m{:+.4}%\x1b[0m | DEX fees: {:.4}% | Flash fee: {:.2}%",
            opportunity.gross_profit_pct,
            opportunity.net_profit_pct,
            opportunity.total_dex_fee_pct,
            opportunity.flash_loan_fee_pct
        );
        println!(
            "  Principal: {} | Est. net: {}",
            usd_cell(opportunity.principal_usd),
            usd_cell(opportunity.net_profit_usd)
        );
        for leg in &opportunity.legs {
            let amount_in = units_to_decimal(leg.amount_in, cache.decimals(leg.token_in))
                .map(|v| format!("{:.6}", v))
                .unwrap_or_else(|| leg.amount_in.to_string());
            let amount_out = units_to_decimal(leg.amount_out, cache.decimals(leg.token_out))
                .map(|v| format!("{:.6}", v))
                .unwrap_or_else(|| leg.amount_out.to_string());
            println!(
                "    {:<24} {} {} → {} {} | rate {:.8} | fee {:.4}%",
                leg.pool_name,
                amount_in,
                cache.symbol(leg.token_in),
                amount_out,
                cache.symbol(leg.token_out),
                leg.effective_rate,
                leg.fee_pct
            );
        }
        println!();
    }

    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(67));
    println!(
        "  Pools: {}/{} | Triangles: {} | Permutations: {} | Hits: {} | {}ms",
        outcome.stats.pools_loaded,
        outcome.stats.pools_total,
        outcome.stats.triangles,
        outcome.stats.permutations,
        outcome.stats.opportunities,
        outcome.stats.elapsed_ms
    );
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(67));
}

/// The same report as machine-readable JSON, one document per cycle
pub fn display_outcome_json(outcome: &ScanOutcome, top_k: usize) {
    let shown = top(&outcome.opportunities, top_k);
    match serde_json::to_string_pretty(shown) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Warning: Failed to serialize opportunities: {}", e),
    }
}
