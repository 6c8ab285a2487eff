use anyhow::Result;
use clap::Parser;
use colored::*;

mod output;
mod scenarios;
mod transport;

use output::print_test_summary;

#[derive(Parser)]
#[command(name = "fanout-test-client")]
#[command(about = "Fan-out broker scenario testing tool")]
struct Cli {
    /// Test scenario to run
    #[arg(long, value_enum, default_value = "all")]
    scenario: ScenarioChoice,

    /// Enable verbose output (logs + received frames)
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Deliver one message to every connection of one user
    UserFanout,
    /// Broadcast an SSE event block to one channel
    ChannelBroadcast,
    /// Enforce the per-user admission quota
    Quota,
    /// Reject an oversized inbound WebSocket frame
    InboundValidation,
    /// Answer an unregistered message type with an error frame
    UnknownType,
    /// Remove a dead transport discovered mid-publish
    TransportDeath,
    /// Keep-alive cadence and shutdown
    Heartbeat,
    /// Run every scenario
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== FAN-OUT SCENARIOS ===".bright_white().bold());

    let verbose = cli.verbose;
    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::UserFanout => {
            results.push(scenarios::test_user_fanout(verbose).await?);
        }
        ScenarioChoice::ChannelBroadcast => {
            results.push(scenarios::test_channel_broadcast(verbose).await?);
        }
        ScenarioChoice::Quota => {
            results.push(scenarios::test_quota(verbose).await?);
        }
        ScenarioChoice::InboundValidation => {
            results.push(scenarios::test_inbound_validation(verbose).await?);
        }
        ScenarioChoice::UnknownType => {
            results.push(scenarios::test_unknown_type(verbose).await?);
        }
        ScenarioChoice::TransportDeath => {
            results.push(scenarios::test_transport_death(verbose).await?);
        }
        ScenarioChoice::Heartbeat => {
            results.push(scenarios::test_heartbeat(verbose).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_user_fanout(verbose).await?);
            results.push(scenarios::test_channel_broadcast(verbose).await?);
            results.push(scenarios::test_quota(verbose).await?);
            results.push(scenarios::test_inbound_validation(verbose).await?);
            results.push(scenarios::test_unknown_type(verbose).await?);
            results.push(scenarios::test_transport_death(verbose).await?);
            results.push(scenarios::test_heartbeat(verbose).await?);
        }
    }

    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All scenarios passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some scenarios failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
