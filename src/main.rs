mod config;
mod directory;
mod error;
mod geo;
mod probe;
mod select;
mod sources;
mod traits;
mod types;
mod utils;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Settings;
use directory::Directory;
use error::SpeedError;
use probe::{LatencyProber, LatencyStats, ThroughputProber};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use types::Server;

#[derive(Parser)]
#[command(name = "netspeed", version)]
#[command(about = "Measure latency and bandwidth against the closest speed test servers", long_about = None)]
struct Cli {
    /// Read the server directory from a JSON file instead of speedtest.net
    #[arg(long, global = true)]
    directory: Option<PathBuf>,

    /// Settings file (defaults to settings.toml in the user config dir)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the closest responding servers (e.g., netspeed list --search berlin)
    List {
        /// Server name substring; skips latency probing
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Run latency, download and upload tests (e.g., netspeed test --auto)
    Test {
        /// Server name substring to search candidate servers
        #[arg(long, short)]
        search: Option<String>,

        /// Auto-select the first candidate server
        #[arg(long, short)]
        auto: bool,

        /// Target duration for each bandwidth test, in seconds
        #[arg(long, short = 't', default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..))]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.settings.as_deref())
        .await
        .context("Failed to load settings")?;

    match cli.command {
        Commands::List { search } => {
            handle_list(cli.directory, search.as_deref(), &settings).await?
        }
        Commands::Test {
            search,
            auto,
            duration,
        } => {
            handle_test(
                cli.directory,
                search.as_deref(),
                auto,
                Duration::from_secs(duration),
                &settings,
            )
            .await?
        }
    }

    Ok(())
}

// --- Handlers ---

async fn handle_list(
    directory_file: Option<PathBuf>,
    search: Option<&str>,
    settings: &Settings,
) -> Result<()> {
    let mut dir = load_directory(directory_file).await?;
    gather_candidates(&mut dir, search, settings).await?;
    Ok(())
}

async fn handle_test(
    directory_file: Option<PathBuf>,
    search: Option<&str>,
    auto: bool,
    target: Duration,
    settings: &Settings,
) -> Result<()> {
    let mut dir = load_directory(directory_file).await?;
    let candidates = gather_candidates(&mut dir, search, settings).await?;

    let server = if auto {
        // gather_candidates never returns an empty list
        let first = candidates
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("No servers found"))?;
        println!(
            "\nAuto-selecting closest server for bandwidth test: {} / {}",
            first.name, first.sponsor
        );
        first
    } else {
        match prompt_for_server(&candidates).await? {
            Some(s) => s,
            None => return Ok(()),
        }
    };

    if let Err(e) = full_test(&server, settings, target).await {
        bail!(describe_failure(&e));
    }
    Ok(())
}

async fn load_directory(directory_file: Option<PathBuf>) -> Result<Directory> {
    let source = sources::get_source(directory_file);
    let snapshot = source.fetch().await.with_context(|| {
        format!(
            "Failed to get server list configuration from {}",
            source.name()
        )
    })?;

    let dir = Directory::build(&snapshot.client, snapshot.servers, &snapshot.ignore_ids)?;
    if dir.is_empty() {
        bail!("No acceptable servers found");
    }
    Ok(dir)
}

/// 有搜索词时按名称过滤, 否则按距离逐个测延迟; 结果以表格打印
async fn gather_candidates(
    dir: &mut Directory,
    search: Option<&str>,
    settings: &Settings,
) -> Result<Vec<Server>> {
    if let Some(query) = search {
        let servers = select::filter_by_name(dir, query)?;
        println!("{} Matching servers:", servers.len());
        print_table(&servers, false);
        return Ok(servers);
    }

    println!("Gathering server list and testing...");
    let sel = &settings.select;
    let pb = utils::probe_progress((sel.want_count + sel.max_failures).min(dir.len()) as u64);
    let prober = LatencyProber::new(settings.probe.clone());

    let res = select::select(dir, &prober, sel, |server, _| {
        pb.inc(1);
        pb.set_message(server.name.clone());
    })
    .await;
    pb.finish_and_clear();

    let servers = res?;
    println!("{} Closest responding servers:", servers.len());
    print_table(&servers, true);
    Ok(servers)
}

fn print_table(servers: &[Server], with_latency: bool) {
    let width = if with_latency { 96 } else { 80 };
    println!("{}", "-".repeat(width));
    print!(
        "{:<4} {:<28} {:<28} {:>14}",
        "ID", "Name", "Sponsor", "Distance (km)"
    );
    if with_latency {
        print!(" {:>14}", "Latency");
    }
    println!();
    println!("{}", "-".repeat(width));

    for (i, s) in servers.iter().enumerate() {
        print!(
            "{:<4} {:<28} {:<28} {:>14.2}",
            i,
            truncate(&s.name, 28),
            truncate(&s.sponsor, 28),
            s.distance
        );
        if with_latency {
            let latency = s.latency.map(utils::human_latency).unwrap_or_default();
            print!(" {:>14}", latency);
        }
        println!();
    }
    println!("{}", "-".repeat(width));
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

/// 从标准输入读取服务器编号; 输入 quit/exit 或 EOF 时返回 None
async fn prompt_for_server(servers: &[Server]) -> Result<Option<Server>> {
    println!("Enter server ID for bandwidth test, or \"quit\" to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("ID> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let input = line.trim();
        let lower = input.to_lowercase();
        if lower.starts_with("exit") || lower.starts_with("quit") {
            return Ok(None);
        }

        match input.parse::<usize>() {
            Ok(id) if id < servers.len() => return Ok(Some(servers[id].clone())),
            Ok(id) => eprintln!("No server with ID \"{}\" available", id),
            Err(_) => eprintln!("\"{}\" is not a valid id", input),
        }
    }
}

async fn full_test(
    server: &Server,
    settings: &Settings,
    target: Duration,
) -> std::result::Result<(), SpeedError> {
    let latency = LatencyProber::new(settings.probe.clone());
    let samples = latency
        .ping(server, settings.select.full_sample_count)
        .await?;
    if let Some(stats) = LatencyStats::from_samples(&samples) {
        println!(
            "Latency:  {} avg\t{} median\t{} max\t{} min",
            utils::human_latency(stats.mean),
            utils::human_latency(stats.median),
            utils::human_latency(stats.max),
            utils::human_latency(stats.min)
        );
        println!("          {}", utils::sparkline(&samples));
    }

    let throughput = ThroughputProber::new(settings.probe.clone());
    let down = throughput.downstream(server, target).await?;
    println!("Download: {}", utils::human_speed(down));

    let up = throughput.upstream(server, target).await?;
    println!("Upload:   {}", utils::human_speed(up));
    Ok(())
}

fn describe_failure(e: &SpeedError) -> String {
    match e {
        SpeedError::ConnectionClosed => {
            "Error, the remote server kicked us.\nMaximum request size may have changed".to_string()
        }
        SpeedError::Timeout | SpeedError::Unreachable(_) => {
            "Test failed due to connection timeout. The server may be down, or rejecting us"
                .to_string()
        }
        SpeedError::ShortTransfer { .. } => {
            format!("Test failed, the server ended the transfer early: {}", e)
        }
        SpeedError::ProtocolViolation(_) => {
            format!("Test failed, the server sent an unexpected response: {}", e)
        }
        _ => format!("Test failed with unknown error: {}", e),
    }
}
