use std::path::PathBuf;
use std::process;
use std::time::Duration;

use bytesize::ByteSize;
use clap::Parser;
use host_monitor_lib::{
    max_total_capacity, MetricsSampler, MetricsSnapshot, SamplerConfig, VolumeEnumerator,
    SAMPLER_CONFIG,
};
use log::info;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

#[derive(Parser, Debug)]
#[command(name = "host-monitor", about = "Samples CPU, memory and volume usage")]
struct Args {
    /// Config file (defaults to $HOST_MONITOR_CONFIG or the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List mounted volumes and exit
    #[arg(long)]
    volumes: bool,

    /// Stop after this many CPU periods
    #[arg(long)]
    count: Option<u64>,

    /// Print each snapshot as one JSON line
    #[arg(long)]
    json: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = TermLogger::init(
        match args.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            2.. => LevelFilter::Trace,
        },
        ConfigBuilder::new()
            .add_filter_ignore_str("mio")
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Error: failed to initialize logging: {}", e);
        process::exit(1);
    }

    let config = match args.config.as_deref() {
        Some(path) => match SamplerConfig::from_path(path) {
            Ok(config) => config.validated(),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(2);
            }
        },
        None => SAMPLER_CONFIG.clone(),
    };

    if args.volumes {
        let volumes = VolumeEnumerator::from_config(&config).list_volumes();
        for volume in &volumes {
            println!("{}", volume);
        }
        println!(
            "largest volume: {}",
            ByteSize::b(max_total_capacity(&volumes))
        );
        return;
    }

    let sampler = match MetricsSampler::spawn(&config) {
        Ok(sampler) => sampler,
        Err(e) => {
            eprintln!("Error: failed to start sampler: {}", e);
            process::exit(1);
        }
    };
    sampler.wait_until_ready().await;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.cpu_period_ms));
    let mut printed = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let snapshot = sampler.latest_snapshot().await;
                if args.json {
                    match serde_json::to_string(&snapshot) {
                        Ok(line) => println!("{}", line),
                        Err(e) => eprintln!("Error: {}", e),
                    }
                } else {
                    print_snapshot(&snapshot);
                }
                printed += 1;
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
        }
    }

    sampler.cancel();
    info!("host-monitor exiting");
}

fn print_snapshot(snapshot: &MetricsSnapshot) {
    match snapshot.cpu.value {
        Some(cpu) => println!("cpu    {}", cpu),
        None => println!("cpu    waiting for a reading"),
    }
    match snapshot.memory.value {
        Some(memory) => println!("memory {}", memory),
        None => println!("memory unknown"),
    }
}
