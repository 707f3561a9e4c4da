use anyhow::Context;
use clap::{Parser, Subcommand};
use fpga_common::db::device::Device;
use fpga_common::db::parser::{fabric, netlist};
use fpga_common::util::config::Config;
use fpga_common::util::generator::{self, GeneratorParams};
use fpga_common::util::profiler::ScopedTimer;
use fpga_common::util::{check, logger, visualization};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route the configured netlist and write the routed result.
    Route,
    /// Verify an already routed netlist against its fabric.
    Check,
    /// Write a random grid fabric and netlist.
    Generate {
        #[arg(long, default_value_t = 20)]
        columns: i32,
        #[arg(long, default_value_t = 20)]
        rows: i32,
        #[arg(long, default_value_t = 2)]
        tracks: u32,
        #[arg(long, default_value_t = 40)]
        nets: usize,
        #[arg(long, default_value_t = 4)]
        max_fanout: usize,
        #[arg(long, default_value_t = 6)]
        radius: i32,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value = "inputs/random.fab")]
        fabric: String,
        #[arg(long, default_value = "inputs/random.nets")]
        netlist: String,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .with_context(|| format!("Failed to read config file {:?}", args.config))?;
        toml::from_str(&config_str).context("Failed to parse config TOML")?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };

    match args.command.unwrap_or(Commands::Route) {
        Commands::Generate {
            columns,
            rows,
            tracks,
            nets,
            max_fanout,
            radius,
            seed,
            fabric,
            netlist,
        } => {
            prepare_output_dir(&fabric)?;
            prepare_output_dir(&netlist)?;
            let params = GeneratorParams {
                columns: columns.max(2),
                rows: rows.max(2),
                tracks: tracks.max(1),
                nets,
                max_fanout: max_fanout.max(1),
                radius: radius.max(1),
                seed,
            };
            log::info!(
                "Generating random benchmark ({}x{} tiles, {} tracks, {} nets)...",
                params.columns,
                params.rows,
                params.tracks,
                params.nets
            );
            generator::generate_random_design(&fabric, &netlist, &params)?;
            log::info!("Generated: {} and {}", fabric, netlist);
        }
        Commands::Route => {
            validate_input_paths(&config)?;
            if let Err(e) = run_routing(&config) {
                log::error!("{:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Check => {
            let _t = ScopedTimer::new("Check");
            let device = fabric::parse(&config.input.fabric_file)?;
            let design = netlist::parse(&config.output.routed_netlist, &device)?;
            check::run(&design).map_err(|e| anyhow::anyhow!("Verification Failed: {}", e))?;
        }
    }

    Ok(())
}

fn validate_input_paths(config: &Config) -> anyhow::Result<()> {
    for path in [&config.input.fabric_file, &config.input.netlist_file] {
        if !Path::new(path).exists() {
            anyhow::bail!("Input file missing: {}. Did you run 'generate'?", path);
        }
    }
    Ok(())
}

fn prepare_output_dir(path_str: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path_str).parent()
        && !parent.exists()
        && !parent.as_os_str().is_empty()
    {
        log::info!("Creating output directory: {:?}", parent);
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn run_routing(config: &Config) -> anyhow::Result<()> {
    let device = {
        let _t = ScopedTimer::new("Fabric parsing");
        log::info!("Parsing fabric: {}", config.input.fabric_file);
        Arc::new(fabric::parse(&config.input.fabric_file)?)
    };
    let mut design = netlist::parse(&config.input.netlist_file, &device)?;
    log::info!(
        "Design '{}': {} nets, {} pins on a {}x{} fabric",
        design.name,
        design.num_nets(),
        design.num_pins(),
        device.columns(),
        device.rows()
    );

    log::info!("Starting Routing...");
    let report = fpga_router::route(&mut design, device.clone(), &config.routing).inspect_err(|e| {
        log::error!("Routing aborted: {}", e);
    })?;
    log::info!("Routing summary:\n{}", report);

    let routed = &config.output.routed_netlist;
    prepare_output_dir(routed)?;
    log::info!("Writing routed netlist to {}", routed);
    netlist::write(&design, &device, routed)?;

    if let Some(heat_map) = &config.output.heat_map {
        prepare_output_dir(heat_map)?;
        log::info!("Generating usage heat map...");
        visualization::draw_usage_heat_map(
            &design,
            device.as_ref(),
            heat_map,
            config.output.heat_map_size,
        )
        .with_context(|| format!("writing {}", heat_map))?;
    }

    check::run(&design).map_err(|e| {
        log::error!("Routed design failed verification");
        anyhow::anyhow!("Verification Failed: {}", e)
    })?;

    if !report.converged {
        anyhow::bail!("router did not converge after {} iterations", report.iterations);
    }
    Ok(())
}
