// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand};
use periphsim_config::{SocDescriptor, StepAction, StimulusScript};
use periphsim_core::bench::{build_target, BenchTarget};
use periphsim_core::BusTransaction;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

mod vcd_trace;

use vcd_trace::VcdTrace;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "PeriphSim cycle-accurate peripheral simulator",
    long_about = None
)]
struct Cli {
    /// Enable debug-level tracing of model state transitions
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a stimulus script against one peripheral of a SoC descriptor.
    Run(RunArgs),

    /// Validate a SoC descriptor and print its register windows.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the SoC descriptor (YAML)
    #[arg(short, long)]
    soc: PathBuf,

    /// Path to the stimulus script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Write a waveform of the peripheral's signals to this VCD file
    #[arg(long)]
    vcd: Option<PathBuf>,

    /// Directory to write run artifacts (result.json)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Path to the SoC descriptor (YAML)
    #[arg(short, long)]
    soc: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    soc: String,
    peripheral: String,
    kind: String,
    ticks: u64,
    checks: Vec<CheckResult>,
    config: RunConfig,
}

#[derive(Debug, Serialize)]
struct RunConfig {
    soc: PathBuf,
    script: PathBuf,
}

#[derive(Debug, Serialize, Clone)]
struct CheckResult {
    at: u64,
    check: String,
    expected: u32,
    actual: u32,
    passed: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_script(args),
        Commands::Check(args) => run_check(args),
    }
}

fn run_check(args: CheckArgs) -> ExitCode {
    let soc = match SocDescriptor::from_file(&args.soc) {
        Ok(soc) => soc,
        Err(e) => {
            error!("Invalid SoC descriptor {:?}: {:#}", args.soc, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    println!("SoC '{}' ({} peripherals)", soc.name, soc.peripherals.len());
    for config in &soc.peripherals {
        let target = match build_target(config) {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to build '{}': {}", config.id, e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        };
        match target.window() {
            Some(window) => println!(
                "{:<10} {:<10} {:#010x}..{:#010x}",
                config.id,
                target.kind(),
                window.base,
                window.base as u64 + window.size() - 1
            ),
            None => println!("{:<10} {:<10} pin-level only", config.id, target.kind()),
        }
        for reg in target.registers() {
            println!("    {:#05x} {:<12} {:?}", reg.offset, reg.name, reg.access);
        }
    }
    ExitCode::from(EXIT_PASS)
}

struct LoadedRun {
    soc: SocDescriptor,
    script: StimulusScript,
}

fn load_run(args: &RunArgs) -> anyhow::Result<LoadedRun> {
    let soc = SocDescriptor::from_file(&args.soc)?;
    let script = StimulusScript::from_file(&args.script)?;
    script.resolve(&soc)?;
    Ok(LoadedRun { soc, script })
}

/// Reject pins the target does not have before the first tick.
fn check_pins(script: &StimulusScript, target: &dyn BenchTarget) -> anyhow::Result<()> {
    for step in &script.steps {
        let (pin, known) = match &step.action {
            StepAction::Drive { pin, .. } => (pin, target.input_pins()),
            StepAction::ExpectPin { pin, .. } => (pin, target.output_pins()),
            _ => continue,
        };
        if !known.contains(&pin.as_str()) {
            anyhow::bail!(
                "Step at tick {} names pin '{}', {} has: {}",
                step.at,
                pin,
                target.kind(),
                known.join(", ")
            );
        }
    }
    Ok(())
}

fn run_script(args: RunArgs) -> ExitCode {
    let LoadedRun { soc, script } = match load_run(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let Some(config) = soc.peripheral(&script.peripheral) else {
        error!("Peripheral '{}' not found", script.peripheral);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    };

    let mut target = match build_target(config) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to build '{}': {}", config.id, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Err(e) = check_pins(&script, target.as_ref()) {
        error!("Script error: {:#}", e);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let mut vcd = None;
    if let Some(path) = &args.vcd {
        match VcdTrace::create(path, &config.id, &target.signals()) {
            Ok(trace) => vcd = Some(trace),
            Err(e) => {
                error!("{:#}", e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        }
    }

    info!(
        "Running {:?} on '{}' ({}) for {} ticks",
        args.script,
        config.id,
        target.kind(),
        script.limits.max_ticks
    );
    let checks = match execute_script(&script, target.as_mut(), vcd.as_mut()) {
        Ok(checks) => checks,
        Err(e) => {
            error!("Stimulus error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let failed = checks.iter().filter(|c| !c.passed).count();
    for check in checks.iter().filter(|c| !c.passed) {
        error!(
            "Tick {}: {} expected {:#x}, got {:#x}",
            check.at, check.check, check.expected, check.actual
        );
    }
    let status = if failed == 0 { "pass" } else { "fail" };
    info!(
        "{}: {} checks, {} failed",
        status.to_uppercase(),
        checks.len(),
        failed
    );

    let result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        soc: soc.name.clone(),
        peripheral: config.id.clone(),
        kind: target.kind().to_string(),
        ticks: script.limits.max_ticks,
        checks,
        config: RunConfig {
            soc: args.soc.clone(),
            script: args.script.clone(),
        },
    };
    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = write_result(output_dir, &result) {
            error!("{:#}", e);
        }
    }

    if failed > 0 {
        ExitCode::from(EXIT_ASSERT_FAIL)
    } else {
        ExitCode::from(EXIT_PASS)
    }
}

fn write_result(output_dir: &Path, result: &RunResult) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
    let path = output_dir.join("result.json");
    let f = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(f, result).context("Failed to write result.json")?;
    Ok(())
}

fn bus_address(config_base: Option<u32>, offset: u32) -> anyhow::Result<u32> {
    let base = config_base.context("Bus step on a peripheral without a bus window")?;
    Ok(base.wrapping_add(offset))
}

/// Drive the bench through every tick of the script.
///
/// Per tick: pin drives are latched first, then reset and the bus access
/// of that tick go into a single model step. Read expectations compare
/// against the data of that step, pin expectations against the outputs
/// it produced.
fn execute_script(
    script: &StimulusScript,
    target: &mut dyn BenchTarget,
    mut vcd: Option<&mut VcdTrace>,
) -> anyhow::Result<Vec<CheckResult>> {
    let base = target.window().map(|w| w.base);
    let mut checks = Vec::new();
    let mut pending = script.steps.as_slice();

    if let Some(trace) = vcd.as_deref_mut() {
        trace.sample(0, &target.signals())?;
    }

    for tick in 0..script.limits.max_ticks {
        let due_len = pending.iter().take_while(|s| s.at == tick).count();
        let (due, rest) = pending.split_at(due_len);
        pending = rest;

        let mut reset = false;
        let mut bus = BusTransaction::idle();
        for step in due {
            match &step.action {
                StepAction::Drive { pin, value } => target
                    .drive(pin, *value)
                    .with_context(|| format!("Tick {}: drive '{}'", tick, pin))?,
                StepAction::Reset => reset = true,
                StepAction::Write { offset, value } => {
                    bus = BusTransaction::write(bus_address(base, *offset)?, *value)
                }
                StepAction::Read { offset, .. } => {
                    bus = BusTransaction::read(bus_address(base, *offset)?)
                }
                StepAction::ExpectPin { .. } => {}
            }
        }

        let data = target.step(reset, &bus);

        for step in due {
            match &step.action {
                StepAction::Read {
                    offset,
                    expect: Some(expect),
                    mask,
                } => {
                    let mask = mask.unwrap_or(u32::MAX);
                    checks.push(CheckResult {
                        at: tick,
                        check: format!("read {:#x}", offset),
                        expected: expect & mask,
                        actual: data & mask,
                        passed: data & mask == expect & mask,
                    });
                }
                StepAction::ExpectPin { pin, value } => {
                    let actual = target.pin_level(pin).unwrap_or_default();
                    checks.push(CheckResult {
                        at: tick,
                        check: format!("pin {}", pin),
                        expected: *value,
                        actual,
                        passed: actual == *value,
                    });
                }
                _ => {}
            }
        }

        if let Some(trace) = vcd.as_deref_mut() {
            trace.sample(tick + 1, &target.signals())?;
        }
    }

    Ok(checks)
}
