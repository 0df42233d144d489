use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use code_sim::args::{ArgValue, pack_arguments};
use code_sim::{
    CodeSimulator, EntryPoints, ExecutionContext, JValue, MethodDescriptor, Shorty,
    SimulationPolicy, SimulatorOptions,
};

#[derive(Parser)]
#[command(name = "code-sim")]
#[command(about = "Run compiled arm64 methods on a simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether each method name would be simulated
    Check {
        #[arg(required = true, help = "Pretty method names")]
        names: Vec<String>,

        #[arg(long, help = "Only simulate methods matching --allow")]
        allow_list_mode: bool,

        #[arg(long = "allow", help = "Allow-list substring (replaces the defaults)")]
        allow: Vec<String>,

        #[arg(long = "deny", help = "Deny-list substring (replaces the defaults)")]
        deny: Vec<String>,
    },
    /// Invoke a code file as a method and print the result as JSON
    Run {
        #[arg(help = "Hex instruction words, one per line, '#' starts a comment")]
        code: PathBuf,

        #[arg(short, long, help = "Shorty descriptor, e.g. 'IJF'")]
        shorty: String,

        #[arg(long, help = "Instance method; --receiver is passed first")]
        instance: bool,

        #[arg(long, default_value_t = 0, help = "Receiver reference for instance methods")]
        receiver: i32,

        #[arg(long = "arg", help = "Argument as TYPE:VALUE with TYPE one of I, J, F, D")]
        args: Vec<String>,

        #[arg(long, default_value = "0x10000000", value_parser = parse_u64, help = "Load address")]
        base: u64,

        #[arg(long, help = "Abort after this many instructions")]
        max_steps: Option<u64>,

        #[arg(long, help = "Trace every executed instruction")]
        trace: bool,

        #[arg(long, help = "Report the GC as marking to the compiled code")]
        marking: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            names,
            allow_list_mode,
            allow,
            deny,
        } => {
            let mut policy = SimulationPolicy::default().with_allow_list_mode(allow_list_mode);
            if !allow.is_empty() {
                policy = policy.with_allow_list(allow);
            }
            if !deny.is_empty() {
                policy = policy.with_deny_list(deny);
            }
            for name in names {
                let verdict = if policy.can_simulate(&name) {
                    "simulate"
                } else {
                    "native"
                };
                println!("{verdict}\t{name}");
            }
        }
        Commands::Run {
            code,
            shorty,
            instance,
            receiver,
            args,
            base,
            max_steps,
            trace,
            marking,
        } => {
            let words = read_code(&code)?;
            let shorty = Shorty::new(&shorty).context("Invalid shorty")?;

            let mut values = Vec::new();
            if instance {
                values.push(ArgValue::Int(receiver));
            }
            for arg in &args {
                values.push(parse_arg(arg)?);
            }

            let options = SimulatorOptions::default()
                .with_max_steps(max_steps)
                .with_trace(trace);
            let mut sim = CodeSimulator::with_options(options)
                .context("This host cannot run the simulator")?;
            sim.install_entry_points(&logging_entry_points());
            sim.map_code(base, &words)
                .with_context(|| format!("Failed to map code at {base:#x}"))?;

            let name = code.display().to_string();
            let method = CliMethod {
                name: name.clone(),
                entry: base,
            };
            let context = CliContext { marking };
            let mut result = JValue::Void;
            sim.invoke(
                &method,
                &pack_arguments(&values),
                &context,
                &mut result,
                &shorty,
                !instance,
            )
            .with_context(|| format!("Simulation of {name} failed"))?;

            let output = serde_json::json!({
                "method": name,
                "shorty": shorty.as_str(),
                "result": result_json(result),
            });
            println!("{output}");
        }
    }

    Ok(())
}

struct CliMethod {
    name: String,
    entry: u64,
}

impl MethodDescriptor for CliMethod {
    fn handle(&self) -> u64 {
        0
    }

    fn pretty_name(&self) -> String {
        self.name.clone()
    }

    fn is_abstract(&self) -> bool {
        false
    }

    fn is_native(&self) -> bool {
        false
    }

    fn can_be_simulated(&self) -> bool {
        true
    }

    fn quick_code(&self) -> Option<u64> {
        Some(self.entry)
    }
}

struct CliContext {
    marking: bool,
}

impl ExecutionContext for CliContext {
    fn handle(&self) -> u64 {
        0
    }

    fn is_gc_marking(&self) -> bool {
        self.marking
    }
}

extern "C" fn log_test_suspend() {
    info!("runtime: test_suspend");
}

extern "C" fn log_alloc_object(klass: usize) -> usize {
    info!(klass = format_args!("{klass:#x}"), "runtime: alloc_object_initialized");
    0
}

extern "C" fn log_alloc_array8(klass: usize, count: i32) -> usize {
    info!(klass = format_args!("{klass:#x}"), count, "runtime: alloc_array_resolved8");
    0
}

extern "C" fn log_alloc_array16(klass: usize, count: i32) -> usize {
    info!(klass = format_args!("{klass:#x}"), count, "runtime: alloc_array_resolved16");
    0
}

extern "C" fn log_alloc_array32(klass: usize, count: i32) -> usize {
    info!(klass = format_args!("{klass:#x}"), count, "runtime: alloc_array_resolved32");
    0
}

extern "C" fn log_alloc_array64(klass: usize, count: i32) -> usize {
    info!(klass = format_args!("{klass:#x}"), count, "runtime: alloc_array_resolved64");
    0
}

/// Entry points that log the call and return a null reference.
fn logging_entry_points() -> EntryPoints {
    EntryPoints {
        test_suspend: log_test_suspend,
        alloc_object_initialized: log_alloc_object,
        alloc_array_resolved8: log_alloc_array8,
        alloc_array_resolved16: log_alloc_array16,
        alloc_array_resolved32: log_alloc_array32,
        alloc_array_resolved64: log_alloc_array64,
    }
}

fn result_json(result: JValue) -> serde_json::Value {
    match result {
        JValue::Void => serde_json::json!({ "type": "void" }),
        JValue::Int(v) => serde_json::json!({ "type": "int", "value": v }),
        JValue::Long(v) => serde_json::json!({ "type": "long", "value": v }),
        JValue::Float(v) => serde_json::json!({ "type": "float", "value": v }),
        JValue::Double(v) => serde_json::json!({ "type": "double", "value": v }),
    }
}

fn parse_u64(text: &str) -> Result<u64> {
    let value = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    value.with_context(|| format!("invalid address '{text}'"))
}

/// Parse `TYPE:VALUE`.
fn parse_arg(text: &str) -> Result<ArgValue> {
    let (ty, value) = text
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("invalid argument '{text}', expected TYPE:VALUE"))?;
    let parsed = match ty {
        "I" => value.parse().map(ArgValue::Int).map_err(anyhow::Error::from),
        "J" => value.parse().map(ArgValue::Long).map_err(anyhow::Error::from),
        "F" => value.parse().map(ArgValue::Float).map_err(anyhow::Error::from),
        "D" => value.parse().map(ArgValue::Double).map_err(anyhow::Error::from),
        _ => anyhow::bail!("unknown argument type '{ty}' in '{text}', expected I, J, F or D"),
    };
    parsed.with_context(|| format!("invalid value in argument '{text}'"))
}

/// Read a code file.
///
/// Format (one little-endian instruction word per line):
/// ```text
/// # return 42
/// d2800540    # movz x0, #0x2a
/// d65f03c0    # ret
/// ```
fn read_code(path: &Path) -> Result<Vec<u32>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let mut words = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.split_once('#').map_or(line, |(code, _)| code).trim();
        if line.is_empty() {
            continue;
        }
        let hex = line.strip_prefix("0x").unwrap_or(line);
        let word = u32::from_str_radix(hex, 16).with_context(|| {
            format!(
                "{}:{}: invalid instruction word '{line}'",
                path.display(),
                line_num + 1
            )
        })?;
        words.push(word);
    }

    if words.is_empty() {
        anyhow::bail!("{}: no instructions", path.display());
    }
    Ok(words)
}
