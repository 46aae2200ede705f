use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use zeroblur::decode::load_burst_from_paths;
use zeroblur::focus_stack::align::AlignOutcome;
use zeroblur::focus_stack::progress::{LogSink, ProgressSink};
use zeroblur::focus_stack::{stack_frames, FocusStackSummary};
use zeroblur::storage::{burst_start_time, parse_timestamp, save_frame};
use zeroblur::ZeroBlurConfig;

const USAGE: &str = "Usage: zeroblur-cli <command> [args]

Commands:
  stack <output_dir> <image>... [--levels N] [--max-dim D] [--no-align]
        [--config PATH] [--quality Q] [--timestamp yyyyMMdd_HHmmss] [--json]
  default-config [PATH]";

fn main() {
    zeroblur::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    let result = match command.as_str() {
        "stack" => cmd_stack(&args),
        "default-config" => cmd_default_config(&args),
        "--help" | "-h" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}\n{}", command, USAGE);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct StackArgs {
    output_dir: Option<PathBuf>,
    inputs: Vec<PathBuf>,
    levels: Option<u32>,
    max_dim: Option<u32>,
    no_align: bool,
    config_path: Option<PathBuf>,
    quality: Option<u8>,
    timestamp: Option<String>,
    json: bool,
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn parse_stack_args(args: &[String]) -> Result<StackArgs> {
    let mut parsed = StackArgs::default();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--levels" => {
                i += 1;
                parsed.levels = Some(flag_value(args, i, "--levels")?.parse()?);
            }
            "--max-dim" => {
                i += 1;
                parsed.max_dim = Some(flag_value(args, i, "--max-dim")?.parse()?);
            }
            "--quality" => {
                i += 1;
                parsed.quality = Some(flag_value(args, i, "--quality")?.parse()?);
            }
            "--config" => {
                i += 1;
                parsed.config_path = Some(PathBuf::from(flag_value(args, i, "--config")?));
            }
            "--timestamp" => {
                i += 1;
                parsed.timestamp = Some(flag_value(args, i, "--timestamp")?.to_string());
            }
            "--no-align" => parsed.no_align = true,
            "--json" => parsed.json = true,
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => {
                if parsed.output_dir.is_none() {
                    parsed.output_dir = Some(PathBuf::from(other));
                } else {
                    parsed.inputs.push(PathBuf::from(other));
                }
            }
        }
        i += 1;
    }

    Ok(parsed)
}

#[derive(Serialize)]
struct StackReport {
    output: PathBuf,
    #[serde(flatten)]
    summary: FocusStackSummary,
    alignment: Vec<String>,
}

fn describe_outcome(outcome: &AlignOutcome) -> String {
    match outcome {
        AlignOutcome::Reference => "reference".to_string(),
        AlignOutcome::Skipped => "skipped".to_string(),
        AlignOutcome::Aligned {
            correlation,
            converged,
            ..
        } => format!("aligned (correlation {:.4}, converged {})", correlation, converged),
        AlignOutcome::Fallback { reason } => format!("fallback ({})", reason),
    }
}

fn cmd_stack(args: &[String]) -> Result<()> {
    let parsed = parse_stack_args(args)?;
    let output_dir = parsed
        .output_dir
        .ok_or_else(|| anyhow!("output_dir required\n{}", USAGE))?;
    if parsed.inputs.is_empty() {
        bail!("at least one input image required\n{}", USAGE);
    }

    let mut config = match &parsed.config_path {
        Some(path) => ZeroBlurConfig::load_from_file(path)
            .with_context(|| format!("loading config {:?}", path))?,
        None => ZeroBlurConfig::load_or_default(),
    };
    if let Some(levels) = parsed.levels {
        config.stack.blend_levels = levels;
    }
    if let Some(max_dim) = parsed.max_dim {
        config.stack.align.target_max_dim = max_dim;
    }
    if let Some(quality) = parsed.quality {
        config.output.jpeg_quality = quality;
    }
    if parsed.no_align {
        config.stack.enable_alignment = false;
    }
    config.validate().map_err(|e| anyhow!("invalid configuration: {}", e))?;

    let burst_time = match &parsed.timestamp {
        Some(value) => parse_timestamp(value)?,
        None => burst_start_time(&parsed.inputs)
            .unwrap_or_else(|| chrono::Local::now().naive_local()),
    };
    let mut sink = LogSink;

    let frames = load_burst_from_paths(&parsed.inputs, &mut sink)?;
    let result = stack_frames(frames, &config.stack, &mut sink)?;

    sink.report("Saving result...");
    let output = save_frame(
        &result.merged_frame,
        &output_dir,
        &config.output.filename_prefix,
        &burst_time,
        config.output.jpeg_quality,
    )?;

    if parsed.json {
        let report = StackReport {
            output,
            summary: result.summary(),
            alignment: result.alignment.iter().map(describe_outcome).collect(),
        };
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", output.display());
    }
    Ok(())
}

fn cmd_default_config(args: &[String]) -> Result<()> {
    let path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(ZeroBlurConfig::default_path);
    ZeroBlurConfig::default()
        .save_to_file(&path)
        .with_context(|| format!("writing {:?}", path))?;
    println!("{}", path.display());
    Ok(())
}
