//! CLI entry point: run the scenario suite against a chosen runtime
//! configuration and emit a JSON report.

use clap::{Parser, ValueEnum};

use redfence_core::{BackendKind, ShadowEncoding, config};
use redfence_harness::{SuiteOptions, run_suite};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Bucketed address index (back-end A).
    Buckets,
    /// Shadow-memory bitmap (back-end B).
    Shadow,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingArg {
    /// ASAN-style word granularity.
    Word,
    /// One bit per user byte.
    Bit,
}

/// Scenario-driven verification harness for the redfence runtime.
#[derive(Debug, Parser)]
#[command(name = "harness", version)]
struct Args {
    /// Registry back-end to exercise.
    #[arg(long, value_enum, default_value = "buckets")]
    backend: BackendArg,

    /// Shadow encoding (shadow back-end only).
    #[arg(long, value_enum, default_value = "word")]
    encoding: EncodingArg,

    /// Serve small allocations from the size-class pools (implies the
    /// shadow back-end).
    #[arg(long)]
    free_lists: bool,

    /// Disable band painting and the constant-time byte compare; every
    /// verdict then comes from the registry alone.
    #[arg(long)]
    no_fast_check: bool,

    /// Base address of the shadow reservation (hex accepted with 0x).
    #[arg(long, value_parser = parse_address)]
    shadow_base: Option<usize>,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pretty: bool,
}

fn parse_address(raw: &str) -> Result<usize, String> {
    let parsed = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16)
    } else {
        raw.parse()
    };
    parsed.map_err(|err| format!("invalid address {raw:?}: {err}"))
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let options = SuiteOptions {
        backend: if args.free_lists {
            BackendKind::Shadow
        } else {
            match args.backend {
                BackendArg::Buckets => BackendKind::Buckets,
                BackendArg::Shadow => BackendKind::Shadow,
            }
        },
        encoding: match args.encoding {
            EncodingArg::Word => ShadowEncoding::Word,
            EncodingArg::Bit => ShadowEncoding::Bit,
        },
        free_lists: args.free_lists,
        fast_check: !args.no_fast_check && !args.free_lists,
        shadow_base: args.shadow_base.unwrap_or(config::SHADOW_BASE),
    };

    let report = match run_suite(&options) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("harness: {err}");
            return std::process::ExitCode::from(2);
        }
    };

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };
    match rendered {
        Ok(text) => println!("{text}"),
        Err(err) => {
            eprintln!("harness: failed to render report: {err}");
            return std::process::ExitCode::from(2);
        }
    }

    if report.passed {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::FAILURE
    }
}
