use std::path::Path;

use {
    anyhow::{Result, bail},
    ferry_config::{Severity, validate},
    ferry_relay::{RelayMapping, SinkTarget},
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub fn check(explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let Some(path) = explicit
        .map(Path::to_path_buf)
        .or_else(ferry_config::find_config_file)
    else {
        bail!("no config file found (ferry.toml, ferry.yaml, ferry.yml or ferry.json)");
    };
    eprintln!("Checking {}\n", path.display());

    let config = ferry_config::load_config(&path)?;
    let result = validate(&config);

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    let mapping = RelayMapping::from_routes(&config.relay.routes)?;
    eprintln!(
        "\n{} channel(s), {} target(s), polling every {}s",
        mapping.channel_count(),
        mapping.target_count(),
        config.relay.poll_interval_secs
    );
    for (channel, targets) in mapping.iter() {
        eprintln!("  {BOLD}{channel}{RESET}");
        for target in targets {
            print_target(target);
        }
    }

    Ok(())
}

fn print_target(target: &SinkTarget) {
    eprintln!(
        "    → {} ({})",
        target.display_name,
        target.redacted_endpoint()
    );
}
