use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use ga4tool_core::channels::merge_channel_rules;
use ga4tool_core::config::{ToolConfig, ensure_property_id, load_config, resolve_config_path};
use ga4tool_core::render::{OutputFormat, render, write_output_file};
use ga4tool_core::reports::{compile_request, execute_report, load_report_spec};

#[derive(Debug, Parser)]
#[command(
    name = "ga4tool",
    version,
    about = "GA4 channel-group rule merge and Data API report runner"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Path to ga4tool.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Append missing catalog rules to a GA4 channel group")]
    Channels(ChannelsArgs),
    #[command(about = "Run a GA4 Data API report from a JSON spec file")]
    Reports(ReportsArgs),
}

#[derive(Debug, Args)]
struct ChannelsArgs {
    #[arg(
        short = 'p',
        long,
        value_name = "PROPERTY",
        help = "GA4 property (e.g. properties/123456789)"
    )]
    property: Option<String>,
    #[arg(
        short = 'g',
        long,
        value_name = "NAME",
        help = "Target channel group display name"
    )]
    group: Option<String>,
}

#[derive(Debug, Args)]
struct ReportsArgs {
    #[arg(short = 's', long, value_name = "PATH", help = "Report spec JSON file")]
    spec: PathBuf,
    #[arg(
        short = 'p',
        long,
        value_name = "PROPERTY",
        help = "GA4 property (overrides the spec file and config)"
    )]
    property: Option<String>,
    #[arg(
        short = 'f',
        long,
        value_name = "FORMAT",
        default_value = "table",
        help = "Output format (csv|json|ndjson|table)"
    )]
    format: String,
    #[arg(
        short = 'o',
        long,
        value_name = "PATH",
        help = "Write rendered output to a file instead of stdout"
    )]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Channels(args)) => run_channels(&config, args),
        Some(Commands::Reports(args)) => run_reports(&config, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn load_runtime_config(explicit: Option<&Path>) -> Result<ToolConfig> {
    dotenvy::dotenv().ok();
    let path = resolve_config_path(explicit);
    load_config(&path)
}

fn run_channels(config: &ToolConfig, args: ChannelsArgs) -> Result<()> {
    let Some(property) = args.property.clone().or_else(|| config.property()) else {
        bail!(
            "missing GA4 property id: use --property properties/123456789 or set GA4_PROPERTY_ID"
        );
    };
    let property = property.trim().to_string();
    ensure_property_id(&property)?;

    let group = match args.group.as_deref().map(str::trim) {
        Some(group) if !group.is_empty() => group.to_string(),
        _ => config.channel_group(),
    };
    let catalog = config.rule_catalog();

    println!("property: {property}");
    println!("channel_group: {group}");
    println!("catalog_rules: {}", catalog.len());

    let report = merge_channel_rules(config, &property, &group, &catalog)?;

    println!("group_name: {}", report.group_name);
    println!("group_display_name: {}", report.group_display_name);
    println!("updated: {}", report.updated);
    if report.added.is_empty() {
        println!("added_rules: 0 (all catalog rules already present)");
    } else {
        println!("added_rules: {}", report.added.len());
        for name in &report.added {
            println!("  - {name}");
        }
    }
    println!("requests: {}", report.request_count);

    Ok(())
}

fn run_reports(config: &ToolConfig, args: ReportsArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let spec = load_report_spec(&args.spec)?;

    let Some(property) = args
        .property
        .clone()
        .or_else(|| spec.property.clone())
        .or_else(|| config.property())
    else {
        bail!(
            "missing GA4 property id: use --property, set GA4_PROPERTY_ID, or add `property` to the spec file"
        );
    };
    let property = property.trim().to_string();
    ensure_property_id(&property)?;

    let request = compile_request(&property, &spec)?;
    let table = execute_report(config, &request)?;
    let rendered = render(&table, format)?;

    match args.out {
        Some(path) => {
            write_output_file(&rendered, &path)?;
            println!("wrote output: {}", normalize_path(&path));
            println!("rows: {}", table.rows.len());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
