use anyhow::Result;
use clap::Parser;
use class_registrar::bootstrap::{Registrar, RegistrationReport};
use class_registrar::cli::{Cli, Commands, OutputFormat};
use class_registrar::config::{RegistrarConfig, resolve_config};
use class_registrar::model::{CandidateType, ClassDescriptor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut config = resolve_config(&cli)?;

    match cli.command.clone() {
        Commands::Scan {
            packages,
            marker,
            entry_point,
            on_key_conflict,
            format,
        } => {
            apply_scan_overrides(&mut config, packages, marker, entry_point);
            if let Some(policy) = on_key_conflict {
                config.key_conflict = policy.into();
            }

            let start = Instant::now();
            let registrar = Registrar::new(config);
            let registry = registrar.new_registry();
            let report = registrar.register(&registry);
            let output = ScanOutput::new(
                &report,
                registry.snapshot().values().cloned().collect(),
                start.elapsed().as_millis() as u64,
            );
            write_scan_output(&output, format)?;
        }
        Commands::Inspect { class_name, format } => {
            let registrar = Registrar::new(config);
            let descriptor = registrar.describe(class_name.trim())?;
            write_inspect_output(&descriptor, format)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays parseable. Override with `RUST_LOG`.
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn apply_scan_overrides(
    config: &mut RegistrarConfig,
    packages: Vec<String>,
    marker: Option<String>,
    entry_point: Option<String>,
) {
    if !packages.is_empty() {
        config.base_packages = packages;
    }
    if let Some(marker) = marker {
        config.marker = marker;
    }
    if let Some(entry_point) = entry_point {
        config.entry_point = Some(entry_point);
    }
}

#[derive(Debug, Serialize)]
struct ScanOutput {
    packages: Vec<String>,
    classes_scanned: usize,
    registered: usize,
    duration_ms: u64,
    components: Vec<CandidateType>,
    issues: BTreeMap<&'static str, usize>,
}

impl ScanOutput {
    fn new(report: &RegistrationReport, components: Vec<CandidateType>, duration_ms: u64) -> Self {
        let mut issues = BTreeMap::new();
        for e in report.scan.issues.iter().chain(report.merge.issues.iter()) {
            *issues.entry(e.kind()).or_insert(0) += 1;
        }
        Self {
            packages: report.scan.packages.clone(),
            classes_scanned: report.scan.classes_seen,
            registered: components.len(),
            duration_ms,
            components,
            issues,
        }
    }
}

fn write_scan_output(output: &ScanOutput, format: OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(output)?,
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("packages: {}\n", output.packages.join(", ")));
            out.push_str(&format!("classes_scanned: {}\n", output.classes_scanned));
            out.push_str(&format!("registered: {}\n", output.registered));
            out.push_str(&format!("duration_ms: {}\n", output.duration_ms));
            for c in &output.components {
                out.push_str(&format!("- {}: {} ({})\n", c.key, c.name, c.origin));
            }
            for (kind, count) in &output.issues {
                out.push_str(&format!("! {kind}: {count}\n"));
            }
            out
        }
    };
    print_content(&content);
    Ok(())
}

fn write_inspect_output(descriptor: &ClassDescriptor, format: OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(descriptor)?,
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("class: {}\n", descriptor.name));
            out.push_str(&format!("origin: {}\n", descriptor.origin));
            if let Some(superclass) = &descriptor.superclass {
                out.push_str(&format!("extends: {superclass}\n"));
            }
            for i in &descriptor.interfaces {
                out.push_str(&format!("implements: {i}\n"));
            }
            for a in &descriptor.annotations {
                out.push_str(&format!("@{}\n", a.type_name));
                for (name, value) in &a.elements {
                    out.push_str(&format!("  {name} = {value:?}\n"));
                }
            }
            out
        }
    };
    print_content(&content);
    Ok(())
}

fn print_content(content: &str) {
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
}
