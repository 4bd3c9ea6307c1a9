use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bulletin_report::{
    BulletinConfig, JsonMetricSource, Language, OutputSink, ReportGenerator, ReportKind,
    TagCatalog, TagRegistry, ValidatedTemplate,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Fill hydrological bulletin templates (.xlsx) with station data.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a template and print where its tags are.
    Validate {
        #[arg(long)]
        template: PathBuf,

        /// Report kind the template is for (`daily` or `decadal`).
        #[arg(long, default_value = "daily")]
        kind: ReportKind,

        /// Worksheet holding the template (default: first sheet).
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Print the tags available for a report kind as JSON.
    Tags {
        #[arg(long, default_value = "daily")]
        kind: ReportKind,
    },
    /// Generate a bulletin.
    Generate {
        #[arg(long)]
        template: PathBuf,

        /// Stations and observations (JSON).
        #[arg(long)]
        data: PathBuf,

        /// Bulletin date (YYYY-MM-DD).
        #[arg(long)]
        date: NaiveDate,

        /// Overrides `report_kind` from the config file.
        #[arg(long)]
        kind: Option<ReportKind>,

        /// Overrides `language` from the config file (`en`, `ru` or `ky`).
        #[arg(long)]
        language: Option<Language>,

        /// Overrides `sheet` from the config file.
        #[arg(long)]
        sheet: Option<String>,

        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Output workbook, or `-` for stdout.
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Validate {
            template,
            kind,
            sheet,
        } => {
            let mut generator = ReportGenerator::open(&template, kind)
                .with_context(|| format!("open template {}", template.display()))?;
            if let Some(sheet) = sheet {
                generator = generator.with_sheet(sheet);
            }
            let validated = generator
                .validate()
                .with_context(|| format!("validate template {}", template.display()))?;
            print_layout(validated)?;
        }
        Command::Tags { kind } => {
            let catalog = TagCatalog::for_report_kind(TagRegistry::builtin(), kind);
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &catalog)?;
            writeln!(stdout)?;
        }
        Command::Generate {
            template,
            data,
            date,
            kind,
            language,
            sheet,
            config,
            output,
        } => {
            let mut config = match &config {
                Some(path) => BulletinConfig::from_path(path)
                    .with_context(|| format!("read config {}", path.display()))?,
                None => BulletinConfig::default(),
            };
            if let Some(kind) = kind {
                config.report_kind = kind;
            }
            if let Some(language) = language {
                config.language = language;
            }
            if sheet.is_some() {
                config.sheet = sheet;
            }

            let source = JsonMetricSource::from_path(&data)
                .with_context(|| format!("read station data {}", data.display()))?;
            let mut generator = ReportGenerator::open_with_config(&template, &config)
                .with_context(|| format!("open template {}", template.display()))?;
            generator
                .validate()
                .with_context(|| format!("validate template {}", template.display()))?;

            let summary = if output.as_os_str() == "-" {
                let mut stdout = std::io::stdout().lock();
                generator.generate(
                    source.stations(),
                    date,
                    config.language,
                    &source,
                    OutputSink::Writer(&mut stdout),
                )?
            } else {
                generator
                    .generate(
                        source.stations(),
                        date,
                        config.language,
                        &source,
                        OutputSink::Path(output.clone()),
                    )
                    .with_context(|| format!("generate {}", output.display()))?
            };
            eprintln!(
                "{} stations in {} groups, {} rows inserted",
                summary.stations, summary.groups, summary.inserted_rows
            );
        }
    }
    Ok(())
}

fn print_layout(template: &ValidatedTemplate<'_>) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "sheet:  {}", template.sheet_name)?;
    writeln!(out, "header: {} {}", template.header.cell, template.header.raw)?;
    for occurrence in &template.data {
        writeln!(out, "data:   {} {}", occurrence.cell, occurrence.raw)?;
    }
    for general in &template.general {
        let cells: Vec<String> = general.cells.iter().map(ToString::to_string).collect();
        writeln!(out, "general: {} at {}", general.tag.name, cells.join(", "))?;
    }
    Ok(())
}
