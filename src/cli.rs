//
// cli.rs
// Dicom-Deid-rs
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the corresponding modules.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};

use crate::config::{DeidOptions, DEFAULT_RASTER_SUFFIX};
use crate::error::DeidError;
use crate::identity::{self, IdentityChoice};
use crate::image::RasterFormat;
use crate::link_table::LinkTable;
use crate::{batch, dicomdir, pipeline};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom-deid")]
#[command(about = "De-identify DICOM media folders and link them to anonymized codes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// De-identify one folder and append it to the link table
    Deidentify {
        folder: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
        /// Authoritative patient name when the folder's metadata disagrees
        #[arg(long)]
        patient_name: Option<String>,
        /// Authoritative study description when studies disagree
        #[arg(long)]
        study_description: Option<String>,
        /// Prompt on the terminal instead of failing on ambiguous metadata
        #[arg(short, long)]
        interactive: bool,
    },
    /// De-identify every sub-folder with a DICOMDIR, one at a time
    Batch {
        directory: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the patient/study/series hierarchy of a folder's DICOMDIR
    Inspect { folder: PathBuf },
    /// Check a link table for conflicting or duplicate rows
    Verify { link_table: PathBuf },
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Root under which anonymized folders are created
    pub target_root: PathBuf,
    /// Link table CSV (defaults to <target_root>/link_anonymize.csv)
    #[arg(short, long)]
    pub link_table: Option<PathBuf>,
    /// Skip rendering raster images
    #[arg(long)]
    pub no_images: bool,
    #[arg(long, value_enum, default_value_t = RasterFormat::Jpg)]
    pub format: RasterFormat,
    #[arg(long, default_value = DEFAULT_RASTER_SUFFIX)]
    pub raster_suffix: String,
    /// Leave person names in the copied DICOMDIR untouched
    #[arg(long)]
    pub keep_index_names: bool,
}

impl From<OutputArgs> for DeidOptions {
    fn from(args: OutputArgs) -> Self {
        DeidOptions {
            link_table: args.link_table,
            convert_images: !args.no_images,
            raster_suffix: args.raster_suffix,
            raster_format: args.format,
            scrub_index: !args.keep_index_names,
            ..DeidOptions::new(args.target_root)
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();

    match cli.command {
        Commands::Deidentify {
            folder,
            output,
            patient_name,
            study_description,
            interactive,
        } => {
            let choice = IdentityChoice {
                patient_name,
                study_description,
            };
            deidentify(&folder, &output.into(), choice, interactive)?
        }
        Commands::Batch { directory, output } => {
            let summary = batch::process_directory(&directory, &output.into())?;
            for (folder, scan) in &summary.processed {
                println!("{} -> {}", folder, scan);
            }
            for (folder, reason) in &summary.failed {
                eprintln!("FAILED {}: {}", folder, reason);
            }
            if !summary.failed.is_empty() {
                bail!("{} folder(s) failed", summary.failed.len());
            }
        }
        Commands::Inspect { folder } => {
            let index = dicomdir::read_index(&folder)
                .with_context(|| format!("Failed to read index of {:?}", folder))?;
            print!("{}", index.render_tree());
        }
        Commands::Verify { link_table } => {
            let table = LinkTable::load(&link_table)
                .with_context(|| format!("Failed to load link table {:?}", link_table))?;
            let violations = table.verify();
            println!("{} row(s) in {:?}", table.len(), link_table);
            for violation in &violations {
                println!("  {}", violation);
            }
            if !violations.is_empty() {
                bail!("{} invariant violation(s)", violations.len());
            }
        }
    }

    Ok(())
}

fn deidentify(
    folder: &Path,
    options: &DeidOptions,
    mut choice: IdentityChoice,
    interactive: bool,
) -> anyhow::Result<()> {
    let table_path = options.link_table_path();
    let table = LinkTable::load_or_default(&table_path)
        .with_context(|| format!("Failed to load link table {:?}", table_path))?;

    let extraction = pipeline::prepare(folder, options, &table)?;

    // Ambiguity is settled here, outside the resolver, by asking the operator.
    let resolution = loop {
        match identity::resolve(&extraction.record, &table, &choice, &options.placeholder) {
            Ok(resolution) => break resolution,
            Err(e) if interactive && e.is_resolvable() => {
                if let Err(prompt_error) = prompt_choice(&e, &mut choice) {
                    pipeline::abandon(extraction);
                    return Err(prompt_error);
                }
            }
            Err(e) => {
                pipeline::abandon(extraction);
                return Err(e.into());
            }
        }
    };

    let (outcome, updated) = pipeline::commit(extraction, resolution, &table)?;
    updated
        .save(&table_path)
        .with_context(|| format!("Failed to save link table {:?}", table_path))?;

    println!("Anonymized patient code: {}", outcome.record.patient_code);
    println!("Anonymized scan code:    {}", outcome.record.scan_code);
    println!("Output: {:?}", outcome.paths.dicom_dir);
    if let Some(raster) = &outcome.paths.raster_dir {
        println!("Images: {:?}", raster);
    }
    Ok(())
}

fn prompt_choice(err: &DeidError, choice: &mut IdentityChoice) -> anyhow::Result<()> {
    let slot = match err {
        DeidError::AmbiguousIdentity { .. } | DeidError::MissingField { .. } => {
            &mut choice.patient_name
        }
        DeidError::AmbiguousStudy { .. } => &mut choice.study_description,
        other => return Err(anyhow!("cannot prompt for {}", other)),
    };

    eprintln!("{}", err);
    eprint!("Please enter the value to use: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim();
    if value.is_empty() {
        bail!("No value entered");
    }
    eprintln!("Received: {}", value);
    *slot = Some(value.to_string());
    Ok(())
}
