use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::commands::{self, format_bytes};
use notesweep_core::config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan { json, root } => {
            cfg.scan.include.extend(root);
            let report = commands::scan(&cfg, !json).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let s = &report.summary;
                if s.nothing_to_scan() {
                    println!("no WhatsApp media folders found");
                } else {
                    println!(
                        "{} notes, {} other ({} cached, {} classified, {} skipped){}",
                        s.notes,
                        s.other,
                        s.from_cache,
                        s.classified,
                        s.skipped,
                        if s.cancelled { ", cancelled" } else { "" }
                    );
                }
            }
        }
        Commands::Clean { yes, json } => {
            let report = commands::clean(&cfg, yes).await?;
            if report.unlabeled > 0 && !json {
                println!("{} file(s) have no label and are kept", report.unlabeled);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if let Some(d) = &report.deletion {
                println!(
                    "deleted {} file(s), freed {}; {} failed",
                    d.succeeded,
                    format_bytes(d.bytes_freed),
                    d.failed
                );
                for e in &d.errors {
                    println!("  {}", e);
                }
            } else if report.candidates.is_empty() {
                println!("nothing to delete");
            } else {
                for row in &report.candidates {
                    println!("{}", row.path.display());
                }
                println!(
                    "{} file(s) would be deleted; re-run with --yes to delete",
                    report.candidates.len()
                );
            }
        }
        Commands::ClearCache => {
            commands::clear_cache(&cfg).await?;
            println!("classification cache cleared");
        }
        Commands::Prefs {
            threshold,
            scan_pdfs,
            show_confidence,
        } => {
            let prefs = commands::prefs(&cfg, threshold, scan_pdfs, show_confidence).await?;
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "notesweep")]
#[command(about = "Find study notes among WhatsApp media and clear out the rest", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan media folders and list notes and other files
    Scan {
        /// Output JSON report
        #[arg(long)]
        json: bool,
        /// Extra directory to scan (repeatable)
        #[arg(long)]
        root: Vec<String>,
    },
    /// Scan, then delete everything labeled as something other than notes
    Clean {
        /// Actually delete; without it only the candidates are listed
        #[arg(long, default_value_t = false)]
        yes: bool,
        /// Output JSON report
        #[arg(long)]
        json: bool,
    },
    /// Forget all cached classifications
    ClearCache,
    /// Show or update stored preferences
    Prefs {
        /// Confidence threshold, clamped to [0.5, 0.95]
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        scan_pdfs: Option<bool>,
        #[arg(long)]
        show_confidence: Option<bool>,
    },
}
