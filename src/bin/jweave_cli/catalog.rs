//! Catalog command - validate advice catalogs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use jweave_core::load_catalog;

#[derive(Parser, Debug)]
pub struct CatalogCmd {
    #[command(subcommand)]
    pub action: CatalogAction,
}

#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// Build the catalog and report validation diagnostics
    Check {
        /// Catalog file (JSON)
        file: PathBuf,
    },
}

#[derive(Serialize)]
struct CheckReport {
    advices: usize,
    mixins: usize,
    diagnostics: Vec<DiagnosticReport>,
}

#[derive(Serialize)]
struct DiagnosticReport {
    advice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot: Option<&'static str>,
    message: String,
}

impl CatalogCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        match &self.action {
            CatalogAction::Check { file } => check(file, json_output),
        }
    }
}

fn check(file: &Path, json_output: bool) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let build = load_catalog(&text).context("loading catalog")?;

    if json_output {
        let report = CheckReport {
            advices: build.catalog.advices().len(),
            mixins: build.catalog.mixins().len(),
            diagnostics: build
                .diagnostics
                .iter()
                .map(|d| DiagnosticReport {
                    advice: d.advice.clone(),
                    slot: d.slot.map(|s| s.label()),
                    message: d.message.clone(),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for diagnostic in &build.diagnostics {
            println!("{diagnostic}");
        }
        println!(
            "{} advice(s), {} mixin(s), {} diagnostic(s)",
            build.catalog.advices().len(),
            build.catalog.mixins().len(),
            build.diagnostics.len(),
        );
    }

    if !build.diagnostics.is_empty() {
        bail!("catalog has {} diagnostic(s)", build.diagnostics.len());
    }
    Ok(())
}
