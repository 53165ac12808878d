//! Bundle command - pack class files into a sandbox bundle manifest

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;

use jweave_classfile::ClassSummary;

use super::weave::collect_class_files;

#[derive(Parser, Debug)]
pub struct BundleCmd {
    /// Class files or directories to pack
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Manifest path to write
    #[arg(short, long)]
    pub out: PathBuf,
}

#[derive(Serialize)]
struct Manifest {
    classes: Vec<Entry>,
}

#[derive(Serialize)]
struct Entry {
    name: String,
    bytes: String,
}

impl BundleCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        use base64::Engine;

        let files = collect_class_files(&self.inputs)?;
        if files.is_empty() {
            bail!("no .class files found in the given inputs");
        }

        let mut seen = HashSet::new();
        let mut classes = Vec::with_capacity(files.len());
        for path in &files {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let summary = ClassSummary::parse(&bytes)
                .with_context(|| format!("parsing {}", path.display()))?;
            if !seen.insert(summary.name.clone()) {
                bail!("duplicate class {} in inputs", summary.name);
            }
            classes.push(Entry {
                name: summary.name,
                bytes: base64::engine::general_purpose::STANDARD.encode(&bytes),
            });
        }

        let manifest = Manifest { classes };
        fs::write(&self.out, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("writing {}", self.out.display()))?;

        if json_output {
            println!(
                "{}",
                serde_json::json!({
                    "classes": manifest.classes.len(),
                    "out": self.out.display().to_string(),
                })
            );
        } else {
            println!(
                "packed {} class(es) into {}",
                manifest.classes.len(),
                self.out.display(),
            );
        }
        Ok(())
    }
}
