//! Weave command - batch-rewrite class files against an advice catalog

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use jweave_classfile::ClassSummary;
use jweave_core::{load_catalog, Weaver};

#[derive(Parser, Debug)]
pub struct WeaveCmd {
    /// Advice catalog (JSON)
    #[arg(long)]
    pub catalog: PathBuf,

    /// Class files or directories to weave
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Write results here (laid out by internal class name) instead of
    /// rewriting inputs in place
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Serialize)]
struct FileOutcome {
    path: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256_out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileOutcome {
    fn failed(path: String, sha256_in: Option<String>, error: String) -> FileOutcome {
        FileOutcome {
            path,
            status: "failed-open",
            sha256_in,
            sha256_out: None,
            error: Some(error),
        }
    }
}

impl WeaveCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let text = fs::read_to_string(&self.catalog)
            .with_context(|| format!("reading catalog {}", self.catalog.display()))?;
        let build = load_catalog(&text).context("loading catalog")?;
        for diagnostic in &build.diagnostics {
            eprintln!("catalog: {diagnostic}");
        }

        let files = collect_class_files(&self.inputs)?;
        if files.is_empty() {
            bail!("no .class files found in the given inputs");
        }
        info!(
            files = files.len(),
            advices = build.catalog.advices().len(),
            mixins = build.catalog.mixins().len(),
            "weaving batch"
        );

        // The batch is its own ancestry source: supertypes that live in the
        // same input set resolve without a class path.
        let mut index: HashMap<String, Vec<u8>> = HashMap::new();
        for path in &files {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            if let Ok(summary) = ClassSummary::parse(&bytes) {
                index.insert(summary.name, bytes);
            }
        }
        let index = Arc::new(index);
        let lookup = move |name: &str| index.get(name).cloned();
        let weaver = Weaver::new(Arc::new(build.catalog), Arc::new(lookup));

        if let Some(dir) = &self.out {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        let outcomes: Vec<FileOutcome> = files
            .par_iter()
            .map(|path| self.weave_one(&weaver, path))
            .collect();

        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        let snapshot = weaver.stats().snapshot();

        if json_output {
            let report = serde_json::json!({
                "outcomes": outcomes,
                "stats": snapshot,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            for outcome in &outcomes {
                match (&outcome.error, &outcome.sha256_out) {
                    (Some(error), _) => {
                        println!("{:<11} {}  {error}", outcome.status, outcome.path)
                    }
                    (None, Some(out)) => println!(
                        "{:<11} {}  sha256 {} -> {}",
                        outcome.status,
                        outcome.path,
                        short(outcome.sha256_in.as_deref()),
                        &out[..12],
                    ),
                    (None, None) => println!(
                        "{:<11} {}  sha256 {}",
                        outcome.status,
                        outcome.path,
                        short(outcome.sha256_in.as_deref()),
                    ),
                }
            }
            println!("{}", snapshot.format_report());
        }

        if failed > 0 {
            bail!("{failed} of {} class file(s) left unchanged by failures", outcomes.len());
        }
        Ok(())
    }

    fn weave_one(&self, weaver: &Weaver, path: &Path) -> FileOutcome {
        let display = path.display().to_string();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => return FileOutcome::failed(display, None, err.to_string()),
        };
        let sha256_in = hex::encode(Sha256::digest(&bytes));

        match weaver.try_rewrite(&bytes) {
            Ok(Some(woven)) => {
                let sha256_out = hex::encode(Sha256::digest(&woven));
                if let Err(err) = self.write_result(path, &woven) {
                    return FileOutcome::failed(display, Some(sha256_in), err.to_string());
                }
                FileOutcome {
                    path: display,
                    status: "woven",
                    sha256_in: Some(sha256_in),
                    sha256_out: Some(sha256_out),
                    error: None,
                }
            }
            Ok(None) => {
                // Copy untouched classes into --out so it holds a complete
                // class set; in place there is nothing to do.
                if self.out.is_some() {
                    if let Err(err) = self.write_result(path, &bytes) {
                        return FileOutcome::failed(display, Some(sha256_in), err.to_string());
                    }
                }
                FileOutcome {
                    path: display,
                    status: "unchanged",
                    sha256_in: Some(sha256_in),
                    sha256_out: None,
                    error: None,
                }
            }
            Err(err) => FileOutcome::failed(display, Some(sha256_in), err.to_string()),
        }
    }

    fn write_result(&self, input: &Path, bytes: &[u8]) -> Result<()> {
        let target = match &self.out {
            Some(dir) => {
                let summary = ClassSummary::parse(bytes)?;
                dir.join(format!("{}.class", summary.name))
            }
            None => input.to_path_buf(),
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&target, bytes).with_context(|| format!("writing {}", target.display()))
    }
}

fn short(digest: Option<&str>) -> &str {
    match digest {
        Some(digest) => &digest[..12],
        None => "-",
    }
}

/// Expands the given paths: files are taken as-is, directories are walked
/// recursively for `.class` files.
pub fn collect_class_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            walk(input, &mut files)?;
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "class") {
            files.push(path);
        }
    }
    Ok(())
}
