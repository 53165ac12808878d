//! Run command - execute a bundled class method inside the sandbox

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::debug;

use jweave_core::{load_catalog, Catalog};
use jweave_sandbox::{HookLog, Sandbox, Value};

#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Advice catalog (JSON); omit to run without weaving
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Bundle manifest (see `jweave bundle`)
    #[arg(long)]
    pub bundle: PathBuf,

    /// Class holding the method (dotted or internal name)
    pub class: String,

    /// Static method to invoke
    pub method: String,

    /// Integer arguments for the method
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub args: Vec<i32>,
}

impl RunCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let log = HookLog::new();

        let mut sandbox = Sandbox::new();
        if let Some(path) = &self.catalog {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading catalog {}", path.display()))?;
            let build = load_catalog(&text).context("loading catalog")?;
            for diagnostic in &build.diagnostics {
                eprintln!("catalog: {diagnostic}");
            }
            // Catalog hooks land on classes the bundle usually does not
            // carry; answer them with recording probes so firing order is
            // observable. A bundled hook class still wins resolution.
            let sites = hook_sites(&build.catalog);
            sandbox = Sandbox::with_catalog(build.catalog);
            for (owner, name, descriptor) in &sites {
                sandbox
                    .natives_mut()
                    .register_probe(&log, owner, name, descriptor);
            }
        }

        let manifest = fs::read_to_string(&self.bundle)
            .with_context(|| format!("reading bundle {}", self.bundle.display()))?;
        let loaded = sandbox
            .load_bundle(&manifest)
            .map_err(|err| anyhow!("loading bundle: {err}"))?;
        debug!(classes = loaded.len(), "bundle registered");

        let class = self.class.replace('.', "/");
        let args: Vec<Value> = self.args.iter().map(|&v| Value::Int(v)).collect();
        let result = sandbox
            .call_static(&class, &self.method, args)
            .map_err(|err| anyhow!("{}.{}: {err}", self.class, self.method))?;

        let rendered = result.map(|v| v.render());
        let events = log.events();

        if json_output {
            let report = serde_json::json!({
                "loaded": loaded,
                "result": rendered,
                "hooks": events,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("loaded {} class(es)", loaded.len());
            match &rendered {
                Some(value) => println!("result: {value}"),
                None => println!("result: void"),
            }
            if events.is_empty() {
                println!("hooks fired: none");
            } else {
                println!("hooks fired:");
                for event in &events {
                    println!("  {event}");
                }
            }
            if let Some(snapshot) = sandbox.weave_stats() {
                println!("{}", snapshot.format_report());
            }
        }
        Ok(())
    }
}

/// Every hook site the catalog names, as `(owner, name, descriptor)`.
fn hook_sites(catalog: &Catalog) -> Vec<(String, String, String)> {
    let mut sites = Vec::new();
    for advice in catalog.advices() {
        let slots = [
            &advice.enabled_check,
            &advice.on_before,
            &advice.on_return,
            &advice.on_throw,
            &advice.on_after,
        ];
        for hook in slots.into_iter().filter_map(|slot| slot.as_ref()) {
            sites.push((hook.owner.clone(), hook.name.clone(), hook.descriptor.clone()));
        }
    }
    sites
}
