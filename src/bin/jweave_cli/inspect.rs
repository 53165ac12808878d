//! Inspect command - dump the parsed structure of a class file

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use jweave_classfile::{flags, ClassFile, MethodBody};

#[derive(Parser, Debug)]
pub struct InspectCmd {
    /// Class file to inspect
    pub file: PathBuf,
}

#[derive(Serialize)]
struct ClassReport {
    name: String,
    version: String,
    access: Vec<&'static str>,
    super_name: Option<String>,
    interfaces: Vec<String>,
    pool_slots: usize,
    fields: Vec<FieldReport>,
    methods: Vec<MethodReport>,
}

#[derive(Serialize)]
struct FieldReport {
    name: String,
    descriptor: String,
    access: Vec<&'static str>,
}

#[derive(Serialize)]
struct MethodReport {
    name: String,
    descriptor: String,
    access: Vec<&'static str>,
    /// Raw `Code` attribute size; absent for abstract and native methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    code_bytes: Option<usize>,
}

impl InspectCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let bytes =
            fs::read(&self.file).with_context(|| format!("reading {}", self.file.display()))?;
        let class = ClassFile::parse(&bytes)
            .with_context(|| format!("parsing {}", self.file.display()))?;
        let report = build_report(&class);

        if json_output {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn build_report(class: &ClassFile) -> ClassReport {
    ClassReport {
        name: class.name.clone(),
        version: format!("{}.{}", class.major_version, class.minor_version),
        access: access_names(class.access_flags),
        super_name: class.super_name.clone(),
        interfaces: class.interfaces.clone(),
        pool_slots: class.constant_pool().slot_count(),
        fields: class
            .fields
            .iter()
            .map(|f| FieldReport {
                name: f.name.clone(),
                descriptor: f.descriptor.clone(),
                access: access_names(f.access_flags),
            })
            .collect(),
        methods: class
            .methods
            .iter()
            .map(|m| MethodReport {
                name: m.name.clone(),
                descriptor: m.descriptor.clone(),
                access: access_names(m.access_flags),
                code_bytes: m.body.as_ref().map(|body| match body {
                    MethodBody::Raw(data) => data.len(),
                    MethodBody::Decoded(code) => code.instructions.len(),
                }),
            })
            .collect(),
    }
}

fn print_report(report: &ClassReport) {
    println!("class {} (v{})", report.name, report.version);
    if let Some(super_name) = &report.super_name {
        println!("  extends {super_name}");
    }
    for interface in &report.interfaces {
        println!("  implements {interface}");
    }
    println!("  flags: {}", report.access.join(" "));
    println!("  constant pool: {} slots", report.pool_slots);
    println!("  fields ({}):", report.fields.len());
    for field in &report.fields {
        println!("    {} {}", field.name, field.descriptor);
    }
    println!("  methods ({}):", report.methods.len());
    for method in &report.methods {
        match method.code_bytes {
            Some(size) => println!(
                "    {}{}  [code {size} bytes]",
                method.name, method.descriptor
            ),
            None => println!("    {}{}  [no body]", method.name, method.descriptor),
        }
    }
}

fn access_names(access: u16) -> Vec<&'static str> {
    let mut names = Vec::new();
    for (bit, name) in [
        (flags::ACC_PUBLIC, "public"),
        (flags::ACC_PRIVATE, "private"),
        (flags::ACC_PROTECTED, "protected"),
        (flags::ACC_STATIC, "static"),
        (flags::ACC_FINAL, "final"),
        (flags::ACC_ABSTRACT, "abstract"),
        (flags::ACC_INTERFACE, "interface"),
        (flags::ACC_NATIVE, "native"),
        (flags::ACC_SYNTHETIC, "synthetic"),
    ] {
        if access & bit != 0 {
            names.push(name);
        }
    }
    names
}
