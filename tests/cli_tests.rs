#![allow(deprecated)]
//! Integration tests for the jweave CLI

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use jweave_classfile::opcodes as op;
use jweave_classfile::{flags, iconst, ClassBuilder, ClassSummary, CodeBody, Insn};

fn jweave_cmd() -> Command {
    Command::cargo_bin("jweave").expect("binary not found")
}

/// demo/Foo with `static int work(int)` returning its argument doubled.
fn work_class() -> Vec<u8> {
    let mut work = CodeBody::new(2, 1);
    work.instructions.extend([
        Insn::Var {
            opcode: op::ILOAD,
            index: 0,
        },
        iconst(2),
        Insn::Op(op::IMUL),
        Insn::Op(op::IRETURN),
    ]);
    ClassBuilder::new("demo/Foo")
        .default_ctor()
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "work", "(I)I", work)
        .bytes()
        .expect("emit demo/Foo")
}

fn write_catalog(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("catalog.json");
    let catalog = serde_json::json!({
        "advices": [{
            "label": "trace",
            "types": "demo.Foo",
            "methods": "work",
            "hooks": [{
                "slot": "on_before",
                "owner": "test/Hooks",
                "method": "before",
                "descriptor": "(Ljava/lang/String;)V",
                "bindings": ["method_name"]
            }]
        }]
    });
    fs::write(&path, serde_json::to_string_pretty(&catalog).unwrap()).expect("write catalog");
    path
}

#[test]
fn test_help_lists_subcommands() {
    jweave_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("weave"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("catalog"))
        .stdout(predicate::str::contains("bundle"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_weave_writes_rewritten_classes_to_out_dir() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    fs::create_dir(&classes).unwrap();
    let input = classes.join("Foo.class");
    let original = work_class();
    fs::write(&input, &original).unwrap();
    let catalog = write_catalog(temp.path());
    let out = temp.path().join("out");

    jweave_cmd()
        .arg("weave")
        .arg("--catalog")
        .arg(&catalog)
        .arg(&classes)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("woven"))
        .stdout(predicate::str::contains("classes woven"));

    // Output is laid out by internal name; the input stays untouched.
    let woven = fs::read(out.join("demo/Foo.class")).expect("woven output");
    assert_ne!(woven, original);
    assert_eq!(fs::read(&input).unwrap(), original);

    let summary = ClassSummary::parse(&woven).expect("woven class parses");
    assert_eq!(summary.name, "demo/Foo");
}

#[test]
fn test_weave_in_place_rewrites_the_input() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("Foo.class");
    let original = work_class();
    fs::write(&input, &original).unwrap();
    let catalog = write_catalog(temp.path());

    jweave_cmd()
        .arg("weave")
        .arg("--catalog")
        .arg(&catalog)
        .arg(&input)
        .assert()
        .success();

    let rewritten = fs::read(&input).unwrap();
    assert_ne!(rewritten, original);
    assert_eq!(ClassSummary::parse(&rewritten).unwrap().name, "demo/Foo");
}

#[test]
fn test_weave_fails_open_on_corrupt_input() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    fs::create_dir(&classes).unwrap();
    fs::write(classes.join("Good.class"), work_class()).unwrap();
    let corrupt = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
    fs::write(classes.join("Bad.class"), &corrupt).unwrap();
    let catalog = write_catalog(temp.path());

    // Nonzero exit flags the failure, but the good class is still woven
    // and the corrupt file keeps its exact bytes.
    jweave_cmd()
        .arg("weave")
        .arg("--catalog")
        .arg(&catalog)
        .arg(&classes)
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed-open"))
        .stdout(predicate::str::contains("woven"));

    assert_eq!(fs::read(classes.join("Bad.class")).unwrap(), corrupt);
    assert_ne!(fs::read(classes.join("Good.class")).unwrap(), work_class());
}

#[test]
fn test_inspect_reports_structure_as_json() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("Foo.class");
    fs::write(&input, work_class()).unwrap();

    let output = jweave_cmd()
        .arg("inspect")
        .arg(&input)
        .arg("--json")
        .output()
        .expect("run jweave");
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["name"], "demo/Foo");
    assert_eq!(json["super_name"], "java/lang/Object");
    let methods = json["methods"].as_array().unwrap();
    assert!(methods.iter().any(|m| m["name"] == "work"));
    assert!(methods.iter().any(|m| m["name"] == "<init>"));
}

#[test]
fn test_catalog_check_reports_diagnostics() {
    let temp = TempDir::new().unwrap();

    let clean = write_catalog(temp.path());
    jweave_cmd()
        .arg("catalog")
        .arg("check")
        .arg(&clean)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 diagnostic(s)"));

    // An enablement check must return boolean; ()I gets the slot dropped.
    let broken = temp.path().join("broken.json");
    let catalog = serde_json::json!({
        "advices": [{
            "label": "gate",
            "types": "demo.Foo",
            "methods": "work",
            "hooks": [{
                "slot": "enabled_check",
                "owner": "test/Hooks",
                "method": "on",
                "descriptor": "()I"
            }]
        }]
    });
    fs::write(&broken, serde_json::to_string_pretty(&catalog).unwrap()).unwrap();

    jweave_cmd()
        .arg("catalog")
        .arg("check")
        .arg(&broken)
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 diagnostic(s)"));
}

#[test]
fn test_bundle_then_run_prints_hook_order() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    fs::create_dir(&classes).unwrap();
    fs::write(classes.join("Foo.class"), work_class()).unwrap();
    let catalog = write_catalog(temp.path());
    let bundle = temp.path().join("bundle.json");

    jweave_cmd()
        .arg("bundle")
        .arg(&classes)
        .arg("-o")
        .arg(&bundle)
        .assert()
        .success();

    let manifest: Value = serde_json::from_str(&fs::read_to_string(&bundle).unwrap()).unwrap();
    assert_eq!(manifest["classes"][0]["name"], "demo/Foo");

    jweave_cmd()
        .arg("run")
        .arg("--catalog")
        .arg(&catalog)
        .arg("--bundle")
        .arg(&bundle)
        .arg("demo.Foo")
        .arg("work")
        .arg("--args")
        .arg("21")
        .assert()
        .success()
        .stdout(predicate::str::contains("result: 42"))
        .stdout(predicate::str::contains("before(work)"))
        .stdout(predicate::str::contains("classes woven"));
}

#[test]
fn test_run_without_catalog_skips_weaving() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    fs::create_dir(&classes).unwrap();
    fs::write(classes.join("Foo.class"), work_class()).unwrap();
    let bundle = temp.path().join("bundle.json");

    jweave_cmd()
        .arg("bundle")
        .arg(&classes)
        .arg("-o")
        .arg(&bundle)
        .assert()
        .success();

    jweave_cmd()
        .arg("run")
        .arg("--bundle")
        .arg(&bundle)
        .arg("demo.Foo")
        .arg("work")
        .arg("--args")
        .arg("21")
        .assert()
        .success()
        .stdout(predicate::str::contains("result: 42"))
        .stdout(predicate::str::contains("hooks fired: none"));
}
