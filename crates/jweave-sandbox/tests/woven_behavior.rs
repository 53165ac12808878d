//! End-to-end behavior of woven classes: register fixtures, let the
//! sandbox weave them on first use, execute, and assert on hook firing
//! order through probe natives.

use std::cell::RefCell;
use std::rc::Rc;

use jweave_classfile::opcodes as op;
use jweave_classfile::{flags, iconst, ClassBuilder, CodeBody, Insn};
use jweave_core::{AdviceDef, ArgPatterns, Binding, Catalog, HookRef, HookSlot, Mixin, Pattern};
use jweave_sandbox::{HookLog, ObjRef, Sandbox, Value, VmError};

fn var(opcode: u8, index: u16) -> Insn {
    Insn::Var { opcode, index }
}

fn advice(
    label: &str,
    type_pattern: &str,
    method_pattern: &str,
    capture_nested: bool,
    hooks: Vec<(HookSlot, HookRef)>,
) -> AdviceDef {
    AdviceDef {
        label: label.to_string(),
        type_pattern: Pattern::exact(type_pattern),
        method_pattern: Pattern::exact(method_pattern),
        args: ArgPatterns::any(),
        capture_nested,
        timer_label: None,
        hooks,
    }
}

fn probe(name: &str, descriptor: &str, bindings: Vec<Binding>) -> HookRef {
    HookRef::new("test/Hooks", name, descriptor, bindings)
}

/// demo/Foo with `int work(int)` returning its argument doubled and a
/// `void explode()` that always throws demo/Boom.
fn foo_class() -> Vec<u8> {
    let mut work = CodeBody::new(2, 2);
    work.instructions.extend([
        var(op::ILOAD, 1),
        iconst(2),
        Insn::Op(op::IMUL),
        Insn::Op(op::IRETURN),
    ]);

    let mut explode = CodeBody::new(2, 1);
    explode.instructions.extend([
        Insn::TypeOp {
            opcode: op::NEW,
            name: "demo/Boom".to_string(),
        },
        Insn::Op(op::DUP),
        Insn::Invoke {
            opcode: op::INVOKESPECIAL,
            owner: "demo/Boom".to_string(),
            name: "<init>".to_string(),
            descriptor: "()V".to_string(),
            interface: false,
        },
        Insn::Op(op::ATHROW),
    ]);

    ClassBuilder::new("demo/Foo")
        .default_ctor()
        .method(flags::ACC_PUBLIC, "work", "(I)I", work)
        .method(flags::ACC_PUBLIC, "explode", "()V", explode)
        .bytes()
        .expect("emit demo/Foo")
}

fn boom_class() -> Vec<u8> {
    ClassBuilder::new("demo/Boom")
        .extends("java/lang/RuntimeException")
        .default_ctor()
        .bytes()
        .expect("emit demo/Boom")
}

#[test]
fn test_before_and_after_fire_around_original_result() {
    let catalog = Catalog::builder()
        .advice(advice(
            "trace",
            "demo.Foo",
            "work",
            true,
            vec![
                (
                    HookSlot::OnBefore,
                    probe(
                        "before",
                        "(Ljava/lang/String;Ljava/lang/Object;)V",
                        vec![Binding::MethodName, Binding::Argument(0)],
                    ),
                ),
                (
                    HookSlot::OnReturn,
                    probe("onReturn", "(Ljava/lang/Object;)V", vec![Binding::ReturnValue]),
                ),
                (
                    HookSlot::OnAfter,
                    probe("onAfter", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
                ),
            ],
        ))
        .build()
        .catalog;

    let log = HookLog::new();
    let mut sb = Sandbox::with_catalog(catalog);
    for (name, desc) in [
        ("before", "(Ljava/lang/String;Ljava/lang/Object;)V"),
        ("onReturn", "(Ljava/lang/Object;)V"),
        ("onAfter", "(Ljava/lang/String;)V"),
    ] {
        sb.natives_mut().register_probe(&log, "test/Hooks", name, desc);
    }
    sb.define_class(foo_class()).expect("define");

    let foo = sb.instantiate("demo/Foo", "()V", vec![]).expect("new Foo");
    let got = sb
        .call_virtual(&foo, "work", vec![Value::Int(21)])
        .expect("work")
        .expect("int result");

    assert_eq!(got.as_int().unwrap(), 42, "original result preserved");
    assert_eq!(
        log.events(),
        vec!["before(work, 21)", "onReturn(42)", "onAfter(work)"]
    );
    let loaded = sb.class("demo/Foo").expect("lookup").expect("linked");
    assert!(loaded.woven);
}

#[test]
fn test_unmatched_class_runs_unwoven() {
    let catalog = Catalog::builder()
        .advice(advice(
            "elsewhere",
            "other.Type",
            "work",
            true,
            vec![(
                HookSlot::OnBefore,
                probe("before", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
            )],
        ))
        .build()
        .catalog;

    let log = HookLog::new();
    let mut sb = Sandbox::with_catalog(catalog);
    sb.natives_mut()
        .register_probe(&log, "test/Hooks", "before", "(Ljava/lang/String;)V");
    sb.define_class(foo_class()).expect("define");

    let foo = sb.instantiate("demo/Foo", "()V", vec![]).expect("new Foo");
    let got = sb
        .call_virtual(&foo, "work", vec![Value::Int(3)])
        .expect("work")
        .expect("int result");

    assert_eq!(got.as_int().unwrap(), 6);
    assert!(log.events().is_empty());
    let loaded = sb.class("demo/Foo").expect("lookup").expect("linked");
    assert!(!loaded.woven);
}

#[test]
fn test_exception_path_fires_throw_and_after_once_with_identity() {
    let catalog = Catalog::builder()
        .advice(advice(
            "watch",
            "demo.Foo",
            "explode",
            true,
            vec![
                (
                    HookSlot::OnReturn,
                    probe("onReturn", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
                ),
                (
                    HookSlot::OnThrow,
                    probe("onThrow", "(Ljava/lang/Throwable;)V", vec![Binding::Throwable]),
                ),
                (
                    HookSlot::OnAfter,
                    probe("onAfter", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
                ),
            ],
        ))
        .build()
        .catalog;

    let log = HookLog::new();
    let seen: Rc<RefCell<Option<ObjRef>>> = Rc::new(RefCell::new(None));
    let mut sb = Sandbox::with_catalog(catalog);
    sb.natives_mut()
        .register_probe(&log, "test/Hooks", "onReturn", "(Ljava/lang/String;)V");
    sb.natives_mut()
        .register_probe(&log, "test/Hooks", "onAfter", "(Ljava/lang/String;)V");
    {
        let log = log.clone();
        let seen = seen.clone();
        sb.natives_mut().register(
            "test/Hooks",
            "onThrow",
            "(Ljava/lang/Throwable;)V",
            move |args| {
                log.record(format!("onThrow({})", args[0].render()));
                *seen.borrow_mut() = args[0].as_ref()?;
                Ok(None)
            },
        );
    }
    sb.define_class(boom_class()).expect("define boom");
    sb.define_class(foo_class()).expect("define foo");

    let foo = sb.instantiate("demo/Foo", "()V", vec![]).expect("new Foo");
    let err = sb
        .call_virtual(&foo, "explode", vec![])
        .expect_err("explode throws");

    let VmError::Thrown(escaped) = err else {
        panic!("expected a thrown exception");
    };
    assert_eq!(escaped.borrow().class, "demo/Boom");
    let captured = seen.borrow().clone().expect("on-throw saw the throwable");
    assert!(
        Rc::ptr_eq(&captured, &escaped),
        "rethrown throwable must be the same object the hook saw"
    );
    assert_eq!(log.count_matching("onThrow"), 1);
    assert_eq!(log.count_matching("onAfter"), 1);
    assert_eq!(log.count_matching("onReturn"), 0);
}

/// demo/Rec: `static int fact(int)` recursing through its own woven body.
fn rec_class() -> Vec<u8> {
    let mut fact = CodeBody::new(3, 1);
    let base = fact.new_label();
    fact.instructions.extend([
        var(op::ILOAD, 0),
        iconst(1),
        Insn::Jump {
            opcode: op::IF_ICMPLE,
            target: base,
        },
        var(op::ILOAD, 0),
        var(op::ILOAD, 0),
        iconst(1),
        Insn::Op(op::ISUB),
        Insn::Invoke {
            opcode: op::INVOKESTATIC,
            owner: "demo/Rec".to_string(),
            name: "fact".to_string(),
            descriptor: "(I)I".to_string(),
            interface: false,
        },
        Insn::Op(op::IMUL),
        Insn::Op(op::IRETURN),
        Insn::Label(base),
        iconst(1),
        Insn::Op(op::IRETURN),
    ]);
    ClassBuilder::new("demo/Rec")
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "fact", "(I)I", fact)
        .bytes()
        .expect("emit demo/Rec")
}

#[test]
fn test_nested_calls_suppressed_and_flag_restored() {
    let catalog = Catalog::builder()
        .advice(advice(
            "outeronly",
            "demo.Rec",
            "fact",
            false,
            vec![
                (
                    HookSlot::OnBefore,
                    probe("before", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
                ),
                (
                    HookSlot::OnAfter,
                    probe("after", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
                ),
            ],
        ))
        .build()
        .catalog;

    let log = HookLog::new();
    let mut sb = Sandbox::with_catalog(catalog);
    sb.natives_mut()
        .register_probe(&log, "test/Hooks", "before", "(Ljava/lang/String;)V");
    sb.natives_mut()
        .register_probe(&log, "test/Hooks", "after", "(Ljava/lang/String;)V");
    sb.define_class(rec_class()).expect("define");

    let got = sb
        .call_static("demo/Rec", "fact", vec![Value::Int(5)])
        .expect("fact")
        .expect("int result");
    assert_eq!(got.as_int().unwrap(), 120);
    assert_eq!(log.count_matching("before"), 1, "recursion stays silent");
    assert_eq!(log.count_matching("after"), 1);

    // The guard was restored, so the next top-level call fires again.
    let got = sb
        .call_static("demo/Rec", "fact", vec![Value::Int(3)])
        .expect("fact")
        .expect("int result");
    assert_eq!(got.as_int().unwrap(), 6);
    assert_eq!(log.count_matching("before"), 2);
    assert_eq!(log.count_matching("after"), 2);
}

#[test]
fn test_traveler_carries_before_result_to_after() {
    let catalog = Catalog::builder()
        .advice(advice(
            "carry",
            "demo.Foo",
            "work",
            true,
            vec![
                (
                    HookSlot::OnBefore,
                    probe(
                        "begin",
                        "(Ljava/lang/String;)Ljava/lang/Object;",
                        vec![Binding::MethodName],
                    ),
                ),
                (
                    HookSlot::OnAfter,
                    probe("finish", "(Ljava/lang/Object;)V", vec![Binding::Traveler]),
                ),
            ],
        ))
        .build()
        .catalog;

    let log = HookLog::new();
    let mut sb = Sandbox::with_catalog(catalog);
    {
        let log = log.clone();
        sb.natives_mut().register(
            "test/Hooks",
            "begin",
            "(Ljava/lang/String;)Ljava/lang/Object;",
            move |args| {
                log.record(format!("begin({})", args[0].render()));
                Ok(Some(Value::string(format!("token:{}", args[0].render()))))
            },
        );
    }
    {
        let log = log.clone();
        sb.natives_mut().register(
            "test/Hooks",
            "finish",
            "(Ljava/lang/Object;)V",
            move |args| {
                log.record(format!("finish({})", args[0].render()));
                Ok(None)
            },
        );
    }
    sb.define_class(foo_class()).expect("define");

    let foo = sb.instantiate("demo/Foo", "()V", vec![]).expect("new Foo");
    sb.call_virtual(&foo, "work", vec![Value::Int(1)])
        .expect("work");

    assert_eq!(log.events(), vec!["begin(work)", "finish(token:work)"]);
}

#[test]
fn test_disabled_check_skips_hooks_but_not_the_method() {
    let catalog = Catalog::builder()
        .advice(advice(
            "gated",
            "demo.Foo",
            "work",
            true,
            vec![
                (
                    HookSlot::EnabledCheck,
                    probe("enabled", "(Ljava/lang/String;)Z", vec![Binding::MethodName]),
                ),
                (
                    HookSlot::OnBefore,
                    probe("before", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
                ),
                (
                    HookSlot::OnAfter,
                    probe("after", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
                ),
            ],
        ))
        .build()
        .catalog;

    let log = HookLog::new();
    let mut sb = Sandbox::with_catalog(catalog);
    {
        let log = log.clone();
        sb.natives_mut().register(
            "test/Hooks",
            "enabled",
            "(Ljava/lang/String;)Z",
            move |args| {
                log.record(format!("enabled({})", args[0].render()));
                Ok(Some(Value::Int(0)))
            },
        );
    }
    sb.natives_mut()
        .register_probe(&log, "test/Hooks", "before", "(Ljava/lang/String;)V");
    sb.natives_mut()
        .register_probe(&log, "test/Hooks", "after", "(Ljava/lang/String;)V");
    sb.define_class(foo_class()).expect("define");

    let foo = sb.instantiate("demo/Foo", "()V", vec![]).expect("new Foo");
    let got = sb
        .call_virtual(&foo, "work", vec![Value::Int(8)])
        .expect("work")
        .expect("int result");

    assert_eq!(got.as_int().unwrap(), 16, "method body still runs");
    assert_eq!(log.events(), vec!["enabled(work)"]);
}

#[test]
fn test_throwing_hook_does_not_break_the_method() {
    let catalog = Catalog::builder()
        .advice(advice(
            "grumpy",
            "demo.Foo",
            "work",
            true,
            vec![(
                HookSlot::OnBefore,
                probe("grumpy", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
            )],
        ))
        .build()
        .catalog;

    let log = HookLog::new();
    let mut sb = Sandbox::with_catalog(catalog);
    {
        let log = log.clone();
        sb.natives_mut().register(
            "test/Hooks",
            "grumpy",
            "(Ljava/lang/String;)V",
            move |args| {
                log.record(format!("grumpy({})", args[0].render()));
                Err(VmError::Thrown(jweave_sandbox::Obj::new(
                    "java/lang/IllegalStateException",
                )))
            },
        );
    }
    sb.define_class(foo_class()).expect("define");

    let foo = sb.instantiate("demo/Foo", "()V", vec![]).expect("new Foo");
    let got = sb
        .call_virtual(&foo, "work", vec![Value::Int(21)])
        .expect("hook failure must stay contained")
        .expect("int result");

    assert_eq!(got.as_int().unwrap(), 42);
    assert_eq!(log.count_matching("grumpy"), 1);
}

#[test]
fn test_mixin_grafts_interface_and_delegates() {
    let capability = ClassBuilder::new("demo/Capability")
        .access(flags::ACC_PUBLIC | flags::ACC_INTERFACE | flags::ACC_ABSTRACT)
        .declared_method(
            flags::ACC_PUBLIC | flags::ACC_ABSTRACT,
            "tag",
            "()Ljava/lang/String;",
        )
        .bytes()
        .expect("emit demo/Capability");

    let mut tag = CodeBody::new(1, 1);
    tag.instructions.extend([
        Insn::Ldc(jweave_classfile::LdcValue::Str("cap".to_string())),
        Insn::Op(op::ARETURN),
    ]);
    let cap_impl = ClassBuilder::new("demo/CapImpl")
        .implements("demo/Capability")
        .default_ctor()
        .method(flags::ACC_PUBLIC, "tag", "()Ljava/lang/String;", tag)
        .bytes()
        .expect("emit demo/CapImpl");

    let point = ClassBuilder::new("demo/Point")
        .default_ctor()
        .bytes()
        .expect("emit demo/Point");

    let catalog = Catalog::builder()
        .mixin(Mixin {
            label: "cap".to_string(),
            marker: Pattern::exact("demo.Point"),
            interface_name: "demo/Capability".to_string(),
            impl_class: "demo/CapImpl".to_string(),
        })
        .build()
        .catalog;

    let sb = Sandbox::with_catalog(catalog);
    sb.define_class(capability).expect("define interface");
    sb.define_class(cap_impl).expect("define impl");
    sb.define_class(point).expect("define target");

    let point = sb.instantiate("demo/Point", "()V", vec![]).expect("new Point");
    let tag = sb
        .call_virtual(&point, "tag", vec![])
        .expect("delegated call")
        .expect("string result");
    assert_eq!(tag.as_str().as_deref(), Some("cap"));

    let loaded = sb.class("demo/Point").expect("lookup").expect("linked");
    assert!(loaded.woven);
    assert!(loaded
        .file
        .interfaces
        .iter()
        .any(|i| i == "demo/Capability"));
}

#[test]
fn test_timer_split_routes_hooks_to_wrapper_and_inner() {
    let mut run = CodeBody::new(2, 1);
    run.instructions.extend([
        var(op::ILOAD, 0),
        iconst(1),
        Insn::Op(op::IADD),
        Insn::Op(op::IRETURN),
    ]);
    let job = ClassBuilder::new("demo/Job")
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "run", "(I)I", run)
        .bytes()
        .expect("emit demo/Job");

    let timed = |label: &str, timer: &str, hook: &str| AdviceDef {
        label: label.to_string(),
        type_pattern: Pattern::exact("demo.Job"),
        method_pattern: Pattern::exact("run"),
        args: ArgPatterns::any(),
        capture_nested: true,
        timer_label: Some(timer.to_string()),
        hooks: vec![(
            HookSlot::OnBefore,
            probe(hook, "(Ljava/lang/String;)V", vec![Binding::MethodName]),
        )],
    };
    let catalog = Catalog::builder()
        .advice(timed("first", "outer", "t1"))
        .advice(timed("second", "inner", "t2"))
        .advice(timed("third", "extra", "t3"))
        .build()
        .catalog;

    let log = HookLog::new();
    let mut sb = Sandbox::with_catalog(catalog);
    for name in ["t1", "t2", "t3"] {
        sb.natives_mut()
            .register_probe(&log, "test/Hooks", name, "(Ljava/lang/String;)V");
    }
    sb.define_class(job).expect("define");

    let got = sb
        .call_static("demo/Job", "run", vec![Value::Int(4)])
        .expect("run")
        .expect("int result");
    assert_eq!(got.as_int().unwrap(), 5);

    // First timed advice wraps, second weaves the renamed inner body with
    // the public name still bound, third is dropped.
    assert_eq!(log.events(), vec!["t1(run)", "t2(run)"]);

    let loaded = sb.class("demo/Job").expect("lookup").expect("linked");
    let inner = loaded
        .find_method("run$jw$inner", "(I)I")
        .expect("inner method exists");
    let inner_flags = loaded.file.methods[inner].access_flags;
    assert_ne!(inner_flags & flags::ACC_SYNTHETIC, 0);
    assert_ne!(inner_flags & flags::ACC_PRIVATE, 0);
}
