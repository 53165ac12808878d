//! Interpreter coverage over classes built with `ClassBuilder`: frames,
//! branches, fields, objects, arrays, exception dispatch, and natives.

use jweave_classfile::{flags, iconst, ClassBuilder, CodeBody, ExceptionHandler, Insn, LdcValue};
use jweave_classfile::opcodes as op;
use jweave_sandbox::{HookLog, Sandbox, Value, VmError};

fn var(opcode: u8, index: u16) -> Insn {
    Insn::Var { opcode, index }
}

fn invoke_static(owner: &str, name: &str, descriptor: &str) -> Insn {
    Insn::Invoke {
        opcode: op::INVOKESTATIC,
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        interface: false,
    }
}

/// demo/Calc: arithmetic, a counting loop, and a tableswitch.
fn calc_class() -> Vec<u8> {
    let mut add = CodeBody::new(2, 2);
    add.instructions.extend([
        var(op::ILOAD, 0),
        var(op::ILOAD, 1),
        Insn::Op(op::IADD),
        Insn::Op(op::IRETURN),
    ]);

    let mut div = CodeBody::new(2, 2);
    div.instructions.extend([
        var(op::ILOAD, 0),
        var(op::ILOAD, 1),
        Insn::Op(op::IDIV),
        Insn::Op(op::IRETURN),
    ]);

    // sum of 0..n
    let mut sum = CodeBody::new(2, 3);
    let cond = sum.new_label();
    let done = sum.new_label();
    sum.instructions.extend([
        iconst(0),
        var(op::ISTORE, 1),
        iconst(0),
        var(op::ISTORE, 2),
        Insn::Label(cond),
        var(op::ILOAD, 2),
        var(op::ILOAD, 0),
        Insn::Jump {
            opcode: op::IF_ICMPGE,
            target: done,
        },
        var(op::ILOAD, 1),
        var(op::ILOAD, 2),
        Insn::Op(op::IADD),
        var(op::ISTORE, 1),
        Insn::Iinc { index: 2, delta: 1 },
        Insn::Jump {
            opcode: op::GOTO,
            target: cond,
        },
        Insn::Label(done),
        var(op::ILOAD, 1),
        Insn::Op(op::IRETURN),
    ]);

    let mut pick = CodeBody::new(1, 1);
    let zero = pick.new_label();
    let one = pick.new_label();
    let other = pick.new_label();
    pick.instructions.extend([
        var(op::ILOAD, 0),
        Insn::TableSwitch {
            default: other,
            low: 0,
            targets: vec![zero, one],
        },
        Insn::Label(zero),
        iconst(10),
        Insn::Op(op::IRETURN),
        Insn::Label(one),
        iconst(20),
        Insn::Op(op::IRETURN),
        Insn::Label(other),
        iconst(-1),
        Insn::Op(op::IRETURN),
    ]);

    let mut twice = CodeBody::new(4, 2);
    twice.instructions.extend([
        var(op::LLOAD, 0),
        var(op::LLOAD, 0),
        Insn::Op(op::LADD),
        Insn::Op(op::LRETURN),
    ]);

    ClassBuilder::new("demo/Calc")
        .default_ctor()
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "add", "(II)I", add)
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "div", "(II)I", div)
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "sum", "(I)I", sum)
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "pick", "(I)I", pick)
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "twice", "(J)J", twice)
        .bytes()
        .expect("emit demo/Calc")
}

#[test]
fn test_static_arithmetic_and_branches() {
    let sb = Sandbox::new();
    sb.define_class(calc_class()).expect("define");

    let add = sb
        .call_static("demo/Calc", "add", vec![Value::Int(19), Value::Int(23)])
        .expect("add")
        .expect("int result");
    assert_eq!(add.as_int().unwrap(), 42);

    let sum = sb
        .call_static("demo/Calc", "sum", vec![Value::Int(5)])
        .expect("sum")
        .expect("int result");
    assert_eq!(sum.as_int().unwrap(), 10);

    let twice = sb
        .call_static("demo/Calc", "twice", vec![Value::Long(1 << 40)])
        .expect("twice")
        .expect("long result");
    assert_eq!(twice.as_long().unwrap(), 1i64 << 41);
}

#[test]
fn test_tableswitch_dispatch() {
    let sb = Sandbox::new();
    sb.define_class(calc_class()).expect("define");
    for (input, expected) in [(0, 10), (1, 20), (7, -1), (-3, -1)] {
        let got = sb
            .call_static("demo/Calc", "pick", vec![Value::Int(input)])
            .expect("pick")
            .expect("int result");
        assert_eq!(got.as_int().unwrap(), expected, "pick({input})");
    }
}

#[test]
fn test_division_by_zero_throws() {
    let sb = Sandbox::new();
    sb.define_class(calc_class()).expect("define");
    let err = sb
        .call_static("demo/Calc", "div", vec![Value::Int(1), Value::Int(0)])
        .expect_err("should throw");
    match err {
        VmError::Thrown(obj) => {
            assert_eq!(obj.borrow().class, "java/lang/ArithmeticException");
        }
        other => panic!("expected thrown exception, got {other}"),
    }
}

/// demo/Counter: instance state through getfield/putfield.
fn counter_class() -> Vec<u8> {
    let mut bump = CodeBody::new(3, 1);
    bump.instructions.extend([
        var(op::ALOAD, 0),
        var(op::ALOAD, 0),
        Insn::Field {
            opcode: op::GETFIELD,
            owner: "demo/Counter".to_string(),
            name: "count".to_string(),
            descriptor: "I".to_string(),
        },
        iconst(1),
        Insn::Op(op::IADD),
        Insn::Op(op::DUP_X1),
        Insn::Field {
            opcode: op::PUTFIELD,
            owner: "demo/Counter".to_string(),
            name: "count".to_string(),
            descriptor: "I".to_string(),
        },
        Insn::Op(op::IRETURN),
    ]);
    ClassBuilder::new("demo/Counter")
        .field(flags::ACC_PRIVATE, "count", "I")
        .default_ctor()
        .method(flags::ACC_PUBLIC, "bump", "()I", bump)
        .bytes()
        .expect("emit demo/Counter")
}

#[test]
fn test_instance_fields_and_virtual_calls() {
    let sb = Sandbox::new();
    sb.define_class(counter_class()).expect("define");
    let counter = sb.instantiate("demo/Counter", "()V", vec![]).expect("new");
    for expected in 1..=3 {
        let got = sb
            .call_virtual(&counter, "bump", vec![])
            .expect("bump")
            .expect("int result");
        assert_eq!(got.as_int().unwrap(), expected);
    }
}

#[test]
fn test_clinit_runs_once_on_first_use() {
    let mut clinit = CodeBody::new(1, 0);
    clinit.instructions.extend([
        Insn::Bipush(7),
        Insn::Field {
            opcode: op::PUTSTATIC,
            owner: "demo/Registry".to_string(),
            name: "total".to_string(),
            descriptor: "I".to_string(),
        },
        Insn::Op(op::RETURN),
    ]);
    let mut read = CodeBody::new(1, 0);
    read.instructions.extend([
        Insn::Field {
            opcode: op::GETSTATIC,
            owner: "demo/Registry".to_string(),
            name: "total".to_string(),
            descriptor: "I".to_string(),
        },
        Insn::Op(op::IRETURN),
    ]);
    let mut add = CodeBody::new(2, 1);
    add.instructions.extend([
        Insn::Field {
            opcode: op::GETSTATIC,
            owner: "demo/Registry".to_string(),
            name: "total".to_string(),
            descriptor: "I".to_string(),
        },
        var(op::ILOAD, 0),
        Insn::Op(op::IADD),
        Insn::Field {
            opcode: op::PUTSTATIC,
            owner: "demo/Registry".to_string(),
            name: "total".to_string(),
            descriptor: "I".to_string(),
        },
        Insn::Op(op::RETURN),
    ]);
    let bytes = ClassBuilder::new("demo/Registry")
        .field(flags::ACC_PRIVATE | flags::ACC_STATIC, "total", "I")
        .method(flags::ACC_STATIC, "<clinit>", "()V", clinit)
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "read", "()I", read)
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "add", "(I)V", add)
        .bytes()
        .expect("emit demo/Registry");

    let sb = Sandbox::new();
    sb.define_class(bytes).expect("define");
    let first = sb
        .call_static("demo/Registry", "read", vec![])
        .expect("read")
        .expect("int");
    assert_eq!(first.as_int().unwrap(), 7);

    sb.call_static("demo/Registry", "add", vec![Value::Int(5)])
        .expect("add");
    let second = sb
        .call_static("demo/Registry", "read", vec![])
        .expect("read")
        .expect("int");
    // 12, not 7: <clinit> did not run again and reset the field
    assert_eq!(second.as_int().unwrap(), 12);
}

fn boom_class() -> Vec<u8> {
    ClassBuilder::new("demo/Boom")
        .extends("java/lang/RuntimeException")
        .default_ctor()
        .bytes()
        .expect("emit demo/Boom")
}

fn thrower_class() -> Vec<u8> {
    let mut boom = CodeBody::new(2, 0);
    boom.instructions.extend([
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

    // catch (Exception) around boom(); demo/Boom matches through the
    // registered super demo/Boom -> RuntimeException -> Exception
    let mut catches = CodeBody::new(1, 1);
    let start = catches.new_label();
    let end = catches.new_label();
    let handler = catches.new_label();
    catches.instructions.extend([
        Insn::Label(start),
        invoke_static("demo/Thrower", "boom", "()V"),
        Insn::Label(end),
        iconst(0),
        Insn::Op(op::IRETURN),
        Insn::Label(handler),
        Insn::Op(op::POP),
        iconst(1),
        Insn::Op(op::IRETURN),
    ]);
    catches.handlers.push(ExceptionHandler {
        start,
        end,
        handler,
        catch_type: Some("java/lang/Exception".to_string()),
    });

    // catch (IllegalStateException) never matches demo/Boom
    let mut misses = CodeBody::new(1, 1);
    let start = misses.new_label();
    let end = misses.new_label();
    let handler = misses.new_label();
    misses.instructions.extend([
        Insn::Label(start),
        invoke_static("demo/Thrower", "boom", "()V"),
        Insn::Label(end),
        iconst(0),
        Insn::Op(op::IRETURN),
        Insn::Label(handler),
        Insn::Op(op::POP),
        iconst(1),
        Insn::Op(op::IRETURN),
    ]);
    misses.handlers.push(ExceptionHandler {
        start,
        end,
        handler,
        catch_type: Some("java/lang/IllegalStateException".to_string()),
    });

    ClassBuilder::new("demo/Thrower")
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "boom", "()V", boom)
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "catches", "()I", catches)
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "misses", "()I", misses)
        .bytes()
        .expect("emit demo/Thrower")
}

#[test]
fn test_exception_table_matches_by_type_chain() {
    let sb = Sandbox::new();
    sb.define_class(boom_class()).expect("define boom");
    sb.define_class(thrower_class()).expect("define thrower");

    let caught = sb
        .call_static("demo/Thrower", "catches", vec![])
        .expect("catches")
        .expect("int");
    assert_eq!(caught.as_int().unwrap(), 1);

    let err = sb
        .call_static("demo/Thrower", "misses", vec![])
        .expect_err("should escape past the handler");
    match err {
        VmError::Thrown(obj) => assert_eq!(obj.borrow().class, "demo/Boom"),
        other => panic!("expected thrown exception, got {other}"),
    }
}

#[test]
fn test_throwable_message_native() {
    let mut shout = CodeBody::new(3, 0);
    shout.instructions.extend([
        Insn::TypeOp {
            opcode: op::NEW,
            name: "java/lang/IllegalStateException".to_string(),
        },
        Insn::Op(op::DUP),
        Insn::Ldc(LdcValue::Str("broken".to_string())),
        Insn::Invoke {
            opcode: op::INVOKESPECIAL,
            owner: "java/lang/IllegalStateException".to_string(),
            name: "<init>".to_string(),
            descriptor: "(Ljava/lang/String;)V".to_string(),
            interface: false,
        },
        Insn::Op(op::ATHROW),
    ]);
    let bytes = ClassBuilder::new("demo/Shouter")
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "shout", "()V", shout)
        .bytes()
        .expect("emit demo/Shouter");

    let sb = Sandbox::new();
    sb.define_class(bytes).expect("define");
    let err = sb
        .call_static("demo/Shouter", "shout", vec![])
        .expect_err("should throw");
    let VmError::Thrown(obj) = err else {
        panic!("expected thrown exception");
    };
    let message = sb
        .call_virtual(&Value::Ref(Some(obj)), "getMessage", vec![])
        .expect("getMessage")
        .expect("string");
    assert_eq!(message.as_str().as_deref(), Some("broken"));
}

#[test]
fn test_primitive_arrays() {
    let mut fill = CodeBody::new(3, 1);
    fill.instructions.extend([
        iconst(3),
        Insn::NewArray { atype: 10 },
        var(op::ASTORE, 0),
        var(op::ALOAD, 0),
        iconst(0),
        Insn::Bipush(5),
        Insn::Op(op::IASTORE),
        var(op::ALOAD, 0),
        iconst(1),
        Insn::Bipush(6),
        Insn::Op(op::IASTORE),
        var(op::ALOAD, 0),
        iconst(0),
        Insn::Op(op::IALOAD),
        var(op::ALOAD, 0),
        iconst(1),
        Insn::Op(op::IALOAD),
        Insn::Op(op::IADD),
        var(op::ALOAD, 0),
        Insn::Op(op::ARRAYLENGTH),
        Insn::Op(op::IADD),
        Insn::Op(op::IRETURN),
    ]);
    let bytes = ClassBuilder::new("demo/Arrays")
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "fill", "()I", fill)
        .bytes()
        .expect("emit demo/Arrays");

    let sb = Sandbox::new();
    sb.define_class(bytes).expect("define");
    let got = sb
        .call_static("demo/Arrays", "fill", vec![])
        .expect("fill")
        .expect("int");
    // 5 + 6 + length 3
    assert_eq!(got.as_int().unwrap(), 14);
}

#[test]
fn test_runaway_recursion_hits_depth_limit() {
    let mut spin = CodeBody::new(1, 0);
    spin.instructions.extend([
        invoke_static("demo/Deep", "spin", "()V"),
        Insn::Op(op::RETURN),
    ]);
    let bytes = ClassBuilder::new("demo/Deep")
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "spin", "()V", spin)
        .bytes()
        .expect("emit demo/Deep");

    let sb = Sandbox::new();
    sb.define_class(bytes).expect("define");
    let err = sb
        .call_static("demo/Deep", "spin", vec![])
        .expect_err("must not spin forever");
    assert!(matches!(err, VmError::DepthLimit));
}

#[test]
fn test_unbound_native_is_a_typed_error() {
    let mut poke = CodeBody::new(1, 0);
    poke.instructions.extend([
        invoke_static("ext/Mystery", "poke", "()V"),
        Insn::Op(op::RETURN),
    ]);
    let bytes = ClassBuilder::new("demo/Poker")
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "poke", "()V", poke)
        .bytes()
        .expect("emit demo/Poker");

    let sb = Sandbox::new();
    sb.define_class(bytes).expect("define");
    let err = sb
        .call_static("demo/Poker", "poke", vec![])
        .expect_err("no native bound");
    assert!(matches!(err, VmError::NativeMissing { .. }), "got {err}");
}

#[test]
fn test_probe_native_records_rendered_args() {
    let mut ping = CodeBody::new(2, 0);
    ping.instructions.extend([
        Insn::Ldc(LdcValue::Str("job".to_string())),
        Insn::Bipush(9),
        Insn::Invoke {
            opcode: op::INVOKESTATIC,
            owner: "ext/Probe".to_string(),
            name: "ping".to_string(),
            descriptor: "(Ljava/lang/String;I)V".to_string(),
            interface: false,
        },
        Insn::Op(op::RETURN),
    ]);
    let bytes = ClassBuilder::new("demo/Pinger")
        .method(flags::ACC_PUBLIC | flags::ACC_STATIC, "ping", "()V", ping)
        .bytes()
        .expect("emit demo/Pinger");

    let log = HookLog::new();
    let mut sb = Sandbox::new();
    sb.natives_mut()
        .register_probe(&log, "ext/Probe", "ping", "(Ljava/lang/String;I)V");
    sb.define_class(bytes).expect("define");
    sb.call_static("demo/Pinger", "ping", vec![]).expect("ping");
    assert_eq!(log.events(), vec!["ping(job, 9)"]);
}

#[test]
fn test_bundle_roundtrip_and_validation() {
    use base64::Engine;

    let calc = calc_class();
    let manifest = serde_json::json!({
        "classes": [
            { "name": "demo/Calc", "bytes": base64::engine::general_purpose::STANDARD.encode(&calc) },
        ]
    })
    .to_string();

    let sb = Sandbox::new();
    let names = sb.load_bundle(&manifest).expect("load bundle");
    assert_eq!(names, vec!["demo/Calc"]);
    let got = sb
        .call_static("demo/Calc", "add", vec![Value::Int(2), Value::Int(3)])
        .expect("add")
        .expect("int");
    assert_eq!(got.as_int().unwrap(), 5);

    let mismatched = serde_json::json!({
        "classes": [
            { "name": "demo/Other", "bytes": base64::engine::general_purpose::STANDARD.encode(&calc) },
        ]
    })
    .to_string();
    let err = Sandbox::new().load_bundle(&mismatched).expect_err("name mismatch");
    assert!(matches!(err, VmError::Bundle(_)), "got {err}");

    let garbled = r#"{ "classes": [ { "name": "demo/Calc", "bytes": "!!!" } ] }"#;
    let err = Sandbox::new().load_bundle(garbled).expect_err("bad base64");
    assert!(matches!(err, VmError::Bundle(_)), "got {err}");
}
