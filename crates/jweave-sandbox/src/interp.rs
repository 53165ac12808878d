//! Frame-based execution over the decoded instruction list.
//!
//! One frame per Java call: an operand stack of [`Value`]s, a locals array
//! with two-slot accounting for `long`/`double`, and a label-indexed jump
//! table built from the method's [`CodeBody`]. Exceptions travel as
//! [`VmError::Thrown`] carrying the object itself, so a rethrown throwable
//! keeps its identity all the way out.

use std::collections::HashMap;
use std::rc::Rc;

use jweave_classfile::{
    flags, opcodes as op, CodeBody, Insn, Label, LdcValue, MethodDescriptor, MethodInfo,
};

use crate::error::{Result, VmError};
use crate::loader::{LoadedClass, Sandbox};
use crate::value::{Obj, ObjRef, Payload, Value};

/// Nested-call ceiling. Deep enough for test recursion, shallow enough to
/// fail fast when a woven method loops into itself.
pub(crate) const DEPTH_LIMIT: usize = 256;

/// What one instruction did to control flow.
enum Flow {
    Next,
    Jump(Label),
    Return(Option<Value>),
}

pub(crate) enum Dispatch {
    Static,
    /// Exact-owner resolution: constructors, private and super calls.
    Special,
    /// Resolution starts at the receiver's runtime class.
    Virtual,
}

fn opcode_name(opcode: u8) -> String {
    match op::mnemonic(opcode) {
        Some(name) => name.to_string(),
        None => format!("0x{opcode:02x}"),
    }
}

/// Executes `class.methods[index]` with `args` already laid out in call
/// order (receiver first for instance methods).
pub(crate) fn run_method(
    sb: &Sandbox,
    class: &Rc<LoadedClass>,
    index: usize,
    args: Vec<Value>,
    depth: usize,
) -> Result<Option<Value>> {
    if depth >= DEPTH_LIMIT {
        return Err(VmError::DepthLimit);
    }
    let method = &class.file.methods[index];
    let body = match &method.body {
        Some(jweave_classfile::MethodBody::Decoded(code)) => code,
        _ => {
            return Err(VmError::MethodNotFound {
                owner: class.file.name.clone(),
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
            })
        }
    };

    let mut locals = vec![Value::Int(0); body.max_locals as usize];
    let mut slot = 0usize;
    for arg in args {
        let width = arg.width() as usize;
        if slot + width > locals.len() {
            // Tolerate tight fixtures that undercount max_locals.
            locals.resize(slot + width, Value::Int(0));
        }
        locals[slot] = arg;
        slot += width;
    }

    let labels = label_positions(body);
    let mut stack: Vec<Value> = Vec::with_capacity(body.max_stack as usize);
    let mut pc = 0usize;

    while pc < body.instructions.len() {
        let outcome = exec(sb, body, &mut stack, &mut locals, pc, method, depth);
        match outcome {
            Ok(Flow::Next) => pc += 1,
            Ok(Flow::Jump(target)) => pc = resolve(&labels, target)?,
            Ok(Flow::Return(v)) => return Ok(v),
            Err(VmError::Thrown(obj)) => {
                match find_handler(sb, body, &labels, pc, &obj)? {
                    Some(handler_pc) => {
                        stack.clear();
                        stack.push(Value::Ref(Some(obj)));
                        pc = handler_pc;
                    }
                    None => return Err(VmError::Thrown(obj)),
                }
            }
            Err(e) => return Err(e),
        }
    }
    // Verified code always ends in a return or throw.
    Err(VmError::Unsupported(format!(
        "{}.{} fell off the end of its code",
        class.file.name, method.name
    )))
}

fn label_positions(body: &CodeBody) -> HashMap<Label, usize> {
    let mut map = HashMap::new();
    for (i, insn) in body.instructions.iter().enumerate() {
        if let Insn::Label(l) = insn {
            map.insert(*l, i);
        }
    }
    map
}

fn resolve(labels: &HashMap<Label, usize>, target: Label) -> Result<usize> {
    labels
        .get(&target)
        .copied()
        .ok_or_else(|| VmError::Unsupported(format!("branch to unbound label {target:?}")))
}

/// First enabled handler covering `pc` whose catch type matches the thrown
/// object's class chain.
fn find_handler(
    sb: &Sandbox,
    body: &CodeBody,
    labels: &HashMap<Label, usize>,
    pc: usize,
    thrown: &ObjRef,
) -> Result<Option<usize>> {
    let class_name = thrown.borrow().class.clone();
    for h in &body.handlers {
        let start = resolve(labels, h.start)?;
        let end = resolve(labels, h.end)?;
        if pc < start || pc >= end {
            continue;
        }
        let matches = match &h.catch_type {
            None => true,
            Some(want) => type_extends(sb, &class_name, want)?,
        };
        if matches {
            return Ok(Some(resolve(labels, h.handler)?));
        }
    }
    Ok(None)
}

/// Super chain for throwable types the sandbox never loads as class files.
pub(crate) fn builtin_super(name: &str) -> Option<&'static str> {
    match name {
        "java/lang/IllegalStateException"
        | "java/lang/IllegalArgumentException"
        | "java/lang/ArithmeticException"
        | "java/lang/NullPointerException"
        | "java/lang/ArrayIndexOutOfBoundsException" => Some("java/lang/RuntimeException"),
        "java/lang/RuntimeException" => Some("java/lang/Exception"),
        "java/lang/Exception" | "java/lang/Error" => Some("java/lang/Throwable"),
        "java/lang/Throwable" => Some("java/lang/Object"),
        _ => None,
    }
}

/// Nominal subtype walk over registered classes, falling back to the
/// builtin throwable ladder for `java/lang` names.
pub(crate) fn type_extends(sb: &Sandbox, name: &str, want: &str) -> Result<bool> {
    if name == want {
        return Ok(true);
    }
    if let Some(class) = sb.class(name)? {
        for iface in &class.file.interfaces {
            if type_extends(sb, iface, want)? {
                return Ok(true);
            }
        }
        return match &class.file.super_name {
            Some(s) => type_extends(sb, s, want),
            None => Ok(false),
        };
    }
    match builtin_super(name) {
        Some(s) => type_extends(sb, s, want),
        None => Ok(false),
    }
}

fn throw_new(class_name: &str, message: &str) -> VmError {
    let obj = Obj::new(class_name);
    obj.borrow_mut()
        .fields
        .insert("message".to_string(), Value::string(message));
    VmError::Thrown(obj)
}

fn npe(context: &str) -> VmError {
    throw_new("java/lang/NullPointerException", context)
}

fn pop(stack: &mut Vec<Value>) -> Result<Value> {
    stack.pop().ok_or(VmError::StackUnderflow)
}

fn pop_int(stack: &mut Vec<Value>) -> Result<i32> {
    pop(stack)?.as_int()
}

fn pop_ref(stack: &mut Vec<Value>) -> Result<Option<ObjRef>> {
    pop(stack)?.as_ref()
}

fn pop_nonnull(stack: &mut Vec<Value>, context: &str) -> Result<ObjRef> {
    pop_ref(stack)?.ok_or_else(|| npe(context))
}

fn exec(
    sb: &Sandbox,
    body: &CodeBody,
    stack: &mut Vec<Value>,
    locals: &mut Vec<Value>,
    pc: usize,
    method: &MethodInfo,
    depth: usize,
) -> Result<Flow> {
    match &body.instructions[pc] {
        Insn::Label(_) => Ok(Flow::Next),
        Insn::Op(opcode) => exec_op(*opcode, stack),
        Insn::Bipush(v) => {
            stack.push(Value::Int(*v as i32));
            Ok(Flow::Next)
        }
        Insn::Sipush(v) => {
            stack.push(Value::Int(*v as i32));
            Ok(Flow::Next)
        }
        Insn::Ldc(value) => {
            stack.push(match value {
                LdcValue::Int(v) => Value::Int(*v),
                LdcValue::Float(v) => Value::Float(*v),
                LdcValue::Long(v) => Value::Long(*v),
                LdcValue::Double(v) => Value::Double(*v),
                LdcValue::Str(s) => Value::string(s.clone()),
                LdcValue::Class(name) => Value::Ref(Some(Obj::with_payload(
                    "java/lang/Class",
                    Payload::Str(name.clone()),
                ))),
                LdcValue::Raw { index, .. } => {
                    return Err(VmError::Unsupported(format!(
                        "ldc of raw pool entry #{index}"
                    )))
                }
            });
            Ok(Flow::Next)
        }
        Insn::Var { opcode, index } => exec_var(*opcode, *index, stack, locals),
        Insn::Iinc { index, delta } => {
            let slot = *index as usize;
            let current = locals
                .get(slot)
                .ok_or(VmError::TypeMismatch("iinc slot"))?
                .as_int()?;
            locals[slot] = Value::Int(current.wrapping_add(*delta as i32));
            Ok(Flow::Next)
        }
        Insn::Jump { opcode, target } => exec_jump(*opcode, *target, stack),
        Insn::TableSwitch {
            default,
            low,
            targets,
        } => {
            let key = pop_int(stack)?;
            let offset = (key as i64) - (*low as i64);
            let target = if offset >= 0 && (offset as usize) < targets.len() {
                targets[offset as usize]
            } else {
                *default
            };
            Ok(Flow::Jump(target))
        }
        Insn::LookupSwitch { default, pairs } => {
            let key = pop_int(stack)?;
            let target = pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, l)| *l)
                .unwrap_or(*default);
            Ok(Flow::Jump(target))
        }
        Insn::Field {
            opcode,
            owner,
            name,
            descriptor,
        } => exec_field(sb, *opcode, owner, name, descriptor, stack),
        Insn::Invoke {
            opcode,
            owner,
            name,
            descriptor,
            ..
        } => {
            let result = exec_invoke(sb, *opcode, owner, name, descriptor, stack, depth)?;
            if let Some(v) = result {
                stack.push(v);
            }
            Ok(Flow::Next)
        }
        Insn::InvokeDynamic { index } => Err(VmError::Unsupported(format!(
            "invokedynamic (pool #{index}) in {}",
            method.name
        ))),
        Insn::TypeOp { opcode, name } => exec_type_op(sb, *opcode, name, stack),
        Insn::NewArray { atype } => {
            let len = pop_int(stack)?;
            if len < 0 {
                return Err(throw_new(
                    "java/lang/IllegalArgumentException",
                    "negative array size",
                ));
            }
            let fill = match atype {
                6 => Value::Float(0.0),
                7 => Value::Double(0.0),
                11 => Value::Long(0),
                _ => Value::Int(0),
            };
            stack.push(Value::Ref(Some(Obj::with_payload(
                primitive_array_class(*atype),
                Payload::Array(vec![fill; len as usize]),
            ))));
            Ok(Flow::Next)
        }
        Insn::MultiANewArray { descriptor, .. } => Err(VmError::Unsupported(format!(
            "multianewarray {descriptor}"
        ))),
    }
}

fn primitive_array_class(atype: u8) -> &'static str {
    match atype {
        4 => "[Z",
        5 => "[C",
        6 => "[F",
        7 => "[D",
        8 => "[B",
        9 => "[S",
        11 => "[J",
        _ => "[I",
    }
}

/// Operand-free opcodes: constants, stack shuffles, arithmetic,
/// conversions, comparisons, returns, athrow.
fn exec_op(opcode: u8, stack: &mut Vec<Value>) -> Result<Flow> {
    match opcode {
        op::NOP => {}
        op::ACONST_NULL => stack.push(Value::null()),
        op::ICONST_M1..=op::ICONST_5 => {
            stack.push(Value::Int(opcode as i32 - op::ICONST_0 as i32))
        }
        op::LCONST_0 | op::LCONST_1 => stack.push(Value::Long((opcode - op::LCONST_0) as i64)),
        op::FCONST_0..=op::FCONST_2 => stack.push(Value::Float((opcode - op::FCONST_0) as f32)),
        op::DCONST_0 | op::DCONST_1 => stack.push(Value::Double((opcode - op::DCONST_0) as f64)),

        op::POP => {
            pop(stack)?;
        }
        op::POP2 => {
            if pop(stack)?.width() == 1 {
                pop(stack)?;
            }
        }
        op::DUP => {
            let top = pop(stack)?;
            stack.push(top.clone());
            stack.push(top);
        }
        op::DUP_X1 => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            stack.push(a.clone());
            stack.push(b);
            stack.push(a);
        }
        op::DUP_X2 => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            if b.width() == 2 {
                stack.push(a.clone());
                stack.push(b);
            } else {
                let c = pop(stack)?;
                stack.push(a.clone());
                stack.push(c);
                stack.push(b);
            }
            stack.push(a);
        }
        op::DUP2 => {
            let a = pop(stack)?;
            if a.width() == 2 {
                stack.push(a.clone());
                stack.push(a);
            } else {
                let b = pop(stack)?;
                stack.push(b.clone());
                stack.push(a.clone());
                stack.push(b);
                stack.push(a);
            }
        }
        op::SWAP => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            stack.push(a);
            stack.push(b);
        }

        op::IADD => int_binop(stack, i32::wrapping_add)?,
        op::ISUB => int_binop(stack, i32::wrapping_sub)?,
        op::IMUL => int_binop(stack, i32::wrapping_mul)?,
        op::IDIV => {
            let b = pop_int(stack)?;
            let a = pop_int(stack)?;
            if b == 0 {
                return Err(throw_new("java/lang/ArithmeticException", "/ by zero"));
            }
            stack.push(Value::Int(a.wrapping_div(b)));
        }
        op::IREM => {
            let b = pop_int(stack)?;
            let a = pop_int(stack)?;
            if b == 0 {
                return Err(throw_new("java/lang/ArithmeticException", "/ by zero"));
            }
            stack.push(Value::Int(a.wrapping_rem(b)));
        }
        op::INEG => {
            let a = pop_int(stack)?;
            stack.push(Value::Int(a.wrapping_neg()));
        }
        op::ISHL => int_binop(stack, |a, b| a.wrapping_shl(b as u32 & 0x1f))?,
        op::ISHR => int_binop(stack, |a, b| a.wrapping_shr(b as u32 & 0x1f))?,
        op::IUSHR => int_binop(stack, |a, b| ((a as u32) >> (b as u32 & 0x1f)) as i32)?,
        op::IAND => int_binop(stack, |a, b| a & b)?,
        op::IOR => int_binop(stack, |a, b| a | b)?,
        op::IXOR => int_binop(stack, |a, b| a ^ b)?,

        op::LADD => long_binop(stack, i64::wrapping_add)?,
        op::LSUB => long_binop(stack, i64::wrapping_sub)?,
        op::LMUL => long_binop(stack, i64::wrapping_mul)?,
        op::LDIV => {
            let b = pop(stack)?.as_long()?;
            let a = pop(stack)?.as_long()?;
            if b == 0 {
                return Err(throw_new("java/lang/ArithmeticException", "/ by zero"));
            }
            stack.push(Value::Long(a.wrapping_div(b)));
        }
        op::LREM => {
            let b = pop(stack)?.as_long()?;
            let a = pop(stack)?.as_long()?;
            if b == 0 {
                return Err(throw_new("java/lang/ArithmeticException", "/ by zero"));
            }
            stack.push(Value::Long(a.wrapping_rem(b)));
        }
        op::LNEG => {
            let a = pop(stack)?.as_long()?;
            stack.push(Value::Long(a.wrapping_neg()));
        }
        op::LSHL => {
            let b = pop_int(stack)?;
            let a = pop(stack)?.as_long()?;
            stack.push(Value::Long(a.wrapping_shl(b as u32 & 0x3f)));
        }
        op::LSHR => {
            let b = pop_int(stack)?;
            let a = pop(stack)?.as_long()?;
            stack.push(Value::Long(a.wrapping_shr(b as u32 & 0x3f)));
        }
        op::LUSHR => {
            let b = pop_int(stack)?;
            let a = pop(stack)?.as_long()?;
            stack.push(Value::Long(((a as u64) >> (b as u32 & 0x3f)) as i64));
        }
        op::LAND => long_binop(stack, |a, b| a & b)?,
        op::LOR => long_binop(stack, |a, b| a | b)?,
        op::LXOR => long_binop(stack, |a, b| a ^ b)?,

        op::FADD => float_binop(stack, |a, b| a + b)?,
        op::FSUB => float_binop(stack, |a, b| a - b)?,
        op::FMUL => float_binop(stack, |a, b| a * b)?,
        op::FDIV => float_binop(stack, |a, b| a / b)?,
        op::FREM => float_binop(stack, |a, b| a % b)?,
        op::FNEG => {
            let a = pop(stack)?.as_float()?;
            stack.push(Value::Float(-a));
        }
        op::DADD => double_binop(stack, |a, b| a + b)?,
        op::DSUB => double_binop(stack, |a, b| a - b)?,
        op::DMUL => double_binop(stack, |a, b| a * b)?,
        op::DDIV => double_binop(stack, |a, b| a / b)?,
        op::DREM => double_binop(stack, |a, b| a % b)?,
        op::DNEG => {
            let a = pop(stack)?.as_double()?;
            stack.push(Value::Double(-a));
        }

        op::I2L => {
            let a = pop_int(stack)?;
            stack.push(Value::Long(a as i64));
        }
        op::I2F => {
            let a = pop_int(stack)?;
            stack.push(Value::Float(a as f32));
        }
        op::I2D => {
            let a = pop_int(stack)?;
            stack.push(Value::Double(a as f64));
        }
        op::L2I => {
            let a = pop(stack)?.as_long()?;
            stack.push(Value::Int(a as i32));
        }
        op::L2F => {
            let a = pop(stack)?.as_long()?;
            stack.push(Value::Float(a as f32));
        }
        op::L2D => {
            let a = pop(stack)?.as_long()?;
            stack.push(Value::Double(a as f64));
        }
        op::F2I => {
            let a = pop(stack)?.as_float()?;
            stack.push(Value::Int(a as i32));
        }
        op::F2L => {
            let a = pop(stack)?.as_float()?;
            stack.push(Value::Long(a as i64));
        }
        op::F2D => {
            let a = pop(stack)?.as_float()?;
            stack.push(Value::Double(a as f64));
        }
        op::D2I => {
            let a = pop(stack)?.as_double()?;
            stack.push(Value::Int(a as i32));
        }
        op::D2L => {
            let a = pop(stack)?.as_double()?;
            stack.push(Value::Long(a as i64));
        }
        op::D2F => {
            let a = pop(stack)?.as_double()?;
            stack.push(Value::Float(a as f32));
        }
        op::I2B => {
            let a = pop_int(stack)?;
            stack.push(Value::Int(a as i8 as i32));
        }
        op::I2C => {
            let a = pop_int(stack)?;
            stack.push(Value::Int(a as u16 as i32));
        }
        op::I2S => {
            let a = pop_int(stack)?;
            stack.push(Value::Int(a as i16 as i32));
        }

        op::LCMP => {
            let b = pop(stack)?.as_long()?;
            let a = pop(stack)?.as_long()?;
            stack.push(Value::Int(cmp_to_int(a.cmp(&b))));
        }
        op::FCMPL | op::FCMPG => {
            let b = pop(stack)?.as_float()?;
            let a = pop(stack)?.as_float()?;
            stack.push(Value::Int(float_cmp(
                a.partial_cmp(&b),
                opcode == op::FCMPG,
            )));
        }
        op::DCMPL | op::DCMPG => {
            let b = pop(stack)?.as_double()?;
            let a = pop(stack)?.as_double()?;
            stack.push(Value::Int(float_cmp(
                a.partial_cmp(&b),
                opcode == op::DCMPG,
            )));
        }

        op::IALOAD | op::LALOAD | op::FALOAD | op::DALOAD | op::AALOAD | op::BALOAD
        | op::CALOAD | op::SALOAD => {
            let index = pop_int(stack)?;
            let array = pop_nonnull(stack, "array load")?;
            let array = array.borrow();
            match &array.payload {
                Payload::Array(items) => {
                    let item = items.get(index as usize).cloned().ok_or_else(|| {
                        throw_new(
                            "java/lang/ArrayIndexOutOfBoundsException",
                            &index.to_string(),
                        )
                    })?;
                    stack.push(item);
                }
                _ => return Err(VmError::TypeMismatch("array load")),
            }
        }
        op::IASTORE | op::LASTORE | op::FASTORE | op::DASTORE | op::AASTORE | op::BASTORE
        | op::CASTORE | op::SASTORE => {
            let value = pop(stack)?;
            let index = pop_int(stack)?;
            let array = pop_nonnull(stack, "array store")?;
            let mut array = array.borrow_mut();
            match &mut array.payload {
                Payload::Array(items) => {
                    let slot = items.get_mut(index as usize).ok_or_else(|| {
                        throw_new(
                            "java/lang/ArrayIndexOutOfBoundsException",
                            &index.to_string(),
                        )
                    })?;
                    *slot = value;
                }
                _ => return Err(VmError::TypeMismatch("array store")),
            }
        }
        op::ARRAYLENGTH => {
            let array = pop_nonnull(stack, "arraylength")?;
            let array = array.borrow();
            match &array.payload {
                Payload::Array(items) => stack.push(Value::Int(items.len() as i32)),
                _ => return Err(VmError::TypeMismatch("arraylength")),
            }
        }

        op::IRETURN | op::LRETURN | op::FRETURN | op::DRETURN | op::ARETURN => {
            let v = pop(stack)?;
            return Ok(Flow::Return(Some(v)));
        }
        op::RETURN => return Ok(Flow::Return(None)),

        op::ATHROW => {
            let obj = pop_nonnull(stack, "athrow")?;
            return Err(VmError::Thrown(obj));
        }

        // Single-threaded sandbox: monitors are balance-checked pops.
        op::MONITORENTER | op::MONITOREXIT => {
            pop_nonnull(stack, "monitor")?;
        }

        other => {
            return Err(VmError::Unsupported(format!(
                "opcode {}",
                opcode_name(other)
            )))
        }
    }
    Ok(Flow::Next)
}

fn int_binop(stack: &mut Vec<Value>, f: impl Fn(i32, i32) -> i32) -> Result<()> {
    let b = pop_int(stack)?;
    let a = pop_int(stack)?;
    stack.push(Value::Int(f(a, b)));
    Ok(())
}

fn long_binop(stack: &mut Vec<Value>, f: impl Fn(i64, i64) -> i64) -> Result<()> {
    let b = pop(stack)?.as_long()?;
    let a = pop(stack)?.as_long()?;
    stack.push(Value::Long(f(a, b)));
    Ok(())
}

fn float_binop(stack: &mut Vec<Value>, f: impl Fn(f32, f32) -> f32) -> Result<()> {
    let b = pop(stack)?.as_float()?;
    let a = pop(stack)?.as_float()?;
    stack.push(Value::Float(f(a, b)));
    Ok(())
}

fn double_binop(stack: &mut Vec<Value>, f: impl Fn(f64, f64) -> f64) -> Result<()> {
    let b = pop(stack)?.as_double()?;
    let a = pop(stack)?.as_double()?;
    stack.push(Value::Double(f(a, b)));
    Ok(())
}

fn cmp_to_int(ord: std::cmp::Ordering) -> i32 {
    match ord {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

fn float_cmp(ord: Option<std::cmp::Ordering>, nan_is_one: bool) -> i32 {
    match ord {
        Some(o) => cmp_to_int(o),
        None => {
            if nan_is_one {
                1
            } else {
                -1
            }
        }
    }
}

fn exec_var(opcode: u8, index: u16, stack: &mut Vec<Value>, locals: &mut Vec<Value>) -> Result<Flow> {
    let slot = index as usize;
    match opcode {
        op::ILOAD | op::LLOAD | op::FLOAD | op::DLOAD | op::ALOAD => {
            let v = locals
                .get(slot)
                .cloned()
                .ok_or(VmError::TypeMismatch("local load"))?;
            stack.push(v);
        }
        op::ISTORE | op::LSTORE | op::FSTORE | op::DSTORE | op::ASTORE => {
            let v = pop(stack)?;
            let width = v.width() as usize;
            if locals.len() < slot + width {
                locals.resize(slot + width, Value::Int(0));
            }
            locals[slot] = v;
        }
        op::RET => return Err(VmError::Unsupported("ret".to_string())),
        other => {
            return Err(VmError::Unsupported(format!(
                "var opcode {}",
                opcode_name(other)
            )))
        }
    }
    Ok(Flow::Next)
}

fn exec_jump(opcode: u8, target: Label, stack: &mut Vec<Value>) -> Result<Flow> {
    let taken = match opcode {
        op::GOTO | op::GOTO_W => true,
        op::IFEQ => pop_int(stack)? == 0,
        op::IFNE => pop_int(stack)? != 0,
        op::IFLT => pop_int(stack)? < 0,
        op::IFGE => pop_int(stack)? >= 0,
        op::IFGT => pop_int(stack)? > 0,
        op::IFLE => pop_int(stack)? <= 0,
        op::IF_ICMPEQ | op::IF_ICMPNE | op::IF_ICMPLT | op::IF_ICMPGE | op::IF_ICMPGT
        | op::IF_ICMPLE => {
            let b = pop_int(stack)?;
            let a = pop_int(stack)?;
            match opcode {
                op::IF_ICMPEQ => a == b,
                op::IF_ICMPNE => a != b,
                op::IF_ICMPLT => a < b,
                op::IF_ICMPGE => a >= b,
                op::IF_ICMPGT => a > b,
                _ => a <= b,
            }
        }
        op::IF_ACMPEQ | op::IF_ACMPNE => {
            let b = pop_ref(stack)?;
            let a = pop_ref(stack)?;
            let same = match (&a, &b) {
                (None, None) => true,
                (Some(x), Some(y)) => Rc::ptr_eq(x, y),
                _ => false,
            };
            (opcode == op::IF_ACMPEQ) == same
        }
        op::IFNULL => pop_ref(stack)?.is_none(),
        op::IFNONNULL => pop_ref(stack)?.is_some(),
        other => {
            return Err(VmError::Unsupported(format!(
                "jump opcode {}",
                opcode_name(other)
            )))
        }
    };
    if taken {
        Ok(Flow::Jump(target))
    } else {
        Ok(Flow::Next)
    }
}

fn exec_field(
    sb: &Sandbox,
    opcode: u8,
    owner: &str,
    name: &str,
    descriptor: &str,
    stack: &mut Vec<Value>,
) -> Result<Flow> {
    match opcode {
        op::GETSTATIC => {
            let v = sb.get_static(owner, name)?;
            stack.push(v);
        }
        op::PUTSTATIC => {
            let v = pop(stack)?;
            sb.set_static(owner, name, v)?;
        }
        op::GETFIELD => {
            let obj = pop_nonnull(stack, name)?;
            let v = obj
                .borrow()
                .fields
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::default_of(descriptor));
            stack.push(v);
        }
        op::PUTFIELD => {
            let v = pop(stack)?;
            let obj = pop_nonnull(stack, name)?;
            obj.borrow_mut().fields.insert(name.to_string(), v);
        }
        other => {
            return Err(VmError::Unsupported(format!(
                "field opcode {}",
                opcode_name(other)
            )))
        }
    }
    Ok(Flow::Next)
}

fn exec_type_op(sb: &Sandbox, opcode: u8, name: &str, stack: &mut Vec<Value>) -> Result<Flow> {
    match opcode {
        op::NEW => {
            // Touching a registered class links it (and runs <clinit>).
            sb.class(name)?;
            stack.push(Value::Ref(Some(Obj::new(name))));
        }
        op::CHECKCAST => {
            // The rewriter only emits casts the verifier already proved;
            // trust them rather than model the full reference type lattice.
        }
        op::INSTANCEOF => {
            let r = pop_ref(stack)?;
            let hit = match r {
                None => false,
                Some(obj) => {
                    let class = obj.borrow().class.clone();
                    type_extends(sb, &class, name)?
                }
            };
            stack.push(Value::Int(hit as i32));
        }
        op::ANEWARRAY => {
            let len = pop_int(stack)?;
            if len < 0 {
                return Err(throw_new(
                    "java/lang/IllegalArgumentException",
                    "negative array size",
                ));
            }
            stack.push(Value::Ref(Some(Obj::with_payload(
                format!("[L{name};"),
                Payload::Array(vec![Value::null(); len as usize]),
            ))));
        }
        other => {
            return Err(VmError::Unsupported(format!(
                "type opcode {}",
                opcode_name(other)
            )))
        }
    }
    Ok(Flow::Next)
}

fn exec_invoke(
    sb: &Sandbox,
    opcode: u8,
    owner: &str,
    name: &str,
    descriptor: &str,
    stack: &mut Vec<Value>,
    depth: usize,
) -> Result<Option<Value>> {
    let desc = MethodDescriptor::parse(descriptor)?;
    let mut args = vec![Value::Int(0); desc.params.len()];
    for slot in args.iter_mut().rev() {
        *slot = pop(stack)?;
    }

    let dispatch = match opcode {
        op::INVOKESTATIC => Dispatch::Static,
        op::INVOKESPECIAL => Dispatch::Special,
        op::INVOKEVIRTUAL | op::INVOKEINTERFACE => Dispatch::Virtual,
        other => {
            return Err(VmError::Unsupported(format!(
                "invoke opcode {}",
                opcode_name(other)
            )))
        }
    };

    if matches!(dispatch, Dispatch::Static) {
        return call_resolved(sb, owner, name, descriptor, args, depth, dispatch);
    }

    let receiver = pop_nonnull(stack, name)?;
    let start = match dispatch {
        Dispatch::Virtual => receiver.borrow().class.clone(),
        _ => owner.to_string(),
    };
    let mut full_args = Vec::with_capacity(args.len() + 1);
    full_args.push(Value::Ref(Some(receiver)));
    full_args.extend(args);
    call_resolved(sb, &start, name, descriptor, full_args, depth, dispatch)
}

/// Walks `start`'s registered super chain for a concrete body, then falls
/// back to the native registry along the same chain of names.
pub(crate) fn call_resolved(
    sb: &Sandbox,
    start: &str,
    name: &str,
    descriptor: &str,
    args: Vec<Value>,
    depth: usize,
    dispatch: Dispatch,
) -> Result<Option<Value>> {
    let mut chain: Vec<String> = Vec::new();
    let mut current = Some(start.to_string());

    while let Some(class_name) = current {
        chain.push(class_name.clone());
        let Some(class) = sb.class(&class_name)? else {
            // Off the edge of the registered world; keep the builtin
            // throwable spine so inherited natives still resolve.
            let mut tail = builtin_super(&class_name);
            while let Some(t) = tail {
                chain.push(t.to_string());
                tail = builtin_super(t);
            }
            break;
        };
        if let Some(index) = class.find_method(name, descriptor) {
            if !flags::is_bodyless(class.file.methods[index].access_flags) {
                return run_method(sb, &class, index, args, depth + 1);
            }
        }
        // Constructors and private calls never walk upward.
        if matches!(dispatch, Dispatch::Special) {
            break;
        }
        current = class.file.super_name.clone();
    }

    for class_name in &chain {
        if let Some(native) = sb.natives().lookup(class_name, name, descriptor) {
            return native(args);
        }
    }

    Err(VmError::NativeMissing {
        owner: start.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    })
}
