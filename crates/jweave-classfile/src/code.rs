//! Decoded method bodies: a linear instruction list with label-resolved
//! branch targets.
//!
//! Decoding turns a `Code` attribute payload into `Insn`s, replacing byte
//! offsets with `Label`s so instructions can be spliced in and out without
//! offset bookkeeping. Encoding lays the list back out, re-aligning switch
//! padding, widening `goto`/`jsr` to their `_w` forms when a displacement
//! outgrows 16 bits, and recompressing short variable forms.
//!
//! ## What survives a decode/encode cycle
//!
//! Instruction semantics, exception handler ranges, and `max_stack`/
//! `max_locals` survive. Code sub-attributes (`StackMapTable`,
//! `LineNumberTable`, local variable tables) are dropped: rewritten methods
//! are expected to run under a host that falls back to type inference.

use std::collections::{HashMap, HashSet};

use crate::descriptor::MethodDescriptor;
use crate::error::{ClassFileError, Result};
use crate::opcodes as op;
use crate::pool::{Constant, ConstantPool, PoolBuilder};
use crate::reader::{Reader, WriteBytes};

/// Opaque position marker inside one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// A loadable constant carried by an `ldc`-family instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum LdcValue {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Str(String),
    /// Internal class name (or array descriptor) for a class literal.
    Class(String),
    /// Pool entry kinds the rewriter never synthesizes (method handles,
    /// method types, dynamic constants), carried by original index. The
    /// seeded pool builder keeps these indices valid. `wide` marks the
    /// `ldc2_w` form.
    Raw { index: u16, wide: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Marks a position other instructions can branch to. Zero width.
    Label(Label),
    /// Any opcode without operands.
    Op(u8),
    Bipush(i8),
    Sipush(i16),
    Ldc(LdcValue),
    /// `iload`/`lload`/`fload`/`dload`/`aload`/`istore`/../`astore`/`ret`
    /// with short, `_n`, and `wide` forms normalized away.
    Var { opcode: u8, index: u16 },
    Iinc { index: u16, delta: i16 },
    Jump { opcode: u8, target: Label },
    TableSwitch {
        default: Label,
        low: i32,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
    Invoke {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        /// True when the owner is an interface (controls the pool entry
        /// kind, not just `invokeinterface`).
        interface: bool,
    },
    /// Carried by pool index; the bootstrap method table is never touched.
    InvokeDynamic { index: u16 },
    /// `new`, `anewarray`, `checkcast`, `instanceof`.
    TypeOp { opcode: u8, name: String },
    NewArray { atype: u8 },
    MultiANewArray { descriptor: String, dims: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    pub start: Label,
    /// Exclusive. May sit at the very end of the instruction list.
    pub end: Label,
    pub handler: Label,
    /// `None` catches everything.
    pub catch_type: Option<String>,
}

/// One method body in splice-friendly form.
#[derive(Debug, Clone)]
pub struct CodeBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Insn>,
    pub handlers: Vec<ExceptionHandler>,
    next_label: u32,
}

/// Shortest instruction that pushes `value` as an int.
pub fn iconst(value: i32) -> Insn {
    match value {
        -1..=5 => Insn::Op((op::ICONST_0 as i32 + value) as u8),
        -128..=127 => Insn::Bipush(value as i8),
        -32768..=32767 => Insn::Sipush(value as i16),
        _ => Insn::Ldc(LdcValue::Int(value)),
    }
}

impl CodeBody {
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Self {
            max_stack,
            max_locals,
            instructions: Vec::new(),
            handlers: Vec::new(),
            next_label: 0,
        }
    }

    pub fn new_label(&mut self) -> Label {
        let l = Label(self.next_label);
        self.next_label += 1;
        l
    }

    /// Decode a `Code` attribute payload.
    pub fn decode(data: &[u8], pool: &ConstantPool) -> Result<CodeBody> {
        let mut r = Reader::new(data);
        let max_stack = r.read_u2()?;
        let max_locals = r.read_u2()?;
        let code_len = r.read_u4()? as usize;
        let code = r.read_bytes(code_len)?.to_vec();

        let mut raw_handlers = Vec::new();
        let handler_count = r.read_u2()?;
        for _ in 0..handler_count {
            let start = r.read_u2()? as u32;
            let end = r.read_u2()? as u32;
            let handler = r.read_u2()? as u32;
            let catch_index = r.read_u2()?;
            let catch_type = if catch_index == 0 {
                None
            } else {
                Some(pool.class_name(catch_index)?.to_string())
            };
            raw_handlers.push((start, end, handler, catch_type));
        }
        // Code sub-attributes (StackMapTable and friends) are dropped here.

        let (boundaries, mut targets) = scan(&code)?;
        let mut end_only: HashSet<u32> = HashSet::new();
        for (start, end, handler, _) in &raw_handlers {
            targets.insert(*start);
            targets.insert(*handler);
            end_only.insert(*end);
        }

        // Label per target offset, in offset order. An exclusive handler end
        // may sit at code_len; everything else must hit a boundary.
        let mut sorted: Vec<u32> = targets.union(&end_only).copied().collect();
        sorted.sort_unstable();
        let mut label_at: HashMap<u32, Label> = HashMap::new();
        for (i, off) in sorted.iter().enumerate() {
            let valid = boundaries.contains(off)
                || (*off == code_len as u32 && !targets.contains(off));
            if !valid {
                return Err(ClassFileError::BadBranchTarget(*off));
            }
            label_at.insert(*off, Label(i as u32));
        }

        let instructions = build(&code, pool, &label_at)?;
        let mut body = CodeBody {
            max_stack,
            max_locals,
            instructions,
            handlers: Vec::new(),
            next_label: label_at.len() as u32,
        };
        for (start, end, handler, catch_type) in raw_handlers {
            body.handlers.push(ExceptionHandler {
                start: label_at[&start],
                end: label_at[&end],
                handler: label_at[&handler],
                catch_type,
            });
        }
        Ok(body)
    }

    /// Encode back to a `Code` attribute payload, interning referenced
    /// constants into `pool`.
    pub fn encode(&self, pool: &mut PoolBuilder) -> Result<Vec<u8>> {
        // Ldc widths depend on the interned index, so resolve those first.
        let mut ldc_index: HashMap<usize, u16> = HashMap::new();
        for (i, insn) in self.instructions.iter().enumerate() {
            if let Insn::Ldc(value) = insn {
                let idx = match value {
                    LdcValue::Int(v) => pool.integer(*v)?,
                    LdcValue::Float(v) => pool.float(*v)?,
                    LdcValue::Long(v) => pool.long(*v)?,
                    LdcValue::Double(v) => pool.double(*v)?,
                    LdcValue::Str(s) => pool.string(s)?,
                    LdcValue::Class(name) => pool.class(name)?,
                    LdcValue::Raw { index, .. } => *index,
                };
                ldc_index.insert(i, idx);
            }
        }

        // Layout loop: recompute offsets until no goto/jsr needs widening.
        let mut widened: HashSet<usize> = HashSet::new();
        let (offsets, label_offset, code_len) = loop {
            let (offsets, label_offset, code_len) =
                self.layout(&ldc_index, &widened)?;
            let mut grew = false;
            for (i, insn) in self.instructions.iter().enumerate() {
                if let Insn::Jump { opcode, target } = insn {
                    if matches!(*opcode, op::GOTO | op::JSR) && !widened.contains(&i) {
                        let from = offsets[i] as i64;
                        let to = *label_offset
                            .get(target)
                            .ok_or(ClassFileError::UnboundLabel(*target))?
                            as i64;
                        if !fits_i16(to - from) {
                            widened.insert(i);
                            grew = true;
                        }
                    }
                }
            }
            if !grew {
                break (offsets, label_offset, code_len);
            }
        };

        if code_len > u16::MAX as u32 {
            return Err(ClassFileError::CodeTooLarge);
        }

        let resolve = |label: &Label| -> Result<u32> {
            label_offset
                .get(label)
                .copied()
                .ok_or(ClassFileError::UnboundLabel(*label))
        };

        let mut code: Vec<u8> = Vec::with_capacity(code_len as usize);
        for (i, insn) in self.instructions.iter().enumerate() {
            let at = offsets[i];
            debug_assert_eq!(at as usize, code.len());
            match insn {
                Insn::Label(_) => {}
                Insn::Op(opcode) => code.put_u1(*opcode),
                Insn::Bipush(v) => {
                    code.put_u1(op::BIPUSH);
                    code.put_u1(*v as u8);
                }
                Insn::Sipush(v) => {
                    code.put_u1(op::SIPUSH);
                    code.put_u2(*v as u16);
                }
                Insn::Ldc(value) => {
                    let idx = ldc_index[&i];
                    if ldc_is_wide(value) {
                        code.put_u1(op::LDC2_W);
                        code.put_u2(idx);
                    } else if idx <= u8::MAX as u16 {
                        code.put_u1(op::LDC);
                        code.put_u1(idx as u8);
                    } else {
                        code.put_u1(op::LDC_W);
                        code.put_u2(idx);
                    }
                }
                Insn::Var { opcode, index } => emit_var(&mut code, *opcode, *index),
                Insn::Iinc { index, delta } => {
                    if *index <= u8::MAX as u16 && fits_i8(*delta) {
                        code.put_u1(op::IINC);
                        code.put_u1(*index as u8);
                        code.put_u1(*delta as i8 as u8);
                    } else {
                        code.put_u1(op::WIDE);
                        code.put_u1(op::IINC);
                        code.put_u2(*index);
                        code.put_u2(*delta as u16);
                    }
                }
                Insn::Jump { opcode, target } => {
                    let disp = resolve(target)? as i64 - at as i64;
                    if matches!(*opcode, op::GOTO | op::JSR) && widened.contains(&i) {
                        code.put_u1(if *opcode == op::GOTO {
                            op::GOTO_W
                        } else {
                            op::JSR_W
                        });
                        code.put_u4(disp as i32 as u32);
                    } else {
                        if !fits_i16(disp) {
                            return Err(ClassFileError::BranchOutOfRange(*target));
                        }
                        code.put_u1(*opcode);
                        code.put_u2(disp as i16 as u16);
                    }
                }
                Insn::TableSwitch {
                    default,
                    low,
                    targets,
                } => {
                    if targets.is_empty() {
                        return Err(ClassFileError::Malformed(
                            "tableswitch without targets".to_string(),
                        ));
                    }
                    code.put_u1(op::TABLESWITCH);
                    for _ in 0..switch_pad(at) {
                        code.put_u1(0);
                    }
                    code.put_u4((resolve(default)? as i64 - at as i64) as i32 as u32);
                    code.put_u4(*low as u32);
                    code.put_u4((*low + targets.len() as i32 - 1) as u32);
                    for t in targets {
                        code.put_u4((resolve(t)? as i64 - at as i64) as i32 as u32);
                    }
                }
                Insn::LookupSwitch { default, pairs } => {
                    code.put_u1(op::LOOKUPSWITCH);
                    for _ in 0..switch_pad(at) {
                        code.put_u1(0);
                    }
                    code.put_u4((resolve(default)? as i64 - at as i64) as i32 as u32);
                    code.put_u4(pairs.len() as u32);
                    for (key, t) in pairs {
                        code.put_u4(*key as u32);
                        code.put_u4((resolve(t)? as i64 - at as i64) as i32 as u32);
                    }
                }
                Insn::Field {
                    opcode,
                    owner,
                    name,
                    descriptor,
                } => {
                    code.put_u1(*opcode);
                    code.put_u2(pool.field_ref(owner, name, descriptor)?);
                }
                Insn::Invoke {
                    opcode,
                    owner,
                    name,
                    descriptor,
                    interface,
                } => {
                    let idx = if *interface {
                        pool.interface_method_ref(owner, name, descriptor)?
                    } else {
                        pool.method_ref(owner, name, descriptor)?
                    };
                    code.put_u1(*opcode);
                    code.put_u2(idx);
                    if *opcode == op::INVOKEINTERFACE {
                        let desc = MethodDescriptor::parse(descriptor)?;
                        code.put_u1((1 + desc.param_slots()) as u8);
                        code.put_u1(0);
                    }
                }
                Insn::InvokeDynamic { index } => {
                    code.put_u1(op::INVOKEDYNAMIC);
                    code.put_u2(*index);
                    code.put_u2(0);
                }
                Insn::TypeOp { opcode, name } => {
                    code.put_u1(*opcode);
                    code.put_u2(pool.class(name)?);
                }
                Insn::NewArray { atype } => {
                    code.put_u1(op::NEWARRAY);
                    code.put_u1(*atype);
                }
                Insn::MultiANewArray { descriptor, dims } => {
                    code.put_u1(op::MULTIANEWARRAY);
                    code.put_u2(pool.class(descriptor)?);
                    code.put_u1(*dims);
                }
            }
        }
        debug_assert_eq!(code.len(), code_len as usize);

        let mut out = Vec::with_capacity(code.len() + 64);
        out.put_u2(self.max_stack);
        out.put_u2(self.max_locals);
        out.put_u4(code.len() as u32);
        out.extend_from_slice(&code);
        out.put_u2(self.handlers.len() as u16);
        for h in &self.handlers {
            out.put_u2(resolve(&h.start)? as u16);
            out.put_u2(resolve(&h.end)? as u16);
            out.put_u2(resolve(&h.handler)? as u16);
            match &h.catch_type {
                Some(name) => out.put_u2(pool.class(name)?),
                None => out.put_u2(0),
            }
        }
        out.put_u2(0); // no sub-attributes
        Ok(out)
    }

    /// One forward pass: per-instruction start offsets, label bindings, and
    /// total code length given the current widening set. Consistent in a
    /// single pass because each width depends only on its own start offset.
    fn layout(
        &self,
        ldc_index: &HashMap<usize, u16>,
        widened: &HashSet<usize>,
    ) -> Result<(Vec<u32>, HashMap<Label, u32>, u32)> {
        let mut offsets = Vec::with_capacity(self.instructions.len());
        let mut label_offset: HashMap<Label, u32> = HashMap::new();
        let mut at: u32 = 0;
        for (i, insn) in self.instructions.iter().enumerate() {
            offsets.push(at);
            let width = match insn {
                Insn::Label(l) => {
                    label_offset.insert(*l, at);
                    0
                }
                Insn::Op(_) => 1,
                Insn::Bipush(_) => 2,
                Insn::Sipush(_) => 3,
                Insn::Ldc(value) => {
                    if ldc_is_wide(value) || ldc_index[&i] > u8::MAX as u16 {
                        3
                    } else {
                        2
                    }
                }
                Insn::Var { opcode, index } => var_width(*opcode, *index),
                Insn::Iinc { index, delta } => {
                    if *index <= u8::MAX as u16 && fits_i8(*delta) {
                        3
                    } else {
                        6
                    }
                }
                Insn::Jump { opcode, .. } => {
                    if matches!(*opcode, op::GOTO | op::JSR) && widened.contains(&i) {
                        5
                    } else {
                        3
                    }
                }
                Insn::TableSwitch { targets, .. } => {
                    1 + switch_pad(at) + 12 + 4 * targets.len() as u32
                }
                Insn::LookupSwitch { pairs, .. } => {
                    1 + switch_pad(at) + 8 + 8 * pairs.len() as u32
                }
                Insn::Field { .. } => 3,
                Insn::Invoke { opcode, .. } => {
                    if *opcode == op::INVOKEINTERFACE {
                        5
                    } else {
                        3
                    }
                }
                Insn::InvokeDynamic { .. } => 5,
                Insn::TypeOp { .. } => 3,
                Insn::NewArray { .. } => 2,
                Insn::MultiANewArray { .. } => 4,
            };
            at = at
                .checked_add(width)
                .ok_or(ClassFileError::CodeTooLarge)?;
        }
        Ok((offsets, label_offset, at))
    }
}

fn ldc_is_wide(value: &LdcValue) -> bool {
    matches!(
        value,
        LdcValue::Long(_) | LdcValue::Double(_) | LdcValue::Raw { wide: true, .. }
    )
}

fn fits_i16(v: i64) -> bool {
    (i16::MIN as i64..=i16::MAX as i64).contains(&v)
}

fn fits_i8(v: i16) -> bool {
    (i8::MIN as i16..=i8::MAX as i16).contains(&v)
}

/// Pad bytes after a switch opcode at `at`, aligning its operands to 4.
fn switch_pad(at: u32) -> u32 {
    (4 - ((at + 1) % 4)) % 4
}

fn has_short_form(opcode: u8) -> bool {
    (op::ILOAD..=op::ALOAD).contains(&opcode) || (op::ISTORE..=op::ASTORE).contains(&opcode)
}

fn var_width(opcode: u8, index: u16) -> u32 {
    if index <= 3 && has_short_form(opcode) {
        1
    } else if index <= u8::MAX as u16 {
        2
    } else {
        4 // wide form
    }
}

fn emit_var(code: &mut Vec<u8>, opcode: u8, index: u16) {
    if index <= 3 && has_short_form(opcode) {
        let base = if (op::ILOAD..=op::ALOAD).contains(&opcode) {
            op::ILOAD_0 + (opcode - op::ILOAD) * 4
        } else {
            op::ISTORE_0 + (opcode - op::ISTORE) * 4
        };
        code.put_u1(base + index as u8);
    } else if index <= u8::MAX as u16 {
        code.put_u1(opcode);
        code.put_u1(index as u8);
    } else {
        code.put_u1(op::WIDE);
        code.put_u1(opcode);
        code.put_u2(index);
    }
}

fn is_no_operand(opcode: u8) -> bool {
    matches!(opcode,
        op::NOP..=op::DCONST_1
        | 0x1a..=0x35 // load_n forms and array loads
        | 0x3b..=0x5f // store_n forms, array stores, stack ops
        | op::IADD..=op::LXOR
        | op::I2L..=op::DCMPG
        | op::IRETURN..=op::RETURN
        | op::ARRAYLENGTH
        | op::ATHROW
        | op::MONITORENTER
        | op::MONITOREXIT)
}

/// First decode pass: instruction boundary offsets and branch target offsets.
fn scan(code: &[u8]) -> Result<(HashSet<u32>, HashSet<u32>)> {
    let mut boundaries = HashSet::new();
    let mut targets = HashSet::new();
    let mut r = Reader::new(code);
    while r.remaining() > 0 {
        let at = r.pos() as u32;
        boundaries.insert(at);
        let opcode = r.read_u1()?;
        match opcode {
            _ if is_no_operand(opcode) => {}
            op::BIPUSH | op::LDC | op::NEWARRAY | op::RET => {
                r.skip(1)?;
            }
            op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE => {
                r.skip(1)?;
            }
            op::SIPUSH
            | op::LDC_W
            | op::LDC2_W
            | op::IINC
            | op::GETSTATIC..=op::INVOKESTATIC
            | op::NEW
            | op::ANEWARRAY
            | op::CHECKCAST
            | op::INSTANCEOF => {
                r.skip(2)?;
            }
            op::MULTIANEWARRAY => {
                r.skip(3)?;
            }
            op::INVOKEINTERFACE | op::INVOKEDYNAMIC => {
                r.skip(4)?;
            }
            op::IFEQ..=op::JSR | op::IFNULL | op::IFNONNULL => {
                let disp = r.read_i2()? as i64;
                targets.insert((at as i64 + disp) as u32);
            }
            op::GOTO_W | op::JSR_W => {
                let disp = r.read_i4()? as i64;
                targets.insert((at as i64 + disp) as u32);
            }
            op::TABLESWITCH => {
                r.skip(switch_pad(at) as usize)?;
                targets.insert((at as i64 + r.read_i4()? as i64) as u32);
                let low = r.read_i4()?;
                let high = r.read_i4()?;
                if high < low {
                    return Err(ClassFileError::Malformed(format!(
                        "tableswitch range {low}..{high}"
                    )));
                }
                for _ in low..=high {
                    targets.insert((at as i64 + r.read_i4()? as i64) as u32);
                }
            }
            op::LOOKUPSWITCH => {
                r.skip(switch_pad(at) as usize)?;
                targets.insert((at as i64 + r.read_i4()? as i64) as u32);
                let npairs = r.read_i4()?;
                if npairs < 0 {
                    return Err(ClassFileError::Malformed(format!(
                        "lookupswitch npairs {npairs}"
                    )));
                }
                for _ in 0..npairs {
                    r.skip(8)?;
                }
            }
            op::WIDE => {
                let sub = r.read_u1()?;
                if sub == op::IINC {
                    r.skip(4)?;
                } else {
                    r.skip(2)?;
                }
            }
            _ => {
                return Err(ClassFileError::UnknownOpcode {
                    opcode,
                    offset: at,
                })
            }
        }
    }
    Ok((boundaries, targets))
}

/// Second decode pass: build the instruction list, inserting labels.
fn build(
    code: &[u8],
    pool: &ConstantPool,
    label_at: &HashMap<u32, Label>,
) -> Result<Vec<Insn>> {
    let mut insns = Vec::new();
    let mut r = Reader::new(code);
    while r.remaining() > 0 {
        let at = r.pos() as u32;
        if let Some(label) = label_at.get(&at) {
            insns.push(Insn::Label(*label));
        }
        let opcode = r.read_u1()?;
        let insn = match opcode {
            _ if is_no_operand(opcode) && !(0x1a..=0x2d).contains(&opcode)
                && !(0x3b..=0x4e).contains(&opcode) =>
            {
                Insn::Op(opcode)
            }
            // load_n / store_n forms normalize to Var
            0x1a..=0x2d => Insn::Var {
                opcode: op::ILOAD + (opcode - 0x1a) / 4,
                index: ((opcode - 0x1a) % 4) as u16,
            },
            0x3b..=0x4e => Insn::Var {
                opcode: op::ISTORE + (opcode - 0x3b) / 4,
                index: ((opcode - 0x3b) % 4) as u16,
            },
            op::BIPUSH => Insn::Bipush(r.read_i1()?),
            op::SIPUSH => Insn::Sipush(r.read_i2()?),
            op::LDC => {
                let index = r.read_u1()? as u16;
                Insn::Ldc(ldc_value(pool, index, false)?)
            }
            op::LDC_W => {
                let index = r.read_u2()?;
                Insn::Ldc(ldc_value(pool, index, false)?)
            }
            op::LDC2_W => {
                let index = r.read_u2()?;
                Insn::Ldc(ldc_value(pool, index, true)?)
            }
            op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => Insn::Var {
                opcode,
                index: r.read_u1()? as u16,
            },
            op::IINC => Insn::Iinc {
                index: r.read_u1()? as u16,
                delta: r.read_i1()? as i16,
            },
            op::WIDE => {
                let sub = r.read_u1()?;
                match sub {
                    op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => Insn::Var {
                        opcode: sub,
                        index: r.read_u2()?,
                    },
                    op::IINC => Insn::Iinc {
                        index: r.read_u2()?,
                        delta: r.read_i2()?,
                    },
                    _ => {
                        return Err(ClassFileError::Malformed(format!(
                            "wide prefix on opcode {sub:#04x}"
                        )))
                    }
                }
            }
            op::IFEQ..=op::JSR | op::IFNULL | op::IFNONNULL => {
                let disp = r.read_i2()? as i64;
                Insn::Jump {
                    opcode,
                    target: label_at[&((at as i64 + disp) as u32)],
                }
            }
            op::GOTO_W | op::JSR_W => {
                let disp = r.read_i4()? as i64;
                Insn::Jump {
                    // Normalized; encode re-widens when the displacement needs it.
                    opcode: if opcode == op::GOTO_W { op::GOTO } else { op::JSR },
                    target: label_at[&((at as i64 + disp) as u32)],
                }
            }
            op::TABLESWITCH => {
                r.skip(switch_pad(at) as usize)?;
                let default = label_at[&((at as i64 + r.read_i4()? as i64) as u32)];
                let low = r.read_i4()?;
                let high = r.read_i4()?;
                let mut switch_targets =
                    Vec::with_capacity((high as i64 - low as i64 + 1) as usize);
                for _ in low..=high {
                    switch_targets.push(label_at[&((at as i64 + r.read_i4()? as i64) as u32)]);
                }
                Insn::TableSwitch {
                    default,
                    low,
                    targets: switch_targets,
                }
            }
            op::LOOKUPSWITCH => {
                r.skip(switch_pad(at) as usize)?;
                let default = label_at[&((at as i64 + r.read_i4()? as i64) as u32)];
                let npairs = r.read_i4()?;
                let mut pairs = Vec::with_capacity(npairs as usize);
                for _ in 0..npairs {
                    let key = r.read_i4()?;
                    let target = label_at[&((at as i64 + r.read_i4()? as i64) as u32)];
                    pairs.push((key, target));
                }
                Insn::LookupSwitch { default, pairs }
            }
            op::GETSTATIC..=op::PUTFIELD => {
                let (owner, name, descriptor) = pool.member_ref(r.read_u2()?)?;
                Insn::Field {
                    opcode,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            op::INVOKEVIRTUAL..=op::INVOKEINTERFACE => {
                let index = r.read_u2()?;
                if opcode == op::INVOKEINTERFACE {
                    r.skip(2)?; // count + zero, recomputed at encode
                }
                let interface = matches!(
                    pool.get(index)?,
                    Constant::InterfaceMethodRef { .. }
                );
                let (owner, name, descriptor) = pool.member_ref(index)?;
                Insn::Invoke {
                    opcode,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    interface,
                }
            }
            op::INVOKEDYNAMIC => {
                let index = r.read_u2()?;
                r.skip(2)?;
                Insn::InvokeDynamic { index }
            }
            op::NEW | op::ANEWARRAY | op::CHECKCAST | op::INSTANCEOF => Insn::TypeOp {
                opcode,
                name: pool.class_name(r.read_u2()?)?.to_string(),
            },
            op::NEWARRAY => Insn::NewArray {
                atype: r.read_u1()?,
            },
            op::MULTIANEWARRAY => {
                let descriptor = pool.class_name(r.read_u2()?)?.to_string();
                Insn::MultiANewArray {
                    descriptor,
                    dims: r.read_u1()?,
                }
            }
            _ => {
                return Err(ClassFileError::UnknownOpcode {
                    opcode,
                    offset: at,
                })
            }
        };
        insns.push(insn);
    }
    // An exclusive handler end may label the position just past the last
    // instruction.
    if let Some(label) = label_at.get(&(code.len() as u32)) {
        insns.push(Insn::Label(*label));
    }
    Ok(insns)
}

fn ldc_value(pool: &ConstantPool, index: u16, wide: bool) -> Result<LdcValue> {
    Ok(match pool.get(index)? {
        Constant::Integer(v) if !wide => LdcValue::Int(*v),
        Constant::Float(v) if !wide => LdcValue::Float(*v),
        Constant::Long(v) if wide => LdcValue::Long(*v),
        Constant::Double(v) if wide => LdcValue::Double(*v),
        Constant::Str { utf8 } if !wide => LdcValue::Str(pool.utf8(*utf8)?.to_string()),
        Constant::Class { name } if !wide => LdcValue::Class(pool.utf8(*name)?.to_string()),
        _ => LdcValue::Raw { index, wide },
    })
}
