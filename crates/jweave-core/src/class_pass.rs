//! Class-level rewriting: one unit through match, mixin, and method passes.
//!
//! The pass screens on a cheap [`ClassSummary`] first and only pays for a
//! full parse once something is known to apply. Everything it adds is
//! append-only with respect to the original members, so method indices
//! collected up front stay valid throughout.

use std::collections::HashSet;

use jweave_classfile::{
    flags, opcodes as op, ClassFile, ClassSummary, CodeBody, FieldInfo, Insn, MethodBody,
    MethodDescriptor, MethodInfo, MethodShape,
};
use tracing::warn;

use crate::catalog::{Advice, Catalog, Mixin};
use crate::error::Result;
use crate::hierarchy::TypeHierarchy;
use crate::matcher::ClassMatches;
use crate::method_pass::{
    find_ctor_splice, load_op, return_op, weave_method, Splice, UnitContext,
};
use crate::runtime;
use crate::stats::WeaveStats;

/// Rewrites one class against the catalog. `Ok(None)` means the bytes are
/// to be used as-is; errors are for the fail-open boundary above to log.
pub(crate) fn rewrite_class(
    catalog: &Catalog,
    hierarchy: &TypeHierarchy,
    stats: &WeaveStats,
    bytes: &[u8],
) -> Result<Option<Vec<u8>>> {
    if catalog.is_empty() {
        return Ok(None);
    }
    let summary = ClassSummary::parse(bytes)?;
    if summary.access_flags & flags::ACC_MODULE != 0 || summary.is_interface() {
        return Ok(None);
    }
    let summary = hierarchy.register(summary);
    let chain = hierarchy.resolve(&summary.name)?;
    let matches = ClassMatches::compute(catalog, &summary.name, &chain);
    for ancestor in &matches.missing {
        warn!(
            class = %summary.name,
            ancestor = %ancestor,
            "unresolvable ancestor; matching may be incomplete"
        );
        stats.record_missing_ancestor();
    }
    if matches.is_empty() {
        return Ok(None);
    }

    let weavable = |access: u16, name: &str| {
        name != "<clinit>" && access & flags::ACC_SYNTHETIC == 0 && !flags::is_bodyless(access)
    };
    let any_method_hit = summary.methods.iter().any(|shape| {
        weavable(shape.access_flags, &shape.name)
            && !matches
                .method_matches(shape.access_flags, &shape.name, &shape.descriptor)
                .is_empty()
    });
    if !any_method_hit && matches.mixins().is_empty() {
        return Ok(None);
    }

    let mut class = ClassFile::parse(bytes)?;
    let ctx = UnitContext {
        class_name: class.name.clone(),
        super_name: class.super_name.clone(),
    };

    let mut worklist: Vec<(usize, Vec<(usize, &Advice)>)> = Vec::new();
    for (index, method) in class.methods.iter().enumerate() {
        if !weavable(method.access_flags, &method.name) || method.body.is_none() {
            continue;
        }
        let hits = matches.method_matches(method.access_flags, &method.name, &method.descriptor);
        if hits.is_empty() {
            continue;
        }
        worklist.push((
            index,
            hits.iter().map(|m| (m.advice_index, m.advice)).collect(),
        ));
    }

    let mut modified = false;

    let mut guard_indices: Vec<usize> = worklist
        .iter()
        .flat_map(|(_, hits)| hits.iter())
        .filter(|(_, advice)| advice.suppresses_nested())
        .map(|(advice_index, _)| *advice_index)
        .collect();
    guard_indices.sort_unstable();
    guard_indices.dedup();
    if ensure_guard_fields(&mut class, &guard_indices)? {
        modified = true;
    }

    for &(mixin_index, mixin) in matches.mixins() {
        if inject_mixin(&mut class, mixin_index, mixin, hierarchy)? {
            stats.record_mixin_injected();
            modified = true;
        }
    }

    for (index, hits) in &worklist {
        if weave_method(&mut class, *index, hits, &ctx)? {
            stats.record_method_woven();
            modified = true;
        }
    }

    if !modified {
        return Ok(None);
    }
    Ok(Some(class.emit()?))
}

/// One static guard field per suppressing advice, created in `<clinit>`.
/// Fields that already exist are left alone, which keeps a second pass over
/// already-woven bytes from doubling them.
fn ensure_guard_fields(class: &mut ClassFile, indices: &[usize]) -> Result<bool> {
    if indices.is_empty() {
        return Ok(false);
    }
    let owner = class.name.clone();
    let mut init: Vec<Insn> = Vec::new();
    for &advice_index in indices {
        let name = runtime::guard_field_name(advice_index);
        if class.fields.iter().any(|f| f.name == name) {
            continue;
        }
        class.fields.push(FieldInfo {
            access_flags: flags::ACC_PRIVATE
                | flags::ACC_STATIC
                | flags::ACC_FINAL
                | flags::ACC_SYNTHETIC,
            name: name.clone(),
            descriptor: runtime::FLOW_GUARD_DESC.to_string(),
            attributes: Vec::new(),
        });
        init.push(Insn::Invoke {
            opcode: op::INVOKESTATIC,
            owner: runtime::FLOW_GUARD.to_string(),
            name: runtime::GUARD_CREATE.0.to_string(),
            descriptor: runtime::GUARD_CREATE.1.to_string(),
            interface: false,
        });
        init.push(Insn::Field {
            opcode: op::PUTSTATIC,
            owner: owner.clone(),
            name,
            descriptor: runtime::FLOW_GUARD_DESC.to_string(),
        });
    }
    if init.is_empty() {
        return Ok(false);
    }
    prepend_clinit(class, init)?;
    Ok(true)
}

fn prepend_clinit(class: &mut ClassFile, mut init: Vec<Insn>) -> Result<()> {
    if let Some(index) = class.methods.iter().position(|m| m.name == "<clinit>") {
        let body = class.decode_method_body(index)?;
        init.append(&mut body.instructions);
        body.instructions = init;
        body.max_stack = body.max_stack.max(1);
    } else {
        let mut code = CodeBody::new(1, 0);
        code.instructions = init;
        code.instructions.push(Insn::Op(op::RETURN));
        class.methods.push(MethodInfo {
            access_flags: flags::ACC_STATIC,
            name: "<clinit>".to_string(),
            descriptor: "()V".to_string(),
            body: Some(MethodBody::Decoded(code)),
            attributes: Vec::new(),
        });
    }
    Ok(())
}

/// Grafts one capability onto the class: the interface itself, a hidden
/// field holding a fresh implementation instance, and a delegator for every
/// abstract method the interface chain declares that the class does not.
fn inject_mixin(
    class: &mut ClassFile,
    mixin_index: usize,
    mixin: &Mixin,
    hierarchy: &TypeHierarchy,
) -> Result<bool> {
    if class.interfaces.iter().any(|i| i == &mixin.interface_name) {
        return Ok(false);
    }
    let field_name = runtime::mixin_field_name(mixin_index);
    if class.fields.iter().any(|f| f.name == field_name) {
        return Ok(false);
    }

    let iface_chain = match hierarchy.resolve(&mixin.interface_name) {
        Ok(chain) => chain,
        Err(e) => {
            warn!(mixin = %mixin.label, interface = %mixin.interface_name, error = %e, "mixin skipped");
            return Ok(false);
        }
    };
    let Some(iface_summary) = iface_chain[0].summary() else {
        warn!(
            mixin = %mixin.label,
            interface = %mixin.interface_name,
            "capability interface unavailable in this scope; mixin skipped"
        );
        return Ok(false);
    };
    if !iface_summary.is_interface() {
        warn!(
            mixin = %mixin.label,
            interface = %mixin.interface_name,
            "mixin target is not an interface; skipped"
        );
        return Ok(false);
    }

    let field_desc = format!("L{};", mixin.interface_name);
    class.interfaces.push(mixin.interface_name.clone());
    class.fields.push(FieldInfo {
        access_flags: flags::ACC_PRIVATE | flags::ACC_TRANSIENT | flags::ACC_SYNTHETIC,
        name: field_name.clone(),
        descriptor: field_desc.clone(),
        attributes: Vec::new(),
    });

    let class_name = class.name.clone();
    let super_name = class.super_name.clone();
    let ctor_indices: Vec<usize> = class
        .methods
        .iter()
        .enumerate()
        .filter(|(_, m)| m.name == "<init>" && m.body.is_some())
        .map(|(i, _)| i)
        .collect();
    for index in ctor_indices {
        let body = class.decode_method_body(index)?;
        let at = match find_ctor_splice(&body.instructions, &class_name, super_name.as_deref()) {
            Splice::After(at) => at,
            // delegating ctors reach a super-calling one eventually
            Splice::Delegating | Splice::NotFound => continue,
        };
        let init = [
            Insn::Var {
                opcode: op::ALOAD,
                index: 0,
            },
            Insn::TypeOp {
                opcode: op::NEW,
                name: mixin.impl_class.clone(),
            },
            Insn::Op(op::DUP),
            Insn::Invoke {
                opcode: op::INVOKESPECIAL,
                owner: mixin.impl_class.clone(),
                name: "<init>".to_string(),
                descriptor: "()V".to_string(),
                interface: false,
            },
            Insn::Field {
                opcode: op::PUTFIELD,
                owner: class_name.clone(),
                name: field_name.clone(),
                descriptor: field_desc.clone(),
            },
        ];
        body.instructions.splice(at..at, init);
        body.max_stack = body.max_stack.max(3);
    }

    let mut declared: HashSet<(String, String)> = class
        .methods
        .iter()
        .map(|m| (m.name.clone(), m.descriptor.clone()))
        .collect();
    for entry in iface_chain.iter() {
        let Some(summary) = entry.summary() else {
            continue;
        };
        if !summary.is_interface() {
            continue;
        }
        for shape in &summary.methods {
            if shape.access_flags & flags::ACC_STATIC != 0 {
                continue;
            }
            // default methods are inherited, not delegated
            if !flags::is_bodyless(shape.access_flags) {
                continue;
            }
            let key = (shape.name.clone(), shape.descriptor.clone());
            if declared.contains(&key) {
                continue;
            }
            declared.insert(key);
            let delegator = build_delegator(
                &class_name,
                &field_name,
                &field_desc,
                &mixin.interface_name,
                shape,
            )?;
            class.methods.push(delegator);
        }
    }

    Ok(true)
}

fn build_delegator(
    class_name: &str,
    field_name: &str,
    field_desc: &str,
    interface_name: &str,
    shape: &MethodShape,
) -> Result<MethodInfo> {
    let parsed = MethodDescriptor::parse(&shape.descriptor)?;
    let mut args_width: u16 = 1;
    for param in &parsed.params {
        args_width += param.width();
    }
    let ret_width = parsed.ret.as_ref().map(|t| t.width()).unwrap_or(0);

    let mut code = CodeBody::new(args_width.max(ret_width).max(1), args_width);
    code.instructions.push(Insn::Var {
        opcode: op::ALOAD,
        index: 0,
    });
    code.instructions.push(Insn::Field {
        opcode: op::GETFIELD,
        owner: class_name.to_string(),
        name: field_name.to_string(),
        descriptor: field_desc.to_string(),
    });
    let mut slot = 1u16;
    for param in &parsed.params {
        code.instructions.push(Insn::Var {
            opcode: load_op(param),
            index: slot,
        });
        slot += param.width();
    }
    code.instructions.push(Insn::Invoke {
        opcode: op::INVOKEINTERFACE,
        owner: interface_name.to_string(),
        name: shape.name.clone(),
        descriptor: shape.descriptor.clone(),
        interface: true,
    });
    match &parsed.ret {
        None => code.instructions.push(Insn::Op(op::RETURN)),
        Some(ty) => code.instructions.push(Insn::Op(return_op(ty))),
    }
    Ok(MethodInfo {
        access_flags: flags::ACC_PUBLIC | flags::ACC_SYNTHETIC,
        name: shape.name.clone(),
        descriptor: shape.descriptor.clone(),
        body: Some(MethodBody::Decoded(code)),
        attributes: Vec::new(),
    })
}
