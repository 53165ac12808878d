//! Per-method rewriting: hook injection around one decoded code body.
//!
//! The transform keeps the original instruction stream intact and brackets
//! it. An entry sequence (guard enter, enablement check, before hook) runs
//! ahead of the original first instruction; every return is redirected to a
//! shared exit sequence (return/after hooks, guard restore); a catch-all
//! handler appended behind the original table rethrows after running the
//! throw-path hooks. Hook calls sit inside their own tiny handler so a
//! faulting hook can never alter target behavior.
//!
//! Two advices carrying timer labels on the same method force a dispatch
//! split: the original body moves to a synthetic inner method and the
//! public name becomes a forwarding wrapper, so each timer measures its own
//! frame.

use std::collections::BTreeMap;

use jweave_classfile::{
    flags, iconst, opcodes as op, ClassFile, CodeBody, ExceptionHandler, FieldType, Insn,
    LdcValue, MethodBody, MethodDescriptor, MethodInfo,
};
use tracing::{debug, error, warn};

use crate::catalog::{Advice, Binding, HookRef, HookSlot};
use crate::error::Result;
use crate::runtime;

/// Identity of the unit being rewritten, owned so the pass can hold the
/// class file mutably at the same time.
pub(crate) struct UnitContext {
    pub class_name: String,
    pub super_name: Option<String>,
}

/// Weaves every matched advice into the method at `index`. Returns whether
/// the method (or the class, via a dispatch split) was modified.
pub(crate) fn weave_method(
    class: &mut ClassFile,
    index: usize,
    matched: &[(usize, &Advice)],
    ctx: &UnitContext,
) -> Result<bool> {
    if matched.is_empty() {
        return Ok(false);
    }
    let timer_positions: Vec<usize> = matched
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.1.timer_label.is_some())
        .map(|(i, _)| i)
        .collect();
    if timer_positions.len() < 2 {
        return weave_single_group(class, index, matched, ctx, None);
    }
    let method_name = class.methods[index].name.clone();
    if method_name == "<init>" || method_name == "<clinit>" {
        warn!(
            method = %method_name,
            "timed dispatch split does not apply to initializers; weaving without a split"
        );
        return weave_single_group(class, index, matched, ctx, None);
    }
    weave_split(class, index, matched, timer_positions[1], ctx)
}

/// Moves the original body into `name$jw$inner` and turns the public method
/// into a wrapper. Advices before the second timer stay on the wrapper; the
/// rest weave into the inner method. A method carries at most two timers.
fn weave_split(
    class: &mut ClassFile,
    index: usize,
    matched: &[(usize, &Advice)],
    split_at: usize,
    ctx: &UnitContext,
) -> Result<bool> {
    let (orig_name, descriptor, access) = {
        let method = &class.methods[index];
        if method.body.is_none() || flags::is_bodyless(method.access_flags) {
            return Ok(false);
        }
        (
            method.name.clone(),
            method.descriptor.clone(),
            method.access_flags,
        )
    };
    let is_static = access & flags::ACC_STATIC != 0;

    let outer_group: Vec<(usize, &Advice)> = matched[..split_at].to_vec();
    let mut inner_group: Vec<(usize, &Advice)> = Vec::new();
    for (pos, entry) in matched.iter().enumerate().skip(split_at) {
        if pos != split_at && entry.1.timer_label.is_some() {
            error!(
                advice = %entry.1.label,
                method = %orig_name,
                "more than two timed advices on one method; skipping"
            );
            continue;
        }
        inner_group.push(*entry);
    }

    class.decode_method_body(index)?;
    let moved = class.methods[index].body.take();
    let parsed = MethodDescriptor::parse(&descriptor)?;
    let inner_name = runtime::inner_method_name(&orig_name);
    let wrapper = build_wrapper(&ctx.class_name, &inner_name, &descriptor, &parsed, is_static);
    class.methods[index].body = Some(MethodBody::Decoded(wrapper));
    class.methods.push(MethodInfo {
        access_flags: flags::ACC_PRIVATE | flags::ACC_SYNTHETIC | (access & flags::ACC_STATIC),
        name: inner_name,
        descriptor,
        body: moved,
        attributes: Vec::new(),
    });
    let inner_index = class.methods.len() - 1;

    // Hooks on the inner half still report the public method name.
    weave_single_group(class, inner_index, &inner_group, ctx, Some(&orig_name))?;
    weave_single_group(class, index, &outer_group, ctx, None)?;
    Ok(true)
}

fn build_wrapper(
    class_name: &str,
    inner_name: &str,
    descriptor: &str,
    parsed: &MethodDescriptor,
    is_static: bool,
) -> CodeBody {
    let mut args_width: u16 = if is_static { 0 } else { 1 };
    for param in &parsed.params {
        args_width += param.width();
    }
    let ret_width = parsed.ret.as_ref().map(|t| t.width()).unwrap_or(0);

    let mut code = CodeBody::new(args_width.max(ret_width).max(1), args_width);
    if !is_static {
        code.instructions.push(Insn::Var {
            opcode: op::ALOAD,
            index: 0,
        });
    }
    let mut slot = if is_static { 0u16 } else { 1u16 };
    for param in &parsed.params {
        code.instructions.push(Insn::Var {
            opcode: load_op(param),
            index: slot,
        });
        slot += param.width();
    }
    code.instructions.push(Insn::Invoke {
        opcode: if is_static {
            op::INVOKESTATIC
        } else {
            op::INVOKESPECIAL
        },
        owner: class_name.to_string(),
        name: inner_name.to_string(),
        descriptor: descriptor.to_string(),
        interface: false,
    });
    match &parsed.ret {
        None => code.instructions.push(Insn::Op(op::RETURN)),
        Some(ty) => code.instructions.push(Insn::Op(return_op(ty))),
    }
    code
}

/// How an injected call site fills one hook formal.
enum Bound {
    /// `aconst_null`; receiver binding on a static target.
    Null,
    This,
    Param {
        index: u16,
        boxing: Option<(&'static str, &'static str)>,
    },
    Name,
    Return {
        boxing: Option<(&'static str, &'static str)>,
    },
    Thrown,
    Traveler,
}

struct HookPlan<'c> {
    owner: &'c str,
    name: &'c str,
    descriptor: &'c str,
    args: Vec<Bound>,
    stack_need: u16,
}

struct AdvicePlan<'c> {
    advice_index: usize,
    suppresses: bool,
    has_traveler: bool,
    enabled: Option<HookPlan<'c>>,
    before: Option<HookPlan<'c>>,
    on_return: Option<HookPlan<'c>>,
    on_throw: Option<HookPlan<'c>>,
    on_after: Option<HookPlan<'c>>,
    enabled_slot: u16,
    prior_slot: u16,
    traveler_slot: u16,
}

impl<'c> AdvicePlan<'c> {
    fn hook_plans(&self) -> impl Iterator<Item = &HookPlan<'c>> {
        [
            &self.enabled,
            &self.before,
            &self.on_return,
            &self.on_throw,
            &self.on_after,
        ]
        .into_iter()
        .flatten()
    }

    fn is_inert(&self) -> bool {
        self.hook_plans().next().is_none()
    }
}

struct TargetShape<'a> {
    is_static: bool,
    params: &'a [FieldType],
    ret: &'a Option<FieldType>,
}

struct Env<'a> {
    params: &'a [FieldType],
    param_slots: &'a [u16],
    /// Parameter index to entry-captured scratch slot, for exit-side reads.
    captured: &'a BTreeMap<u16, u16>,
    bound_name: &'a str,
    ret: &'a Option<FieldType>,
    ret_slot: u16,
    thr_slot: u16,
}

enum Outcome {
    Discard,
    StoreEnabled,
    StoreTraveler,
}

struct SlotAlloc {
    next: u16,
}

impl SlotAlloc {
    fn take(&mut self, width: u16) -> u16 {
        let slot = self.next;
        self.next += width;
        slot
    }
}

pub(crate) enum Splice {
    After(usize),
    Delegating,
    NotFound,
}

/// A constructor body is entered before `this` exists; injection must land
/// behind the superclass call. `this(...)` delegation is left alone so a
/// constructor chain fires its hooks exactly once.
pub(crate) fn find_ctor_splice(
    instructions: &[Insn],
    class_name: &str,
    super_name: Option<&str>,
) -> Splice {
    for (i, insn) in instructions.iter().enumerate() {
        if let Insn::Invoke {
            opcode, owner, name, ..
        } = insn
        {
            if *opcode == op::INVOKESPECIAL && name == "<init>" {
                if owner == class_name {
                    return Splice::Delegating;
                }
                if Some(owner.as_str()) == super_name {
                    return Splice::After(i + 1);
                }
            }
        }
    }
    Splice::NotFound
}

fn weave_single_group(
    class: &mut ClassFile,
    index: usize,
    matched: &[(usize, &Advice)],
    ctx: &UnitContext,
    name_override: Option<&str>,
) -> Result<bool> {
    if matched.is_empty() {
        return Ok(false);
    }
    let (method_name, descriptor, access) = {
        let method = &class.methods[index];
        if method.body.is_none() || flags::is_bodyless(method.access_flags) {
            return Ok(false);
        }
        (
            method.name.clone(),
            method.descriptor.clone(),
            method.access_flags,
        )
    };
    let is_static = access & flags::ACC_STATIC != 0;
    let parsed = MethodDescriptor::parse(&descriptor)?;
    let bound_name = name_override.unwrap_or(&method_name);
    let target = TargetShape {
        is_static,
        params: &parsed.params,
        ret: &parsed.ret,
    };

    let mut plans: Vec<AdvicePlan<'_>> = Vec::new();
    for &(advice_index, advice) in matched {
        let plan = AdvicePlan {
            advice_index,
            suppresses: advice.suppresses_nested(),
            has_traveler: advice.traveler_type.is_some(),
            enabled: resolve_slot(
                advice.enabled_check.as_ref(),
                HookSlot::EnabledCheck,
                &target,
                &advice.label,
                &method_name,
            ),
            before: resolve_slot(
                advice.on_before.as_ref(),
                HookSlot::OnBefore,
                &target,
                &advice.label,
                &method_name,
            ),
            on_return: resolve_slot(
                advice.on_return.as_ref(),
                HookSlot::OnReturn,
                &target,
                &advice.label,
                &method_name,
            ),
            on_throw: resolve_slot(
                advice.on_throw.as_ref(),
                HookSlot::OnThrow,
                &target,
                &advice.label,
                &method_name,
            ),
            on_after: resolve_slot(
                advice.on_after.as_ref(),
                HookSlot::OnAfter,
                &target,
                &advice.label,
                &method_name,
            ),
            enabled_slot: 0,
            prior_slot: 0,
            traveler_slot: 0,
        };
        // An advice whose hooks all failed to bind still enters and
        // restores its guard so outer frames keep suppressing inner ones.
        if plan.is_inert() && !plan.suppresses {
            continue;
        }
        plans.push(plan);
    }
    if plans.is_empty() {
        return Ok(false);
    }

    let needs_exit = plans.iter().any(|p| {
        p.suppresses || p.on_return.is_some() || p.on_throw.is_some() || p.on_after.is_some()
    });
    let needs_catch = plans
        .iter()
        .any(|p| p.suppresses || p.on_throw.is_some() || p.on_after.is_some());

    // Parameters read on the exit paths are snapshotted at entry; the body
    // is free to reuse its argument slots.
    let mut captured: BTreeMap<u16, u16> = BTreeMap::new();
    for plan in &plans {
        for hook_plan in [&plan.on_return, &plan.on_throw, &plan.on_after]
            .into_iter()
            .flatten()
        {
            for bound in &hook_plan.args {
                if let Bound::Param { index, .. } = bound {
                    captured.insert(*index, 0);
                }
            }
        }
    }

    let is_ctor = method_name == "<init>";
    let body = class.decode_method_body(index)?;

    let splice = if is_ctor {
        match find_ctor_splice(&body.instructions, &ctx.class_name, ctx.super_name.as_deref()) {
            Splice::After(i) => i,
            Splice::Delegating => {
                debug!(method = %method_name, "delegating constructor left unwoven");
                return Ok(false);
            }
            Splice::NotFound => {
                warn!(method = %method_name, "no superclass call found; constructor left unwoven");
                return Ok(false);
            }
        }
    } else {
        0
    };

    let mut alloc = SlotAlloc {
        next: body.max_locals,
    };
    let ret_width = parsed.ret.as_ref().map(|t| t.width()).unwrap_or(0);
    let ret_slot = if needs_exit && ret_width > 0 {
        alloc.take(ret_width)
    } else {
        0
    };
    let thr_slot = if needs_catch { alloc.take(1) } else { 0 };
    for plan in &mut plans {
        plan.enabled_slot = alloc.take(1);
        if plan.suppresses {
            plan.prior_slot = alloc.take(1);
        }
        if plan.has_traveler {
            plan.traveler_slot = alloc.take(1);
        }
    }
    let widths: Vec<u16> = parsed.params.iter().map(|p| p.width()).collect();
    for (&param_index, slot) in captured.iter_mut() {
        *slot = alloc.take(widths[param_index as usize]);
    }

    let mut param_slots = Vec::with_capacity(parsed.params.len());
    let mut next_slot = if is_static { 0u16 } else { 1u16 };
    for param in &parsed.params {
        param_slots.push(next_slot);
        next_slot += param.width();
    }

    let env = Env {
        params: &parsed.params,
        param_slots: &param_slots,
        captured: &captured,
        bound_name,
        ret: &parsed.ret,
        ret_slot,
        thr_slot,
    };

    let mut entry: Vec<Insn> = Vec::new();
    for (&param_index, &slot) in captured.iter() {
        let ty = &parsed.params[param_index as usize];
        entry.push(Insn::Var {
            opcode: load_op(ty),
            index: param_slots[param_index as usize],
        });
        entry.push(Insn::Var {
            opcode: store_op(ty),
            index: slot,
        });
    }
    for plan in &plans {
        if plan.has_traveler {
            entry.push(Insn::Op(op::ACONST_NULL));
            entry.push(Insn::Var {
                opcode: op::ASTORE,
                index: plan.traveler_slot,
            });
        }
        if plan.suppresses {
            push_guard_load(&mut entry, &ctx.class_name, plan.advice_index);
            entry.push(Insn::Invoke {
                opcode: op::INVOKEVIRTUAL,
                owner: runtime::FLOW_GUARD.to_string(),
                name: runtime::GUARD_ENTER.0.to_string(),
                descriptor: runtime::GUARD_ENTER.1.to_string(),
                interface: false,
            });
            entry.push(Insn::Op(op::DUP));
            entry.push(Insn::Var {
                opcode: op::ISTORE,
                index: plan.prior_slot,
            });
            entry.push(Insn::Var {
                opcode: op::ISTORE,
                index: plan.enabled_slot,
            });
        } else {
            entry.push(iconst(1));
            entry.push(Insn::Var {
                opcode: op::ISTORE,
                index: plan.enabled_slot,
            });
        }
        if let Some(hook_plan) = &plan.enabled {
            emit_guarded(&mut entry, body, hook_plan, plan, &env, false, Outcome::StoreEnabled);
        }
        if let Some(hook_plan) = &plan.before {
            let outcome = if plan.has_traveler {
                Outcome::StoreTraveler
            } else {
                Outcome::Discard
            };
            emit_guarded(&mut entry, body, hook_plan, plan, &env, false, outcome);
        }
    }

    let exit = if needs_exit {
        Some(body.new_label())
    } else {
        None
    };
    let body_start = if needs_catch {
        Some(body.new_label())
    } else {
        None
    };
    let body_end = if needs_catch {
        Some(body.new_label())
    } else {
        None
    };
    let catch_at = if needs_catch {
        Some(body.new_label())
    } else {
        None
    };

    let original = std::mem::take(&mut body.instructions);
    let mut out: Vec<Insn> = Vec::with_capacity(original.len() + entry.len() + 32);
    let mut rest = original.into_iter();
    for _ in 0..splice {
        if let Some(insn) = rest.next() {
            out.push(insn);
        }
    }
    out.append(&mut entry);
    if let Some(label) = body_start {
        out.push(Insn::Label(label));
    }
    for insn in rest {
        match insn {
            Insn::Op(opcode) if needs_exit && op::is_return(opcode) => {
                if let Some(ty) = &parsed.ret {
                    out.push(Insn::Var {
                        opcode: store_op(ty),
                        index: ret_slot,
                    });
                }
                if let Some(label) = exit {
                    out.push(Insn::Jump {
                        opcode: op::GOTO,
                        target: label,
                    });
                }
            }
            other => out.push(other),
        }
    }
    if let Some(label) = body_end {
        out.push(Insn::Label(label));
    }

    if let Some(exit_label) = exit {
        out.push(Insn::Label(exit_label));
        for plan in plans.iter().rev() {
            if let Some(hook_plan) = &plan.on_return {
                emit_guarded(&mut out, body, hook_plan, plan, &env, true, Outcome::Discard);
            }
            if let Some(hook_plan) = &plan.on_after {
                emit_guarded(&mut out, body, hook_plan, plan, &env, true, Outcome::Discard);
            }
            if plan.suppresses {
                emit_restore(&mut out, &ctx.class_name, plan);
            }
        }
        match &parsed.ret {
            None => out.push(Insn::Op(op::RETURN)),
            Some(ty) => {
                out.push(Insn::Var {
                    opcode: load_op(ty),
                    index: ret_slot,
                });
                out.push(Insn::Op(return_op(ty)));
            }
        }
    }

    if let (Some(start), Some(end), Some(handler)) = (body_start, body_end, catch_at) {
        out.push(Insn::Label(handler));
        out.push(Insn::Var {
            opcode: op::ASTORE,
            index: thr_slot,
        });
        for plan in plans.iter().rev() {
            if let Some(hook_plan) = &plan.on_throw {
                emit_guarded(&mut out, body, hook_plan, plan, &env, true, Outcome::Discard);
            }
            if let Some(hook_plan) = &plan.on_after {
                emit_guarded(&mut out, body, hook_plan, plan, &env, true, Outcome::Discard);
            }
            if plan.suppresses {
                emit_restore(&mut out, &ctx.class_name, plan);
            }
        }
        out.push(Insn::Var {
            opcode: op::ALOAD,
            index: thr_slot,
        });
        out.push(Insn::Op(op::ATHROW));
        // Appended last: the original handlers keep winning inside the body.
        body.handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type: None,
        });
    }

    let mut hook_stack = 0u16;
    for plan in &plans {
        for hook_plan in plan.hook_plans() {
            hook_stack = hook_stack.max(hook_plan.stack_need);
        }
    }
    body.instructions = out;
    body.max_stack = body.max_stack.max(hook_stack + 2).max(4);
    body.max_locals = alloc.next;
    Ok(true)
}

fn resolve_slot<'c>(
    hook: Option<&'c HookRef>,
    slot: HookSlot,
    target: &TargetShape<'_>,
    advice: &str,
    method: &str,
) -> Option<HookPlan<'c>> {
    let hook = hook?;
    match resolve_hook(hook, target) {
        Ok(plan) => Some(plan),
        Err(message) => {
            warn!(
                advice = %advice,
                slot = slot.label(),
                method = %method,
                %message,
                "hook not woven here"
            );
            None
        }
    }
}

/// Binds each hook formal against this particular target shape. Unlike
/// catalog validation this depends on the matched method, so a failure only
/// skips the hook at this one site.
fn resolve_hook<'c>(
    hook: &'c HookRef,
    target: &TargetShape<'_>,
) -> std::result::Result<HookPlan<'c>, String> {
    let descriptor = MethodDescriptor::parse(&hook.descriptor)
        .map_err(|e| format!("bad hook descriptor: {e}"))?;
    if hook.bindings.len() != descriptor.params.len() {
        return Err(format!(
            "{} bindings for {} formals",
            hook.bindings.len(),
            descriptor.params.len()
        ));
    }

    let mut args = Vec::with_capacity(hook.bindings.len());
    for (binding, formal) in hook.bindings.iter().zip(descriptor.params.iter()) {
        let bound = match binding {
            Binding::Receiver => {
                if !formal.is_reference() {
                    return Err("receiver formal must be a reference type".to_string());
                }
                if target.is_static {
                    Bound::Null
                } else {
                    Bound::This
                }
            }
            Binding::Argument(i) => {
                let Some(param) = target.params.get(*i as usize) else {
                    return Err(format!(
                        "argument {i} out of range for {} parameters",
                        target.params.len()
                    ));
                };
                if formal.is_reference() {
                    Bound::Param {
                        index: *i,
                        boxing: param.boxed(),
                    }
                } else if formal == param {
                    Bound::Param {
                        index: *i,
                        boxing: None,
                    }
                } else {
                    return Err(format!(
                        "argument {i} is {param}, hook formal expects {formal}"
                    ));
                }
            }
            Binding::MethodName => {
                if !formal.is_reference() {
                    return Err("method name formal must be a reference type".to_string());
                }
                Bound::Name
            }
            Binding::ReturnValue => {
                let Some(ret) = target.ret else {
                    return Err("target returns void; no value to capture".to_string());
                };
                if formal.is_reference() {
                    Bound::Return {
                        boxing: ret.boxed(),
                    }
                } else if formal == ret {
                    Bound::Return { boxing: None }
                } else {
                    return Err(format!(
                        "return value is {ret}, hook formal expects {formal}"
                    ));
                }
            }
            Binding::Throwable => {
                if !formal.is_reference() {
                    return Err("throwable formal must be a reference type".to_string());
                }
                Bound::Thrown
            }
            Binding::Traveler => {
                if !formal.is_reference() {
                    return Err("traveler formal must be a reference type".to_string());
                }
                Bound::Traveler
            }
        };
        args.push(bound);
    }

    Ok(HookPlan {
        owner: &hook.owner,
        name: &hook.name,
        descriptor: &hook.descriptor,
        args,
        stack_need: 2 * hook.bindings.len() as u16 + 2,
    })
}

/// `iload enabled; ifeq skip; <call>; skip:` with the call range covered by
/// a catch-all that drops the throwable. A faulting enablement check counts
/// as disabled.
fn emit_guarded(
    out: &mut Vec<Insn>,
    body: &mut CodeBody,
    hook: &HookPlan<'_>,
    plan: &AdvicePlan<'_>,
    env: &Env<'_>,
    exit_side: bool,
    outcome: Outcome,
) {
    let skip = body.new_label();
    let try_start = body.new_label();
    let try_end = body.new_label();
    let fault = body.new_label();

    out.push(Insn::Var {
        opcode: op::ILOAD,
        index: plan.enabled_slot,
    });
    out.push(Insn::Jump {
        opcode: op::IFEQ,
        target: skip,
    });
    out.push(Insn::Label(try_start));
    for bound in &hook.args {
        emit_bound(out, bound, env, exit_side, plan.traveler_slot);
    }
    out.push(Insn::Invoke {
        opcode: op::INVOKESTATIC,
        owner: hook.owner.to_string(),
        name: hook.name.to_string(),
        descriptor: hook.descriptor.to_string(),
        interface: false,
    });
    out.push(Insn::Label(try_end));
    match outcome {
        Outcome::Discard => {}
        Outcome::StoreEnabled => out.push(Insn::Var {
            opcode: op::ISTORE,
            index: plan.enabled_slot,
        }),
        Outcome::StoreTraveler => out.push(Insn::Var {
            opcode: op::ASTORE,
            index: plan.traveler_slot,
        }),
    }
    out.push(Insn::Jump {
        opcode: op::GOTO,
        target: skip,
    });
    out.push(Insn::Label(fault));
    out.push(Insn::Op(op::POP));
    if matches!(outcome, Outcome::StoreEnabled) {
        out.push(iconst(0));
        out.push(Insn::Var {
            opcode: op::ISTORE,
            index: plan.enabled_slot,
        });
    }
    out.push(Insn::Label(skip));
    body.handlers.push(ExceptionHandler {
        start: try_start,
        end: try_end,
        handler: fault,
        catch_type: None,
    });
}

fn emit_bound(out: &mut Vec<Insn>, bound: &Bound, env: &Env<'_>, exit_side: bool, traveler_slot: u16) {
    match bound {
        Bound::Null => out.push(Insn::Op(op::ACONST_NULL)),
        Bound::This => out.push(Insn::Var {
            opcode: op::ALOAD,
            index: 0,
        }),
        Bound::Param { index, boxing } => {
            let ty = &env.params[*index as usize];
            let live = env.param_slots[*index as usize];
            let slot = if exit_side {
                env.captured.get(index).copied().unwrap_or(live)
            } else {
                live
            };
            out.push(Insn::Var {
                opcode: load_op(ty),
                index: slot,
            });
            push_boxing(out, boxing);
        }
        Bound::Name => out.push(Insn::Ldc(LdcValue::Str(env.bound_name.to_string()))),
        Bound::Return { boxing } => {
            if let Some(ty) = env.ret {
                out.push(Insn::Var {
                    opcode: load_op(ty),
                    index: env.ret_slot,
                });
                push_boxing(out, boxing);
            }
        }
        Bound::Thrown => out.push(Insn::Var {
            opcode: op::ALOAD,
            index: env.thr_slot,
        }),
        Bound::Traveler => out.push(Insn::Var {
            opcode: op::ALOAD,
            index: traveler_slot,
        }),
    }
}

fn push_boxing(out: &mut Vec<Insn>, boxing: &Option<(&'static str, &'static str)>) {
    if let Some((owner, descriptor)) = boxing {
        out.push(Insn::Invoke {
            opcode: op::INVOKESTATIC,
            owner: (*owner).to_string(),
            name: "valueOf".to_string(),
            descriptor: (*descriptor).to_string(),
            interface: false,
        });
    }
}

fn push_guard_load(out: &mut Vec<Insn>, class_name: &str, advice_index: usize) {
    out.push(Insn::Field {
        opcode: op::GETSTATIC,
        owner: class_name.to_string(),
        name: runtime::guard_field_name(advice_index),
        descriptor: runtime::FLOW_GUARD_DESC.to_string(),
    });
}

fn emit_restore(out: &mut Vec<Insn>, class_name: &str, plan: &AdvicePlan<'_>) {
    push_guard_load(out, class_name, plan.advice_index);
    out.push(Insn::Var {
        opcode: op::ILOAD,
        index: plan.prior_slot,
    });
    out.push(Insn::Invoke {
        opcode: op::INVOKEVIRTUAL,
        owner: runtime::FLOW_GUARD.to_string(),
        name: runtime::GUARD_RESTORE.0.to_string(),
        descriptor: runtime::GUARD_RESTORE.1.to_string(),
        interface: false,
    });
}

pub(crate) fn load_op(ty: &FieldType) -> u8 {
    match ty {
        FieldType::Long => op::LLOAD,
        FieldType::Float => op::FLOAD,
        FieldType::Double => op::DLOAD,
        FieldType::Object(_) | FieldType::Array(_) => op::ALOAD,
        _ => op::ILOAD,
    }
}

fn store_op(ty: &FieldType) -> u8 {
    match ty {
        FieldType::Long => op::LSTORE,
        FieldType::Float => op::FSTORE,
        FieldType::Double => op::DSTORE,
        FieldType::Object(_) | FieldType::Array(_) => op::ASTORE,
        _ => op::ISTORE,
    }
}

pub(crate) fn return_op(ty: &FieldType) -> u8 {
    match ty {
        FieldType::Long => op::LRETURN,
        FieldType::Float => op::FRETURN,
        FieldType::Double => op::DRETURN,
        FieldType::Object(_) | FieldType::Array(_) => op::ARETURN,
        _ => op::IRETURN,
    }
}
