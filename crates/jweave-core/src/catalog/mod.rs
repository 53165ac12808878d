//! Pointcut/advice catalog: where to inject and what to call.
//!
//! A catalog is built once (programmatically or from the JSON schema in
//! [`schema`]) and never mutated afterward. Validation is best-effort by
//! policy: a malformed hook disables that one slot with a diagnostic and the
//! build keeps going, so one bad declaration cannot take down the rest of
//! the instrumentation.

pub mod pattern;
pub mod schema;

pub use pattern::{ArgPattern, ArgPatterns, Pattern};

use std::fmt;

use jweave_classfile::{FieldType, MethodDescriptor};
use tracing::warn;

/// The five injectable positions of one advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookSlot {
    EnabledCheck,
    OnBefore,
    OnReturn,
    OnThrow,
    OnAfter,
}

impl HookSlot {
    pub fn label(self) -> &'static str {
        match self {
            HookSlot::EnabledCheck => "enabled_check",
            HookSlot::OnBefore => "on_before",
            HookSlot::OnReturn => "on_return",
            HookSlot::OnThrow => "on_throw",
            HookSlot::OnAfter => "on_after",
        }
    }
}

/// How one hook formal parameter is populated at the injected call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// `this` of the woven method; `null` when the target is static.
    Receiver,
    /// Target method argument by position. Passed raw when the hook formal
    /// is the same primitive, boxed when the formal is a reference type.
    Argument(u16),
    /// The target method's name, as a string constant.
    MethodName,
    /// Captured return value. On-return only, and must be formal #0.
    ReturnValue,
    /// Captured throwable. On-throw only, and must be formal #0.
    Throwable,
    /// The value the before hook returned for this activation.
    Traveler,
}

/// A static hook method plus the binding feeding each of its formals.
#[derive(Debug, Clone)]
pub struct HookRef {
    /// Internal (slash-separated) owner class name.
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub bindings: Vec<Binding>,
}

impl HookRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        bindings: Vec<Binding>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            bindings,
        }
    }
}

/// One pointcut with its validated hook group.
#[derive(Debug, Clone)]
pub struct Advice {
    pub label: String,
    /// Matched against dotted type names, self or ancestors.
    pub type_pattern: Pattern,
    pub method_pattern: Pattern,
    pub args: ArgPatterns,
    /// When false, nested invocations of a matched method on the same
    /// thread do not re-fire hooks.
    pub capture_nested: bool,
    /// Named timer marker; two marked advices on one method force the
    /// wrapper/inner dispatch split.
    pub timer_label: Option<String>,
    pub enabled_check: Option<HookRef>,
    pub on_before: Option<HookRef>,
    pub on_return: Option<HookRef>,
    pub on_throw: Option<HookRef>,
    pub on_after: Option<HookRef>,
    /// Established by a non-void before hook.
    pub traveler_type: Option<FieldType>,
}

impl Advice {
    pub fn suppresses_nested(&self) -> bool {
        !self.capture_nested
    }

    pub fn hook(&self, slot: HookSlot) -> Option<&HookRef> {
        match slot {
            HookSlot::EnabledCheck => self.enabled_check.as_ref(),
            HookSlot::OnBefore => self.on_before.as_ref(),
            HookSlot::OnReturn => self.on_return.as_ref(),
            HookSlot::OnThrow => self.on_throw.as_ref(),
            HookSlot::OnAfter => self.on_after.as_ref(),
        }
    }

    pub fn has_any_hook(&self) -> bool {
        self.enabled_check.is_some()
            || self.on_before.is_some()
            || self.on_return.is_some()
            || self.on_throw.is_some()
            || self.on_after.is_some()
    }
}

/// Capability injection: a unit whose resolved ancestry matches `marker`
/// gains `interface_name`, implemented by delegating to a held instance of
/// `impl_class`.
#[derive(Debug, Clone)]
pub struct Mixin {
    pub label: String,
    pub marker: Pattern,
    /// Internal name of the capability interface.
    pub interface_name: String,
    /// Internal name of the concrete implementation (needs a no-arg ctor).
    pub impl_class: String,
}

/// One build-time validation finding.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub advice: String,
    pub slot: Option<HookSlot>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "{}/{}: {}", self.advice, slot.label(), self.message),
            None => write!(f, "{}: {}", self.advice, self.message),
        }
    }
}

/// Immutable matched-against catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    advices: Vec<Advice>,
    mixins: Vec<Mixin>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn advices(&self) -> &[Advice] {
        &self.advices
    }

    pub fn mixins(&self) -> &[Mixin] {
        &self.mixins
    }

    pub fn is_empty(&self) -> bool {
        self.advices.is_empty() && self.mixins.is_empty()
    }
}

/// A built catalog together with everything validation had to disable.
#[derive(Debug)]
pub struct CatalogBuild {
    pub catalog: Catalog,
    pub diagnostics: Vec<Diagnostic>,
}

/// Raw advice definition, prior to validation. Hook declarations are an
/// ordered list so duplicate slot declarations are representable (and then
/// rejected, keeping the first).
#[derive(Debug)]
pub struct AdviceDef {
    pub label: String,
    pub type_pattern: Pattern,
    pub method_pattern: Pattern,
    pub args: ArgPatterns,
    pub capture_nested: bool,
    pub timer_label: Option<String>,
    pub hooks: Vec<(HookSlot, HookRef)>,
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    defs: Vec<AdviceDef>,
    mixins: Vec<Mixin>,
}

impl CatalogBuilder {
    pub fn advice(mut self, def: AdviceDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn mixin(mut self, mixin: Mixin) -> Self {
        self.mixins.push(mixin);
        self
    }

    pub fn build(self) -> CatalogBuild {
        let mut diagnostics = Vec::new();
        let mut advices = Vec::new();
        for def in self.defs {
            advices.push(validate_advice(def, &mut diagnostics));
        }
        CatalogBuild {
            catalog: Catalog {
                advices,
                mixins: self.mixins,
            },
            diagnostics,
        }
    }
}

fn validate_advice(def: AdviceDef, diagnostics: &mut Vec<Diagnostic>) -> Advice {
    let mut slots: [Option<HookRef>; 5] = [None, None, None, None, None];
    let slot_index = |slot: HookSlot| match slot {
        HookSlot::EnabledCheck => 0,
        HookSlot::OnBefore => 1,
        HookSlot::OnReturn => 2,
        HookSlot::OnThrow => 3,
        HookSlot::OnAfter => 4,
    };

    for (slot, hook) in def.hooks {
        let cell = &mut slots[slot_index(slot)];
        if cell.is_some() {
            reject(
                diagnostics,
                &def.label,
                slot,
                "duplicate declaration; keeping the first".to_string(),
            );
            continue;
        }
        *cell = Some(hook);
    }

    // The before hook is validated first: it establishes the traveler type
    // the later slots' bindings are checked against.
    let mut traveler_type = None;
    let on_before = slots[1].take().and_then(|hook| {
        match validate_hook(HookSlot::OnBefore, &hook, false) {
            Ok(traveler) => {
                traveler_type = traveler;
                Some(hook)
            }
            Err(message) => {
                reject(diagnostics, &def.label, HookSlot::OnBefore, message);
                None
            }
        }
    });

    let mut take_validated = |slot: HookSlot, cell: Option<HookRef>| {
        cell.and_then(|hook| match validate_hook(slot, &hook, traveler_type.is_some()) {
            Ok(_) => Some(hook),
            Err(message) => {
                reject(diagnostics, &def.label, slot, message);
                None
            }
        })
    };

    let enabled_check = take_validated(HookSlot::EnabledCheck, slots[0].take());
    let on_return = take_validated(HookSlot::OnReturn, slots[2].take());
    let on_throw = take_validated(HookSlot::OnThrow, slots[3].take());
    let on_after = take_validated(HookSlot::OnAfter, slots[4].take());

    Advice {
        label: def.label,
        type_pattern: def.type_pattern,
        method_pattern: def.method_pattern,
        args: def.args,
        capture_nested: def.capture_nested,
        timer_label: def.timer_label,
        enabled_check,
        on_before,
        on_return,
        on_throw,
        on_after,
        traveler_type,
    }
}

fn reject(diagnostics: &mut Vec<Diagnostic>, advice: &str, slot: HookSlot, message: String) {
    warn!(advice = %advice, slot = slot.label(), %message, "hook disabled");
    diagnostics.push(Diagnostic {
        advice: advice.to_string(),
        slot: Some(slot),
        message,
    });
}

/// Check one hook against its slot's rules. Returns the traveler type for a
/// non-void before hook.
fn validate_hook(
    slot: HookSlot,
    hook: &HookRef,
    traveler_established: bool,
) -> Result<Option<FieldType>, String> {
    let descriptor = MethodDescriptor::parse(&hook.descriptor)
        .map_err(|e| format!("bad hook descriptor: {e}"))?;

    if hook.bindings.len() != descriptor.params.len() {
        return Err(format!(
            "{} bindings for {} formals",
            hook.bindings.len(),
            descriptor.params.len()
        ));
    }

    let mut traveler = None;
    match slot {
        HookSlot::EnabledCheck => {
            if descriptor.ret != Some(FieldType::Boolean) {
                return Err("enablement check must return boolean".to_string());
            }
        }
        HookSlot::OnBefore => match &descriptor.ret {
            None => {}
            Some(ty) if ty.is_reference() => traveler = Some(ty.clone()),
            Some(ty) => {
                return Err(format!(
                    "traveler type {ty} is primitive; only reference values may travel"
                ));
            }
        },
        HookSlot::OnReturn | HookSlot::OnThrow | HookSlot::OnAfter => {
            if descriptor.ret.is_some() {
                return Err(format!("{} hook must return void", slot.label()));
            }
        }
    }

    for (position, binding) in hook.bindings.iter().enumerate() {
        let allowed = match binding {
            Binding::Receiver | Binding::Argument(_) | Binding::MethodName => true,
            Binding::ReturnValue => slot == HookSlot::OnReturn,
            Binding::Throwable => slot == HookSlot::OnThrow,
            Binding::Traveler => matches!(
                slot,
                HookSlot::OnReturn | HookSlot::OnThrow | HookSlot::OnAfter
            ),
        };
        if !allowed {
            return Err(format!(
                "binding {binding:?} is not valid in {}",
                slot.label()
            ));
        }
        match binding {
            Binding::ReturnValue if position != 0 => {
                return Err("captured return value must be formal #0".to_string());
            }
            Binding::Throwable if position != 0 => {
                return Err("captured throwable must be formal #0".to_string());
            }
            Binding::Traveler => {
                if !traveler_established {
                    return Err(
                        "traveler binding without a traveler-producing before hook".to_string()
                    );
                }
                if !descriptor.params[position].is_reference() {
                    return Err("traveler formal must be a reference type".to_string());
                }
            }
            _ => {}
        }
    }

    Ok(traveler)
}
