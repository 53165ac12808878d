//! Declarative catalog schema, read once at startup.
//!
//! ```json
//! {
//!   "advices": [{
//!     "label": "dao-timing",
//!     "types": {"regex": "demo\\..*Dao"},
//!     "methods": "query",
//!     "args": ["int", ".."],
//!     "capture_nested": false,
//!     "timer_label": "db",
//!     "hooks": [{
//!       "slot": "on_before",
//!       "owner": "demo/Hooks",
//!       "method": "before",
//!       "descriptor": "(Ljava/lang/Object;I)V",
//!       "bindings": ["receiver", {"argument": 0}]
//!     }]
//!   }],
//!   "mixins": [{
//!     "label": "tagging",
//!     "marker": "demo.Traceable",
//!     "interface": "demo/TraceCap",
//!     "impl": "demo/TraceCapImpl"
//!   }]
//! }
//! ```
//!
//! Pattern and argument errors drop the offending advice with a diagnostic;
//! hook-slot violations are handled by catalog validation. Only malformed
//! JSON itself is a hard error.

use serde::Deserialize;

use super::{
    AdviceDef, ArgPatterns, Binding, Catalog, CatalogBuild, Diagnostic, HookRef, HookSlot, Mixin,
    Pattern,
};
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct CatalogSpec {
    #[serde(default)]
    pub advices: Vec<AdviceSpec>,
    #[serde(default)]
    pub mixins: Vec<MixinSpec>,
}

#[derive(Debug, Deserialize)]
pub struct AdviceSpec {
    pub label: String,
    pub types: PatternSpec,
    pub methods: PatternSpec,
    /// Defaults to `[".."]`: any parameter list.
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub capture_nested: bool,
    #[serde(default)]
    pub timer_label: Option<String>,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
}

/// `"exact.Name"` or `{"regex": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    Exact(String),
    Regex { regex: String },
}

impl PatternSpec {
    fn compile(&self) -> std::result::Result<Pattern, String> {
        match self {
            PatternSpec::Exact(name) => Ok(Pattern::exact(name.clone())),
            PatternSpec::Regex { regex } => {
                Pattern::regex(regex).map_err(|e| format!("bad regex {regex:?}: {e}"))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HookSpec {
    pub slot: SlotSpec,
    pub owner: String,
    pub method: String,
    pub descriptor: String,
    #[serde(default)]
    pub bindings: Vec<BindingSpec>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSpec {
    EnabledCheck,
    OnBefore,
    OnReturn,
    OnThrow,
    OnAfter,
}

impl From<SlotSpec> for HookSlot {
    fn from(spec: SlotSpec) -> Self {
        match spec {
            SlotSpec::EnabledCheck => HookSlot::EnabledCheck,
            SlotSpec::OnBefore => HookSlot::OnBefore,
            SlotSpec::OnReturn => HookSlot::OnReturn,
            SlotSpec::OnThrow => HookSlot::OnThrow,
            SlotSpec::OnAfter => HookSlot::OnAfter,
        }
    }
}

/// `"receiver"`, `{"argument": 0}`, `"method_name"`, `"return_value"`,
/// `"throwable"`, `"traveler"`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSpec {
    Receiver,
    Argument(u16),
    MethodName,
    ReturnValue,
    Throwable,
    Traveler,
}

impl From<BindingSpec> for Binding {
    fn from(spec: BindingSpec) -> Self {
        match spec {
            BindingSpec::Receiver => Binding::Receiver,
            BindingSpec::Argument(i) => Binding::Argument(i),
            BindingSpec::MethodName => Binding::MethodName,
            BindingSpec::ReturnValue => Binding::ReturnValue,
            BindingSpec::Throwable => Binding::Throwable,
            BindingSpec::Traveler => Binding::Traveler,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MixinSpec {
    pub label: String,
    pub marker: PatternSpec,
    pub interface: String,
    #[serde(rename = "impl")]
    pub implementation: String,
}

/// Parse and build a catalog from JSON. Malformed JSON is the only hard
/// error; everything else degrades to diagnostics.
pub fn load_catalog(json: &str) -> Result<CatalogBuild> {
    let spec: CatalogSpec = serde_json::from_str(json)?;
    Ok(build_from_spec(spec))
}

fn build_from_spec(spec: CatalogSpec) -> CatalogBuild {
    let mut dropped = Vec::new();
    let mut builder = Catalog::builder();

    for advice in spec.advices {
        match lower_advice(advice) {
            Ok(def) => builder = builder.advice(def),
            Err(diag) => dropped.push(diag),
        }
    }
    for mixin in spec.mixins {
        match mixin.marker.compile() {
            Ok(marker) => {
                builder = builder.mixin(Mixin {
                    label: mixin.label,
                    marker,
                    interface_name: mixin.interface,
                    impl_class: mixin.implementation,
                });
            }
            Err(message) => dropped.push(Diagnostic {
                advice: mixin.label,
                slot: None,
                message,
            }),
        }
    }

    let mut built = builder.build();
    if !dropped.is_empty() {
        dropped.append(&mut built.diagnostics);
        built.diagnostics = dropped;
    }
    built
}

fn lower_advice(spec: AdviceSpec) -> std::result::Result<AdviceDef, Diagnostic> {
    let fail = |message: String| Diagnostic {
        advice: spec.label.clone(),
        slot: None,
        message,
    };

    let type_pattern = spec.types.compile().map_err(&fail)?;
    let method_pattern = spec.methods.compile().map_err(&fail)?;
    let args = match &spec.args {
        Some(entries) => ArgPatterns::parse(entries).map_err(&fail)?,
        None => ArgPatterns::any(),
    };
    let hooks = spec
        .hooks
        .into_iter()
        .map(|h| {
            (
                h.slot.into(),
                HookRef::new(
                    h.owner,
                    h.method,
                    h.descriptor,
                    h.bindings.into_iter().map(Into::into).collect(),
                ),
            )
        })
        .collect();

    Ok(AdviceDef {
        label: spec.label,
        type_pattern,
        method_pattern,
        args,
        capture_nested: spec.capture_nested,
        timer_label: spec.timer_label,
        hooks,
    })
}
