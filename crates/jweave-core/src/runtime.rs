//! Names and descriptors of the agent runtime support class that woven
//! code links against. The engine only emits references to these; the host
//! process (or the sandbox crate, in tests) supplies the implementation.
//!
//! `FlowGuard` carries the nested-call suppression state for one advice:
//! `enter()` reads and clears the current thread's armed flag, `restore(Z)`
//! puts the prior value back. Both are thread-affine by contract.

/// Internal name of the suppression guard class.
pub const FLOW_GUARD: &str = "jweave/runtime/FlowGuard";

pub const FLOW_GUARD_DESC: &str = "Ljweave/runtime/FlowGuard;";

/// `static FlowGuard create()`
pub const GUARD_CREATE: (&str, &str) = ("create", "()Ljweave/runtime/FlowGuard;");

/// `boolean enter()`, read-and-clear for the calling thread.
pub const GUARD_ENTER: (&str, &str) = ("enter", "()Z");

/// `void restore(boolean)`, reinstates the prior armed state.
pub const GUARD_RESTORE: (&str, &str) = ("restore", "(Z)V");

/// Static field holding the guard for advice `advice_index` on a woven class.
pub fn guard_field_name(advice_index: usize) -> String {
    format!("$jw$guard${advice_index}")
}

/// Instance field holding the capability delegate for mixin `mixin_index`.
pub fn mixin_field_name(mixin_index: usize) -> String {
    format!("$jw$mixin${mixin_index}")
}

/// Name of the relocated body when a timer split renames a method.
pub fn inner_method_name(original: &str) -> String {
    format!("{original}$jw$inner")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_names_are_disjoint_from_java_identifiers() {
        assert_eq!(guard_field_name(0), "$jw$guard$0");
        assert_eq!(mixin_field_name(2), "$jw$mixin$2");
        assert_eq!(inner_method_name("handle"), "handle$jw$inner");
    }
}
