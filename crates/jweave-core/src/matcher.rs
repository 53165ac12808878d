//! Class- and method-level matching of catalog entries against one unit.
//!
//! Class-level work (pattern vs self name and resolved ancestors) happens
//! once per unit in [`ClassMatches::compute`]; per-method checks then run
//! against that precomputed state. Names are matched in dotted source form.

use std::sync::Arc;

use jweave_classfile::{flags, ClassSummary, MethodDescriptor};

use crate::catalog::{Advice, Catalog, Mixin};
use crate::hierarchy::ParsedType;

fn dotted(internal: &str) -> String {
    internal.replace('/', ".")
}

/// The parameter segment of a descriptor, `(` to `)` exclusive. Return
/// types are ignored when comparing shapes across an override.
fn param_segment(descriptor: &str) -> &str {
    let start = descriptor.find('(').map(|i| i + 1).unwrap_or(0);
    let end = descriptor.find(')').unwrap_or(descriptor.len());
    &descriptor[start..end.max(start)]
}

/// One advice that applies to the unit at the type level.
pub struct AdviceMatch<'c> {
    pub advice: &'c Advice,
    /// Position in the catalog; stable across passes, used to name
    /// per-advice guard fields.
    pub advice_index: usize,
    /// Type pattern matched the unit's own name.
    direct: bool,
    /// Pattern-matching known ancestors, for override propagation.
    matched_ancestors: Vec<Arc<ClassSummary>>,
}

/// Everything the catalog has to say about one unit.
pub struct ClassMatches<'c> {
    advices: Vec<AdviceMatch<'c>>,
    mixins: Vec<(usize, &'c Mixin)>,
    /// Ancestors that resolved to `Missing` and were dropped from matching.
    pub missing: Vec<String>,
}

impl<'c> ClassMatches<'c> {
    pub fn compute(catalog: &'c Catalog, internal_name: &str, chain: &[ParsedType]) -> Self {
        let self_dotted = dotted(internal_name);

        let mut missing = Vec::new();
        let mut ancestors: Vec<Arc<ClassSummary>> = Vec::new();
        for entry in chain.iter().skip(1) {
            match entry {
                ParsedType::Known(summary) => ancestors.push(Arc::clone(summary)),
                ParsedType::Missing(name) => missing.push(name.clone()),
            }
        }

        let mut advices = Vec::new();
        for (advice_index, advice) in catalog.advices().iter().enumerate() {
            if !advice.has_any_hook() {
                continue;
            }
            let direct = advice.type_pattern.matches(&self_dotted);
            let matched_ancestors: Vec<Arc<ClassSummary>> = ancestors
                .iter()
                .filter(|a| advice.type_pattern.matches(&dotted(&a.name)))
                .cloned()
                .collect();
            if direct || !matched_ancestors.is_empty() {
                advices.push(AdviceMatch {
                    advice,
                    advice_index,
                    direct,
                    matched_ancestors,
                });
            }
        }

        let mut mixins = Vec::new();
        for (mixin_index, mixin) in catalog.mixins().iter().enumerate() {
            let applies = mixin.marker.matches(&self_dotted)
                || ancestors
                    .iter()
                    .any(|a| mixin.marker.matches(&dotted(&a.name)));
            if applies {
                mixins.push((mixin_index, mixin));
            }
        }

        ClassMatches {
            advices,
            mixins,
            missing,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.advices.is_empty() && self.mixins.is_empty()
    }

    pub fn mixins(&self) -> &[(usize, &'c Mixin)] {
        &self.mixins
    }

    pub fn advices(&self) -> &[AdviceMatch<'c>] {
        &self.advices
    }

    /// Advices applying to one method, in catalog order.
    ///
    /// Instance methods also match through a same-shaped declaration on a
    /// pattern-matching ancestor (override propagation); static methods
    /// require the unit's own name to match.
    pub fn method_matches(
        &self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
    ) -> Vec<&AdviceMatch<'c>> {
        let Ok(parsed) = MethodDescriptor::parse(descriptor) else {
            return Vec::new();
        };
        let params: Vec<String> = parsed.params.iter().map(|p| p.to_string()).collect();
        let is_static = access_flags & flags::ACC_STATIC != 0;
        let is_initializer = name == "<init>" || name == "<clinit>";
        let segment = param_segment(descriptor);

        self.advices
            .iter()
            .filter(|m| {
                let advice = m.advice;
                if advice.method_pattern.is_regex() && is_initializer {
                    return false;
                }
                if !advice.method_pattern.matches(name) || !advice.args.matches(&params) {
                    return false;
                }
                if m.direct {
                    return true;
                }
                if is_static {
                    // No polymorphic dispatch: ancestors never propagate.
                    return false;
                }
                m.matched_ancestors.iter().any(|ancestor| {
                    ancestor.methods.iter().any(|shape| {
                        shape.access_flags & flags::ACC_STATIC == 0
                            && shape.name == name
                            && param_segment(&shape.descriptor) == segment
                    })
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AdviceDef, ArgPatterns, Binding, HookRef, HookSlot, Pattern};
    use crate::hierarchy::{ClassSource, TypeHierarchy};
    use jweave_classfile::{ClassBuilder, CodeBody, Insn};
    use std::collections::HashMap;

    fn advice_def(label: &str, types: Pattern, methods: Pattern, args: ArgPatterns) -> AdviceDef {
        AdviceDef {
            label: label.to_string(),
            type_pattern: types,
            method_pattern: methods,
            args,
            capture_nested: true,
            timer_label: None,
            hooks: vec![(
                HookSlot::OnBefore,
                HookRef::new("h/H", "before", "(Ljava/lang/String;)V", vec![Binding::MethodName]),
            )],
        }
    }

    fn ret_code() -> CodeBody {
        let mut c = CodeBody::new(0, 4);
        c.instructions.push(Insn::Op(jweave_classfile::opcodes::RETURN));
        c
    }

    fn hierarchy(classes: Vec<(&str, Vec<u8>)>) -> TypeHierarchy {
        let map: HashMap<String, Vec<u8>> = classes
            .into_iter()
            .map(|(n, b)| (n.to_string(), b))
            .collect();
        let source = move |name: &str| map.get(name).cloned();
        TypeHierarchy::new(std::sync::Arc::new(source) as std::sync::Arc<dyn ClassSource>)
    }

    #[test]
    fn test_type_pattern_miss_matches_nothing() {
        let built = Catalog::builder()
            .advice(advice_def(
                "a",
                Pattern::exact("other.Type"),
                Pattern::exact("bar"),
                ArgPatterns::any(),
            ))
            .build();
        let h = hierarchy(vec![]);
        let chain = h.resolve("demo/Foo").unwrap();
        let matches = ClassMatches::compute(&built.catalog, "demo/Foo", &chain);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_override_propagation_instance_only() {
        // Pattern names the base type; the subclass declares the same shape.
        let built = Catalog::builder()
            .advice(advice_def(
                "a",
                Pattern::exact("demo.Base"),
                Pattern::exact("work"),
                ArgPatterns::any(),
            ))
            .build();
        let base = ClassBuilder::new("demo/Base")
            .method(flags::ACC_PUBLIC, "work", "(I)V", ret_code())
            .declared_method(
                flags::ACC_PUBLIC | flags::ACC_STATIC,
                "swork",
                "(I)V",
            )
            .bytes()
            .unwrap();
        let sub = ClassBuilder::new("demo/Sub").extends("demo/Base").bytes().unwrap();

        let h = hierarchy(vec![("demo/Base", base), ("demo/Sub", sub)]);
        let chain = h.resolve("demo/Sub").unwrap();
        let matches = ClassMatches::compute(&built.catalog, "demo/Sub", &chain);
        assert!(!matches.is_empty());

        // instance method inherited applicability through demo/Base
        let hits = matches.method_matches(flags::ACC_PUBLIC, "work", "(I)V");
        assert_eq!(hits.len(), 1);

        // different shape: no propagation
        let hits = matches.method_matches(flags::ACC_PUBLIC, "work", "(J)V");
        assert!(hits.is_empty());

        // static method of the same name: direct matches only
        let built_static = Catalog::builder()
            .advice(advice_def(
                "s",
                Pattern::exact("demo.Base"),
                Pattern::exact("swork"),
                ArgPatterns::any(),
            ))
            .build();
        let matches = ClassMatches::compute(&built_static.catalog, "demo/Sub", &chain);
        let hits = matches.method_matches(
            flags::ACC_PUBLIC | flags::ACC_STATIC,
            "swork",
            "(I)V",
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_regex_method_pattern_excludes_initializers() {
        let built = Catalog::builder()
            .advice(advice_def(
                "a",
                Pattern::exact("demo.Foo"),
                Pattern::regex(".*").unwrap(),
                ArgPatterns::any(),
            ))
            .build();
        let h = hierarchy(vec![]);
        let chain = h.resolve("demo/Foo").unwrap();
        let matches = ClassMatches::compute(&built.catalog, "demo/Foo", &chain);
        assert!(matches
            .method_matches(flags::ACC_PUBLIC, "<init>", "()V")
            .is_empty());
        assert!(matches
            .method_matches(flags::ACC_STATIC, "<clinit>", "()V")
            .is_empty());
        assert_eq!(
            matches.method_matches(flags::ACC_PUBLIC, "bar", "()V").len(),
            1
        );

        // exact patterns may still name an initializer
        let built = Catalog::builder()
            .advice(advice_def(
                "ctor",
                Pattern::exact("demo.Foo"),
                Pattern::exact("<init>"),
                ArgPatterns::any(),
            ))
            .build();
        let matches = ClassMatches::compute(&built.catalog, "demo/Foo", &chain);
        assert_eq!(
            matches
                .method_matches(flags::ACC_PUBLIC, "<init>", "()V")
                .len(),
            1
        );
    }

    #[test]
    fn test_arg_shape_narrowing() {
        let built = Catalog::builder()
            .advice(advice_def(
                "a",
                Pattern::exact("demo.Foo"),
                Pattern::exact("bar"),
                ArgPatterns::parse(&["int", ".."]).unwrap(),
            ))
            .build();
        let h = hierarchy(vec![]);
        let chain = h.resolve("demo/Foo").unwrap();
        let matches = ClassMatches::compute(&built.catalog, "demo/Foo", &chain);
        assert_eq!(
            matches.method_matches(flags::ACC_PUBLIC, "bar", "(I)V").len(),
            1
        );
        assert_eq!(
            matches
                .method_matches(flags::ACC_PUBLIC, "bar", "(IJLjava/lang/String;)V")
                .len(),
            1
        );
        assert!(matches
            .method_matches(flags::ACC_PUBLIC, "bar", "(J)V")
            .is_empty());
    }

    #[test]
    fn test_missing_ancestors_are_reported_not_matched() {
        let built = Catalog::builder()
            .advice(advice_def(
                "a",
                Pattern::exact("demo.Gone"),
                Pattern::exact("bar"),
                ArgPatterns::any(),
            ))
            .build();
        let sub = ClassBuilder::new("demo/Sub").extends("demo/Gone").bytes().unwrap();
        let h = hierarchy(vec![("demo/Sub", sub)]);
        let chain = h.resolve("demo/Sub").unwrap();
        let matches = ClassMatches::compute(&built.catalog, "demo/Sub", &chain);
        // demo/Gone is missing: it cannot carry a pattern match
        assert!(matches.is_empty());
        assert_eq!(matches.missing, vec!["demo/Gone".to_string()]);
    }

    #[test]
    fn test_mixin_marker_through_ancestry() {
        let built = Catalog::builder()
            .mixin(crate::catalog::Mixin {
                label: "cap".to_string(),
                marker: Pattern::exact("demo.Marked"),
                interface_name: "demo/Cap".to_string(),
                impl_class: "demo/CapImpl".to_string(),
            })
            .build();
        let marked = ClassBuilder::new("demo/Marked").bytes().unwrap();
        let sub = ClassBuilder::new("demo/Sub").extends("demo/Marked").bytes().unwrap();
        let h = hierarchy(vec![("demo/Marked", marked), ("demo/Sub", sub)]);
        let chain = h.resolve("demo/Sub").unwrap();
        let matches = ClassMatches::compute(&built.catalog, "demo/Sub", &chain);
        assert!(!matches.is_empty());
        assert_eq!(matches.mixins().len(), 1);

        let other = ClassBuilder::new("demo/Other").bytes().unwrap();
        let h = hierarchy(vec![("demo/Other", other)]);
        let chain = h.resolve("demo/Other").unwrap();
        let matches = ClassMatches::compute(&built.catalog, "demo/Other", &chain);
        assert!(matches.mixins().is_empty());
    }
}
