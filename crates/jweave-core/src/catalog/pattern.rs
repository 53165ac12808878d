//! Name and argument-shape patterns.
//!
//! Patterns operate on source-style names: dotted type names
//! (`java.lang.String`), plain method names, and display parameter types
//! (`int`, `long[]`). Regexes are anchored on both ends, so `demo\..*Dao`
//! matches whole names only.

use regex::Regex;

/// Exact string or anchored regex over one name.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    Regex { source: String, compiled: Regex },
}

impl Pattern {
    pub fn exact(name: impl Into<String>) -> Self {
        Pattern::Exact(name.into())
    }

    /// Compile an anchored regex pattern.
    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        let compiled = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Pattern::Regex {
            source: source.to_string(),
            compiled,
        })
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Pattern::Regex { .. })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Exact(expected) => expected == name,
            Pattern::Regex { compiled, .. } => compiled.is_match(name),
        }
    }

    /// The pattern as written, for diagnostics.
    pub fn source(&self) -> &str {
        match self {
            Pattern::Exact(s) => s,
            Pattern::Regex { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgPattern {
    /// Display type name, e.g. `int` or `java.lang.String`.
    Exact(String),
    /// `*`: any single parameter.
    AnyType,
}

/// Positional parameter-shape pattern. A trailing `..` accepts zero or more
/// remaining parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgPatterns {
    entries: Vec<ArgPattern>,
    trailing_rest: bool,
}

impl ArgPatterns {
    /// The `[..]` shape: matches any parameter list.
    pub fn any() -> Self {
        Self {
            entries: Vec::new(),
            trailing_rest: true,
        }
    }

    /// Parse entries as written in a catalog: `*` is any-single-type, `..`
    /// is rest-of-arguments and may only appear last.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, String> {
        let mut entries = Vec::new();
        let mut trailing_rest = false;
        for (i, spec) in specs.iter().enumerate() {
            let spec = spec.as_ref();
            match spec {
                ".." => {
                    if i + 1 != specs.len() {
                        return Err("'..' is only valid as the final argument pattern".to_string());
                    }
                    trailing_rest = true;
                }
                "*" => entries.push(ArgPattern::AnyType),
                name => entries.push(ArgPattern::Exact(name.to_string())),
            }
        }
        Ok(Self {
            entries,
            trailing_rest,
        })
    }

    /// Match against actual display parameter type names.
    pub fn matches(&self, params: &[String]) -> bool {
        if self.trailing_rest {
            if params.len() < self.entries.len() {
                return false;
            }
        } else if params.len() != self.entries.len() {
            return false;
        }
        self.entries.iter().zip(params).all(|(pat, actual)| match pat {
            ArgPattern::AnyType => true,
            ArgPattern::Exact(expected) => expected == actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_pattern() {
        let p = Pattern::exact("demo.Foo");
        assert!(p.matches("demo.Foo"));
        assert!(!p.matches("demo.FooBar"));
        assert!(!p.is_regex());
    }

    #[test]
    fn test_regex_is_anchored() {
        let p = Pattern::regex(r"demo\..*Dao").unwrap();
        assert!(p.matches("demo.UserDao"));
        assert!(!p.matches("xdemo.UserDao"));
        assert!(!p.matches("demo.UserDaoImpl"));
        assert!(p.is_regex());
        assert_eq!(p.source(), r"demo\..*Dao");
    }

    #[test]
    fn test_bad_regex_is_an_error() {
        assert!(Pattern::regex(r"demo\.(unclosed").is_err());
    }

    #[test]
    fn test_arg_patterns_positional() {
        let p = ArgPatterns::parse(&["int", "java.lang.String"]).unwrap();
        assert!(p.matches(&names(&["int", "java.lang.String"])));
        assert!(!p.matches(&names(&["int"])));
        assert!(!p.matches(&names(&["int", "java.lang.String", "long"])));
        assert!(!p.matches(&names(&["long", "java.lang.String"])));
    }

    #[test]
    fn test_arg_patterns_wildcards() {
        let p = ArgPatterns::parse(&["*", ".."]).unwrap();
        assert!(p.matches(&names(&["int"])));
        assert!(p.matches(&names(&["long[]", "int", "byte"])));
        assert!(!p.matches(&names(&[])));

        let any = ArgPatterns::any();
        assert!(any.matches(&names(&[])));
        assert!(any.matches(&names(&["int", "int"])));
    }

    #[test]
    fn test_rest_must_be_trailing() {
        assert!(ArgPatterns::parse(&["..", "int"]).is_err());
        assert!(ArgPatterns::parse(&["int", "..", "long"]).is_err());
        assert!(ArgPatterns::parse(&["int", ".."]).is_ok());
    }
}
