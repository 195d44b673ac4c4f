//! Payload type resolution.
//!
//! Maps a bare type name such as `Order`, `acme.Order[]` or
//! `Dictionary[string,List[Order]]` onto a [`TypeDescriptor`]. Array
//! suffixes and a trailing generic argument list are peeled off first, each
//! argument is resolved recursively, and the remaining base name runs
//! through these stages in order:
//!
//! 1. built-in types by exact simple or full name
//! 2. catalogue entries by simple name, when exactly one entry has it
//! 3. catalogue entries by full name
//! 4. types of the local module
//! 5. types of any module a catalogue entry belongs to
//! 6. the fallback resolver, if any
//!
//! Generic candidates must have an arity equal to the argument count.
//! Names nested deeper than [`MAX_NESTING`] generic or array levels are
//! rejected as malformed.

use std::collections::HashMap;

use crate::descriptor::{BUILTIN_MODULE, BUILTIN_NAMESPACE, BUILTINS, NamedType, TypeDescriptor};
use crate::errors::ResolveError;

/// Module holding the messaging layer's own payload types.
pub const LOCAL_MODULE: &str = "slotlink.messaging";

/// Deepest generic or array nesting accepted in a type name.
pub const MAX_NESTING: usize = 64;

type Fallback = Box<dyn Fn(&str, usize) -> Option<NamedType> + Send + Sync>;

/// Known payload types.
pub struct TypeCatalog {
    entries: Vec<NamedType>,
    modules: HashMap<String, Vec<NamedType>>,
    local_module: String,
    fallback: Option<Fallback>,
}

impl TypeCatalog {
    /// An empty catalogue whose local module is [`LOCAL_MODULE`].
    ///
    /// The messaging layer's own payloads are all built-ins, so the local
    /// module stage starts empty. Populate it with [`TypeCatalog::define`],
    /// or pick the application's module with
    /// [`TypeCatalog::with_local_module`].
    pub fn new() -> Self {
        Self::with_local_module(LOCAL_MODULE)
    }

    /// An empty catalogue with a custom local module.
    pub fn with_local_module(module: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            modules: HashMap::new(),
            local_module: module.into(),
            fallback: None,
        }
    }

    /// Add a catalogue entry. Its module becomes searchable as well.
    pub fn register(&mut self, ty: NamedType) -> &mut Self {
        self.define(ty.clone());
        if !self.entries.contains(&ty) {
            self.entries.push(ty);
        }
        self
    }

    /// Record that `ty` exists in its module without making it a catalogue
    /// entry. Found only by the module stages.
    pub fn define(&mut self, ty: NamedType) -> &mut Self {
        let types = self.modules.entry(ty.module.clone()).or_default();
        if !types.contains(&ty) {
            types.push(ty);
        }
        self
    }

    /// Install the last-resort resolver, called with the base name and the
    /// generic argument count.
    pub fn set_fallback(
        &mut self,
        fallback: impl Fn(&str, usize) -> Option<NamedType> + Send + Sync + 'static,
    ) -> &mut Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Catalogue entries in registration order.
    pub fn entries(&self) -> &[NamedType] {
        &self.entries
    }

    /// Resolve `name` to a type.
    pub fn resolve(&self, name: &str) -> Result<TypeDescriptor, ResolveError> {
        self.resolve_nested(name, 0)
    }

    fn resolve_nested(&self, name: &str, depth: usize) -> Result<TypeDescriptor, ResolveError> {
        let parsed = parse_type_name(name)?;
        let depth = depth + parsed.array_depth + usize::from(!parsed.arguments.is_empty());
        if depth > MAX_NESTING {
            return Err(ResolveError::Malformed {
                name: name.to_string(),
                reason: "nesting too deep".to_string(),
            });
        }
        let arguments = parsed
            .arguments
            .iter()
            .map(|arg| self.resolve_nested(arg, depth))
            .collect::<Result<Vec<_>, _>>()?;
        let base = self.resolve_base(parsed.base, arguments.len())?;
        let mut ty = if arguments.is_empty() {
            TypeDescriptor::Named(base)
        } else {
            TypeDescriptor::Generic {
                definition: base,
                arguments,
            }
        };
        for _ in 0..parsed.array_depth {
            ty = ty.array_of();
        }
        Ok(ty)
    }

    /// The shortest name that resolves back to `ty`.
    ///
    /// Simple names are used where they resolve to the same type, full names
    /// otherwise.
    pub fn bare_name(&self, ty: &TypeDescriptor) -> String {
        match ty {
            TypeDescriptor::Named(t) => self.bare_base(t),
            TypeDescriptor::Generic {
                definition,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| self.bare_name(a)).collect();
                format!("{}[{}]", self.bare_base(definition), args.join(","))
            }
            TypeDescriptor::Array(inner) => format!("{}[]", self.bare_name(inner)),
        }
    }

    fn bare_base(&self, ty: &NamedType) -> String {
        match self.resolve_base(&ty.name, ty.arity) {
            Ok(found) if found == *ty => ty.name.clone(),
            _ => ty.full_name(),
        }
    }

    fn resolve_base(&self, name: &str, arity: usize) -> Result<NamedType, ResolveError> {
        if let Some(t) = builtin(name, arity) {
            return Ok(t);
        }
        if let Some(t) = self.by_simple_name(name, arity)? {
            return Ok(t);
        }
        if let Some(t) = self.by_full_name(name, arity) {
            return Ok(t);
        }
        if let Some(t) = self.in_local_module(name, arity) {
            return Ok(t);
        }
        if let Some(t) = self.in_referenced_modules(name, arity) {
            return Ok(t);
        }
        if let Some(t) = self.from_fallback(name, arity) {
            return Ok(t);
        }
        Err(ResolveError::Unresolved(name.to_string()))
    }

    fn by_simple_name(&self, name: &str, arity: usize) -> Result<Option<NamedType>, ResolveError> {
        let matches: Vec<&NamedType> = self
            .entries
            .iter()
            .filter(|t| t.name == name && t.arity == arity)
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some((*one).clone())),
            many => Err(ResolveError::Ambiguous {
                name: name.to_string(),
                candidates: many.iter().map(|t| t.full_name()).collect(),
            }),
        }
    }

    fn by_full_name(&self, name: &str, arity: usize) -> Option<NamedType> {
        self.entries
            .iter()
            .find(|t| t.arity == arity && t.full_name() == name)
            .cloned()
    }

    fn in_local_module(&self, name: &str, arity: usize) -> Option<NamedType> {
        find_in(self.modules.get(&self.local_module)?, name, arity)
    }

    fn in_referenced_modules(&self, name: &str, arity: usize) -> Option<NamedType> {
        let mut seen: Vec<&str> = Vec::new();
        for entry in &self.entries {
            let module = entry.module.as_str();
            if module == self.local_module || seen.contains(&module) {
                continue;
            }
            seen.push(module);
            if let Some(t) = self.modules.get(module).and_then(|types| find_in(types, name, arity)) {
                return Some(t);
            }
        }
        None
    }

    fn from_fallback(&self, name: &str, arity: usize) -> Option<NamedType> {
        let t = (self.fallback.as_ref()?)(name, arity)?;
        (t.arity == arity).then_some(t)
    }
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin(name: &str, arity: usize) -> Option<NamedType> {
    let simple = name
        .strip_prefix(BUILTIN_NAMESPACE)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name);
    BUILTINS
        .iter()
        .find(|(n, a)| *n == simple && *a == arity)
        .map(|(n, a)| NamedType::generic(BUILTIN_MODULE, BUILTIN_NAMESPACE, *n, *a))
}

fn find_in(types: &[NamedType], name: &str, arity: usize) -> Option<NamedType> {
    types
        .iter()
        .find(|t| t.arity == arity && t.answers_to(name))
        .cloned()
}

/// A type name split into its parts.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedName<'a> {
    pub base: &'a str,
    pub arguments: Vec<&'a str>,
    pub array_depth: usize,
}

/// Split `name` into base name, top-level generic arguments and array depth.
pub(crate) fn parse_type_name(name: &str) -> Result<ParsedName<'_>, ResolveError> {
    let malformed = |reason: &str| ResolveError::Malformed {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = name.trim();
    let mut array_depth = 0;
    while let Some(stripped) = rest.strip_suffix("[]") {
        rest = stripped.trim_end();
        array_depth += 1;
    }

    let mut arguments = Vec::new();
    if let Some(body) = rest.strip_suffix(']') {
        let open = matching_open(body).ok_or_else(|| malformed("unbalanced brackets"))?;
        let inner = &body[open + 1..];
        for arg in split_top_level(inner) {
            let arg = arg.trim();
            if arg.is_empty() {
                return Err(malformed("empty generic argument"));
            }
            arguments.push(arg);
        }
        rest = body[..open].trim_end();
    }

    if rest.is_empty() {
        return Err(malformed("empty type name"));
    }
    if rest.contains(['[', ']', ',']) {
        return Err(malformed("unbalanced brackets"));
    }
    Ok(ParsedName {
        base: rest,
        arguments,
        array_depth,
    })
}

/// Index of the `[` matching a `]` just past the end of `body`.
fn matching_open(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices().rev() {
        match c {
            ']' => depth += 1,
            '[' if depth == 0 => return Some(i),
            '[' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Split on commas that are not nested inside brackets.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}
