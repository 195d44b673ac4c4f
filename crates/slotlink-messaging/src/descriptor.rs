//! Type descriptors for message payloads.
//!
//! A payload type is identified by its defining module, namespace and
//! simple name, independent of the binary that defines it. Generic types
//! carry their definition plus resolved arguments; arrays wrap an element
//! type.

use std::fmt;

/// Module that owns the built-in types.
pub const BUILTIN_MODULE: &str = "builtin";

/// Namespace of the built-in types.
pub const BUILTIN_NAMESPACE: &str = "std";

/// Built-in type names and their generic arity.
pub(crate) const BUILTINS: &[(&str, usize)] = &[
    ("string", 0),
    ("bool", 0),
    ("int", 0),
    ("long", 0),
    ("double", 0),
    ("guid", 0),
    ("datetime", 0),
    ("List", 1),
    ("Dictionary", 2),
    ("HashSet", 1),
];

/// A named (possibly generic) type definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamedType {
    /// Defining module.
    pub module: String,
    /// Dotted namespace, may be empty.
    pub namespace: String,
    /// Simple name, without generic arguments.
    pub name: String,
    /// Number of generic parameters.
    pub arity: usize,
}

impl NamedType {
    /// A non-generic type.
    pub fn new(
        module: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::generic(module, namespace, name, 0)
    }

    /// A generic type definition with `arity` parameters.
    pub fn generic(
        module: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        arity: usize,
    ) -> Self {
        Self {
            module: module.into(),
            namespace: namespace.into(),
            name: name.into(),
            arity,
        }
    }

    /// The built-in type called `name`, if there is one.
    pub fn builtin(name: &str) -> Option<Self> {
        BUILTINS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(n, arity)| Self::generic(BUILTIN_MODULE, BUILTIN_NAMESPACE, *n, *arity))
    }

    /// `namespace.name`, or just `name` without a namespace.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Whether this is one of the built-in types.
    pub fn is_builtin(&self) -> bool {
        self.module == BUILTIN_MODULE
    }

    /// Whether `name` refers to this type by simple or full name.
    pub(crate) fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.full_name() == name
    }
}

/// A fully resolved payload type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// A non-generic named type.
    Named(NamedType),
    /// A closed generic type.
    Generic {
        /// The generic definition.
        definition: NamedType,
        /// Type arguments, in order.
        arguments: Vec<TypeDescriptor>,
    },
    /// An array of the inner type.
    Array(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Built-in non-generic type.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a built-in type.
    pub fn builtin(name: &str) -> Self {
        match NamedType::builtin(name) {
            Some(t) => Self::Named(t),
            None => panic!("unknown built-in type '{name}'"),
        }
    }

    /// Built-in generic type closed over `arguments`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a built-in type.
    pub fn builtin_generic(name: &str, arguments: Vec<TypeDescriptor>) -> Self {
        match NamedType::builtin(name) {
            Some(definition) => Self::Generic {
                definition,
                arguments,
            },
            None => panic!("unknown built-in type '{name}'"),
        }
    }

    /// Array of `self`.
    #[must_use]
    pub fn array_of(self) -> Self {
        Self::Array(Box::new(self))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(t) => write!(f, "{}", t.full_name()),
            Self::Generic {
                definition,
                arguments,
            } => {
                write!(f, "{}[", definition.full_name())?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "]")
            }
            Self::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_without_namespace() {
        assert_eq!(NamedType::new("m", "", "Ping").full_name(), "Ping");
        assert_eq!(NamedType::new("m", "a.b", "Ping").full_name(), "a.b.Ping");
    }

    #[test]
    fn builtin_lookup() {
        let list = NamedType::builtin("List").unwrap();
        assert_eq!(list.arity, 1);
        assert!(list.is_builtin());
        assert!(NamedType::builtin("Order").is_none());
    }

    #[test]
    fn display_renders_nested_generics_and_arrays() {
        let ty = TypeDescriptor::builtin_generic(
            "Dictionary",
            vec![
                TypeDescriptor::builtin("string"),
                TypeDescriptor::builtin("int").array_of(),
            ],
        );
        assert_eq!(ty.to_string(), "std.Dictionary[std.string,std.int[]]");
    }
}
