//! Text-level type reference handling shared by the language walkers.
//!
//! No type resolution happens here: a type reference is split into
//! identifier tokens, the first one is the outer type and the rest are
//! treated as generic arguments.

use once_cell::sync::Lazy;
use regex::Regex;

static TYPE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_.]*").unwrap());

/// Languages with their own built-in type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSystem {
    CSharp,
    VisualBasic,
    TypeScript,
    Python,
    Dart,
}

const CSHARP_PRIMITIVES: &[&str] = &[
    "bool", "byte", "sbyte", "char", "decimal", "double", "float", "int", "uint", "nint",
    "nuint", "long", "ulong", "short", "ushort", "object", "string", "void", "dynamic", "var",
    "String", "Int16", "Int32", "Int64", "UInt32", "UInt64", "Boolean", "Object", "Double",
    "Single", "Decimal", "Byte", "Char",
];

const VB_PRIMITIVES: &[&str] = &[
    "Boolean", "Byte", "Char", "Date", "Decimal", "Double", "Integer", "Long", "Object",
    "SByte", "Short", "Single", "String", "UInteger", "ULong", "UShort",
    // generic argument keyword: `List(Of Order)`
    "Of",
];

const TYPESCRIPT_PRIMITIVES: &[&str] = &[
    "string", "number", "boolean", "any", "unknown", "void", "never", "undefined", "null",
    "object", "bigint", "symbol", "String", "Number", "Boolean", "Object",
    // type operators that tokenize like names
    "keyof", "typeof", "readonly", "infer", "extends", "is", "asserts", "unique",
];

const PYTHON_PRIMITIVES: &[&str] = &[
    "int", "str", "float", "bool", "bytes", "bytearray", "complex", "None", "object", "list",
    "dict", "set", "frozenset", "tuple", "type", "Any", "Optional", "Union", "List", "Dict",
    "Set", "Tuple", "Type", "Callable", "Iterable", "Iterator", "Sequence", "Mapping",
    "Literal", "Self",
];

const DART_PRIMITIVES: &[&str] = &[
    "int", "double", "num", "String", "bool", "dynamic", "void", "Object", "Null", "Never",
    "var", "final", "const", "late", "required",
];

impl TypeSystem {
    fn primitives(self) -> &'static [&'static str] {
        match self {
            Self::CSharp => CSHARP_PRIMITIVES,
            Self::VisualBasic => VB_PRIMITIVES,
            Self::TypeScript => TYPESCRIPT_PRIMITIVES,
            Self::Python => PYTHON_PRIMITIVES,
            Self::Dart => DART_PRIMITIVES,
        }
    }

    /// Whether `name` (possibly namespace-qualified) is a built-in type.
    pub fn is_primitive(self, name: &str) -> bool {
        let last = name.rsplit('.').next().unwrap_or(name);
        if self == Self::VisualBasic {
            return self
                .primitives()
                .iter()
                .any(|p| p.eq_ignore_ascii_case(last));
        }
        self.primitives().contains(&last)
    }
}

/// A type reference split into its outer type and generic arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRef {
    /// Outer type, `None` when it is a built-in.
    pub outer: Option<String>,
    /// Non-built-in generic arguments, in order of appearance.
    pub generic_args: Vec<String>,
}

/// Split a type reference like `Task<IList<Order>>` into its parts.
pub fn split_type(text: &str, types: TypeSystem) -> TypeRef {
    let mut tokens = TYPE_TOKEN
        .find_iter(text)
        .map(|m| m.as_str().trim_matches('.'))
        .filter(|t| !t.is_empty());

    let outer = tokens
        .next()
        .filter(|t| !types.is_primitive(t))
        .map(str::to_string);

    let mut generic_args: Vec<String> = Vec::new();
    for token in tokens {
        if types.is_primitive(token) || generic_args.iter().any(|g| g == token) {
            continue;
        }
        generic_args.push(token.to_string());
    }

    TypeRef {
        outer,
        generic_args,
    }
}

/// Leading `I` followed by an uppercase letter, e.g. `IOrderService`.
pub fn is_interface_name(name: &str) -> bool {
    let last = name.rsplit('.').next().unwrap_or(name);
    let mut chars = last.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('I'), Some(c)) if c.is_ascii_uppercase()
    )
}

/// Strip generic arguments: `Repository<Order>` -> `Repository`.
pub fn base_name(name: &str) -> &str {
    name.split(['<', '[', '('])
        .next()
        .unwrap_or(name)
        .trim()
}
