//! Model of the exported surface of a set of Go packages under binding.
//!
//! The driver exports the public surface of each package it compiles
//! (constants, variables, functions, named struct and interface types) as a
//! JSON description; this crate deserializes that description and answers
//! the resolution and supportedness questions the backends ask. Types the
//! bridge cannot carry arrive as [`Type::Unsupported`] with their Go
//! spelling, so a backend can name them in diagnostics.

use serde::Deserialize;

/// The complete surface handed to one generator run.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Resolve {
    #[serde(default)]
    pub packages: Vec<Package>,
}

/// One Go package under binding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Package {
    /// Package name, e.g. `counter`.
    pub name: String,
    /// Import path, e.g. `example.org/demo/counter`.
    pub path: String,
    #[serde(default)]
    pub consts: Vec<Const>,
    #[serde(default)]
    pub vars: Vec<Var>,
    #[serde(default)]
    pub funcs: Vec<Func>,
    #[serde(default)]
    pub structs: Vec<Struct>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

/// A Go type as it appears in an exported signature, field, constant or
/// variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Type {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Float32,
    Float64,
    String,
    /// `[]uint8`
    Bytes,
    /// The universe `error` interface.
    Error,
    /// `*T` for a named type `T`.
    Pointer(NamedRef),
    /// A named type whose underlying type is a struct or an interface.
    Named(NamedRef),
    /// Anything else, carrying the Go spelling for diagnostics.
    Unsupported(String),
}

/// Reference to a named type declared in one of the bound packages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct NamedRef {
    pub package: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Const {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    pub value: ConstValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Var {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

/// An exported function or method. Methods carry their receiver implicitly
/// through the [`Struct`] or [`Interface`] that owns them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Func {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub results: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Param {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

/// An exported named type whose underlying type is a struct. Methods are
/// the exported method set of `*T`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Struct {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub methods: Vec<Func>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

/// An exported named interface type. `methods` is the exported (callable)
/// method set, projected across the boundary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<Func>,
    /// Set when the Go interface has unexported methods. Such an interface
    /// can be called from the managed side but not implemented by it.
    #[serde(default)]
    pub has_unexported_methods: bool,
}

impl Interface {
    /// Whether managed code may implement this interface and hand the
    /// implementation back to Go.
    pub fn implementable(&self) -> bool {
        !self.has_unexported_methods
    }
}

/// What a [`NamedRef`] resolved to, paired with its declaring package.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NamedDecl<'a> {
    Struct(&'a Package, &'a Struct),
    Interface(&'a Package, &'a Interface),
}

impl Resolve {
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Looks a named reference up across the bound packages.
    pub fn named_decl(&self, named: &NamedRef) -> Option<NamedDecl<'_>> {
        let pkg = self.package(&named.package)?;
        if let Some(s) = pkg.structs.iter().find(|s| s.name == named.name) {
            return Some(NamedDecl::Struct(pkg, s));
        }
        if let Some(i) = pkg.interfaces.iter().find(|i| i.name == named.name) {
            return Some(NamedDecl::Interface(pkg, i));
        }
        None
    }

    /// Whether a value of this type can cross the boundary at all. Named
    /// references must resolve to a bound declaration; anything the exporter
    /// folded into [`Type::Unsupported`] cannot cross.
    pub fn is_supported(&self, ty: &Type) -> bool {
        match ty {
            Type::Unsupported(_) => false,
            Type::Pointer(named) | Type::Named(named) => self.named_decl(named).is_some(),
            _ => true,
        }
    }

    /// Whether every type a signature mentions is supported. Unsupported
    /// signatures suppress the member that carries them.
    pub fn is_sig_supported(&self, func: &Func) -> bool {
        func.params.iter().all(|p| self.is_supported(&p.ty))
            && func.results.iter().all(|ty| self.is_supported(ty))
    }
}
