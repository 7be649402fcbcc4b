//! The two parallel type projections: the managed surface type user code
//! sees and the ABI-level wire type P/Invoke sees, plus the C spelling used
//! by the bridge.

use crate::CSharpGen;
use gobind_model::{Const, ConstValue, NamedDecl, NamedRef, Param, Type};
use std::fmt::Write;

impl CSharpGen<'_> {
    /// The managed surface type. `*T` projects like `T`; named types are
    /// namespace-qualified when they live in another bound package.
    pub(crate) fn cs_type(&mut self, ty: &Type) -> String {
        match ty {
            Type::Bool => "bool".to_string(),
            // Go int is 64-bit on the supported targets.
            Type::Int | Type::Int64 => "long".to_string(),
            Type::Int8 => "sbyte".to_string(),
            Type::Int16 => "short".to_string(),
            Type::Int32 => "int".to_string(),
            Type::Uint8 => "byte".to_string(),
            Type::Float32 => "float".to_string(),
            Type::Float64 => "double".to_string(),
            Type::String => "string".to_string(),
            Type::Bytes => "byte[]".to_string(),
            Type::Error => "Error".to_string(),
            Type::Pointer(named) | Type::Named(named) => self.named_qualified_name(named),
            Type::Unsupported(repr) => {
                self.diag.error(format!("unsupported type: {repr}"));
                "object".to_string()
            }
        }
    }

    /// The wire type. Reference types collapse to a refnum.
    pub(crate) fn cs_native_type(&mut self, ty: &Type) -> String {
        match ty {
            Type::Bool => "byte".to_string(),
            Type::Int | Type::Int64 => "long".to_string(),
            Type::Int8 => "sbyte".to_string(),
            Type::Int16 => "short".to_string(),
            Type::Int32 => "int".to_string(),
            Type::Uint8 => "byte".to_string(),
            Type::Float32 => "float".to_string(),
            Type::Float64 => "double".to_string(),
            Type::String => "NString".to_string(),
            Type::Bytes => "NByteslice".to_string(),
            Type::Error | Type::Pointer(_) | Type::Named(_) => "int".to_string(),
            Type::Unsupported(repr) => {
                self.diag.error(format!("unsupported type: {repr}"));
                "int".to_string()
            }
        }
    }

    /// The C spelling of a wire type, as seen by the bridge and header.
    pub(crate) fn cgo_type(&mut self, ty: &Type) -> String {
        match ty {
            Type::Bool | Type::Uint8 => "uint8_t".to_string(),
            Type::Int | Type::Int64 => "int64_t".to_string(),
            Type::Int8 => "int8_t".to_string(),
            Type::Int16 => "int16_t".to_string(),
            Type::Int32 => "int32_t".to_string(),
            Type::Float32 => "float".to_string(),
            Type::Float64 => "double".to_string(),
            Type::String => "nstring".to_string(),
            Type::Bytes => "nbyteslice".to_string(),
            Type::Error | Type::Pointer(_) | Type::Named(_) => "int32_t".to_string(),
            Type::Unsupported(repr) => {
                self.diag.error(format!("unsupported type: {repr}"));
                "int32_t".to_string()
            }
        }
    }

    /// The wire value a callback returns when an exception left it with
    /// nothing to marshal.
    pub(crate) fn default_native_return(&self, root: &str, ty: &Type) -> String {
        match ty {
            Type::String => "new NString()".to_string(),
            Type::Bytes => "new NByteslice()".to_string(),
            Type::Error | Type::Pointer(_) | Type::Named(_) => format!("{root}.Seq.NullRefNum"),
            _ => "0".to_string(),
        }
    }

    /// Renders a constant as a C# literal preserving value and type, or
    /// `None` when the constant kind cannot be projected.
    pub(crate) fn const_literal(&mut self, c: &Const) -> Option<String> {
        match (&c.ty, &c.value) {
            (Type::Bool, ConstValue::Bool(b)) => Some(b.to_string()),
            (Type::String, ConstValue::String(s)) => Some(quoted(s)),
            (Type::Float32, ConstValue::Float(f)) => Some(format!("{}f", *f as f32)),
            (Type::Float32, ConstValue::Int(i)) => Some(format!("{}f", *i as f32)),
            (Type::Float64, ConstValue::Float(f)) => Some(f.to_string()),
            (Type::Float64, ConstValue::Int(i)) => Some((*i as f64).to_string()),
            (Type::Int | Type::Int64, ConstValue::Int(i)) => Some(format!("{i}L")),
            (Type::Int8 | Type::Int16 | Type::Int32 | Type::Uint8, ConstValue::Int(i)) => {
                Some(format!("({}){i}", self.cs_type(&c.ty)))
            }
            _ => None,
        }
    }
}

fn quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32).unwrap(),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Whether values of this type cross the boundary as a refnum naming a live
/// object, which must be destroyed if an error path drops it.
pub(crate) fn is_refnum_type(ty: &Type) -> bool {
    matches!(ty, Type::Error | Type::Pointer(_) | Type::Named(_))
}

/// Reports whether the generators can bind a function as a constructor.
/// Single `int32` signatures are excluded: they clash with the proxy
/// constructor that takes a refnum. (Go `uint32` never reaches this check;
/// it is not a supported type.)
pub(crate) fn is_cons_sig_clash(params: &[Param]) -> bool {
    params.len() == 1 && matches!(params[0].ty, Type::Int32)
}

impl CSharpGen<'_> {
    /// Whether a managed value of this type needs callback registration
    /// before it crosses into Go, and emits the `EnsureRegistered` call if
    /// so.
    pub(crate) fn emit_ensure_registered_for(&mut self, root: &str, ty: &Type) {
        match ty {
            Type::Error => {
                gobind_core::uwriteln!(self.cs, "{root}.ProxyError.EnsureRegistered();");
            }
            Type::Pointer(named) | Type::Named(named) => {
                if let Some(NamedDecl::Interface(_, iface)) = self.resolve.named_decl(named) {
                    if iface.implementable() {
                        let proxy = self.interface_proxy_qualified_name(named);
                        gobind_core::uwriteln!(self.cs, "{proxy}.EnsureRegistered();");
                    }
                }
            }
            _ => {}
        }
    }

    /// Whether a named reference is an interface type, and its proxy name.
    pub(crate) fn named_is_interface(&self, named: &NamedRef) -> bool {
        matches!(
            self.resolve.named_decl(named),
            Some(NamedDecl::Interface(..))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{universe_interfaces, Opts};
    use gobind_core::{Diagnostics, Source};
    use gobind_model::Resolve;
    use pretty_assertions::assert_eq;

    fn with_gen<R>(f: impl FnOnce(&mut CSharpGen<'_>) -> R) -> R {
        let opts = Opts::default();
        let resolve = Resolve::default();
        let mut gen = CSharpGen {
            opts: &opts,
            resolve: &resolve,
            pkg: None,
            universe: universe_interfaces(),
            cs: Source::default(),
            diag: Diagnostics::default(),
        };
        f(&mut gen)
    }

    #[test]
    fn surface_mapping() {
        with_gen(|gen| {
            for (ty, want) in [
                (Type::Bool, "bool"),
                (Type::Int, "long"),
                (Type::Int8, "sbyte"),
                (Type::Int16, "short"),
                (Type::Int32, "int"),
                (Type::Int64, "long"),
                (Type::Uint8, "byte"),
                (Type::Float32, "float"),
                (Type::Float64, "double"),
                (Type::String, "string"),
                (Type::Bytes, "byte[]"),
                (Type::Error, "Error"),
            ] {
                assert_eq!(gen.cs_type(&ty), want);
            }
        });
    }

    #[test]
    fn wire_mapping() {
        with_gen(|gen| {
            for (ty, want) in [
                (Type::Bool, "byte"),
                (Type::Int, "long"),
                (Type::Int32, "int"),
                (Type::Uint8, "byte"),
                (Type::String, "NString"),
                (Type::Bytes, "NByteslice"),
                (Type::Error, "int"),
            ] {
                assert_eq!(gen.cs_native_type(&ty), want);
            }
        });
    }

    #[test]
    fn c_mapping() {
        with_gen(|gen| {
            assert_eq!(gen.cgo_type(&Type::Bool), "uint8_t");
            assert_eq!(gen.cgo_type(&Type::Int), "int64_t");
            assert_eq!(gen.cgo_type(&Type::String), "nstring");
            assert_eq!(gen.cgo_type(&Type::Bytes), "nbyteslice");
            assert_eq!(gen.cgo_type(&Type::Error), "int32_t");
        });
    }

    #[test]
    fn const_literals() {
        with_gen(|gen| {
            let mut lit = |ty, value| {
                gen.const_literal(&Const {
                    name: "C".to_string(),
                    ty,
                    value,
                })
            };
            assert_eq!(lit(Type::Bool, ConstValue::Bool(true)).unwrap(), "true");
            assert_eq!(lit(Type::Int, ConstValue::Int(7)).unwrap(), "7L");
            assert_eq!(lit(Type::Int8, ConstValue::Int(-3)).unwrap(), "(sbyte)-3");
            assert_eq!(lit(Type::Float32, ConstValue::Float(1.5)).unwrap(), "1.5f");
            assert_eq!(lit(Type::Float64, ConstValue::Int(2)).unwrap(), "2");
            assert_eq!(
                lit(Type::String, ConstValue::String("a\"b\n".to_string())).unwrap(),
                "\"a\\\"b\\n\""
            );
            assert_eq!(lit(Type::Bytes, ConstValue::Int(0)), None);
        });
    }

    #[test]
    fn constructor_clash() {
        let int32_param = [Param {
            name: "n".to_string(),
            ty: Type::Int32,
        }];
        let int64_param = [Param {
            name: "n".to_string(),
            ty: Type::Int64,
        }];
        assert!(is_cons_sig_clash(&int32_param));
        assert!(!is_cons_sig_clash(&int64_param));
        assert!(!is_cons_sig_clash(&[]));
    }
}
