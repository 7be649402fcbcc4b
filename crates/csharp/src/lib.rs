//! C# backend: projects the exported surface of Go packages into a managed
//! module plus the C bridge carrying calls and object references across the
//! boundary.
//!
//! Each pass emits three coordinated artifacts: a C# source with proxy
//! classes and marshaling glue, a C header declaring the callback
//! dispatchers, and a C source defining them. The root pass (no package)
//! additionally emits the one-per-program reference runtime, the shared
//! wire structs and the universe `error` surface.

use anyhow::Result;
use gobind_core::{
    generated_preamble, uwrite, uwriteln, Diagnostics, Files, PackageGenerator, Source,
};
use gobind_model::{Func, Interface, NamedRef, Package, Resolve, Type};
use indexmap::IndexMap;
use std::fmt::Write;

mod bridge;
mod callable;
mod ident;
mod proxy;
mod runtime;
mod types;

use ident::{cs_ident, cs_namespace_component};

#[derive(Default, Debug, Clone)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct Opts {
    /// Fallback for the namespace root when `--namespace` is not set.
    #[cfg_attr(feature = "clap", arg(long))]
    pub cs_package: Option<String>,

    /// Root namespace of the generated code. When set, every bound package
    /// shares it instead of getting a `<Root>.<Package>` namespace.
    #[cfg_attr(feature = "clap", arg(long))]
    pub namespace: Option<String>,

    /// Overrides the name of the package static class.
    #[cfg_attr(feature = "clap", arg(long))]
    pub package_class: Option<String>,

    /// Name of the native shared library loaded through P/Invoke.
    #[cfg_attr(feature = "clap", arg(long))]
    pub library_name: Option<String>,
}

impl Opts {
    pub fn build(&self) -> Box<dyn PackageGenerator> {
        Box::new(CSharp { opts: self.clone() })
    }
}

#[derive(Default)]
struct CSharp {
    opts: Opts,
}

impl PackageGenerator for CSharp {
    fn generate(&mut self, resolve: &Resolve, pkg: Option<&str>, files: &mut Files) -> Result<()> {
        let pkg = match pkg {
            Some(name) => Some(
                resolve
                    .package(name)
                    .ok_or_else(|| anyhow::anyhow!("no package named `{name}` in the surface"))?,
            ),
            None => None,
        };
        let mut gen = CSharpGen {
            opts: &self.opts,
            resolve,
            pkg,
            universe: universe_interfaces(),
            cs: Source::default(),
            diag: Diagnostics::default(),
        };
        gen.generate(files)
    }
}

/// The surface the root pass binds: the universe `error` interface, whose
/// callable set is `Error() string`.
fn universe_interfaces() -> Vec<Interface> {
    vec![Interface {
        name: "error".to_string(),
        methods: vec![Func {
            name: "Error".to_string(),
            params: Vec::new(),
            results: vec![Type::String],
        }],
        has_unexported_methods: false,
    }]
}

pub(crate) struct CSharpGen<'a> {
    pub(crate) opts: &'a Opts,
    pub(crate) resolve: &'a Resolve,
    pub(crate) pkg: Option<&'a Package>,
    pub(crate) universe: Vec<Interface>,
    pub(crate) cs: Source,
    pub(crate) diag: Diagnostics,
}

impl<'a> CSharpGen<'a> {
    fn generate(&mut self, files: &mut Files) -> Result<()> {
        self.gen_cs();
        let header = self.gen_h();
        let c_src = self.gen_c();

        let stem = self.stem().to_string();
        files.push(&format!("{stem}.cs"), std::mem::take(&mut self.cs).as_bytes());
        files.push(&format!("{stem}_windows.h"), header.as_bytes());
        files.push(&format!("{stem}_windows.c"), c_src.as_bytes());
        if self.pkg.is_none() {
            files.push("seq.h", bridge::SEQ_H.as_bytes());
        }
        self.diag.report()
    }

    // Accessors returning the surface of the current pass. The root pass
    // has no package members; its interface list is the universe surface.

    pub(crate) fn funcs(&self) -> &'a [Func] {
        self.pkg.map_or(&[], |p| &p.funcs)
    }

    pub(crate) fn structs(&self) -> &'a [gobind_model::Struct] {
        self.pkg.map_or(&[], |p| &p.structs)
    }

    pub(crate) fn interfaces(&self) -> &[Interface] {
        match self.pkg {
            Some(p) => &p.interfaces,
            None => &self.universe,
        }
    }

    /// Prefix of every C symbol minted for this pass; empty for the root.
    pub(crate) fn pkg_prefix(&self) -> &str {
        self.pkg.map_or("", |p| p.name.as_str())
    }

    fn stem(&self) -> &str {
        self.pkg.map_or("universe", |p| p.name.as_str())
    }

    pub(crate) fn pkg_path(&self) -> &str {
        self.pkg.map_or("", |p| p.path.as_str())
    }

    /// Echo of the options that produced this output, recorded in the
    /// generated preambles.
    pub(crate) fn invocation_opts(&self) -> String {
        let mut opts = Vec::new();
        if let Some(v) = &self.opts.cs_package {
            opts.push(format!("--cs-package={v}"));
        }
        if let Some(v) = &self.opts.namespace {
            opts.push(format!("--namespace={v}"));
        }
        if let Some(v) = &self.opts.package_class {
            opts.push(format!("--package-class={v}"));
        }
        if let Some(v) = &self.opts.library_name {
            opts.push(format!("--library-name={v}"));
        }
        opts.join(" ")
    }

    // Namespaces and type names.

    pub(crate) fn root_namespace(&self) -> String {
        let root = self
            .opts
            .namespace
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.opts.cs_package.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("Go");
        root.split('.')
            .map(cs_ident)
            .collect::<Vec<_>>()
            .join(".")
    }

    pub(crate) fn cs_namespace(&self, pkg: Option<&Package>) -> String {
        let root = self.root_namespace();
        match pkg {
            None => root,
            // A pinned namespace flattens every package into the root.
            Some(_) if self.opts.namespace.is_some() => root,
            Some(p) => format!("{root}.{}", cs_namespace_component(&p.name)),
        }
    }

    pub(crate) fn package_class_name(&self) -> String {
        match self.pkg {
            None => "Universe".to_string(),
            Some(p) => match &self.opts.package_class {
                Some(name) => cs_ident(name),
                None => cs_namespace_component(&p.name),
            },
        }
    }

    /// The user-visible name of an interface. The universe `error` projects
    /// to `Error`.
    pub(crate) fn interface_name(&self, iface: &Interface) -> String {
        if self.pkg.is_none() && iface.name == "error" {
            "Error".to_string()
        } else {
            cs_ident(&iface.name)
        }
    }

    pub(crate) fn proxy_interface_name(&self, iface: &Interface) -> String {
        if self.pkg.is_none() && iface.name == "error" {
            "ProxyError".to_string()
        } else {
            cs_ident(&format!("Proxy{}", iface.name))
        }
    }

    fn is_current_package(&self, name: &str) -> bool {
        self.pkg.map_or(false, |p| p.name == name)
    }

    /// Surface name of a named type, namespace-qualified when it lives in
    /// another bound package.
    pub(crate) fn named_qualified_name(&mut self, named: &NamedRef) -> String {
        let name = cs_ident(&named.name);
        if self.is_current_package(&named.package) {
            return name;
        }
        match self.resolve.package(&named.package) {
            Some(pkg) => format!("{}.{name}", self.cs_namespace(Some(pkg))),
            None => {
                self.diag.error(format!(
                    "type {}.{} is not bound",
                    named.package, named.name
                ));
                name
            }
        }
    }

    /// Name of the proxy class backing an interface-typed reference,
    /// qualified like [`Self::named_qualified_name`].
    pub(crate) fn interface_proxy_qualified_name(&mut self, named: &NamedRef) -> String {
        let proxy = cs_ident(&format!("Proxy{}", named.name));
        if self.is_current_package(&named.package) {
            return proxy;
        }
        match self.resolve.package(&named.package) {
            Some(pkg) => format!("{}.{proxy}", self.cs_namespace(Some(pkg))),
            None => {
                self.diag.error(format!(
                    "type {}.{} is not bound",
                    named.package, named.name
                ));
                proxy
            }
        }
    }

    // C symbol names, deterministic from the Go names.

    pub(crate) fn proxy_func_name(&self, obj_name: &str, func_name: &str) -> String {
        format!("proxy{}_{obj_name}_{func_name}", self.pkg_prefix())
    }

    pub(crate) fn cproxy_name(&self, iface_name: &str, method_name: &str) -> String {
        format!("cproxy{}_{iface_name}_{method_name}", self.pkg_prefix())
    }

    pub(crate) fn cproxy_setter_name(&self, iface_name: &str, method_name: &str) -> String {
        format!("go_seq_set_{}", self.cproxy_name(iface_name, method_name))
    }

    pub(crate) fn return_struct_name(&self, c_name: &str) -> String {
        cs_ident(&format!("CProxy_{c_name}_Return"))
    }

    /// The Go-side allocator symbol backing the emitted default
    /// constructor. The Go-side generator owns emitting it.
    pub(crate) fn new_func_name(&self, struct_name: &str) -> Option<String> {
        self.pkg.map(|p| format!("new_{}_{struct_name}", p.name))
    }

    pub(crate) fn library_name(&self) -> &str {
        self.opts.library_name.as_deref().unwrap_or("gojni")
    }

    /// Describes why a type cannot cross the boundary, if it cannot.
    pub(crate) fn describe_unsupported(&self, ty: &Type) -> Option<String> {
        match ty {
            Type::Unsupported(repr) => Some(repr.clone()),
            Type::Pointer(named) | Type::Named(named)
                if self.resolve.named_decl(named).is_none() =>
            {
                Some(format!("{}.{} (not bound)", named.package, named.name))
            }
            _ => None,
        }
    }

    /// Checks a signature and records a skip warning naming the first
    /// unsupported type. Returns whether the member should be emitted.
    pub(crate) fn check_sig_supported(&mut self, owner: &str, f: &Func) -> bool {
        let offender = f
            .params
            .iter()
            .map(|p| &p.ty)
            .chain(f.results.iter())
            .find_map(|ty| self.describe_unsupported(ty));
        match offender {
            Some(repr) => {
                self.diag
                    .warn(format!("skipping {owner}{}: unsupported type {repr}", f.name));
                false
            }
            None => true,
        }
    }

    // Managed source assembly.

    fn gen_cs(&mut self) {
        generated_preamble(&mut self.cs, env!("CARGO_PKG_VERSION"));
        uwriteln!(self.cs, "// C# bindings for Go.");
        uwriteln!(self.cs, "//");
        let invocation_opts = self.invocation_opts();
        let pkg_path = self.pkg_path().to_string();
        uwriteln!(
            self.cs,
            "//   autogenerated by gobind-cs {} {}",
            invocation_opts,
            pkg_path
        );
        uwriteln!(self.cs, "");
        uwriteln!(self.cs, "using System;");
        uwriteln!(self.cs, "using System.Collections.Concurrent;");
        uwriteln!(self.cs, "using System.Collections.Generic;");
        uwriteln!(self.cs, "using System.Runtime.InteropServices;");
        uwriteln!(self.cs, "using System.Text;");
        uwriteln!(self.cs, "");

        let root = self.root_namespace();
        uwriteln!(self.cs, "namespace {root} {{");
        self.emit_shared_native_structs();
        let shapes = self.collect_return_structs();
        self.emit_return_structs(&shapes);
        self.emit_native_class();
        if self.pkg.is_none() {
            self.emit_seq_support();
        }
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");

        let pkg_ns = self.cs_namespace(self.pkg);
        uwriteln!(self.cs, "namespace {pkg_ns} {{");
        self.emit_package_class(&root);
        for s in self.structs() {
            self.emit_struct_class(&root, s);
        }
        for iface in self.interfaces().to_vec() {
            self.emit_interface(&root, &iface);
        }
        uwriteln!(self.cs, "}}");
    }

    /// The wire structs are shared by every pass and therefore emitted only
    /// once, by the root.
    fn emit_shared_native_structs(&mut self) {
        if self.pkg.is_some() {
            return;
        }
        uwriteln!(self.cs, "[StructLayout(LayoutKind.Sequential)]");
        uwriteln!(self.cs, "internal struct NString {{");
        uwriteln!(self.cs, "public IntPtr ptr;");
        uwriteln!(self.cs, "public int len;");
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
        uwriteln!(self.cs, "[StructLayout(LayoutKind.Sequential)]");
        uwriteln!(self.cs, "internal struct NByteslice {{");
        uwriteln!(self.cs, "public IntPtr ptr;");
        uwriteln!(self.cs, "public int len;");
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }

    /// First pass over every supported signature: one wire record per
    /// distinct canonical C name with more than one result.
    fn collect_return_structs(&mut self) -> IndexMap<String, Vec<Type>> {
        let mut shapes: IndexMap<String, Vec<Type>> = IndexMap::new();
        let mut collect = |shapes: &mut IndexMap<String, Vec<Type>>, c_name: String, f: &Func| {
            if f.results.len() > 1 {
                shapes.entry(c_name).or_insert_with(|| f.results.clone());
            }
        };
        for f in self.funcs() {
            if !self.resolve.is_sig_supported(f) {
                continue;
            }
            collect(&mut shapes, self.proxy_func_name("", &f.name), f);
        }
        for s in self.structs() {
            for m in &s.methods {
                if !self.resolve.is_sig_supported(m) {
                    continue;
                }
                collect(&mut shapes, self.proxy_func_name(&s.name, &m.name), m);
            }
        }
        for iface in self.interfaces() {
            for m in &iface.methods {
                if !self.resolve.is_sig_supported(m) {
                    continue;
                }
                collect(&mut shapes, self.proxy_func_name(&iface.name, &m.name), m);
                if iface.implementable() {
                    collect(&mut shapes, self.cproxy_name(&iface.name, &m.name), m);
                }
            }
        }
        shapes
    }

    fn emit_return_structs(&mut self, shapes: &IndexMap<String, Vec<Type>>) {
        let mut names: Vec<&String> = shapes.keys().collect();
        names.sort();
        for name in names {
            let struct_name = self.return_struct_name(name);
            uwriteln!(self.cs, "[StructLayout(LayoutKind.Sequential)]");
            uwriteln!(self.cs, "internal struct {struct_name} {{");
            for (i, field) in shapes[name.as_str()].iter().enumerate() {
                let ty = self.cs_native_type(field);
                uwriteln!(self.cs, "public {ty} r{i};");
            }
            uwriteln!(self.cs, "}}");
            uwriteln!(self.cs, "");
        }
    }

    /// The native return type of a call into Go: void, a wire scalar, or
    /// the wire record for two results.
    fn native_return_type(&mut self, f: &Func, c_name: &str) -> String {
        match f.results.len() {
            0 => "void".to_string(),
            1 => self.cs_native_type(&f.results[0]),
            _ => self.return_struct_name(c_name),
        }
    }

    fn emit_dll_import(&mut self) {
        uwriteln!(
            self.cs,
            "[DllImport(LibraryName, CallingConvention = CallingConvention.Cdecl)]"
        );
    }

    /// The P/Invoke surface: one cdecl extern per exported, supported
    /// member, plus the runtime entries on the root pass.
    fn emit_native_class(&mut self) {
        uwriteln!(self.cs, "internal static partial class Native {{");
        if self.pkg.is_none() {
            let library_name = self.library_name().to_string();
            uwriteln!(
                self.cs,
                "internal const string LibraryName = \"{}\";",
                library_name
            );
            uwriteln!(self.cs, "");
            for decl in [
                "void go_seq_init()",
                "void DestroyRef(int refnum)",
                "void IncGoRef(int refnum)",
                "IntPtr GoSeqAlloc(int size)",
                "void GoSeqFree(IntPtr ptr)",
                "void go_seq_set_inc_ref(IntPtr fn)",
                "void go_seq_set_dec_ref(IntPtr fn)",
            ] {
                self.emit_dll_import();
                uwriteln!(self.cs, "internal static extern {decl};");
                uwriteln!(self.cs, "");
            }
        }

        for v in self.pkg.map_or(&[][..], |p| &p.vars) {
            if let Some(repr) = self.describe_unsupported(&v.ty) {
                self.diag
                    .warn(format!("skipping var {}: unsupported type {repr}", v.name));
                continue;
            }
            let native = self.cs_native_type(&v.ty);
            let prefix = self.pkg_prefix().to_string();
            self.emit_dll_import();
            uwriteln!(
                self.cs,
                "internal static extern void var_set{prefix}_{}({native} v);",
                v.name
            );
            uwriteln!(self.cs, "");
            self.emit_dll_import();
            uwriteln!(
                self.cs,
                "internal static extern {native} var_get{prefix}_{}();",
                v.name
            );
            uwriteln!(self.cs, "");
        }

        for f in self.funcs() {
            if !self.check_sig_supported("func ", f) {
                continue;
            }
            let c_name = self.proxy_func_name("", &f.name);
            self.emit_native_decl(f, &c_name, false);
        }

        for s in self.structs() {
            // Allocator entry backing the default constructor.
            if self.default_ctor_symbol(s).is_some() {
                let symbol = self.new_func_name(&s.name).unwrap();
                self.emit_dll_import();
                uwriteln!(self.cs, "internal static extern int {symbol}();");
                uwriteln!(self.cs, "");
            }
            for field in &s.fields {
                if let Some(repr) = self.describe_unsupported(&field.ty) {
                    self.diag.warn(format!(
                        "skipping field {}.{}: unsupported type {repr}",
                        s.name, field.name
                    ));
                    continue;
                }
                let native = self.cs_native_type(&field.ty);
                let c_name = self.proxy_func_name(&s.name, &field.name);
                self.emit_dll_import();
                uwriteln!(self.cs, "internal static extern {native} {c_name}_Get(int refnum);");
                uwriteln!(self.cs, "");
                self.emit_dll_import();
                uwriteln!(
                    self.cs,
                    "internal static extern void {c_name}_Set(int refnum, {native} v);"
                );
                uwriteln!(self.cs, "");
            }
            for m in &s.methods {
                if !self.check_sig_supported(&format!("method {}.", s.name), m) {
                    continue;
                }
                let c_name = self.proxy_func_name(&s.name, &m.name);
                self.emit_native_decl(m, &c_name, true);
            }
        }

        for iface in self.interfaces().to_vec() {
            for m in &iface.methods {
                if !self.check_sig_supported(&format!("method {}.", iface.name), m) {
                    continue;
                }
                let c_name = self.proxy_func_name(&iface.name, &m.name);
                self.emit_native_decl(m, &c_name, true);
            }
            if !iface.implementable() {
                continue;
            }
            for m in &iface.methods {
                if !self.resolve.is_sig_supported(m) {
                    continue;
                }
                let setter = self.cproxy_setter_name(&iface.name, &m.name);
                self.emit_dll_import();
                uwriteln!(self.cs, "internal static extern void {setter}(IntPtr fn);");
                uwriteln!(self.cs, "");
            }
        }
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }

    /// One extern declaration for a call into Go; methods take the receiver
    /// refnum first.
    fn emit_native_decl(&mut self, f: &Func, c_name: &str, receiver: bool) {
        let ret = self.native_return_type(f, c_name);
        self.emit_dll_import();
        uwrite!(self.cs, "internal static extern {ret} {c_name}(");
        let mut first = true;
        if receiver {
            uwrite!(self.cs, "int refnum");
            first = false;
        }
        for (i, p) in f.params.iter().enumerate() {
            if !first {
                uwrite!(self.cs, ", ");
            }
            first = false;
            let native = self.cs_native_type(&p.ty);
            uwrite!(self.cs, "{native} {}", callable::param_name(&f.params, i));
        }
        uwriteln!(self.cs, ");");
        uwriteln!(self.cs, "");
    }
}
