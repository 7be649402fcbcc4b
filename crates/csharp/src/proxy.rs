//! Proxy emission: the package static class, struct proxy classes, and the
//! two-way interface projection with its callback trampolines.

use crate::callable::{self, param_name, Locals, Receiver, Returns};
use crate::ident::cs_ident;
use crate::types::is_cons_sig_clash;
use crate::CSharpGen;
use gobind_core::{uwrite, uwriteln};
use gobind_model::{Func, Interface, NamedDecl, Struct, Type};
use std::fmt::Write;

impl CSharpGen<'_> {
    pub(crate) fn emit_package_class(&mut self, root: &str) {
        let class = self.package_class_name();
        uwriteln!(self.cs, "public static class {class} {{");
        uwriteln!(self.cs, "static {class}() {{ {root}.Seq.Touch(); }}");
        uwriteln!(self.cs, "");
        self.emit_package_constants();
        self.emit_package_variables(root);
        self.emit_package_functions(root);
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }

    fn emit_package_constants(&mut self) {
        let consts = self.pkg.map_or(&[][..], |p| &p.consts);
        let mut emitted = false;
        for c in consts {
            match self.const_literal(c) {
                Some(lit) => {
                    let ty = self.cs_type(&c.ty);
                    uwriteln!(self.cs, "public const {ty} {} = {lit};", cs_ident(&c.name));
                    emitted = true;
                }
                None => self.diag.warn(format!(
                    "skipping const {}: unsupported constant kind",
                    c.name
                )),
            }
        }
        if emitted {
            uwriteln!(self.cs, "");
        }
    }

    fn emit_package_variables(&mut self, root: &str) {
        for v in self.pkg.map_or(&[][..], |p| &p.vars) {
            if !self.resolve.is_supported(&v.ty) {
                continue;
            }
            let ty = self.cs_type(&v.ty);
            let prefix = self.pkg_prefix().to_string();
            uwriteln!(self.cs, "public static {ty} {} {{", cs_ident(&v.name));
            uwriteln!(self.cs, "get {{");
            uwriteln!(
                self.cs,
                "var res = {root}.Native.var_get{prefix}_{}();",
                v.name
            );
            self.emit_from_native_return(root, "res", &v.ty, true);
            uwriteln!(self.cs, "}}");
            uwriteln!(self.cs, "set {{");
            // Retained crossing: the Go side takes the buffer over, so no
            // post-call free.
            self.emit_to_native_param(root, "value", &v.ty);
            uwriteln!(
                self.cs,
                "{root}.Native.var_set{prefix}_{}(_value);",
                v.name
            );
            uwriteln!(self.cs, "}}");
            uwriteln!(self.cs, "}}");
            uwriteln!(self.cs, "");
        }
    }

    fn emit_package_functions(&mut self, root: &str) {
        for f in self.funcs() {
            if !self.resolve.is_sig_supported(f) {
                continue;
            }
            let c_name = self.proxy_func_name("", &f.name);
            self.emit_callable(root, "func ", f, &c_name, Receiver::Static);
        }
    }

    /// Which top-level function constructs the given struct, if any: its
    /// first result is the struct (or a pointer to it), optionally paired
    /// with an error.
    pub(crate) fn constructor_of<'f>(&self, f: &'f Func) -> Option<&'f str> {
        let named = match f.results.first()? {
            Type::Pointer(named) | Type::Named(named) => named,
            _ => return None,
        };
        match f.results.len() {
            1 => {}
            2 if matches!(f.results[1], Type::Error) => {}
            _ => return None,
        }
        if !self.is_current_package(&named.package) {
            return None;
        }
        match self.resolve.named_decl(named) {
            Some(NamedDecl::Struct(..)) => Some(named.name.as_str()),
            _ => None,
        }
    }

    /// The allocator symbol backing a default constructor, present when the
    /// Go side exposes no zero-argument constructor function. The Go-side
    /// generator owns emitting the symbol.
    pub(crate) fn default_ctor_symbol(&self, s: &Struct) -> Option<String> {
        let has_zero_arg = self.funcs().iter().any(|f| {
            self.constructor_of(f) == Some(s.name.as_str())
                && self.resolve.is_sig_supported(f)
                && f.params.is_empty()
        });
        if has_zero_arg {
            None
        } else {
            self.new_func_name(&s.name)
        }
    }

    /// Finalizer, `Dispose`, disposal guard and the refnum accessors shared
    /// by struct and interface proxies. Disposal is idempotent: the CAS on
    /// `disposed` guarantees exactly one `DestroyRef` per proxy.
    fn emit_proxy_plumbing(&mut self, root: &str, class_name: &str) {
        uwriteln!(self.cs, "~{class_name}() {{ Dispose(false); }}");
        uwriteln!(self.cs, "");
        uwriteln!(self.cs, "public void Dispose() {{");
        uwriteln!(self.cs, "Dispose(true);");
        uwriteln!(self.cs, "GC.SuppressFinalize(this);");
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
        uwriteln!(self.cs, "private void Dispose(bool disposing) {{");
        uwriteln!(
            self.cs,
            "if (System.Threading.Interlocked.Exchange(ref disposed, 1) != 0) {{ return; }}"
        );
        uwriteln!(self.cs, "{root}.Seq.DestroyRef(refnum);");
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
        uwriteln!(self.cs, "private void ThrowIfDisposed() {{");
        uwriteln!(
            self.cs,
            "if (disposed != 0) {{ throw new ObjectDisposedException(GetType().FullName); }}"
        );
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
        uwriteln!(
            self.cs,
            "public int Refnum {{ get {{ ThrowIfDisposed(); return refnum; }} }}"
        );
        uwriteln!(self.cs, "");
        uwriteln!(
            self.cs,
            "public int IncRefnum() {{ ThrowIfDisposed(); {root}.Seq.IncGoRef(refnum, this); return refnum; }}"
        );
        uwriteln!(self.cs, "");
    }

    pub(crate) fn emit_struct_class(&mut self, root: &str, s: &Struct) {
        let name = cs_ident(&s.name);
        uwriteln!(
            self.cs,
            "public sealed class {name} : {root}.Seq.IProxy, IDisposable {{"
        );
        uwriteln!(self.cs, "private readonly int refnum;");
        uwriteln!(self.cs, "private int disposed;");
        uwriteln!(self.cs, "");
        uwriteln!(self.cs, "internal {name}(int refnum) {{ this.refnum = refnum; }}");
        uwriteln!(self.cs, "");

        let mut constructors = Vec::new();
        for f in self.funcs() {
            if self.constructor_of(f) != Some(s.name.as_str()) {
                continue;
            }
            if !self.resolve.is_sig_supported(f) {
                continue;
            }
            if is_cons_sig_clash(&f.params) {
                self.diag.warn(format!(
                    "constructor {} not bound: a single int32 parameter clashes with the refnum constructor",
                    f.name
                ));
                continue;
            }
            constructors.push(f);
        }

        if let Some(symbol) = self.default_ctor_symbol(s) {
            uwriteln!(self.cs, "public {name}() {{");
            uwriteln!(self.cs, "refnum = {root}.Native.{symbol}();");
            uwriteln!(self.cs, "}}");
            uwriteln!(self.cs, "");
        }
        for f in constructors {
            self.emit_constructor_from_func(root, &name, f);
        }

        self.emit_proxy_plumbing(root, &name);

        uwriteln!(self.cs, "internal static {name} FromRefnum(int refnum) {{");
        uwriteln!(self.cs, "if (refnum == {root}.Seq.NullRefNum) {{ return null; }}");
        uwriteln!(self.cs, "return new {name}(refnum);");
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");

        for field in &s.fields {
            if !self.resolve.is_supported(&field.ty) {
                continue;
            }
            let ty = self.cs_type(&field.ty);
            let c_name = self.proxy_func_name(&s.name, &field.name);
            uwriteln!(self.cs, "public {ty} {} {{", cs_ident(&field.name));
            uwriteln!(self.cs, "get {{");
            uwriteln!(
                self.cs,
                "ThrowIfDisposed(); {root}.Seq.ThrowIfPendingException();"
            );
            uwriteln!(self.cs, "{root}.Seq.IncGoRef(refnum, this);");
            uwriteln!(self.cs, "var res = {root}.Native.{c_name}_Get(refnum);");
            self.emit_from_native_return(root, "res", &field.ty, true);
            uwriteln!(self.cs, "}}");
            uwriteln!(self.cs, "set {{");
            uwriteln!(
                self.cs,
                "ThrowIfDisposed(); {root}.Seq.ThrowIfPendingException();"
            );
            uwriteln!(self.cs, "{root}.Seq.IncGoRef(refnum, this);");
            self.emit_to_native_param(root, "value", &field.ty);
            uwriteln!(self.cs, "{root}.Native.{c_name}_Set(refnum, _value);");
            uwriteln!(self.cs, "}}");
            uwriteln!(self.cs, "}}");
            uwriteln!(self.cs, "");
        }

        for m in &s.methods {
            if !self.resolve.is_sig_supported(m) {
                continue;
            }
            let c_name = self.proxy_func_name(&s.name, &m.name);
            let owner = format!("method {}.", s.name);
            self.emit_callable(root, &owner, m, &c_name, Receiver::Proxy);
        }

        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }

    fn emit_constructor_from_func(&mut self, root: &str, class_name: &str, f: &Func) {
        let returns_error = f.results.len() == 2;
        uwrite!(self.cs, "public {class_name}(");
        for i in 0..f.params.len() {
            if i > 0 {
                uwrite!(self.cs, ", ");
            }
            let surface = self.cs_type(&f.params[i].ty);
            uwrite!(self.cs, "{surface} {}", param_name(&f.params, i));
        }
        uwriteln!(self.cs, ") {{");
        for i in 0..f.params.len() {
            let name = param_name(&f.params, i);
            self.emit_to_native_param(root, &name, &f.params[i].ty);
        }
        let c_name = self.proxy_func_name("", &f.name);
        uwrite!(self.cs, "var res = {root}.Native.{c_name}(");
        for i in 0..f.params.len() {
            if i > 0 {
                uwrite!(self.cs, ", ");
            }
            uwrite!(self.cs, "{}", callable::native_param_name(&param_name(&f.params, i)));
        }
        uwriteln!(self.cs, ");");
        for i in 0..f.params.len() {
            if matches!(f.params[i].ty, Type::Bytes) {
                self.emit_free_native_param(root, &param_name(&f.params, i));
            }
        }
        if returns_error {
            uwriteln!(self.cs, "refnum = res.r0;");
            uwriteln!(self.cs, "if (res.r1 != {root}.Seq.NullRefNum) {{");
            uwriteln!(self.cs, "{root}.Seq.DestroyRef(refnum);");
            uwriteln!(self.cs, "{root}.Seq.ThrowIfError(res.r1);");
            uwriteln!(self.cs, "}}");
        } else {
            uwriteln!(self.cs, "refnum = res;");
        }
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }

    pub(crate) fn emit_interface(&mut self, root: &str, iface: &Interface) {
        let name = self.interface_name(iface);
        uwriteln!(self.cs, "public interface {name} {{");
        for m in &iface.methods {
            if !self.resolve.is_sig_supported(m) {
                continue;
            }
            let owner = format!("method {}.", iface.name);
            let ret = match self.classify_returns(&owner, m) {
                Some(ret) => ret,
                None => continue,
            };
            let ret_ty = self.surface_return_type(&ret);
            uwrite!(self.cs, "{ret_ty} {}(", cs_ident(&m.name));
            for i in 0..m.params.len() {
                if i > 0 {
                    uwrite!(self.cs, ", ");
                }
                let surface = self.cs_type(&m.params[i].ty);
                uwrite!(self.cs, "{surface} {}", param_name(&m.params, i));
            }
            uwriteln!(self.cs, ");");
        }
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");

        let proxy_name = self.proxy_interface_name(iface);
        uwriteln!(
            self.cs,
            "internal sealed class {proxy_name} : {root}.Seq.IProxy, {name}, IDisposable {{"
        );
        uwriteln!(self.cs, "private readonly int refnum;");
        uwriteln!(self.cs, "private int disposed;");
        if iface.implementable() {
            uwriteln!(self.cs, "private static int registered;");
        }
        uwriteln!(self.cs, "");
        uwriteln!(
            self.cs,
            "internal {proxy_name}(int refnum) {{ this.refnum = refnum; }}"
        );
        uwriteln!(self.cs, "");

        self.emit_proxy_plumbing(root, &proxy_name);

        // A Go-side refnum wraps into a fresh proxy; a managed-side refnum
        // names an object already interned in the tracker.
        uwriteln!(self.cs, "internal static {name} FromRefnum(int refnum) {{");
        uwriteln!(self.cs, "if (refnum == {root}.Seq.NullRefNum) {{ return null; }}");
        uwriteln!(self.cs, "if (refnum < 0) {{ return new {proxy_name}(refnum); }}");
        uwriteln!(self.cs, "return ({name}){root}.Seq.GetRef(refnum);");
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");

        for m in &iface.methods {
            if !self.resolve.is_sig_supported(m) {
                continue;
            }
            let c_name = self.proxy_func_name(&iface.name, &m.name);
            let owner = format!("method {}.", iface.name);
            self.emit_callable(root, &owner, m, &c_name, Receiver::Proxy);
        }

        if iface.implementable() {
            self.emit_ensure_registered(root, iface);
            for m in &iface.methods {
                if !self.resolve.is_sig_supported(m) {
                    continue;
                }
                if callable::shape_of(m).is_none() {
                    continue;
                }
                self.emit_callback(root, iface, &name, m);
            }
        }

        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }

    /// Registration runs once per process: one thread wins the CAS and
    /// installs every trampoline; the delegates are pinned by the static
    /// handler fields for the life of the process.
    fn emit_ensure_registered(&mut self, root: &str, iface: &Interface) {
        uwriteln!(self.cs, "internal static void EnsureRegistered() {{");
        uwriteln!(
            self.cs,
            "if (System.Threading.Interlocked.CompareExchange(ref registered, 1, 0) != 0) {{ return; }}"
        );
        uwriteln!(self.cs, "{root}.Seq.Touch();");
        for m in &iface.methods {
            if !self.resolve.is_sig_supported(m) || callable::shape_of(m).is_none() {
                continue;
            }
            let handler = cs_ident(&format!("Callback_{}Handler", m.name));
            let setter = self.cproxy_setter_name(&iface.name, &m.name);
            uwriteln!(
                self.cs,
                "{root}.Native.{setter}(Marshal.GetFunctionPointerForDelegate({handler}));"
            );
        }
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }

    /// One trampoline per callable: a pinned cdecl delegate receiving the
    /// managed-side refnum first, dispatching to the interned instance.
    fn emit_callback(&mut self, root: &str, iface: &Interface, iface_cs_name: &str, m: &Func) {
        let ret = match callable::shape_of(m) {
            Some(ret) => ret,
            None => return,
        };
        let delegate_ty = cs_ident(&format!("Callback_{}", m.name));
        let handler = cs_ident(&format!("Callback_{}Handler", m.name));
        let imp = cs_ident(&format!("Callback_{}Impl", m.name));
        let cproxy = self.cproxy_name(&iface.name, &m.name);
        let ret_native = match m.results.len() {
            0 => "void".to_string(),
            1 => self.cs_native_type(&m.results[0]),
            _ => self.return_struct_name(&cproxy),
        };

        uwriteln!(self.cs, "[UnmanagedFunctionPointer(CallingConvention.Cdecl)]");
        uwrite!(self.cs, "private delegate {ret_native} {delegate_ty}(int refnum");
        for (i, p) in m.params.iter().enumerate() {
            let native = self.cs_native_type(&p.ty);
            uwrite!(self.cs, ", {native} {}", param_name(&m.params, i));
        }
        uwriteln!(self.cs, ");");
        uwriteln!(
            self.cs,
            "private static readonly {delegate_ty} {handler} = {imp};"
        );
        uwriteln!(self.cs, "");

        uwrite!(self.cs, "private static {ret_native} {imp}(int refnum");
        for (i, p) in m.params.iter().enumerate() {
            let native = self.cs_native_type(&p.ty);
            uwrite!(self.cs, ", {native} {}", param_name(&m.params, i));
        }
        uwriteln!(self.cs, ") {{");

        let mut locals = Locals::for_params(&m.params);
        let instance = locals.fresh("instance");

        uwriteln!(self.cs, "try {{");
        uwriteln!(
            self.cs,
            "var {instance} = ({iface_cs_name}){root}.Seq.GetRef(refnum);"
        );
        for i in 0..m.params.len() {
            let n = param_name(&m.params, i);
            self.emit_from_native_callback_param(root, &n, &m.params[i].ty);
        }
        let args = (0..m.params.len())
            .map(|i| format!("{}Value", param_name(&m.params, i)))
            .collect::<Vec<_>>()
            .join(", ");
        let call = format!("{instance}.{}({args})", cs_ident(&m.name));
        let report = format!(
            "{root}.Seq.ReportUnhandledException(ex, \"{}.{}\");",
            iface.name, m.name
        );

        match ret {
            Returns::Void => {
                uwriteln!(self.cs, "{call};");
                uwriteln!(self.cs, "}} catch (Exception ex) {{");
                uwriteln!(self.cs, "{report}");
                uwriteln!(self.cs, "}}");
                uwriteln!(self.cs, "return;");
            }
            Returns::ErrorOnly => {
                uwriteln!(self.cs, "{call};");
                uwriteln!(self.cs, "return {root}.Seq.NullRefNum;");
                uwriteln!(self.cs, "}} catch (Exception ex) {{");
                uwriteln!(self.cs, "{root}.ProxyError.EnsureRegistered();");
                uwriteln!(
                    self.cs,
                    "return {root}.Seq.IncRef(new {root}.GoError(ex));"
                );
                uwriteln!(self.cs, "}}");
            }
            Returns::Value(ty) => {
                self.emit_ensure_registered_for(root, ty);
                let result = locals.fresh("result");
                uwriteln!(self.cs, "var {result} = {call};");
                let wire = self.native_value_expression(root, &result, ty);
                uwriteln!(self.cs, "return {wire};");
                uwriteln!(self.cs, "}} catch (Exception ex) {{");
                uwriteln!(self.cs, "{report}");
                let fallback = self.default_native_return(root, ty);
                uwriteln!(self.cs, "return {fallback};");
                uwriteln!(self.cs, "}}");
            }
            Returns::ValueAndError(ty) => {
                let record = self.return_struct_name(&cproxy);
                self.emit_ensure_registered_for(root, ty);
                let value = locals.fresh("value");
                let error = locals.fresh("error");
                uwriteln!(self.cs, "var {value} = {call};");
                uwriteln!(self.cs, "var {error} = {root}.Seq.NullRefNum;");
                let wire = self.native_value_expression(root, &value, ty);
                uwriteln!(
                    self.cs,
                    "return new {record} {{ r0 = {wire}, r1 = {error} }};"
                );
                uwriteln!(self.cs, "}} catch (Exception ex) {{");
                uwriteln!(self.cs, "{root}.ProxyError.EnsureRegistered();");
                uwriteln!(
                    self.cs,
                    "var {error} = {root}.Seq.IncRef(new {root}.GoError(ex));"
                );
                let fallback = self.default_native_return(root, ty);
                uwriteln!(
                    self.cs,
                    "return new {record} {{ r0 = {fallback}, r1 = {error} }};"
                );
                uwriteln!(self.cs, "}}");
            }
        }
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }
}
