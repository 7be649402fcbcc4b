//! Marshaling at every crossing, and the one callable-emission helper
//! shared by package functions, struct methods and interface proxy methods.
//! The three receiver kinds differ only in their prologue and in whether
//! the refnum leads the native argument list; everything else (arity
//! checks, `(T, error)` handling, buffer frees, refnum cleanup on the
//! error path) is common.

use crate::ident::cs_ident;
use crate::types::is_refnum_type;
use crate::CSharpGen;
use gobind_core::{uwrite, uwriteln};
use gobind_model::{Func, Param, Type};
use std::fmt::Write;

pub(crate) fn param_name(params: &[Param], i: usize) -> String {
    if params[i].name.is_empty() {
        format!("p{i}")
    } else {
        cs_ident(&params[i].name)
    }
}

pub(crate) fn native_param_name(name: &str) -> String {
    format!("_{name}")
}

/// The C# names already spoken for inside one emitted body: the sanitized
/// parameter names plus both derived forms the emitters mint from them (the
/// `_`-prefixed wire locals and the `Value` locals of the trampolines).
/// Temporaries such as `res` or `instance` are numbered past them, so a Go
/// parameter that happens to be called `res` never shadows one.
pub(crate) struct Locals {
    taken: Vec<String>,
}

impl Locals {
    pub(crate) fn for_params(params: &[Param]) -> Locals {
        let mut taken = Vec::with_capacity(params.len() * 3);
        for i in 0..params.len() {
            let name = param_name(params, i);
            taken.push(native_param_name(&name));
            taken.push(format!("{name}Value"));
            taken.push(name);
        }
        Locals { taken }
    }

    /// The first of `base`, `base1`, `base2`, … not yet spoken for; the
    /// returned name is claimed as well.
    pub(crate) fn fresh(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1usize;
        while self.taken.iter().any(|taken| taken == &candidate) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        self.taken.push(candidate.clone());
        candidate
    }
}

/// The result shape of a callable. Result arity is at most two, and a
/// second result must be `error`.
#[derive(Clone, Copy)]
pub(crate) enum Returns<'a> {
    Void,
    Value(&'a Type),
    ErrorOnly,
    ValueAndError(&'a Type),
}

impl Returns<'_> {
    fn has_results(&self) -> bool {
        !matches!(self, Returns::Void)
    }
}

#[derive(Clone, Copy, PartialEq)]
pub(crate) enum Receiver {
    /// Package-level function: static, no receiver refnum.
    Static,
    /// Method on a live proxy: guarded by disposal and the pending
    /// exception queue, receiver refnum passed first.
    Proxy,
}

/// The bindable result shape of a callable, or `None` when there is none
/// (a second result that is not `error`, or more than two results).
pub(crate) fn shape_of(f: &Func) -> Option<Returns<'_>> {
    match f.results.len() {
        0 => Some(Returns::Void),
        1 if matches!(f.results[0], Type::Error) => Some(Returns::ErrorOnly),
        1 => Some(Returns::Value(&f.results[0])),
        2 if matches!(f.results[1], Type::Error) => Some(Returns::ValueAndError(&f.results[0])),
        _ => None,
    }
}

impl CSharpGen<'_> {
    /// Like [`shape_of`], recording an error diagnostic when the shape
    /// cannot be bound.
    pub(crate) fn classify_returns<'f>(&mut self, owner: &str, f: &'f Func) -> Option<Returns<'f>> {
        match shape_of(f) {
            Some(ret) => Some(ret),
            None if f.results.len() == 2 => {
                self.diag
                    .error(format!("{owner}{}: second result must be error", f.name));
                None
            }
            None => {
                self.diag
                    .error(format!("{owner}{}: too many result values", f.name));
                None
            }
        }
    }

    pub(crate) fn surface_return_type(&mut self, ret: &Returns<'_>) -> String {
        match ret {
            Returns::Void | Returns::ErrorOnly => "void".to_string(),
            Returns::Value(ty) | Returns::ValueAndError(ty) => self.cs_type(ty),
        }
    }

    /// Managed→wire conversion of one argument. Reference arguments ensure
    /// their callback registration first; string and byte buffers are
    /// allocated through the Go allocator.
    pub(crate) fn emit_to_native_param(&mut self, root: &str, name: &str, ty: &Type) {
        let native = native_param_name(name);
        match ty {
            Type::Bool => uwriteln!(self.cs, "var {native} = {name} ? (byte)1 : (byte)0;"),
            Type::String => {
                uwriteln!(self.cs, "var {native} = {root}.Seq.StringToNString({name});")
            }
            Type::Bytes => {
                uwriteln!(self.cs, "var {native} = {root}.Seq.BytesToNByteslice({name});")
            }
            Type::Error | Type::Pointer(_) | Type::Named(_) => {
                self.emit_ensure_registered_for(root, ty);
                uwriteln!(self.cs, "var {native} = {root}.Seq.IncRef({name});");
            }
            _ => {
                let native_ty = self.cs_native_type(ty);
                uwriteln!(self.cs, "var {native} = ({native_ty}){name};");
            }
        }
    }

    /// Byte-slice arguments are owned transiently: the caller frees the
    /// buffer once the call returned. (String buffers are taken over by the
    /// Go side instead.)
    pub(crate) fn emit_free_native_param(&mut self, root: &str, name: &str) {
        let native = native_param_name(name);
        uwriteln!(
            self.cs,
            "if ({native}.ptr != IntPtr.Zero) {{ {root}.Seq.Free({native}.ptr); }}"
        );
    }

    /// Wire→managed conversion as an expression. `free_bytes` decides
    /// whether a byte buffer is freed after the copy; strings are always
    /// copied and freed.
    pub(crate) fn managed_from_native_expr(
        &mut self,
        root: &str,
        source: &str,
        ty: &Type,
        free_bytes: bool,
    ) -> String {
        match ty {
            Type::Bool => format!("{source} != 0"),
            Type::String => format!("{root}.Seq.NStringToString({source})"),
            Type::Bytes => format!("{root}.Seq.NBytesliceToBytes({source}, {free_bytes})"),
            Type::Error => format!("ProxyError.FromRefnum({source})"),
            Type::Pointer(named) | Type::Named(named) => {
                if self.named_is_interface(named) {
                    let proxy = self.interface_proxy_qualified_name(named);
                    format!("{proxy}.FromRefnum({source})")
                } else {
                    let class = self.named_qualified_name(named);
                    format!("{class}.FromRefnum({source})")
                }
            }
            Type::Unsupported(_) => "null".to_string(),
            _ => {
                let surface = self.cs_type(ty);
                format!("({surface}){source}")
            }
        }
    }

    pub(crate) fn emit_from_native_return(
        &mut self,
        root: &str,
        source: &str,
        ty: &Type,
        free_bytes: bool,
    ) {
        let expr = self.managed_from_native_expr(root, source, ty, free_bytes);
        uwriteln!(self.cs, "return {expr};");
    }

    pub(crate) fn emit_from_native_value(
        &mut self,
        root: &str,
        target: &str,
        source: &str,
        ty: &Type,
        free_bytes: bool,
    ) {
        let expr = self.managed_from_native_expr(root, source, ty, free_bytes);
        uwriteln!(self.cs, "var {target} = {expr};");
    }

    /// Wire→managed conversion of a callback parameter into `<name>Value`.
    /// Byte buffers stay owned by the Go caller for the duration of the
    /// call.
    pub(crate) fn emit_from_native_callback_param(&mut self, root: &str, name: &str, ty: &Type) {
        let expr = self.managed_from_native_expr(root, name, ty, false);
        uwriteln!(self.cs, "var {name}Value = {expr};");
    }

    /// Managed→wire conversion of a callback return value as an expression.
    pub(crate) fn native_value_expression(&mut self, root: &str, name: &str, ty: &Type) -> String {
        match ty {
            Type::Bool => format!("{name} ? (byte)1 : (byte)0"),
            Type::String => format!("{root}.Seq.StringToNString({name})"),
            Type::Bytes => format!("{root}.Seq.BytesToNByteslice({name})"),
            Type::Error | Type::Pointer(_) | Type::Named(_) => {
                format!("{root}.Seq.IncRef({name})")
            }
            _ => {
                let native_ty = self.cs_native_type(ty);
                format!("({native_ty}){name}")
            }
        }
    }

    /// Emits one complete managed method calling into Go.
    pub(crate) fn emit_callable(
        &mut self,
        root: &str,
        owner: &str,
        f: &Func,
        c_name: &str,
        receiver: Receiver,
    ) {
        let ret = match self.classify_returns(owner, f) {
            Some(ret) => ret,
            None => return,
        };
        let ret_ty = self.surface_return_type(&ret);
        let modifier = if receiver == Receiver::Static {
            "static "
        } else {
            ""
        };
        uwrite!(self.cs, "public {modifier}{ret_ty} {}(", cs_ident(&f.name));
        for i in 0..f.params.len() {
            if i > 0 {
                uwrite!(self.cs, ", ");
            }
            let surface = self.cs_type(&f.params[i].ty);
            uwrite!(self.cs, "{surface} {}", param_name(&f.params, i));
        }
        uwriteln!(self.cs, ") {{");

        let mut locals = Locals::for_params(&f.params);

        if receiver == Receiver::Proxy {
            uwriteln!(
                self.cs,
                "ThrowIfDisposed(); {root}.Seq.ThrowIfPendingException();"
            );
            uwriteln!(self.cs, "{root}.Seq.IncGoRef(refnum, this);");
        }
        for i in 0..f.params.len() {
            let name = param_name(&f.params, i);
            self.emit_to_native_param(root, &name, &f.params[i].ty);
        }

        let res = locals.fresh("res");
        if ret.has_results() {
            uwrite!(self.cs, "var {res} = {root}.Native.{c_name}(");
        } else {
            uwrite!(self.cs, "{root}.Native.{c_name}(");
        }
        let mut first = true;
        if receiver == Receiver::Proxy {
            uwrite!(self.cs, "refnum");
            first = false;
        }
        for i in 0..f.params.len() {
            if !first {
                uwrite!(self.cs, ", ");
            }
            first = false;
            uwrite!(self.cs, "{}", native_param_name(&param_name(&f.params, i)));
        }
        uwriteln!(self.cs, ");");
        for i in 0..f.params.len() {
            if matches!(f.params[i].ty, Type::Bytes) {
                self.emit_free_native_param(root, &param_name(&f.params, i));
            }
        }

        match ret {
            Returns::Void => {}
            Returns::Value(ty) => self.emit_from_native_return(root, &res, ty, true),
            Returns::ErrorOnly => uwriteln!(self.cs, "{root}.Seq.ThrowIfError({res});"),
            Returns::ValueAndError(ty) => {
                // A refnum result paired with an error names a live Go
                // object; destroy it before throwing so the error path does
                // not leak it.
                if is_refnum_type(ty) {
                    uwriteln!(self.cs, "if ({res}.r1 != {root}.Seq.NullRefNum) {{");
                    uwriteln!(self.cs, "{root}.Seq.DestroyRef({res}.r0);");
                    uwriteln!(self.cs, "{root}.Seq.ThrowIfError({res}.r1);");
                    uwriteln!(self.cs, "}}");
                }
                let value = locals.fresh("value");
                let source = format!("{res}.r0");
                self.emit_from_native_value(root, &value, &source, ty, true);
                if !is_refnum_type(ty) {
                    uwriteln!(self.cs, "{root}.Seq.ThrowIfError({res}.r1);");
                }
                uwriteln!(self.cs, "return {value};");
            }
        }
        uwriteln!(self.cs, "}}");
        uwriteln!(self.cs, "");
    }
}
