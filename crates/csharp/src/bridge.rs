//! The C side of the callback path: per-method function-pointer slots, the
//! exported setters the managed side registers through, and the dispatchers
//! the Go side calls. Slots are atomics because registration happens lazily
//! on managed threads while dispatch can run on any Go-scheduled thread.

use crate::callable::param_name;
use crate::CSharpGen;
use gobind_core::{generated_preamble, uwrite, uwriteln, Source};
use gobind_model::Func;
use std::fmt::Write;

/// Support header shared by every generated translation unit; written once
/// by the root pass so the staged directory compiles stand-alone.
pub(crate) const SEQ_H: &str = r#"// Support declarations for the Go <=> C# bridge.

#ifndef __GO_SEQ_WINDOWS_HDR__
#define __GO_SEQ_WINDOWS_HDR__

#include <stdint.h>
#include <stdlib.h>

#if defined(_WIN32)
#define SEQ_EXPORT __declspec(dllexport)
#else
#define SEQ_EXPORT
#endif

typedef struct nstring {
	void *ptr;
	int len;
} nstring;

typedef struct nbyteslice {
	void *ptr;
	int len;
} nbyteslice;

typedef int64_t nint;

typedef void (*go_seq_ref_fn)(int32_t refnum);

// Initialize the Go<=>C# binding layer. Must be called before any other
// go_seq_* function.
SEQ_EXPORT void go_seq_init(void);
SEQ_EXPORT void go_seq_inc_ref(int32_t refnum);
SEQ_EXPORT void go_seq_dec_ref(int32_t refnum);
SEQ_EXPORT void go_seq_set_inc_ref(go_seq_ref_fn fn);
SEQ_EXPORT void go_seq_set_dec_ref(go_seq_ref_fn fn);

#endif // __GO_SEQ_WINDOWS_HDR__
"#;

impl CSharpGen<'_> {
    fn c_preamble(&mut self, src: &mut Source, what: &str) {
        generated_preamble(src, env!("CARGO_PKG_VERSION"));
        uwriteln!(src, "// C {what} for the Go <=> C# bridge.");
        uwriteln!(src, "//");
        uwriteln!(
            src,
            "//   autogenerated by gobind-cs {} {}",
            self.invocation_opts(),
            self.pkg_path()
        );
        uwriteln!(src, "");
    }

    pub(crate) fn gen_h(&mut self) -> String {
        let mut src = Source::default();
        self.c_preamble(&mut src, "function headers");
        let guard = format!("__{}_WINDOWS_H__", self.stem().to_uppercase());
        uwriteln!(src, "#ifndef {guard}");
        uwriteln!(src, "#define {guard}");
        uwriteln!(src, "");
        uwriteln!(src, "#include \"seq.h\"");
        uwriteln!(src, "");
        for iface in self.interfaces().to_vec() {
            if !iface.implementable() {
                continue;
            }
            for m in &iface.methods {
                if !self.resolve.is_sig_supported(m) {
                    continue;
                }
                self.gen_h_method(&mut src, &iface.name, m);
            }
        }
        uwriteln!(src, "#endif");
        src.into()
    }

    fn gen_h_method(&mut self, src: &mut Source, iface_name: &str, m: &Func) {
        let cproxy = self.cproxy_name(iface_name, &m.name);
        if m.results.len() == 2 {
            uwriteln!(src, "typedef struct {cproxy}_return {{");
            for (i, ty) in m.results.iter().enumerate() {
                let c_ty = self.cgo_type(ty);
                uwriteln!(src, "{c_ty} r{i};");
            }
            uwriteln!(src, "}} {cproxy}_return;");
        }
        let ret = self.c_return_type(&cproxy, m);
        uwrite!(src, "{ret} {cproxy}(int32_t refnum");
        for (i, p) in m.params.iter().enumerate() {
            let c_ty = self.cgo_type(&p.ty);
            uwrite!(src, ", {c_ty} {}", param_name(&m.params, i));
        }
        uwriteln!(src, ");");
        uwriteln!(src, "");
    }

    fn c_return_type(&mut self, cproxy: &str, m: &Func) -> String {
        match m.results.len() {
            0 => "void".to_string(),
            1 => self.cgo_type(&m.results[0]),
            _ => format!("{cproxy}_return"),
        }
    }

    pub(crate) fn gen_c(&mut self) -> String {
        let mut src = Source::default();
        self.c_preamble(&mut src, "functions");
        uwriteln!(src, "#include <stdint.h>");
        uwriteln!(src, "#include <stdlib.h>");
        uwriteln!(src, "#include <string.h>");
        uwriteln!(src, "#include <stdatomic.h>");
        uwriteln!(src, "#include \"seq.h\"");
        uwriteln!(src, "#include \"{}_windows.h\"", self.stem());
        uwriteln!(src, "");
        for iface in self.interfaces().to_vec() {
            if !iface.implementable() {
                continue;
            }
            for m in &iface.methods {
                if !self.resolve.is_sig_supported(m) {
                    continue;
                }
                self.gen_c_dispatcher(&mut src, &iface.name, m);
            }
        }
        src.into()
    }

    fn gen_c_dispatcher(&mut self, src: &mut Source, iface_name: &str, m: &Func) {
        let cproxy = self.cproxy_name(iface_name, &m.name);
        let setter = self.cproxy_setter_name(iface_name, &m.name);
        let ret = self.c_return_type(&cproxy, m);

        uwrite!(src, "typedef {ret} (*{cproxy}_fn)(int32_t refnum");
        for (i, p) in m.params.iter().enumerate() {
            let c_ty = self.cgo_type(&p.ty);
            uwrite!(src, ", {c_ty} {}", param_name(&m.params, i));
        }
        uwriteln!(src, ");");
        uwriteln!(src, "static _Atomic({cproxy}_fn) {cproxy}_callback = NULL;");
        uwriteln!(src, "");
        uwriteln!(src, "SEQ_EXPORT void {setter}({cproxy}_fn fn) {{");
        uwriteln!(src, "atomic_store(&{cproxy}_callback, fn);");
        uwriteln!(src, "}}");
        uwriteln!(src, "");
        uwrite!(src, "{ret} {cproxy}(int32_t refnum");
        for (i, p) in m.params.iter().enumerate() {
            let c_ty = self.cgo_type(&p.ty);
            uwrite!(src, ", {c_ty} {}", param_name(&m.params, i));
        }
        uwriteln!(src, ") {{");
        uwriteln!(src, "{cproxy}_fn fn = atomic_load(&{cproxy}_callback);");
        // Callers must have registered before handing an instance to Go; a
        // NULL slot at dispatch time is a generator or runtime bug.
        uwriteln!(src, "if (fn == NULL) {{");
        uwriteln!(src, "abort();");
        if m.results.is_empty() {
            uwriteln!(src, "return;");
        } else {
            uwriteln!(src, "{ret} zero;");
            uwriteln!(src, "memset(&zero, 0, sizeof(zero));");
            uwriteln!(src, "return zero;");
        }
        uwriteln!(src, "}}");
        if m.results.is_empty() {
            uwrite!(src, "fn(refnum");
        } else {
            uwrite!(src, "return fn(refnum");
        }
        for i in 0..m.params.len() {
            uwrite!(src, ", {}", param_name(&m.params, i));
        }
        uwriteln!(src, ");");
        uwriteln!(src, "}}");
        uwriteln!(src, "");
    }
}
