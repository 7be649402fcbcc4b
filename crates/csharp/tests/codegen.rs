//! Full passes over an in-code surface, with assertions on the emitted C#
//! and C text.

use gobind_core::{Files, PackageGenerator as _};
use gobind_model::{
    Const, ConstValue, Field, Func, Interface, NamedRef, Package, Param, Resolve, Struct, Type,
};
use gobind_csharp::Opts;

fn named(pkg: &str, name: &str) -> NamedRef {
    NamedRef {
        package: pkg.to_string(),
        name: name.to_string(),
    }
}

fn param(name: &str, ty: Type) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

fn func(name: &str, params: Vec<Param>, results: Vec<Type>) -> Func {
    Func {
        name: name.to_string(),
        params,
        results,
    }
}

fn demo_resolve() -> Resolve {
    Resolve {
        packages: vec![Package {
            name: "demo".to_string(),
            path: "example.org/demo".to_string(),
            consts: vec![
                Const {
                    name: "Version".to_string(),
                    ty: Type::String,
                    value: ConstValue::String("1.2.3".to_string()),
                },
                Const {
                    name: "MaxDepth".to_string(),
                    ty: Type::Int,
                    value: ConstValue::Int(8),
                },
            ],
            vars: vec![gobind_model::Var {
                name: "Debug".to_string(),
                ty: Type::Bool,
            }],
            funcs: vec![
                func("Echo", vec![param("s", Type::String)], vec![Type::String]),
                func(
                    "Parse",
                    vec![param("s", Type::String)],
                    vec![Type::Int, Type::Error],
                ),
                func("Hash", vec![param("data", Type::Bytes)], vec![Type::Int64]),
                func("NewCounter", vec![], vec![Type::Pointer(named("demo", "Counter"))]),
                func(
                    "NewCounterWithStart",
                    vec![param("start", Type::Int64)],
                    vec![Type::Pointer(named("demo", "Counter"))],
                ),
                func(
                    "NewCounterFromRef",
                    vec![param("ref", Type::Int32)],
                    vec![Type::Pointer(named("demo", "Counter"))],
                ),
                func(
                    "OpenStore",
                    vec![param("name", Type::String)],
                    vec![Type::Pointer(named("demo", "Store")), Type::Error],
                ),
                func(
                    "Watch",
                    vec![param("ch", Type::Unsupported("chan int".to_string()))],
                    vec![],
                ),
            ],
            structs: vec![
                Struct {
                    name: "Counter".to_string(),
                    fields: vec![Field {
                        name: "Count".to_string(),
                        ty: Type::Int,
                    }],
                    methods: vec![
                        func("Inc", vec![], vec![]),
                        func("Value", vec![], vec![Type::Int]),
                    ],
                },
                Struct {
                    name: "Store".to_string(),
                    fields: vec![],
                    methods: vec![
                        func(
                            "Get",
                            vec![param("key", Type::String)],
                            vec![Type::Bytes, Type::Error],
                        ),
                        func("Close", vec![], vec![Type::Error]),
                    ],
                },
            ],
            interfaces: vec![
                Interface {
                    name: "Sink".to_string(),
                    methods: vec![
                        func("Push", vec![param("n", Type::Int)], vec![]),
                        func("Flush", vec![], vec![Type::Error]),
                        func("Take", vec![], vec![Type::Int64, Type::Error]),
                    ],
                    has_unexported_methods: false,
                },
                Interface {
                    name: "Logger".to_string(),
                    methods: vec![func("Log", vec![param("msg", Type::String)], vec![])],
                    has_unexported_methods: true,
                },
            ],
        }],
    }
}

fn generate(opts: &Opts, resolve: &Resolve) -> Files {
    let mut files = Files::default();
    let mut generator = opts.build();
    generator.generate(resolve, None, &mut files).unwrap();
    for pkg in &resolve.packages {
        generator
            .generate(resolve, Some(&pkg.name), &mut files)
            .unwrap();
    }
    files
}

fn text<'a>(files: &'a Files, name: &str) -> &'a str {
    std::str::from_utf8(files.get(name).unwrap_or_else(|| panic!("missing {name}"))).unwrap()
}

#[test]
fn emits_expected_file_set() {
    let files = generate(&Opts::default(), &demo_resolve());
    let names: Vec<&str> = files.iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        [
            "demo.cs",
            "demo_windows.c",
            "demo_windows.h",
            "seq.h",
            "universe.cs",
            "universe_windows.c",
            "universe_windows.h",
        ]
    );
}

#[test]
fn package_class_and_constants() {
    let files = generate(&Opts::default(), &demo_resolve());
    let cs = text(&files, "demo.cs");
    assert!(cs.contains("namespace Go.Demo {"));
    assert!(cs.contains("public static class Demo {"));
    assert!(cs.contains("static Demo() { Go.Seq.Touch(); }"));
    assert!(cs.contains("public const string Version = \"1.2.3\";"));
    assert!(cs.contains("public const long MaxDepth = 8L;"));
    assert!(cs.contains("public static bool Debug {"));
    assert!(cs.contains("var res = Go.Native.var_getdemo_Debug();"));
}

#[test]
fn native_surface_declarations() {
    let files = generate(&Opts::default(), &demo_resolve());
    let cs = text(&files, "demo.cs");
    assert!(cs.contains("internal static extern NString proxydemo__Echo(NString s);"));
    assert!(cs.contains(
        "internal static extern CProxy_proxydemo__Parse_Return proxydemo__Parse(NString s);"
    ));
    assert!(cs.contains("internal static extern void proxydemo_Counter_Inc(int refnum);"));
    assert!(cs.contains("internal static extern long proxydemo_Counter_Count_Get(int refnum);"));
    assert!(
        cs.contains("internal static extern void proxydemo_Counter_Count_Set(int refnum, long v);")
    );
    assert!(cs.contains("internal static extern void var_setdemo_Debug(byte v);"));
    assert!(cs.contains("internal static extern byte var_getdemo_Debug();"));
    assert!(cs.contains("internal static extern void go_seq_set_cproxydemo_Sink_Push(IntPtr fn);"));
    // The library constant and runtime entries belong to the root pass.
    assert!(!cs.contains("LibraryName = "));
    let universe = text(&files, "universe.cs");
    assert!(universe.contains("internal const string LibraryName = \"gojni\";"));
    assert!(universe.contains("internal static extern void go_seq_init();"));
    assert!(universe.contains("internal static extern IntPtr GoSeqAlloc(int size);"));
}

#[test]
fn marshaling_and_error_paths() {
    let files = generate(&Opts::default(), &demo_resolve());
    let cs = text(&files, "demo.cs");
    // Transient byte-slice argument is freed after the call; string is not.
    assert!(cs.contains("var _data = Go.Seq.BytesToNByteslice(data);"));
    assert!(cs.contains("if (_data.ptr != IntPtr.Zero) { Go.Seq.Free(_data.ptr); }"));
    assert!(cs.contains("var _s = Go.Seq.StringToNString(s);"));
    assert!(!cs.contains("Go.Seq.Free(_s.ptr)"));
    // A refnum value paired with an error is destroyed before the throw.
    assert!(cs.contains("if (res.r1 != Go.Seq.NullRefNum) {"));
    assert!(cs.contains("Go.Seq.DestroyRef(res.r0);"));
    // A plain scalar-and-error result checks the error after conversion.
    assert!(cs.contains("Go.Seq.ThrowIfError(res.r1);"));
}

#[test]
fn struct_proxies() {
    let files = generate(&Opts::default(), &demo_resolve());
    let cs = text(&files, "demo.cs");
    assert!(cs.contains("public sealed class Counter : Go.Seq.IProxy, IDisposable {"));
    assert!(cs.contains("internal Counter(int refnum) { this.refnum = refnum; }"));
    // NewCounter() is a zero-argument constructor function, so no allocator
    // fallback is referenced for Counter.
    assert!(!cs.contains("new_demo_Counter"));
    assert!(cs.contains("public Counter(long start) {"));
    // The single-int32 constructor clashes with the refnum constructor.
    assert!(!cs.contains("public Counter(int "));
    // Store has no zero-argument constructor function: the default
    // constructor calls the Go-side allocator.
    assert!(cs.contains("refnum = Go.Native.new_demo_Store();"));
    assert!(cs.contains("internal static extern int new_demo_Store();"));
    assert!(cs.contains(
        "if (System.Threading.Interlocked.Exchange(ref disposed, 1) != 0) { return; }"
    ));
    assert!(cs.contains("GC.SuppressFinalize(this);"));
    assert!(cs.contains("public long Count {"));
    assert!(cs.contains("ThrowIfDisposed(); Go.Seq.ThrowIfPendingException();"));
}

#[test]
fn interfaces_and_trampolines() {
    let files = generate(&Opts::default(), &demo_resolve());
    let cs = text(&files, "demo.cs");
    assert!(cs.contains("public interface Sink {"));
    assert!(cs.contains("void Push(long n);"));
    assert!(cs.contains("internal sealed class ProxySink : Go.Seq.IProxy, Sink, IDisposable {"));
    assert!(cs.contains("if (refnum < 0) { return new ProxySink(refnum); }"));
    assert!(cs.contains("return (Sink)Go.Seq.GetRef(refnum);"));
    assert!(cs.contains(
        "if (System.Threading.Interlocked.CompareExchange(ref registered, 1, 0) != 0) { return; }"
    ));
    assert!(cs.contains("[UnmanagedFunctionPointer(CallingConvention.Cdecl)]"));
    assert!(cs.contains("private delegate void Callback_Push(int refnum, long n);"));
    assert!(cs.contains(
        "Go.Native.go_seq_set_cproxydemo_Sink_Push(Marshal.GetFunctionPointerForDelegate(Callback_PushHandler));"
    ));
    assert!(cs.contains("var instance = (Sink)Go.Seq.GetRef(refnum);"));
    // Error-only callback converts the exception into a Go error refnum.
    assert!(cs.contains("return Go.Seq.IncRef(new Go.GoError(ex));"));
    // Void callback reports through the pending queue.
    assert!(cs.contains("Go.Seq.ReportUnhandledException(ex, \"Sink.Push\");"));
    // Logger has unexported methods: callable, but not implementable.
    assert!(cs.contains("public interface Logger {"));
    assert!(cs.contains("internal sealed class ProxyLogger"));
    assert!(!cs.contains("go_seq_set_cproxydemo_Logger_Log"));
}

#[test]
fn return_records_deduped_and_sorted() {
    let files = generate(&Opts::default(), &demo_resolve());
    let cs = text(&files, "demo.cs");
    for record in [
        "internal struct CProxy_cproxydemo_Sink_Take_Return {",
        "internal struct CProxy_proxydemo_Sink_Take_Return {",
        "internal struct CProxy_proxydemo__Parse_Return {",
        "internal struct CProxy_proxydemo__OpenStore_Return {",
    ] {
        assert_eq!(cs.matches(record).count(), 1, "{record}");
    }
    // Lexicographic emission order by canonical C name: `S` sorts before
    // the `_` of the receiverless functions.
    let take_cb = cs.find("CProxy_cproxydemo_Sink_Take_Return").unwrap();
    let take = cs.find("CProxy_proxydemo_Sink_Take_Return").unwrap();
    let open = cs.find("CProxy_proxydemo__OpenStore_Return").unwrap();
    let parse = cs.find("CProxy_proxydemo__Parse_Return").unwrap();
    assert!(take_cb < take && take < open && open < parse);
}

#[test]
fn unsupported_members_skipped() {
    let files = generate(&Opts::default(), &demo_resolve());
    let cs = text(&files, "demo.cs");
    assert!(!cs.contains("Watch("));
}

#[test]
fn c_bridge_dispatchers() {
    let files = generate(&Opts::default(), &demo_resolve());
    let header = text(&files, "demo_windows.h");
    assert!(header.contains("#ifndef __DEMO_WINDOWS_H__"));
    assert!(header.contains("#include \"seq.h\""));
    assert!(header.contains("void cproxydemo_Sink_Push(int32_t refnum, int64_t n);"));
    assert!(header.contains("typedef struct cproxydemo_Sink_Take_return {"));
    assert!(header.contains("int64_t r0;"));
    assert!(header.contains("int32_t r1;"));
    assert!(!header.contains("cproxydemo_Logger_Log"));

    let c_src = text(&files, "demo_windows.c");
    assert!(c_src.contains("#include <stdatomic.h>"));
    assert!(c_src.contains("static _Atomic(cproxydemo_Sink_Push_fn) cproxydemo_Sink_Push_callback = NULL;"));
    assert!(c_src.contains("SEQ_EXPORT void go_seq_set_cproxydemo_Sink_Push(cproxydemo_Sink_Push_fn fn) {"));
    assert!(c_src.contains("atomic_store(&cproxydemo_Sink_Push_callback, fn);"));
    assert!(c_src.contains("cproxydemo_Sink_Push_fn fn = atomic_load(&cproxydemo_Sink_Push_callback);"));
    assert!(c_src.contains("abort();"));
    assert!(c_src.contains("memset(&zero, 0, sizeof(zero));"));
    assert!(c_src.contains("int32_t cproxydemo_Sink_Flush(int32_t refnum) {"));
}

#[test]
fn root_pass_runtime_and_universe() {
    let files = generate(&Opts::default(), &demo_resolve());
    let universe = text(&files, "universe.cs");
    assert!(universe.contains("internal const int NullRefNum = 41;"));
    assert!(universe.contains("private const int RefOffset = 42;"));
    assert!(universe.contains("[StructLayout(LayoutKind.Sequential)]"));
    assert!(universe.contains("internal struct NString {"));
    assert!(universe.contains("internal struct NByteslice {"));
    assert!(universe.contains("public interface Error {"));
    assert!(universe.contains("string Error();"));
    assert!(universe.contains("internal sealed class ProxyError"));
    assert!(universe.contains("internal static extern NString proxy_error_Error(int refnum);"));
    assert!(universe.contains("public sealed class GoException : Exception {"));
    assert!(universe.contains("internal sealed class GoError : Error {"));
    assert!(universe.contains("public static class Universe {"));
    assert!(universe.contains("internal interface IProxy : IDisposable {"));
    assert!(universe.contains("ConcurrentQueue<(Exception ex, string method)>"));

    let c_src = text(&files, "universe_windows.c");
    assert!(c_src.contains("nstring cproxy_error_Error(int32_t refnum) {"));
    let seq_h = text(&files, "seq.h");
    assert!(seq_h.contains("typedef struct nstring {"));
    assert!(seq_h.contains("SEQ_EXPORT void go_seq_init(void);"));
}

#[test]
fn deterministic_output() {
    let resolve = demo_resolve();
    let first = generate(&Opts::default(), &resolve);
    let second = generate(&Opts::default(), &resolve);
    let collect = |files: &Files| {
        files
            .iter()
            .map(|(name, contents)| (name.to_string(), contents.to_vec()))
            .collect::<Vec<_>>()
    };
    assert_eq!(collect(&first), collect(&second));
}

#[test]
fn namespace_and_library_options() {
    let opts = Opts {
        namespace: Some("Acme.Bind".to_string()),
        library_name: Some("acmebridge".to_string()),
        ..Opts::default()
    };
    let files = generate(&opts, &demo_resolve());
    let cs = text(&files, "demo.cs");
    // A pinned namespace is flat: the package shares the root.
    assert!(cs.contains("namespace Acme.Bind {"));
    assert!(!cs.contains("namespace Acme.Bind.Demo"));
    assert!(cs.contains("Acme.Bind.Seq.Touch();"));
    let universe = text(&files, "universe.cs");
    assert!(universe.contains("internal const string LibraryName = \"acmebridge\";"));
}

#[test]
fn cs_package_fallback_namespace() {
    let opts = Opts {
        cs_package: Some("Acme".to_string()),
        ..Opts::default()
    };
    let files = generate(&opts, &demo_resolve());
    let cs = text(&files, "demo.cs");
    assert!(cs.contains("namespace Acme.Demo {"));
}

#[test]
fn invalid_result_shape_is_an_error() {
    let resolve = Resolve {
        packages: vec![Package {
            name: "bad".to_string(),
            path: "example.org/bad".to_string(),
            consts: vec![],
            vars: vec![],
            funcs: vec![func("Pair", vec![], vec![Type::Int, Type::Int])],
            structs: vec![],
            interfaces: vec![],
        }],
    };
    let mut files = Files::default();
    let mut generator = Opts::default().build();
    generator.generate(&resolve, None, &mut files).unwrap();
    let err = generator
        .generate(&resolve, Some("bad"), &mut files)
        .unwrap_err();
    assert!(err.to_string().contains("second result must be error"));
}
