//! The reference runtime, emitted exactly once by the root pass: refnum
//! tracker, marshaling helpers, pending-exception queue and the two ends of
//! error translation. Everything here lands in the root namespace, so it is
//! referenced unqualified.

use crate::CSharpGen;
use gobind_core::uwriteln;
use std::fmt::Write;

impl CSharpGen<'_> {
    pub(crate) fn emit_seq_support(&mut self) {
        let cs = &mut self.cs;
        uwriteln!(cs, "internal static class Seq {{");
        uwriteln!(cs, "internal const int NullRefNum = 41;");
        uwriteln!(cs, "");
        uwriteln!(cs, "private static readonly RefTracker Tracker = new RefTracker();");
        uwriteln!(cs, "private static readonly RefCallback IncRefCallback = IncRefnum;");
        uwriteln!(cs, "private static readonly RefCallback DecRefCallback = DecRefnum;");
        uwriteln!(cs, "");
        // go_seq_init must be the first native call; the static constructor
        // of every package class touches this type to guarantee it.
        uwriteln!(cs, "static Seq() {{");
        uwriteln!(cs, "Native.go_seq_init();");
        uwriteln!(
            cs,
            "Native.go_seq_set_inc_ref(Marshal.GetFunctionPointerForDelegate(IncRefCallback));"
        );
        uwriteln!(
            cs,
            "Native.go_seq_set_dec_ref(Marshal.GetFunctionPointerForDelegate(DecRefCallback));"
        );
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static void Touch() {{ }}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static IntPtr Alloc(int size) {{ return Native.GoSeqAlloc(size); }}");
        uwriteln!(
            cs,
            "internal static void Free(IntPtr ptr) {{ if (ptr != IntPtr.Zero) {{ Native.GoSeqFree(ptr); }} }}"
        );
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static NString StringToNString(string value) {{");
        uwriteln!(cs, "if (string.IsNullOrEmpty(value)) {{ return new NString(); }}");
        uwriteln!(cs, "var bytes = Encoding.UTF8.GetBytes(value);");
        uwriteln!(cs, "var ptr = Alloc(bytes.Length);");
        uwriteln!(cs, "Marshal.Copy(bytes, 0, ptr, bytes.Length);");
        uwriteln!(cs, "return new NString {{ ptr = ptr, len = bytes.Length }};");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static string NStringToString(NString value) {{");
        uwriteln!(cs, "if (value.ptr == IntPtr.Zero || value.len == 0) {{ return string.Empty; }}");
        uwriteln!(cs, "var result = Marshal.PtrToStringUTF8(value.ptr, value.len);");
        uwriteln!(cs, "Free(value.ptr);");
        uwriteln!(cs, "return result ?? string.Empty;");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static NByteslice BytesToNByteslice(byte[] value) {{");
        uwriteln!(cs, "if (value == null || value.Length == 0) {{ return new NByteslice(); }}");
        uwriteln!(cs, "var ptr = Alloc(value.Length);");
        uwriteln!(cs, "Marshal.Copy(value, 0, ptr, value.Length);");
        uwriteln!(cs, "return new NByteslice {{ ptr = ptr, len = value.Length }};");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static byte[] NBytesliceToBytes(NByteslice value, bool free) {{");
        uwriteln!(cs, "if (value.ptr == IntPtr.Zero || value.len == 0) {{ return Array.Empty<byte>(); }}");
        uwriteln!(cs, "var result = new byte[value.len];");
        uwriteln!(cs, "Marshal.Copy(value.ptr, result, 0, value.len);");
        uwriteln!(cs, "if (free) {{ Free(value.ptr); }}");
        uwriteln!(cs, "return result;");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static int IncRef(object value) {{");
        uwriteln!(cs, "if (value == null) {{ return NullRefNum; }}");
        uwriteln!(cs, "if (value is IProxy proxy) {{ return proxy.IncRefnum(); }}");
        uwriteln!(cs, "return Tracker.Inc(value);");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static void IncGoRef(int refnum, object keepAlive) {{");
        uwriteln!(cs, "Native.IncGoRef(refnum);");
        uwriteln!(cs, "GC.KeepAlive(keepAlive);");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static void DestroyRef(int refnum) {{ Native.DestroyRef(refnum); }}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static object GetRef(int refnum) {{ return Tracker.GetRef(refnum); }}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static void ThrowIfError(int refnum) {{");
        uwriteln!(cs, "if (refnum == NullRefNum) {{ return; }}");
        uwriteln!(cs, "var error = ProxyError.FromRefnum(refnum);");
        uwriteln!(cs, "throw new GoException(error);");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(
            cs,
            "private static readonly ConcurrentQueue<(Exception ex, string method)> pendingExceptions = new ConcurrentQueue<(Exception, string)>();"
        );
        uwriteln!(cs, "");
        uwriteln!(
            cs,
            "/// <summary>Returns the most recent unhandled callback exception, if any.</summary>"
        );
        uwriteln!(
            cs,
            "public static Exception LastUnhandledException => pendingExceptions.TryPeek(out var p) ? p.ex : null;"
        );
        uwriteln!(
            cs,
            "/// <summary>Returns the method name of the most recent unhandled callback exception, if any.</summary>"
        );
        uwriteln!(
            cs,
            "public static string LastUnhandledExceptionMethod => pendingExceptions.TryPeek(out var p) ? p.method : null;"
        );
        uwriteln!(
            cs,
            "/// <summary>When true, calls Environment.FailFast on unhandled callback exceptions.</summary>"
        );
        uwriteln!(cs, "public static bool FailFastOnUnhandledCallbackException {{ get; set; }}");
        uwriteln!(cs, "public static Action<Exception, string> UnhandledCallbackException {{ get; set; }}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal static void ReportUnhandledException(Exception ex, string methodName) {{");
        uwriteln!(cs, "pendingExceptions.Enqueue((ex, methodName));");
        uwriteln!(cs, "var handler = UnhandledCallbackException;");
        uwriteln!(cs, "if (handler != null) {{ handler(ex, methodName); }}");
        uwriteln!(
            cs,
            "Console.Error.WriteLine($\"[GoBind] Unhandled exception in callback {{methodName}}: {{ex}}\");"
        );
        uwriteln!(
            cs,
            "if (FailFastOnUnhandledCallbackException) {{ Environment.FailFast($\"Unhandled exception in Go callback {{methodName}}\", ex); }}"
        );
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(
            cs,
            "/// <summary>Throws if a previous callback had an unhandled exception.</summary>"
        );
        uwriteln!(cs, "internal static void ThrowIfPendingException() {{");
        uwriteln!(cs, "if (pendingExceptions.TryDequeue(out var pending)) {{");
        uwriteln!(
            cs,
            "throw new InvalidOperationException($\"Unhandled exception in previous callback {{pending.method}}: {{pending.ex.Message}}\", pending.ex);"
        );
        uwriteln!(cs, "}}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "[UnmanagedFunctionPointer(CallingConvention.Cdecl)]");
        uwriteln!(cs, "private delegate void RefCallback(int refnum);");
        uwriteln!(cs, "");
        uwriteln!(cs, "private static void IncRefnum(int refnum) {{ Tracker.IncRefnum(refnum); }}");
        uwriteln!(cs, "private static void DecRefnum(int refnum) {{ Tracker.DecRefnum(refnum); }}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal interface IProxy : IDisposable {{");
        uwriteln!(cs, "int Refnum {{ get; }}");
        uwriteln!(cs, "int IncRefnum();");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "private sealed class RefTracker {{");
        uwriteln!(cs, "private const int RefOffset = 42;");
        uwriteln!(cs, "private int nextRefnum = RefOffset;");
        uwriteln!(cs, "private readonly Dictionary<int, Ref> refs = new Dictionary<int, Ref>();");
        uwriteln!(
            cs,
            "private readonly Dictionary<object, int> objectRefs = new Dictionary<object, int>(ReferenceEqualityComparer.Instance);"
        );
        uwriteln!(cs, "");
        uwriteln!(cs, "internal int Inc(object value) {{");
        uwriteln!(cs, "lock (refs) {{");
        uwriteln!(cs, "if (value == null) {{ return NullRefNum; }}");
        uwriteln!(cs, "if (!objectRefs.TryGetValue(value, out var refnum)) {{");
        uwriteln!(
            cs,
            "if (nextRefnum == int.MaxValue) {{ throw new InvalidOperationException(\"RefTracker: refnum overflow\"); }}"
        );
        uwriteln!(cs, "refnum = nextRefnum++;");
        uwriteln!(cs, "objectRefs[value] = refnum;");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "if (!refs.TryGetValue(refnum, out var entry)) {{");
        uwriteln!(cs, "entry = new Ref(value);");
        uwriteln!(cs, "refs[refnum] = entry;");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "entry.Inc();");
        uwriteln!(cs, "return refnum;");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal void IncRefnum(int refnum) {{");
        uwriteln!(cs, "lock (refs) {{");
        uwriteln!(cs, "if (refnum <= 0 || refnum == NullRefNum) {{ return; }}");
        uwriteln!(cs, "if (!refs.TryGetValue(refnum, out var entry)) {{");
        uwriteln!(cs, "throw new InvalidOperationException(\"unknown reference\");");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "entry.Inc();");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal void DecRefnum(int refnum) {{");
        uwriteln!(cs, "lock (refs) {{");
        uwriteln!(cs, "if (refnum <= 0 || refnum == NullRefNum) {{ return; }}");
        uwriteln!(cs, "if (!refs.TryGetValue(refnum, out var entry)) {{ return; }}");
        uwriteln!(cs, "entry.Dec();");
        uwriteln!(cs, "if (entry.Count <= 0) {{");
        uwriteln!(cs, "refs.Remove(refnum);");
        uwriteln!(cs, "objectRefs.Remove(entry.Value);");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal object GetRef(int refnum) {{");
        uwriteln!(cs, "if (refnum == NullRefNum) {{ return null; }}");
        uwriteln!(cs, "lock (refs) {{");
        uwriteln!(
            cs,
            "if (!refs.TryGetValue(refnum, out var entry)) {{ throw new InvalidOperationException(\"unknown reference\"); }}"
        );
        uwriteln!(cs, "return entry.Value;");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "private sealed class Ref {{");
        uwriteln!(cs, "internal Ref(object value) {{ Value = value; }}");
        uwriteln!(cs, "internal object Value {{ get; }}");
        uwriteln!(cs, "internal int Count {{ get; private set; }}");
        uwriteln!(
            cs,
            "internal void Inc() {{ if (Count == int.MaxValue) {{ throw new InvalidOperationException(\"Ref: refcount overflow\"); }} Count++; }}"
        );
        uwriteln!(cs, "internal void Dec() {{ Count--; }}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "private sealed class ReferenceEqualityComparer : IEqualityComparer<object> {{");
        uwriteln!(
            cs,
            "internal static readonly ReferenceEqualityComparer Instance = new ReferenceEqualityComparer();"
        );
        uwriteln!(cs, "public bool Equals(object x, object y) {{ return ReferenceEquals(x, y); }}");
        uwriteln!(
            cs,
            "public int GetHashCode(object obj) {{ return System.Runtime.CompilerServices.RuntimeHelpers.GetHashCode(obj); }}"
        );
        uwriteln!(cs, "}}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "public sealed class GoException : Exception {{");
        uwriteln!(
            cs,
            "public GoException(Error error) : base(error?.Error() ?? \"Go error\") {{ ErrorValue = error; }}"
        );
        uwriteln!(cs, "public Error ErrorValue {{ get; }}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
        uwriteln!(cs, "internal sealed class GoError : Error {{");
        uwriteln!(cs, "private readonly string message;");
        uwriteln!(cs, "internal GoError(Exception ex) {{ message = ex.Message; }}");
        uwriteln!(cs, "public string Error() {{ return message; }}");
        uwriteln!(cs, "}}");
        uwriteln!(cs, "");
    }
}
