//! Projection of Go names into keyword-safe C# identifiers.

use heck::ToUpperCamelCase;

// Reserved words, plus the contextual keywords that read as reserved in
// generated code. Source:
// https://learn.microsoft.com/en-us/dotnet/csharp/language-reference/keywords/
const CSHARP_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked", "class",
    "const", "continue", "decimal", "default", "delegate", "do", "double", "else", "enum", "event",
    "explicit", "extern", "false", "finally", "fixed", "float", "for", "foreach", "goto", "if",
    "implicit", "in", "int", "interface", "internal", "is", "lock", "long", "namespace", "new",
    "null", "object", "operator", "out", "override", "params", "private", "protected", "public",
    "readonly", "ref", "return", "sbyte", "sealed", "short", "sizeof", "stackalloc", "static",
    "string", "struct", "switch", "this", "throw", "true", "try", "typeof", "uint", "ulong",
    "unchecked", "unsafe", "ushort", "using", "virtual", "void", "volatile", "while", "record",
    "init", "when", "yield", "add", "remove", "value", "var", "dynamic",
];

/// Turns an arbitrary Go identifier or path component into a valid C#
/// identifier. Keywords get a `_` suffix, characters outside
/// `[A-Za-z0-9_]` become `_`, an empty result becomes `_`, and a leading
/// digit gets a `_` prefix. Idempotent.
pub(crate) fn cs_ident(name: &str) -> String {
    let mut name = name.to_string();
    if CSHARP_KEYWORDS.contains(&name.as_str()) {
        name.push('_');
    }
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        return "_".to_string();
    }
    let first = out.chars().next().unwrap();
    if first != '_' && !first.is_ascii_alphabetic() {
        out.insert(0, '_');
    }
    out
}

/// The namespace component for a package name: upper camel case, then
/// keyword-escaped like any other identifier.
pub(crate) fn cs_namespace_component(name: &str) -> String {
    cs_ident(&name.to_upper_camel_case())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn is_valid(ident: &str) -> bool {
        let mut chars = ident.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return false,
        };
        (first.is_ascii_alphabetic() || first == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !CSHARP_KEYWORDS.contains(&ident)
    }

    #[test]
    fn keywords_escaped() {
        assert_eq!(cs_ident("string"), "string_");
        assert_eq!(cs_ident("record"), "record_");
        assert_eq!(cs_ident("value"), "value_");
        assert_eq!(cs_ident("String"), "String");
    }

    #[test]
    fn invalid_characters_replaced() {
        assert_eq!(cs_ident("héllo"), "h_llo");
        assert_eq!(cs_ident("a-b.c"), "a_b_c");
        assert_eq!(cs_ident("9lives"), "_9lives");
        assert_eq!(cs_ident(""), "_");
        assert_eq!(cs_ident("!!"), "__");
    }

    #[test]
    fn sanitized_names_are_valid_and_stable() {
        let inputs = [
            "", "x", "for", "record", "héllo", "9lives", "a-b", "_", "p0", "UTF8", "whilê",
            "var", "漢字",
        ];
        for input in inputs {
            let once = cs_ident(input);
            assert!(is_valid(&once), "{input:?} -> {once:?}");
            assert_eq!(cs_ident(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn namespace_components() {
        assert_eq!(cs_namespace_component("counter"), "Counter");
        assert_eq!(cs_namespace_component("my_pkg"), "MyPkg");
        assert_eq!(cs_namespace_component("for"), "For");
    }
}
