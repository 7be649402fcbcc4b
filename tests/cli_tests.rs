use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn gobind_cs_bin() -> &'static str {
    env!("CARGO_BIN_EXE_gobind-cs")
}

fn write_surface(dir: &Path, contents: &str) -> std::path::PathBuf {
    let surface = dir.join("surface.json");
    fs::write(&surface, contents).unwrap();
    surface
}

const COUNTER_SURFACE: &str = r#"{
    "packages": [{
        "name": "counter",
        "path": "example.org/counter",
        "funcs": [
            {"name": "Echo",
             "params": [{"name": "s", "type": "string"}],
             "results": ["string"]}
        ],
        "structs": [{
            "name": "Meter",
            "fields": [{"name": "Count", "type": "int"}],
            "methods": [
                {"name": "Inc"},
                {"name": "Value", "results": ["int"]}
            ]
        }],
        "interfaces": [{
            "name": "Sink",
            "methods": [{"name": "Push", "params": [{"name": "n", "type": "int"}]}]
        }]
    }]
}"#;

#[test]
fn generate_writes_all_passes() {
    let temp_dir = TempDir::new().unwrap();
    let surface = write_surface(temp_dir.path(), COUNTER_SURFACE);
    let out_dir = temp_dir.path().join("out");

    let output = Command::new(gobind_cs_bin())
        .args([
            "generate",
            surface.to_str().unwrap(),
            "--out-dir",
            out_dir.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "generate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    for name in [
        "universe.cs",
        "universe_windows.h",
        "universe_windows.c",
        "seq.h",
        "counter.cs",
        "counter_windows.h",
        "counter_windows.c",
    ] {
        assert!(out_dir.join(name).exists(), "missing {name}");
    }

    let cs = fs::read_to_string(out_dir.join("counter.cs")).unwrap();
    assert!(cs.contains("namespace Go.Counter {"));
    assert!(cs.contains("public sealed class Meter"));
    assert!(cs.contains("public interface Sink {"));

    let universe = fs::read_to_string(out_dir.join("universe.cs")).unwrap();
    assert!(universe.contains("internal const int NullRefNum = 41;"));
}

#[test]
fn generate_honors_namespace_and_library_options() {
    let temp_dir = TempDir::new().unwrap();
    let surface = write_surface(temp_dir.path(), COUNTER_SURFACE);
    let out_dir = temp_dir.path().join("out");

    let output = Command::new(gobind_cs_bin())
        .args([
            "generate",
            "--namespace",
            "Acme.Bridge",
            "--library-name",
            "acmecounter",
            surface.to_str().unwrap(),
            "--out-dir",
            out_dir.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let cs = fs::read_to_string(out_dir.join("counter.cs")).unwrap();
    assert!(cs.contains("namespace Acme.Bridge {"));
    let universe = fs::read_to_string(out_dir.join("universe.cs")).unwrap();
    assert!(universe.contains("internal const string LibraryName = \"acmecounter\";"));
}

#[test]
fn validate_reports_success_without_writing() {
    let temp_dir = TempDir::new().unwrap();
    let surface = write_surface(temp_dir.path(), COUNTER_SURFACE);

    let output = Command::new(gobind_cs_bin())
        .args(["validate", surface.to_str().unwrap()])
        .current_dir(temp_dir.path())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "validate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("surface parsed successfully"));
    assert!(!temp_dir.path().join("counter.cs").exists());
}

#[test]
fn validate_surfaces_member_warnings() {
    let temp_dir = TempDir::new().unwrap();
    let surface = write_surface(
        temp_dir.path(),
        r#"{
            "packages": [{
                "name": "w",
                "path": "example.org/w",
                "funcs": [
                    {"name": "Watch",
                     "params": [{"name": "ch", "type": {"unsupported": "chan int"}}]}
                ]
            }]
        }"#,
    );

    let output = Command::new(gobind_cs_bin())
        .args(["validate", surface.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("warning: skipping func Watch: unsupported type chan int"));
}

#[test]
fn bad_result_shape_fails() {
    let temp_dir = TempDir::new().unwrap();
    let surface = write_surface(
        temp_dir.path(),
        r#"{
            "packages": [{
                "name": "bad",
                "path": "example.org/bad",
                "funcs": [{"name": "Pair", "results": ["int", "int"]}]
            }]
        }"#,
    );

    let output = Command::new(gobind_cs_bin())
        .args(["validate", surface.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("second result must be error"));
}

#[test]
fn malformed_surface_fails_with_context() {
    let temp_dir = TempDir::new().unwrap();
    let surface = write_surface(temp_dir.path(), r#"{"packages": [], "unknown": true}"#);

    let output = Command::new(gobind_cs_bin())
        .args(["validate", surface.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse"));
}
