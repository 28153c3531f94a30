use std::path::{Path, PathBuf};
use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_gpuml"))
}

fn run(args: &[&str]) -> (bool, String, String) {
    let out = bin().args(args).output().unwrap();
    (
        out.status.success(),
        String::from_utf8_lossy(&out.stdout).into_owned(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    )
}

fn path_str(p: &Path) -> &str {
    p.to_str().unwrap()
}

/// Write a toy model through the CLI itself.
fn toy(dir: &tempfile::TempDir, arch: &str, scheme: &str) -> PathBuf {
    let path = dir.path().join(format!("{}-{}.gguf", arch, scheme));
    let (ok, stdout, stderr) = run(&["toy", path_str(&path), "--arch", arch, "--scheme", scheme]);
    assert!(ok, "toy failed: {}", stderr);
    assert!(stdout.contains("Wrote"));
    path
}

// ── help ────────────────────────────────────────────────────────────

#[test]
fn help_lists_subcommands() {
    let (ok, stdout, _) = run(&["--help"]);
    assert!(ok);
    for sub in ["info", "plan", "toy", "decode"] {
        assert!(stdout.contains(sub), "missing {}", sub);
    }
}

#[test]
fn no_subcommand_fails() {
    let (ok, _, _) = run(&[]);
    assert!(!ok);
}

// ── toy / info ──────────────────────────────────────────────────────

#[test]
fn info_reports_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "qwen2", "f16");
    let (ok, stdout, stderr) = run(&["info", path_str(&path)]);
    assert!(ok, "{}", stderr);
    assert!(stdout.contains("qwen2"));
    assert!(stdout.contains("F16"));
    assert!(stdout.contains("qkv_bias=true"));
    assert!(stdout.contains("Layers:        2"));
    assert!(stdout.contains("Vocab:         48"));
}

#[test]
fn info_respects_max_context() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "llama", "q8_0");
    let (ok, stdout, _) = run(&["info", path_str(&path), "--max-context", "8"]);
    assert!(ok);
    assert!(stdout.contains("Context:       8"));
}

#[test]
fn toy_rejects_unknown_arch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.gguf");
    let (ok, _, stderr) = run(&["toy", path_str(&path), "--arch", "gpt2"]);
    assert!(!ok);
    assert!(stderr.contains("unknown architecture"));
}

#[test]
fn info_missing_file_fails() {
    let (ok, _, stderr) = run(&["info", "/nonexistent/model.gguf"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to load model"));
}

// ── plan ────────────────────────────────────────────────────────────

#[test]
fn plan_prints_graphs_and_grids() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "llama", "q8_0");
    let (ok, stdout, stderr) = run(&["plan", path_str(&path), "--vendor", "nvidia"]);
    assert!(ok, "{}", stderr);
    assert!(stdout.contains("Plan: llama/Q8_0 for nvidia, 3 graphs"));
    assert!(stdout.contains("layer-0"));
    assert!(stdout.contains("consumes:     layer-1"));
    assert!(stdout.contains("attn-rms-reduce"));
    assert!(stdout.contains("logits-proj"));
    assert!(stdout.contains("download:     logits"));
}

#[test]
fn plan_fused_family_lists_fused_kernels() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "phi3", "q8_0");
    let (ok, stdout, _) = run(&["plan", path_str(&path), "--transfers"]);
    assert!(ok);
    assert!(stdout.contains("qkv-split"));
    assert!(stdout.contains("gate-up-proj"));
    assert!(stdout.contains("upload every: x, position"));
}

#[test]
fn plan_unregistered_pair_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "qwen3", "f32");
    let (ok, _, stderr) = run(&["plan", path_str(&path)]);
    assert!(!ok);
    assert!(stderr.contains("No planner registered"));
}

#[test]
fn plan_rejects_unknown_vendor() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "llama", "q8_0");
    let (ok, _, stderr) = run(&["plan", path_str(&path), "--vendor", "acme"]);
    assert!(!ok);
    assert!(stderr.contains("unknown vendor"));
}

// ── decode ──────────────────────────────────────────────────────────

#[test]
fn decode_prints_one_line_per_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "mistral", "q8_0");
    let (ok, stdout, stderr) = run(&["decode", path_str(&path), "--tokens", "1,5,9"]);
    assert!(ok, "{}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    for (pos, line) in lines.iter().enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields[0], pos.to_string());
        let id: usize = fields[2].parse().unwrap();
        assert!(id < 48);
        assert_eq!(fields[3], format!("<t{}>", id));
    }
    assert!(stderr.contains("3 steps"));
}

#[test]
fn decode_logs_session_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "llama", "f16");
    let out = bin()
        .args(["decode", path_str(&path), "--tokens", "2,4", "--vendor", "amd"])
        .env("RUST_LOG", "info")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Decoding 2 tokens with llama on amd"), "{}", stderr);
}

#[test]
fn decode_past_context_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "llama", "f32");
    let (ok, _, stderr) = run(&[
        "decode",
        path_str(&path),
        "--tokens",
        "1,2,3",
        "--max-context",
        "2",
    ]);
    assert!(!ok);
    assert!(stderr.contains("do not fit a context of 2"));
}

#[test]
fn decode_invalid_token_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = toy(&dir, "llama", "q8_0");
    let (ok, _, stderr) = run(&["decode", path_str(&path), "--tokens", "999"]);
    assert!(!ok);
    assert!(stderr.contains("outside vocabulary"));
}
