use std::path::PathBuf;
use std::process::Command;

use gpuml_gguf::{GGMLType, GgufBuilder};

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_gpuml-gguf-inspect"))
}

fn llama_container() -> Vec<u8> {
    let mut b = GgufBuilder::new();
    b.add_string("general.architecture", "llama")
        .add_u32("llama.embedding_length", 64)
        .add_u32("llama.feed_forward_length", 128)
        .add_u32("llama.block_count", 2)
        .add_u32("llama.attention.head_count", 4)
        .add_u32("llama.attention.head_count_kv", 2)
        .add_u32("llama.context_length", 256)
        .add_f32("llama.attention.layer_norm_rms_epsilon", 1e-5)
        .add_bool("general.quantized", true)
        .add_string("general.name", "toy")
        .add_string_array("tokenizer.ggml.tokens", &["<s>", "</s>", "a"])
        .add_tensor_f32("token_embd.weight", &[64, 3], &vec![0.25; 192])
        .add_tensor_f32("output_norm.weight", &[64], &vec![1.0; 64])
        .add_tensor_raw("blk.0.attn_q.weight", &[64, 64], GGMLType::Q8_0, vec![0u8; 128 * 34]);
    b.build()
}

fn write_container(dir: &tempfile::TempDir, data: &[u8]) -> PathBuf {
    let path = dir.path().join("model.gguf");
    std::fs::write(&path, data).unwrap();
    path
}

fn run(args: &[&str], path: &PathBuf) -> (bool, String, String) {
    let out = bin().args(args).arg(path).output().unwrap();
    (
        out.status.success(),
        String::from_utf8_lossy(&out.stdout).into_owned(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    )
}

// ── help ────────────────────────────────────────────────────────────

#[test]
fn help_flag() {
    let out = bin().arg("--help").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("gpuml-gguf-inspect"));
    assert!(stdout.contains("info"));
    assert!(stdout.contains("meta"));
    assert!(stdout.contains("tensors"));
}

#[test]
fn no_subcommand_fails() {
    let out = bin().output().unwrap();
    assert!(!out.status.success());
}

// ── info ────────────────────────────────────────────────────────────

#[test]
fn info_shows_header_and_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, &llama_container());
    let (ok, stdout, _) = run(&["info"], &path);
    assert!(ok);
    assert!(stdout.contains("GGUF version:  3"));
    assert!(stdout.contains("Tensor count:  3"));
    assert!(stdout.contains("Alignment:     32"));
    assert!(stdout.contains("Architecture:  llama"));
    assert!(stdout.contains("Layers:        2"));
    assert!(stdout.contains("KV heads:      2"));
}

#[test]
fn info_groups_bytes_by_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, &llama_container());
    let (ok, stdout, _) = run(&["info"], &path);
    assert!(ok);
    assert!(stdout.contains("F32"));
    assert!(stdout.contains("Q8_0"));
    assert!(stdout.contains(&format!("{}", 128 * 34)));
}

#[test]
fn info_minimal_container() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, &GgufBuilder::new().build());
    let (ok, stdout, _) = run(&["info"], &path);
    assert!(ok);
    assert!(stdout.contains("Tensor count:  0"));
    assert!(stdout.contains("(not declared)"));
}

// ── meta ────────────────────────────────────────────────────────────

#[test]
fn meta_lists_keys_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, &llama_container());
    let (ok, stdout, _) = run(&["meta"], &path);
    assert!(ok);
    let keys: Vec<&str> = stdout.lines().filter_map(|l| l.split(" = ").next()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert!(stdout.contains("general.quantized = true"));
    assert!(stdout.contains("general.name = \"toy\""));
    assert!(stdout.contains("tokenizer.ggml.tokens = [array, len=3]"));
}

#[test]
fn meta_filter_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, &llama_container());
    let (ok, stdout, _) = run(&["meta", "--key", "llama.block_count"], &path);
    assert!(ok);
    assert_eq!(stdout.trim(), "llama.block_count = 2");
}

#[test]
fn meta_missing_key_reports_on_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, &llama_container());
    let (ok, stdout, stderr) = run(&["meta", "--key", "nope"], &path);
    assert!(ok);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Key not found: nope"));
}

// ── tensors ─────────────────────────────────────────────────────────

#[test]
fn tensors_lists_all() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, &llama_container());
    let (ok, stdout, stderr) = run(&["tensors"], &path);
    assert!(ok);
    assert!(stdout.contains("token_embd.weight"));
    assert!(stdout.contains("blk.0.attn_q.weight"));
    assert!(stdout.contains("[3, 64]"));
    assert!(stderr.contains("3 tensor(s) listed"));
}

#[test]
fn tensors_filter_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, &llama_container());
    let (ok, stdout, stderr) = run(&["tensors", "--filter", "blk."], &path);
    assert!(ok);
    assert!(stdout.contains("Q8_0"));
    assert!(!stdout.contains("token_embd"));
    assert!(stderr.contains("1 tensor(s) listed"));
}

// ── failures ────────────────────────────────────────────────────────

#[test]
fn nonexistent_file_fails() {
    let out = bin().args(["info", "/nonexistent/model.gguf"]).output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Failed to open GGUF"));
}

#[test]
fn invalid_container_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(&dir, b"this is not a container at all");
    let (ok, _, stderr) = run(&["info"], &path);
    assert!(!ok);
    assert!(stderr.contains("Invalid GGUF format"));
}

#[test]
fn truncated_data_region_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = llama_container();
    data.truncate(data.len() - 64);
    let path = write_container(&dir, &data);
    let (ok, _, stderr) = run(&["tensors"], &path);
    assert!(!ok);
    assert!(stderr.contains("exceeds mapped region"));
}
