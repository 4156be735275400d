use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cornerturn"))
}

#[test]
fn emit_writes_cuda_source_to_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("turn.cu");
    let status = bin()
        .args(["emit", "turn_f32", "--lanes", "4", "--out-file"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());
    let source = std::fs::read_to_string(&path).unwrap();
    assert!(source.contains("extern \"C\" __global__ void turn_f32("));
    assert!(source.contains("__shfl_sync"));
    assert!(source.contains("out[3] = in[3];"));
}

#[test]
fn emit_prints_wgsl_to_stdout() {
    let out = bin()
        .args(["emit", "turn_w", "--dialect", "wgsl", "--lanes", "8"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("subgroupShuffle"));
    assert!(text.contains("fn turn_w("));
}

#[test]
fn emit_honors_custom_transforms_and_mask() {
    let out = bin()
        .args([
            "emit",
            "turn_custom",
            "--lanes",
            "2",
            "--transform",
            "out[0] = in[0] * 2.0f;",
            "--transform",
            "out[1] = in[1] * 2.0f;",
            "--mask",
            "0xffffffffu",
        ])
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("out[0] = in[0] * 2.0f;"));
    assert!(text.contains("const unsigned int mask = 0xffffffffu;"));
}

#[test]
fn cycles_json_chains_source_to_destination() {
    let out = bin()
        .args(["cycles", "4", "--case", "1", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(rows[0]["case"], 1);
    let cycle = &rows[0]["cycles"][0];
    assert_eq!(cycle[0]["dst"], 1);
    assert_eq!(cycle[0]["src"], 0);
    assert_eq!(cycle[3]["dst"], 0);
    assert_eq!(cycle[3]["src"], 3);
}

#[test]
fn invalid_group_sizes_fail_loudly() {
    let out = bin().args(["cycles", "6"]).output().unwrap();
    assert!(!out.status.success());
    let out = bin()
        .args(["emit", "turn_bad", "--lanes", "12"])
        .output()
        .unwrap();
    assert!(!out.status.success());
}
