//! CLI integration tests for kernelplan.
//!
//! Each test runs the binary in a scratch project with every build input
//! scrubbed from the environment, so only what the test sets is seen.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

use kernelplan::util::config::env;

/// Get the kernelplan binary command, isolated from the caller's environment.
fn kernelplan(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kernelplan").unwrap();
    for var in env::ALL {
        cmd.env_remove(var);
    }
    cmd.env_remove("PYTHONPATH")
        .env("HOME", project)
        .current_dir(project)
        .arg("--no-python-probe");
    cmd
}

/// Create a scratch project containing `csrc/`.
fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("csrc/kernels")).unwrap();
    tmp
}

/// Create a fake NVSHMEM install with a versioned host library.
fn fake_nvshmem(parent: &Path) -> PathBuf {
    let root = parent.join("nvshmem");
    fs::create_dir_all(root.join("include")).unwrap();
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("lib/libnvshmem_host.so.3"), b"").unwrap();
    fs::write(root.join("lib/libnvshmem_device.a"), b"").unwrap();
    root
}

fn plan_json(cmd: &mut Command) -> Value {
    let output = cmd.args(["plan", "--json"]).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// kernelplan plan
// ============================================================================

#[test]
fn test_plan_without_nvshmem() {
    let tmp = project();
    let plan = plan_json(&mut kernelplan(tmp.path()));

    assert_eq!(plan["extension"], "deep_ep_cpp");
    assert_eq!(strings(&plan["sources"]).len(), 4);
    assert_eq!(strings(&plan["link_flags"]), vec!["-lcuda"]);
    assert!(plan["nvshmem_dir"].is_null());
    assert_eq!(plan["arch_list"], "9.0");
    assert_eq!(plan["features"]["accelerator_enabled"], false);
    assert_eq!(plan["features"]["arch_generation"], "current");
    assert!(strings(&plan["compile_flags"]["cxx"]).contains(&"-DDISABLE_NVSHMEM".to_string()));
}

#[test]
fn test_plan_with_nvshmem_dir() {
    let tmp = project();
    let root = fake_nvshmem(tmp.path());
    let plan = plan_json(kernelplan(tmp.path()).env("NVSHMEM_DIR", &root));

    let sources = strings(&plan["sources"]);
    assert_eq!(sources.len(), 6);
    assert!(sources.contains(&"csrc/kernels/internode_ll.cu".to_string()));

    let link = strings(&plan["link_flags"]);
    assert!(link.contains(&"-l:libnvshmem_host.so.3".to_string()));
    assert!(link.contains(&format!("-Wl,-rpath,{}", root.join("lib").display())));
    assert!(plan["compile_flags"]["nvcc_dlink"].is_array());
}

#[test]
fn test_plan_with_missing_nvshmem_dir() {
    let tmp = project();

    kernelplan(tmp.path())
        .env("NVSHMEM_DIR", tmp.path().join("does-not-exist"))
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_legacy_generation_cascades() {
    let tmp = project();
    let root = fake_nvshmem(tmp.path());
    let plan = plan_json(
        kernelplan(tmp.path())
            .env("NVSHMEM_DIR", &root)
            .env("DISABLE_SM90_FEATURES", "1"),
    );

    assert_eq!(strings(&plan["sources"]).len(), 4);
    assert_eq!(plan["features"]["accelerator_enabled"], false);
    assert_eq!(plan["features"]["aggressive_instr_enabled"], false);
    assert_eq!(plan["arch_list"], "8.0");
    assert!(strings(&plan["compile_flags"]["nvcc"])
        .contains(&"-DDISABLE_SM90_FEATURES".to_string()));
}

#[test]
fn test_forced_nvshmem_without_install() {
    let tmp = project();

    kernelplan(tmp.path())
        .env("DISABLE_NVSHMEM", "0")
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("force-enabled"))
        .stderr(predicate::str::contains("nvshmem-requires-install"));
}

#[test]
fn test_invalid_index_width() {
    let tmp = project();

    kernelplan(tmp.path())
        .env("TOPK_IDX_BITS", "48")
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TOPK_IDX_BITS"))
        .stderr(predicate::str::contains("must be 32 or 64"));
}

#[test]
fn test_plan_is_deterministic() {
    let tmp = project();
    let root = fake_nvshmem(tmp.path());

    let run = || {
        kernelplan(tmp.path())
            .env("NVSHMEM_DIR", &root)
            .args(["plan", "--json"])
            .output()
            .unwrap()
            .stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn test_plan_summary() {
    let tmp = project();

    kernelplan(tmp.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build plan for 'deep_ep_cpp'"))
        .stdout(predicate::str::contains("NVSHMEM:        not found"))
        .stdout(predicate::str::contains("Fingerprint:"));
}

#[test]
fn test_plan_output_file() {
    let tmp = project();
    let out = tmp.path().join("plan.json");

    kernelplan(tmp.path())
        .args(["plan", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let plan: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(plan["extension"], "deep_ep_cpp");
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_project_config_and_env_precedence() {
    let tmp = project();
    fs::create_dir_all(tmp.path().join(".kernelplan")).unwrap();
    fs::write(
        tmp.path().join(".kernelplan/config.toml"),
        "[overrides]\ntopk_idx_bits = 32\n",
    )
    .unwrap();

    let plan = plan_json(&mut kernelplan(tmp.path()));
    assert_eq!(plan["features"]["index_width"], 32);

    let plan = plan_json(kernelplan(tmp.path()).env("TOPK_IDX_BITS", "64"));
    assert_eq!(plan["features"]["index_width"], 64);
}

#[test]
fn test_site_packages_from_pythonpath() {
    let tmp = project();
    let site = tmp.path().join("site");
    let package = site.join("nvidia");
    fs::create_dir_all(&package).unwrap();
    fake_nvshmem(&package);

    let plan = plan_json(kernelplan(tmp.path()).env("PYTHONPATH", &site));
    assert_eq!(strings(&plan["sources"]).len(), 6);
    assert_eq!(
        plan["nvshmem_dir"].as_str().unwrap(),
        site.join("nvidia/nvshmem").to_str().unwrap()
    );
}

#[test]
fn test_hardware_profile_disables_nvshmem() {
    let tmp = project();
    let root = fake_nvshmem(tmp.path());

    let plan = plan_json(
        kernelplan(tmp.path())
            .env("NVSHMEM_DIR", &root)
            .env("KERNELPLAN_HARDWARE_PROFILE", "single-gpu-no-rdma"),
    );
    assert_eq!(plan["features"]["accelerator_enabled"], false);
    assert_eq!(strings(&plan["sources"]).len(), 4);
}

// ============================================================================
// kernelplan flags / probe / build
// ============================================================================

#[test]
fn test_flags_index_width() {
    let tmp = project();

    kernelplan(tmp.path())
        .env("TOPK_IDX_BITS", "32")
        .args(["flags", "--host"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-DTOPK_IDX_BITS=32"))
        .stdout(predicate::str::contains("-Icsrc/"));

    kernelplan(tmp.path())
        .args(["flags", "--device"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-DTOPK_IDX_BITS=64"))
        .stdout(predicate::str::contains("-rdc=true"));
}

#[test]
fn test_flags_link() {
    let tmp = project();
    let root = fake_nvshmem(tmp.path());

    kernelplan(tmp.path())
        .env("NVSHMEM_DIR", &root)
        .args(["flags", "--link"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!(
            "-L{}",
            root.join("lib").display()
        )))
        .stdout(predicate::str::contains("-l:libnvshmem_device.a"));
}

#[test]
fn test_probe_not_found() {
    let tmp = project();

    kernelplan(tmp.path())
        .arg("probe")
        .assert()
        .success()
        .stdout(predicate::str::contains("NVSHMEM not found"))
        .stdout(predicate::str::contains("NVSHMEM_DIR: not specified"));
}

#[test]
fn test_probe_found() {
    let tmp = project();
    let root = fake_nvshmem(tmp.path());

    kernelplan(tmp.path())
        .env("NVSHMEM_DIR", &root)
        .arg("probe")
        .assert()
        .success()
        .stdout(predicate::str::contains("runtime library: libnvshmem_host.so.3"))
        .stdout(predicate::str::contains("found by:        NVSHMEM_DIR"));
}

#[cfg(unix)]
#[test]
fn test_build_pipes_plan() {
    let tmp = project();

    let output = kernelplan(tmp.path())
        .args(["build", "--invoke", "cat"])
        .output()
        .unwrap();
    assert!(output.status.success());

    // The build program's stdout passes through untouched.
    let plan: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["extension"], "deep_ep_cpp");

    // The plan summary goes to stderr ahead of the build.
    let stderr = String::from_utf8_lossy(&output.stderr);
    let summary = stderr.find("Build plan for 'deep_ep_cpp'").unwrap();
    assert!(stderr.contains("Fingerprint:"));
    assert!(summary < stderr.find("invoking").unwrap());
}

#[cfg(unix)]
#[test]
fn test_build_streams_tool_stderr() {
    let tmp = project();

    kernelplan(tmp.path())
        .args(["build", "--invoke", "sh", "--", "-c", "cat >/dev/null; echo nvcc warning >&2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("nvcc warning"));
}

#[cfg(unix)]
#[test]
fn test_build_failure() {
    let tmp = project();

    kernelplan(tmp.path())
        .args(["build", "--invoke", "sh", "--", "-c", "cat >/dev/null; exit 2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exited with"));
}
