use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

const SCENE: &str = r#"
project = "props/crate_set.blend"

[[materials]]
name = "Wood"

[[materials.nodes]]
name = "Principled BSDF"
type = "principled"
inputs = { "Base Color" = [0.5, 0.25, 0.0, 1.0], Roughness = 0.75 }

[[materials.nodes]]
name = "Material Output"
type = "output"

[[materials.links]]
from = "Principled BSDF:BSDF"
to = "Material Output:Surface"

[[objects]]
name = "Crate"
slots = [{ material = "Wood" }]

[[objects]]
name = "Lamp"
type = "light"
"#;

fn setup(root: &Path) {
    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(
        root.join("config/bake.toml"),
        "version = 1\nwidth = 16\nheight = 16\ntick_interval = 0\n",
    )
    .unwrap();
    fs::write(root.join("scene.toml"), SCENE).unwrap();
}

fn pbrbake(root: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_pbrbake"));
    command
        .current_dir(root)
        .env("PBRBAKE_CONFIG_DIR", root.join("config"))
        .env_remove("PBRBAKE_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn bake_cli_writes_channels_state_and_report() {
    let root = TempDir::new().unwrap();
    setup(root.path());

    let status = pbrbake(root.path())
        .args([
            "scene.toml",
            "--channels",
            "base_color,roughness",
            "--report",
            "reports/run.json",
        ])
        .status()
        .expect("failed to run pbrbake");
    assert!(status.success());

    // `//../FIN/TEXTURES/` resolves against `props/`, the project's directory.
    let textures = root.path().join("FIN/TEXTURES");
    assert!(textures.join("Base Color_crate_set.png").exists());
    assert!(textures.join("Roughness_crate_set.png").exists());

    let state = fs::read_to_string(root.path().join("config/state.toml")).unwrap();
    assert!(state.contains("last_outcome = \"done\""));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.path().join("reports/run.json")).unwrap())
            .unwrap();
    assert_eq!(report["outcome"], "done");
    assert_eq!(report["steps_completed"], 2);
    assert_eq!(report["files"].as_array().unwrap().len(), 2);
}

#[test]
fn bake_cli_cancel_leaves_no_images() {
    let root = TempDir::new().unwrap();
    setup(root.path());

    let status = pbrbake(root.path())
        .args([
            "scene.toml",
            "--naming",
            "map_only",
            "--output",
            "out",
            "--cancel-after",
            "2",
            "--report",
            "run.json",
        ])
        .status()
        .expect("failed to run pbrbake");
    assert!(status.success());

    let out = root.path().join("out");
    let leftover = fs::read_dir(&out).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(leftover, 0);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.path().join("run.json")).unwrap()).unwrap();
    assert_eq!(report["outcome"], "cancelled");
}

#[test]
fn bake_cli_rejects_unknown_channel() {
    let root = TempDir::new().unwrap();
    setup(root.path());

    let status = pbrbake(root.path())
        .args(["scene.toml", "--channels", "sheen"])
        .status()
        .expect("failed to run pbrbake");
    assert!(!status.success());
}

#[test]
fn channels_subcommand_lists_registry() {
    let root = TempDir::new().unwrap();
    let output = pbrbake(root.path())
        .arg("channels")
        .output()
        .expect("failed to run pbrbake channels");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Specular IOR Level"));
    assert!(stdout.contains("base_color"));
}
