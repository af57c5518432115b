use std::fs;
use std::path::{Path, PathBuf};
use toml::Value;

fn collect_rs_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir).expect("read_dir");
    for entry in entries {
        let entry = entry.expect("dir entry");
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, files);
            continue;
        }
        if path.extension().and_then(|value| value.to_str()) == Some("rs") {
            files.push(path);
        }
    }
}

fn manifest_declares_dependency(manifest: &Value, name: &str) -> bool {
    ["dependencies", "dev-dependencies"].iter().any(|table| {
        manifest
            .get(table)
            .and_then(Value::as_table)
            .is_some_and(|deps| deps.contains_key(name))
    })
}

#[test]
fn ui_manifest_does_not_depend_on_config_or_app() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let manifest = fs::read_to_string(root.join("Cargo.toml")).expect("manifest text");
    let parsed: Value = manifest.parse().expect("parse Cargo.toml");

    for forbidden in ["chatterm-config", "chatterm-app"] {
        assert!(
            !manifest_declares_dependency(&parsed, forbidden),
            "chatterm-ui must not depend on {forbidden}"
        );
    }
}

#[test]
fn ui_sources_reach_the_backend_only_through_the_client_trait() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    collect_rs_files(&root.join("src"), &mut files);

    for file in files {
        let text = fs::read_to_string(&file).expect("source text");
        for forbidden in ["FixtureClient", "FixtureData"] {
            assert!(
                !text.contains(forbidden),
                "{} references the fixture backend directly: {forbidden}",
                file.display()
            );
        }
    }
}

#[test]
fn terminal_runtime_reports_plain_io_errors() {
    let init: fn(chatterm_ui::Palette) -> std::io::Result<chatterm_ui::Ui> = chatterm_ui::Ui::init;
    let run: fn(
        &mut chatterm_ui::Ui,
        &mut chatterm_ui::Session,
        std::time::Duration,
    ) -> std::io::Result<()> = chatterm_ui::Ui::run;
    let _ = (init, run);
}
