use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use agent_catalog_core::catalog::CatalogMem;
use agent_catalog_core::models::{
    CatalogDescriptor, CatalogKind, DescriptorKind, MetaVersion, RecordDescriptor,
    VersionDescriptor,
};

fn agentc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("agentc");
    path
}

/// A project with one Python tool and one prompt. The Ollama provider is
/// configured so that no command here needs a model download or a network
/// call: dry runs never embed and name lookups never encode.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let src = root.join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(
        src.join("weather.py"),
        "@tool\ndef get_weather(city: str):\n    \"\"\"Current weather for a city.\"\"\"\n    return {}\n",
    )
    .unwrap();
    fs::write(
        src.join("greet.prompt"),
        "---\nname: greet\ndescription: Greet the user by name.\n---\nHello {{ name }}!\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[catalog]
path = "{root}/.agent-catalog"
source_dirs = ["{root}/src"]

[embedding]
provider = "ollama"
model = "tiny"
url = "http://127.0.0.1:9"

[remote]
db_path = "{root}/data/catalog.sqlite"
bucket = "smoke"
"#,
        root = root.display()
    );
    let config_path = root.join("agentc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_agentc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = agentc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run agentc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Write an already-embedded prompt catalog, as `agentc index` would.
fn write_prompt_catalog(root: &Path) {
    let meta = MetaVersion::for_package(env!("CARGO_PKG_VERSION"));
    let catalog = CatalogDescriptor {
        schema_version: meta.schema_version,
        library_version: meta.library_version,
        kind: CatalogKind::Prompt,
        embedding_model: "tiny".to_string(),
        version: VersionDescriptor::committed("abc123"),
        source_dirs: vec!["src".to_string()],
        project: "main".to_string(),
        items: vec![RecordDescriptor {
            name: "greet".to_string(),
            description: "Greet the user by name.".to_string(),
            source: PathBuf::from("src/greet.prompt"),
            version: VersionDescriptor::committed("abc123"),
            embedding: Some(vec![1.0, 0.0]),
            annotations: Some(BTreeMap::from([("tone".to_string(), "warm".to_string())])),
            kind: DescriptorKind::RawPrompt {
                prompt: "Hello {{ name }}!".to_string(),
                tools: vec![],
            },
        }],
    };
    CatalogMem::new(catalog)
        .dump(&root.join(".agent-catalog/prompt-catalog.json"))
        .unwrap();
}

#[test]
fn test_status_without_catalogs() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_agentc(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("tool catalog"));
    assert!(stdout.contains("not indexed"));
}

#[test]
fn test_index_dry_run() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_agentc(&config_path, &["index", "--dry-run"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("index tool (dry-run)"));
    assert!(stdout.contains("index prompt (dry-run)"));
    assert_eq!(stdout.matches("items: 1").count(), 2, "{}", stdout);
    assert!(!tmp.path().join(".agent-catalog/tool-catalog.json").exists());
}

#[test]
fn test_index_reports_extraction_errors() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        tmp.path().join("src/broken.py"),
        "@tool\ndef no_docs():\n    return 1\n",
    )
    .unwrap();
    let (_, stderr, success) = run_agentc(&config_path, &["index", "--dry-run", "--kind", "tool"]);
    assert!(!success);
    assert!(stderr.contains("broken.py"), "{}", stderr);
}

#[test]
fn test_find_by_name_local() {
    let (tmp, config_path) = setup_test_env();
    write_prompt_catalog(tmp.path());

    let (stdout, stderr, success) = run_agentc(
        &config_path,
        &["find", "--name", "greet", "--kind", "prompt", "--local"],
    );
    assert!(success, "find failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1. [1.000] greet"), "{}", stdout);
    assert!(stdout.contains("tone=\"warm\""));
}

#[test]
fn test_find_unknown_name_prints_no_results() {
    let (tmp, config_path) = setup_test_env();
    write_prompt_catalog(tmp.path());

    let (stdout, _, success) = run_agentc(
        &config_path,
        &["find", "--name", "farewell", "--kind", "prompt", "--local"],
    );
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_publish_then_find_remote() {
    let (tmp, config_path) = setup_test_env();
    write_prompt_catalog(tmp.path());

    let (stdout, stderr, success) = run_agentc(
        &config_path,
        &["publish", "--kind", "prompt", "--annotation", "env=test"],
    );
    assert!(success, "publish failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("items: 1"));

    let (stdout, stderr, success) = run_agentc(
        &config_path,
        &[
            "find",
            "--name",
            "greet",
            "--kind",
            "prompt",
            "--db",
            "--snapshot",
            "__LATEST__",
        ],
    );
    assert!(success, "find failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("greet"));
    assert!(stdout.contains("git_abc123"));
}

#[test]
fn test_ls_lists_local_items() {
    let (tmp, config_path) = setup_test_env();
    write_prompt_catalog(tmp.path());

    let (stdout, stderr, success) = run_agentc(&config_path, &["ls"]);
    assert!(success, "ls failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("PROMPT (local, git_abc123)"), "{}", stdout);
    assert!(stdout.contains("1. greet"));
    assert!(stdout.contains("\tGreet the user by name."));
    // Nothing indexed or published for tools.
    assert!(stdout.contains("TOOL\n"), "{}", stdout);
    assert!(stdout.contains("not indexed"));
}

#[test]
fn test_ls_db_lists_published_snapshot() {
    let (tmp, config_path) = setup_test_env();
    write_prompt_catalog(tmp.path());
    let (_, stderr, success) = run_agentc(&config_path, &["publish", "--kind", "prompt"]);
    assert!(success, "publish failed: {}", stderr);

    let (stdout, stderr, success) =
        run_agentc(&config_path, &["ls", "--db", "--kind", "prompt"]);
    assert!(success, "ls failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("PROMPT (remote smoke, git_abc123)"), "{}", stdout);
    assert!(stdout.contains("1. greet"));
}

#[test]
fn test_clean_removes_catalogs() {
    let (tmp, config_path) = setup_test_env();
    write_prompt_catalog(tmp.path());
    let catalog = tmp.path().join(".agent-catalog/prompt-catalog.json");
    assert!(catalog.exists());

    let (stdout, _, success) = run_agentc(&config_path, &["clean", "--kind", "prompt"]);
    assert!(success);
    assert!(stdout.contains("removed"));
    assert!(!catalog.exists());
}

#[test]
fn test_completions() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_agentc(&config_path, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("agentc"));
}
