//! Common test utilities and helpers for sitesorter tests
#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::io::Write;
use std::sync::Mutex;
use tempfile::TempDir;

use sitesorter::{Config, Emit, EnvSettings, RunMode, Settings};

/// Rule file used across integration tests: `France` matches `FR...`,
/// `Other` is the default site and never matches
pub const RULES_YAML: &str = r#"
default_site: "Other"
groups:
  - name: "France"
    patterns: ["^FR.+"]
  - name: "Other"
    patterns: []
"#;

/// Scratch directory holding a rule file and the logs directory
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub rules_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let logs_dir = temp_dir.path().join("logs");
        let rules_path = temp_dir.path().join("rules.yml");

        let env = Self {
            temp_dir,
            rules_path,
            logs_dir,
        };
        env.write_rules(RULES_YAML);
        env
    }

    /// Replace the rule file, pointing its logs at the scratch directory
    pub fn write_rules(&self, content: &str) {
        let content = format!("{}\nlogs_dir: \"{}\"\n", content, self.logs_dir.display());
        std::fs::write(&self.rules_path, content).expect("Failed to write rule file");
    }

    pub fn settings(&self, console_url: &str, mode: RunMode) -> Settings {
        let rules = Config::load(&self.rules_path).expect("Failed to load rule file");
        let env = EnvSettings {
            api_token: "test-token".to_string(),
            console_url: console_url.to_string(),
            mode,
            retention_days: 7,
        };
        Settings::new(rules, env)
    }

    /// Concatenated content of every log file written so far
    pub fn log_contents(&self) -> String {
        let mut content = String::new();
        if let Ok(entries) = std::fs::read_dir(&self.logs_dir) {
            for entry in entries.flatten() {
                content.push_str(&std::fs::read_to_string(entry.path()).unwrap_or_default());
            }
        }
        content
    }

    /// Run the binary against a console with the given mode and stdin
    pub fn run_cli(&self, args: &[&str], console_url: &str, mode: &str, stdin: &str) -> Output {
        run_binary(&self.rules_path, args, console_url, mode, stdin)
    }
}

pub fn run_binary(rules: &Path, args: &[&str], console_url: &str, mode: &str, stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_sitesorter"))
        .arg("--config")
        .arg(rules)
        .args(args)
        .env("API_TOKEN", "test-token")
        .env("CONSOLE_URL", console_url)
        .env("ENV", mode)
        .env("RETENTION_LOGS_DAYS", "7")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start sitesorter");

    if let Some(mut input) = child.stdin.take() {
        input
            .write_all(stdin.as_bytes())
            .expect("Failed to write stdin");
    }

    child.wait_with_output().expect("Failed to wait for sitesorter")
}

/// Body of a site listing
pub fn sites_body(sites: &[(&str, &str)]) -> Value {
    json!({
        "data": {
            "allSites": { "activeLicenses": 0 },
            "sites": sites
                .iter()
                .map(|(id, name)| json!({ "id": id, "name": name, "state": "active" }))
                .collect::<Vec<_>>(),
        },
        "pagination": { "nextCursor": null, "totalItems": sites.len() },
    })
}

/// Body of an agent listing
pub fn agents_body(agents: &[(&str, &str)], next_cursor: Option<&str>) -> Value {
    json!({
        "data": agents
            .iter()
            .map(|(id, name)| json!({ "id": id, "computerName": name, "isActive": true }))
            .collect::<Vec<_>>(),
        "pagination": { "nextCursor": next_cursor, "totalItems": agents.len() },
    })
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}

/// Sink keeping every emitted message for later assertions
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains(needle))
    }
}

impl Emit for RecordingSink {
    fn emit(&self, message: &str) -> sitesorter::error::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
