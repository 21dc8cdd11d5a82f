//! E2E fixture: an isolated data root driven through the `gl` binary.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tempfile::TempDir;

pub struct E2EFixture {
    temp_dir: TempDir,
    pub root: PathBuf,
    pub config_path: PathBuf,
    scenario: String,
    start_time: Instant,
    step_count: usize,
    env: Vec<(String, String)>,
}

pub struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("invalid JSON ({err}):\n{}", self.stdout))
    }
}

impl E2EFixture {
    pub fn new(scenario: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("ladder");
        let config_path = root.join("config.toml");

        println!("\n{}", "=".repeat(70));
        println!("[E2E] Scenario: {scenario}");
        println!("[E2E] Root: {}", root.display());
        println!("{}", "=".repeat(70));

        Self {
            temp_dir: temp_dir,
            root,
            config_path,
            scenario: scenario.to_string(),
            start_time: Instant::now(),
            step_count: 0,
            env: Vec::new(),
        }
    }

    /// Extra environment for every later command.
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.env.push((key.to_string(), value.to_string()));
    }

    pub fn log_step(&mut self, description: &str) {
        self.step_count += 1;
        println!();
        println!("[STEP {}] {description} ({:?})", self.step_count, self.start_time.elapsed());
    }

    pub fn run_gl(&mut self, args: &[&str]) -> CommandOutput {
        let start = Instant::now();
        println!("[CMD] gl {}", args.join(" "));

        let mut command = Command::new(env!("CARGO_BIN_EXE_gl"));
        command
            .args(args)
            .env("HOME", self.temp_dir.path())
            .env("GL_ROOT", &self.root)
            .env("GL_CONFIG", &self.config_path)
            .env_remove("GL_ROBOT")
            .env_remove("RUST_LOG");
        for (key, value) in &self.env {
            command.env(key, value);
        }
        let output = command.output().expect("Failed to execute gl");

        let result = CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            elapsed: start.elapsed(),
        };
        println!("[CMD] Exit: {} ({:?})", result.exit_code, result.elapsed);
        if !result.stderr.is_empty() {
            println!("[STDERR] {}", result.stderr);
        }
        result
    }

    /// Run with `--robot` and return the parsed response.
    pub fn robot(&mut self, args: &[&str]) -> (CommandOutput, serde_json::Value) {
        let mut full = vec!["--robot"];
        full.extend_from_slice(args);
        let output = self.run_gl(&full);
        let json = output.json();
        (output, json)
    }

    pub fn init(&mut self) -> CommandOutput {
        self.run_gl(&["init"])
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn assert_success(&self, output: &CommandOutput, operation: &str) {
        assert!(
            output.success,
            "[{}] {operation} failed with exit code {}\nstdout: {}\nstderr: {}",
            self.scenario, output.exit_code, output.stdout, output.stderr
        );
    }

    pub fn assert_error_code(&self, output: &CommandOutput, code: &str) {
        assert!(!output.success, "[{}] expected {code}, command succeeded", self.scenario);
        assert_eq!(output.json()["status"]["error"]["code"], code);
    }

    pub fn db(&self) -> Connection {
        Connection::open(self.root.join("ladder.db")).expect("Failed to open database")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        Path::new(&self.root).join(name)
    }
}
