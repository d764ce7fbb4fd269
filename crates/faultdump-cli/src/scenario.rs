//! Scenario files: the threads and call stacks of the simulated runtime.
//!
//! ```toml
//! [[threads]]
//! id = 1
//! current = true
//! frames = [
//!     { file = "test.py", name = "<module>", line = 12 },
//!     { file = "test.py", name = "f", line = 7 },
//! ]
//! ```
//!
//! Frames are listed outermost first. `code = false` models a frame without
//! a code object.

use anyhow::{Context, Result};
use faultdump_host::FileRef;
use faultdump_host::sim::{FrameSpec, SimHost};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application name for XDG directories.
const APP_NAME: &str = "faultdump";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub threads: Vec<ThreadConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadConfig {
    pub id: u64,
    /// The thread the process runs as.
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub frames: Vec<FrameConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    pub file: String,
    pub name: String,
    pub line: i32,
    #[serde(default = "default_code", skip_serializing_if = "is_true")]
    pub code: bool,
}

fn default_code() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

impl FrameConfig {
    fn new(file: &str, name: &str, line: i32) -> Self {
        FrameConfig {
            file: file.to_string(),
            name: name.to_string(),
            line,
            code: true,
        }
    }

    fn to_spec(&self) -> FrameSpec {
        let mut spec = FrameSpec::call(&self.file, &self.name, self.line);
        if !self.code {
            spec.code = None;
        }
        spec
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            threads: vec![
                ThreadConfig {
                    id: 0x7f4a_8c1d_2740,
                    current: true,
                    frames: vec![
                        FrameConfig::new("test.py", "<module>", 12),
                        FrameConfig::new("test.py", "f", 7),
                        FrameConfig::new("test.py", "g", 42),
                    ],
                },
                ThreadConfig {
                    id: 0x7f4a_8b9c_1640,
                    current: false,
                    frames: vec![
                        FrameConfig::new("threading.py", "_bootstrap", 890),
                        FrameConfig::new("worker.py", "wait_for_work", 31),
                    ],
                },
            ],
        }
    }
}

impl Scenario {
    /// Index of the thread marked current, or the first one.
    pub fn current_index(&self) -> usize {
        let mut current = self.threads.iter().enumerate().filter(|(_, t)| t.current);
        let index = current.next().map_or(0, |(index, _)| index);
        if current.next().is_some() {
            log::warn!("several threads are marked current, using thread {index}");
        }
        index
    }

    /// Build the simulated host. Its standard error is the process's.
    pub fn build_host(&self) -> SimHost {
        let stderr: FileRef = Arc::new(std::io::stderr());
        self.threads
            .iter()
            .fold(SimHost::builder(), |builder, thread| {
                let frames = thread.frames.iter().map(FrameConfig::to_spec).collect();
                builder.thread_frames(thread.id, frames)
            })
            .stderr(stderr)
            .build()
    }
}

/// Get the XDG config directory for this application.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}

/// Get the path to the default scenario file.
pub fn scenario_file_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("scenario.toml"))
}

/// Load the default scenario file, or the built-in scenario if there is none.
pub fn load_scenario() -> Scenario {
    match scenario_file_path() {
        Some(path) if path.exists() => load_scenario_from_path(&path),
        _ => Scenario::default(),
    }
}

/// Load a scenario from a specific path, falling back to the built-in one.
pub fn load_scenario_from_path(path: &Path) -> Scenario {
    if !path.exists() {
        log::warn!("Scenario file not found: {:?}", path);
        return Scenario::default();
    }

    match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Failed to parse scenario file {:?}: {}", path, e);
            Scenario::default()
        }),
        Err(e) => {
            log::warn!("Failed to read scenario file: {}", e);
            Scenario::default()
        }
    }
}

/// Render a scenario as TOML.
pub fn to_toml(scenario: &Scenario) -> Result<String> {
    toml::to_string_pretty(scenario).context("Failed to serialize scenario")
}

/// Write the built-in scenario to the default location.
pub fn init_scenario(force: bool) -> Result<PathBuf> {
    let path = scenario_file_path().context("Could not determine config directory")?;

    if path.exists() && !force {
        anyhow::bail!(
            "Scenario file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, to_toml(&Scenario::default())?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultdump_host::HostRuntime;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = toml::from_str(
            r#"
            [[threads]]
            id = 7
            frames = [{ file = "a.py", name = "main", line = 1 }]

            [[threads]]
            id = 8
            current = true
            frames = [
                { file = "b.py", name = "run", line = 2 },
                { file = "", name = "", line = 0, code = false },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(scenario.threads.len(), 2);
        assert_eq!(scenario.current_index(), 1);
        assert!(scenario.threads[0].frames[0].code);
        assert!(!scenario.threads[1].frames[1].code);
    }

    #[test]
    fn test_empty_file_is_empty_scenario() {
        let scenario: Scenario = toml::from_str("").unwrap();
        assert!(scenario.threads.is_empty());
        assert_eq!(scenario.current_index(), 0);
    }

    #[test]
    fn test_default_scenario_survives_toml() {
        let text = to_toml(&Scenario::default()).unwrap();
        assert!(!text.contains("code ="));
        let parsed: Scenario = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Scenario::default());
    }

    #[test]
    fn test_build_host() {
        let scenario = Scenario::default();
        let host = scenario.build_host();
        assert_eq!(host.thread_count(), 2);

        let main = host.thread(0).unwrap();
        assert_eq!(host.thread_id(main), 0x7f4a_8c1d_2740);
        let top = host.thread_top_frame(main).unwrap();
        let code = host.frame_code(top).unwrap();
        assert_eq!(host.code_addr_to_line(code, 0), 42);
        assert!(host.stderr().is_some());
    }

    #[test]
    fn test_frame_without_code() {
        let frame = FrameConfig {
            code: false,
            ..FrameConfig::new("x.py", "y", 3)
        };
        assert_eq!(frame.to_spec().code, None);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = load_scenario_from_path(&dir.path().join("missing.toml"));
        assert_eq!(scenario, Scenario::default());
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[[threads]]\nid = \"not a number\"\n").unwrap();
        assert_eq!(load_scenario_from_path(&path), Scenario::default());
    }
}
