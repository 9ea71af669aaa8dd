// crates/core/src/manifest.rs

//! The dependency manifest shared by every capability in a store, and the
//! step that installs what it lists.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "package.json";

/// Constraint recorded for newly discovered dependencies.
pub const ANY_VERSION: &str = "*";

/// `package.json` at the store root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DependencyManifest {
    fn default() -> Self {
        Self {
            name: "generated-code".to_string(),
            version: "1.0.0".to_string(),
            dependencies: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl DependencyManifest {
    /// Load the manifest from `store_dir`, or a fresh one if there is none yet.
    pub fn load(store_dir: &Path) -> Result<Self> {
        let path = store_dir.join(MANIFEST_FILE);
        match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).map_err(|e| Error::json(&path, e)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(Error::io(path, err)),
        }
    }

    pub fn save(&self, store_dir: &Path) -> Result<()> {
        let path = store_dir.join(MANIFEST_FILE);
        let data = serde_json::to_string_pretty(self).map_err(|e| Error::json(&path, e))?;
        fs::write(&path, data).map_err(|e| Error::io(path, e))
    }

    /// Record every module not listed yet with [`ANY_VERSION`]. Existing
    /// constraints are left alone and nothing is ever removed.
    ///
    /// Returns the modules that were added.
    pub fn merge<I, S>(&mut self, modules: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = Vec::new();
        for module in modules {
            let module = module.into();
            if crate::resolver::is_builtin(&module) || self.dependencies.contains_key(&module) {
                continue;
            }
            self.dependencies
                .insert(module.clone(), ANY_VERSION.to_string());
            added.push(module);
        }
        added
    }
}

/// Installs the manifest's dependencies for a whole store directory.
pub trait DependencyInstaller {
    fn install(&self, store_dir: &Path) -> Result<()>;
}

/// Runs `npm install` in the store directory.
#[derive(Debug, Clone)]
pub struct NpmInstaller {
    program: String,
}

impl NpmInstaller {
    pub fn new() -> Self {
        Self {
            program: "npm".to_string(),
        }
    }

    /// Use a different npm executable (e.g. a full path, or `pnpm`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NpmInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyInstaller for NpmInstaller {
    fn install(&self, store_dir: &Path) -> Result<()> {
        tracing::info!(dir = %store_dir.display(), "running {} install", self.program);

        let output = Command::new(&self.program)
            .arg("install")
            .current_dir(store_dir)
            .output()
            .map_err(|e| Error::Install(format!("failed to run {}: {}", self.program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Install(format!(
                "{} install exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )))
        }
    }
}

/// Leaves dependencies uninstalled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipInstall;

impl DependencyInstaller for SkipInstall {
    fn install(&self, store_dir: &Path) -> Result<()> {
        tracing::debug!(dir = %store_dir.display(), "dependency installation skipped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn merge_is_additive_and_idempotent() {
        let mut manifest = DependencyManifest::default();
        manifest
            .dependencies
            .insert("axios".to_string(), "^1.6.0".to_string());

        let added = manifest.merge(["axios", "cheerio", "fs"]);
        assert_eq!(added, vec!["cheerio".to_string()]);
        assert_eq!(manifest.dependencies["axios"], "^1.6.0");
        assert_eq!(manifest.dependencies["cheerio"], ANY_VERSION);
        assert!(!manifest.dependencies.contains_key("fs"));

        let snapshot = manifest.clone();
        assert!(manifest.merge(["axios", "cheerio"]).is_empty());
        assert_eq!(manifest, snapshot);
    }

    #[test]
    fn load_defaults_then_round_trips_extra_keys() {
        let dir = TempDir::new().unwrap();
        let fresh = DependencyManifest::load(dir.path()).unwrap();
        assert_eq!(fresh, DependencyManifest::default());

        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name":"generated-code","version":"1.0.0","private":true,"dependencies":{"got":"*"}}"#,
        )
        .unwrap();
        let mut manifest = DependencyManifest::load(dir.path()).unwrap();
        manifest.merge(["ky"]);
        manifest.save(dir.path()).unwrap();

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["private"], Value::Bool(true));
        assert_eq!(raw["dependencies"]["got"], "*");
        assert_eq!(raw["dependencies"]["ky"], "*");
    }

    #[test]
    fn broken_manifest_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        let err = DependencyManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Json { .. }));
    }
}
