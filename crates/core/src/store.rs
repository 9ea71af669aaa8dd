// crates/core/src/store.rs

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::manifest::{DependencyInstaller, DependencyManifest, NpmInstaller, MANIFEST_FILE};
use crate::resolver;
use crate::types::{CapabilitySpec, Version};

pub const MODULE_EXTENSION: &str = "mjs";

static CAPABILITY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// File name of one version of a capability module.
///
/// Version 1 carries no suffix so stores written before versioning existed
/// keep working: `sendEmail.mjs`, `sendEmail2.mjs`, `sendEmail3.mjs`, ...
pub fn module_file_name(name: &str, version: Version) -> String {
    if version == 1 {
        format!("{}.{}", name, MODULE_EXTENSION)
    } else {
        format!("{}{}.{}", name, version, MODULE_EXTENSION)
    }
}

/// Check that `name` can be a capability name.
///
/// It has to be a JavaScript identifier (it is the export the sandbox calls)
/// and must not end in a digit, which would read as a version suffix.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("capability name is required".into()));
    }
    if !CAPABILITY_NAME.is_match(name) {
        return Err(Error::Validation(format!(
            "capability name `{}` must be a JavaScript identifier",
            name
        )));
    }
    if name.ends_with(|c: char| c.is_ascii_digit()) {
        return Err(Error::Validation(format!(
            "capability name `{}` must not end in a digit",
            name
        )));
    }
    if format!("{}.json", name) == MANIFEST_FILE {
        return Err(Error::Validation(format!(
            "capability name `{}` is reserved",
            name
        )));
    }
    Ok(())
}

/// Versioned, append-only storage of capability modules and their specs.
///
/// Layout:
/// <root>/
///   package.json        shared dependency manifest
///   <name>.mjs          version 1
///   <name><n>.mjs       version n
///   <name>.json         spec, overwritten on regeneration
pub struct CapabilityStore {
    root: PathBuf,
    installer: Box<dyn DependencyInstaller>,
}

impl CapabilityStore {
    /// Store rooted at `root`, installing dependencies with npm.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_installer(root, NpmInstaller::new())
    }

    pub fn with_installer<P: AsRef<Path>>(
        root: P,
        installer: impl DependencyInstaller + 'static,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            installer: Box::new(installer),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module_path(&self, name: &str, version: Version) -> PathBuf {
        self.root.join(module_file_name(name, version))
    }

    /// Highest stored version of `name`, or `None` if it was never stored.
    pub fn latest_version(&self, name: &str) -> Result<Option<Version>> {
        validate_name(name)?;

        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::io(&self.root, err)),
        };

        let pattern = Regex::new(&format!(
            r"^{}(\d*)\.{}$",
            regex::escape(name),
            MODULE_EXTENSION
        ))
        .map_err(|e| Error::Validation(e.to_string()))?;

        let mut latest: Option<Version> = None;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.root, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(caps) = pattern.captures(file_name) else {
                continue;
            };
            let version = match &caps[1] {
                "" => 1,
                digits => match digits.parse::<Version>() {
                    Ok(v) => v,
                    Err(_) => continue,
                },
            };
            latest = Some(latest.map_or(version, |v| v.max(version)));
        }

        Ok(latest)
    }

    /// The version the next `put` for `name` will allocate.
    pub fn next_version(&self, name: &str) -> Result<Version> {
        Ok(self.latest_version(name)?.map_or(1, |v| v + 1))
    }

    /// Store `source` as a new version of `name` and bring the shared
    /// manifest and installed dependencies up to date.
    ///
    /// A failed install is reported as [`Error::Install`], but the new
    /// version and the manifest stay written: the module is already the
    /// latest version and there is no rollback.
    pub fn put(&self, name: &str, source: &str) -> Result<Version> {
        validate_name(name)?;
        if source.trim().is_empty() {
            return Err(Error::Validation(format!(
                "source code for `{}` is required",
                name
            )));
        }

        fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;

        let version = self.next_version(name)?;
        let path = self.module_path(name, version);

        // create_new: an existing version is never overwritten.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        file.write_all(source.as_bytes())
            .map_err(|e| Error::io(&path, e))?;

        tracing::info!(capability = name, version, path = %path.display(), "stored capability module");

        let mut manifest = DependencyManifest::load(&self.root)?;
        let added = manifest.merge(resolver::imported_modules(source));
        manifest.save(&self.root)?;
        if !added.is_empty() {
            tracing::info!(capability = name, ?added, "new dependencies recorded");
        }

        if let Err(err) = self.installer.install(&self.root) {
            tracing::warn!(
                capability = name,
                version,
                error = %err,
                "dependency install failed; the new version stays committed"
            );
            return Err(err);
        }

        Ok(version)
    }

    /// Source of the latest version of `name`.
    pub fn read(&self, name: &str) -> Result<String> {
        let version = self.latest_version(name)?.ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })?;
        self.read_version(name, version)
    }

    pub fn read_version(&self, name: &str, version: Version) -> Result<String> {
        validate_name(name)?;
        let path = self.module_path(name, version);
        match fs::read_to_string(&path) {
            Ok(source) => Ok(source),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound {
                name: name.to_string(),
            }),
            Err(err) => Err(Error::io(path, err)),
        }
    }

    pub fn spec_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    /// Write (or overwrite) the spec of `name`.
    pub fn put_spec(&self, name: &str, spec: &CapabilitySpec) -> Result<()> {
        validate_name(name)?;
        fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;

        let path = self.spec_path(name);
        let data = serde_json::to_string_pretty(spec).map_err(|e| Error::json(&path, e))?;
        fs::write(&path, data).map_err(|e| Error::io(&path, e))?;
        tracing::debug!(capability = name, path = %path.display(), "stored capability spec");
        Ok(())
    }

    pub fn read_spec(&self, name: &str) -> Result<Option<CapabilitySpec>> {
        validate_name(name)?;
        let path = self.spec_path(name);
        match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)
                .map(Some)
                .map_err(|e| Error::json(&path, e)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(path, err)),
        }
    }

    /// Every stored spec, sorted by capability name.
    pub fn specs(&self) -> Result<Vec<CapabilitySpec>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::io(&self.root, err)),
        };

        let mut specs = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::io(&self.root, e))?.path();
            let is_spec = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|f| f != MANIFEST_FILE);
            if !is_spec || !path.is_file() {
                continue;
            }
            let data = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            let spec: CapabilitySpec =
                serde_json::from_str(&data).map_err(|e| Error::json(&path, e))?;
            specs.push(spec);
        }

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    pub fn manifest(&self) -> Result<DependencyManifest> {
        DependencyManifest::load(&self.root)
    }
}
