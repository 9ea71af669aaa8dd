// crates/core/src/quarantine.rs

//! Human review of generated code before it reaches the store.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::store::{module_file_name, CapabilityStore};

/// Whoever decides whether a staged candidate may be installed.
///
/// The answer is returned verbatim; the gate treats `y` (any case) as
/// approval and everything else as a decline. The staged file may be edited
/// before answering.
pub trait Approver {
    fn review(&self, name: &str, staged: &Path) -> Result<String>;
}

impl<A: Approver + ?Sized> Approver for &A {
    fn review(&self, name: &str, staged: &Path) -> Result<String> {
        (**self).review(name, staged)
    }
}

/// Stages one candidate at a time in a directory of its own.
pub struct QuarantineGate<A: Approver> {
    dir: PathBuf,
    approver: A,
}

impl<A: Approver> QuarantineGate<A> {
    pub fn new<P: AsRef<Path>>(dir: P, approver: A) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            approver,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Put `candidate` up for review as the next version of `name`.
    ///
    /// Returns the approved code, including any edits the reviewer made to
    /// the staged file. Nothing is written to the store here.
    pub fn stage(&self, store: &CapabilityStore, name: &str, candidate: &str) -> Result<String> {
        let version = store.next_version(name)?;
        self.reset_dir()?;

        let staged = self.dir.join(module_file_name(name, version));
        fs::write(&staged, candidate).map_err(|e| Error::io(&staged, e))?;
        tracing::info!(capability = name, version, path = %staged.display(), "candidate staged for review");

        let answer = match self.approver.review(name, &staged) {
            Ok(answer) => answer,
            Err(err) => {
                remove_staged(&staged);
                return Err(err);
            }
        };

        if !answer.trim().eq_ignore_ascii_case("y") {
            remove_staged(&staged);
            tracing::warn!(capability = name, version, "candidate declined");
            return Err(Error::Declined {
                name: name.to_string(),
            });
        }

        // Re-read: the reviewer may have edited the file before approving.
        let approved = fs::read_to_string(&staged).map_err(|e| Error::io(&staged, e));
        remove_staged(&staged);
        let approved = approved?;

        tracing::info!(capability = name, version, "candidate approved");
        Ok(approved)
    }

    fn reset_dir(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::io(&self.dir, err)),
        }
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))
    }
}

fn remove_staged(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "failed to remove staged file: {}", err);
        }
    }
}
