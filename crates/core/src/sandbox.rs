// crates/core/src/sandbox.rs

//! Runs the latest version of a capability and reports what happened.
//!
//! Contract:
//! - Input is a single JSON object
//! - The capability gets its own working directory and console through an
//!   [`ExecutionContext`]; the host's working directory and logging are
//!   never touched
//! - Whatever the capability throws comes back as a [`Fault`] in the
//!   [`ExecutionOutcome`], never as an `Err`

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::CapabilityStore;
use crate::types::{ExecutionOutcome, Fault, LogLevel, LogLine};

/// Private execution state handed to one capability call.
#[derive(Debug)]
pub struct ExecutionContext {
    working_dir: PathBuf,
    logs: Vec<LogLine>,
}

impl ExecutionContext {
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            logs: Vec::new(),
        }
    }

    /// Directory the capability resolves relative paths against.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        tracing::trace!(%level, "capability console: {}", message);
        self.logs.push(LogLine::new(level, message));
    }

    pub fn logs(&self) -> &[LogLine] {
        &self.logs
    }

    pub fn into_logs(self) -> Vec<LogLine> {
        self.logs
    }
}

/// Turns a stored module file into something callable.
///
/// The default implementation is [`NodeLoader`](crate::node::NodeLoader);
/// anything that can run a module behind a real isolation boundary can take
/// its place without touching the store or the repair loop.
pub trait ModuleLoader {
    fn load(&self, module: &Path, entry: &str) -> std::result::Result<Box<dyn LoadedModule + '_>, Fault>;
}

/// A loaded capability, ready to be invoked.
pub trait LoadedModule {
    /// Invoke the capability with `args`. `Ok(None)` means it returned
    /// nothing.
    fn call(
        &self,
        ctx: &mut ExecutionContext,
        args: &Value,
    ) -> std::result::Result<Option<Value>, Fault>;
}

impl<L: ModuleLoader + ?Sized> ModuleLoader for &L {
    fn load(&self, module: &Path, entry: &str) -> std::result::Result<Box<dyn LoadedModule + '_>, Fault> {
        (**self).load(module, entry)
    }
}

pub struct Sandbox<L: ModuleLoader> {
    working_dir: PathBuf,
    loader: L,
}

impl<L: ModuleLoader> Sandbox<L> {
    pub fn new<P: AsRef<Path>>(working_dir: P, loader: L) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            loader,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[cfg(test)]
    pub(crate) fn loader(&self) -> &L {
        &self.loader
    }

    /// Run the latest stored version of `name` with `args`.
    ///
    /// Fails only for bad input, an unknown capability, or a working
    /// directory that cannot be created. Everything the capability does
    /// wrong is reported in the outcome.
    pub fn execute(
        &self,
        store: &CapabilityStore,
        name: &str,
        args: &Value,
    ) -> Result<ExecutionOutcome> {
        if !args.is_object() {
            return Err(Error::Validation(format!(
                "arguments for `{}` must be a JSON object, got {}",
                name, args
            )));
        }

        let version = store.latest_version(name)?.ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })?;
        let module_path = store.module_path(name, version);

        fs::create_dir_all(&self.working_dir).map_err(|e| Error::io(&self.working_dir, e))?;
        let mut ctx = ExecutionContext::new(&self.working_dir);

        tracing::info!(capability = name, version, args = %args, "executing capability");

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let module = self.loader.load(&module_path, name)?;
            module.call(&mut ctx, args)
        }))
        .unwrap_or_else(|payload| Err(panic_fault(payload)));

        let outcome = ExecutionOutcome {
            logs: ctx.into_logs(),
            result,
        };

        match outcome.fault() {
            None => tracing::info!(capability = name, version, "capability succeeded"),
            Some(fault) => tracing::warn!(capability = name, version, %fault, "capability faulted"),
        }

        Ok(outcome)
    }
}

fn panic_fault(payload: Box<dyn std::any::Any + Send>) -> Fault {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    Fault::new("Panic", message)
}
