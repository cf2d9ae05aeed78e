//! Temp-directory sandbox lifecycle

use parking_lot::Mutex;
use std::fs;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use testkit_cleanup::{exit_hooks, CleanupRegistry, CleanupScope, ExitHookId, Resource, Teardown};
use testkit_core::{Error, Result, DEFAULT_SANDBOX_PREFIX, TESTKIT_TMPDIR_VAR};

/// Where and how a sandbox directory is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOptions {
    /// Directory name prefix
    pub prefix: String,
    /// Parent directory; falls back to `TESTKIT_TMPDIR`, then the system temp dir
    pub base_dir: Option<PathBuf>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_SANDBOX_PREFIX.to_string(),
            base_dir: None,
        }
    }
}

impl SandboxOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn in_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    #[must_use]
    pub fn resolved_base_dir(&self) -> PathBuf {
        if let Some(base) = &self.base_dir {
            return base.clone();
        }
        match std::env::var_os(TESTKIT_TMPDIR_VAR) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::temp_dir(),
        }
    }
}

/// A temporary directory removed by the cleanup registry
///
/// The directory goes away when the owning scope or the registry is drained,
/// when the process is interrupted (via the exit hooks), or when the last
/// handle is dropped after being unregistered. [`TempSandbox::keep`] opts out
/// of all three.
pub struct TempSandbox {
    path: PathBuf,
    registry: CleanupRegistry,
    released: AtomicBool,
    exit_hook: Mutex<Option<ExitHookId>>,
}

impl TempSandbox {
    /// Create a sandbox removed by the next drain of `registry`
    pub fn create(registry: &CleanupRegistry, options: SandboxOptions) -> Result<Arc<Self>> {
        let sandbox = Arc::new(Self::build(registry.clone(), &options)?);
        registry.register_database_cleanup(&sandbox);
        Ok(sandbox)
    }

    /// Create a sandbox removed when `scope` ends
    pub fn create_in_scope(scope: &CleanupScope, options: SandboxOptions) -> Result<Arc<Self>> {
        let sandbox = Arc::new(Self::build(scope.registry().clone(), &options)?);
        scope.register_database_cleanup(&sandbox);
        Ok(sandbox)
    }

    fn build(registry: CleanupRegistry, options: &SandboxOptions) -> Result<Self> {
        let base = options.resolved_base_dir();
        fs::create_dir_all(&base)
            .map_err(|e| Error::file_system(&base, "create sandbox base directory", e))?;

        let path = tempfile::Builder::new()
            .prefix(&options.prefix)
            .tempdir_in(&base)
            .map_err(|e| Error::file_system(&base, "create temporary directory", e))?
            .keep();

        let hook_path = path.clone();
        let exit_hook = exit_hooks().register(
            format!("temp sandbox {}", path.display()),
            move || {
                let _ = fs::remove_dir_all(&hook_path);
            },
        );

        tracing::debug!(path = %path.display(), "created temp sandbox");

        Ok(Self {
            path,
            registry,
            released: AtomicBool::new(false),
            exit_hook: Mutex::new(Some(exit_hook)),
        })
    }

    /// Root of the sandbox
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a path relative to the sandbox root
    ///
    /// Absolute paths and `..` components are rejected so callers cannot
    /// escape the sandbox.
    pub fn join(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let relative = relative.as_ref();
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(Error::configuration(format!(
                "path '{}' escapes the sandbox",
                relative.display()
            )));
        }
        Ok(self.path.join(relative))
    }

    /// Write a file, creating parent directories as needed
    pub fn write_file(
        &self,
        relative: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> Result<PathBuf> {
        let path = self.join(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::file_system(parent, "create directory", e))?;
        }
        fs::write(&path, contents).map_err(|e| Error::file_system(&path, "write", e))?;
        Ok(path)
    }

    pub fn read_to_string(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.join(relative)?;
        fs::read_to_string(&path).map_err(|e| Error::file_system(&path, "read", e))
    }

    pub fn create_dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.join(relative)?;
        fs::create_dir_all(&path).map_err(|e| Error::file_system(&path, "create directory", e))?;
        Ok(path)
    }

    #[must_use]
    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.join(relative).map(|p| p.exists()).unwrap_or(false)
    }

    /// Whether the sandbox has been removed or kept
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Keep the directory on disk and stop managing it
    pub fn keep(self: &Arc<Self>) -> PathBuf {
        self.released.store(true, Ordering::SeqCst);
        self.drop_exit_hook();
        self.registry.unregister_database_cleanup(self);
        self.path.clone()
    }

    fn drop_exit_hook(&self) {
        let hook = self.exit_hook.lock().take();
        if let Some(id) = hook {
            exit_hooks().unregister(id);
        }
    }
}

impl Resource for TempSandbox {
    fn cleanup(&self) -> Teardown {
        if self.released.swap(true, Ordering::SeqCst) {
            return Teardown::done();
        }
        self.drop_exit_hook();

        let path = self.path.clone();
        Teardown::pending(async move {
            let removed = tokio::fs::remove_dir_all(&path).await;
            match removed {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::file_system(path, "remove temporary directory", e)),
            }
        })
    }

    fn describe(&self) -> String {
        format!("temp sandbox {}", self.path.display())
    }
}

impl Drop for TempSandbox {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.drop_exit_hook();

        if self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::warn!(
                    "Failed to remove temporary directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

impl std::fmt::Debug for TempSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempSandbox")
            .field("path", &self.path)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Run `f` with a fresh sandbox that is removed as soon as `f` finishes
pub async fn with_temp_dir<F, Fut, T>(registry: &CleanupRegistry, f: F) -> Result<T>
where
    F: FnOnce(Arc<TempSandbox>) -> Fut,
    Fut: Future<Output = T>,
{
    with_temp_dir_in(registry, SandboxOptions::default(), f).await
}

/// [`with_temp_dir`] with explicit sandbox options
pub async fn with_temp_dir_in<F, Fut, T>(
    registry: &CleanupRegistry,
    options: SandboxOptions,
    f: F,
) -> Result<T>
where
    F: FnOnce(Arc<TempSandbox>) -> Fut,
    Fut: Future<Output = T>,
{
    registry
        .with_cleanup_scope(|scope| async move {
            let sandbox = TempSandbox::create_in_scope(&scope, options)?;
            Ok::<T, Error>(f(sandbox).await)
        })
        .await
}
