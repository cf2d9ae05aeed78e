//! Best-effort synchronous cleanup when the process is torn down
//!
//! Signals and uncaught panics do not give asynchronous work a chance to
//! finish, so only synchronous, non-blocking closures belong here (removing a
//! temp directory, deleting a socket file).

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

/// Global table of exit hooks
static EXIT_HOOKS: Lazy<ExitHooks> = Lazy::new(ExitHooks::new);

static INSTALL: Once = Once::new();

thread_local! {
    /// Depth of teardown code running on this thread whose panics get caught
    static TEARDOWN_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct TeardownGuard;

impl TeardownGuard {
    fn enter() -> Self {
        TEARDOWN_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        TEARDOWN_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `f` as teardown code: a panic inside it is caught by the caller, so
/// the panic hook must not treat it as the process going down
pub(crate) fn in_teardown<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TeardownGuard::enter();
    f()
}

fn in_teardown_now() -> bool {
    TEARDOWN_DEPTH.with(Cell::get) > 0
}

/// Handle returned by [`ExitHooks::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitHookId(u64);

struct ExitHook {
    description: String,
    run: Box<dyn FnOnce() + Send>,
}

/// Synchronous closures to run once when the process exits abnormally
pub struct ExitHooks {
    hooks: Mutex<IndexMap<ExitHookId, ExitHook>>,
    next_id: AtomicU64,
}

impl ExitHooks {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn register<F>(&self, description: impl Into<String>, f: F) -> ExitHookId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = ExitHookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.lock().insert(
            id,
            ExitHook {
                description: description.into(),
                run: Box::new(f),
            },
        );
        id
    }

    /// Drop a hook without running it; returns whether it was present
    pub fn unregister(&self, id: ExitHookId) -> bool {
        self.hooks.lock().shift_remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run and forget every hook, newest first; returns how many ran
    pub fn run_all(&self) -> usize {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        Self::run(hooks)
    }

    /// Like [`ExitHooks::run_all`], but gives up instead of waiting on the lock
    fn try_run_all(&self) -> usize {
        match self.hooks.try_lock() {
            Some(mut guard) => {
                let hooks = std::mem::take(&mut *guard);
                drop(guard);
                Self::run(hooks)
            }
            None => 0,
        }
    }

    fn run(hooks: IndexMap<ExitHookId, ExitHook>) -> usize {
        let mut ran = 0;
        for (_, hook) in hooks.into_iter().rev() {
            tracing::debug!("Exit cleanup: {}", hook.description);
            if std::panic::catch_unwind(AssertUnwindSafe(hook.run)).is_err() {
                tracing::warn!("Exit cleanup panicked: {}", hook.description);
            }
            ran += 1;
        }
        ran
    }
}

impl Default for ExitHooks {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide exit hook table
pub fn exit_hooks() -> &'static ExitHooks {
    &EXIT_HOOKS
}

/// Run exit hooks on SIGINT/SIGTERM and on panics of the main thread
///
/// Safe to call repeatedly; only the first call installs anything. Panics on
/// other threads (including test harness threads) are left alone since the
/// process keeps running after them, and so are panics raised by a cleanup
/// teardown, which the registry catches and reports.
pub fn install_exit_handler() {
    INSTALL.call_once(|| {
        #[cfg(unix)]
        {
            use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};
            use std::thread;

            let spawned = thread::Builder::new()
                .name("testkit-exit-signals".to_string())
                .spawn(|| {
                    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::error!("Failed to register signal handlers: {e}");
                            return;
                        }
                    };

                    #[allow(clippy::never_loop)]
                    for sig in signals.forever() {
                        tracing::info!("Received signal {sig}, running exit cleanup...");
                        exit_hooks().run_all();
                        std::process::exit(128 + sig);
                    }
                });
            if let Err(e) = spawned {
                tracing::error!("Failed to spawn signal listener: {e}");
            }
        }

        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            if std::thread::current().name() == Some("main") && !in_teardown_now() {
                exit_hooks().try_run_all();
            }
            original_hook(panic_info);
        }));
    });
}
