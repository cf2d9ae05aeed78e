//! Cleanup obligations: teardown functions and resource handles
//!
//! An obligation is tracked by the identity of its shared allocation, never by
//! value. Cloning a [`CleanupFn`] or an `Arc<T: Resource>` yields the same
//! obligation; building two identical closures yields two.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use testkit_core::{BoxError, ObligationKind};
use tokio_util::sync::CancellationToken;

/// What a teardown action returns
pub type TeardownResult = std::result::Result<(), BoxError>;

/// The result of starting a teardown action
///
/// A `Done` teardown ran synchronously and can never time out. A `Pending`
/// teardown is raced against the obligation timeout.
pub enum Teardown {
    Done(TeardownResult),
    Pending(BoxFuture<'static, TeardownResult>),
}

impl Teardown {
    /// A synchronous teardown that succeeded
    #[must_use]
    pub fn done() -> Self {
        Teardown::Done(Ok(()))
    }

    #[must_use]
    pub fn from_result<E>(result: std::result::Result<(), E>) -> Self
    where
        E: Into<BoxError>,
    {
        Teardown::Done(result.map_err(Into::into))
    }

    /// An asynchronous teardown
    pub fn pending<F, E>(future: F) -> Self
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Teardown::Pending(future.map(|result| result.map_err(Into::into)).boxed())
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Teardown::Pending(_))
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teardown::Done(result) => f.debug_tuple("Done").field(result).finish(),
            Teardown::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

type Action = dyn Fn(CancellationToken) -> Teardown + Send + Sync;

/// A function obligation
///
/// Closures may be synchronous ([`CleanupFn::new`], [`CleanupFn::from_fn`]),
/// asynchronous ([`CleanupFn::from_async`]) or asynchronous and cooperatively
/// cancellable ([`CleanupFn::cancellable`]).
///
/// A timed-out asynchronous cleanup is not interrupted: the registry stops
/// waiting for it and it keeps running in the background. Only cancellable
/// cleanups are told about the timeout, through their token.
#[derive(Clone)]
pub struct CleanupFn {
    action: Arc<Action>,
    description: Cow<'static, str>,
}

impl CleanupFn {
    /// A synchronous, fallible cleanup
    pub fn new<F, E>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::from_action(Arc::new(move |_: CancellationToken| Teardown::from_result(f())))
    }

    /// A synchronous cleanup that cannot fail
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::from_action(Arc::new(move |_: CancellationToken| {
            f();
            Teardown::done()
        }))
    }

    /// An asynchronous cleanup
    pub fn from_async<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_action(Arc::new(move |_: CancellationToken| Teardown::pending(f())))
    }

    /// An asynchronous cleanup whose token is cancelled if it times out
    pub fn cancellable<F, Fut, E>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_action(Arc::new(move |token: CancellationToken| Teardown::pending(f(token))))
    }

    fn from_action(action: Arc<Action>) -> Self {
        Self {
            action,
            description: Cow::Borrowed("cleanup function"),
        }
    }

    /// Name this cleanup in logs and failure reports
    #[must_use]
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether two handles are the same obligation
    #[must_use]
    pub fn ptr_eq(&self, other: &CleanupFn) -> bool {
        self.key() == other.key()
    }

    pub(crate) fn key(&self) -> ObligationKey {
        ObligationKey(Arc::as_ptr(&self.action).cast::<()>() as usize)
    }

    pub(crate) fn invoke(&self, cancel: CancellationToken) -> Teardown {
        (self.action)(cancel)
    }
}

impl fmt::Debug for CleanupFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupFn")
            .field("description", &self.description)
            .field("key", &self.key())
            .finish()
    }
}

/// A resource-like handle that knows how to tear itself down
///
/// Database connections, pools and sandboxes implement this and are
/// registered as `Arc<T>`.
pub trait Resource: Send + Sync + 'static {
    fn cleanup(&self) -> Teardown;

    /// Like [`Resource::cleanup`], for resources that honour cancellation
    ///
    /// The token is cancelled when the teardown loses its timeout race.
    fn cleanup_cancellable(&self, cancel: CancellationToken) -> Teardown {
        drop(cancel);
        self.cleanup()
    }

    /// Name used in logs and failure reports
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Identity of a tracked obligation: the address of its shared allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ObligationKey(usize);

impl ObligationKey {
    pub(crate) fn of_resource<T: Resource + ?Sized>(handle: &Arc<T>) -> Self {
        ObligationKey(Arc::as_ptr(handle).cast::<()>() as usize)
    }
}

/// A tracked obligation of either kind
#[derive(Clone)]
pub(crate) enum Obligation {
    Function(CleanupFn),
    Resource(Arc<dyn Resource>),
}

impl Obligation {
    pub(crate) fn kind(&self) -> ObligationKind {
        match self {
            Obligation::Function(_) => ObligationKind::Function,
            Obligation::Resource(_) => ObligationKind::Database,
        }
    }

    pub(crate) fn key(&self) -> ObligationKey {
        match self {
            Obligation::Function(f) => f.key(),
            Obligation::Resource(handle) => ObligationKey::of_resource(handle),
        }
    }

    pub(crate) fn description(&self) -> String {
        match self {
            Obligation::Function(f) => f.description().to_string(),
            Obligation::Resource(handle) => handle.describe(),
        }
    }

    pub(crate) fn invoke(&self, cancel: CancellationToken) -> Teardown {
        match self {
            Obligation::Function(f) => f.invoke(cancel),
            Obligation::Resource(handle) => handle.cleanup_cancellable(cancel),
        }
    }
}
