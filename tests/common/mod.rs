//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use testkit::{BoxError, CleanupFn, Resource, Teardown};

/// How a fake connection behaves when closed
#[derive(Debug, Clone, Copy)]
pub enum CloseBehaviour {
    Immediate,
    After(Duration),
    Fail,
}

/// Stand-in for a SQL connection that counts how often it was closed
pub struct FakeDatabase {
    pub name: &'static str,
    pub behaviour: CloseBehaviour,
    pub closed: Arc<AtomicUsize>,
}

impl FakeDatabase {
    pub fn new(name: &'static str, behaviour: CloseBehaviour) -> Self {
        Self {
            name,
            behaviour,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Resource for FakeDatabase {
    fn cleanup(&self) -> Teardown {
        let closed = self.closed.clone();
        match self.behaviour {
            CloseBehaviour::Immediate => {
                closed.fetch_add(1, Ordering::SeqCst);
                Teardown::done()
            }
            CloseBehaviour::After(delay) => Teardown::pending(async move {
                tokio::time::sleep(delay).await;
                closed.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }),
            CloseBehaviour::Fail => Teardown::from_result(Err::<(), BoxError>(
                "connection already closed by server".into(),
            )),
        }
    }

    fn describe(&self) -> String {
        format!("database {}", self.name)
    }
}

/// A cleanup function plus a counter of how many times it ran
pub fn counting_cleanup(description: &'static str) -> (CleanupFn, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let cleanup = CleanupFn::from_fn(move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .with_description(description);
    (cleanup, calls)
}

pub fn failing_cleanup(description: &'static str, message: &'static str) -> CleanupFn {
    CleanupFn::new(move || Err::<(), BoxError>(message.into())).with_description(description)
}
