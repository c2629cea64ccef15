// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Subscribers notified as a batch progresses
//!
//! Every notification is isolated: a hook that errors or panics is logged
//! and never affects the build or the remaining hooks.

use std::panic::{self, AssertUnwindSafe};

use log::{error, trace};
use thiserror::Error;

use crate::{
    platform::PlatformProfile,
    profile::{self, Profile},
    request::Request,
    result::{BuildResult, Task},
};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct Error(pub String);

impl Error {
    pub fn new(message: impl ToString) -> Self {
        Self(message.to_string())
    }
}

#[allow(unused_variables)]
pub trait Hook {
    fn batch_start(&self, request: &Request) -> Result<(), Error> {
        Ok(())
    }

    fn batch_end(&self, result: &BuildResult) -> Result<(), Error> {
        Ok(())
    }

    fn profile_start(&self, id: &profile::Id, profile: &Profile) -> Result<(), Error> {
        Ok(())
    }

    fn context_start(&self, id: &profile::Id, platform: &PlatformProfile) -> Result<(), Error> {
        Ok(())
    }

    fn context_end(&self, task: &Task) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Default)]
pub struct Hooks {
    subscribers: Vec<(String, Box<dyn Hook>)>,
}

impl Hooks {
    pub fn register(&mut self, name: impl ToString, hook: impl Hook + 'static) {
        self.subscribers.push((name.to_string(), Box::new(hook)));
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub(crate) fn batch_start(&self, request: &Request) {
        self.notify("batch start", |hook| hook.batch_start(request));
    }

    pub(crate) fn batch_end(&self, result: &BuildResult) {
        self.notify("batch end", |hook| hook.batch_end(result));
    }

    pub(crate) fn profile_start(&self, id: &profile::Id, profile: &Profile) {
        self.notify("profile start", |hook| hook.profile_start(id, profile));
    }

    pub(crate) fn context_start(&self, id: &profile::Id, platform: &PlatformProfile) {
        self.notify("context start", |hook| hook.context_start(id, platform));
    }

    pub(crate) fn context_end(&self, task: &Task) {
        self.notify("context end", |hook| hook.context_end(task));
    }

    fn notify(&self, event: &str, f: impl Fn(&dyn Hook) -> Result<(), Error>) {
        for (name, hook) in &self.subscribers {
            trace!("Hook {name}: {event}");

            match panic::catch_unwind(AssertUnwindSafe(|| f(hook.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Hook {name} failed on {event}: {e}"),
                Err(payload) => error!("Hook {name} panicked on {event}: {}", panic_message(&*payload)),
            }
        }
    }
}

/// Best effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, rc::Rc};

    use chrono::Utc;

    use super::*;

    struct Failing;

    impl Hook for Failing {
        fn batch_end(&self, _: &BuildResult) -> Result<(), Error> {
            Err(Error::new("disk full"))
        }
    }

    struct Panicking;

    impl Hook for Panicking {
        fn batch_end(&self, _: &BuildResult) -> Result<(), Error> {
            panic!("hook bug")
        }
    }

    struct Counting(Rc<Cell<usize>>);

    impl Hook for Counting {
        fn batch_end(&self, _: &BuildResult) -> Result<(), Error> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn failures_are_isolated() {
        let calls = Rc::new(Cell::new(0));

        let mut hooks = Hooks::default();
        hooks.register("failing", Failing);
        hooks.register("panicking", Panicking);
        hooks.register("counting", Counting(calls.clone()));
        assert_eq!(hooks.len(), 3);

        let result = BuildResult::new(Utc::now());
        hooks.batch_end(&result);
        hooks.batch_end(&result);

        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_owned()), "owned");
        assert_eq!(panic_message(&42), "unknown panic");
    }
}
