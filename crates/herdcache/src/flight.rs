//! Call coalescing for concurrent lookups of the same key
//!
//! The first caller for a key (the leader) runs the work; callers arriving
//! while it runs block on the same record and receive a clone of its result.
//! The record is dropped as soon as the leader finishes, so nothing is
//! memoized past one wave.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::{Condvar, Mutex};

enum CallState<T> {
    Pending,
    Done(T),
    /// The leader unwound without a result
    Abandoned,
}

/// One in-flight wave for a key
struct Call<T> {
    state: Mutex<CallState<T>>,
    done: Condvar,
}

impl<T: Clone> Call<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState::Pending),
            done: Condvar::new(),
        }
    }

    /// Block until the leader settles; `None` if it gave up
    fn wait(&self) -> Option<T> {
        let mut state = self.state.lock();
        while matches!(*state, CallState::Pending) {
            self.done.wait(&mut state);
        }
        match &*state {
            CallState::Done(value) => Some(value.clone()),
            _ => None,
        }
    }
}

/// Deduplicates concurrent work by key.
///
/// The map lock is only held to find or publish a record, never while the
/// work runs or while followers wait.
pub struct Flight<T> {
    calls: Mutex<HashMap<String, Arc<Call<T>>, RandomState>>,
}

impl<T> Default for Flight<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::with_hasher(RandomState::new())),
        }
    }
}

impl<T: Clone> Flight<T> {
    /// Create an empty coalescer
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `func` for `key` unless a run is already in flight, in which case
    /// wait for that run and return its result instead.
    ///
    /// If the running leader panics, its followers wake up and one of them
    /// takes over with its own `func`.
    pub fn work<F>(&self, key: &str, func: F) -> T
    where
        F: FnOnce() -> T,
    {
        let call = loop {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(call) => {
                    let call = Arc::clone(call);
                    drop(calls);
                    if let Some(value) = call.wait() {
                        return value;
                    }
                }
                None => {
                    let call = Arc::new(Call::new());
                    calls.insert(key.to_owned(), Arc::clone(&call));
                    break call;
                }
            }
        };

        let leader = Leader {
            flight: self,
            key,
            call,
        };
        let value = func();
        leader.complete(value.clone());
        value
    }

    /// Number of keys with a run in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

/// Owns a published record until the leader finishes or unwinds
struct Leader<'a, T: Clone> {
    flight: &'a Flight<T>,
    key: &'a str,
    call: Arc<Call<T>>,
}

impl<T: Clone> Leader<'_, T> {
    fn complete(self, value: T) {
        *self.call.state.lock() = CallState::Done(value);
    }
}

impl<T: Clone> Drop for Leader<'_, T> {
    fn drop(&mut self) {
        {
            let mut calls = self.flight.calls.lock();
            if calls
                .get(self.key)
                .is_some_and(|call| Arc::ptr_eq(call, &self.call))
            {
                calls.remove(self.key);
            }
        }

        let mut state = self.call.state.lock();
        if matches!(*state, CallState::Pending) {
            *state = CallState::Abandoned;
        }
        drop(state);
        self.call.done.notify_all();
    }
}
