// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Observer interface to the external dashboard/UI collaborator (`§6`).
//!
//! The core publishes these events without blocking and MUST NOT depend on
//! the observer's responsiveness for correctness - a slow or absent observer
//! never stalls a board worker or the façade.

use dio64_wire::status::Status;

#[derive(Clone, Debug)]
pub enum Event {
    BoardAdded { handle: i32, resource: String },
    BoardRemoved { handle: i32 },
    BoardIgnored { handle: i32, resource: String },
    /// Published at most once per second unless the bits actually changed.
    StatusChanged { handle: i32, status: Status },
    CommandLogged { handle: i32, command: &'static str },
    ConfigChanged { handle: i32 },
    RunCounterIncremented { handle: i32, count: u32 },
    ClockLostWarning { handle: i32 },
}

/// A non-blocking sink for core events. Implementations are responsible for
/// their own buffering; `notify` must not perform blocking I/O.
pub trait Observer: Send + Sync {
    fn notify(&self, event: Event);
}

/// Default observer used when the caller doesn't wire up a dashboard.
pub struct NullObserver;

impl Observer for NullObserver {
    fn notify(&self, _event: Event) {}
}

/// Throttles `StatusChanged` to at most once per second per handle unless the
/// status bits changed, then forwards everything else unconditionally to an
/// inner observer.
pub struct ThrottlingObserver<O> {
    inner: O,
    last: std::sync::Mutex<std::collections::HashMap<i32, (std::time::Instant, Status)>>,
}

impl<O: Observer> ThrottlingObserver<O> {
    pub fn new(inner: O) -> Self {
        ThrottlingObserver {
            inner,
            last: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl<O: Observer> Observer for ThrottlingObserver<O> {
    fn notify(&self, event: Event) {
        if let Event::StatusChanged { handle, status } = &event {
            let mut last = self.last.lock().unwrap();
            let now = std::time::Instant::now();
            if let Some((at, prev)) = last.get(handle) {
                let bits_changed = prev.bits != status.bits;
                if !bits_changed && now.duration_since(*at) < std::time::Duration::from_secs(1) {
                    return;
                }
            }
            last.insert(*handle, (now, *status));
        }
        self.inner.notify(event);
    }
}
