// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Per-board status callback registration (`§4.6`).
//!
//! Threading contract: the callback runs *on the worker task*, inside its
//! status-polling loop, once per received status frame while `Running`. It
//! must not call back into the public API - doing so would deadlock on the
//! process-wide lock the façade holds for the call that is, transitively,
//! waiting on this worker.

use dio64_wire::status::Status;
use std::sync::Arc;

/// Returns `true` to request automatic unregistration after this call.
pub type StatusCallback = Arc<dyn Fn(&Status) -> bool + Send + Sync>;
