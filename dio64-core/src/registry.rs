// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Process-wide ordered registry of board records (`§3`, `§9`).
//!
//! The source kept a singly-linked list of records with raw pointers and a
//! `find_prev` traversal; here an arena (`Vec<Option<BoardRecord>>`) holds
//! records at stable slot indices plus two secondary maps (handle → slot,
//! resource → slot) for O(1) lookup. Tab-index ordering - the caller-visible
//! "open order" - is a separate monotonic counter, independent of storage
//! slot, so a later insert into a freed slot still sorts after everything
//! opened before it.

use crate::worker::WorkerHandle;
use dio64_wire::config::ClientConfig;
use dio64_wire::status::Status;
use rand::Rng;
use std::collections::HashMap;

/// A board's role within a linked group.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Role {
    Standalone,
    Primary { group_size: usize },
    Secondary { primary_handle: i32, index: usize },
}

pub struct BoardRecord {
    pub handle: i32,
    /// `None` marks the deferred-close sentinel: the worker is still alive,
    /// waiting out its grace window, but no external command may target the
    /// record except a matching re-open.
    pub user_board_id: Option<String>,
    pub tab_index: usize,
    pub resource: String,
    pub port_offset: usize,
    pub role: Role,
    pub config: Option<ClientConfig>,
    /// Caller sample width in effect since the last Out_Config (`§4.5`); 8 or
    /// 12. Drives whether Out_Write must slice for a linked group.
    pub sample_bytes: usize,
    pub last_status: Status,
    pub reps_programmed: u32,
    pub reps_actual: u32,
    pub ignore: bool,
    pub running: bool,
    pub worker: WorkerHandle,
}

impl BoardRecord {
    pub fn port(&self) -> &str {
        &self.resource[self.port_offset..]
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum RegistryError {
    DuplicateHandle,
    DuplicateResource,
}

pub struct Registry {
    slots: Vec<Option<BoardRecord>>,
    by_handle: HashMap<i32, usize>,
    by_resource: HashMap<String, usize>,
    next_tab_index: usize,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            slots: Vec::new(),
            by_handle: HashMap::new(),
            by_resource: HashMap::new(),
            next_tab_index: 0,
        }
    }

    /// Generates a handle that is unique among currently-live records. The
    /// source returned an opaque, random-looking token; we draw from the
    /// positive `i32` range and retry on collision (collisions are vanishingly
    /// rare but the retry keeps the uniqueness invariant airtight).
    pub fn alloc_handle(&self) -> i32 {
        let mut rng = rand::thread_rng();
        loop {
            let candidate: i32 = rng.gen_range(1..i32::MAX);
            if !self.by_handle.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn alloc_tab_index(&mut self) -> usize {
        let idx = self.next_tab_index;
        self.next_tab_index += 1;
        idx
    }

    pub fn insert(&mut self, mut record: BoardRecord) -> Result<i32, RegistryError> {
        if self.by_handle.contains_key(&record.handle) {
            return Err(RegistryError::DuplicateHandle);
        }
        if self.by_resource.contains_key(&record.resource) {
            return Err(RegistryError::DuplicateResource);
        }
        record.tab_index = self.alloc_tab_index();
        let handle = record.handle;
        let resource = record.resource.clone();
        let slot = if let Some(free) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[free] = Some(record);
            free
        } else {
            self.slots.push(Some(record));
            self.slots.len() - 1
        };
        self.by_handle.insert(handle, slot);
        self.by_resource.insert(resource, slot);
        Ok(handle)
    }

    pub fn by_handle(&self, handle: i32) -> Option<&BoardRecord> {
        self.by_handle.get(&handle).and_then(|&i| self.slots[i].as_ref())
    }

    pub fn by_handle_mut(&mut self, handle: i32) -> Option<&mut BoardRecord> {
        if let Some(&i) = self.by_handle.get(&handle) {
            self.slots[i].as_mut()
        } else {
            None
        }
    }

    pub fn by_resource(&self, resource: &str) -> Option<&BoardRecord> {
        self.by_resource
            .get(resource)
            .and_then(|&i| self.slots[i].as_ref())
    }

    pub fn by_resource_mut(&mut self, resource: &str) -> Option<&mut BoardRecord> {
        if let Some(&i) = self.by_resource.get(resource) {
            self.slots[i].as_mut()
        } else {
            None
        }
    }

    /// Removes a record entirely (worker has observed `THREAD_EXIT` and waited
    /// out the deferred-close window). The slot is freed for reuse by a later
    /// insert; tab-index ordering is untouched since it is allocated
    /// separately from slot storage.
    pub fn remove(&mut self, handle: i32) -> Option<BoardRecord> {
        let slot = self.by_handle.remove(&handle)?;
        let record = self.slots[slot].take()?;
        self.by_resource.remove(&record.resource);
        Some(record)
    }

    /// Live records in tab-index (open-order) order.
    pub fn iter_live(&self) -> impl Iterator<Item = &BoardRecord> {
        let mut live: Vec<&BoardRecord> = self.slots.iter().filter_map(|s| s.as_ref()).collect();
        live.sort_by_key(|r| r.tab_index);
        live.into_iter()
    }

    /// All secondaries of the linked group whose primary is `primary_handle`,
    /// in ascending secondary-index order.
    pub fn secondaries_of(&self, primary_handle: i32) -> Vec<&BoardRecord> {
        let mut secs: Vec<&BoardRecord> = self
            .slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|r| matches!(r.role, Role::Secondary { primary_handle: p, .. } if p == primary_handle))
            .collect();
        secs.sort_by_key(|r| match r.role {
            Role::Secondary { index, .. } => index,
            _ => usize::MAX,
        });
        secs
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::worker::WorkerHandle;

    fn dummy_record(handle: i32, resource: &str) -> BoardRecord {
        BoardRecord {
            handle,
            user_board_id: Some("b".into()),
            tab_index: 0,
            resource: resource.to_string(),
            port_offset: resource.find(':').map(|i| i + 1).unwrap_or(0),
            role: Role::Standalone,
            config: None,
            sample_bytes: 8,
            last_status: Status::default(),
            reps_programmed: 0,
            reps_actual: 0,
            ignore: false,
            running: false,
            worker: WorkerHandle::detached(),
        }
    }

    #[test]
    fn tab_indices_are_monotonic_and_survive_gaps() {
        let mut reg = Registry::new();
        let h1 = reg.insert(dummy_record(1, "10.0.0.1:49701")).unwrap();
        let h2 = reg.insert(dummy_record(2, "10.0.0.2:49701")).unwrap();
        let h3 = reg.insert(dummy_record(3, "10.0.0.3:49701")).unwrap();
        assert!(reg.by_handle(h1).unwrap().tab_index < reg.by_handle(h2).unwrap().tab_index);
        assert!(reg.by_handle(h2).unwrap().tab_index < reg.by_handle(h3).unwrap().tab_index);

        reg.remove(h2);
        let h4 = reg.insert(dummy_record(4, "10.0.0.4:49701")).unwrap();
        // h4 reuses h2's freed slot but still sorts after h3 in open order.
        assert!(reg.by_handle(h3).unwrap().tab_index < reg.by_handle(h4).unwrap().tab_index);
    }

    #[test]
    fn duplicate_handle_is_rejected() {
        let mut reg = Registry::new();
        reg.insert(dummy_record(1, "10.0.0.1:49701")).unwrap();
        let err = reg.insert(dummy_record(1, "10.0.0.2:49701")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateHandle);
    }

    #[test]
    fn duplicate_resource_is_rejected() {
        let mut reg = Registry::new();
        reg.insert(dummy_record(1, "10.0.0.1:49701")).unwrap();
        let err = reg.insert(dummy_record(2, "10.0.0.1:49701")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateResource);
    }

    #[test]
    fn port_substring_is_sliced_from_the_stored_offset() {
        let rec = dummy_record(1, "192.168.1.120:49701");
        assert_eq!(rec.port(), "49701");
    }
}
