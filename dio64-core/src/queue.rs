// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Bounded FIFO command queue with priority-insert and collapse-last
//! semantics (`§4.3`). A [`tokio::sync::Semaphore`] plays the role of the
//! source's counting semaphore: one permit per pending entry, held alongside
//! a mutex-guarded deque so `sem.available_permits() == deque.len()` at every
//! stable point (`§8`).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

#[derive(Debug)]
pub struct QueueEntry<T> {
    pub code: u8,
    pub payload: T,
}

impl<T: Clone> Clone for QueueEntry<T> {
    fn clone(&self) -> Self {
        QueueEntry {
            code: self.code,
            payload: self.payload.clone(),
        }
    }
}

pub struct Queue<T> {
    deque: Mutex<VecDeque<QueueEntry<T>>>,
    sem: Semaphore,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Queue {
            deque: Mutex::new(VecDeque::new()),
            sem: Semaphore::new(0),
        }
    }

    /// Appends at the tail (normal) or prepends at the head (priority), then
    /// signals the semaphore.
    pub async fn add(&self, entry: QueueEntry<T>, priority: bool) {
        let mut deque = self.deque.lock().await;
        if priority {
            deque.push_front(entry);
        } else {
            deque.push_back(entry);
        }
        self.sem.add_permits(1);
    }

    /// Waits up to `timeout` for an entry, then detaches the head. Returns
    /// `None` on timeout.
    pub async fn remove(&self, timeout: Duration) -> Option<QueueEntry<T>> {
        let permit = tokio::time::timeout(timeout, self.sem.acquire())
            .await
            .ok()?
            .ok()?;
        permit.forget();
        let mut deque = self.deque.lock().await;
        deque.pop_front()
    }

    /// Collapse-last: if the tail entry has the same command code as `entry`,
    /// replace it atomically and return the evicted tail; otherwise append
    /// `entry` and return `None`. Keeps a fast status-polling producer from
    /// flooding the queue - the caller only ever sees the latest status.
    pub async fn update(&self, entry: QueueEntry<T>) -> Option<QueueEntry<T>> {
        let mut deque = self.deque.lock().await;
        if deque.back().map(|e| e.code) == Some(entry.code) {
            let evicted = deque.pop_back();
            deque.push_back(entry);
            evicted
        } else {
            deque.push_back(entry);
            self.sem.add_permits(1);
            None
        }
    }

    pub async fn len(&self) -> usize {
        self.deque.lock().await.len()
    }

    pub fn available_permits(&self) -> usize {
        self.sem.available_permits()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedQueue<T> = Arc<Queue<T>>;

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let q: Queue<i32> = Queue::new();
        q.add(QueueEntry { code: 1, payload: 10 }, false).await;
        q.add(QueueEntry { code: 2, payload: 20 }, false).await;
        let first = q.remove(Duration::from_millis(50)).await.unwrap();
        let second = q.remove(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.payload, 10);
        assert_eq!(second.payload, 20);
    }

    #[tokio::test]
    async fn priority_insert_jumps_the_queue() {
        let q: Queue<i32> = Queue::new();
        q.add(QueueEntry { code: 1, payload: 1 }, false).await;
        q.add(QueueEntry { code: 1, payload: 2 }, true).await;
        let first = q.remove(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.payload, 2);
    }

    #[tokio::test]
    async fn update_collapses_same_code_tail() {
        let q: Queue<i32> = Queue::new();
        q.add(QueueEntry { code: 9, payload: 1 }, false).await;
        let evicted = q.update(QueueEntry { code: 9, payload: 2 }).await;
        assert_eq!(evicted.unwrap().payload, 1);
        assert_eq!(q.len().await, 1);
        let remaining = q.remove(Duration::from_millis(50)).await.unwrap();
        assert_eq!(remaining.payload, 2);
    }

    #[tokio::test]
    async fn update_appends_when_codes_differ() {
        let q: Queue<i32> = Queue::new();
        q.add(QueueEntry { code: 9, payload: 1 }, false).await;
        let evicted = q.update(QueueEntry { code: 3, payload: 2 }).await;
        assert!(evicted.is_none());
        assert_eq!(q.len().await, 2);
    }

    #[tokio::test]
    async fn semaphore_count_matches_length_at_stable_points() {
        let q: Queue<i32> = Queue::new();
        for i in 0..5 {
            q.add(QueueEntry { code: i, payload: i as i32 }, false).await;
        }
        assert_eq!(q.available_permits(), q.len().await);
        q.remove(Duration::from_millis(50)).await;
        assert_eq!(q.available_permits(), q.len().await);
    }

    #[tokio::test]
    async fn remove_times_out_on_empty_queue() {
        let q: Queue<i32> = Queue::new();
        let res = q.remove(Duration::from_millis(20)).await;
        assert!(res.is_none());
    }
}
