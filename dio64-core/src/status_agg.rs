// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Folds per-board status into a single result for a linked group, by
//! severity rank (`§4.4`, `§8` scenario 5).

use dio64_wire::status::{Severity, Status};

/// The member with the highest severity, and its handle. Ties keep the first
/// member seen in iteration order (primary-to-secondary, per the registry's
/// `secondaries_of` ordering) so aggregation is deterministic.
pub fn aggregate<'a, I>(members: I) -> Option<(i32, Status)>
where
    I: IntoIterator<Item = (i32, &'a Status)>,
{
    let mut best: Option<(i32, Status, Severity)> = None;
    for (handle, status) in members {
        let severity = status.severity();
        let replace = match &best {
            None => true,
            Some((_, _, best_sev)) => severity > *best_sev,
        };
        if replace {
            best = Some((handle, *status, severity));
        }
    }
    best.map(|(handle, status, _)| (handle, status))
}

#[cfg(test)]
mod test {
    use super::*;
    use dio64_wire::status::StatusBits;

    fn status(bits: StatusBits) -> Status {
        Status {
            board_time: 0,
            board_samples: 0,
            bits,
        }
    }

    #[test]
    fn error_outranks_end_and_run() {
        let members = vec![
            (1, status(StatusBits::END)),
            (2, status(StatusBits::END)),
            (3, status(StatusBits::ERR_RX)),
        ];
        let refs: Vec<(i32, &Status)> = members.iter().map(|(h, s)| (*h, s)).collect();
        let (handle, status) = aggregate(refs).unwrap();
        assert_eq!(handle, 3);
        assert_eq!(status.severity(), Severity::Error);
    }

    #[test]
    fn run_outranks_end() {
        let members = vec![
            (1, status(StatusBits::RUN)),
            (2, status(StatusBits::END)),
            (3, status(StatusBits::END)),
        ];
        let refs: Vec<(i32, &Status)> = members.iter().map(|(h, s)| (*h, s)).collect();
        let (handle, status) = aggregate(refs).unwrap();
        assert_eq!(handle, 1);
        assert_eq!(status.severity(), Severity::Run);
    }

    #[test]
    fn all_end_returns_an_end_status() {
        let members = vec![(1, status(StatusBits::END)), (2, status(StatusBits::END))];
        let refs: Vec<(i32, &Status)> = members.iter().map(|(h, s)| (*h, s)).collect();
        let (_, status) = aggregate(refs).unwrap();
        assert_eq!(status.severity(), Severity::End);
    }

    #[test]
    fn empty_group_aggregates_to_none() {
        assert!(aggregate(std::iter::empty()).is_none());
    }
}
