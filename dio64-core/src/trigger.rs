// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Translates the DIO64 start/stop trigger enumerations into the board's
//! trigger-control register words (`§4.4`).

use crate::error::{Error, ErrorKind, Result};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TriggerType {
    LevelHigh,
    LevelLow,
    EdgeRising,
    EdgeFalling,
    /// Implies start, stop and restart all fire on the same edge; a request
    /// carrying both an edge-to-edge start and an explicit stop is rejected.
    EdgeToEdge,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TriggerSource {
    Input0,
    Input1,
    Input2,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TriggerSpec {
    pub trigger_type: TriggerType,
    pub source: TriggerSource,
}

impl TriggerSpec {
    fn type_bits(self) -> u32 {
        match self.trigger_type {
            TriggerType::LevelHigh => 0b000,
            TriggerType::LevelLow => 0b001,
            TriggerType::EdgeRising => 0b010,
            TriggerType::EdgeFalling => 0b011,
            TriggerType::EdgeToEdge => 0b100,
        }
    }

    fn source_bits(self) -> u32 {
        match self.source {
            TriggerSource::Input0 => 0,
            TriggerSource::Input1 => 1,
            TriggerSource::Input2 => 2,
        }
    }

    fn encode(self) -> u32 {
        (self.source_bits() << 3) | self.type_bits()
    }
}

/// Control-register words for (start, stop); `stop` is `None` for an
/// edge-to-edge start (restart/stop are implied) or a run that never stops
/// automatically.
pub fn encode(start: TriggerSpec, stop: Option<TriggerSpec>) -> Result<([u32; 2], [u32; 2])> {
    if start.trigger_type == TriggerType::EdgeToEdge && stop.is_some() {
        return Err(Error::from(ErrorKind::Argument(
            "edge-to-edge start already implies stop/restart; an explicit stop is invalid".into(),
        )));
    }

    let ctrl_in = [start.encode(), stop.map(TriggerSpec::encode).unwrap_or(0)];
    let ctrl_out = [
        if stop.is_some() { 1 } else { 0 },
        u32::from(start.trigger_type == TriggerType::EdgeToEdge),
    ];
    Ok((ctrl_in, ctrl_out))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn edge_to_edge_with_explicit_stop_is_rejected() {
        let start = TriggerSpec {
            trigger_type: TriggerType::EdgeToEdge,
            source: TriggerSource::Input0,
        };
        let stop = TriggerSpec {
            trigger_type: TriggerType::EdgeRising,
            source: TriggerSource::Input1,
        };
        assert!(encode(start, Some(stop)).is_err());
    }

    #[test]
    fn level_high_start_with_edge_falling_stop_encodes_distinct_words() {
        let start = TriggerSpec {
            trigger_type: TriggerType::LevelHigh,
            source: TriggerSource::Input0,
        };
        let stop = TriggerSpec {
            trigger_type: TriggerType::EdgeFalling,
            source: TriggerSource::Input1,
        };
        let (ctrl_in, _) = encode(start, Some(stop)).unwrap();
        assert_ne!(ctrl_in[0], ctrl_in[1]);
    }
}
