// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! The wire-visible status structures (`GET_STATUS[_IRQ]` and
//! `GET_STATUS_FULL`) and the severity ranking used to aggregate a linked
//! group's status.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

bitflags::bitflags! {
    #[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
    pub struct StatusBits: u32 {
        const RESET          = 1 << 0;
        const READY          = 1 << 1;
        const RUN            = 1 << 2;
        const END            = 1 << 3;
        const RESTART        = 1 << 4;
        const EXT_USED       = 1 << 10;
        const EXT_LOCKED     = 1 << 11;
        const ERR_TX         = 1 << 12;
        const ERR_RX         = 1 << 13;
        const ERR_TIME       = 1 << 14;
        const ERR_LOCK       = 1 << 15;
        const ERR_TKEEP      = 1 << 16;
        const IRQ_ERR        = 1 << 20;
        const IRQ_END        = 1 << 21;
        const IRQ_RESTART    = 1 << 22;
        const IRQ_FREQ       = 1 << 23;
        const IRQ_DATA       = 1 << 24;
        const TRG_START      = 1 << 28;
        const TRG_STOP       = 1 << 29;
    }
}

impl StatusBits {
    pub const ERROR: StatusBits = StatusBits::from_bits_truncate(
        Self::ERR_TX.bits() | Self::ERR_RX.bits() | Self::ERR_TIME.bits() | Self::ERR_TKEEP.bits(),
    );

    pub fn has_error(self) -> bool {
        self.intersects(StatusBits::ERROR | StatusBits::ERR_LOCK)
    }
}

/// Severity ranking used to aggregate a linked group's status: the member
/// with the highest rank determines the DIO64STAT the caller sees.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Debug)]
pub enum Severity {
    None = 0,
    End = 1,
    NotStarted = 2,
    Wait = 3,
    Run = 4,
    Error = 5,
}

impl Severity {
    pub fn of(bits: StatusBits) -> Self {
        if bits.has_error() {
            Severity::Error
        } else if bits.contains(StatusBits::RUN) {
            Severity::Run
        } else if bits.contains(StatusBits::TRG_START) && !bits.contains(StatusBits::RUN) {
            Severity::Wait
        } else if bits.contains(StatusBits::END) {
            Severity::End
        } else if bits.contains(StatusBits::READY) {
            Severity::NotStarted
        } else {
            Severity::None
        }
    }
}

pub const WIRE_STATUS_LEN: usize = 4 * 3;

#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct Status {
    pub board_time: u32,
    pub board_samples: u32,
    pub bits: StatusBits,
}

impl Status {
    pub fn encode(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.board_time)?;
        w.write_u32::<LittleEndian>(self.board_samples)?;
        w.write_u32::<LittleEndian>(self.bits.bits())?;
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> io::Result<Self> {
        let mut c = Cursor::new(bytes);
        Ok(Status {
            board_time: c.read_u32::<LittleEndian>()?,
            board_samples: c.read_u32::<LittleEndian>()?,
            bits: StatusBits::from_bits_truncate(c.read_u32::<LittleEndian>()?),
        })
    }

    pub fn severity(&self) -> Severity {
        Severity::of(self.bits)
    }
}

/// Number of `u32` counters/registers appended by the extended status variant,
/// beyond the base [`Status`] fields and the firmware/hardware identifiers.
const FULL_EXTRA_COUNTERS: usize = 10;

pub const WIRE_STATUS_FULL_LEN: usize = WIRE_STATUS_LEN + 4 * FULL_EXTRA_COUNTERS + 4 + 4 + 8;

/// Extended status: adds control registers, period measurements, error/IRQ
/// counters, descriptor counts, the last sample bytes, firmware version and
/// hardware model code.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct StatusFull {
    pub base: Status,
    pub ctrl: u32,
    pub period_min_ns: u32,
    pub period_max_ns: u32,
    pub err_count: u32,
    pub irq_count: u32,
    pub descriptors_pending: u32,
    pub descriptors_active: u32,
    pub descriptors_completed: u32,
    pub bytes_transferred: u32,
    pub reps_actual: u32,
    pub last_sample: [u8; 8],
    pub firmware_version: u32,
    pub hardware_model: u32,
}

impl StatusFull {
    pub fn encode(&self, w: &mut impl Write) -> io::Result<()> {
        self.base.encode(w)?;
        w.write_u32::<LittleEndian>(self.ctrl)?;
        w.write_u32::<LittleEndian>(self.period_min_ns)?;
        w.write_u32::<LittleEndian>(self.period_max_ns)?;
        w.write_u32::<LittleEndian>(self.err_count)?;
        w.write_u32::<LittleEndian>(self.irq_count)?;
        w.write_u32::<LittleEndian>(self.descriptors_pending)?;
        w.write_u32::<LittleEndian>(self.descriptors_active)?;
        w.write_u32::<LittleEndian>(self.descriptors_completed)?;
        w.write_u32::<LittleEndian>(self.bytes_transferred)?;
        w.write_u32::<LittleEndian>(self.reps_actual)?;
        w.write_all(&self.last_sample)?;
        w.write_u32::<LittleEndian>(self.firmware_version)?;
        w.write_u32::<LittleEndian>(self.hardware_model)?;
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> io::Result<Self> {
        let base = Status::decode(&bytes[..WIRE_STATUS_LEN])?;
        let mut c = Cursor::new(&bytes[WIRE_STATUS_LEN..]);
        let ctrl = c.read_u32::<LittleEndian>()?;
        let period_min_ns = c.read_u32::<LittleEndian>()?;
        let period_max_ns = c.read_u32::<LittleEndian>()?;
        let err_count = c.read_u32::<LittleEndian>()?;
        let irq_count = c.read_u32::<LittleEndian>()?;
        let descriptors_pending = c.read_u32::<LittleEndian>()?;
        let descriptors_active = c.read_u32::<LittleEndian>()?;
        let descriptors_completed = c.read_u32::<LittleEndian>()?;
        let bytes_transferred = c.read_u32::<LittleEndian>()?;
        let reps_actual = c.read_u32::<LittleEndian>()?;
        let mut last_sample = [0u8; 8];
        c.read_exact(&mut last_sample)?;
        let firmware_version = c.read_u32::<LittleEndian>()?;
        let hardware_model = c.read_u32::<LittleEndian>()?;
        Ok(StatusFull {
            base,
            ctrl,
            period_min_ns,
            period_max_ns,
            err_count,
            irq_count,
            descriptors_pending,
            descriptors_active,
            descriptors_completed,
            bytes_transferred,
            reps_actual,
            last_sample,
            firmware_version,
            hardware_model,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn severity_ranks_error_above_run_above_end() {
        assert!(Severity::Error > Severity::Run);
        assert!(Severity::Run > Severity::End);
        assert!(Severity::End > Severity::None);
    }

    #[test]
    fn err_lock_alone_counts_as_error_severity() {
        let bits = StatusBits::ERR_LOCK | StatusBits::END;
        assert_eq!(Severity::of(bits), Severity::Error);
    }

    #[test]
    fn status_round_trips() {
        let s = Status {
            board_time: 10,
            board_samples: 1003,
            bits: StatusBits::RUN | StatusBits::EXT_LOCKED,
        };
        let mut buf = Vec::new();
        s.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), WIRE_STATUS_LEN);
        assert_eq!(Status::decode(&buf).unwrap(), s);
    }

    #[test]
    fn full_status_round_trips() {
        let full = StatusFull {
            base: Status {
                board_time: 1,
                board_samples: 2,
                bits: StatusBits::END,
            },
            ctrl: 0xdead_beef,
            period_min_ns: 10,
            period_max_ns: 20,
            err_count: 0,
            irq_count: 5,
            descriptors_pending: 1,
            descriptors_active: 2,
            descriptors_completed: 3,
            bytes_transferred: 4096,
            reps_actual: 1,
            last_sample: [1, 2, 3, 4, 5, 6, 7, 8],
            firmware_version: 0x0102,
            hardware_model: 7,
        };
        let mut buf = Vec::new();
        full.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), WIRE_STATUS_FULL_LEN);
        assert_eq!(StatusFull::decode(&buf).unwrap(), full);
    }
}
