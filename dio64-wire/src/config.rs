// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! The wire-visible OUT_CONFIG structure: bus/scan clock, configuration
//! bitfield, trigger control words, repetition count and the three `AUTO`-able
//! timing fields.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Write};

bitflags::bitflags! {
    /// Configuration bitfield. Bit numbering follows the board's control
    /// register; bits outside [`ConfigBits::USER_BITS`] are board-owned and
    /// must not be set by a caller.
    #[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
    pub struct ConfigBits: u32 {
        const RESET          = 1 << 0;
        const READY          = 1 << 1;
        const RUN            = 1 << 2;
        const RESTART_EN     = 1 << 4;
        const BPS96          = 1 << 8;
        const BPS96_SECONDARY = 1 << 9;
        const EXT_CLOCK      = 1 << 10;
        const AUTO_SYNC_EN   = 1 << 16;
        const AUTO_SYNC_PRIMARY = 1 << 17;
        const IRQ_EN         = 1 << 20;
        const IRQ_END_EN     = 1 << 21;
        const IRQ_RESTART_EN = 1 << 22;
        const IRQ_FREQ_EN    = 1 << 23;
        const IRQ_DATA_EN    = 1 << 24;
        const TRG_START_EN   = 1 << 28;
        const TRG_STOP_EN    = 1 << 29;
    }
}

impl ConfigBits {
    /// Bits a caller is allowed to set directly via Out_Config; the rest are
    /// board state (RESET/READY/RUN) that the server alone controls. Out_Config's
    /// echo must match the request under this mask or the caller sees `EBOARD`.
    pub const USER_BITS: ConfigBits = ConfigBits::from_bits_truncate(
        Self::RESTART_EN.bits()
            | Self::BPS96.bits()
            | Self::BPS96_SECONDARY.bits()
            | Self::EXT_CLOCK.bits()
            | Self::AUTO_SYNC_EN.bits()
            | Self::AUTO_SYNC_PRIMARY.bits()
            | Self::IRQ_EN.bits()
            | Self::IRQ_END_EN.bits()
            | Self::IRQ_RESTART_EN.bits()
            | Self::IRQ_FREQ_EN.bits()
            | Self::IRQ_DATA_EN.bits()
            | Self::TRG_START_EN.bits()
            | Self::TRG_STOP_EN.bits(),
    );
}

/// Sentinel meaning "let the board load its configured default" for
/// `strobe_delay`, `sync_wait` and `sync_phase`.
pub const AUTO: u32 = 0xffff_ffff;

/// Size in bytes of the wire [`ClientConfig`] structure, header excluded.
pub const WIRE_CONFIG_LEN: usize = 4 * 13;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct ClientConfig {
    /// Input: requested external clock frequency; output: actual clock frequency in use.
    pub bus_clock_hz: u32,
    /// Input: requested scan rate; output: actual scan rate in use.
    pub scan_clock_hz: u32,
    pub config: ConfigBits,
    pub ctrl_in: [u32; 2],
    pub ctrl_out: [u32; 2],
    /// 0 = infinite, else repetition count.
    pub reps: u32,
    /// Reserved for wire compatibility; unused by the core.
    pub samples: u32,
    pub strobe_delay: u32,
    pub sync_wait: u32,
    pub sync_phase: u32,
}

impl ClientConfig {
    pub fn encode(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.bus_clock_hz)?;
        w.write_u32::<LittleEndian>(self.scan_clock_hz)?;
        w.write_u32::<LittleEndian>(self.config.bits())?;
        w.write_u32::<LittleEndian>(self.ctrl_in[0])?;
        w.write_u32::<LittleEndian>(self.ctrl_in[1])?;
        w.write_u32::<LittleEndian>(self.ctrl_out[0])?;
        w.write_u32::<LittleEndian>(self.ctrl_out[1])?;
        w.write_u32::<LittleEndian>(self.reps)?;
        w.write_u32::<LittleEndian>(self.samples)?;
        w.write_u32::<LittleEndian>(self.strobe_delay)?;
        w.write_u32::<LittleEndian>(self.sync_wait)?;
        w.write_u32::<LittleEndian>(self.sync_phase)?;
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> io::Result<Self> {
        let mut c = Cursor::new(bytes);
        Ok(ClientConfig {
            bus_clock_hz: c.read_u32::<LittleEndian>()?,
            scan_clock_hz: c.read_u32::<LittleEndian>()?,
            config: ConfigBits::from_bits_truncate(c.read_u32::<LittleEndian>()?),
            ctrl_in: [c.read_u32::<LittleEndian>()?, c.read_u32::<LittleEndian>()?],
            ctrl_out: [c.read_u32::<LittleEndian>()?, c.read_u32::<LittleEndian>()?],
            reps: c.read_u32::<LittleEndian>()?,
            samples: c.read_u32::<LittleEndian>()?,
            strobe_delay: c.read_u32::<LittleEndian>()?,
            sync_wait: c.read_u32::<LittleEndian>()?,
            sync_phase: c.read_u32::<LittleEndian>()?,
        })
    }

    /// Whether `reply` is an acceptable Out_Config echo of this request: the
    /// USER_BITS-masked config word must match; `AUTO` fields may have been
    /// replaced by concrete values.
    pub fn echo_matches(&self, reply: &ClientConfig) -> bool {
        (self.config & ConfigBits::USER_BITS) == (reply.config & ConfigBits::USER_BITS)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> ClientConfig {
        ClientConfig {
            bus_clock_hz: 100_000_000,
            scan_clock_hz: 1_000_000,
            config: ConfigBits::RESTART_EN | ConfigBits::IRQ_EN,
            ctrl_in: [1, 2],
            ctrl_out: [3, 4],
            reps: 1,
            samples: 0,
            strobe_delay: AUTO,
            sync_wait: AUTO,
            sync_phase: AUTO,
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let cfg = sample();
        let mut buf = Vec::new();
        cfg.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), WIRE_CONFIG_LEN);
        let back = ClientConfig::decode(&buf).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn echo_with_auto_replaced_still_matches() {
        let req = sample();
        let mut reply = sample();
        reply.strobe_delay = 42;
        reply.sync_wait = 7;
        reply.sync_phase = 3;
        assert!(req.echo_matches(&reply));
    }

    #[test]
    fn echo_with_rejected_user_bit_does_not_match() {
        let req = sample();
        let mut reply = sample();
        reply.config.remove(ConfigBits::IRQ_EN);
        assert!(!req.echo_matches(&reply));
    }
}
