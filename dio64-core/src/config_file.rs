// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Loader for the external config file collaborator (`§6`): strobe-delay
//! defaults per rack, sync-wait/sync-phase defaults, and `ignore_clock_loss`.

use crate::error::{Error, ErrorKind, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// `r0:r1:r2:level` strobe-delay default for one rack.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct StrobeDelay {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub level: u32,
}

impl StrobeDelay {
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(ErrorKind::Argument(format!("bad strobe delay string: {s}")).into());
        }
        let mut nums = [0u32; 4];
        for (i, p) in parts.iter().enumerate() {
            nums[i] = p
                .parse()
                .map_err(|_| Error::from(ErrorKind::Argument(format!("bad strobe delay string: {s}"))))?;
        }
        Ok(StrobeDelay {
            r0: nums[0],
            r1: nums[1],
            r2: nums[2],
            level: nums[3],
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RackDefaults {
    strobe_delay: String,
    sync_wait: u32,
    sync_phase: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfigFile {
    #[serde(default)]
    ignore_clock_loss: bool,
    #[serde(default)]
    rack: HashMap<String, RackDefaults>,
}

#[derive(Clone, Debug)]
pub struct RackConfig {
    pub strobe_delay: StrobeDelay,
    pub sync_wait: u32,
    pub sync_phase: u32,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigFile {
    pub ignore_clock_loss: bool,
    pub racks: HashMap<String, RackConfig>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::from(ErrorKind::Argument(format!("read config file: {e}"))))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawConfigFile = toml::from_str(text)
            .map_err(|e| Error::from(ErrorKind::Argument(format!("parse config file: {e}"))))?;
        let mut racks = HashMap::new();
        for (name, defaults) in raw.rack {
            racks.insert(
                name,
                RackConfig {
                    strobe_delay: StrobeDelay::parse(&defaults.strobe_delay)?,
                    sync_wait: defaults.sync_wait,
                    sync_phase: defaults.sync_phase,
                },
            );
        }
        Ok(ConfigFile {
            ignore_clock_loss: raw.ignore_clock_loss,
            racks,
        })
    }

    pub fn rack(&self, name: &str) -> Option<&RackConfig> {
        self.racks.get(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_rack_defaults_and_global_flag() {
        let toml = r#"
            ignore_clock_loss = true

            [rack.A]
            strobe_delay = "1:2:3:1"
            sync_wait = 500
            sync_phase = 10
        "#;
        let cfg = ConfigFile::parse(toml).unwrap();
        assert!(cfg.ignore_clock_loss);
        let rack = cfg.rack("A").unwrap();
        assert_eq!(rack.strobe_delay.r0, 1);
        assert_eq!(rack.strobe_delay.level, 1);
        assert_eq!(rack.sync_wait, 500);
    }

    #[test]
    fn missing_rack_is_none() {
        let cfg = ConfigFile::parse("ignore_clock_loss = false\n").unwrap();
        assert!(cfg.rack("nonexistent").is_none());
    }

    #[test]
    fn malformed_strobe_delay_is_rejected() {
        let toml = r#"
            [rack.A]
            strobe_delay = "1:2:3"
            sync_wait = 0
            sync_phase = 0
        "#;
        assert!(ConfigFile::parse(toml).is_err());
    }
}
