// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Sample data path (`§4.5`): 8- or 12-byte samples, and the 12-byte-input /
//! 8-byte-on-wire slicer used for linked groups.
//!
//! A sample is a 32-bit little-endian time stamp followed by one (8-byte
//! mode) or two (12-byte mode) 32-bit data words. For a linked primary +
//! secondary pair wired at 8 bytes/sample, the primary gets `time + word0`
//! and the secondary gets `time + word1`: the concatenation of the two
//! reconstructs the caller's original 12-byte sample.

pub const SAMPLE_BYTES_8: usize = 8;
pub const SAMPLE_BYTES_12: usize = 12;

/// Samples processed per staging buffer, bounding memory use independent of
/// total transfer size.
pub const SLICE_CHUNK_SAMPLES: usize = 1024;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SliceTarget {
    Primary,
    Secondary,
}

/// Validates that `len` is a multiple of `sample_bytes`, matching the
/// boundary the board server itself enforces on OUT_WRITE.
pub fn validate_aligned(len: usize, sample_bytes: usize) -> Result<(), (usize, usize)> {
    if len == 0 || len % sample_bytes != 0 {
        Err((len, sample_bytes))
    } else {
        Ok(())
    }
}

/// Sample-index ranges (`[start, end)`), each at most [`SLICE_CHUNK_SAMPLES`]
/// wide, covering `0..total_samples`. Shared by the sync callback-based
/// slicer below and by callers (the façade's `Out_Write` fan-out) that need
/// to interleave a chunk's transform with an `async` socket write.
pub fn chunk_ranges(total_samples: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..total_samples)
        .step_by(SLICE_CHUNK_SAMPLES)
        .map(move |start| (start, (start + SLICE_CHUNK_SAMPLES).min(total_samples)))
}

/// Slices sample indices `[start, end)` of `input_12_byte_samples` into one
/// 8-byte-per-sample buffer for `target`.
pub fn slice_chunk(input_12_byte_samples: &[u8], start: usize, end: usize, target: SliceTarget) -> Vec<u8> {
    let mut out = Vec::with_capacity((end - start) * SAMPLE_BYTES_8);
    for sample_idx in start..end {
        let base = sample_idx * SAMPLE_BYTES_12;
        let sample = &input_12_byte_samples[base..base + SAMPLE_BYTES_12];
        let time = &sample[0..4];
        let word = match target {
            SliceTarget::Primary => &sample[4..8],
            SliceTarget::Secondary => &sample[8..12],
        };
        out.extend_from_slice(time);
        out.extend_from_slice(word);
    }
    out
}

/// Streams 12-byte input samples into one 8-byte-per-sample output stream per
/// `target`, one [`SLICE_CHUNK_SAMPLES`]-sample buffer at a time. `sink` is
/// called once per chunk so the caller can write straight to the socket
/// without ever materializing the whole transformed payload.
pub fn slice_into_8_byte_chunks(
    input_12_byte_samples: &[u8],
    target: SliceTarget,
    mut sink: impl FnMut(&[u8]) -> std::io::Result<()>,
) -> std::io::Result<()> {
    debug_assert_eq!(input_12_byte_samples.len() % SAMPLE_BYTES_12, 0);
    let total_samples = input_12_byte_samples.len() / SAMPLE_BYTES_12;
    for (start, end) in chunk_ranges(total_samples) {
        let out = slice_chunk(input_12_byte_samples, start, end, target);
        sink(&out)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(time: u32, word0: u32, word1: u32) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&time.to_le_bytes());
        buf[4..8].copy_from_slice(&word0.to_le_bytes());
        buf[8..12].copy_from_slice(&word1.to_le_bytes());
        buf
    }

    #[test]
    fn primary_and_secondary_reconstruct_the_original_sample() {
        let mut input = Vec::new();
        for i in 0..5u32 {
            input.extend_from_slice(&sample(i, 0x5a + i, 0xa5 + i));
        }

        let mut primary_out = Vec::new();
        slice_into_8_byte_chunks(&input, SliceTarget::Primary, |chunk| {
            primary_out.extend_from_slice(chunk);
            Ok(())
        })
        .unwrap();

        let mut secondary_out = Vec::new();
        slice_into_8_byte_chunks(&input, SliceTarget::Secondary, |chunk| {
            secondary_out.extend_from_slice(chunk);
            Ok(())
        })
        .unwrap();

        assert_eq!(primary_out.len(), 5 * SAMPLE_BYTES_8);
        assert_eq!(secondary_out.len(), 5 * SAMPLE_BYTES_8);

        for i in 0..5usize {
            let orig = &input[i * 12..i * 12 + 12];
            let mut reconstructed = [0u8; 12];
            reconstructed[0..4].copy_from_slice(&primary_out[i * 8..i * 8 + 4]);
            reconstructed[4..8].copy_from_slice(&primary_out[i * 8 + 4..i * 8 + 8]);
            reconstructed[8..12].copy_from_slice(&secondary_out[i * 8 + 4..i * 8 + 8]);
            assert_eq!(&reconstructed[..], orig);
        }
    }

    #[test]
    fn handles_partial_final_chunk() {
        let samples = SLICE_CHUNK_SAMPLES + 7;
        let mut input = Vec::new();
        for i in 0..samples as u32 {
            input.extend_from_slice(&sample(i, i, i));
        }
        let mut chunks = Vec::new();
        slice_into_8_byte_chunks(&input, SliceTarget::Primary, |chunk| {
            chunks.push(chunk.len());
            Ok(())
        })
        .unwrap();
        assert_eq!(chunks, vec![SLICE_CHUNK_SAMPLES * 8, 7 * 8]);
    }

    #[test]
    fn rejects_misaligned_length() {
        assert!(validate_aligned(10, SAMPLE_BYTES_8).is_err());
        assert!(validate_aligned(0, SAMPLE_BYTES_8).is_err());
        assert!(validate_aligned(16, SAMPLE_BYTES_8).is_ok());
    }
}
