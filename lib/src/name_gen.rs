// Copyright 2024 The Hangar Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sample name generator: a UUIDv7-shaped name made of
//! a 48-bit millisecond timestamp, a per-process random seed, and a
//! monotonic counter, so names sort roughly by creation time even though
//! the record key namespace orders them lexicographically as strings.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rand::Rng as _;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generates a new, process-unique sample name.
///
/// Format: `{12 hex digits of ms timestamp}-{8 hex digits random}-{8 hex
/// digits monotonic counter}`. Collisions within the same process are
/// impossible (the counter is strictly increasing); collisions across
/// processes started in the same millisecond are astronomically unlikely
/// thanks to the 32-bit random seed.
pub fn generate() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        & 0xFFFF_FFFF_FFFF;
    let seed: u32 = rand::rng().random();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{millis:012x}-{seed:08x}-{counter:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_unique_names() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }

    #[test]
    fn matches_expected_shape() {
        let name = generate();
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 12);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn names_are_valid_record_key_components() {
        // Must not contain the key/value separators used by the codec.
        let name = generate();
        assert!(!name.contains(':'));
        assert!(!name.contains(' '));
    }
}
