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

//! Payload compression.
//!
//! A single `zstd` codec applied uniformly to commit refs, commit specs and
//! sync payload batches, so callers never need to know which record class
//! they're compressing.

use crate::error::HangarError;
use crate::error::Result;

/// Compression level applied uniformly to every payload.
pub const LEVEL: i32 = 9;

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::bulk::compress(data, LEVEL).map_err(HangarError::Io)
}

pub fn decompress(data: &[u8], expected_uncompressed_len: usize) -> Result<Vec<u8>> {
    zstd::bulk::decompress(data, expected_uncompressed_len).map_err(HangarError::Io)
}

/// Decompresses a frame without knowing its uncompressed size up front
/// (relies on the content-size field zstd embeds in the frame header by
/// default). Used for commit refs/specs and sync payloads, where the
/// receiving side has no independent record of the original length.
pub fn decompress_unknown_size(data: &[u8]) -> Result<Vec<u8>> {
    zstd::stream::decode_all(data).map_err(HangarError::Io)
}
