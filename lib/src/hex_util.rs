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

//! Lowercase hex encoding for digests and writer-lock tokens.

/// Encodes `data` as a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decodes a hex string, rejecting odd length or non-hex characters.
pub fn decode_hex(hex: impl AsRef<[u8]>) -> Option<Vec<u8>> {
    hex::decode(hex.as_ref()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let bytes = [0x01, 0x23, 0x45, 0xab, 0xcd, 0xef];
        let hex = encode_hex(&bytes);
        assert_eq!(hex, "012345abcdef");
        assert_eq!(decode_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn rejects_odd_length_and_bad_chars() {
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}
