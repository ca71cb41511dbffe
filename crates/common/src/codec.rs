// RDB - Replay Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Frame snapshot codec
//!
//! Encodes a [`FrameSnapshot`] into the bytes carried by the control channel and
//! decodes them back on the front-end side. Names with the internal prefix `__`
//! are dropped during encoding, so a decoded snapshot equals the original minus
//! those bindings.
//!
//! Layout: the magic `RDBF`, one version byte, then a bincode body holding the
//! line, the instruction offset, both binding maps and the full code descriptor.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Bindings, CodeDescriptor, FrameSnapshot};

/// Leading bytes of every encoded frame
pub const FRAME_MAGIC: &[u8; 4] = b"RDBF";

/// Version of the encoded frame layout
pub const FRAME_VERSION: u8 = 1;

/// Names starting with this prefix are interpreter internals and never leave the player
pub const INTERNAL_PREFIX: &str = "__";

/// Errors raised while encoding or decoding a frame
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input does not start with the frame magic
    #[error("not an encoded frame (bad magic)")]
    BadMagic,

    /// The input was produced by an incompatible encoder
    #[error("unsupported frame version {found}, expected {FRAME_VERSION}")]
    UnsupportedVersion {
        /// Version byte found in the input
        found: u8,
    },

    /// The body could not be (de)serialized
    #[error("malformed frame body: {0}")]
    Body(#[from] bincode::Error),
}

#[derive(Serialize)]
struct WireFrameRef<'a> {
    line: Option<u32>,
    instruction_offset: usize,
    locals: BTreeMap<&'a str, &'a str>,
    globals: BTreeMap<&'a str, &'a str>,
    code: &'a CodeDescriptor,
}

#[derive(Deserialize)]
struct WireFrame {
    line: Option<u32>,
    instruction_offset: usize,
    locals: Bindings,
    globals: Bindings,
    code: CodeDescriptor,
}

fn visible(bindings: &Bindings) -> BTreeMap<&str, &str> {
    bindings
        .iter()
        .filter(|(name, _)| !is_internal_name(name))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect()
}

/// Whether `name` is an interpreter-internal binding
pub fn is_internal_name(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}

/// Encode a frame snapshot, dropping internal bindings
pub fn encode_frame(frame: &FrameSnapshot) -> Result<Vec<u8>, CodecError> {
    let wire = WireFrameRef {
        line: frame.line,
        instruction_offset: frame.instruction_offset,
        locals: visible(&frame.locals),
        globals: visible(&frame.globals),
        code: &frame.code,
    };

    let mut bytes = Vec::with_capacity(256);
    bytes.extend_from_slice(FRAME_MAGIC);
    bytes.push(FRAME_VERSION);
    bincode::serialize_into(&mut bytes, &wire)?;
    Ok(bytes)
}

/// Decode bytes produced by [`encode_frame`]
pub fn decode_frame(bytes: &[u8]) -> Result<FrameSnapshot, CodecError> {
    let body = bytes.strip_prefix(FRAME_MAGIC.as_slice()).ok_or(CodecError::BadMagic)?;
    let (&version, body) = body.split_first().ok_or(CodecError::BadMagic)?;
    if version != FRAME_VERSION {
        return Err(CodecError::UnsupportedVersion { found: version });
    }

    let wire: WireFrame = bincode::deserialize(body)?;
    Ok(FrameSnapshot {
        line: wire.line,
        instruction_offset: wire.instruction_offset,
        locals: wire.locals,
        globals: wire.globals,
        code: Arc::new(wire.code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LineRange;

    fn snapshot() -> FrameSnapshot {
        let code = CodeDescriptor {
            filename: "/work/prog.pyl".to_string(),
            name: "<module>".to_string(),
            instructions: vec![100, 0, 90, 0, 83, 0],
            constants: vec!["1".to_string(), "None".to_string()],
            names: vec!["x".to_string()],
            local_names: vec![],
            line_table: vec![
                LineRange { start: 0, end: 4, line: Some(1) },
                LineRange { start: 4, end: 6, line: None },
            ],
        };
        let globals: Bindings = [
            ("x".to_string(), "1".to_string()),
            ("__name__".to_string(), "'__main__'".to_string()),
            ("__file__".to_string(), "'/work/prog.pyl'".to_string()),
        ]
        .into_iter()
        .collect();

        FrameSnapshot {
            line: Some(1),
            instruction_offset: 2,
            locals: globals.clone(),
            globals,
            code: Arc::new(code),
        }
    }

    #[test]
    fn test_round_trip_strips_internal_names() {
        let original = snapshot();
        let decoded = decode_frame(&encode_frame(&original).unwrap()).unwrap();

        assert_eq!(decoded.line, original.line);
        assert_eq!(decoded.instruction_offset, original.instruction_offset);
        assert_eq!(decoded.code, original.code);
        assert_eq!(decoded.locals.len(), 1);
        assert_eq!(decoded.locals.get("x").map(String::as_str), Some("1"));
        assert!(decoded.globals.keys().all(|name| !name.starts_with("__")));

        let mut expected = original;
        expected.locals.retain(|name, _| !is_internal_name(name));
        expected.globals.retain(|name, _| !is_internal_name(name));
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        assert!(matches!(decode_frame(b"nope"), Err(CodecError::BadMagic)));
        assert!(matches!(decode_frame(b"RDBF"), Err(CodecError::BadMagic)));

        let mut bytes = encode_frame(&snapshot()).unwrap();
        bytes[4] = FRAME_VERSION + 1;
        assert!(matches!(decode_frame(&bytes), Err(CodecError::UnsupportedVersion { .. })));

        let bytes = encode_frame(&snapshot()).unwrap();
        assert!(matches!(decode_frame(&bytes[..bytes.len() - 3]), Err(CodecError::Body(_))));
    }
}
