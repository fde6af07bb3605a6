use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CobsError, Result};

/// Frame delimiter. Never appears inside an encoded body.
pub const DELIMITER: u8 = 0x00;

/// Longest data run a single length code can describe.
const MAX_BLOCK: usize = 254;

/// Upper bound on the encoded size of `len` payload bytes, delimiters excluded.
pub const fn max_encoded_len(len: usize) -> usize {
    len + len / MAX_BLOCK + 1
}

/// COBS-encode `src`, appending to `dst`.
///
/// ```text
/// payload  11 22 00 33
/// encoded  03 11 22 02 33
/// ```
pub fn encode(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(max_encoded_len(src.len()));

    let mut code_idx = dst.len();
    dst.put_u8(0);
    let mut code: u8 = 1;

    for (i, &byte) in src.iter().enumerate() {
        if byte == DELIMITER {
            dst[code_idx] = code;
            code_idx = dst.len();
            dst.put_u8(0);
            code = 1;
            continue;
        }

        dst.put_u8(byte);
        code += 1;
        // A full block only opens a new one if more data follows.
        if code == 0xFF && i + 1 < src.len() {
            dst[code_idx] = code;
            code_idx = dst.len();
            dst.put_u8(0);
            code = 1;
        }
    }

    dst[code_idx] = code;
}

/// Reverse COBS encoding of one frame body (delimiters already stripped).
pub fn decode(src: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(src.len());
    let mut idx = 0usize;

    while idx < src.len() {
        let code = src[idx];
        if code == DELIMITER {
            return Err(CobsError::ZeroByte { offset: idx });
        }

        let start = idx + 1;
        let end = idx + code as usize;
        if end > src.len() {
            return Err(CobsError::Truncated { offset: idx, code });
        }

        let block = &src[start..end];
        if let Some(pos) = block.iter().position(|&b| b == DELIMITER) {
            return Err(CobsError::ZeroByte { offset: start + pos });
        }
        out.extend_from_slice(block);

        idx = end;
        if code != 0xFF && idx < src.len() {
            out.put_u8(0);
        }
    }

    Ok(out.freeze())
}

/// Encode `payload` as a complete wire frame: `00 ++ cobs(payload) ++ 00`.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(max_encoded_len(payload.len()) + 2);
    buf.put_u8(DELIMITER);
    encode(payload, &mut buf);
    buf.put_u8(DELIMITER);
    buf.freeze()
}
