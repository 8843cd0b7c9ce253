//! Base64 → binary blob decoding for multipart uploads.
//!
//! Decoding streams through `base64::read::DecoderReader` and copies the
//! output in fixed 512-byte slices, so peak scratch memory stays bounded no
//! matter how large the photo is.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::io::Read;

use crate::error::SdkError;

/// Output slice size used while decoding.
pub const SLICE_SIZE: usize = 512;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Standard alphabet, padding optional (browser `atob` semantics).
const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decoded binary payload tagged with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Return the base64 body of a data URI (`data:image/jpeg;base64,....`).
/// Strings without a comma are returned unchanged.
pub fn strip_data_uri(input: &str) -> &str {
    match input.split_once(',') {
        Some((_, body)) => body,
        None => input,
    }
}

/// Decode base64 text into a [`Blob`] with the given content type.
///
/// ASCII whitespace is ignored. Malformed input surfaces as
/// [`SdkError::Decode`].
pub fn decode_to_blob(b64: &str, content_type: &str) -> Result<Blob, SdkError> {
    let compact: Vec<u8> = b64
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    let mut decoder = base64::read::DecoderReader::new(compact.as_slice(), &FORGIVING);
    let mut data = Vec::with_capacity(compact.len() / 4 * 3 + 3);
    let mut slice = [0u8; SLICE_SIZE];

    loop {
        let n = read_slice(&mut decoder, &mut slice)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&slice[..n]);
    }

    Ok(Blob {
        content_type: content_type.to_string(),
        data,
    })
}

/// Fill `buf` as far as the decoder allows; returns bytes written.
fn read_slice<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, SdkError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SdkError::Decode(e.to_string())),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
