//! imaging.rs
//! Still-image transfer over the line protocol.
//!
//! ```text
//! IMG|frame.jpg|<encoded length>
//! IMG_START
//! <chunk_size base64 chars>   × ceil(len / chunk_size)
//! IMG_END
//! ```
//!
//! Commands are drained and answered before every chunk, so a STOP sent
//! mid-transfer is handled before `IMG_END`.

use log::{debug, info};

use crate::component_a::phase::PhaseStateMachine;
use crate::component_b::radio::RadioFrame;
use crate::component_b::receiver::CommandService;
use crate::hardware::HardwareContext;
use crate::utils::config::ImagingConfig;
use crate::utils::fault::Fault;

const BASE64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Standard base64 with `=` padding and no line breaks.
pub fn encode_base64(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for group in bytes.chunks(3) {
        let b0 = group[0] as u32;
        let b1 = group.get(1).copied().unwrap_or(0) as u32;
        let b2 = group.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;

        out.push(BASE64_ALPHABET[(triple >> 18) as usize & 0x3f] as char);
        out.push(BASE64_ALPHABET[(triple >> 12) as usize & 0x3f] as char);
        if group.len() > 1 {
            out.push(BASE64_ALPHABET[(triple >> 6) as usize & 0x3f] as char);
        } else {
            out.push('=');
        }
        if group.len() > 2 {
            out.push(BASE64_ALPHABET[triple as usize & 0x3f] as char);
        } else {
            out.push('=');
        }
    }
    out
}

/// Number of chunk lines for an encoded payload.
pub fn chunk_count(encoded_len: usize, chunk_size: usize) -> usize {
    encoded_len.div_ceil(chunk_size)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReport {
    pub name: String,
    pub encoded_len: usize,
    pub chunks: usize,
    /// Command lines handled while the frame was in flight.
    pub commands_serviced: usize,
}

pub struct ImageStreamer {
    cfg: ImagingConfig,
}

impl ImageStreamer {
    pub fn new(cfg: ImagingConfig) -> Self {
        Self { cfg }
    }

    /// Captures and streams one frame. `Ok(None)` when the camera had nothing.
    pub fn send_frame(
        &mut self,
        ctx: &mut HardwareContext,
        service: &mut CommandService,
        phase: &mut PhaseStateMachine,
    ) -> Result<Option<ImageReport>, Fault> {
        let Some(image) = ctx.camera.capture().filter(|img| !img.bytes.is_empty()) else {
            debug!("[Imaging] capture failed or empty, skipping cycle");
            return Ok(None);
        };
        let name = if image.name.is_empty() { self.cfg.frame_name.clone() } else { image.name };
        let encoded = encode_base64(&image.bytes);
        let mut commands_serviced = 0;
        let mut chunks = 0;

        service.send(ctx, &RadioFrame::ImageHeader { name: name.clone(), length: encoded.len() })?;
        service.send(ctx, &RadioFrame::ImageStart)?;

        for chunk in encoded.as_bytes().chunks(self.cfg.chunk_size) {
            ctx.kick();
            commands_serviced += service.service(ctx, phase)?;
            // base64 output is ASCII, so any byte split is a char boundary
            let text = String::from_utf8_lossy(chunk).into_owned();
            service.send(ctx, &RadioFrame::ImageChunk(text))?;
            chunks += 1;
        }

        service.send(ctx, &RadioFrame::ImageEnd)?;
        info!("[Imaging] sent {} ({} chars, {} chunks)", name, encoded.len(), chunks);

        Ok(Some(ImageReport {
            name,
            encoded_len: encoded.len(),
            chunks,
            commands_serviced,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_vectors() {
        assert_eq!(encode_base64(b""), "");
        assert_eq!(encode_base64(b"M"), "TQ==");
        assert_eq!(encode_base64(b"Ma"), "TWE=");
        assert_eq!(encode_base64(b"Man"), "TWFu");
        assert_eq!(encode_base64(b"foobar"), "Zm9vYmFy");
        assert_eq!(encode_base64(&[0xff, 0xd8, 0xff, 0xe0]), "/9j/4A==");
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 90), 0);
        assert_eq!(chunk_count(90, 90), 1);
        assert_eq!(chunk_count(91, 90), 2);
        assert_eq!(chunk_count(360, 90), 4);
    }
}
