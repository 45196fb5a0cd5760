//! Pairing QR Handling
//!
//! On each `qr` event the pairing parts are joined with `,`, encoded as a PNG
//! and written to a fixed path, replacing any earlier code.
//! No retry: a failed encode or write blocks pairing until an operator fixes it.

use super::dispatch::{EventHandler, HandlerError};
use super::traits::{Connection, EncodeError, ErrorCorrection, Event, QrEncoder};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Delimiter between pairing parts
pub const PART_DELIMITER: u8 = b',';

/// Error correction used for pairing codes
pub const PAIRING_ERROR_CORRECTION: ErrorCorrection = ErrorCorrection::Low;

/// Pixels per QR module in the written image
pub const PAIRING_SCALE: u32 = 6;

/// QR handling errors
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Failed to write QR image to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Join pairing parts with the fixed delimiter
pub fn join_parts(parts: &[Vec<u8>]) -> Vec<u8> {
    parts.join(&PART_DELIMITER)
}

/// Renders pairing codes to an image file
pub struct QrHandler {
    encoder: Box<dyn QrEncoder>,
    output_path: PathBuf,
    print_to_terminal: bool,
}

impl QrHandler {
    pub fn new(encoder: impl QrEncoder + 'static, output_path: impl AsRef<Path>) -> Self {
        Self {
            encoder: Box::new(encoder),
            output_path: output_path.as_ref().to_path_buf(),
            print_to_terminal: false,
        }
    }

    /// Also print each code to the terminal
    pub fn with_terminal_output(mut self, enabled: bool) -> Self {
        self.print_to_terminal = enabled;
        self
    }

    fn on_qr(&self, event: Event) -> Result<(), HandlerError> {
        match event {
            Event::Qr(parts) => {
                self.render(&parts)?;
                Ok(())
            }
            other => Err(HandlerError::UnexpectedEvent {
                expected: super::traits::EventKind::Qr,
                received: other.kind(),
            }),
        }
    }

    /// Encode `parts` and write the image, returning the joined code
    pub fn render(&self, parts: &[Vec<u8>]) -> Result<Vec<u8>, QrError> {
        let code = join_parts(parts);
        info!(
            parts = parts.len(),
            code = %String::from_utf8_lossy(&code),
            "received pairing code"
        );

        let image = self
            .encoder
            .encode(&code, PAIRING_ERROR_CORRECTION, PAIRING_SCALE)?;

        std::fs::write(&self.output_path, image).map_err(|source| QrError::Write {
            path: self.output_path.clone(),
            source,
        })?;

        info!(path = %self.output_path.display(), "pairing QR image written");

        if self.print_to_terminal {
            println!("📱 Scan this code from the linked-devices screen on your phone:");
            if let Err(e) = qr2term::print_qr(&code) {
                warn!("Failed to render QR code in terminal: {}", e);
            }
        }

        Ok(code)
    }
}

#[async_trait]
impl<C: Connection> EventHandler<C> for QrHandler {
    async fn handle(&mut self, _connection: &C, event: Event) -> Result<(), HandlerError> {
        self.on_qr(event)
    }
}

// Shared so a bootstrapper can register the same handler on every run
#[async_trait]
impl<C: Connection> EventHandler<C> for Arc<QrHandler> {
    async fn handle(&mut self, _connection: &C, event: Event) -> Result<(), HandlerError> {
        self.on_qr(event)
    }
}

/// PNG encoder backed by `qrcode` + `image`
#[derive(Debug, Clone, Copy, Default)]
pub struct PngQrEncoder;

impl QrEncoder for PngQrEncoder {
    fn encode(
        &self,
        data: &[u8],
        error_correction: ErrorCorrection,
        scale: u32,
    ) -> Result<Vec<u8>, EncodeError> {
        let level = match error_correction {
            ErrorCorrection::Low => EcLevel::L,
            ErrorCorrection::Medium => EcLevel::M,
            ErrorCorrection::Quartile => EcLevel::Q,
            ErrorCorrection::High => EcLevel::H,
        };

        let code = QrCode::with_error_correction_level(data, level)
            .map_err(|e| EncodeError(e.to_string()))?;

        let pixels = code
            .render::<Luma<u8>>()
            .module_dimensions(scale, scale)
            .build();

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(pixels)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| EncodeError(e.to_string()))?;

        Ok(png)
    }
}
