//! Chat message carrying a provisioning URI for authenticator enrollment.

use anyhow::{anyhow, Result};
use qrcodegen::{QrCode, QrCodeEcc};
use std::{fmt, str::FromStr};
use totp_rs::TOTP;

/// Light modules around the code, in modules.
const QUIET_ZONE: i32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QrMode {
    /// Plain text transports: a Unicode block QR code plus the URI.
    #[default]
    Text,
    /// Transports that render images: a PNG data URL plus the URI.
    Graphic,
}

impl FromStr for QrMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "graphic" => Ok(Self::Graphic),
            _ => Err(format!("invalid QR mode: {value} (expected text or graphic)")),
        }
    }
}

impl fmt::Display for QrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Graphic => f.write_str("graphic"),
        }
    }
}

/// Draw `data` as a QR code with half-block characters, two rows per line.
///
/// Dark modules are blank and light modules are filled, which reads
/// correctly on the dark backgrounds most chat clients use.
///
/// # Errors
/// Returns an error if `data` does not fit in a QR code.
pub fn unicode_qr(data: &str) -> Result<String> {
    let qr = QrCode::encode_text(data, QrCodeEcc::Medium)
        .map_err(|e| anyhow!("QR gen error: {e}"))?;
    let light = |x: i32, y: i32| !qr.get_module(x, y);

    let edge = qr.size() + QUIET_ZONE;
    let mut out = String::new();
    for y in (-QUIET_ZONE..edge).step_by(2) {
        if !out.is_empty() {
            out.push('\n');
        }
        for x in -QUIET_ZONE..edge {
            let bottom = y + 1 < edge && light(x, y + 1);
            out.push(match (light(x, y), bottom) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
    }
    Ok(out)
}

/// Render the enrollment message for `uri`.
///
/// # Errors
/// Returns an error if the QR code cannot be built, or if graphic mode cannot
/// parse the URI.
pub fn render(uri: &str, mode: QrMode) -> Result<String> {
    match mode {
        QrMode::Text => Ok(format!("```\n{}\n```\ncontent: {uri}", unicode_qr(uri)?)),
        QrMode::Graphic => {
            let totp = TOTP::from_url(uri).map_err(|e| anyhow!("invalid provisioning URI: {e}"))?;
            let png = totp
                .get_qr_base64()
                .map_err(|e| anyhow!("QR gen error: {e}"))?;
            Ok(format!(
                "Scan this code with your authenticator app:\n```\ndata:image/png;base64,{png}\n```\ncontent: {uri}"
            ))
        }
    }
}
