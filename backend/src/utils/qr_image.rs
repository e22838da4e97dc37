//! Renders payload text as an SVG QR code for transport in JSON responses.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use qrcode::{render::svg, EcLevel, QrCode};

pub fn render_svg(text: &str) -> anyhow::Result<String> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build();
    Ok(image)
}

pub fn data_url(svg: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg.as_bytes()))
}

/// Convenience for handlers: text straight to a data URL.
pub fn qr_data_url(text: &str) -> anyhow::Result<String> {
    render_svg(text).map(|svg| data_url(&svg))
}
