use std::io::{Cursor, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use channel_db_core::probe::{format_from_mime, format_from_url};
use channel_db_core::{ImageInfo, ImageProbe};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, warn};

const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

static SVG_WIDTH: Lazy<Regex> = Lazy::new(|| compile(r#"<svg[^>]*\swidth="([\d.]+)(?:px)?""#));
static SVG_HEIGHT: Lazy<Regex> = Lazy::new(|| compile(r#"<svg[^>]*\sheight="([\d.]+)(?:px)?""#));
static SVG_VIEW_BOX: Lazy<Regex> = Lazy::new(|| {
    compile(r#"<svg[^>]*\sviewBox="\s*[-\d.]+[\s,]+[-\d.]+[\s,]+([\d.]+)[\s,]+([\d.]+)\s*""#)
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid svg pattern {pattern}: {err}"))
}

/// Downloads the logo and reads its format and pixel size.
pub struct HttpImageProbe {
    agent: ureq::Agent,
}

impl HttpImageProbe {
    #[must_use]
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new().timeout(Duration::from_secs(20)).build();
        Self { agent }
    }

    fn fetch(&self, url: &str) -> Result<(Option<String>, Vec<u8>)> {
        let response = self
            .agent
            .get(url)
            .set("User-Agent", "chdb")
            .call()
            .with_context(|| format!("failed to request {url}"))?;
        let format = format_from_mime(response.content_type());
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_IMAGE_BYTES)
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {url}"))?;
        Ok((format, bytes))
    }
}

impl Default for HttpImageProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageProbe for HttpImageProbe {
    fn probe(&self, url: &str) -> ImageInfo {
        let (mime_format, bytes) = match self.fetch(url) {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(
                    url,
                    error = %format!("{err:#}"),
                    "failed to fetch logo, falling back to the extension"
                );
                return ImageInfo { width: 0, height: 0, format: format_from_url(url) };
            }
        };

        let format = mime_format.or_else(|| format_from_url(url));
        let (width, height) = if format.as_deref() == Some("SVG") {
            svg_dimensions(&String::from_utf8_lossy(&bytes))
        } else {
            raster_dimensions(&bytes)
        }
        .unwrap_or_default();
        debug!(url, width, height, format = format.as_deref(), "probed logo");

        ImageInfo { width, height, format }
    }
}

fn raster_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Size from the root element's `width`/`height`, else from its `viewBox`.
fn svg_dimensions(document: &str) -> Option<(u32, u32)> {
    let attribute = |pattern: &Regex| {
        pattern.captures(document).and_then(|caps| caps.get(1)).and_then(|m| to_pixels(m.as_str()))
    };
    if let (Some(width), Some(height)) = (attribute(&SVG_WIDTH), attribute(&SVG_HEIGHT)) {
        return Some((width, height));
    }

    let caps = SVG_VIEW_BOX.captures(document)?;
    Some((to_pixels(caps.get(1)?.as_str())?, to_pixels(caps.get(2)?.as_str())?))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_pixels(value: &str) -> Option<u32> {
    let parsed: f64 = value.parse().ok()?;
    (parsed.is_finite() && parsed >= 0.0 && parsed <= f64::from(u32::MAX))
        .then(|| parsed.round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svg_size_prefers_explicit_attributes() {
        let svg = r#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" width="300px" height="100" viewBox="0 0 600 200"></svg>"#;
        assert_eq!(svg_dimensions(svg), Some((300, 100)));
    }

    #[test]
    fn svg_size_falls_back_to_view_box() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 512.4 128"><rect/></svg>"#;
        assert_eq!(svg_dimensions(svg), Some((512, 128)));
        assert_eq!(svg_dimensions("<svg></svg>"), None);
    }

    #[test]
    fn encoded_png_yields_dimensions() -> Result<()> {
        let mut png = Cursor::new(Vec::new());
        image::RgbaImage::new(640, 360).write_to(&mut png, image::ImageFormat::Png)?;
        let png = png.into_inner();

        assert_eq!(raster_dimensions(&png), Some((640, 360)));
        assert_eq!(raster_dimensions(b"not an image"), None);
        Ok(())
    }
}
