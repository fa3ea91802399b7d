use url::Url;

/// What the logo processors need to know about an image.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
}

/// Resolves logo metadata for a URL. Implementations must not fail: anything
/// that cannot be determined comes back as `0` or `None`.
pub trait ImageProbe {
    fn probe(&self, url: &str) -> ImageInfo;
}

/// Offline probe that only looks at the URL's file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionProbe;

impl ImageProbe for ExtensionProbe {
    fn probe(&self, url: &str) -> ImageInfo {
        ImageInfo { width: 0, height: 0, format: format_from_url(url) }
    }
}

/// Logo format name for a response MIME type.
#[must_use]
pub fn format_from_mime(mime: &str) -> Option<String> {
    let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    let format = match essence.as_str() {
        "image/svg+xml" => "SVG",
        "image/png" => "PNG",
        "image/jpeg" => "JPEG",
        "image/gif" => "GIF",
        "image/webp" => "WebP",
        "image/avif" => "AVIF",
        "image/apng" => "APNG",
        _ => return None,
    };
    Some(format.to_string())
}

/// Logo format name for a file extension (without the dot).
#[must_use]
pub fn format_from_extension(extension: &str) -> Option<String> {
    let format = match extension.to_ascii_lowercase().as_str() {
        "svg" => "SVG",
        "png" => "PNG",
        "jpeg" | "jpg" => "JPEG",
        "gif" => "GIF",
        "webp" => "WebP",
        "avif" => "AVIF",
        "apng" => "APNG",
        _ => return None,
    };
    Some(format.to_string())
}

/// Format inferred from the last path segment of a URL; query and fragment are ignored.
#[must_use]
pub fn format_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let (_, extension) = segment.rsplit_once('.')?;
    format_from_extension(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_types_map_to_logo_formats() {
        assert_eq!(format_from_mime("image/png").as_deref(), Some("PNG"));
        assert_eq!(format_from_mime("image/svg+xml; charset=utf-8").as_deref(), Some("SVG"));
        assert_eq!(format_from_mime("IMAGE/WEBP").as_deref(), Some("WebP"));
        assert_eq!(format_from_mime("text/html"), None);
    }

    #[test]
    fn extension_probe_reads_url_path_only() {
        let probe = ExtensionProbe;

        assert_eq!(
            probe.probe("https://example.com/logos/a.JPG?size=large#top"),
            ImageInfo { width: 0, height: 0, format: Some("JPEG".to_string()) }
        );
        assert_eq!(probe.probe("https://example.com/logo").format, None);
        assert_eq!(probe.probe("not a url").format, None);
    }
}
