//! Image sources: data URIs and fetched resources, sniffed, measured and
//! registered once per source string.

use std::collections::HashMap;
use std::io::Cursor;

use base64::Engine as _;
use image::ImageReader;
use log::{debug, warn};
use percent_encoding::percent_decode_str;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::fetch::{resolve_uri, Fetch, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Gif,
    Bmp,
    Emf,
    Icon,
    Jpeg,
    Pcx,
    Png,
    Tiff,
    Wmf,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Emf => "emf",
            ImageFormat::Icon => "ico",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Pcx => "pcx",
            ImageFormat::Png => "png",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Wmf => "wmf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Emf => "image/x-emf",
            ImageFormat::Icon => "image/x-icon",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Pcx => "image/x-pcx",
            ImageFormat::Png => "image/png",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Wmf => "image/x-wmf",
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        Some(match mime.as_str() {
            "image/gif" => ImageFormat::Gif,
            "image/pjpeg" | "image/jpg" | "image/jpeg" => ImageFormat::Jpeg,
            "image/x-png" | "image/png" => ImageFormat::Png,
            "image/tiff" => ImageFormat::Tiff,
            "image/vnd.microsoft.icon" | "image/x-icon" | "image/icon" | "image/ico"
            | "text/ico" | "application/ico" => ImageFormat::Icon,
            "image/bmp" | "image/x-bmp" => ImageFormat::Bmp,
            "image/emf" | "image/x-emf" => ImageFormat::Emf,
            "image/wmf" | "image/x-wmf" => ImageFormat::Wmf,
            _ => return None,
        })
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext.to_ascii_lowercase().as_str() {
            "gif" => ImageFormat::Gif,
            "bmp" => ImageFormat::Bmp,
            "emf" => ImageFormat::Emf,
            "ico" => ImageFormat::Icon,
            "jpeg" | "jpg" | "jpe" => ImageFormat::Jpeg,
            "pcx" => ImageFormat::Pcx,
            "png" => ImageFormat::Png,
            "tif" | "tiff" => ImageFormat::Tiff,
            "wmf" => ImageFormat::Wmf,
            _ => return None,
        })
    }

    /// Format from the file extension of the URI path, then of its query
    /// string (`get.aspx?file=logo.png`).
    pub fn from_uri(uri: &str) -> Option<Self> {
        let uri = uri.split('#').next().unwrap_or_default();
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        let ext_of = |s: &str| s.rsplit_once('.').and_then(|(_, e)| Self::from_extension(e));
        let segment = path.rsplit('/').next().unwrap_or(path);
        ext_of(segment).or_else(|| {
            query
                .split('&')
                .filter_map(|pair| ext_of(pair.rsplit('=').next().unwrap_or(pair)))
                .next()
        })
    }

    /// Format from the leading bytes of the payload. Raster formats come
    /// from `image`; the metafiles and PCX are matched here.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if let Some(format) = image::guess_format(bytes).ok().and_then(Self::from_raster) {
            return Some(format);
        }
        Some(match bytes {
            [0xD7, 0xCD, 0xC6, 0x9A, ..] => ImageFormat::Wmf,
            [0x01, 0x00, 0x00, 0x00, ..] if bytes.get(40..44) == Some(&b" EMF"[..]) => {
                ImageFormat::Emf
            }
            [0x0A, version, 0x01, ..] if *version <= 5 => ImageFormat::Pcx,
            _ => return None,
        })
    }

    fn from_raster(format: image::ImageFormat) -> Option<Self> {
        Some(match format {
            image::ImageFormat::Png => ImageFormat::Png,
            image::ImageFormat::Jpeg => ImageFormat::Jpeg,
            image::ImageFormat::Gif => ImageFormat::Gif,
            image::ImageFormat::Bmp => ImageFormat::Bmp,
            image::ImageFormat::Tiff => ImageFormat::Tiff,
            image::ImageFormat::Ico => ImageFormat::Icon,
            _ => return None,
        })
    }
}

fn le_i32(b: &[u8], at: usize) -> Option<i32> {
    b.get(at..at + 4)
        .map(|s| i32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

/// Size of the EMF header's bounds rectangle.
fn emf_size(b: &[u8]) -> Option<(u32, u32)> {
    let (left, top, right, bottom) = (le_i32(b, 8)?, le_i32(b, 12)?, le_i32(b, 16)?, le_i32(b, 20)?);
    Some((right.abs_diff(left), bottom.abs_diff(top)))
}

/// Pixel size read from the format header, without decoding the image.
pub fn image_size(format: ImageFormat, bytes: &[u8]) -> Option<(u32, u32)> {
    match format {
        ImageFormat::Emf => emf_size(bytes),
        ImageFormat::Wmf | ImageFormat::Pcx => None,
        _ => ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok(),
    }
}

/// Decodes `data:[<mime>][;base64],<payload>`.
pub fn decode_data_uri(uri: &str) -> Option<Resource> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let (mime, base64) = match meta.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (meta, false),
    };
    let bytes = if base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .ok()?
    } else {
        percent_decode_str(payload).collect()
    };
    let content_type = mime
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    Some(Resource {
        bytes,
        content_type,
    })
}

/// Detects the format. Inline data is sniffed from its bytes first; fetched
/// resources go by declared content type, then extension, then bytes.
pub fn detect_format(uri: &str, resource: &Resource) -> Option<ImageFormat> {
    let declared = || {
        resource
            .content_type
            .as_deref()
            .and_then(ImageFormat::from_content_type)
    };
    if uri.starts_with("data:") {
        return ImageFormat::sniff(&resource.bytes).or_else(declared);
    }
    declared()
        .or_else(|| ImageFormat::from_uri(uri))
        .or_else(|| ImageFormat::sniff(&resource.bytes))
}

/// A registered image part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub rel_id: String,
    pub format: ImageFormat,
    /// Pixel size from the header, if it could be read.
    pub size: Option<(u32, u32)>,
}

#[derive(Default)]
pub struct ImagePipeline {
    base_url: Option<String>,
    cache: HashMap<String, Option<ImageAsset>>,
}

impl ImagePipeline {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url,
            cache: HashMap::new(),
        }
    }

    /// Resolves `src` once; later calls with the same string reuse the
    /// outcome, failures included.
    pub fn resolve(
        &mut self,
        src: &str,
        fetcher: &dyn Fetch,
        document: &mut Document,
    ) -> Option<ImageAsset> {
        if let Some(cached) = self.cache.get(src) {
            return cached.clone();
        }
        let asset = match self.load(src, fetcher, document) {
            Ok(asset) => Some(asset),
            Err(err) => {
                warn!("image '{}' dropped: {err}", shorten(src));
                None
            }
        };
        self.cache.insert(src.to_string(), asset.clone());
        asset
    }

    fn load(&self, src: &str, fetcher: &dyn Fetch, document: &mut Document) -> Result<ImageAsset> {
        let (uri, resource) = if src.starts_with("data:") {
            let resource =
                decode_data_uri(src).ok_or_else(|| Error::fetch(&shorten(src), "malformed data uri"))?;
            (src.to_string(), resource)
        } else {
            let uri = resolve_uri(self.base_url.as_deref(), src);
            let resource = fetcher.fetch(&uri)?;
            (uri, resource)
        };
        if resource.bytes.is_empty() {
            return Err(Error::fetch(&shorten(&uri), "empty payload"));
        }
        let format = detect_format(&uri, &resource)
            .ok_or_else(|| Error::UnsupportedImage(shorten(&uri)))?;
        let size = image_size(format, &resource.bytes);
        debug!("image {} as {:?} {:?}", shorten(&uri), format, size);
        let rel_id = document.add_image(resource.bytes, format);
        Ok(ImageAsset {
            rel_id,
            format,
            size,
        })
    }
}

fn shorten(src: &str) -> String {
    if src.len() > 64 {
        let end = (0..=64).rev().find(|&i| src.is_char_boundary(i)).unwrap_or(0);
        format!("{}...", &src[..end])
    } else {
        src.to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    /// 1x1 transparent PNG.
    pub(crate) const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    pub(crate) struct CountingFetcher {
        pub calls: Cell<usize>,
        pub resource: Option<Resource>,
    }

    impl Fetch for CountingFetcher {
        fn fetch(&self, uri: &str) -> Result<Resource> {
            self.calls.set(self.calls.get() + 1);
            self.resource
                .clone()
                .ok_or_else(|| Error::fetch(uri, "offline"))
        }
    }

    #[test]
    fn test_detection_order() {
        let png = Resource {
            bytes: PNG_1X1.to_vec(),
            content_type: Some("image/gif".into()),
        };
        assert_eq!(detect_format("a.jpg", &png), Some(ImageFormat::Gif));
        let untyped = Resource {
            content_type: Some("application/octet-stream".into()),
            ..png.clone()
        };
        assert_eq!(detect_format("a.jpg", &untyped), Some(ImageFormat::Jpeg));
        assert_eq!(
            detect_format("show.aspx?id=3&name=pic.TIF", &untyped),
            Some(ImageFormat::Tiff)
        );
        assert_eq!(detect_format("blob", &untyped), Some(ImageFormat::Png));
    }

    fn encoded(format: image::ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn test_header_sizes() {
        assert_eq!(image_size(ImageFormat::Png, PNG_1X1), Some((1, 1)));
        for (raster, format) in [
            (image::ImageFormat::Gif, ImageFormat::Gif),
            (image::ImageFormat::Bmp, ImageFormat::Bmp),
            (image::ImageFormat::Jpeg, ImageFormat::Jpeg),
        ] {
            let bytes = encoded(raster, 64, 48);
            assert_eq!(ImageFormat::sniff(&bytes), Some(format));
            assert_eq!(image_size(format, &bytes), Some((64, 48)));
        }
        assert_eq!(image_size(ImageFormat::Png, b"\x89PNG"), None);
    }

    fn emf_header(left: i32, top: i32, right: i32, bottom: i32) -> Vec<u8> {
        let mut emf = vec![0u8; 44];
        emf[0] = 0x01;
        for (i, v) in [left, top, right, bottom].into_iter().enumerate() {
            emf[8 + i * 4..12 + i * 4].copy_from_slice(&v.to_le_bytes());
        }
        emf[40..44].copy_from_slice(b" EMF");
        emf
    }

    #[test]
    fn test_emf_bounds() {
        let emf = emf_header(10, 20, 110, 70);
        assert_eq!(ImageFormat::sniff(&emf), Some(ImageFormat::Emf));
        assert_eq!(image_size(ImageFormat::Emf, &emf), Some((100, 50)));
        let extreme = emf_header(i32::MIN, i32::MIN, 1, i32::MAX);
        assert_eq!(
            image_size(ImageFormat::Emf, &extreme),
            Some((2_147_483_649, u32::MAX))
        );
    }

    #[test]
    fn test_data_uri_sniffed_before_declared_type() {
        let resource = Resource {
            bytes: PNG_1X1.to_vec(),
            content_type: Some("image/gif".into()),
        };
        assert_eq!(detect_format("data:image/gif;base64,x", &resource), Some(ImageFormat::Png));
        let unknown = Resource {
            bytes: b"plain".to_vec(),
            ..resource
        };
        assert_eq!(detect_format("data:image/gif;base64,x", &unknown), Some(ImageFormat::Gif));
    }

    #[test]
    fn test_data_uri() {
        let res = decode_data_uri("data:image/png;base64,iVBORw0K GgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAACklEQVR4nGMAAQAABQABDQottAAAAABJRU5ErkJggg==").unwrap();
        assert_eq!(res.content_type.as_deref(), Some("image/png"));
        assert_eq!(res.bytes, PNG_1X1);
        let plain = decode_data_uri("data:,a%20b").unwrap();
        assert_eq!(plain.bytes, b"a b");
        assert_eq!(plain.content_type, None);
        assert!(decode_data_uri("data:image/png;base64").is_none());
    }

    #[test]
    fn test_same_source_fetched_once() {
        let mut doc = Document::new();
        let fetcher = CountingFetcher {
            calls: Cell::new(0),
            resource: Some(Resource {
                bytes: PNG_1X1.to_vec(),
                content_type: None,
            }),
        };
        let mut images = ImagePipeline::new(Some("http://example.com/".into()));
        let a = images.resolve("logo.png", &fetcher, &mut doc).unwrap();
        let b = images.resolve("logo.png", &fetcher, &mut doc).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.size, Some((1, 1)));
        assert_eq!(fetcher.calls.get(), 1);
    }

    #[test]
    fn test_failed_fetch_is_cached() {
        let mut doc = Document::new();
        let fetcher = CountingFetcher {
            calls: Cell::new(0),
            resource: None,
        };
        let mut images = ImagePipeline::default();
        assert!(images.resolve("x.png", &fetcher, &mut doc).is_none());
        assert!(images.resolve("x.png", &fetcher, &mut doc).is_none());
        assert_eq!(fetcher.calls.get(), 1);
    }
}
