//! Resource fetching for image sources.

use std::path::Path;
use std::time::Duration;

use log::debug;
use percent_encoding::percent_decode_str;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;

use crate::error::{Error, Result};

/// Bytes of a fetched resource and the content type the server declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Fetch capability injected into the converter.
pub trait Fetch {
    fn fetch(&self, uri: &str) -> Result<Resource>;
}

impl<F: Fetch + ?Sized> Fetch for &F {
    fn fetch(&self, uri: &str) -> Result<Resource> {
        (**self).fetch(uri)
    }
}

/// Fetches `http(s)` URLs with a blocking client, `file:` URLs and plain
/// paths from the filesystem.
pub struct DefaultFetcher {
    client: Option<reqwest::blocking::Client>,
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultFetcher {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| log::warn!("http client unavailable: {err}"))
            .ok();
        Self { client }
    }

    fn fetch_http(&self, url: &Url) -> Result<Resource> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::fetch(url.as_str(), "http client unavailable"))?;
        let resp = client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|err| Error::fetch(url.as_str(), err))?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .map_err(|err| Error::fetch(url.as_str(), err))?
            .to_vec();
        Ok(Resource {
            bytes,
            content_type,
        })
    }
}

fn read_file(uri: &str, path: &Path) -> Result<Resource> {
    let bytes = std::fs::read(path).map_err(|err| Error::fetch(uri, err))?;
    Ok(Resource {
        bytes,
        content_type: None,
    })
}

impl Fetch for DefaultFetcher {
    fn fetch(&self, uri: &str) -> Result<Resource> {
        debug!("fetching {uri}");
        match Url::parse(uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.fetch_http(&url),
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::fetch(uri, "not a local file path"))?;
                read_file(uri, &path)
            }
            // Windows drive letters parse as a one-letter scheme.
            Ok(url) if url.scheme().len() > 1 => Err(Error::fetch(uri, "unsupported scheme")),
            _ => {
                let decoded = percent_decode_str(uri).decode_utf8_lossy();
                read_file(uri, Path::new(decoded.as_ref()))
            }
        }
    }
}

/// Resolves `src` against `base` when `src` is relative.
pub fn resolve_uri(base: Option<&str>, src: &str) -> String {
    if Url::parse(src).is_ok() {
        return src.to_string();
    }
    let Some(base) = base else {
        return src.to_string();
    };
    match Url::parse(base).and_then(|b| b.join(src)) {
        Ok(url) => url.to_string(),
        Err(_) => Path::new(base).join(src).to_string_lossy().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_resolve_uri() {
        assert_eq!(
            resolve_uri(Some("http://example.com/img/"), "a.png"),
            "http://example.com/img/a.png"
        );
        assert_eq!(
            resolve_uri(Some("http://example.com/img/"), "https://other.org/b.gif"),
            "https://other.org/b.gif"
        );
        assert_eq!(resolve_uri(None, "a.png"), "a.png");
    }

    #[test]
    fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"abc")
            .unwrap();
        let fetcher = DefaultFetcher::new();

        let plain = fetcher.fetch(path.to_str().unwrap()).unwrap();
        assert_eq!(plain.bytes, b"abc");

        let url = Url::from_file_path(&path).unwrap();
        let via_url = fetcher.fetch(url.as_str()).unwrap();
        assert_eq!(via_url.bytes, b"abc");
        assert_eq!(via_url.content_type, None);
    }

    #[test]
    fn test_fetch_missing_file_fails() {
        let fetcher = DefaultFetcher::new();
        assert!(matches!(
            fetcher.fetch("/definitely/not/here.png"),
            Err(Error::Fetch { .. })
        ));
    }
}
