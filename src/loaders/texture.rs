use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::gpu::ImageData;

/// One `url width` entry of a responsive source set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub width: u32,
}

/// Parsed `"a.jpg 800w, b.jpg 1920w"` source set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcSet {
    candidates: Vec<Candidate>,
}

impl SrcSet {
    pub fn parse(srcset: &str) -> Result<Self, LoadError> {
        let mut candidates = Vec::new();
        for entry in srcset.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split_whitespace();
            let url = parts.next().unwrap_or_default();
            let width = match parts.next() {
                Some(descriptor) => descriptor
                    .strip_suffix('w')
                    .and_then(|w| w.parse::<u32>().ok())
                    .ok_or_else(|| LoadError::decode(srcset, format!("bad width descriptor {:?}", descriptor)))?,
                None => return Err(LoadError::decode(srcset, format!("missing width for {:?}", url))),
            };
            candidates.push(Candidate {
                url: url.to_string(),
                width,
            });
        }

        if candidates.is_empty() {
            return Err(LoadError::decode(srcset, "empty source set"));
        }
        candidates.sort_by_key(|candidate| candidate.width);
        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Smallest candidate at least `min_width` wide, else the widest
    pub fn select(&self, min_width: u32) -> &Candidate {
        self.candidates
            .iter()
            .find(|candidate| candidate.width >= min_width)
            .or_else(|| self.candidates.last())
            .unwrap_or(&self.candidates[0])
    }
}

/// Two-phase screen texture: a tiny placeholder plus full sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenTexture {
    pub placeholder: Option<String>,
    pub srcset: String,
}

/// What to fetch for one texture
#[derive(Debug, Clone, PartialEq)]
pub enum TextureRequest {
    Url(String),
    SrcSet(String),
}

impl TextureRequest {
    /// Concrete URL for a canvas `canvas_width` CSS pixels wide
    pub fn resolve(&self, canvas_width: u32, device_pixel_ratio: f32) -> Result<String, LoadError> {
        match self {
            TextureRequest::Url(url) => Ok(url.clone()),
            TextureRequest::SrcSet(srcset) => {
                let needed = (canvas_width as f32 * device_pixel_ratio.max(1.0)).ceil() as u32;
                let set = SrcSet::parse(srcset)?;
                let chosen = set.select(needed);
                log::debug!("source set picked {} ({}w) for {}px", chosen.url, chosen.width, needed);
                Ok(chosen.url.clone())
            }
        }
    }
}

/// Decode PNG / JPEG / WebP bytes to RGBA8
pub fn decode_image(url: &str, bytes: &[u8]) -> Result<ImageData, LoadError> {
    let image = image::load_from_memory(bytes).map_err(|e| LoadError::decode(url, e))?;
    let rgba = image.to_rgba8();
    Ok(ImageData {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts_candidates() {
        let set = SrcSet::parse("screen-large.jpg 1920w, screen-small.jpg 800w").unwrap();
        let widths: Vec<u32> = set.candidates().iter().map(|c| c.width).collect();
        assert_eq!(widths, vec![800, 1920]);
    }

    #[test]
    fn picks_smallest_sufficient_candidate() {
        let set = SrcSet::parse("a.jpg 800w, b.jpg 1280w, c.jpg 1920w").unwrap();

        assert_eq!(set.select(700).url, "a.jpg");
        assert_eq!(set.select(800).url, "a.jpg");
        assert_eq!(set.select(801).url, "b.jpg");
        assert_eq!(set.select(4000).url, "c.jpg");
    }

    #[test]
    fn resolve_accounts_for_pixel_ratio() {
        let request = TextureRequest::SrcSet("a.jpg 800w, b.jpg 1920w".to_string());
        assert_eq!(request.resolve(600, 1.0).unwrap(), "a.jpg");
        assert_eq!(request.resolve(600, 2.0).unwrap(), "b.jpg");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(SrcSet::parse("").is_err());
        assert!(SrcSet::parse("a.jpg").is_err());
        assert!(SrcSet::parse("a.jpg 2x").is_err());
    }

    #[test]
    fn decode_reports_garbage() {
        let err = decode_image("broken.png", b"not an image").unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn decode_png() {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_image("tiny.png", &bytes).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 3));
        assert_eq!(&decoded.rgba[..4], &[10, 20, 30, 255]);
    }
}
