//! Image acceptance checks
//!
//! An image is kept only if its extension is an allowed format and it
//! decodes to something strictly larger than the minimum dimension in both
//! directions. Raster formats are fully decoded; SVG is measured from the
//! root element's declared size. Everything here is pure and safe to call
//! from many workers at once.

use std::borrow::Cow;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;

/// Raster extensions decoded with the `image` crate
pub const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "ico"];

/// Vector extensions measured from their markup
pub const VECTOR_EXTENSIONS: &[&str] = &["svg"];

/// Formats that are recognised but never kept
pub const DISALLOWED_EXTENSIONS: &[&str] = &["webp", "avif"];

/// Why an image was not kept
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("disallowed format '{0}'")]
    DisallowedFormat(String),
    #[error("unsupported format '{0}'")]
    UnsupportedFormat(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("too small: {width}x{height}")]
    TooSmall { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatKind {
    Raster,
    Vector,
}

fn classify(extension: &str) -> Result<FormatKind, Rejection> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if DISALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Err(Rejection::DisallowedFormat(ext))
    } else if RASTER_EXTENSIONS.contains(&ext.as_str()) {
        Ok(FormatKind::Raster)
    } else if VECTOR_EXTENSIONS.contains(&ext.as_str()) {
        Ok(FormatKind::Vector)
    } else {
        Err(Rejection::UnsupportedFormat(ext))
    }
}

/// Size gate for downloaded images
#[derive(Debug, Clone)]
pub struct ImageValidator {
    min_dimension: u32,
    svg_dpi: f64,
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self::new(240, 96.0)
    }
}

impl ImageValidator {
    pub fn new(min_dimension: u32, svg_dpi: f64) -> Self {
        Self {
            min_dimension,
            svg_dpi,
        }
    }

    /// Check the extension alone; no decoding
    pub fn check_extension(&self, extension: &str) -> Result<(), Rejection> {
        classify(extension).map(|_| ())
    }

    /// Validate an in-memory image, returning its measured size when accepted
    pub fn validate_bytes(&self, bytes: &[u8], extension: &str) -> Result<(u32, u32), Rejection> {
        let (width, height) = match classify(extension)? {
            FormatKind::Raster => raster_dimensions(bytes)?,
            FormatKind::Vector => svg_dimensions(bytes, self.svg_dpi)?,
        };
        if width > self.min_dimension && height > self.min_dimension {
            Ok((width, height))
        } else {
            Err(Rejection::TooSmall { width, height })
        }
    }

    /// Validate a file on disk, using its extension to pick the decoder
    pub fn validate_file(&self, path: &Path) -> Result<(u32, u32), Rejection> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy())
            .unwrap_or(Cow::Borrowed(""));
        classify(&extension)?;
        let bytes = std::fs::read(path).map_err(|e| Rejection::Decode(e.to_string()))?;
        self.validate_bytes(&bytes, &extension)
    }
}

fn raster_dimensions(bytes: &[u8]) -> Result<(u32, u32), Rejection> {
    let img = image::load_from_memory(bytes).map_err(|e| Rejection::Decode(e.to_string()))?;
    Ok((img.width(), img.height()))
}

/// Rendered size of an SVG document at `dpi`
fn svg_dimensions(bytes: &[u8], dpi: f64) -> Result<(u32, u32), Rejection> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => return root_size(&e, dpi),
            Ok(Event::Eof) => return Err(Rejection::Decode("no root element".to_string())),
            Ok(_) => continue,
            Err(e) => return Err(Rejection::Decode(e.to_string())),
        }
    }
}

fn root_size(root: &BytesStart<'_>, dpi: f64) -> Result<(u32, u32), Rejection> {
    if root.local_name().as_ref() != b"svg" {
        return Err(Rejection::Decode("root element is not <svg>".to_string()));
    }

    let mut width = None;
    let mut height = None;
    let mut view_box = None;
    for attr in root.attributes() {
        let attr = attr.map_err(|e| Rejection::Decode(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| Rejection::Decode(e.to_string()))?;
        match attr.key.local_name().as_ref() {
            b"width" => width = parse_length(&value, dpi),
            b"height" => height = parse_length(&value, dpi),
            b"viewBox" => view_box = parse_view_box(&value),
            _ => {}
        }
    }

    let width = width.or(view_box.map(|(w, _)| w));
    let height = height.or(view_box.map(|(_, h)| h));
    match (width, height) {
        (Some(w), Some(h)) if w >= 0.0 && h >= 0.0 => Ok((w.round() as u32, h.round() as u32)),
        _ => Err(Rejection::Decode("SVG has no intrinsic size".to_string())),
    }
}

/// Convert an SVG length to pixels. Relative units (%, em) yield `None`.
fn parse_length(raw: &str, dpi: f64) -> Option<f64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| c.is_ascii_alphabetic() || c == '%')
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.trim().parse().ok()?;
    let factor = match unit.trim() {
        "" | "px" => 1.0,
        "in" => dpi,
        "cm" => dpi / 2.54,
        "mm" => dpi / 25.4,
        "pt" => dpi / 72.0,
        "pc" => dpi / 6.0,
        _ => return None,
    };
    Some(value * factor)
}

fn parse_view_box(raw: &str) -> Option<(f64, f64)> {
    let parts: Vec<f64> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [_, _, w, h] => Some((*w, *h)),
        _ => None,
    }
}
