//! PDF page access through `lopdf`. A page is rasterized by decoding the
//! largest image it embeds, which covers scanned and photographed notes.
//! Pages drawn purely with vector operators have no raster to sample and
//! fail as per-file decode errors.

use crate::error::MediaError;
use crate::media::{image_error, PageRenderer};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;

const PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl PageRenderer for PdfRenderer {
    fn page_count(&self, path: &Path) -> Result<usize, MediaError> {
        Ok(open(path)?.get_pages().len())
    }

    fn render_page(&self, path: &Path, page: usize) -> Result<DynamicImage, MediaError> {
        let doc = open(path)?;
        let pages = doc.get_pages();
        let page_id = pages
            .values()
            .nth(page)
            .copied()
            .ok_or(MediaError::PageOutOfRange {
                path: path.to_path_buf(),
                page,
                count: pages.len(),
            })?;
        let stream = largest_image(&doc, page_id)
            .ok_or_else(|| decode(path, "page has no embedded image"))?;
        raster(path, stream)
    }
}

/// Loads a document, refusing encrypted ones.
pub fn open(path: &Path) -> Result<Document, MediaError> {
    let bytes = std::fs::read(path).map_err(|e| MediaError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if contains(&bytes, b"/Encrypt") {
        return Err(MediaError::Protected(path.to_path_buf()));
    }
    let doc = Document::load_mem(&bytes).map_err(|e| {
        let reason = e.to_string();
        if reason.to_ascii_lowercase().contains("crypt") {
            MediaError::Protected(path.to_path_buf())
        } else {
            MediaError::Malformed {
                path: path.to_path_buf(),
                reason,
            }
        }
    })?;
    if doc.is_encrypted() {
        return Err(MediaError::Protected(path.to_path_buf()));
    }
    Ok(doc)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn decode(path: &Path, reason: &str) -> MediaError {
    MediaError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn dict_entry<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    match resolve(doc, dict.get(key).ok()?)? {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

fn integer(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match resolve(doc, dict.get(key).ok()?)? {
        Object::Integer(i) => Some(*i),
        _ => None,
    }
}

/// Resources may be inherited from any ancestor in the page tree.
fn resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = match doc.get_object(page_id).ok()? {
        Object::Dictionary(d) => d,
        _ => return None,
    };
    for _ in 0..PARENT_DEPTH {
        if let Some(res) = dict_entry(doc, node, b"Resources") {
            return Some(res);
        }
        node = dict_entry(doc, node, b"Parent")?;
    }
    None
}

fn largest_image(doc: &Document, page_id: ObjectId) -> Option<&Stream> {
    let xobjects = dict_entry(doc, resources(doc, page_id)?, b"XObject")?;
    xobjects
        .iter()
        .filter_map(|(_, obj)| match resolve(doc, obj)? {
            Object::Stream(s) if matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") => {
                let area = integer(doc, &s.dict, b"Width")? * integer(doc, &s.dict, b"Height")?;
                Some((area, s))
            }
            _ => None,
        })
        .max_by_key(|(area, _)| *area)
        .map(|(_, s)| s)
}

fn filter(stream: &Stream) -> Option<Vec<u8>> {
    match stream.dict.get(b"Filter").ok()? {
        Object::Name(n) => Some(n.clone()),
        Object::Array(items) => match items.last()? {
            Object::Name(n) => Some(n.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn raster(path: &Path, stream: &Stream) -> Result<DynamicImage, MediaError> {
    let data = match filter(stream).as_deref() {
        Some(b"DCTDecode") => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|e| image_error(path, e));
        }
        Some(b"FlateDecode") => stream
            .decompressed_content()
            .map_err(|e| decode(path, &e.to_string()))?,
        None => stream.content.clone(),
        Some(_) => return Err(decode(path, "unsupported image filter")),
    };

    let width = stream.dict.get(b"Width").ok().and_then(|o| match o {
        Object::Integer(i) => u32::try_from(*i).ok(),
        _ => None,
    });
    let height = stream.dict.get(b"Height").ok().and_then(|o| match o {
        Object::Integer(i) => u32::try_from(*i).ok(),
        _ => None,
    });
    let (width, height) = match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(decode(path, "image has no size")),
    };
    if !matches!(stream.dict.get(b"BitsPerComponent"), Ok(Object::Integer(8))) {
        return Err(decode(path, "only 8-bit images are supported"));
    }

    let pixels = width as usize * height as usize;
    let channels = data.len() / pixels;
    let data = data[..pixels * channels].to_vec();
    let img = match channels {
        1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        _ => None,
    };
    img.ok_or_else(|| decode(path, "unsupported colour layout"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use std::path::PathBuf;

    /// One page per colour, each carrying a 4x4 uncompressed RGB image.
    fn write_pdf(path: &Path, pages: &[[u8; 3]], encrypted: bool) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        for color in pages {
            let pixels: Vec<u8> = color.iter().copied().cycle().take(4 * 4 * 3).collect();
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 4,
                    "Height" => 4,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                pixels,
            ));
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                b"q 4 0 0 4 0 0 cm /Im0 Do Q".to_vec(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
                "MediaBox" => vec![0.into(), 0.into(), 4.into(), 4.into()],
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        if encrypted {
            doc.trailer.set(
                "Encrypt",
                dictionary! { "Filter" => "Standard", "V" => 1, "R" => 2 },
            );
        }
        doc.save(path).unwrap();
    }

    fn fixture(name: &str, pages: &[[u8; 3]], encrypted: bool) -> (tempfile::TempDir, PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(name);
        write_pdf(&path, pages, encrypted);
        (temp, path)
    }

    #[test]
    fn counts_and_renders_embedded_images() {
        let (_temp, path) = fixture("slides.pdf", &[[255, 255, 255], [0, 0, 0], [10, 200, 30]], false);
        assert_eq!(PdfRenderer.page_count(&path).unwrap(), 3);

        let last = PdfRenderer.render_page(&path, 2).unwrap().to_rgb8();
        assert_eq!((last.width(), last.height()), (4, 4));
        assert_eq!(last.get_pixel(0, 0).0, [10, 200, 30]);
        let first = PdfRenderer.render_page(&path, 0).unwrap().to_rgb8();
        assert_eq!(first.get_pixel(3, 3).0, [255, 255, 255]);
    }

    #[test]
    fn encrypted_documents_are_protected() {
        let (_temp, path) = fixture("locked.pdf", &[[0, 0, 0]], true);
        assert!(matches!(
            PdfRenderer.page_count(&path),
            Err(MediaError::Protected(_))
        ));
        assert!(matches!(
            PdfRenderer.render_page(&path, 0),
            Err(MediaError::Protected(_))
        ));
    }

    #[test]
    fn page_past_the_end_is_out_of_range() {
        let (_temp, path) = fixture("one.pdf", &[[0, 0, 0]], false);
        assert!(matches!(
            PdfRenderer.render_page(&path, 1),
            Err(MediaError::PageOutOfRange { page: 1, count: 1, .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("junk.pdf");
        std::fs::write(&path, b"%PDF-1.4 nothing else").unwrap();
        assert!(matches!(
            PdfRenderer.page_count(&path),
            Err(MediaError::Malformed { .. })
        ));
    }
}
