use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ImageEncoder, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::canvas::PixelBuffer;
use crate::error::EditorError;

/// File name offered when exporting the composite.
pub const EXPORT_FILE_NAME: &str = "nexus_cape.png";

/// Extensions offered by the import dialog.
pub const IMPORT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tga", "ico", "tif", "tiff"];

// ============================================================================
// PNG CODEC (snapshots + export)
// ============================================================================

/// Encode a buffer as an RGBA PNG in memory.
pub fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>, EditorError> {
    let mut out = Vec::new();
    let (w, h) = buffer.dimensions();
    PngEncoder::new(&mut out).write_image(buffer.as_raw(), w, h, image::ColorType::Rgba8)?;
    Ok(out)
}

/// Decode an in-memory PNG that must be exactly `width`×`height`.
pub fn decode_png(bytes: &[u8], width: u32, height: u32) -> Result<PixelBuffer, EditorError> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| EditorError::decode(e.to_string()))?
        .to_rgba8();
    if img.dimensions() != (width, height) {
        return Err(EditorError::decode(format!(
            "expected {}×{} image, got {}×{}",
            width,
            height,
            img.width(),
            img.height()
        )));
    }
    Ok(PixelBuffer::from_rgba_image(img))
}

// ============================================================================
// IMPORT
// ============================================================================

/// Decode any raster format the `image` crate understands.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, EditorError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| EditorError::decode(e.to_string()))
}

/// Scale an image to fill exactly `width`×`height`.
pub fn fit_to_canvas(img: &RgbaImage, width: u32, height: u32) -> PixelBuffer {
    if img.dimensions() == (width, height) {
        return PixelBuffer::from_rgba_image(img.clone());
    }
    PixelBuffer::from_rgba_image(image::imageops::resize(img, width, height, FilterType::Triangle))
}

/// Read and decode an image file, scaled to the canvas size.
pub fn load_image_file(path: &Path, width: u32, height: u32) -> Result<PixelBuffer, EditorError> {
    let bytes = std::fs::read(path)?;
    let img = decode_image(&bytes)?;
    log::info!(
        "Imported {} ({}×{} → {}×{})",
        path.display(),
        img.width(),
        img.height(),
        width,
        height
    );
    Ok(fit_to_canvas(&img, width, height))
}

// ============================================================================
// EXPORT
// ============================================================================

/// Write the buffer to `path` as PNG.
pub fn export_png(buffer: &PixelBuffer, path: &Path) -> Result<(), EditorError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let (w, h) = buffer.dimensions();
    PngEncoder::new(writer).write_image(buffer.as_raw(), w, h, image::ColorType::Rgba8)?;
    log::info!("Exported {}×{} PNG to {}", w, h, path.display());
    Ok(())
}

// ============================================================================
// LOCAL STORE – name/value placeholder for a future remote save
// ============================================================================

const STORE_MAGIC: &str = "NCS1";

#[derive(Serialize, Deserialize)]
struct StoreFile {
    magic: String,
    entries: BTreeMap<String, Vec<u8>>,
}

/// Exported PNGs keyed by `cape_<unix millis>`, persisted as one bincode file.
pub struct LocalStore {
    path: PathBuf,
    file: StoreFile,
}

impl LocalStore {
    /// Open the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EditorError> {
        let path = path.into();
        let file = if path.exists() {
            let raw = std::fs::read(&path)?;
            let file: StoreFile = bincode::deserialize(&raw)?;
            if file.magic != STORE_MAGIC {
                return Err(EditorError::decode(format!(
                    "{} is not a local store (magic '{}')",
                    path.display(),
                    file.magic
                )));
            }
            file
        } else {
            StoreFile {
                magic: STORE_MAGIC.to_string(),
                entries: BTreeMap::new(),
            }
        };
        Ok(Self { path, file })
    }

    /// Insert an encoded image under a fresh timestamp key and persist the
    /// whole store. On a failed write the entry is rolled back.
    pub fn save_png(&mut self, png: Vec<u8>) -> Result<String, EditorError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut key = format!("cape_{}", millis);
        let mut bump = 1;
        while self.file.entries.contains_key(&key) {
            key = format!("cape_{}_{}", millis, bump);
            bump += 1;
        }
        self.file.entries.insert(key.clone(), png);
        if let Err(e) = self.flush() {
            self.file.entries.remove(&key);
            log::error!("Local save to {} failed: {}", self.path.display(), e);
            return Err(e);
        }
        log::info!("Saved locally as {}", key);
        Ok(key)
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.file.entries.get(key).map(|v| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.file.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.file.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.entries.is_empty()
    }

    fn flush(&self) -> Result<(), EditorError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = bincode::serialize(&self.file)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("nexuscape-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn snapshot_png_preserves_pixels() {
        let mut buf = PixelBuffer::new(64, 32);
        buf.paint_square(3, 4, 3, Rgba([1, 2, 3, 255]));
        let png = encode_png(&buf).unwrap();
        assert_eq!(decode_png(&png, 64, 32).unwrap(), buf);
    }

    #[test]
    fn decode_png_rejects_wrong_size_and_garbage() {
        let png = encode_png(&PixelBuffer::new(8, 8)).unwrap();
        assert!(matches!(decode_png(&png, 64, 32), Err(EditorError::DecodeFailure(_))));
        assert!(matches!(decode_png(b"not a png", 8, 8), Err(EditorError::DecodeFailure(_))));
        assert!(matches!(decode_image(b"\x00\x01"), Err(EditorError::DecodeFailure(_))));
    }

    #[test]
    fn fit_scales_to_canvas() {
        let mut src = RgbaImage::new(128, 64);
        for p in src.pixels_mut() {
            *p = Rgba([9, 9, 9, 255]);
        }
        let fitted = fit_to_canvas(&src, 64, 32);
        assert_eq!(fitted.dimensions(), (64, 32));
        assert_eq!(fitted.get(10, 10), Some(Rgba([9, 9, 9, 255])));
    }

    #[test]
    fn export_writes_decodable_png() {
        let path = temp_path(EXPORT_FILE_NAME);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut buf = PixelBuffer::new(64, 32);
        buf.paint_square(0, 0, 1, Rgba([255, 0, 0, 255]));
        export_png(&buf, &path).unwrap();
        let back = load_image_file(&path, 64, 32).unwrap();
        assert_eq!(back, buf);
    }

    #[test]
    fn local_store_persists_entries() {
        let path = temp_path("store.bin");
        let mut store = LocalStore::open(&path).unwrap();
        assert!(store.is_empty());
        let first = store.save_png(vec![1, 2, 3]).unwrap();
        let second = store.save_png(vec![4]).unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("cape_"));

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(&first), Some(&[1u8, 2, 3][..]));
        assert_eq!(reopened.get(&second), Some(&[4u8][..]));
    }

    #[test]
    fn local_store_lists_keys_in_order() {
        let path = temp_path("store.bin");
        let mut store = LocalStore::open(&path).unwrap();
        assert_eq!(store.keys().count(), 0);
        let mut saved: Vec<String> = (0..3).map(|i| store.save_png(vec![i]).unwrap()).collect();
        saved.sort();

        let reopened = LocalStore::open(&path).unwrap();
        let keys: Vec<&str> = reopened.keys().collect();
        assert_eq!(keys, saved);
    }
}
