//! Image encoding: harvested PNG artifact → base64 string for the request body.
//!
//! The generate endpoint takes images as bare base64 strings (no data-URI
//! prefix). Artifacts are already PNG on disk, so the file bytes are sent as
//! they are, without a decode/re-encode round trip.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// Read an image artifact and encode it as standard base64.
pub fn encode_image_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());
    Ok(b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    #[test]
    fn encode_png_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fig.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])))
            .save(&path)
            .unwrap();

        let b64 = encode_image_file(&path).expect("encode should succeed");
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert_eq!(decoded, std::fs::read(&path).unwrap());
        assert!(decoded.starts_with(b"\x89PNG"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(encode_image_file(Path::new("/no/such/fig.png")).is_err());
    }
}
