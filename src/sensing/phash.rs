use anyhow::Result;
use image_hasher::{HashAlg, HasherConfig, ImageHash};

pub fn compute_phash(image_bytes: &[u8]) -> Result<ImageHash> {
    let img = image::load_from_memory(image_bytes)?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    Ok(hasher.hash_image(&img))
}

/// Drops images whose perceptual hash is within `max_distance` of an image
/// already kept. Undecodable images are kept so the model still sees them.
pub fn dedupe_similar(images: Vec<Vec<u8>>, max_distance: u32) -> Vec<Vec<u8>> {
    let mut kept: Vec<Vec<u8>> = Vec::with_capacity(images.len());
    let mut hashes: Vec<ImageHash> = Vec::with_capacity(images.len());

    for bytes in images {
        match compute_phash(&bytes) {
            Ok(hash) => {
                if hashes.iter().any(|seen| seen.dist(&hash) <= max_distance) {
                    log::debug!("Dropping near-duplicate event image");
                    continue;
                }
                hashes.push(hash);
                kept.push(bytes);
            }
            Err(err) => {
                log::debug!("phash failed for event image: {err}");
                kept.push(bytes);
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png(pixel: impl Fn(u32, u32) -> Rgb<u8>) -> Vec<u8> {
        let img = ImageBuffer::from_fn(64, 64, pixel);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn identical_images_collapse() {
        let stripes = png(|x, _| if x % 16 < 8 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let kept = dedupe_similar(vec![stripes.clone(), stripes], 0);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn undecodable_images_are_kept() {
        let kept = dedupe_similar(vec![b"garbage".to_vec(), b"more garbage".to_vec()], 4);
        assert_eq!(kept.len(), 2);
    }
}
