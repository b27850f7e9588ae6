use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Side length of the perceptual hash grid (8x8 = 64 bits).
pub const PERCEPTUAL_HASH_SIZE: u32 = 8;

/// Largest possible Hamming distance between two perceptual hashes.
pub const PERCEPTUAL_HASH_BITS: u32 = PERCEPTUAL_HASH_SIZE * PERCEPTUAL_HASH_SIZE;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("Malformed hash string: {value}")]
    Malformed { value: String },
}

/// SHA-256 digest of the raw photo bytes, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub fn parse(value: &str) -> Result<Self, HashError> {
        let value = value.trim().to_ascii_lowercase();
        match hex::decode(&value) {
            Ok(bytes) if bytes.len() == 32 => Ok(Self(value)),
            _ => Err(HashError::Malformed { value }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Gradient (difference) hash of the decoded photo. Compared by Hamming distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerceptualHash(Vec<u8>);

impl PerceptualHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn parse(value: &str) -> Result<Self, HashError> {
        let trimmed = value.trim();
        match hex::decode(trimmed) {
            Ok(bytes) if !bytes.is_empty() => Ok(Self(bytes)),
            _ => Err(HashError::Malformed {
                value: trimmed.to_string(),
            }),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn bit_len(&self) -> u32 {
        self.0.len() as u32 * 8
    }

    /// Hamming distance, or `None` when the two hashes have different lengths.
    pub fn distance(&self, other: &PerceptualHash) -> Option<u32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.to_hex()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoHashes {
    pub exact: ContentHash,
    pub perceptual: Option<PerceptualHash>,
}

/// Compute SHA-256 content hash of the photo bytes.
/// This is used for exact duplicate detection and never fails.
pub fn compute_content_hash(photo_bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(photo_bytes);
    ContentHash(hex::encode(hasher.finalize()))
}

/// Decode the photo and compute its perceptual hash.
pub fn compute_perceptual_hash(photo_bytes: &[u8]) -> Result<PerceptualHash, HashError> {
    let img = image::load_from_memory(photo_bytes)?;
    Ok(hash_image(&img))
}

/// Perceptual hash of an already decoded photo.
pub fn hash_image(img: &DynamicImage) -> PerceptualHash {
    let hasher = HasherConfig::new()
        .hash_size(PERCEPTUAL_HASH_SIZE, PERCEPTUAL_HASH_SIZE)
        .hash_alg(HashAlg::Gradient)
        .to_hasher();
    PerceptualHash::from_bytes(hasher.hash_image(img).as_bytes())
}

/// Compute both hashes. Fails with [`HashError::InvalidImage`] when the bytes
/// cannot be decoded; callers that want to keep exact matching in that case
/// fall back to [`compute_content_hash`].
pub fn compute_hashes(photo_bytes: &[u8]) -> Result<PhotoHashes, HashError> {
    let perceptual = compute_perceptual_hash(photo_bytes)?;
    Ok(PhotoHashes {
        exact: compute_content_hash(photo_bytes),
        perceptual: Some(perceptual),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// A structured test picture: diagonal gradient with a bright block whose
    /// position depends on `variant`.
    pub fn pattern(variant: u32) -> RgbImage {
        RgbImage::from_fn(128, 96, |x, y| {
            let base = ((x + y) * 255 / (128 + 96)) as u8;
            let block_x = 16 + (variant * 37) % 80;
            let block_y = 8 + (variant * 23) % 56;
            if x >= block_x && x < block_x + 32 && y >= block_y && y < block_y + 24 {
                Rgb([255 - base, 40, 200])
            } else if (x / 16 + variant) % 3 == 0 {
                Rgb([base / 3, base, 90])
            } else {
                Rgb([base, base / 2, 255 - base])
            }
        })
    }

    pub fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    pub fn png(variant: u32) -> Vec<u8> {
        encode(&pattern(variant), ImageFormat::Png)
    }

    pub fn jpeg(variant: u32) -> Vec<u8> {
        encode(&pattern(variant), ImageFormat::Jpeg)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn test_compute_hashes_is_deterministic() {
        let bytes = fixtures::png(1);
        let first = compute_hashes(&bytes).unwrap();
        for _ in 0..5 {
            assert_eq!(compute_hashes(&bytes).unwrap(), first);
        }

        // Verify hash format (64 hex characters for SHA-256)
        assert_eq!(first.exact.as_str().len(), 64);
        assert!(first.exact.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(first.perceptual.unwrap().bit_len(), 64);
    }

    #[test]
    fn test_invalid_image_is_rejected() {
        let err = compute_hashes(b"definitely not a photo").unwrap_err();
        assert!(matches!(err, HashError::InvalidImage(_)));

        // The content hash is still available for the same bytes
        let exact = compute_content_hash(b"definitely not a photo");
        assert_eq!(exact.as_str().len(), 64);
    }

    #[test]
    fn test_different_bytes_different_content_hash() {
        assert_ne!(compute_content_hash(b"Content A"), compute_content_hash(b"Content B"));
    }

    #[test]
    fn test_recompressed_copy_stays_close() {
        let png = compute_hashes(&fixtures::png(3)).unwrap();
        let jpeg = compute_hashes(&fixtures::jpeg(3)).unwrap();

        assert_ne!(png.exact, jpeg.exact);
        let distance = png
            .perceptual
            .unwrap()
            .distance(&jpeg.perceptual.unwrap())
            .unwrap();
        assert!(distance <= 5, "distance was {distance}");
    }

    #[test]
    fn test_hamming_distance() {
        let a = PerceptualHash::parse("ff00ff00ff00ff00").unwrap();
        let b = PerceptualHash::parse("ff00ff00ff00ff01").unwrap();
        let short = PerceptualHash::parse("ff").unwrap();

        assert_eq!(a.distance(&a), Some(0));
        assert_eq!(a.distance(&b), Some(1));
        assert_eq!(a.distance(&short), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ContentHash::parse("abc").is_err());
        assert!(PerceptualHash::parse("zz").is_err());
        assert!(PerceptualHash::parse("").is_err());

        let upper = "A".repeat(64);
        assert_eq!(ContentHash::parse(&upper).unwrap().as_str(), "a".repeat(64));
    }

    #[test]
    fn test_deserialize_validates_hashes() {
        let exact: ContentHash = serde_json::from_str(&format!("\"{}\"", "AB".repeat(32))).unwrap();
        assert_eq!(exact.as_str(), "ab".repeat(32));
        assert_eq!(serde_json::to_string(&exact).unwrap(), format!("\"{}\"", "ab".repeat(32)));

        assert!(serde_json::from_str::<ContentHash>("\"not-a-digest\"").is_err());
        assert!(serde_json::from_str::<PhotoHashes>(
            r#"{"exact":"deadbeef","perceptual":null}"#
        )
        .is_err());
    }
}
