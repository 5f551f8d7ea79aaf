//! Crate-level tests and shared fixtures.


use sha2::{Digest, Sha256};

use crate::semantic::{EmbeddingError, Encoder};

/// Deterministic bag-of-words encoder: every lowercased token adds 1.0 to
/// the slot its hash lands in. Stands in for the ONNX model.
pub struct HashingEncoder {
    dimensions: usize,
}

impl HashingEncoder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn encode_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(bytes) % self.dimensions as u64) as usize;
            vector[slot] += 1.0;
        }
        vector
    }
}

impl Encoder for HashingEncoder {
    fn name(&self) -> &str {
        "hashing-test"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.encode_text(t)).collect())
    }
}

/// Minimal Gutenberg-style KJV excerpt: two books, a continuation line and
/// license text on both sides of the markers.
pub const BIBLE_SAMPLE: &str = "\
The Project Gutenberg eBook of The King James Bible
1:1 This line is before the start marker and must be ignored

*** START OF THE PROJECT GUTENBERG EBOOK THE KING JAMES BIBLE ***

The First Book of Moses: Called Genesis

1:1 In the beginning God created the heaven and the earth.

1:2 And the earth was without form, and void; and darkness was upon
the face of the deep. And the Spirit of God moved upon the face of the
waters.

1:3 And God said, Let there be light: and there was light.

The Gospel According to Saint John

1:1 In the beginning was the Word, and the Word was with God, and the
Word was God.

1:5 And the light shineth in darkness; and the darkness comprehended it not.

*** END OF THE PROJECT GUTENBERG EBOOK THE KING JAMES BIBLE ***

1:9 License text after the end marker
";

pub const QURAN_SAMPLE: &str = "\
# Pickthall translation
1|1|In the name of Allah, the Beneficent, the Merciful.
1|2|Praise be to Allah, Lord of the Worlds,
2|2|This is the Scripture whereof there is no doubt
2|3
24|35|Allah is the Light of the heavens and the earth.
";

#[test]
fn test_hashing_encoder_is_deterministic() {
    let encoder = HashingEncoder::new(32);
    let a = encoder.encode_one("Let there be light").unwrap();
    let b = encoder.encode_one("let THERE be light!").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.iter().sum::<f32>(), 4.0);
    assert!(encoder.encode_one("").unwrap().iter().all(|x| *x == 0.0));
}
