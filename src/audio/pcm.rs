//! Little-endian signed 16-bit PCM decoding.

/// Scale from i16 to `[-1, 1)`.
const I16_SCALE: f32 = 32768.0;

/// Decode a whole buffer of little-endian i16 samples. A trailing odd byte is dropped.
pub fn decode_i16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / I16_SCALE)
        .collect()
}

/// Streaming decoder that stitches samples split across chunk boundaries.
///
/// Transport chunks are not guaranteed to hold an even number of bytes; a
/// dangling low byte is kept until the next chunk supplies its high byte.
#[derive(Debug, Default, Clone)]
pub struct PcmDecoder {
    carry: Option<u8>,
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` and append the samples to `out`. Returns the number appended.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut Vec<f32>) -> usize {
        let before = out.len();
        let mut rest = bytes;

        if let Some(low) = self.carry.take() {
            match rest.split_first() {
                Some((&high, tail)) => {
                    out.push(i16::from_le_bytes([low, high]) as f32 / I16_SCALE);
                    rest = tail;
                }
                None => {
                    self.carry = Some(low);
                    return 0;
                }
            }
        }

        let pairs = rest.chunks_exact(2);
        if let [odd] = pairs.remainder() {
            self.carry = Some(*odd);
        }
        out.extend(pairs.map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / I16_SCALE));
        out.len() - before
    }

    /// Whether a partial sample is waiting for its second byte.
    pub fn has_pending_byte(&self) -> bool {
        self.carry.is_some()
    }

    pub fn reset(&mut self) {
        self.carry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_range() {
        let decoded = decode_i16_le(&encode(&[0, i16::MAX, i16::MIN, 16384]));
        assert_eq!(decoded[0], 0.0);
        assert!(decoded[1] < 1.0 && decoded[1] > 0.9999);
        assert_eq!(decoded[2], -1.0);
        assert_eq!(decoded[3], 0.5);
    }

    #[test]
    fn test_decode_drops_odd_byte() {
        let mut bytes = encode(&[100]);
        bytes.push(7);
        assert_eq!(decode_i16_le(&bytes).len(), 1);
    }

    #[test]
    fn test_decoder_stitches_split_sample() {
        let bytes = encode(&[-2, 300, 12345]);
        let mut decoder = PcmDecoder::new();
        let mut out = Vec::new();

        assert_eq!(decoder.decode_into(&bytes[..3], &mut out), 1);
        assert!(decoder.has_pending_byte());
        assert_eq!(decoder.decode_into(&bytes[3..], &mut out), 2);
        assert!(!decoder.has_pending_byte());

        assert_eq!(out, decode_i16_le(&bytes));
    }

    #[test]
    fn test_decoder_single_byte_chunks() {
        let bytes = encode(&[1, -1, 500]);
        let mut decoder = PcmDecoder::new();
        let mut out = Vec::new();
        for byte in &bytes {
            decoder.decode_into(std::slice::from_ref(byte), &mut out);
        }
        assert_eq!(out, decode_i16_le(&bytes));
    }

    #[test]
    fn test_decoder_empty_chunk_keeps_carry() {
        let mut decoder = PcmDecoder::new();
        let mut out = Vec::new();
        decoder.decode_into(&[0x01], &mut out);
        assert_eq!(decoder.decode_into(&[], &mut out), 0);
        assert!(decoder.has_pending_byte());
        decoder.reset();
        assert!(!decoder.has_pending_byte());
    }
}
