use arrayvec::ArrayVec;

// align must be a power of two
#[inline]
pub fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) & !(align - 1)
}

// truncates a value to an operand width of 1, 2 or 4 bytes
#[inline]
pub fn mask(val: u32, width: u8) -> u32 {
    match width {
        1 => val & 0xFF,
        2 => val & 0xFFFF,
        _ => val,
    }
}

pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words
        .iter()
        .flat_map(|w| ArrayVec::from(w.to_be_bytes()))
        .collect()
}

pub fn bytes_to_words(bytes: &[u8]) -> Option<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(8, 4), 8);
        assert_eq!(align_up(0x101, 0x100), 0x200);
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask(0x1234_5678, 1), 0x78);
        assert_eq!(mask(0x1234_5678, 2), 0x5678);
        assert_eq!(mask(0x1234_5678, 4), 0x1234_5678);
    }

    #[test]
    fn test_words() {
        let bytes = words_to_bytes(&[0x0102_0304, 0xA0B0_C0D0]);
        assert_eq!(bytes, vec![1, 2, 3, 4, 0xA0, 0xB0, 0xC0, 0xD0]);
        assert_eq!(bytes_to_words(&bytes), Some(vec![0x0102_0304, 0xA0B0_C0D0]));
        assert_eq!(bytes_to_words(&bytes[..3]), None);
    }
}
