/// The narrowest width a block state array is ever stored with, even for tiny palettes.
pub const MIN_BITS_PER_ENTRY: u32 = 4;

/// Returns the number of bits needed to represent `num`, 0 for 0.
pub fn bit_length(num: usize) -> u32 {
    usize::BITS - num.leading_zeros()
}

/// Returns the width used to pack indices up to and including `max_index`.
pub fn bits_per_entry(max_index: usize) -> u32 {
    bit_length(max_index).max(MIN_BITS_PER_ENTRY)
}

fn entries_per_word(bits: u32) -> usize {
    debug_assert!(bits > 0 && bits < 64, "unsupported entry width {}", bits);
    (64 / bits) as usize
}

/// Packs `indices` into 64 bit words, `bits` bits each. An index never straddles two words, the
/// unused high bits of every word are left as zero. Words come back signed, the way they are
/// stored in a long array tag.
///
/// # Examples
///
/// ```rust
/// use anvil_codec::bits;
/// let words = bits::pack(&[1, 2, 3], 4);
/// assert_eq!(words, vec![0x321]);
/// ```
pub fn pack(indices: &[u32], bits: u32) -> Vec<i64> {
    let per_word = entries_per_word(bits);
    let mut words = Vec::with_capacity((indices.len() + per_word - 1) / per_word);

    for group in indices.chunks(per_word) {
        let mut word = 0u64;
        for (position, &index) in group.iter().enumerate() {
            debug_assert!(
                (index as u64) >> bits == 0,
                "index {} does not fit in {} bits",
                index,
                bits
            );
            word |= (index as u64) << (position as u32 * bits);
        }
        words.push(word as i64);
    }
    words
}

/// Inverse of [`pack`]: reads back `count` indices of `bits` bits each. Words past the end of
/// `words` are treated as zero, so a short array reads as index 0 rather than failing.
pub fn unpack(words: &[i64], bits: u32, count: usize) -> Vec<u32> {
    let per_word = entries_per_word(bits);
    let mask = (1u64 << bits) - 1;
    let mut indices = Vec::with_capacity(count);

    for i in 0..count {
        let word = words.get(i / per_word).map_or(0, |&w| w as u64);
        let shift = (i % per_word) as u32 * bits;
        indices.push(((word >> shift) & mask) as u32);
    }
    indices
}
