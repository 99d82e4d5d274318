use crate::compression::bit_byte_array::{BitByteArray, BitReader};
use crate::compression::vbyte;
use crate::error::{IndexError, Result};

// Elias-Fano for monotonically increasing sequences. Unlike every other
// codec, this one ingests the raw sorted values: the gap transform is skipped
// on both the write and the read path. Layout:
//
//   1 byte            l = number of low bits per element
//   high-bit stream   unary bucket map: for each bucket 0..=max_high, the
//                     count of elements in it as ones, then a zero
//   low-bit stream    l bits per element, in order
//
// l is the smallest value with n * 2^l >= U (U = max + 1), i.e.
// ceil(log2(U/n)). Single-element sequences are stored as plain
// Variable-Byte, which is why the multi-encode selector evaluates Elias-Fano
// strictly last: a tie on such sequences must resolve to VariableByte so the
// bytes decode identically either way.

fn low_bits(numbers: &[u32]) -> u32 {
    let n = numbers.len() as u64;
    let universe = *numbers.last().unwrap() as u64 + 1;
    let mut l = 0u32;
    while (n << l) < universe {
        l += 1;
    }
    l
}

pub fn encode(numbers: &[u32]) -> (Vec<u8>, u32) {
    match numbers.len() {
        0 => (Vec::new(), 0),
        1 => (vbyte::encode(numbers[0]), 0),
        _ => {
            let l = low_bits(numbers);
            let max_high = numbers.last().unwrap() >> l;

            let mut array = BitByteArray::new();
            array.extend(&[l as u8], 0);

            let mut bucket = 0u32;
            let mut pending = 0u64;
            for &value in numbers {
                let high = value >> l;
                while bucket < high {
                    emit_bucket(&mut array, pending);
                    pending = 0;
                    bucket += 1;
                }
                pending += 1;
            }
            emit_bucket(&mut array, pending);
            debug_assert_eq!(bucket, max_high);

            for &value in numbers {
                array.push_bits(value & low_mask(l), l);
            }
            let padding = array.padding();
            (array.take_bytes(), padding)
        }
    }
}

fn emit_bucket(array: &mut BitByteArray, count: u64) {
    for _ in 0..count {
        array.push_bit(true);
    }
    array.push_bit(false);
}

fn low_mask(l: u32) -> u32 {
    if l == 0 {
        0
    } else {
        u32::MAX >> (32 - l)
    }
}

/// Decodes exactly `count` numbers, reconstructing the original values.
pub fn decode(bytes: &[u8], count: usize) -> Result<Vec<u32>> {
    match count {
        0 => Ok(Vec::new()),
        1 => match vbyte::decode_number(bytes, 0) {
            Some((value, _)) => Ok(vec![value]),
            None => Err(IndexError::CodecMismatch {
                expected: 1,
                decoded: 0,
            }),
        },
        _ => {
            let mismatch = |decoded| IndexError::CodecMismatch {
                expected: count,
                decoded,
            };
            if bytes.is_empty() {
                return Err(mismatch(0));
            }
            let l = bytes[0] as u32;
            if l > 31 {
                return Err(mismatch(0));
            }
            let mut reader = BitReader::new(&bytes[1..]);

            let mut highs = Vec::with_capacity(count);
            let mut bucket = 0u32;
            while highs.len() < count {
                match reader.read_bit() {
                    Some(true) => highs.push(bucket),
                    Some(false) => bucket += 1,
                    None => return Err(mismatch(highs.len())),
                }
            }
            // The last bucket's terminator sits between the high and the low
            // streams; consume it before reading the low bits.
            match reader.read_bit() {
                Some(false) => {}
                _ => return Err(mismatch(highs.len())),
            }

            let mut numbers = Vec::with_capacity(count);
            for (decoded, high) in highs.into_iter().enumerate() {
                match reader.read_bits(l) {
                    Some(low) => numbers.push((high << l) | low),
                    None => return Err(mismatch(decoded)),
                }
            }
            Ok(numbers)
        }
    }
}
