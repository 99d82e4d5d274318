// Gap (delta) transform for ascending docId sequences: the first value is
// kept as-is, every later value is stored as the difference to its
// predecessor. Applied to docIds under every codec except Elias-Fano, and
// never to frequencies.

pub fn encode(numbers: &[u32]) -> Vec<u32> {
    let mut gaps = Vec::with_capacity(numbers.len());
    let mut last = None;
    for &number in numbers {
        match last {
            None => gaps.push(number),
            Some(previous) => gaps.push(number - previous),
        }
        last = Some(number);
    }
    gaps
}

pub fn decode(gaps: &[u32]) -> Vec<u32> {
    let mut numbers = Vec::with_capacity(gaps.len());
    let mut total = 0u32;
    for (i, &gap) in gaps.iter().enumerate() {
        if i == 0 {
            total = gap;
        } else {
            total += gap;
        }
        numbers.push(total);
    }
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_round_trip() {
        let numbers = vec![1, 4, 6, 13, 89, 128, 681, 702, 3263, 3489];
        assert_eq!(decode(&encode(&numbers)), numbers);
    }

    #[test]
    fn test_consecutive_values_become_ones() {
        assert_eq!(encode(&[5, 6, 7, 8]), vec![5, 1, 1, 1]);
        assert_eq!(decode(&[5, 1, 1, 1]), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_single_and_empty() {
        assert_eq!(encode(&[42]), vec![42]);
        assert_eq!(decode(&[42]), vec![42]);
        assert!(encode(&[]).is_empty());
        assert!(decode(&[]).is_empty());
    }
}
