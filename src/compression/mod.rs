pub mod bit_byte_array;
pub mod bit_packing;
pub mod elias_fano;
pub mod gamma;
pub mod gaps;
pub mod index_stream;
pub mod pfor;
pub mod simple16;
pub mod unary;
pub mod vbyte;

/// Stable on-disk codec identifiers. The ids are persisted in the index
/// header and in per-chunk metadata, so they must never be renumbered.
/// Every codec except Elias-Fano stores docIds gap-transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EncodeType {
    VariableByte = 1,
    Unary = 2,
    Gamma = 3,
    BitPacking = 4,
    Simple16 = 5,
    PForDelta = 6,
    EliasFano = 7,
    ByteBlocks = 8,
}

impl EncodeType {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(EncodeType::VariableByte),
            2 => Some(EncodeType::Unary),
            3 => Some(EncodeType::Gamma),
            4 => Some(EncodeType::BitPacking),
            5 => Some(EncodeType::Simple16),
            6 => Some(EncodeType::PForDelta),
            7 => Some(EncodeType::EliasFano),
            8 => Some(EncodeType::ByteBlocks),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EncodeType::VariableByte => "VariableByte",
            EncodeType::Unary => "Unary",
            EncodeType::Gamma => "Gamma",
            EncodeType::BitPacking => "BitPacking",
            EncodeType::Simple16 => "Simple16",
            EncodeType::PForDelta => "PForDelta",
            EncodeType::EliasFano => "EliasFano",
            EncodeType::ByteBlocks => "ByteBlocks",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "VariableByte" => Some(EncodeType::VariableByte),
            "Unary" => Some(EncodeType::Unary),
            "Gamma" => Some(EncodeType::Gamma),
            "BitPacking" => Some(EncodeType::BitPacking),
            "Simple16" => Some(EncodeType::Simple16),
            "PForDelta" => Some(EncodeType::PForDelta),
            "EliasFano" => Some(EncodeType::EliasFano),
            "ByteBlocks" => Some(EncodeType::ByteBlocks),
            _ => None,
        }
    }

    /// Whether docId sequences are stored gap-transformed under this codec.
    /// Elias-Fano ingests the raw sorted values.
    pub fn uses_gaps(self) -> bool {
        !matches!(self, EncodeType::EliasFano)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable() {
        for id in 1..=8u8 {
            let etype = EncodeType::from_id(id).unwrap();
            assert_eq!(etype.id(), id);
            assert_eq!(EncodeType::from_name(etype.name()), Some(etype));
        }
        assert!(EncodeType::from_id(0).is_none());
        assert!(EncodeType::from_id(9).is_none());
    }

    #[test]
    fn test_only_elias_fano_skips_gaps() {
        for id in 1..=8u8 {
            let etype = EncodeType::from_id(id).unwrap();
            assert_eq!(etype.uses_gaps(), etype != EncodeType::EliasFano);
        }
    }
}
