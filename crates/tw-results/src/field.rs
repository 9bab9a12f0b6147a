//! Output field flags.
//!
//! The field mask in a result stream header selects which per-node
//! quantities every time record carries. Fields are written in bit order.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Water level.
    Position,
    Depth,
    Velocity,
    /// Depth-integrated flow (u·h, v·h).
    Flow,
    Scalar,
    Salinity,
    EddyViscosity,
    Shear,
    ScalarGradient,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Position,
        Field::Depth,
        Field::Velocity,
        Field::Flow,
        Field::Scalar,
        Field::Salinity,
        Field::EddyViscosity,
        Field::Shear,
        Field::ScalarGradient,
    ];

    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Number of `f32` values per node.
    pub fn components(self) -> usize {
        match self {
            Field::Velocity | Field::Flow | Field::Shear | Field::ScalarGradient => 2,
            _ => 1,
        }
    }

    /// Fields that are physically non-negative and clamped before writing.
    pub fn is_non_negative(self) -> bool {
        matches!(self, Field::Depth | Field::Scalar | Field::Salinity)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMask(u32);

impl FieldMask {
    pub const EMPTY: FieldMask = FieldMask(0);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn with(self, field: Field) -> Self {
        Self(self.0 | field.bit())
    }

    pub fn contains(self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }

    /// Set fields in bit order.
    pub fn fields(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    /// `f32` values per node in one time record.
    pub fn components_per_node(self) -> usize {
        self.fields().map(Field::components).sum()
    }

    /// Offset (in values) of `field` within one node's block.
    pub fn offset_of(self, field: Field) -> Option<usize> {
        if !self.contains(field) {
            return None;
        }
        Some(
            self.fields()
                .take_while(|f| *f != field)
                .map(Field::components)
                .sum(),
        )
    }

    /// Bits that do not name a known field.
    pub fn unknown_bits(self) -> u32 {
        let known = Field::ALL.iter().fold(0, |acc, f| acc | f.bit());
        self.0 & !known
    }
}

impl FromIterator<Field> for FieldMask {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        iter.into_iter().fold(FieldMask::EMPTY, FieldMask::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fields_iterate_in_bit_order() {
        let mask: FieldMask = [Field::Scalar, Field::Position, Field::Velocity]
            .into_iter()
            .collect();
        let order: Vec<Field> = mask.fields().collect();
        assert_eq!(order, vec![Field::Position, Field::Velocity, Field::Scalar]);
        assert_eq!(mask.components_per_node(), 4);
        assert_eq!(mask.offset_of(Field::Scalar), Some(3));
        assert_eq!(mask.offset_of(Field::Depth), None);
    }

    proptest! {
        #[test]
        fn field_blocks_tile_the_node_record(bits in 0u32..512) {
            let mask = FieldMask::from_bits(bits);
            prop_assert_eq!(mask.unknown_bits(), 0);
            let mut next = 0;
            for field in mask.fields() {
                prop_assert_eq!(mask.offset_of(field), Some(next));
                next += field.components();
            }
            prop_assert_eq!(next, mask.components_per_node());
        }
    }

    #[test]
    fn unknown_bits_are_reported() {
        assert_eq!(FieldMask::from_bits(1 << 20 | 1).unknown_bits(), 1 << 20);
        assert_eq!(FieldMask::EMPTY.with(Field::Shear).unknown_bits(), 0);
    }
}
