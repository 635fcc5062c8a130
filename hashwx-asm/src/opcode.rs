use strum::{EnumCount, FromRepr};

/// Operation of a program instruction.
///
/// The discriminants are load-bearing: the compiled backends index their
/// template tables by opcode value, so the mul family occupies 0..=2, the
/// nine shift-combine operations 4..=12 (grouped by shift kind), with
/// [`Opcode::Rmcg`] between them at 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    /// | Operation | `dst = (dst \| imm) * src` |
    /// | Immediate | one of `{1, 5, 17, 65}`    |
    MulOr = 0x00,
    /// | Operation | `dst = (dst ^ imm) * src` |
    /// | Immediate | one of `{1, 5, 17, 65}`   |
    MulXor = 0x01,
    /// | Operation | `dst = (dst + imm) * src` |
    /// | Immediate | one of `{1, 5, 17, 65}`   |
    MulAdd = 0x02,
    /// Rotated multiplicative congruential generator step.
    ///
    /// | Operation | `dst = rotr64(dst * r8, imm)` |
    /// | Immediate | rotation count `1..=63`       |
    ///
    /// The low 32 bits of the result become the branch flag; bit 5 gates
    /// the backward branch of the same program.
    Rmcg = 0x03,
    /// | Operation | `dst = rotr64(dst, imm) ^ src` |
    XorRor = 0x04,
    /// | Operation | `dst = rotr64(dst, imm) + src` |
    AddRor = 0x05,
    /// | Operation | `dst = rotr64(dst, imm) - src` |
    SubRor = 0x06,
    /// | Operation | `dst = (dst as i64 >> imm) ^ src` |
    XorAsr = 0x07,
    /// | Operation | `dst = (dst as i64 >> imm) + src` |
    AddAsr = 0x08,
    /// | Operation | `dst = (dst as i64 >> imm) - src` |
    SubAsr = 0x09,
    /// | Operation | `dst = (dst >> imm) ^ src` |
    XorLsr = 0x0a,
    /// | Operation | `dst = (dst >> imm) + src` |
    AddLsr = 0x0b,
    /// | Operation | `dst = (dst >> imm) - src` |
    SubLsr = 0x0c,
    /// Backward branch to slot 0 of the same program, taken while the
    /// branch counter has headroom and bit 5 of the branch flag is clear.
    Branch = 0x0d,
    /// Terminator; every program ends with exactly one.
    Halt = 0x0e,
}

/// Combining step of a mul-family instruction, applied to `dst` and the
/// immediate before the multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulOp {
    /// `dst | imm`
    Or,
    /// `dst ^ imm`
    Xor,
    /// `dst + imm`
    Add,
}

/// Shift applied to `dst` by a shift-combine instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    /// 64-bit rotate right.
    Rotate,
    /// Arithmetic (sign-propagating) shift right.
    Arithmetic,
    /// Logical shift right.
    Logical,
}

/// Combining step of a shift-combine instruction, applied to the shifted
/// `dst` and the source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    /// `shifted ^ operand`
    Xor,
    /// `shifted + operand`
    Add,
    /// `shifted - operand`
    Sub,
}

impl Opcode {
    /// Whether this is one of the three mul-family operations.
    pub const fn is_mul(&self) -> bool {
        matches!(self, Self::MulOr | Self::MulXor | Self::MulAdd)
    }

    /// Whether this is one of the nine shift-combine operations.
    pub const fn is_arx(&self) -> bool {
        (*self as u8) >= Self::XorRor as u8 && (*self as u8) <= Self::SubLsr as u8
    }

    /// Whether this opcode reads its source operand from the memory window
    /// during the memory sweep (everything except RMCG and control flow).
    pub const fn has_operand(&self) -> bool {
        self.is_mul() || self.is_arx()
    }

    /// The pre-multiply combine of a mul-family opcode.
    pub const fn mul_op(&self) -> Option<MulOp> {
        match self {
            Self::MulOr => Some(MulOp::Or),
            Self::MulXor => Some(MulOp::Xor),
            Self::MulAdd => Some(MulOp::Add),
            _ => None,
        }
    }

    /// The shift and combine of a shift-combine opcode.
    pub const fn arx_ops(&self) -> Option<(ShiftOp, CombineOp)> {
        let shift = match self {
            Self::XorRor | Self::AddRor | Self::SubRor => ShiftOp::Rotate,
            Self::XorAsr | Self::AddAsr | Self::SubAsr => ShiftOp::Arithmetic,
            Self::XorLsr | Self::AddLsr | Self::SubLsr => ShiftOp::Logical,
            _ => return None,
        };
        let combine = match self {
            Self::XorRor | Self::XorAsr | Self::XorLsr => CombineOp::Xor,
            Self::AddRor | Self::AddAsr | Self::AddLsr => CombineOp::Add,
            _ => CombineOp::Sub,
        };
        Some((shift, combine))
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn families_partition_the_compute_set() {
        for repr in Opcode::MulOr as u8..=Opcode::Halt as u8 {
            let op = Opcode::from_repr(repr).expect("discriminants are dense");
            match op {
                Opcode::Rmcg | Opcode::Branch | Opcode::Halt => {
                    assert!(!op.is_mul() && !op.is_arx());
                }
                _ => assert!(op.is_mul() ^ op.is_arx()),
            }
        }
    }

    #[test]
    fn arx_grouping_matches_discriminant_layout() {
        // The backends derive shift kind as (op - 4) / 3 and combine as
        // (op - 4) % 3; the accessors must agree.
        for repr in Opcode::XorRor as u8..=Opcode::SubLsr as u8 {
            let op = Opcode::from_repr(repr).unwrap();
            let (shift, combine) = op.arx_ops().unwrap();
            let base = repr - Opcode::XorRor as u8;
            let expect_shift = [ShiftOp::Rotate, ShiftOp::Arithmetic, ShiftOp::Logical];
            let expect_combine = [CombineOp::Xor, CombineOp::Add, CombineOp::Sub];
            assert_eq!(shift, expect_shift[(base / 3) as usize]);
            assert_eq!(combine, expect_combine[(base % 3) as usize]);
        }
    }
}
