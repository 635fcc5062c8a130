use core::fmt;

use crate::{
    Instruction, Opcode, MUL_IMMS, NUM_PROGRAMS, PROGRAM_SIZE, REG_R8, SLOT_ANCHOR, SLOT_BRANCH,
    SLOT_HALT, SLOT_RMCG,
};

/// A ten-slot straight-line program with one back-branch and one terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    code: [Instruction; PROGRAM_SIZE],
}

/// The fixed-length batch of programs making up one hash function. A sweep
/// executes all of them in order; every `exec` performs two sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramList {
    programs: [Program; NUM_PROGRAMS],
}

/// Violation of the fixed program shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureError {
    /// Slot 0 must be a mul-family instruction sourcing R8.
    BadAnchor,
    /// Slot 4 must be the RMCG sourcing R8.
    BadRmcg,
    /// Slot 7 must be the only branch; slot 9 the only halt.
    BadControlFlow,
    /// A register index escaped the general window, or `dst == src`.
    BadRegister {
        /// Offending slot.
        slot: usize,
    },
    /// An immediate outside the set its opcode admits.
    BadImmediate {
        /// Offending slot.
        slot: usize,
    },
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadAnchor => write!(f, "slot 0 is not a mul-family anchor on R8"),
            Self::BadRmcg => write!(f, "slot 4 is not an RMCG on R8"),
            Self::BadControlFlow => write!(f, "branch/halt placement is malformed"),
            Self::BadRegister { slot } => write!(f, "invalid register operand in slot {slot}"),
            Self::BadImmediate { slot } => write!(f, "invalid immediate in slot {slot}"),
        }
    }
}

impl Program {
    /// Construct a program from its ten slots.
    pub const fn new(code: [Instruction; PROGRAM_SIZE]) -> Self {
        Self { code }
    }

    /// The instruction in `slot`.
    pub fn instruction(&self, slot: usize) -> &Instruction {
        &self.code[slot]
    }

    /// Iterate the slots in order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.code.iter()
    }

    /// Verify the fixed shape every generated program must have.
    pub fn check_structure(&self) -> Result<(), StructureError> {
        let anchor = &self.code[SLOT_ANCHOR];
        if !anchor.opcode().is_mul() || anchor.src() != REG_R8 {
            return Err(StructureError::BadAnchor);
        }
        let rmcg = &self.code[SLOT_RMCG];
        if rmcg.opcode() != Opcode::Rmcg || rmcg.src() != REG_R8 {
            return Err(StructureError::BadRmcg);
        }

        let branches = self.iter().filter(|i| i.opcode() == Opcode::Branch).count();
        let halts = self.iter().filter(|i| i.opcode() == Opcode::Halt).count();
        if branches != 1
            || halts != 1
            || self.code[SLOT_BRANCH].opcode() != Opcode::Branch
            || self.code[SLOT_HALT].opcode() != Opcode::Halt
        {
            return Err(StructureError::BadControlFlow);
        }

        for (slot, isn) in self.iter().enumerate() {
            let op = isn.opcode();
            if !op.has_operand() && op != Opcode::Rmcg {
                continue;
            }
            if isn.dst() > 7 {
                return Err(StructureError::BadRegister { slot });
            }
            if isn.src() != REG_R8 && (isn.src() > 7 || isn.src() == isn.dst()) {
                return Err(StructureError::BadRegister { slot });
            }
            let imm_ok = if op.is_mul() {
                MUL_IMMS.contains(&isn.imm())
            } else {
                (1..=63).contains(&isn.imm())
            };
            if !imm_ok {
                return Err(StructureError::BadImmediate { slot });
            }
        }
        Ok(())
    }
}

impl ProgramList {
    /// Construct a list from its programs.
    pub const fn new(programs: [Program; NUM_PROGRAMS]) -> Self {
        Self { programs }
    }

    /// The programs, in sweep order.
    pub fn programs(&self) -> &[Program; NUM_PROGRAMS] {
        &self.programs
    }

    /// Verify every program in the list.
    pub fn check_structure(&self) -> Result<(), StructureError> {
        self.programs.iter().try_for_each(Program::check_structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn well_formed() -> Program {
        let mut code = [Instruction::halt(); PROGRAM_SIZE];
        code[0] = Instruction::new(Opcode::MulXor, 2, REG_R8, 17);
        code[1] = Instruction::new(Opcode::XorRor, 0, 4, 11);
        code[2] = Instruction::new(Opcode::SubLsr, 5, 2, 63);
        code[3] = Instruction::new(Opcode::AddAsr, 1, 6, 1);
        code[4] = Instruction::new(Opcode::Rmcg, 3, REG_R8, 31);
        code[5] = Instruction::new(Opcode::MulAdd, 6, 0, 65);
        code[6] = Instruction::new(Opcode::AddRor, 7, 3, 9);
        code[7] = Instruction::branch();
        code[8] = Instruction::new(Opcode::XorLsr, 4, 7, 22);
        code[9] = Instruction::halt();
        Program::new(code)
    }

    #[test]
    fn accepts_the_canonical_shape() {
        assert_eq!(well_formed().check_structure(), Ok(()));
    }

    #[test]
    fn rejects_missing_anchor() {
        let mut p = well_formed();
        p.code[0] = Instruction::new(Opcode::XorRor, 2, 4, 17);
        assert_eq!(p.check_structure(), Err(StructureError::BadAnchor));
    }

    #[test]
    fn rejects_anchor_without_r8() {
        let mut p = well_formed();
        p.code[0] = Instruction::new(Opcode::MulOr, 2, 4, 17);
        assert_eq!(p.check_structure(), Err(StructureError::BadAnchor));
    }

    #[test]
    fn rejects_duplicate_branch() {
        let mut p = well_formed();
        p.code[8] = Instruction::branch();
        assert_eq!(p.check_structure(), Err(StructureError::BadControlFlow));
    }

    #[test]
    fn rejects_self_referential_operands() {
        let mut p = well_formed();
        p.code[2] = Instruction::new(Opcode::SubLsr, 5, 5, 63);
        assert_eq!(p.check_structure(), Err(StructureError::BadRegister { slot: 2 }));
    }

    #[test]
    fn rejects_mul_immediate_outside_template_set() {
        let mut p = well_formed();
        p.code[5] = Instruction::new(Opcode::MulAdd, 6, 0, 64);
        assert_eq!(p.check_structure(), Err(StructureError::BadImmediate { slot: 5 }));
    }

    #[test]
    fn rejects_zero_shift_count() {
        let mut p = well_formed();
        p.code[1] = Instruction::new(Opcode::XorRor, 0, 4, 0);
        assert_eq!(p.check_structure(), Err(StructureError::BadImmediate { slot: 1 }));
    }
}
