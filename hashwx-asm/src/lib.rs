//! Instruction set and program model of the HashWX hash function.
//!
//! A HashWX function is defined by a list of [`NUM_PROGRAMS`] short
//! straight-line programs over a ten-register file. Each [`Program`] has a
//! fixed ten-slot shape: a multiplier anchor in slot 0, the branch-flag
//! producing [`Opcode::Rmcg`] in slot 4, one backward [`Opcode::Branch`] in
//! slot 7 and the [`Opcode::Halt`] terminator in slot 9. This crate holds the
//! data model only; program synthesis and execution live in `hashwx-vm`.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![deny(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::string_slice
)]

mod instruction;
mod opcode;
mod program;

pub use instruction::Instruction;
pub use opcode::{CombineOp, MulOp, Opcode, ShiftOp};
pub use program::{Program, ProgramList, StructureError};

/// Number of instruction slots in a program.
pub const PROGRAM_SIZE: usize = 10;

/// Number of programs executed (in order) by one sweep.
pub const NUM_PROGRAMS: usize = 32;

/// Size of the register file, in 64-bit words. Registers 0..=7 form the
/// general window; R8 and R9 are the fixed-residue scalars.
pub const REG_SIZE: usize = 10;

/// Size of the scratch memory window, in 64-bit words.
pub const MEM_SIZE: usize = 256;

/// Mask applied to a register value to form a byte offset into the memory
/// window (`MEM_SIZE * 8 - 8`).
pub const MEM_MASK: u64 = 2040;

/// Upper bound on taken branches per sweep; bit 5 of the branch counter
/// gates further back-edges once reached.
pub const BRANCH_LIMIT: u32 = 32;

/// Index of the multiplier scalar register R8 (always 3 mod 8).
pub const REG_R8: u8 = 8;

/// Index of the finalization scalar register R9 (always 5 mod 8).
pub const REG_R9: u8 = 9;

/// Program slot holding the mul-family multiplier anchor.
pub const SLOT_ANCHOR: usize = 0;

/// Program slot holding the RMCG instruction.
pub const SLOT_RMCG: usize = 4;

/// Program slot holding the backward branch.
pub const SLOT_BRANCH: usize = 7;

/// Program slot holding the terminator.
pub const SLOT_HALT: usize = 9;

/// Immediate constants available to mul-family instructions. These are the
/// only values the compiled pre-multiply templates encode.
pub const MUL_IMMS: [u8; 4] = [1, 5, 17, 65];
