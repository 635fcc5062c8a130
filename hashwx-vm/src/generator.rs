//! Deterministic synthesis of a program list from a SipHash key.
//!
//! One 64-bit word of the keyed stream is consumed per compute instruction,
//! cut into fields from the least significant bits upward. The fixed slots
//! (anchor, RMCG, branch, halt) and the register rules below guarantee the
//! structural shape every backend relies on:
//!
//! - `dst` never repeats the previous compute slot's destination,
//! - `src != dst` whenever both address the general window,
//! - mul-family immediates come from the template set `{1, 5, 17, 65}`,
//! - shift and rotation counts stay in `1..=63`.

use hashwx_asm::{
    Instruction, Opcode, Program, ProgramList, MUL_IMMS, NUM_PROGRAMS, PROGRAM_SIZE, REG_R8,
    SLOT_ANCHOR, SLOT_BRANCH, SLOT_HALT, SLOT_RMCG,
};

use crate::rng::{SipHashKey, SipRng};

const MUL_OPS: [Opcode; 3] = [Opcode::MulOr, Opcode::MulXor, Opcode::MulAdd];

const FREE_OPS: [Opcode; 12] = [
    Opcode::MulOr,
    Opcode::MulXor,
    Opcode::MulAdd,
    Opcode::XorRor,
    Opcode::AddRor,
    Opcode::SubRor,
    Opcode::XorAsr,
    Opcode::AddAsr,
    Opcode::SubAsr,
    Opcode::XorLsr,
    Opcode::AddLsr,
    Opcode::SubLsr,
];

/// Generate the 32-program list for `key`.
pub fn generate(key: SipHashKey) -> ProgramList {
    let mut rng = SipRng::new(key, 0);
    let programs = core::array::from_fn(|_| generate_program(&mut rng));
    let list = ProgramList::new(programs);
    debug_assert!(list.check_structure().is_ok());
    tracing::debug!(programs = NUM_PROGRAMS, "generated program list");
    list
}

fn generate_program(rng: &mut SipRng) -> Program {
    let mut code = [Instruction::halt(); PROGRAM_SIZE];

    let w = rng.next_u64();
    let opcode = MUL_OPS[(w % 3) as usize];
    let dst = cut3(w, 2);
    let imm = MUL_IMMS[((w >> 5) & 3) as usize];
    code[SLOT_ANCHOR] = Instruction::new(opcode, dst, REG_R8, imm);
    let mut last_dst = dst;

    for slot in [1, 2, 3] {
        code[slot] = generate_free(rng, &mut last_dst);
    }

    let w = rng.next_u64();
    let dst = pick_dst(cut3(w, 0), last_dst);
    let imm = shift_count(w >> 3);
    code[SLOT_RMCG] = Instruction::new(Opcode::Rmcg, dst, REG_R8, imm);
    last_dst = dst;

    for slot in [5, 6, 8] {
        code[slot] = generate_free(rng, &mut last_dst);
    }

    code[SLOT_BRANCH] = Instruction::branch();
    code[SLOT_HALT] = Instruction::halt();
    Program::new(code)
}

fn generate_free(rng: &mut SipRng, last_dst: &mut u8) -> Instruction {
    let w = rng.next_u64();
    let opcode = FREE_OPS[(w % 12) as usize];
    let dst = pick_dst(cut3(w, 4), *last_dst);
    let mut src = cut3(w, 7);
    if src == dst {
        src = (src + 1) & 7;
    }
    let imm = if opcode.is_mul() {
        MUL_IMMS[((w >> 10) & 3) as usize]
    } else {
        shift_count(w >> 10)
    };
    *last_dst = dst;
    Instruction::new(opcode, dst, src, imm)
}

/// Three register bits at `shift`.
fn cut3(w: u64, shift: u32) -> u8 {
    ((w >> shift) & 7) as u8
}

/// Steer the drawn destination away from the previous writer.
fn pick_dst(drawn: u8, last_dst: u8) -> u8 {
    if drawn == last_dst {
        (drawn + 1) & 7
    } else {
        drawn
    }
}

/// A rotation or shift count in `1..=63`.
fn shift_count(w: u64) -> u8 {
    (1 + (w % 63)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SipHashKey {
        SipHashKey {
            k0: 0x6465657320747365,
            k1: 0x7877687361682072,
        }
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(generate(test_key()), generate(test_key()));
    }

    #[test]
    fn generated_lists_are_well_formed() {
        for salt in 0..64u64 {
            let key = SipHashKey {
                k0: test_key().k0 ^ salt,
                k1: test_key().k1.rotate_left(salt as u32),
            };
            generate(key)
                .check_structure()
                .expect("generator output must satisfy the program shape");
        }
    }

    #[test]
    fn consecutive_slots_write_different_registers() {
        let list = generate(test_key());
        for program in list.programs() {
            let mut prev: Option<u8> = None;
            for isn in program.iter() {
                if !isn.opcode().has_operand() && isn.opcode() != Opcode::Rmcg {
                    continue;
                }
                if let Some(prev) = prev {
                    assert_ne!(isn.dst(), prev, "back-to-back writes to one register");
                }
                prev = Some(isn.dst());
            }
        }
    }

    #[test]
    fn different_keys_give_different_programs() {
        let other = SipHashKey {
            k0: test_key().k0 ^ 1,
            k1: test_key().k1,
        };
        assert_ne!(generate(test_key()), generate(other));
    }
}
