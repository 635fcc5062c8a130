//! Portable reference execution of a program list.
//!
//! Execution makes two sweeps over the 32 programs. The register sweep runs
//! every program against the ten-word register file and, after each program,
//! spills the general window into the memory window from the top down. The
//! memory sweep runs the same programs again with every mul/shift-combine
//! source operand replaced by a masked gather from that window. The branch
//! counter threads through all programs of a sweep and is reset in between.
//!
//! This is the surface every compiled backend must match bit for bit.

use hashwx_asm::{
    CombineOp, MulOp, Opcode, Program, ProgramList, ShiftOp, BRANCH_LIMIT, MEM_SIZE, REG_SIZE,
};

/// Execute `list` against the register file `r`, mutating it in place.
pub fn execute(list: &ProgramList, r: &mut [u64; REG_SIZE]) {
    let mut mem = [0u64; MEM_SIZE];
    let mut branch_counter = BRANCH_LIMIT;

    for (i, program) in list.programs().iter().enumerate() {
        branch_counter = execute_program::<RegisterSweep>(program, r, branch_counter, &mut mem);
        for j in 0..8 {
            mem[MEM_SIZE - 1 - 8 * i - j] = r[j];
        }
    }

    branch_counter = BRANCH_LIMIT;

    for program in list.programs() {
        branch_counter = execute_program::<MemorySweep>(program, r, branch_counter, &mut mem);
    }
}

/// Source-operand addressing mode of a sweep.
trait Sweep {
    fn operand(r: &[u64; REG_SIZE], mem: &[u64; MEM_SIZE], src: u8) -> u64;
}

struct RegisterSweep;

impl Sweep for RegisterSweep {
    #[inline(always)]
    fn operand(r: &[u64; REG_SIZE], _mem: &[u64; MEM_SIZE], src: u8) -> u64 {
        r[src as usize]
    }
}

struct MemorySweep;

impl Sweep for MemorySweep {
    #[inline(always)]
    fn operand(r: &[u64; REG_SIZE], mem: &[u64; MEM_SIZE], src: u8) -> u64 {
        mem[(r[src as usize] as usize / 8) % MEM_SIZE]
    }
}

fn execute_program<S: Sweep>(
    program: &Program,
    r: &mut [u64; REG_SIZE],
    mut branch_counter: u32,
    mem: &mut [u64; MEM_SIZE],
) -> u32 {
    let mut branch_flag = 0u32;
    let mut ic = 0;
    loop {
        let isn = program.instruction(ic);
        ic += 1;
        let dst = isn.dst() as usize;
        match isn.opcode() {
            op if op.is_mul() => {
                let operand = S::operand(r, mem, isn.src());
                let mixed = match op.mul_op().expect("mul family") {
                    MulOp::Or => r[dst] | u64::from(isn.imm()),
                    MulOp::Xor => r[dst] ^ u64::from(isn.imm()),
                    MulOp::Add => r[dst].wrapping_add(u64::from(isn.imm())),
                };
                r[dst] = mixed.wrapping_mul(operand);
            }
            Opcode::Rmcg => {
                // The multiplier is always R8, in both sweeps.
                let mixed = r[dst]
                    .wrapping_mul(r[isn.src() as usize])
                    .rotate_right(u32::from(isn.imm()));
                r[dst] = mixed;
                branch_flag = mixed as u32;
            }
            op if op.is_arx() => {
                let (shift, combine) = op.arx_ops().expect("arx family");
                let shifted = match shift {
                    ShiftOp::Rotate => r[dst].rotate_right(u32::from(isn.imm())),
                    ShiftOp::Arithmetic => ((r[dst] as i64) >> isn.imm()) as u64,
                    ShiftOp::Logical => r[dst] >> isn.imm(),
                };
                let operand = S::operand(r, mem, isn.src());
                r[dst] = match combine {
                    CombineOp::Xor => shifted ^ operand,
                    CombineOp::Add => shifted.wrapping_add(operand),
                    CombineOp::Sub => shifted.wrapping_sub(operand),
                };
            }
            Opcode::Branch => {
                if branch_counter != 0 && (branch_flag & 32) == 0 {
                    branch_counter -= 1;
                    ic = 0;
                }
            }
            Opcode::Halt => return branch_counter,
            _ => unreachable!("family predicates cover every opcode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashwx_asm::{Instruction, PROGRAM_SIZE, REG_R8};

    /// A minimal loop whose RMCG always produces a zero flag, so the branch
    /// is taken until the counter drains. The interpreter itself places no
    /// constraints on slot positions, which keeps these fixtures small.
    fn always_branching() -> Program {
        let mut code = [Instruction::halt(); PROGRAM_SIZE];
        // dst 0 holds 0 throughout: 0 * r8 = 0, rotated = 0.
        code[0] = Instruction::new(Opcode::Rmcg, 0, REG_R8, 7);
        code[1] = Instruction::branch();
        Program::new(code)
    }

    #[test]
    fn branch_drains_the_counter_and_terminates() {
        let mut r = [0u64; REG_SIZE];
        r[1] = 0x0123_4567_89ab_cdef;
        r[REG_R8 as usize] = 3;
        let mut mem = [0u64; MEM_SIZE];

        let left = execute_program::<RegisterSweep>(&always_branching(), &mut r, 32, &mut mem);
        assert_eq!(left, 0, "all 32 branches must be consumed");
    }

    #[test]
    fn counter_threads_across_programs() {
        let mut r = [0u64; REG_SIZE];
        r[REG_R8 as usize] = 3;
        let mut mem = [0u64; MEM_SIZE];

        let after_first =
            execute_program::<RegisterSweep>(&always_branching(), &mut r, 32, &mut mem);
        assert_eq!(after_first, 0);
        // A later program in the same sweep starts with the leftover count
        // and cannot branch any further.
        let after_second =
            execute_program::<RegisterSweep>(&always_branching(), &mut r, after_first, &mut mem);
        assert_eq!(after_second, 0);
    }

    #[test]
    fn flagged_branch_falls_through() {
        let mut code = [Instruction::halt(); PROGRAM_SIZE];
        code[0] = Instruction::new(Opcode::Rmcg, 0, REG_R8, 64 - 5);
        code[1] = Instruction::branch();
        let program = Program::new(code);

        let mut r = [0u64; REG_SIZE];
        // 1 * 1 rotated right by 59 sets bit 5 of the low word.
        r[0] = 1;
        r[REG_R8 as usize] = 1;
        let mut mem = [0u64; MEM_SIZE];
        let left = execute_program::<RegisterSweep>(&program, &mut r, 32, &mut mem);
        assert_eq!(left, 32, "set flag bit must suppress the branch");
        assert_eq!(r[0], 32);
    }

    #[test]
    fn memory_sweep_gathers_through_the_mask() {
        let mut code = [Instruction::halt(); PROGRAM_SIZE];
        code[0] = Instruction::new(Opcode::XorLsr, 2, 1, 1);
        let program = Program::new(code);

        let mut r = [0u64; REG_SIZE];
        r[1] = 8 * 200; // gathers mem[200]
        r[2] = 0;
        let mut mem = [0u64; MEM_SIZE];
        mem[200] = 0xdead_beef;
        execute_program::<MemorySweep>(&program, &mut r, 32, &mut mem);
        assert_eq!(r[2], 0xdead_beef);
    }
}
