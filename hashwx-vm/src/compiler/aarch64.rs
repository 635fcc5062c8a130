//! AArch64 emitter.
//!
//! Architectural register allocation of the emitted function:
//!
//! ```text
//! x0-x7    R0-R7
//! x8       register-file pointer
//! x9       taken-branch counter (counts up; bit 5 saturates the sweep)
//! x10-x12  constants 5, 17, 65 for the pre-multiply templates
//! x13      R8
//! x14      branch flag
//! x15      gather scratch
//! sp       stack / memory window
//! ```
//!
//! Mul-family immediates are restricted to `{1, 5, 17, 65}`: the add form
//! encodes them as imm12, the eor/orr forms encode 1 as a bitmask immediate
//! and take the rest from the pinned constant registers. The branch uses the
//! `tst` / `cinc` / `b.eq` idiom: the conditional increment consumes the
//! same flags as the branch, so a taken back-edge bumps the counter without
//! a data-dependent jump on the counter value.

use hashwx_asm::{CombineOp, MulOp, Opcode, Program, ProgramList, ShiftOp};

use super::CODE_SIZE;

const PROLOGUE: [u32; 10] = [
    0xf940200d, // ldr x13, [x0, #64]
    0xaa0003e8, // mov x8, x0
    0xa9431c06, // ldp x6, x7, [x0, #48]
    0xa9421404, // ldp x4, x5, [x0, #32]
    0xa9410c02, // ldp x2, x3, [x0, #16]
    0xa9400400, // ldp x0, x1, [x0, #0]
    0xd2800009, // mov x9, #0
    0xd28000aa, // mov x10, #5
    0xd280022b, // mov x11, #17
    0xd280082c, // mov x12, #65
];

const EPILOGUE: [u32; 6] = [
    0x912003ff, // add sp, sp, #2048
    0xa9000500, // stp x0, x1, [x8, #0]
    0xa9010d02, // stp x2, x3, [x8, #16]
    0xa9021504, // stp x4, x5, [x8, #32]
    0xa9031d06, // stp x6, x7, [x8, #48]
    0xd65f03c0, // ret
];

/// Spill R0-R7 into the fresh 64-byte slice of the stack window, highest
/// register at the lowest address.
const STORE_EIGHT: [u32; 4] = [
    0xa90303e1, // stp x1, x0, [sp, #48]
    0xa9020be3, // stp x3, x2, [sp, #32]
    0xa90113e5, // stp x5, x4, [sp, #16]
    0xa9001be7, // stp x7, x6, [sp, #0]
];

const SUB_SP_64: u32 = 0xd10103ff; // sub sp, sp, #64
const CLEAR_COUNTER: u32 = 0xd2800009; // mov x9, #0
const MERGE_FLAG: u32 = 0xaa0901ce; // orr x14, x14, x9
const TST_FLAG: u32 = 0xf27b01df; // tst x14, #32
const CINC_COUNTER: u32 = 0x9a891529; // cinc x9, x9, eq

/// Hardware register holding a logical register index.
fn hw(reg: u8) -> u32 {
    if reg == 8 {
        13
    } else {
        u32::from(reg)
    }
}

/// Pinned constant register for a mul-family immediate above 1.
fn imm_reg(imm: u8) -> u32 {
    match imm {
        5 => 10,
        17 => 11,
        _ => 12,
    }
}

struct Asm<'a> {
    code: &'a mut [u8],
    pos: usize,
}

impl Asm<'_> {
    fn isn(&mut self, word: u32) {
        self.code[self.pos..self.pos + 4].copy_from_slice(&word.to_le_bytes());
        self.pos += 4;
    }

    /// The `dst = dst op imm` half of a mul-family instruction.
    fn premul(&mut self, op: MulOp, dst: u8, imm: u8) {
        let dst = u32::from(dst);
        let word = match (op, imm) {
            (MulOp::Add, _) => 0x91000000 | u32::from(imm) << 10 | dst << 5 | dst,
            (MulOp::Xor, 1) => 0xd2400000 | dst << 5 | dst,
            (MulOp::Xor, _) => 0xca000000 | imm_reg(imm) << 16 | dst << 5 | dst,
            (MulOp::Or, 1) => 0xb2400000 | dst << 5 | dst,
            (MulOp::Or, _) => 0xaa000000 | imm_reg(imm) << 16 | dst << 5 | dst,
        };
        self.isn(word);
    }

    /// `mul dst, dst, src` with `src` in hardware numbering.
    fn mul(&mut self, dst: u8, src: u32) {
        let dst = u32::from(dst);
        self.isn(0x9b007c00 | src << 16 | dst << 5 | dst);
    }

    /// `ror/asr/lsr dst, dst, imm`.
    fn shift_imm(&mut self, op: ShiftOp, dst: u8, imm: u8) {
        let dst = u32::from(dst);
        let imm = u32::from(imm);
        let word = match op {
            ShiftOp::Rotate => 0x93c00000 | dst << 16 | imm << 10 | dst << 5 | dst,
            ShiftOp::Arithmetic => 0x9340fc00 | imm << 16 | dst << 5 | dst,
            ShiftOp::Logical => 0xd340fc00 | imm << 16 | dst << 5 | dst,
        };
        self.isn(word);
    }

    /// `eor/add/sub dst, dst, src` with `src` in hardware numbering.
    fn combine(&mut self, op: CombineOp, dst: u8, src: u32) {
        let dst = u32::from(dst);
        let base = match op {
            CombineOp::Xor => 0xca000000,
            CombineOp::Add => 0x8b000000,
            CombineOp::Sub => 0xcb000000,
        };
        self.isn(base | src << 16 | dst << 5 | dst);
    }

    /// `mov x14, dst` — expose the fresh RMCG result as the branch flag.
    fn capture_flag(&mut self, dst: u8) {
        self.isn(0xaa0003e0 | u32::from(dst) << 16 | 14);
    }

    /// `and x15, src, #2040; ldr x15, [sp, x15]` — gather the memory-sweep
    /// operand into the scratch register.
    fn gather(&mut self, src: u8) {
        self.isn(0x927d1c00 | hw(src) << 5 | 15);
        self.isn(0xf8606be0 | 15 << 16 | 15);
    }

    /// `b.eq target` (backward).
    fn beq(&mut self, target: usize) {
        let offset = (target as isize - self.pos as isize) as u32;
        self.isn(0x54000000 | (offset & 0x001f_fffc) << 3);
    }
}

fn translate_program(asm: &mut Asm<'_>, program: &Program, memory_sweep: bool) {
    if !memory_sweep {
        asm.isn(SUB_SP_64);
    }
    let entry = asm.pos;
    for isn in program.iter() {
        let (dst, src, imm) = (isn.dst(), isn.src(), isn.imm());
        match isn.opcode() {
            op if op.is_mul() => {
                let mul_op = op.mul_op().expect("mul family");
                if memory_sweep {
                    asm.gather(src);
                    asm.premul(mul_op, dst, imm);
                    asm.mul(dst, 15);
                } else {
                    asm.premul(mul_op, dst, imm);
                    asm.mul(dst, hw(src));
                }
            }
            Opcode::Rmcg => {
                asm.mul(dst, hw(src));
                asm.shift_imm(ShiftOp::Rotate, dst, imm);
                asm.capture_flag(dst);
            }
            op if op.is_arx() => {
                let (shift, combine) = op.arx_ops().expect("arx family");
                if memory_sweep {
                    asm.gather(src);
                    asm.shift_imm(shift, dst, imm);
                    asm.combine(combine, dst, 15);
                } else {
                    asm.shift_imm(shift, dst, imm);
                    asm.combine(combine, dst, hw(src));
                }
            }
            Opcode::Branch => {
                asm.isn(MERGE_FLAG);
                asm.isn(TST_FLAG);
                asm.isn(CINC_COUNTER);
                asm.beq(entry);
            }
            Opcode::Halt => {}
            _ => unreachable!("family predicates cover every opcode"),
        }
    }
    if !memory_sweep {
        for word in STORE_EIGHT {
            asm.isn(word);
        }
    }
}

/// Emit the function for `list` into `code`, returning the emitted length.
pub fn emit(list: &ProgramList, code: &mut [u8]) -> usize {
    let mut asm = Asm { code, pos: 0 };
    for word in PROLOGUE {
        asm.isn(word);
    }

    for program in list.programs() {
        translate_program(&mut asm, program, false);
    }

    asm.isn(CLEAR_COUNTER);

    for program in list.programs() {
        translate_program(&mut asm, program, true);
    }

    for word in EPILOGUE {
        asm.isn(word);
    }
    debug_assert!(asm.pos <= CODE_SIZE);
    asm.pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator;
    use crate::rng::SipHashKey;

    fn emitted() -> (Vec<u8>, usize) {
        let list = generator::generate(SipHashKey {
            k0: 0x0123456789abcdef,
            k1: 0xfedcba9876543210,
        });
        let mut code = vec![0u8; CODE_SIZE];
        let len = emit(&list, &mut code);
        (code, len)
    }

    #[test]
    fn function_is_framed_by_prologue_and_ret() {
        let (code, len) = emitted();
        assert_eq!(
            &code[..8],
            &[0x0d, 0x20, 0x40, 0xf9, 0xe8, 0x03, 0x00, 0xaa],
        );
        assert_eq!(&code[len - 4..len], &0xd65f03c0u32.to_le_bytes());
        assert!(len <= CODE_SIZE);
        assert_eq!(len % 4, 0);
    }

    #[test]
    fn branches_encode_backward_offsets() {
        let mut buf = vec![0u8; 128];
        let mut asm = Asm {
            code: &mut buf,
            pos: 100,
        };
        asm.beq(40);
        let word = u32::from_le_bytes(buf[100..104].try_into().unwrap());
        assert_eq!(word & 0xff00001f, 0x54000000);
        // imm19 field holds (40 - 100) / 4 in two's complement.
        let imm19 = (word >> 5) & 0x7ffff;
        assert_eq!(imm19, ((-60i32 / 4) as u32) & 0x7ffff);
    }

    #[test]
    fn premul_templates_cover_the_immediate_set() {
        let mut buf = vec![0u8; 64];
        let mut asm = Asm {
            code: &mut buf,
            pos: 0,
        };
        asm.premul(MulOp::Add, 3, 65);
        asm.premul(MulOp::Xor, 3, 1);
        asm.premul(MulOp::Or, 3, 17);
        let words: Vec<u32> = buf[..12]
            .chunks(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(words[0], 0x91010463); // add x3, x3, #65
        assert_eq!(words[1], 0xd2400063); // eor x3, x3, #1
        assert_eq!(words[2], 0xaa0b0063); // orr x3, x3, x11
    }
}
