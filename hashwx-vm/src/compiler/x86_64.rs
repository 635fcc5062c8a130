//! x86-64 emitter.
//!
//! Architectural register allocation of the emitted function:
//!
//! ```text
//! rax     branch flag, scratch
//! rcx     register-file pointer
//! rdx     gather-address scratch
//! rbx     R8
//! rbp     gather mask (2040)
//! rsp     stack / memory window
//! rsi     taken-branch counter (counts up; bit 5 saturates the sweep)
//! rdi     counter + 1 companion
//! r8-r15  R0-R7
//! ```
//!
//! The branch protocol avoids a data-dependent jump on the counter itself:
//! `branch` ORs the flag with the counter and tests bit 5, so a drained
//! counter suppresses the back-edge the same way a set flag bit does. The
//! two-byte `test edi, edi` at each program entry re-arms the flags for the
//! fall-in path; a taken branch jumps past it, straight onto the
//! `cmovz esi, edi` that absorbs the pre-incremented companion.

use hashwx_asm::{CombineOp, MulOp, Opcode, Program, ProgramList, ShiftOp};

use super::CODE_SIZE;

/// SysV entry: move the argument into the pinned pointer register, save the
/// callee-saved registers, load the register file, seed the counter pair.
const PROLOGUE: [u8; 58] = [
    0x48, 0x89, 0xf9, // mov rcx, rdi
    0x53, // push rbx
    0x55, // push rbp
    0x41, 0x54, // push r12
    0x41, 0x55, // push r13
    0x41, 0x56, // push r14
    0x41, 0x57, // push r15
    0x4c, 0x8b, 0x01, // mov r8, qword ptr [rcx]
    0x4c, 0x8b, 0x49, 0x08, // mov r9, qword ptr [rcx+8]
    0x4c, 0x8b, 0x51, 0x10, // mov r10, qword ptr [rcx+16]
    0x4c, 0x8b, 0x59, 0x18, // mov r11, qword ptr [rcx+24]
    0x4c, 0x8b, 0x61, 0x20, // mov r12, qword ptr [rcx+32]
    0x4c, 0x8b, 0x69, 0x28, // mov r13, qword ptr [rcx+40]
    0x4c, 0x8b, 0x71, 0x30, // mov r14, qword ptr [rcx+48]
    0x4c, 0x8b, 0x79, 0x38, // mov r15, qword ptr [rcx+56]
    0x48, 0x8b, 0x59, 0x40, // mov rbx, qword ptr [rcx+64]
    0xbd, 0xf8, 0x07, 0x00, 0x00, // mov ebp, 2040
    0x31, 0xf6, // xor esi, esi
    0x8d, 0x7e, 0x01, // lea edi, [rsi+1]
];

/// Pop the stack window, store the register file, restore and return.
const EPILOGUE: [u8; 49] = [
    0x48, 0x81, 0xc4, 0x00, 0x08, 0x00, 0x00, // add rsp, 2048
    0x4c, 0x89, 0x01, // mov qword ptr [rcx], r8
    0x4c, 0x89, 0x49, 0x08, // mov qword ptr [rcx+8], r9
    0x4c, 0x89, 0x51, 0x10, // mov qword ptr [rcx+16], r10
    0x4c, 0x89, 0x59, 0x18, // mov qword ptr [rcx+24], r11
    0x4c, 0x89, 0x61, 0x20, // mov qword ptr [rcx+32], r12
    0x4c, 0x89, 0x69, 0x28, // mov qword ptr [rcx+40], r13
    0x4c, 0x89, 0x71, 0x30, // mov qword ptr [rcx+48], r14
    0x4c, 0x89, 0x79, 0x38, // mov qword ptr [rcx+56], r15
    0x41, 0x5f, // pop r15
    0x41, 0x5e, // pop r14
    0x41, 0x5d, // pop r13
    0x41, 0x5c, // pop r12
    0x5d, // pop rbp
    0x5b, // pop rbx
    0xc3, // ret
];

/// Program entry landing pad; a taken branch jumps to its third byte.
const ENTRY: [u8; 5] = [
    0x85, 0xff, // test edi, edi
    0x0f, 0x44, 0xf7, // cmovz esi, edi
];

/// Flag/counter merge and companion refresh ahead of the conditional jump.
const BRANCH_TAIL: [u8; 7] = [
    0x09, 0xf0, // or eax, esi
    0x8d, 0x7e, 0x01, // lea edi, [rsi+1]
    0xa8, 0x20, // test al, 32
];

/// Spill R0-R7 into the next 64 bytes of the stack window.
const STORE_EIGHT: [u8; 16] = [
    0x41, 0x50, 0x41, 0x51, 0x41, 0x52, 0x41, 0x53, // push r8-r11
    0x41, 0x54, 0x41, 0x55, 0x41, 0x56, 0x41, 0x57, // push r12-r15
];

const CLEAR_COUNTER: [u8; 2] = [0x31, 0xf6]; // xor esi, esi

const ADDRESS_MASK: [u8; 2] = [0x21, 0xea]; // and edx, ebp

struct Asm<'a> {
    code: &'a mut [u8],
    pos: usize,
}

impl Asm<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.code[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// `or/xor/add dst, imm8` (group-1 immediate form on R0-R7).
    fn alu_imm(&mut self, op: MulOp, dst: u8, imm: u8) {
        let modrm = match op {
            MulOp::Or => 0xc8,
            MulOp::Xor => 0xf0,
            MulOp::Add => 0xc0,
        };
        self.put(&[0x49, 0x83, modrm | dst, imm]);
    }

    /// `ror/sar/shr dst, imm8`.
    fn shift_imm(&mut self, op: ShiftOp, dst: u8, imm: u8) {
        let modrm = match op {
            ShiftOp::Rotate => 0xc8,
            ShiftOp::Arithmetic => 0xf8,
            ShiftOp::Logical => 0xe8,
        };
        self.put(&[0x49, 0xc1, modrm | dst, imm]);
    }

    /// `imul dst, src`; logical source 8 lives in rbx.
    fn imul_reg(&mut self, dst: u8, src: u8) {
        if src == 8 {
            self.put(&[0x4c, 0x0f, 0xaf, 0xc3 | dst << 3]);
        } else {
            self.put(&[0x4d, 0x0f, 0xaf, 0xc0 | dst << 3 | src]);
        }
    }

    /// `imul dst, qword ptr [rsp+rdx]`.
    fn imul_mem(&mut self, dst: u8) {
        self.put(&[0x4c, 0x0f, 0xaf, 0x04 | dst << 3, 0x14]);
    }

    /// `mov rdx, src`; logical source 8 lives in rbx.
    fn load_address(&mut self, src: u8) {
        if src == 8 {
            self.put(&[0x48, 0x89, 0xda]);
        } else {
            self.put(&[0x4c, 0x89, 0xc2 | src << 3]);
        }
    }

    /// `xor/add/sub dst, src` (register form).
    fn combine_reg(&mut self, op: CombineOp, dst: u8, src: u8) {
        let opcode = match op {
            CombineOp::Xor => 0x31,
            CombineOp::Add => 0x01,
            CombineOp::Sub => 0x29,
        };
        self.put(&[0x4d, opcode, 0xc0 | src << 3 | dst]);
    }

    /// `xor/add/sub dst, qword ptr [rsp+rdx]`.
    fn combine_mem(&mut self, op: CombineOp, dst: u8) {
        let opcode = match op {
            CombineOp::Xor => 0x33,
            CombineOp::Add => 0x03,
            CombineOp::Sub => 0x2b,
        };
        self.put(&[0x4c, opcode, 0x04 | dst << 3, 0x14]);
    }

    /// `mov rax, dst` — expose the fresh RMCG result as the branch flag.
    fn capture_flag(&mut self, dst: u8) {
        self.put(&[0x4c, 0x89, 0xc0 | dst << 3]);
    }

    /// `jz dest`, choosing the two-byte short form when in range.
    fn jz(&mut self, dest: usize) {
        let short = dest as isize - (self.pos as isize + 2);
        if i8::try_from(short).is_ok() {
            self.put(&[0x74, short as u8]);
        } else {
            let long = (dest as isize - (self.pos as isize + 6)) as i32;
            self.put(&[0x0f, 0x84]);
            self.put(&long.to_le_bytes());
        }
    }
}

fn translate_program(asm: &mut Asm<'_>, program: &Program, memory_sweep: bool) {
    let entry = asm.pos;
    asm.put(&ENTRY);
    for isn in program.iter() {
        let (dst, src, imm) = (isn.dst(), isn.src(), isn.imm());
        match isn.opcode() {
            op if op.is_mul() => {
                let mul_op = op.mul_op().expect("mul family");
                if memory_sweep {
                    asm.load_address(src);
                    asm.alu_imm(mul_op, dst, imm);
                    asm.put(&ADDRESS_MASK);
                    asm.imul_mem(dst);
                } else {
                    asm.alu_imm(mul_op, dst, imm);
                    asm.imul_reg(dst, src);
                }
            }
            Opcode::Rmcg => {
                asm.imul_reg(dst, src);
                asm.shift_imm(ShiftOp::Rotate, dst, imm);
                asm.capture_flag(dst);
            }
            op if op.is_arx() => {
                let (shift, combine) = op.arx_ops().expect("arx family");
                if memory_sweep {
                    asm.load_address(src);
                    asm.shift_imm(shift, dst, imm);
                    asm.put(&ADDRESS_MASK);
                    asm.combine_mem(combine, dst);
                } else {
                    asm.shift_imm(shift, dst, imm);
                    asm.combine_reg(combine, dst, src);
                }
            }
            Opcode::Branch => {
                asm.put(&BRANCH_TAIL);
                // Land on the cmovz, past the flag re-arm.
                asm.jz(entry + 2);
            }
            Opcode::Halt => {}
            _ => unreachable!("family predicates cover every opcode"),
        }
    }
}

/// Emit the function for `list` into `code`, returning the emitted length.
pub fn emit(list: &ProgramList, code: &mut [u8]) -> usize {
    let mut asm = Asm { code, pos: 0 };
    asm.put(&PROLOGUE);

    for program in list.programs() {
        translate_program(&mut asm, program, false);
        asm.put(&STORE_EIGHT);
    }

    asm.put(&CLEAR_COUNTER);

    for program in list.programs() {
        translate_program(&mut asm, program, true);
    }

    asm.put(&EPILOGUE);
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
        assert!(code.starts_with(&PROLOGUE));
        assert_eq!(code[len - 1], 0xc3);
        assert!(len <= CODE_SIZE);
    }

    #[test]
    fn emission_is_deterministic() {
        assert_eq!(emitted(), emitted());
    }

    #[test]
    fn short_jumps_resolve_backwards() {
        let mut buf = vec![0u8; 64];
        let mut asm = Asm {
            code: &mut buf,
            pos: 40,
        };
        asm.jz(10 + 2);
        // dest - (pos + 2) = 12 - 42
        assert_eq!(&buf[40..42], &[0x74, (-30i8) as u8]);
    }

    #[test]
    fn long_jumps_fall_back_to_rel32() {
        let mut buf = vec![0u8; 600];
        let mut asm = Asm {
            code: &mut buf,
            pos: 500,
        };
        asm.jz(2);
        assert_eq!(&buf[500..502], &[0x0f, 0x84]);
        assert_eq!(
            i32::from_le_bytes(buf[502..506].try_into().unwrap()),
            2 - (500 + 6)
        );
    }
}
