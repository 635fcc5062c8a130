//! WebAssembly module emission.
//!
//! Produces a self-contained module exporting `exec(rp: i32, mp: i32)`
//! against an imported `env.memory`: `rp` points at the ten-word register
//! file, `mp` at a 2048-byte scratch window, both little-endian in the
//! host's linear memory. Register initialization and finalization stay on
//! the host side, so this is a packaging surface for embedders rather than
//! an execution path of [`HashWx`](crate::HashWx); the module's arithmetic
//! is nonetheless the same two-sweep protocol as the native backends.

use hashwx_asm::{CombineOp, MulOp, Opcode, Program, ProgramList, MEM_MASK, REG_SIZE};
use wasm_encoder::{
    BlockType, CodeSection, ExportKind, ExportSection, Function, FunctionSection, ImportSection,
    Instruction, MemArg, MemoryType, Module, TypeSection, ValType,
};

use super::STACK_WINDOW;

/// Function parameters: register pointer, memory-window pointer.
const PAR_RP: u32 = 0;
const PAR_MP: u32 = 1;
/// Locals: r0..r9 at 2..=11, then branch counter, branch flag, gather mask.
const LOC_R0: u32 = 2;
const LOC_BC: u32 = 12;
const LOC_BF: u32 = 13;
const LOC_MM: u32 = 14;

const NUM_LOCALS: u32 = 13;

fn memarg(offset: u64) -> MemArg {
    MemArg {
        offset,
        align: 3,
        memory_index: 0,
    }
}

fn local(reg: u8) -> u32 {
    LOC_R0 + u32::from(reg)
}

/// Compile `list` into a WebAssembly module.
pub fn compile_module(list: &ProgramList) -> Vec<u8> {
    let mut func = Function::new([(NUM_LOCALS, ValType::I64)]);

    // Load the register file and seed the execution locals.
    for reg in 0..REG_SIZE {
        func.instruction(&Instruction::LocalGet(PAR_RP));
        func.instruction(&Instruction::I64Load(memarg(8 * reg as u64)));
        func.instruction(&Instruction::LocalSet(LOC_R0 + reg as u32));
    }
    func.instruction(&Instruction::I64Const(0));
    func.instruction(&Instruction::LocalSet(LOC_BC));
    func.instruction(&Instruction::I64Const(MEM_MASK as i64));
    func.instruction(&Instruction::LocalSet(LOC_MM));
    func.instruction(&Instruction::I32Const(STACK_WINDOW as i32));
    func.instruction(&Instruction::LocalGet(PAR_MP));
    func.instruction(&Instruction::I32Add);
    func.instruction(&Instruction::LocalSet(PAR_MP));

    for program in list.programs() {
        translate_register_program(&mut func, program);
    }

    func.instruction(&Instruction::I64Const(0));
    func.instruction(&Instruction::LocalSet(LOC_BC));

    for program in list.programs() {
        translate_memory_program(&mut func, program);
    }

    // Store the general window back through the register pointer.
    for reg in 0..8u64 {
        func.instruction(&Instruction::LocalGet(PAR_RP));
        func.instruction(&Instruction::LocalGet(LOC_R0 + reg as u32));
        func.instruction(&Instruction::I64Store(memarg(8 * reg)));
    }
    func.instruction(&Instruction::End);

    let mut types = TypeSection::new();
    types
        .ty()
        .function([ValType::I32, ValType::I32], []);

    let mut imports = ImportSection::new();
    imports.import(
        "env",
        "memory",
        MemoryType {
            minimum: 1,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        },
    );

    let mut functions = FunctionSection::new();
    functions.function(0);

    let mut exports = ExportSection::new();
    exports.export("exec", ExportKind::Func, 0);

    let mut code = CodeSection::new();
    code.function(&func);

    let mut module = Module::new();
    module
        .section(&types)
        .section(&imports)
        .section(&functions)
        .section(&exports)
        .section(&code);
    module.finish()
}

fn translate_register_program(func: &mut Function, program: &Program) {
    // Claim the next 64 bytes of the window (it is filled top-down).
    func.instruction(&Instruction::LocalGet(PAR_MP));
    func.instruction(&Instruction::I32Const(64));
    func.instruction(&Instruction::I32Sub);
    func.instruction(&Instruction::LocalSet(PAR_MP));

    func.instruction(&Instruction::Loop(BlockType::Empty));
    for isn in program.iter() {
        translate_instruction(func, isn, false);
    }
    func.instruction(&Instruction::End);

    // Spill r0..r7, r0 at the highest address.
    for reg in 0..8u64 {
        func.instruction(&Instruction::LocalGet(PAR_MP));
        func.instruction(&Instruction::LocalGet(LOC_R0 + reg as u32));
        func.instruction(&Instruction::I64Store(memarg(56 - 8 * reg)));
    }
}

fn translate_memory_program(func: &mut Function, program: &Program) {
    func.instruction(&Instruction::Loop(BlockType::Empty));
    for isn in program.iter() {
        translate_instruction(func, isn, true);
    }
    func.instruction(&Instruction::End);
}

/// Push the memory-sweep operand `mem[(r[src] & mask)]` onto the stack.
fn gather(func: &mut Function, src: u8) {
    func.instruction(&Instruction::LocalGet(local(src)));
    func.instruction(&Instruction::LocalGet(LOC_MM));
    func.instruction(&Instruction::I64And);
    func.instruction(&Instruction::I32WrapI64);
    func.instruction(&Instruction::LocalGet(PAR_MP));
    func.instruction(&Instruction::I32Add);
    func.instruction(&Instruction::I64Load(memarg(0)));
}

fn translate_instruction(func: &mut Function, isn: &hashwx_asm::Instruction, memory_sweep: bool) {
    let (dst, src, imm) = (isn.dst(), isn.src(), isn.imm());
    match isn.opcode() {
        op if op.is_mul() => {
            let pre = match op.mul_op().expect("mul family") {
                MulOp::Or => Instruction::I64Or,
                MulOp::Xor => Instruction::I64Xor,
                MulOp::Add => Instruction::I64Add,
            };
            if memory_sweep {
                gather(func, src);
                func.instruction(&Instruction::LocalGet(local(dst)));
                func.instruction(&Instruction::I64Const(i64::from(imm)));
                func.instruction(&pre);
                func.instruction(&Instruction::I64Mul);
            } else {
                func.instruction(&Instruction::LocalGet(local(dst)));
                func.instruction(&Instruction::I64Const(i64::from(imm)));
                func.instruction(&pre);
                func.instruction(&Instruction::LocalGet(local(src)));
                func.instruction(&Instruction::I64Mul);
            }
            func.instruction(&Instruction::LocalSet(local(dst)));
        }
        Opcode::Rmcg => {
            func.instruction(&Instruction::LocalGet(local(dst)));
            func.instruction(&Instruction::LocalGet(local(src)));
            func.instruction(&Instruction::I64Mul);
            func.instruction(&Instruction::I64Const(i64::from(imm)));
            func.instruction(&Instruction::I64Rotr);
            func.instruction(&Instruction::LocalTee(local(dst)));
            func.instruction(&Instruction::LocalSet(LOC_BF));
        }
        op if op.is_arx() => {
            let (shift, combine) = op.arx_ops().expect("arx family");
            let shift = match shift {
                hashwx_asm::ShiftOp::Rotate => Instruction::I64Rotr,
                hashwx_asm::ShiftOp::Arithmetic => Instruction::I64ShrS,
                hashwx_asm::ShiftOp::Logical => Instruction::I64ShrU,
            };
            let combine = match combine {
                CombineOp::Xor => Instruction::I64Xor,
                CombineOp::Add => Instruction::I64Add,
                CombineOp::Sub => Instruction::I64Sub,
            };
            func.instruction(&Instruction::LocalGet(local(dst)));
            func.instruction(&Instruction::I64Const(i64::from(imm)));
            func.instruction(&shift);
            if memory_sweep {
                gather(func, src);
            } else {
                func.instruction(&Instruction::LocalGet(local(src)));
            }
            func.instruction(&combine);
            func.instruction(&Instruction::LocalSet(local(dst)));
        }
        Opcode::Branch => {
            func.instruction(&Instruction::LocalGet(LOC_BC));
            func.instruction(&Instruction::LocalGet(LOC_BF));
            func.instruction(&Instruction::I64Or);
            func.instruction(&Instruction::I64Const(32));
            func.instruction(&Instruction::I64And);
            func.instruction(&Instruction::I64Eqz);
            func.instruction(&Instruction::If(BlockType::Empty));
            func.instruction(&Instruction::I64Const(1));
            func.instruction(&Instruction::LocalGet(LOC_BC));
            func.instruction(&Instruction::I64Add);
            func.instruction(&Instruction::LocalSet(LOC_BC));
            func.instruction(&Instruction::Br(1));
            func.instruction(&Instruction::End);
        }
        Opcode::Halt => {}
        _ => unreachable!("family predicates cover every opcode"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator;
    use crate::rng::SipHashKey;
    use hashwx_asm::MEM_SIZE;

    #[test]
    fn window_fits_one_wasm_page() {
        // The register sweep walks the window down from mp + 2048.
        assert!(u64::from(STACK_WINDOW) >= 8 * MEM_SIZE as u64);
    }

    #[test]
    fn module_emission_is_deterministic() {
        let list = generator::generate(SipHashKey {
            k0: 0xa5a5a5a5a5a5a5a5,
            k1: 0x5a5a5a5a5a5a5a5a,
        });
        assert_eq!(compile_module(&list), compile_module(&list));
    }
}
