use std::ops::{Add, Div, Mul, Sub};

use tracing::trace;

use super::{FpOp, FpWidth, Instruction, PairIndex, Width};
use crate::abi::{END_OF_SIM_ADDRESS, LR_REG, STACK_BASE, align_down};
use crate::engine::{
    BranchAction, BranchInterceptor, BranchKind, Engine, Memory, Reg31, RegisterFile,
};
use crate::{Error, Result};

/// Single-core AArch64 engine over a private [`Memory`].
///
/// The stack occupies `STACK_BASE..STACK_BASE + stack_size`; the stack
/// pointer starts (and is reset to) the aligned top of that region.
#[derive(Debug)]
pub struct A64Simulator {
    regs: RegisterFile,
    memory: Memory,
    stack_top: u64,
    max_steps: Option<u64>,
    trace: bool,
}

impl A64Simulator {
    #[must_use]
    pub fn new(stack_size: usize) -> Self {
        let memory = Memory::with_region(STACK_BASE, vec![0; stack_size]);
        let stack_top = align_down(STACK_BASE + stack_size as u64);
        let mut sim = Self {
            regs: RegisterFile::new(),
            memory,
            stack_top,
            max_steps: None,
            trace: false,
        };
        sim.reset_state();
        sim
    }

    /// Abort a run after this many instructions.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Emit a `trace!` event with the disassembly of every executed instruction.
    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub const fn stack_top(&self) -> u64 {
        self.stack_top
    }

    /// Fetch, decode and execute the instruction at pc.
    pub fn step(&mut self, interceptor: &dyn BranchInterceptor) -> Result<()> {
        let pc = self.regs.pc();
        let word = self.memory.read_u32(pc)?;
        let instr = Instruction::decode(word).ok_or(Error::UndefinedInstruction { pc, word })?;
        if self.trace {
            trace!("{pc:#x}: {word:08x}  {instr}");
        }
        let next = self.execute(pc, instr, interceptor)?;
        self.regs.set_pc(next);
        Ok(())
    }

    /// Execute `instr` located at `pc` and return the next pc.
    #[allow(clippy::too_many_lines)]
    fn execute(
        &mut self,
        pc: u64,
        instr: Instruction,
        interceptor: &dyn BranchInterceptor,
    ) -> Result<u64> {
        let next = pc.wrapping_add(4);
        let regs = &mut self.regs;
        match instr {
            Instruction::Nop => {}
            Instruction::Brk { imm } => return Err(Error::Breakpoint { pc, imm }),
            Instruction::Movz {
                width,
                rd,
                imm16,
                hw,
            } => {
                let value = u64::from(imm16) << (hw * 16);
                regs.write_x(rd, width.truncate(value));
            }
            Instruction::Movn {
                width,
                rd,
                imm16,
                hw,
            } => {
                let value = !(u64::from(imm16) << (hw * 16));
                regs.write_x(rd, width.truncate(value));
            }
            Instruction::Movk {
                width,
                rd,
                imm16,
                hw,
            } => {
                let shift = hw * 16;
                let value = (regs.read_x(rd) & !(0xFFFF << shift)) | u64::from(imm16) << shift;
                regs.write_x(rd, width.truncate(value));
            }
            Instruction::AddImm {
                width,
                rd,
                rn,
                imm12,
                shift12,
            }
            | Instruction::SubImm {
                width,
                rd,
                rn,
                imm12,
                shift12,
            } => {
                let imm = u64::from(imm12) << if shift12 { 12 } else { 0 };
                let lhs = width.truncate(regs.read_register(rn, Reg31::StackPointer));
                let value = if matches!(instr, Instruction::AddImm { .. }) {
                    lhs.wrapping_add(imm)
                } else {
                    lhs.wrapping_sub(imm)
                };
                regs.write_register(rd, width.truncate(value), Reg31::StackPointer);
            }
            Instruction::AddReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            }
            | Instruction::SubReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            }
            | Instruction::AndReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            }
            | Instruction::OrrReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            }
            | Instruction::EorReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => {
                let lhs = width.truncate(regs.read_x(rn));
                let rhs = shift.apply(regs.read_x(rm), amount, width);
                let value = match instr {
                    Instruction::AddReg { .. } => lhs.wrapping_add(rhs),
                    Instruction::SubReg { .. } => lhs.wrapping_sub(rhs),
                    Instruction::AndReg { .. } => lhs & rhs,
                    Instruction::OrrReg { .. } => lhs | rhs,
                    _ => lhs ^ rhs,
                };
                regs.write_x(rd, width.truncate(value));
            }
            Instruction::Madd {
                width,
                rd,
                rn,
                rm,
                ra,
            } => {
                let value = regs
                    .read_x(ra)
                    .wrapping_add(regs.read_x(rn).wrapping_mul(regs.read_x(rm)));
                regs.write_x(rd, width.truncate(value));
            }
            Instruction::Ldr {
                width,
                rt,
                rn,
                offset,
            } => {
                let address = regs
                    .read_register(rn, Reg31::StackPointer)
                    .wrapping_add(u64::from(offset));
                let value = match width {
                    Width::W => u64::from(self.memory.read_u32(address)?),
                    Width::X => self.memory.read_u64(address)?,
                };
                regs.write_x(rt, value);
            }
            Instruction::Str {
                width,
                rt,
                rn,
                offset,
            } => {
                let address = regs
                    .read_register(rn, Reg31::StackPointer)
                    .wrapping_add(u64::from(offset));
                match width {
                    Width::W => self.memory.write_u32(address, regs.read_w(rt))?,
                    Width::X => self.memory.write_u64(address, regs.read_x(rt))?,
                }
            }
            Instruction::LdrFp {
                width,
                rt,
                rn,
                offset,
            } => {
                let address = regs
                    .read_register(rn, Reg31::StackPointer)
                    .wrapping_add(u64::from(offset));
                let bits = match width {
                    FpWidth::S => u64::from(self.memory.read_u32(address)?),
                    FpWidth::D => self.memory.read_u64(address)?,
                };
                regs.write_v_bits(rt, bits);
            }
            Instruction::StrFp {
                width,
                rt,
                rn,
                offset,
            } => {
                let address = regs
                    .read_register(rn, Reg31::StackPointer)
                    .wrapping_add(u64::from(offset));
                let bits = regs.read_v_bits(rt);
                match width {
                    FpWidth::S => self.memory.write_u32(address, bits as u32)?,
                    FpWidth::D => self.memory.write_u64(address, bits)?,
                }
            }
            Instruction::LdrLiteral { rt, offset } => {
                let address = pc.wrapping_add_signed(i64::from(offset));
                regs.write_x(rt, self.memory.read_u64(address)?);
            }
            Instruction::Stp {
                rt,
                rt2,
                rn,
                offset,
                index,
            } => {
                let (address, writeback) = pair_address(regs, rn, offset, index);
                self.memory.write_u64(address, regs.read_x(rt))?;
                self.memory.write_u64(address.wrapping_add(8), regs.read_x(rt2))?;
                if let Some(base) = writeback {
                    regs.write_register(rn, base, Reg31::StackPointer);
                }
            }
            Instruction::Ldp {
                rt,
                rt2,
                rn,
                offset,
                index,
            } => {
                let (address, writeback) = pair_address(regs, rn, offset, index);
                let first = self.memory.read_u64(address)?;
                let second = self.memory.read_u64(address.wrapping_add(8))?;
                regs.write_x(rt, first);
                regs.write_x(rt2, second);
                if let Some(base) = writeback {
                    regs.write_register(rn, base, Reg31::StackPointer);
                }
            }
            Instruction::B { offset } => return Ok(pc.wrapping_add_signed(i64::from(offset))),
            Instruction::Bl { offset } => {
                regs.write_x(LR_REG, next);
                return Ok(pc.wrapping_add_signed(i64::from(offset)));
            }
            Instruction::Cbz { width, rt, offset } => {
                if width.truncate(regs.read_x(rt)) == 0 {
                    return Ok(pc.wrapping_add_signed(i64::from(offset)));
                }
            }
            Instruction::Cbnz { width, rt, offset } => {
                if width.truncate(regs.read_x(rt)) != 0 {
                    return Ok(pc.wrapping_add_signed(i64::from(offset)));
                }
            }
            Instruction::Br { rn } => {
                let target = regs.read_x(rn);
                return Ok(match interceptor.intercept(BranchKind::Br, target, next, regs) {
                    BranchAction::Resume(address) => address,
                    BranchAction::Simulate => target,
                });
            }
            Instruction::Blr { rn } => {
                let target = regs.read_x(rn);
                return Ok(match interceptor.intercept(BranchKind::Blr, target, next, regs) {
                    BranchAction::Resume(address) => address,
                    BranchAction::Simulate => {
                        regs.write_x(LR_REG, next);
                        target
                    }
                });
            }
            Instruction::Ret { rn } => return Ok(regs.read_x(rn)),
            Instruction::FmovReg { width, rd, rn } => match width {
                FpWidth::S => regs.write_s(rd, regs.read_s(rn)),
                FpWidth::D => regs.write_d(rd, regs.read_d(rn)),
            },
            Instruction::FmovToFp { width, rd, rn } => match width {
                FpWidth::S => regs.write_v_bits(rd, u64::from(regs.read_w(rn))),
                FpWidth::D => regs.write_v_bits(rd, regs.read_x(rn)),
            },
            Instruction::FmovFromFp { width, rd, rn } => match width {
                FpWidth::S => regs.write_x(rd, regs.read_v_bits(rn) & 0xFFFF_FFFF),
                FpWidth::D => regs.write_x(rd, regs.read_v_bits(rn)),
            },
            Instruction::FpArith {
                op,
                width,
                rd,
                rn,
                rm,
            } => match width {
                FpWidth::S => regs.write_s(rd, fp_op(op, regs.read_s(rn), regs.read_s(rm))),
                FpWidth::D => regs.write_d(rd, fp_op(op, regs.read_d(rn), regs.read_d(rm))),
            },
        }
        Ok(next)
    }
}

fn pair_address(
    regs: &RegisterFile,
    rn: u8,
    offset: i16,
    index: PairIndex,
) -> (u64, Option<u64>) {
    let base = regs.read_register(rn, Reg31::StackPointer);
    let moved = base.wrapping_add_signed(i64::from(offset));
    match index {
        PairIndex::SignedOffset => (moved, None),
        PairIndex::PreIndex => (moved, Some(moved)),
        PairIndex::PostIndex => (base, Some(moved)),
    }
}

fn fp_op<T>(op: FpOp, lhs: T, rhs: T) -> T
where
    T: Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Div<Output = T>,
{
    match op {
        FpOp::Mul => lhs * rhs,
        FpOp::Div => lhs / rhs,
        FpOp::Add => lhs + rhs,
        FpOp::Sub => lhs - rhs,
    }
}

impl Engine for A64Simulator {
    fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    fn memory(&self) -> &Memory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    fn stack_base(&self) -> u64 {
        STACK_BASE
    }

    fn run_from(&mut self, pc: u64, interceptor: &dyn BranchInterceptor) -> Result<()> {
        self.regs.set_pc(pc);
        let mut steps = 0u64;
        while self.regs.pc() != END_OF_SIM_ADDRESS {
            if let Some(limit) = self.max_steps.filter(|&limit| steps >= limit) {
                return Err(Error::StepLimitExceeded(limit));
            }
            self.step(interceptor)?;
            steps += 1;
        }
        trace!(steps, "simulation reached end address");
        Ok(())
    }

    fn reset_state(&mut self) {
        self.regs.reset();
        self.regs.set_sp(self.stack_top);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{DEFAULT_STACK_SIZE, SP_CODE};
    use crate::engine::Passthrough;

    const CODE: u64 = 0x1_0000;

    fn load(program: &[Instruction]) -> A64Simulator {
        let mut sim = A64Simulator::new(DEFAULT_STACK_SIZE).with_max_steps(Some(1_000));
        let words: Vec<u32> = program.iter().map(Instruction::encode).collect();
        sim.memory_mut().map_words(CODE, &words).unwrap();
        sim
    }

    fn movz(rd: u8, imm16: u16) -> Instruction {
        Instruction::Movz {
            width: Width::X,
            rd,
            imm16,
            hw: 0,
        }
    }

    #[test]
    fn test_runs_until_end_of_sim_address() {
        let mut sim = load(&[
            movz(0, 40),
            Instruction::AddImm {
                width: Width::X,
                rd: 0,
                rn: 0,
                imm12: 2,
                shift12: false,
            },
            Instruction::ret(),
        ]);
        sim.run_from(CODE, &Passthrough).unwrap();
        assert_eq!(sim.registers().read_x(0), 42);
        assert_eq!(sim.registers().pc(), END_OF_SIM_ADDRESS);
    }

    #[test]
    fn test_call_and_return_through_stack_frame() {
        // caller: stp fp, lr; bl callee; ldp fp, lr; ret
        // callee: mul x0, x1, x2; ret
        let mut sim = load(&[
            Instruction::Stp {
                rt: 29,
                rt2: 30,
                rn: SP_CODE,
                offset: -16,
                index: PairIndex::PreIndex,
            },
            Instruction::Bl { offset: 12 },
            Instruction::Ldp {
                rt: 29,
                rt2: 30,
                rn: SP_CODE,
                offset: 16,
                index: PairIndex::PostIndex,
            },
            Instruction::ret(),
            Instruction::Madd {
                width: Width::X,
                rd: 0,
                rn: 1,
                rm: 2,
                ra: SP_CODE,
            },
            Instruction::ret(),
        ]);
        let sp = sim.registers().sp();
        sim.registers_mut().write_x(1, 6);
        sim.registers_mut().write_x(2, 7);
        sim.run_from(CODE, &Passthrough).unwrap();
        assert_eq!(sim.registers().read_x(0), 42);
        assert_eq!(sim.registers().sp(), sp);
    }

    #[test]
    fn test_blr_without_interception_links_and_branches() {
        let mut sim = load(&[
            Instruction::mov(19, 30),
            Instruction::LdrLiteral { rt: 16, offset: 12 },
            Instruction::Blr { rn: 16 },
            Instruction::Ret { rn: 19 },
            // literal: address of the function below
            Instruction::Nop,
            Instruction::Nop,
            movz(0, 7),
            Instruction::ret(),
        ]);
        let target = CODE + 24;
        sim.memory_mut().write_u64(CODE + 16, target).unwrap();
        sim.run_from(CODE, &Passthrough).unwrap();
        assert_eq!(sim.registers().read_x(0), 7);
        assert_eq!(sim.registers().lr(), CODE + 12);
    }

    #[test]
    fn test_float_arithmetic_and_transfers() {
        let mut sim = load(&[
            Instruction::FmovToFp {
                width: FpWidth::D,
                rd: 1,
                rn: 1,
            },
            Instruction::FpArith {
                op: FpOp::Mul,
                width: FpWidth::D,
                rd: 0,
                rn: 0,
                rm: 1,
            },
            Instruction::FpArith {
                op: FpOp::Sub,
                width: FpWidth::S,
                rd: 2,
                rn: 2,
                rm: 3,
            },
            Instruction::ret(),
        ]);
        sim.registers_mut().write_d(0, 1.5);
        sim.registers_mut().write_x(1, 4.0f64.to_bits());
        sim.registers_mut().write_s(2, 10.0);
        sim.registers_mut().write_s(3, 0.5);
        sim.run_from(CODE, &Passthrough).unwrap();
        assert!((sim.registers().read_d(0) - 6.0).abs() < f64::EPSILON);
        assert!((sim.registers().read_s(2) - 9.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_w_arithmetic_wraps_at_32_bits() {
        let mut sim = load(&[
            Instruction::Movn {
                width: Width::W,
                rd: 0,
                imm16: 0,
                hw: 0,
            },
            Instruction::AddImm {
                width: Width::W,
                rd: 0,
                rn: 0,
                imm12: 1,
                shift12: false,
            },
            Instruction::ret(),
        ]);
        sim.run_from(CODE, &Passthrough).unwrap();
        assert_eq!(sim.registers().read_x(0), 0);
    }

    #[test]
    fn test_undefined_instruction_is_an_error() {
        let mut sim = A64Simulator::new(DEFAULT_STACK_SIZE);
        sim.memory_mut().map_words(CODE, &[0]).unwrap();
        let err = sim.run_from(CODE, &Passthrough).unwrap_err();
        assert!(matches!(
            err,
            Error::UndefinedInstruction { pc: CODE, word: 0 }
        ));
    }

    #[test]
    fn test_step_limit_stops_infinite_loop() {
        let mut sim = load(&[Instruction::B { offset: 0 }]);
        let err = sim.run_from(CODE, &Passthrough).unwrap_err();
        assert!(matches!(err, Error::StepLimitExceeded(1_000)));
    }

    #[test]
    fn test_breakpoint_reports_immediate() {
        let mut sim = load(&[Instruction::Brk { imm: 0x3E8 }]);
        let err = sim.run_from(CODE, &Passthrough).unwrap_err();
        assert!(matches!(err, Error::Breakpoint { pc: CODE, imm: 0x3E8 }));
    }

    #[test]
    fn test_reset_restores_stack_top() {
        let mut sim = A64Simulator::new(DEFAULT_STACK_SIZE);
        let top = sim.stack_top();
        assert_eq!(top, STACK_BASE + DEFAULT_STACK_SIZE as u64);
        sim.registers_mut().set_sp(top - 64);
        sim.registers_mut().write_x(3, 9);
        sim.reset_state();
        assert_eq!(sim.registers().sp(), top);
        assert_eq!(sim.registers().read_x(3), 0);
    }
}
