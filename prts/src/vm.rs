// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use std::{fmt, ops::Index};

use num_traits::{CheckedDiv, WrappingAdd, WrappingMul, WrappingSub};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    arch::{Distance, Register, Word, PC, REGISTER_COUNT, SP},
    grid::Grid,
    op::{DecodeError, Immediate, Op, RawOpCode},
};

/// The 32 general purpose registers. `r31` is the program counter.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegisterFile([Word; REGISTER_COUNT]);

impl RegisterFile {
    pub fn pc(&self) -> Distance {
        self.0[PC as usize]
    }

    pub fn sp(&self) -> Word {
        self.0[SP as usize]
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.0
    }

    /// `(register, value)` for every register, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Register, Word)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(register, &value)| (register as Register, value))
    }
}

impl Index<Register> for RegisterFile {
    type Output = Word;

    fn index(&self, register: Register) -> &Self::Output {
        &self.0[register as usize]
    }
}

/// Condition flags set by `CMP`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub zero: bool,
    pub negative: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Instructions to execute before giving up. `None` only stops at
    /// `HALT` or when the program runs off the grid.
    pub max_steps: Option<u64>,
}

/// A host function failed. The message is reported as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct NativeCallError(pub String);

/// Services `NATIVE_EXEC`.
pub trait NativeHost {
    /// Runs host function `function` on `argument`.
    fn call(
        &mut self,
        function: Immediate,
        argument: Word,
    ) -> Result<Word, NativeCallError>;
}

impl<F: FnMut(Immediate, Word) -> Result<Word, NativeCallError>> NativeHost
    for F
{
    fn call(
        &mut self,
        function: Immediate,
        argument: Word,
    ) -> Result<Word, NativeCallError> {
        self(function, argument)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionErrorKind {
    #[error("undefined opcode")]
    UndefinedOpcode,
    #[error("register r{0} does not exist")]
    InvalidRegister(Register),
    #[error("jump target {target} is outside the grid")]
    JumpOutOfBounds { target: Word },
    #[error("ran off the end of the grid without reaching HALT")]
    Runaway,
    #[error("pixel address {address} is outside the grid")]
    PixelOutOfBounds { address: Word },
    #[error("division by zero")]
    DivisionByZero,
    #[error("gave up after {0} steps")]
    StepLimitExceeded(u64),
    #[error("NATIVE_EXEC without a native host")]
    NoNativeHost,
    #[error("native call failed: {0}")]
    NativeCall(NativeCallError),
}

/// Execution stopped at distance `pc`. `opcode` is the raw byte of the
/// faulting cell, if there was one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at d={pc}{}", describe_opcode(.opcode))]
pub struct ExecutionError {
    pub pc: Distance,
    pub opcode: Option<RawOpCode>,
    pub kind: ExecutionErrorKind,
}

fn describe_opcode(opcode: &Option<RawOpCode>) -> String {
    opcode
        .map(|opcode| format!(" (opcode 0x{:02X})", opcode))
        .unwrap_or_default()
}

pub type ExecutionResult<T = ()> = Result<T, ExecutionError>;

/// What to do with the program counter once an instruction has run.
enum Flow {
    Next,
    Jump(Word),
    Halt,
}

/// Runs a program image in place. The machine owns its grid, so `STP` never
/// touches the caller's copy.
pub struct Vm {
    grid: Grid,
    registers: RegisterFile,
    flags: Flags,
    halted: bool,
    steps: u64,
    config: VmConfig,
    host: Option<Box<dyn NativeHost>>,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("side", &self.grid.side())
            .field("registers", &self.registers)
            .field("flags", &self.flags)
            .field("halted", &self.halted)
            .field("steps", &self.steps)
            .field("config", &self.config)
            .field("host", &self.host.is_some())
            .finish()
    }
}

impl Vm {
    /// A machine about to execute distance 0 of `grid`.
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            registers: RegisterFile::default(),
            flags: Flags::default(),
            halted: false,
            steps: 0,
            config: VmConfig::default(),
            host: None,
        }
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_native_host(mut self, host: impl NativeHost + 'static) -> Self {
        self.host = Some(Box::new(host));
        self
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn into_registers(self) -> RegisterFile {
        self.registers
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Runs the [`Vm`] until `HALT`.
    pub fn run(&mut self) -> ExecutionResult {
        while !self.halted {
            self.step()?;
        }
        debug!(
            steps = self.steps,
            pc = self.registers.pc(),
            "halted"
        );
        Ok(())
    }

    /// Executes one instruction. Does nothing once halted.
    pub fn step(&mut self) -> ExecutionResult {
        if self.halted {
            return Ok(());
        }

        let pc = self.registers.pc();
        if let Some(max_steps) = self.config.max_steps {
            if self.steps >= max_steps {
                return Err(self.fault(
                    None,
                    ExecutionErrorKind::StepLimitExceeded(max_steps),
                ));
            }
        }

        let word = self
            .grid
            .word_at_distance(pc)
            .map_err(|_| self.fault(None, ExecutionErrorKind::Runaway))?;
        let opcode = word.to_le_bytes()[0];
        let op = Op::decode_packed(word).map_err(|error| {
            let kind = match error {
                DecodeError::UndefinedOpcode(_) => {
                    ExecutionErrorKind::UndefinedOpcode
                }
                DecodeError::RegisterOutOfRange { register, .. } => {
                    ExecutionErrorKind::InvalidRegister(register)
                }
            };
            self.fault(Some(opcode), kind)
        })?;

        trace!(pc, %op, "step");
        let flow = self
            .execute_op(op)
            .map_err(|kind| self.fault(Some(opcode), kind))?;
        self.steps += 1;

        match flow {
            Flow::Next => self.registers.0[PC as usize] = pc.wrapping_add(1),
            Flow::Jump(target) => {
                if u64::from(target) >= self.grid.area() {
                    return Err(self.fault(
                        Some(opcode),
                        ExecutionErrorKind::JumpOutOfBounds { target },
                    ));
                }
                self.registers.0[PC as usize] = target;
            }
            Flow::Halt => self.halted = true,
        }
        Ok(())
    }

    fn execute_op(&mut self, op: Op) -> Result<Flow, ExecutionErrorKind> {
        Ok(match op {
            Op::Nop => Flow::Next,
            Op::Halt => Flow::Halt,
            Op::Mov(to, from) => self.write(to, self.read(from)),
            Op::Ldi(to, constant) => self.write(to, Word::from(constant)),
            Op::Add(to, a, b) => {
                self.arithmetic(to, self.read(a), self.read(b), Alu::Add)?
            }
            Op::Sub(to, a, b) => {
                self.arithmetic(to, self.read(a), self.read(b), Alu::Sub)?
            }
            Op::Mul(to, a, b) => {
                self.arithmetic(to, self.read(a), self.read(b), Alu::Mul)?
            }
            Op::Div(to, a, b) => {
                self.arithmetic(to, self.read(a), self.read(b), Alu::Div)?
            }
            Op::Addi(to, a, constant) => self.arithmetic(
                to,
                self.read(a),
                Word::from(constant),
                Alu::Add,
            )?,
            Op::Subi(to, a, constant) => self.arithmetic(
                to,
                self.read(a),
                Word::from(constant),
                Alu::Sub,
            )?,
            Op::Cmp(a, b) => {
                let (first, second) = (self.read(a), self.read(b));
                self.flags = Flags {
                    zero: first == second,
                    negative: first < second,
                };
                Flow::Next
            }
            Op::Jmp(target) => Flow::Jump(Word::from(target)),
            Op::Beq(a, b, target) => {
                if self.read(a) == self.read(b) {
                    Flow::Jump(Word::from(target))
                } else {
                    Flow::Next
                }
            }
            Op::Ldp(to, address) => {
                let address = self.read(address);
                let word = self
                    .grid
                    .word_at_distance(address)
                    .map_err(|_| ExecutionErrorKind::PixelOutOfBounds { address })?;
                // R is the most significant byte in a register
                self.write(to, Word::from_be_bytes(word.to_le_bytes()))
            }
            Op::Stp(from, address) => {
                let address = self.read(address);
                let word = Word::from_le_bytes(self.read(from).to_be_bytes());
                self.grid
                    .set_word_at_distance(address, word)
                    .map_err(|_| ExecutionErrorKind::PixelOutOfBounds { address })?;
                Flow::Next
            }
            Op::NativeExec(function, argument, to) => {
                let argument = self.read(argument);
                let host =
                    self.host.as_mut().ok_or(ExecutionErrorKind::NoNativeHost)?;
                let result = host
                    .call(function, argument)
                    .map_err(ExecutionErrorKind::NativeCall)?;
                self.write(to, result)
            }
        })
    }

    fn arithmetic(
        &mut self,
        to: Register,
        first: Word,
        second: Word,
        alu: Alu,
    ) -> Result<Flow, ExecutionErrorKind> {
        let result = alu
            .apply(first, second)
            .ok_or(ExecutionErrorKind::DivisionByZero)?;
        Ok(self.write(to, result))
    }

    fn read(&self, register: Register) -> Word {
        self.registers[register]
    }

    /// Writing the program counter is a jump.
    fn write(&mut self, register: Register, value: Word) -> Flow {
        if register == PC {
            Flow::Jump(value)
        } else {
            self.registers.0[register as usize] = value;
            Flow::Next
        }
    }

    fn fault(
        &self,
        opcode: Option<RawOpCode>,
        kind: ExecutionErrorKind,
    ) -> ExecutionError {
        ExecutionError {
            pc: self.registers.pc(),
            opcode,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Alu {
    Add,
    Sub,
    Mul,
    Div,
}

impl Alu {
    /// `None` only for a zero divisor.
    fn apply<T: WrappingAdd + WrappingSub + WrappingMul + CheckedDiv>(
        self,
        first: T,
        second: T,
    ) -> Option<T> {
        match self {
            Self::Add => Some(first.wrapping_add(&second)),
            Self::Sub => Some(first.wrapping_sub(&second)),
            Self::Mul => Some(first.wrapping_mul(&second)),
            Self::Div => first.checked_div(&second),
        }
    }
}

/// Runs `grid` to completion and returns the final registers.
pub fn execute(grid: Grid) -> ExecutionResult<RegisterFile> {
    let mut vm = Vm::new(grid);
    vm.run()?;
    Ok(vm.into_registers())
}

#[cfg(test)]
mod tests {
    use crate::{
        arch::{Word, PC},
        assembler::assemble,
        grid::Grid,
        vm::{
            execute, ExecutionError, ExecutionErrorKind, Flags,
            NativeCallError, Vm, VmConfig,
        },
    };

    fn vm(source: &str) -> Vm {
        Vm::new(assemble(source).expect("program should assemble"))
    }

    fn run_err(source: &str) -> ExecutionError {
        vm(source).run().expect_err("program should fail")
    }

    #[test]
    fn basic_program() {
        let registers = execute(
            assemble("LDI r1, 10\nLDI r2, 20\nADD r3, r1, r2\nHALT").unwrap(),
        )
        .expect("program should run without errors");

        assert_eq!(10, registers[1]);
        assert_eq!(20, registers[2]);
        assert_eq!(30, registers[3]);
        assert_eq!(3, registers.pc());
    }

    #[test]
    fn stepping() {
        let mut vm = vm("LDI r1, 1\nHALT");
        vm.step().expect("program should run without errors");
        assert_eq!(1, vm.registers()[1]);
        assert_eq!(1, vm.registers().pc());
        assert!(!vm.is_halted());

        vm.step().expect("program should run without errors");
        assert!(vm.is_halted());
        assert_eq!(2, vm.steps());

        vm.step().expect("halted machines ignore steps");
        assert_eq!(2, vm.steps());
    }

    #[test]
    fn basic_loop() {
        // computes the sum of the first 10 natural numbers
        let mut vm = vm("
                LDI r1, 10       ; i = 10
                LDI r2, 0        ; sum = 0
            loop:
                ADD r2, r2, r1   ; sum += i
                SUBI r1, r1, 1   ; i -= 1
                BEQ r1, r0, done
                JMP loop
            done:
                HALT
        ");
        vm.run().expect("program should run without errors");

        assert_eq!(55, vm.registers()[2]);
        assert_eq!(0, vm.registers()[1]);
        assert_eq!(6, vm.registers().pc());
    }

    #[test]
    fn arithmetic_wraps() {
        let registers = execute(
            assemble(
                "LDI r1, 3\nSUBI r2, r0, 1\nMUL r3, r2, r1\nDIV r4, r2, r1\nHALT",
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(Word::MAX, registers[2]);
        assert_eq!(Word::MAX.wrapping_mul(3), registers[3]);
        assert_eq!(Word::MAX / 3, registers[4]);
    }

    #[test]
    fn compare_sets_flags() {
        let mut vm = vm("LDI r1, 1\nLDI r2, 2\nCMP r1, r2\nHALT");
        vm.run().unwrap();
        assert_eq!(
            Flags {
                zero: false,
                negative: true
            },
            vm.flags()
        );

        let mut vm = self::vm("LDI r1, 2\nLDI r2, 2\nCMP r1, r2\nHALT");
        vm.run().unwrap();
        assert_eq!(
            Flags {
                zero: true,
                negative: false
            },
            vm.flags()
        );
    }

    #[test]
    fn writing_the_pc_jumps() {
        let registers = execute(
            assemble("LDI r1, 3\nMOV pc, r1\nLDI r2, 9\nHALT").unwrap(),
        )
        .unwrap();
        assert_eq!(0, registers[2]);
        assert_eq!(3, registers[PC]);
    }

    #[test]
    fn jumps_are_bounds_checked() {
        assert_eq!(
            ExecutionError {
                pc: 0,
                opcode: Some(0x06),
                kind: ExecutionErrorKind::JumpOutOfBounds { target: 9 }
            },
            run_err("JMP 9\nHALT")
        );

        let error = run_err("LDI r1, 200\nMOV r31, r1\nHALT");
        assert_eq!(1, error.pc);
        assert_eq!(
            ExecutionErrorKind::JumpOutOfBounds { target: 200 },
            error.kind
        );
    }

    #[test]
    fn running_off_the_grid() {
        // 4 cells, no HALT
        let error = run_err("LDI r1, 1\nLDI r2, 2\nLDI r3, 3\nLDI r4, 4");
        assert_eq!(
            ExecutionError {
                pc: 4,
                opcode: None,
                kind: ExecutionErrorKind::Runaway
            },
            error
        );
    }

    #[test]
    fn undefined_opcodes_are_fatal() {
        let mut grid = Grid::blank(2).unwrap();
        grid.set_word_at_distance(1, Word::from_le_bytes([0x02, 0, 0, 0]))
            .unwrap();
        assert_eq!(
            Err(ExecutionError {
                pc: 1,
                opcode: Some(0x02),
                kind: ExecutionErrorKind::UndefinedOpcode
            }),
            execute(grid)
        );

        let mut grid = Grid::blank(1).unwrap();
        grid.set_word_at_distance(0, Word::from_le_bytes([0x08, 1, 0, 32]))
            .unwrap();
        assert_eq!(
            ExecutionErrorKind::InvalidRegister(32),
            execute(grid).unwrap_err().kind
        );
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let error = run_err("LDI r1, 1\nDIV r2, r1, r0\nHALT");
        assert_eq!(1, error.pc);
        assert_eq!(Some(0x36), error.opcode);
        assert_eq!(ExecutionErrorKind::DivisionByZero, error.kind);
    }

    #[test]
    fn step_limit() {
        let mut vm = vm("loop: JMP loop")
            .with_config(VmConfig { max_steps: Some(10) });
        assert_eq!(
            ExecutionErrorKind::StepLimitExceeded(10),
            vm.run().unwrap_err().kind
        );
        assert_eq!(10, vm.steps());
    }

    #[test]
    fn pixel_load_and_store() {
        let mut vm = vm("
                LDI r1, 4
                LDP r2, r1      ; r2 = the HALT cell
                LDI r3, 5
                STP r2, r3      ; copy it past the program
                HALT
        ");
        vm.run().unwrap();

        assert_eq!(0x07_00_00_00, vm.registers()[2]);
        assert_eq!(Ok(0x07), vm.grid().word_at_distance(5));

        let error = run_err("LDI r1, 99\nLDP r2, r1\nHALT");
        assert_eq!(
            ExecutionErrorKind::PixelOutOfBounds { address: 99 },
            error.kind
        );
    }

    #[test]
    fn stores_do_not_touch_the_callers_grid() {
        let grid =
            assemble("LDI r1, 7\nLDI r2, 6\nSTP r1, r2\nNOP\nHALT").unwrap();
        let mut vm = Vm::new(grid.clone());
        vm.run().unwrap();
        assert_eq!(Ok(0x07_00_00_00), vm.grid().word_at_distance(6));
        assert_eq!(Ok(0), grid.word_at_distance(6));
    }

    #[test]
    fn native_exec_calls_the_host() {
        let mut calls = vec![];
        let mut vm = vm("LDI r1, 21\nNATIVE_EXEC 2, r1, r4\nHALT")
            .with_native_host(
                move |function: u8, argument: Word| -> Result<Word, NativeCallError> {
                    calls.push(function);
                    Ok(argument * Word::from(function))
                },
            );
        vm.run().unwrap();
        assert_eq!(42, vm.registers()[4]);
    }

    #[test]
    fn native_exec_failures() {
        assert_eq!(
            ExecutionErrorKind::NoNativeHost,
            run_err("NATIVE_EXEC 0, r0, r1\nHALT").kind
        );

        let mut vm = vm("NATIVE_EXEC 7, r0, r1\nHALT").with_native_host(
            |function: u8, _: Word| -> Result<Word, NativeCallError> {
                Err(NativeCallError(format!("no function {}", function)))
            },
        );
        let error = vm.run().unwrap_err();
        assert_eq!(Some(0xF0), error.opcode);
        assert_eq!(
            ExecutionErrorKind::NativeCall(NativeCallError(
                "no function 7".into()
            )),
            error.kind
        );
        assert_eq!(
            "native call failed: no function 7 at d=0 (opcode 0xF0)",
            error.to_string()
        );
    }
}
