use crate::bytecode::verify::{FRAME_HEADER, check_program};
use crate::bytecode::{Instruction, Opr, Program};
use crate::runtime::io::{Input, Output};
use crate::runtime::runtime_error::{Fault, RuntimeError};

/// Offsets of the frame header slots from the frame base.
const STATIC_LINK: usize = 0;
const DYNAMIC_LINK: usize = 1;
const RETURN_ADDRESS: usize = 2;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: Some(1_000_000),
            max_stack_size: 10_000,
        }
    }
}

enum Flow {
    Continue,
    Halt,
}

/// Stack machine for P-Code.
///
/// Each activation record starts with a three slot header: the static link
/// (base of the lexically enclosing frame), the dynamic link (base of the
/// caller's frame) and the return address. The main program's frame sits at
/// base 0 with an all-zero header.
pub struct Vm {
    stack: Vec<i64>,
    /// Next free slot; everything below is live.
    sp: usize,
    /// Base of the current frame.
    bp: usize,
    ip: usize,
    config: VmConfig,
    /// Entry of every active procedure call, outermost first.
    frames: Vec<usize>,
    steps: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: Vec::new(),
            sp: 0,
            bp: 0,
            ip: 0,
            config,
            frames: Vec::new(),
            steps: 0,
        }
    }

    /// Instructions executed by the last run.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Live portion of the stack.
    pub fn stack(&self) -> &[i64] {
        &self.stack[..self.sp.min(self.stack.len())]
    }

    pub fn reset_execution_state(&mut self) {
        self.stack.clear();
        self.stack.resize(FRAME_HEADER, 0);
        self.sp = 0;
        self.bp = 0;
        self.ip = 0;
        self.frames.clear();
        self.steps = 0;
    }

    /// Verifies and executes `program` from instruction 0 until the main
    /// frame returns or execution runs off the end.
    pub fn run(
        &mut self,
        program: &Program,
        input: &mut dyn Input,
        output: &mut dyn Output,
    ) -> Result<(), RuntimeError> {
        self.reset_execution_state();
        check_program(program).map_err(|e| RuntimeError::new(Fault::from(e), 0))?;

        tracing::debug!(instructions = program.len(), "vm start");

        let result = self.exec(program, input, output);

        match &result {
            Ok(()) => tracing::debug!(steps = self.steps, "vm halted"),
            Err(err) => tracing::debug!(
                steps = self.steps,
                fault = %err.fault,
                ip = err.ip,
                "vm fault"
            ),
        }
        result
    }

    fn exec(
        &mut self,
        program: &Program,
        input: &mut dyn Input,
        output: &mut dyn Output,
    ) -> Result<(), RuntimeError> {
        let code = program.instructions();

        // Running off the end is a normal halt.
        while let Some(&ins) = code.get(self.ip) {
            let ip = self.ip;
            self.ip += 1;

            match self.step(ins, code.len(), input, output) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => break,
                Err(fault) => {
                    return Err(
                        RuntimeError::new(fault, ip).with_call_stack(self.frames.clone())
                    );
                }
            }
        }

        Ok(())
    }

    fn check_limits(&mut self) -> Result<(), Fault> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(Fault::StepLimitExceeded { limit: max });
            }
        }

        Ok(())
    }

    fn step(
        &mut self,
        ins: Instruction,
        len: usize,
        input: &mut dyn Input,
        output: &mut dyn Output,
    ) -> Result<Flow, Fault> {
        self.check_limits()?;

        tracing::trace!(ip = self.ip - 1, %ins, sp = self.sp, bp = self.bp, "step");

        match ins {
            Instruction::Lit(v) => self.push(v)?,

            Instruction::Lod { level, addr } => {
                let slot = self.slot(level, addr)?;
                self.push(self.stack[slot])?;
            }

            Instruction::Sto { level, addr } => {
                let v = self.pop()?;
                let slot = self.slot(level, addr)?;
                self.stack[slot] = v;
            }

            Instruction::Cal { level, target } => {
                if self.frames.len() >= self.config.max_call_depth {
                    return Err(Fault::CallDepthExceeded {
                        limit: self.config.max_call_depth,
                    });
                }
                let static_link = self.base(level)?;
                let base = self.sp;
                self.reserve(base + FRAME_HEADER)?;

                // The callee's INT moves sp over the header.
                self.stack[base + STATIC_LINK] = static_link as i64;
                self.stack[base + DYNAMIC_LINK] = self.bp as i64;
                self.stack[base + RETURN_ADDRESS] = self.ip as i64;

                self.bp = base;
                self.frames.push(target);
                self.jump(target, len)?;
            }

            Instruction::Int(n) => {
                let top = self.sp.checked_add(n).ok_or(Fault::StackOverflow {
                    limit: self.config.max_stack_size,
                })?;
                self.reserve(top)?;

                // Fresh locals start at zero; the header is left alone.
                let first_local = self.sp.max(self.bp + FRAME_HEADER);
                if first_local < top {
                    self.stack[first_local..top].fill(0);
                }
                self.sp = top;
            }

            Instruction::Jmp(target) => self.jump(target, len)?,

            Instruction::Jpc(target) => {
                if self.pop()? == 0 {
                    self.jump(target, len)?;
                }
            }

            Instruction::Opr(op) => return self.operate(op, len),

            Instruction::Red => {
                let v = input.read().ok_or(Fault::InputExhausted)?;
                self.push(v)?;
            }

            Instruction::Wrt => {
                let v = self.pop()?;
                output.write(v);
            }
        }

        Ok(Flow::Continue)
    }

    fn operate(&mut self, op: Opr, len: usize) -> Result<Flow, Fault> {
        let overflow = || Fault::ArithmeticOverflow { op: op.mnemonic() };

        let result = match op {
            Opr::Ret => return self.ret(len),
            Opr::Neg => self.pop()?.checked_neg().ok_or_else(overflow)?,
            Opr::Odd => (self.pop()? % 2 != 0) as i64,
            Opr::Add => {
                let (a, b) = self.pop_pair()?;
                a.checked_add(b).ok_or_else(overflow)?
            }
            Opr::Sub => {
                let (a, b) = self.pop_pair()?;
                a.checked_sub(b).ok_or_else(overflow)?
            }
            Opr::Mul => {
                let (a, b) = self.pop_pair()?;
                a.checked_mul(b).ok_or_else(overflow)?
            }
            Opr::Div => {
                let (a, b) = self.pop_pair()?;
                if b == 0 {
                    return Err(Fault::DivisionByZero);
                }
                a.checked_div(b).ok_or_else(overflow)?
            }
            Opr::Eq => {
                let (a, b) = self.pop_pair()?;
                (a == b) as i64
            }
            Opr::Ne => {
                let (a, b) = self.pop_pair()?;
                (a != b) as i64
            }
            Opr::Lt => {
                let (a, b) = self.pop_pair()?;
                (a < b) as i64
            }
            Opr::Ge => {
                let (a, b) = self.pop_pair()?;
                (a >= b) as i64
            }
            Opr::Gt => {
                let (a, b) = self.pop_pair()?;
                (a > b) as i64
            }
            Opr::Le => {
                let (a, b) = self.pop_pair()?;
                (a <= b) as i64
            }
        };

        self.push(result)?;
        Ok(Flow::Continue)
    }

    /// Leaves the current frame. Returning from the main frame halts.
    fn ret(&mut self, len: usize) -> Result<Flow, Fault> {
        if self.bp == 0 {
            return Ok(Flow::Halt);
        }
        let base = self.bp;
        let header = |offset: usize| {
            self.stack
                .get(base + offset)
                .copied()
                .ok_or(Fault::AddressOutOfRange {
                    address: (base + offset) as i64,
                    sp: self.sp,
                })
        };
        let caller = header(DYNAMIC_LINK)?;
        let ret = header(RETURN_ADDRESS)?;

        self.sp = base;
        self.bp = to_address(caller, self.sp)?;
        self.frames.pop();
        self.jump(to_address(ret, self.sp)?, len)?;
        Ok(Flow::Continue)
    }

    // Stack primitives

    /// Grows the backing store so slots below `top` exist.
    fn reserve(&mut self, top: usize) -> Result<(), Fault> {
        if top > self.config.max_stack_size {
            return Err(Fault::StackOverflow {
                limit: self.config.max_stack_size,
            });
        }
        if self.stack.len() < top {
            self.stack.resize(top, 0);
        }
        Ok(())
    }

    fn push(&mut self, v: i64) -> Result<(), Fault> {
        self.reserve(self.sp + 1)?;
        self.stack[self.sp] = v;
        self.sp += 1;
        Ok(())
    }

    /// Pops the top of the stack. The frame header and anything below it are
    /// off limits.
    fn pop(&mut self) -> Result<i64, Fault> {
        if self.sp <= self.bp + FRAME_HEADER {
            return Err(Fault::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    /// Pops `b` then `a`, returning `(a, b)` in push order.
    fn pop_pair(&mut self) -> Result<(i64, i64), Fault> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    /// Base of the frame `level` static links out from the current one.
    ///
    /// Every hop must move strictly down the stack, and the main frame at
    /// base 0 has no enclosing frame.
    fn base(&self, level: usize) -> Result<usize, Fault> {
        let mut base = self.bp;
        for _ in 0..level {
            if base == 0 {
                return Err(Fault::BrokenStaticLink { level, base });
            }
            let link = self
                .stack
                .get(base + STATIC_LINK)
                .copied()
                .ok_or(Fault::AddressOutOfRange {
                    address: (base + STATIC_LINK) as i64,
                    sp: self.sp,
                })?;
            let next = to_address(link, self.sp)?;
            if next >= base {
                return Err(Fault::BrokenStaticLink { level, base });
            }
            base = next;
        }
        Ok(base)
    }

    /// Absolute index of variable `addr` in the frame `level` links out.
    fn slot(&self, level: usize, addr: usize) -> Result<usize, Fault> {
        let slot = self.base(level)? + addr;
        if slot >= self.sp {
            return Err(Fault::AddressOutOfRange {
                address: slot as i64,
                sp: self.sp,
            });
        }
        Ok(slot)
    }

    fn jump(&mut self, target: usize, len: usize) -> Result<(), Fault> {
        if target > len {
            return Err(Fault::JumpOutOfRange { target, len });
        }
        self.ip = target;
        Ok(())
    }
}

/// Interprets a stored link or return address as a stack or code index.
fn to_address(v: i64, sp: usize) -> Result<usize, Fault> {
    usize::try_from(v).map_err(|_| Fault::AddressOutOfRange { address: v, sp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn run_with(
        code: Vec<Instruction>,
        input: &[i64],
        config: VmConfig,
    ) -> Result<Vec<i64>, RuntimeError> {
        let program = Program::new(code);
        let mut input: VecDeque<i64> = input.iter().copied().collect();
        let mut output: Vec<i64> = Vec::new();
        Vm::with_config(config).run(&program, &mut input, &mut output)?;
        Ok(output)
    }

    fn run(code: Vec<Instruction>, input: &[i64]) -> Result<Vec<i64>, RuntimeError> {
        run_with(code, input, VmConfig::default())
    }

    fn fault(code: Vec<Instruction>) -> Fault {
        run(code, &[]).unwrap_err().fault
    }

    use Instruction::{Cal, Int, Jmp, Jpc, Lit, Lod, Red, Sto, Wrt};

    const RET: Instruction = Instruction::Opr(Opr::Ret);

    // =========================================================================
    // Arithmetic
    // =========================================================================

    fn binary(a: i64, op: Opr, b: i64) -> Result<Vec<i64>, RuntimeError> {
        run(
            vec![Int(3), Lit(a), Lit(b), Instruction::Opr(op), Wrt, RET],
            &[],
        )
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binary(7, Opr::Add, 5).unwrap(), vec![12]);
        assert_eq!(binary(7, Opr::Sub, 5).unwrap(), vec![2]);
        assert_eq!(binary(7, Opr::Mul, 5).unwrap(), vec![35]);
        assert_eq!(binary(7, Opr::Div, 2).unwrap(), vec![3]);
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        assert_eq!(binary(-7, Opr::Div, 2).unwrap(), vec![-3]);
        assert_eq!(binary(7, Opr::Div, -2).unwrap(), vec![-3]);
    }

    #[test]
    fn test_division_by_zero_faults() {
        let err = binary(1, Opr::Div, 0).unwrap_err();
        assert_eq!(err.fault, Fault::DivisionByZero);
        assert_eq!(err.ip, 3);
    }

    #[test]
    fn test_overflow_faults() {
        assert!(matches!(
            binary(i64::MAX, Opr::Add, 1).unwrap_err().fault,
            Fault::ArithmeticOverflow { op: "ADD" }
        ));
        assert!(matches!(
            binary(i64::MIN, Opr::Div, -1).unwrap_err().fault,
            Fault::ArithmeticOverflow { .. }
        ));
    }

    #[test]
    fn test_comparisons_push_one_or_zero() {
        assert_eq!(binary(1, Opr::Eq, 1).unwrap(), vec![1]);
        assert_eq!(binary(1, Opr::Ne, 1).unwrap(), vec![0]);
        assert_eq!(binary(1, Opr::Lt, 2).unwrap(), vec![1]);
        assert_eq!(binary(2, Opr::Ge, 2).unwrap(), vec![1]);
        assert_eq!(binary(2, Opr::Gt, 2).unwrap(), vec![0]);
        assert_eq!(binary(3, Opr::Le, 2).unwrap(), vec![0]);
    }

    #[test]
    fn test_unary_ops() {
        let out = run(
            vec![
                Int(3),
                Lit(5),
                Instruction::Opr(Opr::Neg),
                Wrt,
                Lit(-3),
                Instruction::Opr(Opr::Odd),
                Wrt,
                Lit(4),
                Instruction::Opr(Opr::Odd),
                Wrt,
                RET,
            ],
            &[],
        )
        .unwrap();
        assert_eq!(out, vec![-5, 1, 0]);
    }

    // =========================================================================
    // Control flow and frames
    // =========================================================================

    #[test]
    fn test_jpc_jumps_on_zero_only() {
        let out = run(
            vec![
                Int(3),
                Lit(0),
                Jpc(5),
                Lit(1),
                Wrt,
                Lit(1),
                Jpc(9),
                Lit(2),
                Wrt,
                RET,
            ],
            &[],
        )
        .unwrap();
        assert_eq!(out, vec![2]);
    }

    #[test]
    fn test_variables_start_at_zero() {
        let out = run(
            vec![Int(5), Lod { level: 0, addr: 4 }, Wrt, RET],
            &[],
        )
        .unwrap();
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_call_and_return() {
        // procedure at 1 writes x + 1 through the static link; main writes x after
        let out = run(
            vec![
                Jmp(7),
                Int(3),
                Lod { level: 1, addr: 3 },
                Lit(1),
                Instruction::Opr(Opr::Add),
                Sto { level: 1, addr: 3 },
                RET,
                Int(4),
                Lit(10),
                Sto { level: 0, addr: 3 },
                Cal { level: 0, target: 1 },
                Cal { level: 0, target: 1 },
                Lod { level: 0, addr: 3 },
                Wrt,
                RET,
            ],
            &[],
        )
        .unwrap();
        assert_eq!(out, vec![12]);
    }

    #[test]
    fn test_return_restores_stack() {
        let program = Program::new(vec![
            Jmp(3),
            Int(5),
            RET,
            Int(4),
            Cal { level: 0, target: 1 },
            RET,
        ]);
        let mut vm = Vm::new();
        vm.run(&program, &mut VecDeque::<i64>::new(), &mut Vec::<i64>::new())
            .unwrap();
        assert_eq!(vm.stack().len(), 4);
        assert_eq!(vm.steps(), 6);
    }

    #[test]
    fn test_run_off_end_halts() {
        let out = run(vec![Int(3), Lit(9), Wrt], &[]).unwrap();
        assert_eq!(out, vec![9]);
    }

    // =========================================================================
    // I/O
    // =========================================================================

    #[test]
    fn test_read_then_write() {
        let out = run(
            vec![
                Int(4),
                Red,
                Sto { level: 0, addr: 3 },
                Lod { level: 0, addr: 3 },
                Lod { level: 0, addr: 3 },
                Instruction::Opr(Opr::Mul),
                Wrt,
                RET,
            ],
            &[6],
        )
        .unwrap();
        assert_eq!(out, vec![36]);
    }

    #[test]
    fn test_read_exhausted_faults() {
        assert_eq!(fault(vec![Int(3), Red, Wrt]), Fault::InputExhausted);
    }

    // =========================================================================
    // Faults and limits
    // =========================================================================

    #[test]
    fn test_underflow() {
        assert_eq!(fault(vec![Int(3), Wrt]), Fault::StackUnderflow);
    }

    #[test]
    fn test_address_past_top() {
        assert!(matches!(
            fault(vec![Int(3), Lod { level: 0, addr: 7 }]),
            Fault::AddressOutOfRange { address: 7, .. }
        ));
    }

    #[test]
    fn test_program_verified_before_run() {
        assert!(matches!(fault(vec![Int(3), Jmp(9)]), Fault::InvalidProgram(_)));
        assert!(matches!(fault(vec![]), Fault::InvalidProgram(_)));
    }

    #[test]
    fn test_step_limit() {
        let config = VmConfig {
            max_steps: Some(50),
            ..VmConfig::default()
        };
        let err = run_with(vec![Int(3), Jmp(1)], &[], config).unwrap_err();
        assert_eq!(err.fault, Fault::StepLimitExceeded { limit: 50 });
    }

    #[test]
    fn test_unbounded_recursion_hits_call_depth() {
        let code = vec![
            Jmp(3),
            Int(3),
            Cal { level: 1, target: 1 },
            Int(3),
            Cal { level: 0, target: 1 },
        ];
        let err = run(code, &[]).unwrap_err();
        assert_eq!(err.fault, Fault::CallDepthExceeded { limit: 1000 });
        assert_eq!(err.call_stack.len(), 1000);
        assert!(err.call_stack.iter().all(|&entry| entry == 1));
    }

    #[test]
    fn test_level_past_main_frame_faults() {
        let code = vec![
            Int(4),
            Lit(7),
            Sto { level: 0, addr: 3 },
            Lod { level: 5, addr: 3 },
            Wrt,
        ];
        assert_eq!(fault(code), Fault::BrokenStaticLink { level: 5, base: 0 });
    }

    #[test]
    fn test_huge_level_faults_on_first_hop() {
        let config = VmConfig {
            max_steps: Some(10),
            ..VmConfig::default()
        };
        let err = run_with(
            vec![Int(4), Lod { level: 9_000_000_000, addr: 3 }, Wrt],
            &[],
            config,
        )
        .unwrap_err();
        assert_eq!(err.ip, 1);
        assert!(matches!(err.fault, Fault::BrokenStaticLink { base: 0, .. }));
    }

    #[test]
    fn test_static_link_must_point_down_the_stack() {
        // the procedure overwrites its own static link with its own base
        let code = vec![
            Jmp(7),
            Int(3),
            Lit(4),
            Sto { level: 1, addr: 4 },
            Lod { level: 1, addr: 3 },
            Wrt,
            RET,
            Int(4),
            Cal { level: 0, target: 1 },
            RET,
        ];
        let err = run(code, &[]).unwrap_err();
        assert_eq!(err.ip, 4);
        assert_eq!(err.fault, Fault::BrokenStaticLink { level: 1, base: 4 });
    }

    #[test]
    fn test_call_into_unreserved_frame_rejected() {
        let code = vec![
            Jmp(3),
            Lit(5),
            RET,
            Int(4),
            Cal { level: 0, target: 1 },
            RET,
        ];
        assert!(matches!(fault(code), Fault::InvalidProgram(_)));
    }

    #[test]
    fn test_stack_limit() {
        let config = VmConfig {
            max_stack_size: 16,
            ..VmConfig::default()
        };
        let err = run_with(vec![Int(3), Lit(1), Jmp(1)], &[], config).unwrap_err();
        assert_eq!(err.fault, Fault::StackOverflow { limit: 16 });
    }
}
