//! Ejecución.

use log::trace;

use crate::{
    builtin,
    program::{Arith, Op, Program, Register, Slot, STACK},
    RuntimeError,
};

const RAM_SIZE: usize = 32768;
const HEAP: u16 = 2048;
const MAX_DEPTH: usize = 1024;
const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

/// Estado salvado por una llamada.
struct Frame {
    /// `None` si la llamada proviene del host.
    ret: Option<usize>,
    lcl: i16,
    arg: i16,
    this: i16,
    that: i16,
}

/// Una máquina con un programa cargado.
pub struct Machine {
    program: Program,
    ram: Vec<i16>,
    frames: Vec<Frame>,
    heap: u16,
    output: String,
    step_limit: u64,
    halted: bool,
}

impl Machine {
    pub fn new(program: Program) -> Self {
        let mut ram = vec![0; RAM_SIZE];
        ram[Register::Sp as usize] = STACK as i16;

        Machine {
            program,
            ram,
            frames: Vec::new(),
            heap: HEAP,
            output: String::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            halted: false,
        }
    }

    /// Limita la cantidad de instrucciones que puede ejecutar una llamada.
    pub fn with_step_limit(self, step_limit: u64) -> Self {
        Machine { step_limit, ..self }
    }

    /// Texto emitido por el programa hasta el momento.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Ejecuta una función hasta que retorne y obtiene su valor de retorno.
    ///
    /// El heap y la salida se conservan entre llamadas. La pila se
    /// reinicia al comenzar cada llamada.
    pub fn call(&mut self, function: &str, arguments: &[i16]) -> Result<i16, RuntimeError> {
        self.frames.clear();
        self.halted = false;
        self.set(Register::Sp, STACK as i16);

        for &argument in arguments {
            self.push(argument)?;
        }

        let mut pc = match self.invoke(function, arguments.len() as u16, None)? {
            Some(pc) => pc,
            None => return self.finish(),
        };

        let mut steps = 0;
        loop {
            steps += 1;
            if steps > self.step_limit {
                return Err(RuntimeError::StepLimit(self.step_limit));
            }

            let op = match self.program.code.get(pc) {
                Some(op) => op.clone(),
                None => return Err(RuntimeError::Segfault(pc as i32)),
            };

            let next = match op {
                Op::Push(slot) => {
                    let value = self.load(slot)?;
                    self.push(value)?;
                    pc + 1
                }

                Op::Pop(slot) => {
                    let value = self.pop()?;
                    self.store(slot, value)?;
                    pc + 1
                }

                Op::Arith(op) => {
                    self.arith(op)?;
                    pc + 1
                }

                Op::Jump(target) => target,

                Op::JumpIf(target) => {
                    if self.pop()? != 0 {
                        target
                    } else {
                        pc + 1
                    }
                }

                Op::Call(name, arguments) => match self.invoke(&name, arguments, Some(pc + 1))? {
                    Some(_) if self.halted => return self.finish(),
                    Some(next) => next,
                    None => return self.finish(),
                },

                Op::Function(locals) => {
                    let sp = self.get(Register::Sp);
                    self.set(Register::Lcl, sp);

                    for _ in 0..locals {
                        self.push(0)?;
                    }

                    pc + 1
                }

                Op::Return => {
                    let value = self.pop()?;
                    let arg = self.get(Register::Arg);

                    let frame = match self.frames.pop() {
                        Some(frame) => frame,
                        None => return Ok(value),
                    };

                    self.set(Register::Sp, arg);
                    self.set(Register::Lcl, frame.lcl);
                    self.set(Register::Arg, frame.arg);
                    self.set(Register::This, frame.this);
                    self.set(Register::That, frame.that);
                    self.push(value)?;

                    match frame.ret {
                        Some(ret) => ret,
                        None => return self.finish(),
                    }
                }
            };

            pc = next;
        }
    }

    /// Inicia una llamada con `arguments` valores ya en la pila.
    ///
    /// Retorna la siguiente instrucción a ejecutar, o `None` si la
    /// llamada terminó y el control vuelve al host.
    fn invoke(&mut self, name: &str, arguments: u16, ret: Option<usize>) -> Result<Option<usize>, RuntimeError> {
        let sp = self.get(Register::Sp);
        let arg = sp - arguments as i16;

        if let Some(&entry) = self.program.functions.get(name) {
            trace!("call {} {}", name, arguments);

            if self.frames.len() >= MAX_DEPTH {
                return Err(RuntimeError::StackOverflow);
            }

            self.frames.push(Frame {
                ret,
                lcl: self.get(Register::Lcl),
                arg: self.get(Register::Arg),
                this: self.get(Register::This),
                that: self.get(Register::That),
            });

            self.set(Register::Arg, arg);
            return Ok(Some(entry));
        }

        let builtin = builtin::lookup(name).ok_or_else(|| RuntimeError::UnknownFunction(name.to_owned()))?;
        if builtin.arity() != arguments {
            return Err(RuntimeError::Arity {
                function: name.to_owned(),
                expected: builtin.arity(),
                found: arguments,
            });
        }

        let values = (0..arguments)
            .map(|index| self.read(i32::from(arg) + i32::from(index)))
            .collect::<Result<Vec<_>, _>>()?;

        self.set(Register::Sp, arg);
        let value = builtin.run(self, &values)?;
        self.push(value)?;

        Ok(ret)
    }

    fn finish(&mut self) -> Result<i16, RuntimeError> {
        if self.halted {
            Ok(0)
        } else {
            self.pop()
        }
    }

    fn arith(&mut self, op: Arith) -> Result<(), RuntimeError> {
        let truth = |condition: bool| if condition { -1 } else { 0 };

        let value = match op {
            Arith::Neg => self.pop()?.wrapping_neg(),
            Arith::Not => !self.pop()?,
            binary => {
                let y = self.pop()?;
                let x = self.pop()?;

                match binary {
                    Arith::Add => x.wrapping_add(y),
                    Arith::Sub => x.wrapping_sub(y),
                    Arith::And => x & y,
                    Arith::Or => x | y,
                    Arith::Eq => truth(x == y),
                    Arith::Gt => truth(x > y),
                    Arith::Lt => truth(x < y),
                    Arith::Neg | Arith::Not => unreachable!(),
                }
            }
        };

        self.push(value)
    }

    fn address(&self, slot: Slot) -> i32 {
        match slot {
            Slot::Fixed(address) => address.into(),
            Slot::Relative(register, offset) => i32::from(self.get(register)) + i32::from(offset),
            Slot::Constant(_) => unreachable!("constants have no address"),
        }
    }

    fn load(&self, slot: Slot) -> Result<i16, RuntimeError> {
        match slot {
            Slot::Constant(value) => Ok(value),
            slot => self.read(self.address(slot)),
        }
    }

    fn store(&mut self, slot: Slot, value: i16) -> Result<(), RuntimeError> {
        self.write(self.address(slot), value)
    }

    fn push(&mut self, value: i16) -> Result<(), RuntimeError> {
        let sp = self.get(Register::Sp);
        if sp >= HEAP as i16 {
            return Err(RuntimeError::StackOverflow);
        }

        self.write(sp.into(), value)?;
        self.set(Register::Sp, sp + 1);
        Ok(())
    }

    fn pop(&mut self) -> Result<i16, RuntimeError> {
        let sp = self.get(Register::Sp) - 1;
        if sp < STACK as i16 {
            return Err(RuntimeError::Segfault(sp.into()));
        }

        self.set(Register::Sp, sp);
        self.read(sp.into())
    }

    fn get(&self, register: Register) -> i16 {
        self.ram[register as usize]
    }

    fn set(&mut self, register: Register, value: i16) {
        self.ram[register as usize] = value;
    }

    pub(crate) fn read(&self, address: i32) -> Result<i16, RuntimeError> {
        usize::try_from(address)
            .ok()
            .and_then(|index| self.ram.get(index))
            .copied()
            .ok_or(RuntimeError::Segfault(address))
    }

    pub(crate) fn write(&mut self, address: i32, value: i16) -> Result<(), RuntimeError> {
        let word = usize::try_from(address)
            .ok()
            .and_then(|index| self.ram.get_mut(index))
            .ok_or(RuntimeError::Segfault(address))?;

        *word = value;
        Ok(())
    }

    /// Reserva `size` palabras del heap y retorna su dirección base.
    pub(crate) fn alloc(&mut self, size: i16) -> Result<i16, RuntimeError> {
        let size = u16::try_from(size).map_err(|_| RuntimeError::OutOfMemory)?;
        let base = self.heap;

        match base.checked_add(size) {
            Some(end) if usize::from(end) <= RAM_SIZE => {
                self.heap = end;
                Ok(base as i16)
            }

            _ => Err(RuntimeError::OutOfMemory),
        }
    }

    pub(crate) fn print(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub(crate) fn halt(&mut self) {
        self.halted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(listings: &[&str], function: &str, arguments: &[i16]) -> Result<(i16, String), RuntimeError> {
        let mut machine = Machine::new(Program::link(listings)?);
        let value = machine.call(function, arguments)?;
        Ok((value, machine.output().to_owned()))
    }

    #[test]
    fn arithmetic_and_comparisons() {
        let listing = "function A.f 0
            push argument 0
            push argument 1
            sub
            push constant 3
            gt
            not
            return";

        assert_eq!(run(&[listing], "A.f", &[9, 2]), Ok((0, String::new())));
        assert_eq!(run(&[listing], "A.f", &[1, 2]), Ok((-1, String::new())));
    }

    #[test]
    fn calls_restore_frames() {
        let double = "function B.double 1
            push argument 0
            pop local 0
            push local 0
            push local 0
            add
            return";

        let main = "function A.main 1
            push constant 5
            pop local 0
            push constant 7
            call B.double 1
            push local 0
            add
            return";

        assert_eq!(run(&[main, double], "A.main", &[]).unwrap().0, 19);
    }

    #[test]
    fn loops() {
        let sum = "function A.sum 1
            label LOOP
            push argument 0
            push constant 0
            eq
            if-goto END
            push local 0
            push argument 0
            add
            pop local 0
            push argument 0
            push constant 1
            sub
            pop argument 0
            goto LOOP
            label END
            push local 0
            return";

        assert_eq!(run(&[sum], "A.sum", &[10]).unwrap().0, 55);
    }

    #[test]
    fn builtins() {
        let main = "function A.main 0
            push constant 6
            push constant 7
            call Math.multiply 2
            call Output.printInt 1
            pop temp 0
            push constant 2
            call String.new 1
            push constant 79
            call String.appendChar 2
            push constant 75
            call String.appendChar 2
            call Output.printString 1
            pop temp 0
            call Sys.halt 0
            push constant 1
            call Output.printInt 1
            return";

        assert_eq!(run(&[main], "A.main", &[]), Ok((0, "42OK".into())));
    }

    #[test]
    fn failures() {
        let missing = "function A.f 0\ncall A.g 0\nreturn";
        assert_eq!(
            run(&[missing], "A.f", &[]),
            Err(RuntimeError::UnknownFunction("A.g".into()))
        );

        let arity = "function A.f 0\ncall Math.divide 1\nreturn";
        assert!(matches!(run(&[arity], "A.f", &[]), Err(RuntimeError::Arity { expected: 2, .. })));

        let divide = "function A.f 0\npush constant 1\npush constant 0\ncall Math.divide 2\nreturn";
        assert_eq!(run(&[divide], "A.f", &[]), Err(RuntimeError::DivisionByZero));

        let forever = "function A.f 0\nlabel X\ngoto X";
        let mut machine = Machine::new(Program::link([forever]).unwrap()).with_step_limit(100);
        assert_eq!(machine.call("A.f", &[]), Err(RuntimeError::StepLimit(100)));

        let recursive = "function A.f 0\ncall A.f 0\nreturn";
        assert_eq!(run(&[recursive], "A.f", &[]), Err(RuntimeError::StackOverflow));
    }
}
