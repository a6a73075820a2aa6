//! Carga de código en forma textual.
//!
//! Cada llamada a [`Program::load()`] recibe el listado de una o más
//! clases completas. Las etiquetas se resuelven dentro de la función
//! que las declara y las variables `static` de cada clase reciben
//! direcciones fijas y disjuntas. Las llamadas se resuelven por nombre
//! hasta el momento de ejecutarlas, por lo que el orden de carga de
//! las clases no importa.

use std::{collections::HashMap, rc::Rc};

use log::debug;

use crate::RuntimeError;

pub(crate) const TEMP: u16 = 5;
pub(crate) const STATIC: u16 = 16;
pub(crate) const STACK: u16 = 256;

/// Registros base de los segmentos relativos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Register {
    Sp = 0,
    Lcl = 1,
    Arg = 2,
    This = 3,
    That = 4,
}

/// Operando de `push` o `pop` con su segmento ya resuelto.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    Constant(i16),
    Fixed(u16),
    Relative(Register, u16),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Arith {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Push(Slot),
    Pop(Slot),
    Arith(Arith),
    Jump(usize),
    JumpIf(usize),
    Call(Rc<str>, u16),
    Function(u16),
    Return,
}

/// Clases cargadas y listas para ejecutarse.
#[derive(Default)]
pub struct Program {
    pub(crate) code: Vec<Op>,
    pub(crate) functions: HashMap<Rc<str>, usize>,
    classes: Vec<String>,
    next_static: u16,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construye un programa a partir de varios listados.
    pub fn link<I, S>(listings: I) -> Result<Self, RuntimeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut program = Program::new();
        for listing in listings {
            program.load(listing.as_ref())?;
        }

        Ok(program)
    }

    /// Agrega un listado. Si falla, el programa queda sin cambios.
    pub fn load(&mut self, text: &str) -> Result<(), RuntimeError> {
        let lines = parse(text)?;

        let mut position = self.code.len();
        let mut functions = Vec::new();
        let mut labels = HashMap::new();
        let mut statics: Vec<(&str, u16)> = Vec::new();

        for line in &lines {
            match line.raw {
                Raw::Label(label) => {
                    labels.insert((line.function, label), position);
                    continue;
                }

                Raw::Function(name, _) => {
                    let taken = self.functions.contains_key(name)
                        || functions.iter().any(|&(other, _)| other == name);

                    if taken {
                        return Err(RuntimeError::DuplicateFunction(name.to_owned()));
                    }

                    functions.push((name, position));
                }

                Raw::Push("static", index) | Raw::Pop("static", index) => {
                    let class = class_of(line.function);
                    match statics.iter_mut().find(|(other, _)| *other == class) {
                        Some((_, count)) => *count = (*count).max(index + 1),
                        None => statics.push((class, index + 1)),
                    }
                }

                _ => (),
            }

            position += 1;
        }

        let mut classes: Vec<&str> = Vec::new();
        for &(function, _) in &functions {
            let class = class_of(function);
            if self.classes.iter().any(|other| other == class) {
                return Err(RuntimeError::DuplicateClass(class.to_owned()));
            } else if !classes.contains(&class) {
                classes.push(class);
            }
        }

        let mut next_static = self.next_static;
        let mut bases = HashMap::new();
        for (class, count) in statics {
            bases.insert(class, STATIC + next_static);
            next_static += count;
        }

        if STATIC + next_static > STACK {
            return Err(RuntimeError::Segfault((STATIC + next_static).into()));
        }

        let mut code = Vec::with_capacity(position - self.code.len());
        for line in &lines {
            let op = match line.raw {
                Raw::Label(_) => continue,
                Raw::Push(segment, index) => Op::Push(line.slot(segment, index, &bases)?),
                Raw::Pop(segment, index) => match line.slot(segment, index, &bases)? {
                    Slot::Constant(_) => return Err(line.syntax()),
                    slot => Op::Pop(slot),
                },

                Raw::Arith(op) => Op::Arith(op),
                Raw::Goto(label) => Op::Jump(target(&labels, line.function, label)?),
                Raw::IfGoto(label) => Op::JumpIf(target(&labels, line.function, label)?),
                Raw::Call(name, arguments) => Op::Call(Rc::from(name), arguments),
                Raw::Function(_, locals) => Op::Function(locals),
                Raw::Return => Op::Return,
            };

            code.push(op);
        }

        for class in classes {
            debug!("Loaded class {}", class);
            self.classes.push(class.to_owned());
        }

        self.code.extend(code);
        self.functions
            .extend(functions.into_iter().map(|(name, entry)| (Rc::from(name), entry)));

        self.next_static = next_static;
        Ok(())
    }
}

/// Instrucción leída pero aún sin resolver.
#[derive(Copy, Clone)]
enum Raw<'a> {
    Push(&'a str, u16),
    Pop(&'a str, u16),
    Arith(Arith),
    Label(&'a str),
    Goto(&'a str),
    IfGoto(&'a str),
    Call(&'a str, u16),
    Function(&'a str, u16),
    Return,
}

struct Line<'a> {
    number: usize,
    text: &'a str,
    function: &'a str,
    raw: Raw<'a>,
}

impl Line<'_> {
    fn syntax(&self) -> RuntimeError {
        RuntimeError::Syntax {
            line: self.number,
            text: self.text.to_owned(),
        }
    }

    fn slot(&self, segment: &str, index: u16, statics: &HashMap<&str, u16>) -> Result<Slot, RuntimeError> {
        let slot = match segment {
            "constant" if index <= i16::MAX as u16 => Slot::Constant(index as i16),
            "argument" => Slot::Relative(Register::Arg, index),
            "local" => Slot::Relative(Register::Lcl, index),
            "this" => Slot::Relative(Register::This, index),
            "that" => Slot::Relative(Register::That, index),
            "pointer" if index < 2 => Slot::Fixed(Register::This as u16 + index),
            "temp" if index < 8 => Slot::Fixed(TEMP + index),
            "static" => match statics.get(class_of(self.function)) {
                Some(base) => Slot::Fixed(base + index),
                None => return Err(self.syntax()),
            },

            _ => return Err(self.syntax()),
        };

        Ok(slot)
    }
}

fn parse(text: &str) -> Result<Vec<Line<'_>>, RuntimeError> {
    let mut lines = Vec::new();
    let mut function = None;

    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        let code = line.split("//").next().unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }

        let syntax = || RuntimeError::Syntax {
            line: number,
            text: code.to_owned(),
        };

        let count = |count: &str| count.parse::<u16>().map_err(|_| syntax());

        let words: Vec<&str> = code.split_whitespace().collect();
        let raw = match words.as_slice() {
            ["push", segment, index] => Raw::Push(*segment, count(index)?),
            ["pop", segment, index] => Raw::Pop(*segment, count(index)?),
            ["label", label] => Raw::Label(*label),
            ["goto", label] => Raw::Goto(*label),
            ["if-goto", label] => Raw::IfGoto(*label),
            ["call", name, arguments] => Raw::Call(*name, count(arguments)?),
            ["return"] => Raw::Return,

            ["function", name, locals] => {
                function = Some(*name);
                Raw::Function(*name, count(locals)?)
            }

            [op] => Raw::Arith(arith(op).ok_or_else(syntax)?),
            _ => return Err(syntax()),
        };

        lines.push(Line {
            number,
            text: code,
            function: function.ok_or(RuntimeError::Orphan(number))?,
            raw,
        });
    }

    Ok(lines)
}

fn arith(op: &str) -> Option<Arith> {
    use Arith::*;

    let op = match op {
        "add" => Add,
        "sub" => Sub,
        "neg" => Neg,
        "eq" => Eq,
        "gt" => Gt,
        "lt" => Lt,
        "and" => And,
        "or" => Or,
        "not" => Not,
        _ => return None,
    };

    Some(op)
}

fn target<'a>(
    labels: &HashMap<(&'a str, &'a str), usize>,
    function: &'a str,
    label: &'a str,
) -> Result<usize, RuntimeError> {
    labels
        .get(&(function, label))
        .copied()
        .ok_or_else(|| RuntimeError::UnknownLabel {
            function: function.to_owned(),
            label: label.to_owned(),
        })
}

/// `Clase.funcion` => `Clase`
fn class_of(function: &str) -> &str {
    function.split('.').next().unwrap_or(function)
}
