//! Código de máquina virtual.
//!
//! La salida del compilador es una secuencia de instrucciones para
//! una máquina de pila con segmentos de memoria con nombre. Cada
//! instrucción se emite en orden y nunca se reescribe; su forma
//! textual es de una instrucción por línea.

use std::{
    fmt::{self, Display},
    io::{self, Write},
};

/// Segmento de memoria de la máquina virtual.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    This,
    That,
    Pointer,
    Temp,
}

impl Display for Segment {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Segment::*;
        let string = match self {
            Constant => "constant",
            Argument => "argument",
            Local    => "local",
            Static   => "static",
            This     => "this",
            That     => "that",
            Pointer  => "pointer",
            Temp     => "temp",
        };

        fmt.write_str(string)
    }
}

/// Operación aritmética o lógica sobre la cima de la pila.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithOp {
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

impl Display for ArithOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ArithOp::*;
        let string = match self {
            Add => "add",
            Sub => "sub",
            Neg => "neg",
            Eq  => "eq",
            Gt  => "gt",
            Lt  => "lt",
            And => "and",
            Or  => "or",
            Not => "not",
        };

        fmt.write_str(string)
    }
}

/// Etiqueta de salto.
///
/// El número proviene de uno de dos contadores que avanzan a lo
/// largo de toda una clase, por lo cual ninguna etiqueta se repite
/// dentro de un mismo archivo de salida.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Label {
    WhileExp(u32),
    WhileEnd(u32),
    IfTrue(u32),
    IfFalse(u32),
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::WhileExp(n) => write!(fmt, "WHILE_EXP{}", n),
            Label::WhileEnd(n) => write!(fmt, "WHILE_END{}", n),
            Label::IfTrue(n) => write!(fmt, "IF_TRUE{}", n),
            Label::IfFalse(n) => write!(fmt, "IF_FALSE{}", n),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Push(Segment, u16),
    Pop(Segment, u16),
    Arithmetic(ArithOp),
    SetLabel(Label),
    Jump(Label),
    JumpIf(Label),
    Call { target: String, arguments: u16 },
    Function { name: String, locals: u16 },
    Return,
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            Push(segment, index) => write!(fmt, "push {} {}", segment, index),
            Pop(segment, index) => write!(fmt, "pop {} {}", segment, index),
            Arithmetic(op) => write!(fmt, "{}", op),
            SetLabel(label) => write!(fmt, "label {}", label),
            Jump(label) => write!(fmt, "goto {}", label),
            JumpIf(label) => write!(fmt, "if-goto {}", label),
            Call { target, arguments } => write!(fmt, "call {} {}", target, arguments),
            Function { name, locals } => write!(fmt, "function {} {}", name, locals),
            Return => fmt.write_str("return"),
        }
    }
}

/// Escribe un listado de instrucciones, una por línea.
pub fn write<W: Write>(code: &[Instruction], output: &mut W) -> io::Result<()> {
    for instruction in code {
        writeln!(output, "{}", instruction)?;
    }

    Ok(())
}
