//! Simulador de la máquina virtual objetivo.
//!
//! # Propósito
//! El compilador emite código para una máquina de pila que no existe
//! como hardware. Esta biblioteca la implementa en software con tal
//! de poder ejecutar programas compilados y verificar su
//! comportamiento observable, en particular desde pruebas.
//!
//! # Memoria
//! La RAM es un arreglo de palabras de 16 bits con signo:
//!
//! | Dirección    | Uso                                   |
//! |--------------|---------------------------------------|
//! | 0..=4        | `SP`, `LCL`, `ARG`, `THIS`, `THAT`    |
//! | 5..=12       | segmento `temp`                       |
//! | 16..=255     | variables `static`, por clase         |
//! | 256..=2047   | pila                                  |
//! | 2048..       | heap                                  |
//!
//! Los marcos de llamada (dirección de retorno y registros salvados)
//! se mantienen fuera de la RAM, por lo que un programa no puede
//! corromperlos.
//!
//! # Sistema operativo
//! Las llamadas a funciones que ningún archivo cargado define se
//! resuelven contra un pequeño conjunto de builtins, descritos en
//! [`builtin`]. Toda salida de texto se captura y puede consultarse
//! con [`Machine::output()`].

use thiserror::Error;

pub mod builtin;

mod machine;
mod program;

pub use machine::Machine;
pub use program::Program;

#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Malformed instruction at line {line}: `{text}`")]
    Syntax { line: usize, text: String },

    #[error("Function `{0}` is defined more than once")]
    DuplicateFunction(String),

    #[error("Class `{0}` is loaded more than once")]
    DuplicateClass(String),

    #[error("Label `{label}` is not defined in `{function}`")]
    UnknownLabel { function: String, label: String },

    #[error("Instruction at line {0} is outside of any function")]
    Orphan(usize),

    #[error("No function named `{0}`")]
    UnknownFunction(String),

    #[error("`{function}` expects {expected} argument(s), {found} given")]
    Arity {
        function: String,
        expected: u16,
        found: u16,
    },

    #[error("Memory access out of range: {0}")]
    Segfault(i32),

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Heap exhausted")]
    OutOfMemory,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("String at {0} is full")]
    StringFull(i16),

    #[error("Execution exceeded {0} steps")]
    StepLimit(u64),
}
