//! Tablas de símbolos.
//!
//! Durante la compilación de una clase existen exactamente dos
//! ámbitos vivos: el de la clase, que dura toda la compilación, y el
//! de la subrutina en curso, que se recrea para cada subrutina. La
//! búsqueda de un nombre consulta primero el ámbito de subrutina y
//! luego el de clase, de modo que el primero oculta al segundo.

use std::collections::HashMap;
use thiserror::Error;

use crate::vm::{Instruction, Segment};

/// Clase de declaración de una variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Static,
    Field,
    Argument,
    Var,
}

impl Kind {
    /// Segmento de memoria en el que viven las variables de esta clase.
    pub fn segment(self) -> Segment {
        match self {
            Kind::Static => Segment::Static,
            Kind::Field => Segment::This,
            Kind::Argument => Segment::Argument,
            Kind::Var => Segment::Local,
        }
    }

    fn is_class_level(self) -> bool {
        matches!(self, Kind::Static | Kind::Field)
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("`{0}` is already declared in this scope")]
    Redeclared(String),
}

/// Una variable declarada.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    typ: String,
    segment: Segment,
    index: u16,
}

impl Symbol {
    /// Tipo declarado, sea primitivo o un nombre de clase.
    pub fn typ(&self) -> &str {
        &self.typ
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    /// Instrucción que empuja el valor de esta variable.
    pub fn push(&self) -> Instruction {
        Instruction::Push(self.segment, self.index)
    }

    /// Instrucción que almacena la cima de la pila en esta variable.
    pub fn pop(&self) -> Instruction {
        Instruction::Pop(self.segment, self.index)
    }
}

/// Un ámbito: asociación de nombres a símbolos.
///
/// Los índices de cada segmento son contiguos, inician en cero y se
/// asignan en orden de declaración.
#[derive(Debug, Default)]
pub struct Scope {
    symbols: HashMap<String, Symbol>,
    counts: HashMap<Segment, u16>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declara una variable y le asigna el siguiente índice libre de su segmento.
    pub fn declare(&mut self, name: &str, typ: &str, kind: Kind) -> Result<&Symbol, SymbolError> {
        if self.symbols.contains_key(name) {
            return Err(SymbolError::Redeclared(name.to_owned()));
        }

        let segment = kind.segment();
        let count = self.counts.entry(segment).or_insert(0);
        let symbol = Symbol {
            typ: typ.to_owned(),
            segment,
            index: *count,
        };

        *count += 1;
        Ok(self.symbols.entry(name.to_owned()).or_insert(symbol))
    }

    /// Busca un nombre únicamente en este ámbito.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Cantidad de símbolos declarados en un segmento.
    pub fn count_of(&self, segment: Segment) -> u16 {
        self.counts.get(&segment).copied().unwrap_or(0)
    }
}

/// Los dos ámbitos vivos durante la compilación de una clase.
#[derive(Debug, Default)]
pub struct Scopes {
    class: Scope,
    subroutine: Scope,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descarta el ámbito de subrutina anterior y crea uno vacío.
    pub fn open_subroutine(&mut self) {
        self.subroutine = Scope::new();
    }

    /// Descarta el ámbito de subrutina al terminar su cuerpo.
    pub fn close_subroutine(&mut self) {
        self.subroutine = Scope::new();
    }

    /// Declara una variable en el ámbito que corresponde a su clase:
    /// `static` y `field` en el de clase, argumentos y locales en el
    /// de subrutina.
    pub fn declare(&mut self, name: &str, typ: &str, kind: Kind) -> Result<&Symbol, SymbolError> {
        let scope = if kind.is_class_level() {
            &mut self.class
        } else {
            &mut self.subroutine
        };

        scope.declare(name, typ, kind)
    }

    /// Resuelve un nombre, primero en la subrutina y luego en la clase.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.subroutine
            .lookup(name)
            .or_else(|| self.class.lookup(name))
    }

    pub fn class(&self) -> &Scope {
        &self.class
    }

    pub fn subroutine(&self) -> &Scope {
        &self.subroutine
    }
}
