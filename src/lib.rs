//! Compilador de Jack a código de máquina virtual.
//!
//! # Fases
//! Cada clase deriva de un único archivo de código fuente. Primero se
//! remueven comentarios en [`strip`], conservando una línea de salida
//! por cada línea original. Las líneas resultantes se someten a
//! análisis léxico en [`lex`], de lo cual se obtiene un flujo de tokens.
//!
//! El flujo de tokens se consume en [`compile`] por un único parser
//! descendente recursivo que resuelve nombres contra las tablas de
//! [`symbols`] y emite instrucciones de [`vm`] conforme avanza. No
//! existe árbol sintáctico ni representación intermedia.
//!
//! # Archivos
//! [`driver`] descubre archivos fuente, compila cada uno de forma
//! independiente y escribe un listado `.vm` por clase. Los errores de
//! cualquier fase se reportan con ubicación por medio de [`error`].

#[macro_use]
mod macros;

pub mod compile;
pub mod driver;
pub mod error;
pub mod lex;
pub mod source;
pub mod strip;
pub mod symbols;
pub mod vm;
