//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de posiciones o rangos de ubicaciones en
//! el código fuente original, lo cual permite determinar un punto
//! exacto o aproximado en donde ocurre un error.

use std::{
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    ops::Range,
    rc::Rc,
};

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Construye una ubicación dentro de una única línea.
    ///
    /// Las columnas inician en 1 y el final del rango es exclusivo.
    pub fn new(from: Rc<Source>, line: u32, columns: Range<u32>) -> Self {
        let end = columns.end.max(columns.start + 1);
        Location {
            from,
            position: Position {
                line,
                column: columns.start,
            }..Position { line, column: end },
        }
    }

    /// Ubicación que corresponde al final del código fuente.
    pub fn eof(from: Rc<Source>) -> Self {
        let line = from.lines.len().max(1) as u32;
        let column = from
            .lines
            .last()
            .map(|last| last.chars().count() as u32 + 1)
            .unwrap_or(1);

        Location::new(from, line, column..column + 1)
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Obtiene el origen de esta ubicación.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end == start.advance() {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column - 1,
        }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen y líneas originales de un archivo fuente.
///
/// Las líneas se conservan tal cual fueron leídas, antes de remover
/// comentarios, para que los diagnósticos puedan citarlas.
pub struct Source {
    name: String,
    lines: Vec<String>,
}

impl Source {
    /// Construye un origen a partir de texto en memoria.
    pub fn new<S: Into<String>>(name: S, text: &str) -> Rc<Self> {
        Rc::new(Source {
            name: name.into(),
            lines: text.lines().map(String::from).collect(),
        })
    }

    /// Lee por completo un flujo de entrada, línea por línea.
    pub fn read<R, S>(reader: R, name: S) -> io::Result<Rc<Self>>
    where
        R: BufRead,
        S: Into<String>,
    {
        let lines = reader.lines().collect::<io::Result<Vec<_>>>()?;
        Ok(Rc::new(Source {
            name: name.into(),
            lines,
        }))
    }

    /// Líneas originales.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Invoca a `callback` con el contenido de una línea, iniciando en 1.
    ///
    /// Las líneas inexistentes se observan como vacías.
    pub fn with_line<F, R>(&self, line_number: u32, callback: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let line = (line_number as usize)
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
            .unwrap_or("");

        callback(line)
    }
}
