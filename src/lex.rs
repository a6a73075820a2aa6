//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone cada línea de
//! código fuente, ya libre de comentarios (ver [`crate::strip`]), en
//! unidades léxicas denominadas tokens. El lexer no guarda estado de
//! una línea a otra, por lo cual ningún token abarca más de una línea.
//! Cada token emitido está asociado a una ubicación en el código fuente
//! original.
//!
//! # Clasificación
//! En cada posición se prueban, en orden de prioridad:
//! 1. Un dígito inicia una constante entera.
//! 2. Un carácter del conjunto `{}[]().,;+-*/&|<>=~` es un símbolo.
//! 3. `"` inicia una constante de string que termina en el siguiente `"`.
//!    No existen secuencias de escape.
//! 4. Una palabra reservada completa, no seguida de otra letra, dígito
//!    o `_`, es una palabra clave.
//! 5. Una letra o `_` inicia un identificador, el cual se extiende
//!    únicamente con letras y `_` (ver [`LexOptions`]).
//! 6. Cualquier otro carácter se descarta.
//!
//! # Errores
//! Si una rama se elige pero su patrón no coincide, el lexer falla con
//! [`LexerError::MalformedToken`] en vez de ignorar la entrada. El primer
//! error detiene el análisis del archivo.

use crate::source::{Located, Location, Source};
use bitflags::bitflags;
use std::{
    fmt::{self, Display},
    io::{self, Write},
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Literal entero máximo que la máquina objetivo puede empujar.
pub const INT_MAX: u16 = 32767;

/// Conjunto fijo de símbolos de un carácter.
const SYMBOLS: &str = "{}[]().,;+-*/&|<>=~";

bitflags! {
    /// Opciones de análisis léxico.
    pub struct LexOptions: u32 {
        /// Permite que dígitos continúen un identificador después de su
        /// primer carácter, de modo que `a1` sea un único identificador.
        ///
        /// Sin esta opción, `a1` se descompone en el identificador `a`
        /// seguido de la constante `1`.
        const DIGITS_IN_IDENTIFIERS = 0x01;
    }
}

impl Default for LexOptions {
    fn default() -> Self {
        LexOptions::empty()
    }
}

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Se eligió una clase de token, pero el texto no coincide con ella.
    #[error("Malformed {0}: {1}")]
    MalformedToken(TokenKind, &'static str),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer constant overflow, valid range is [0, 32767]")]
    IntOverflow,
}

/// Clase de un token, según su codificación textual.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Symbol,
    Identifier,
    IntegerConstant,
    StringConstant,
}

impl Display for TokenKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            TokenKind::Keyword => "keyword",
            TokenKind::Symbol => "symbol",
            TokenKind::Identifier => "identifier",
            TokenKind::IntegerConstant => "integerConstant",
            TokenKind::StringConstant => "stringConstant",
        };

        fmt.write_str(string)
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Palabra clave.
    Keyword(Keyword),

    /// Símbolo de un carácter.
    Symbol(char),

    /// Identificador.
    Identifier(Rc<str>),

    /// Constante entera, en el rango `[0, INT_MAX]`.
    IntConstant(u16),

    /// Constante de string, sin las comillas.
    StringConstant(Rc<str>),
}

impl Token {
    /// Obtiene la clase de este token.
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Keyword(_) => TokenKind::Keyword,
            Token::Symbol(_) => TokenKind::Symbol,
            Token::Identifier(_) => TokenKind::Identifier,
            Token::IntConstant(_) => TokenKind::IntegerConstant,
            Token::StringConstant(_) => TokenKind::StringConstant,
        }
    }

    /// Texto del token tal como aparece en el flujo de tokens.
    ///
    /// `<`, `>` y `&` se escapan como `&lt;`, `&gt;` y `&amp;`.
    pub fn text(&self) -> String {
        match self {
            Token::Keyword(keyword) => keyword.to_string(),
            Token::Symbol('<') => String::from("&lt;"),
            Token::Symbol('>') => String::from("&gt;"),
            Token::Symbol('&') => String::from("&amp;"),
            Token::Symbol(c) => c.to_string(),
            Token::Identifier(id) => id.to_string(),
            Token::IntConstant(integer) => integer.to_string(),
            Token::StringConstant(string) => string.to_string(),
        }
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Token::Symbol(c) => write!(fmt, "`{}`", c),
            Token::Identifier(id) => write!(fmt, "identifier `{}`", id),
            Token::IntConstant(integer) => write!(fmt, "constant `{}`", integer),
            Token::StringConstant(string) => write!(fmt, "string {:?}", string),
        }
    }
}

/// Una palabra reservada.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Class,
    Constructor,
    Function,
    Method,
    Field,
    Static,
    Var,
    Int,
    Char,
    Boolean,
    Void,
    True,
    False,
    Null,
    This,
    Let,
    Do,
    If,
    Else,
    While,
    Return,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("class",       Keyword::Class),
    ("constructor", Keyword::Constructor),
    ("function",    Keyword::Function),
    ("method",      Keyword::Method),
    ("field",       Keyword::Field),
    ("static",      Keyword::Static),
    ("var",         Keyword::Var),
    ("int",         Keyword::Int),
    ("char",        Keyword::Char),
    ("boolean",     Keyword::Boolean),
    ("void",        Keyword::Void),
    ("true",        Keyword::True),
    ("false",       Keyword::False),
    ("null",        Keyword::Null),
    ("this",        Keyword::This),
    ("let",         Keyword::Let),
    ("do",          Keyword::Do),
    ("if",          Keyword::If),
    ("else",        Keyword::Else),
    ("while",       Keyword::While),
    ("return",      Keyword::Return),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == *self)
            .map(|&(name, _)| name)
            .unwrap_or("?");

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Analizador léxico para las líneas de un mismo origen.
pub struct Lexer {
    source: Rc<Source>,
    options: LexOptions,
}

impl Lexer {
    pub fn new(source: Rc<Source>, options: LexOptions) -> Self {
        Lexer { source, options }
    }

    /// Tokeniza una secuencia de líneas ya depuradas de comentarios.
    ///
    /// La línea `i` de `lines` se reporta como la línea `i + 1` del
    /// origen.
    pub fn tokenize<S: AsRef<str>>(
        &self,
        lines: &[S],
    ) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        let mut tokens = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            self.line(index as u32 + 1, line.as_ref(), &mut tokens)?;
        }

        Ok(tokens)
    }

    /// Emite, de izquierda a derecha, todo token presente en una línea.
    pub fn line(
        &self,
        number: u32,
        line: &str,
        tokens: &mut Vec<Located<Token>>,
    ) -> Result<(), Located<LexerError>> {
        let chars: Vec<char> = line.chars().collect();
        let locate = |start: usize, end: usize| {
            Location::new(
                Rc::clone(&self.source),
                number,
                start as u32 + 1..end as u32 + 1,
            )
        };

        let mut start = 0;
        while start < chars.len() {
            let (token, end) = match self.scan(&chars, start) {
                Ok(Some(scanned)) => scanned,
                Ok(None) => {
                    start += 1;
                    continue;
                }

                Err((error, end)) => return Err(Located::at(error, locate(start, end))),
            };

            tokens.push(Located::at(token, locate(start, end)));
            start = end;
        }

        Ok(())
    }

    /// Clasifica el token que inicia en `start`.
    ///
    /// Retorna el token y la posición siguiente a su último carácter,
    /// o `None` si el carácter debe descartarse.
    fn scan(
        &self,
        chars: &[char],
        start: usize,
    ) -> Result<Option<(Token, usize)>, (LexerError, usize)> {
        let c = chars[start];
        let run = |accept: &dyn Fn(char) -> bool| {
            start + chars[start..].iter().take_while(|&&c| accept(c)).count()
        };

        if c.is_numeric() {
            let end = run(&|c: char| c.is_ascii_digit());
            if end == start {
                let error = LexerError::MalformedToken(TokenKind::IntegerConstant, "not a digit");
                return Err((error, start + 1));
            }

            let digits: String = chars[start..end].iter().collect();
            return match digits.parse::<u16>() {
                Ok(integer) if integer <= INT_MAX => Ok(Some((Token::IntConstant(integer), end))),
                _ => Err((LexerError::IntOverflow, end)),
            };
        }

        if SYMBOLS.contains(c) {
            return Ok(Some((Token::Symbol(c), start + 1)));
        }

        if c == '"' {
            return match chars[start + 1..].iter().position(|&c| c == '"') {
                Some(length) => {
                    let end = start + length + 2;
                    let literal = &chars[start + 1..start + 1 + length];

                    // Cada carácter se empuja como una constante
                    let units: usize = literal.iter().map(|c| c.len_utf16()).sum();
                    if literal.iter().any(|&c| u32::from(c) > u32::from(INT_MAX)) {
                        let error =
                            LexerError::MalformedToken(TokenKind::StringConstant, "character out of range");
                        return Err((error, end));
                    } else if units > usize::from(INT_MAX) {
                        let error = LexerError::MalformedToken(TokenKind::StringConstant, "too long");
                        return Err((error, end));
                    }

                    let string: String = literal.iter().collect();
                    Ok(Some((Token::StringConstant(string.into()), end)))
                }

                None => {
                    let error = LexerError::MalformedToken(
                        TokenKind::StringConstant,
                        "missing closing `\"`",
                    );

                    Err((error, chars.len()))
                }
            };
        }

        let word_end = run(&is_word_char);
        let word: String = chars[start..word_end].iter().collect();
        if let Ok(keyword) = Keyword::from_str(&word) {
            return Ok(Some((Token::Keyword(keyword), word_end)));
        }

        if c.is_alphabetic() || c == '_' {
            let digits = self.options.contains(LexOptions::DIGITS_IN_IDENTIFIERS);
            let end = run(&|c: char| {
                c.is_ascii_alphabetic() || c == '_' || (digits && c.is_ascii_digit())
            });

            if end == start {
                let error = LexerError::MalformedToken(TokenKind::Identifier, "not an ASCII letter");
                return Err((error, start + 1));
            }

            let id: String = chars[start..end].iter().collect();
            return Ok(Some((Token::Identifier(id.into()), end)));
        }

        Ok(None)
    }
}

/// Escribe el flujo de tokens en su codificación textual.
///
/// El flujo completo queda entre `<tokens>` y `</tokens>`, con una
/// línea `<kind> text </kind>` por token.
pub fn write_xml<W: Write>(tokens: &[Located<Token>], output: &mut W) -> io::Result<()> {
    writeln!(output, "<tokens>")?;
    for token in tokens {
        let token = token.val();
        writeln!(output, "<{0}> {1} </{0}>", token.kind(), token.text())?;
    }

    writeln!(output, "</tokens>")
}

/// Determina si un carácter impide que una palabra reservada termine.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
