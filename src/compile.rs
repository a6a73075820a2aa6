//! Análisis sintáctico y generación de código.
//!
//! El compilador es de una sola pasada: un parser descendente recursivo
//! y predictivo consume el flujo de tokens y emite instrucciones de
//! máquina virtual conforme reconoce cada construcción, sin construir
//! un árbol sintáctico. Basta un token de lookahead en todo punto,
//! excepto para distinguir una referencia a variable de una llamada,
//! donde se observa además el token siguiente.
//!
//! El único estado mutable compartido entre sentencias son los dos
//! ámbitos vivos ([`Scopes`]) y los dos contadores de etiquetas, los
//! cuales avanzan a lo largo de toda la clase.

use bitflags::bitflags;
use std::{
    fmt::{self, Display},
    rc::Rc,
};

use thiserror::Error;

use crate::{
    error::Diagnostics,
    lex::{Keyword, LexOptions, Lexer, Token},
    source::{Located, Location, Source},
    strip,
    symbols::{Kind, Scopes, Symbol, SymbolError},
    vm::{ArithOp, Instruction, Label, Segment},
};

bitflags! {
    /// Opciones de generación de código.
    pub struct CodegenOptions: u32 {
        /// Construye un objeto `String` vacío para `""`.
        ///
        /// Sin esta opción, una constante de string vacía no emite
        /// ninguna instrucción.
        const ALLOCATE_EMPTY_STRINGS = 0x01;
    }
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions::empty()
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("No symbol found named `{0}`")]
    UnknownSymbol(String),

    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Expected, Token),

    #[error("Expected {0}, none was found instead")]
    UnexpectedEof(Expected),

    /// El parser clasifica operadores en un único paso, por lo que un
    /// token aceptado como operador siempre tiene una traducción. Esta
    /// variante no se produce al compilar.
    #[error("Operator not found: {0}")]
    UnrecognizedOperator(Token),

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

/// Lo que el parser esperaba encontrar en un punto dado.
#[derive(Clone, Debug)]
pub enum Expected {
    Token(Token),
    Identifier,
    Type,
    SubroutineKind,
    Term,
    End,
}

impl Display for Expected {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Token(token) => write!(fmt, "{}", token),
            Expected::Identifier => fmt.write_str("an identifier"),
            Expected::Type => fmt.write_str("a type"),
            Expected::SubroutineKind => fmt.write_str("`constructor`, `function` or `method`"),
            Expected::Term => fmt.write_str("an expression"),
            Expected::End => fmt.write_str("end of file"),
        }
    }
}

/// Resultado de compilar un archivo fuente completo.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub tokens: Vec<Located<Token>>,
    pub code: Vec<Instruction>,
}

/// Compila un archivo fuente que contiene exactamente una clase.
///
/// Se remueven comentarios, se tokeniza y se genera código. El primer
/// error en cualquiera de las fases detiene la compilación.
pub fn compile_class(
    source: &Rc<Source>,
    lex: LexOptions,
    codegen: CodegenOptions,
) -> Result<Class, Diagnostics> {
    let lines = strip::strip(source.lines());
    let tokens = Lexer::new(Rc::clone(source), lex)
        .tokenize(&lines)
        .map_err(|error| Diagnostics::from(error).kind("Lexical error"))?;

    let eof = Location::eof(Rc::clone(source));
    let (name, code) = compile(&tokens, eof, codegen)
        .map_err(|error| Diagnostics::from(error).kind("Syntax error"))?;

    Ok(Class { name, tokens, code })
}

/// Genera código para una clase a partir de su flujo de tokens.
///
/// Retorna el nombre de la clase y su listado de instrucciones.
pub fn compile(
    tokens: &[Located<Token>],
    eof: Location,
    options: CodegenOptions,
) -> Result<(String, Vec<Instruction>), Located<CompileError>> {
    let mut compiler = Compiler {
        cursor: Cursor {
            tokens,
            position: 0,
        },
        eof,
        options,
        class: String::new(),
        scopes: Scopes::new(),
        while_labels: 0,
        if_labels: 0,
        output: Vec::new(),
    };

    compiler.class()?;
    Ok((compiler.class, compiler.output))
}

/// Cursor sobre un flujo finito de tokens.
struct Cursor<'t> {
    tokens: &'t [Located<Token>],
    position: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Located<Token>> {
        self.tokens.get(self.position)
    }

    fn peek_next(&self) -> Option<&'t Located<Token>> {
        self.tokens.get(self.position + 1)
    }

    fn advance(&mut self) -> Option<&'t Located<Token>> {
        let token = self.peek()?;
        self.position += 1;

        Some(token)
    }
}

/// Clase de subrutina.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Subroutine {
    Constructor,
    Function,
    Method,
}

/// Operadores binarios, todos de igual precedencia.
#[derive(Copy, Clone)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Less,
    Greater,
    Equal,
}

impl BinOp {
    fn from_token(token: &Token) -> Option<BinOp> {
        use BinOp::*;

        let op = match token {
            Token::Symbol('+') => Add,
            Token::Symbol('-') => Sub,
            Token::Symbol('*') => Mul,
            Token::Symbol('/') => Div,
            Token::Symbol('&') => And,
            Token::Symbol('|') => Or,
            Token::Symbol('<') => Less,
            Token::Symbol('>') => Greater,
            Token::Symbol('=') => Equal,
            _ => return None,
        };

        Some(op)
    }

    fn instruction(self) -> Instruction {
        use BinOp::*;

        let op = match self {
            Add => ArithOp::Add,
            Sub => ArithOp::Sub,
            And => ArithOp::And,
            Or => ArithOp::Or,
            Less => ArithOp::Lt,
            Greater => ArithOp::Gt,
            Equal => ArithOp::Eq,
            Mul => return os_call("Math.multiply", 2),
            Div => return os_call("Math.divide", 2),
        };

        Instruction::Arithmetic(op)
    }
}

type Compile<T> = Result<T, Located<CompileError>>;

struct Compiler<'t> {
    cursor: Cursor<'t>,
    eof: Location,
    options: CodegenOptions,
    class: String,
    scopes: Scopes,
    while_labels: u32,
    if_labels: u32,
    output: Vec<Instruction>,
}

impl<'t> Compiler<'t> {
    fn class(&mut self) -> Compile<()> {
        self.keyword(Keyword::Class)?;
        self.class = self.identifier()?.val().to_string();
        self.symbol('{')?;

        while let Some(kind) = self.peek_class_var_kind() {
            self.class_var_dec(kind)?;
        }

        while self.peek_subroutine() {
            self.subroutine()?;
        }

        self.symbol('}')?;

        match self.cursor.peek() {
            None => Ok(()),
            Some(token) => self.fail(
                CompileError::UnexpectedToken(Expected::End, token.val().clone()),
                token.location(),
            ),
        }
    }

    fn peek_class_var_kind(&self) -> Option<Kind> {
        match self.peek()? {
            Token::Keyword(Keyword::Static) => Some(Kind::Static),
            Token::Keyword(Keyword::Field) => Some(Kind::Field),
            _ => None,
        }
    }

    fn peek_subroutine(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Keyword(Keyword::Constructor | Keyword::Function | Keyword::Method))
        )
    }

    fn class_var_dec(&mut self, kind: Kind) -> Compile<()> {
        self.cursor.advance();
        let typ = self.typ()?;
        self.var_names(&typ, kind)
    }

    /// Declara `name (, name)* ;` con un mismo tipo y clase.
    fn var_names(&mut self, typ: &str, kind: Kind) -> Compile<()> {
        loop {
            let name = self.identifier()?;
            self.declare(&name, typ, kind)?;

            if self.peek_symbol(',') {
                self.cursor.advance();
            } else {
                break self.symbol(';');
            }
        }
    }

    fn subroutine(&mut self) -> Compile<()> {
        let (location, token) = self.next(Expected::SubroutineKind)?.clone().split();
        let kind = match token {
            Token::Keyword(Keyword::Constructor) => Subroutine::Constructor,
            Token::Keyword(Keyword::Function) => Subroutine::Function,
            Token::Keyword(Keyword::Method) => Subroutine::Method,
            _ => {
                let error = CompileError::UnexpectedToken(Expected::SubroutineKind, token);
                return self.fail(error, &location);
            }
        };

        self.scopes.open_subroutine();
        if kind == Subroutine::Method {
            let this = Located::at(Rc::from("this"), location);
            let class = self.class.clone();
            self.declare(&this, &class, Kind::Argument)?;
        }

        if self.peek_keyword(Keyword::Void) {
            self.cursor.advance();
        } else {
            self.typ()?;
        }

        let name = self.identifier()?;
        self.symbol('(')?;
        self.parameter_list()?;
        self.symbol(')')?;

        self.symbol('{')?;
        while self.peek_keyword(Keyword::Var) {
            self.cursor.advance();
            let typ = self.typ()?;
            self.var_names(&typ, Kind::Var)?;
        }

        let locals = self.scopes.subroutine().count_of(Segment::Local);
        emit!(
            self,
            Instruction::Function {
                name: format!("{}.{}", self.class, name.val()),
                locals,
            }
        );

        match kind {
            Subroutine::Constructor => {
                let fields = self.scopes.class().count_of(Segment::This);
                emit!(
                    self,
                    Instruction::Push(Segment::Constant, fields),
                    os_call("Memory.alloc", 1),
                    Instruction::Pop(Segment::Pointer, 0),
                );
            }

            Subroutine::Method => emit!(
                self,
                Instruction::Push(Segment::Argument, 0),
                Instruction::Pop(Segment::Pointer, 0),
            ),

            Subroutine::Function => (),
        }

        self.statements()?;
        self.symbol('}')?;

        self.scopes.close_subroutine();
        Ok(())
    }

    fn parameter_list(&mut self) -> Compile<()> {
        if self.peek_symbol(')') {
            return Ok(());
        }

        loop {
            let typ = self.typ()?;
            let name = self.identifier()?;
            self.declare(&name, &typ, Kind::Argument)?;

            if !self.peek_symbol(',') {
                break Ok(());
            }

            self.cursor.advance();
        }
    }

    fn statements(&mut self) -> Compile<()> {
        loop {
            match self.peek() {
                Some(Token::Keyword(Keyword::Let)) => self.let_statement()?,
                Some(Token::Keyword(Keyword::If)) => self.if_statement()?,
                Some(Token::Keyword(Keyword::While)) => self.while_statement()?,
                Some(Token::Keyword(Keyword::Do)) => self.do_statement()?,
                Some(Token::Keyword(Keyword::Return)) => self.return_statement()?,
                _ => break Ok(()),
            }
        }
    }

    fn let_statement(&mut self) -> Compile<()> {
        self.keyword(Keyword::Let)?;
        let target = self.variable()?;

        let indexed = self.peek_symbol('[');
        if indexed {
            self.array_address(&target)?;
        }

        self.symbol('=')?;
        self.expression()?;
        self.symbol(';')?;

        if indexed {
            // El valor puede haber usado `pointer 1`, por lo que la
            // dirección se fija hasta después de evaluarlo
            emit!(
                self,
                Instruction::Pop(Segment::Temp, 0),
                Instruction::Pop(Segment::Pointer, 1),
                Instruction::Push(Segment::Temp, 0),
                Instruction::Pop(Segment::That, 0),
            );
        } else {
            emit!(self, target.pop());
        }

        Ok(())
    }

    fn while_statement(&mut self) -> Compile<()> {
        let n = self.while_labels;
        self.while_labels += 1;

        let (start, end) = (Label::WhileExp(n), Label::WhileEnd(n));

        self.keyword(Keyword::While)?;
        self.symbol('(')?;
        emit!(self, Instruction::SetLabel(start));

        self.expression()?;
        emit!(
            self,
            Instruction::Arithmetic(ArithOp::Not),
            Instruction::JumpIf(end),
        );

        self.symbol(')')?;
        self.block()?;

        emit!(self, Instruction::Jump(start), Instruction::SetLabel(end));
        Ok(())
    }

    fn if_statement(&mut self) -> Compile<()> {
        let n = self.if_labels;
        self.if_labels += 1;

        // `IF_TRUE` marca el inicio de la rama `else`: se llega a ella
        // cuando la condición es falsa
        let (otherwise, end) = (Label::IfTrue(n), Label::IfFalse(n));

        self.keyword(Keyword::If)?;
        self.symbol('(')?;
        self.expression()?;
        emit!(
            self,
            Instruction::Arithmetic(ArithOp::Not),
            Instruction::JumpIf(otherwise),
        );

        self.symbol(')')?;
        self.block()?;
        emit!(
            self,
            Instruction::Jump(end),
            Instruction::SetLabel(otherwise)
        );

        if self.peek_keyword(Keyword::Else) {
            self.cursor.advance();
            self.block()?;
        }

        emit!(self, Instruction::SetLabel(end));
        Ok(())
    }

    fn do_statement(&mut self) -> Compile<()> {
        self.keyword(Keyword::Do)?;
        let name = self.identifier()?;
        self.subroutine_call(name)?;
        self.symbol(';')?;

        // Toda subrutina deja un valor en la pila, incluso las `void`
        emit!(self, Instruction::Pop(Segment::Temp, 0));
        Ok(())
    }

    fn return_statement(&mut self) -> Compile<()> {
        self.keyword(Keyword::Return)?;
        if self.peek_symbol(';') {
            emit!(self, Instruction::Push(Segment::Constant, 0));
        } else {
            self.expression()?;
        }

        self.symbol(';')?;
        emit!(self, Instruction::Return);
        Ok(())
    }

    fn block(&mut self) -> Compile<()> {
        self.symbol('{')?;
        self.statements()?;
        self.symbol('}')
    }

    /// `term (op term)*`, estrictamente de izquierda a derecha.
    fn expression(&mut self) -> Compile<()> {
        self.term()?;

        while let Some(op) = self.cursor.peek().and_then(|token| BinOp::from_token(token.val())) {
            self.cursor.advance();
            self.term()?;
            emit!(self, op.instruction());
        }

        Ok(())
    }

    fn term(&mut self) -> Compile<()> {
        if let (Some(Token::Identifier(_)), Some(Token::Symbol('(' | '.'))) =
            (self.peek(), self.peek_next())
        {
            let name = self.identifier()?;
            return self.subroutine_call(name);
        }

        let token = self.next(Expected::Term)?;
        match token.val() {
            Token::IntConstant(integer) => emit!(self, Instruction::Push(Segment::Constant, *integer)),

            Token::Keyword(Keyword::True) => emit!(
                self,
                Instruction::Push(Segment::Constant, 0),
                Instruction::Arithmetic(ArithOp::Not),
            ),

            Token::Keyword(Keyword::False | Keyword::Null) => {
                emit!(self, Instruction::Push(Segment::Constant, 0))
            }

            Token::Keyword(Keyword::This) => emit!(self, Instruction::Push(Segment::Pointer, 0)),

            Token::StringConstant(string) => self.string(string),

            Token::Symbol('(') => {
                self.expression()?;
                self.symbol(')')?;
            }

            Token::Symbol('-') => {
                self.term()?;
                emit!(self, Instruction::Arithmetic(ArithOp::Neg));
            }

            Token::Symbol('~') => {
                self.term()?;
                emit!(self, Instruction::Arithmetic(ArithOp::Not));
            }

            Token::Identifier(name) => {
                let name = Located::at(Rc::clone(name), token.location().clone());
                let variable = self.resolve(&name)?;

                if self.peek_symbol('[') {
                    self.array_address(&variable)?;
                    emit!(
                        self,
                        Instruction::Pop(Segment::Pointer, 1),
                        Instruction::Push(Segment::That, 0),
                    );
                } else {
                    emit!(self, variable.push());
                }
            }

            other => {
                let error = CompileError::UnexpectedToken(Expected::Term, other.clone());
                return self.fail(error, token.location());
            }
        }

        Ok(())
    }

    /// `[expr]`: deja en la pila la dirección `base + expr`.
    fn array_address(&mut self, array: &Symbol) -> Compile<()> {
        self.symbol('[')?;
        self.expression()?;
        self.symbol(']')?;

        emit!(self, array.push(), Instruction::Arithmetic(ArithOp::Add));
        Ok(())
    }

    fn string(&mut self, string: &str) {
        let units: Vec<u16> = string.encode_utf16().collect();
        if units.is_empty() && !self.options.contains(CodegenOptions::ALLOCATE_EMPTY_STRINGS) {
            return;
        }

        emit!(
            self,
            Instruction::Push(Segment::Constant, units.len() as u16),
            os_call("String.new", 1),
        );

        for unit in units {
            emit!(
                self,
                Instruction::Push(Segment::Constant, unit),
                os_call("String.appendChar", 2),
            );
        }
    }

    /// Llamada a subrutina, cuyo primer identificador ya fue consumido.
    ///
    /// - `var.method(...)`: `var` se empuja como receptor implícito.
    /// - `Class.function(...)`: el prefijo no es una variable conocida.
    /// - `method(...)`: el receptor es el objeto actual.
    fn subroutine_call(&mut self, name: Located<Rc<str>>) -> Compile<()> {
        let (target, implicit) = if self.peek_symbol('.') {
            self.cursor.advance();

            let prefix = match self.scopes.resolve(name.val()) {
                Some(receiver) => {
                    let receiver = receiver.clone();
                    emit!(self, receiver.push());
                    (receiver.typ().to_owned(), 1)
                }

                None => (name.val().to_string(), 0),
            };

            let method = self.identifier()?;
            (format!("{}.{}", prefix.0, method.val()), prefix.1)
        } else {
            emit!(self, Instruction::Push(Segment::Pointer, 0));
            (format!("{}.{}", self.class, name.val()), 1)
        };

        self.symbol('(')?;
        let explicit = self.expression_list()?;
        self.symbol(')')?;

        emit!(
            self,
            Instruction::Call {
                target,
                arguments: implicit + explicit,
            }
        );

        Ok(())
    }

    fn expression_list(&mut self) -> Compile<u16> {
        if self.peek_symbol(')') {
            return Ok(0);
        }

        let mut count = 0;
        loop {
            self.expression()?;
            count += 1;

            if !self.peek_symbol(',') {
                break Ok(count);
            }

            self.cursor.advance();
        }
    }

    fn typ(&mut self) -> Compile<Rc<str>> {
        let token = self.next(Expected::Type)?;
        match token.val() {
            Token::Keyword(keyword @ (Keyword::Int | Keyword::Char | Keyword::Boolean)) => {
                Ok(keyword.to_string().into())
            }

            Token::Identifier(class) => Ok(Rc::clone(class)),

            other => {
                let error = CompileError::UnexpectedToken(Expected::Type, other.clone());
                self.fail(error, token.location())
            }
        }
    }

    fn variable(&mut self) -> Compile<Symbol> {
        let name = self.identifier()?;
        self.resolve(&name)
    }

    fn resolve(&self, name: &Located<Rc<str>>) -> Compile<Symbol> {
        match self.scopes.resolve(name.val()) {
            Some(symbol) => Ok(symbol.clone()),
            None => {
                let error = CompileError::UnknownSymbol(name.val().to_string());
                self.fail(error, name.location())
            }
        }
    }

    fn declare(&mut self, name: &Located<Rc<str>>, typ: &str, kind: Kind) -> Compile<()> {
        match self.scopes.declare(name.val(), typ, kind) {
            Ok(_) => Ok(()),
            Err(error) => self.fail(error.into(), name.location()),
        }
    }

    fn identifier(&mut self) -> Compile<Located<Rc<str>>> {
        let token = self.next(Expected::Identifier)?;
        match token.val() {
            Token::Identifier(id) => Ok(Located::at(Rc::clone(id), token.location().clone())),
            other => {
                let error = CompileError::UnexpectedToken(Expected::Identifier, other.clone());
                self.fail(error, token.location())
            }
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Compile<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn symbol(&mut self, symbol: char) -> Compile<()> {
        self.expect(Token::Symbol(symbol))
    }

    fn expect(&mut self, expected: Token) -> Compile<()> {
        let token = self.next(Expected::Token(expected.clone()))?;
        if *token.val() == expected {
            Ok(())
        } else {
            let error = CompileError::UnexpectedToken(Expected::Token(expected), token.val().clone());
            self.fail(error, token.location())
        }
    }

    fn next(&mut self, expected: Expected) -> Compile<&'t Located<Token>> {
        match self.cursor.advance() {
            Some(token) => Ok(token),
            None => self.fail(CompileError::UnexpectedEof(expected), &self.eof),
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.cursor.peek().map(Located::val)
    }

    fn peek_next(&self) -> Option<&'t Token> {
        self.cursor.peek_next().map(Located::val)
    }

    fn peek_symbol(&self, symbol: char) -> bool {
        self.peek() == Some(&Token::Symbol(symbol))
    }

    fn peek_keyword(&self, keyword: Keyword) -> bool {
        self.peek() == Some(&Token::Keyword(keyword))
    }

    fn fail<T>(&self, error: CompileError, location: &Location) -> Compile<T> {
        Err(Located::at(error, location.clone()))
    }
}

/// Llamada a una subrutina del sistema operativo con `arguments` valores.
fn os_call(target: &str, arguments: u16) -> Instruction {
    Instruction::Call {
        target: target.to_owned(),
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocatedError;

    fn compile_with(text: &str, codegen: CodegenOptions) -> Result<Vec<String>, Diagnostics> {
        let source = Source::new("Test.jack", text);
        let class = compile_class(&source, LexOptions::default(), codegen)?;
        Ok(class.code.iter().map(ToString::to_string).collect())
    }

    fn vm(text: &str) -> Vec<String> {
        compile_with(text, CodegenOptions::default()).unwrap()
    }

    /// Código de una función `Test.f` cuyo cuerpo es `body`, sin su encabezado.
    fn body(declarations: &str, body: &str) -> Vec<String> {
        let text = format!(
            "class Test {{ {} function void f() {{ {} }} }}",
            declarations, body
        );

        vm(&text).into_iter().skip(1).collect()
    }

    fn error(text: &str) -> String {
        let diagnostics = compile_with(text, CodegenOptions::default()).unwrap_err();
        let first = diagnostics.errors().next().unwrap();
        first.source().to_string()
    }

    #[test]
    fn print_sum() {
        let code = vm("class Main { function void main() { do Output.printInt(1+2); return; } }");
        assert_eq!(
            code,
            vec![
                "function Main.main 0",
                "push constant 1",
                "push constant 2",
                "add",
                "call Output.printInt 1",
                "pop temp 0",
                "push constant 0",
                "return",
            ]
        );
    }

    #[test]
    fn constructor_allocates_fields() {
        let code = vm("class Point {
            field int x, y;
            constructor Point new(int ax, int ay) { let x = ax; return this; }
        }");

        assert_eq!(
            code,
            vec![
                "function Point.new 0",
                "push constant 2",
                "call Memory.alloc 1",
                "pop pointer 0",
                "push argument 0",
                "pop this 0",
                "push pointer 0",
                "return",
            ]
        );
    }

    #[test]
    fn method_receives_this_as_argument_zero() {
        let code = vm("class Point {
            field int x;
            static int count;
            method int plus(int d) { let count = count + 1; return x + d; }
        }");

        assert_eq!(
            code,
            vec![
                "function Point.plus 0",
                "push argument 0",
                "pop pointer 0",
                "push static 0",
                "push constant 1",
                "add",
                "pop static 0",
                "push this 0",
                "push argument 1",
                "add",
                "return",
            ]
        );
    }

    #[test]
    fn if_else_wiring() {
        let code = body(
            "static int x, y;",
            "if (x) { let y = 1; } else { let y = 2; } return;",
        );

        assert_eq!(
            code,
            vec![
                "push static 0",
                "not",
                "if-goto IF_TRUE0",
                "push constant 1",
                "pop static 1",
                "goto IF_FALSE0",
                "label IF_TRUE0",
                "push constant 2",
                "pop static 1",
                "label IF_FALSE0",
                "push constant 0",
                "return",
            ]
        );
    }

    #[test]
    fn while_loop() {
        let code = body("static int i;", "while (i < 3) { let i = i + 1; } return;");
        assert_eq!(
            code,
            vec![
                "label WHILE_EXP0",
                "push static 0",
                "push constant 3",
                "lt",
                "not",
                "if-goto WHILE_END0",
                "push static 0",
                "push constant 1",
                "add",
                "pop static 0",
                "goto WHILE_EXP0",
                "label WHILE_END0",
                "push constant 0",
                "return",
            ]
        );
    }

    #[test]
    fn labels_are_unique_across_the_class() {
        let code = vm("class Test {
            function void f() { while (true) { if (false) { } } return; }
            function void g() { if (true) { } else { while (false) { } } return; }
        }");

        let mut targets: Vec<_> = code
            .iter()
            .filter_map(|line| line.strip_prefix("label "))
            .collect();

        assert_eq!(
            targets,
            vec![
                "WHILE_EXP0",
                "IF_TRUE0",
                "IF_FALSE0",
                "WHILE_END0",
                "IF_TRUE1",
                "WHILE_EXP1",
                "WHILE_END1",
                "IF_FALSE1",
            ]
        );

        let count = targets.len();
        targets.sort_unstable();
        targets.dedup();
        assert_eq!(targets.len(), count);

        for label in targets {
            assert!(code
                .iter()
                .any(|line| line == &format!("goto {}", label) || line == &format!("if-goto {}", label)));
        }
    }

    #[test]
    fn one_function_per_subroutine() {
        let code = vm("class Test {
            field int a;
            constructor Test new() { return this; }
            method void m() { return; }
            function int f() { return 1; }
        }");

        let functions = code.iter().filter(|line| line.starts_with("function ")).count();
        assert_eq!(functions, 3);
    }

    #[test]
    fn locals_are_indexed_in_declaration_order() {
        let code = vm("class Test {
            function int f(int a) {
                var int x, y;
                var boolean z;
                let z = true;
                let y = a;
                let x = y;
                return x;
            }
        }");

        assert_eq!(
            code,
            vec![
                "function Test.f 3",
                "push constant 0",
                "not",
                "pop local 2",
                "push argument 0",
                "pop local 1",
                "push local 1",
                "pop local 0",
                "push local 0",
                "return",
            ]
        );
    }

    #[test]
    fn strings() {
        assert_eq!(
            body("", "do Output.printString(\"Hi\"); return;")[..6],
            [
                "push constant 2",
                "call String.new 1",
                "push constant 72",
                "call String.appendChar 2",
                "push constant 105",
                "call String.appendChar 2",
            ]
        );

        assert_eq!(
            body("", "do Output.printString(\"\"); return;"),
            vec![
                "call Output.printString 1",
                "pop temp 0",
                "push constant 0",
                "return",
            ]
        );
    }

    #[test]
    fn empty_string_allocation_is_optional() {
        let text = "class Test { function void f() { do Output.printString(\"\"); return; } }";
        let code = compile_with(text, CodegenOptions::ALLOCATE_EMPTY_STRINGS).unwrap();

        assert_eq!(code[1..3], ["push constant 0", "call String.new 1"]);
    }

    #[test]
    fn operators_apply_left_to_right() {
        assert_eq!(
            body("", "return 2 + 3 * 4 / (1 - 5) & ~1 | -2 = 7 > 1;"),
            vec![
                "push constant 2",
                "push constant 3",
                "add",
                "push constant 4",
                "call Math.multiply 2",
                "push constant 1",
                "push constant 5",
                "sub",
                "call Math.divide 2",
                "push constant 1",
                "not",
                "and",
                "push constant 2",
                "neg",
                "or",
                "push constant 7",
                "eq",
                "push constant 1",
                "gt",
                "return",
            ]
        );
    }

    #[test]
    fn keyword_constants() {
        assert_eq!(
            body("", "do f(true, false, null); return;")[..5],
            [
                "push pointer 0",
                "push constant 0",
                "not",
                "push constant 0",
                "push constant 0",
            ]
        );
    }

    #[test]
    fn call_shapes() {
        let code = vm("class Game {
            field Ball ball;
            method void step() {
                do ball.move(1, 2);
                do Screen.clear();
                do draw(ball);
                return;
            }
        }");

        assert_eq!(
            code[3..],
            [
                "push this 0",
                "push constant 1",
                "push constant 2",
                "call Ball.move 3",
                "pop temp 0",
                "call Screen.clear 0",
                "pop temp 0",
                "push pointer 0",
                "push this 0",
                "call Game.draw 2",
                "pop temp 0",
                "push constant 0",
                "return",
            ]
        );
    }

    #[test]
    fn arrays() {
        assert_eq!(
            body("static Array a, b; static int i;", "let a[i] = b[a[1]]; return;"),
            vec![
                "push static 2",
                "push static 0",
                "add",
                "push constant 1",
                "push static 0",
                "add",
                "pop pointer 1",
                "push that 0",
                "push static 1",
                "add",
                "pop pointer 1",
                "push that 0",
                "pop temp 0",
                "pop pointer 1",
                "push temp 0",
                "pop that 0",
                "push constant 0",
                "return",
            ]
        );
    }

    #[test]
    fn subroutine_scope_does_not_leak() {
        let text = "class Test {
            function void f() { var int x; return; }
            function void g() { let x = 1; return; }
        }";

        assert_eq!(error(text), "No symbol found named `x`");
    }

    #[test]
    fn compilation_is_deterministic() {
        let text = "class Test {
            field int a;
            method void f() { while (a) { if (a) { let a = a - 1; } } return; }
        }";

        assert_eq!(vm(text), vm(text));
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(
            error("class Test { function void f() { return 1 } }"),
            "Expected `;`, found `}` instead"
        );

        assert_eq!(
            error("class Test { function void f() { let = 1; } }"),
            "Expected an identifier, found `=` instead"
        );

        assert_eq!(
            error("class Test { function void f() { return; }"),
            "Expected `}`, none was found instead"
        );

        assert_eq!(
            error("class Test { } class Other { }"),
            "Expected end of file, found keyword `class` instead"
        );

        assert_eq!(
            error("class Test { function void f() { return ); } }"),
            "Expected an expression, found `)` instead"
        );

        assert_eq!(
            error("class Test { function int f() { return 1 . 2; } }"),
            "Expected `;`, found `.` instead"
        );
    }

    #[test]
    fn redeclaration_is_rejected() {
        assert_eq!(
            error("class Test { function void f(int a) { var int a; return; } }"),
            "`a` is already declared in this scope"
        );
    }

    #[test]
    fn errors_are_located() {
        let source = Source::new("Test.jack", "class Test {\n  function void f() {\n    let q = 1;\n  }\n}");
        let diagnostics =
            compile_class(&source, LexOptions::default(), CodegenOptions::default()).unwrap_err();

        let location = diagnostics.errors().next().unwrap().location().to_string();
        assert_eq!(location, "Test.jack:3:9");

        let source = Source::new("Test.jack", "class Test {\n  function void f() {\n    let missing = 1;\n  }\n}");
        let diagnostics =
            compile_class(&source, LexOptions::default(), CodegenOptions::default()).unwrap_err();

        let location = diagnostics.errors().next().unwrap().location().to_string();
        assert_eq!(location, "Test.jack:[3:9-3:15]");
    }
}
