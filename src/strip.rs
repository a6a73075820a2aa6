//! Remoción de comentarios.
//!
//! El lexer espera líneas sin comentarios. Esta fase elimina
//! comentarios de línea (`// ...`) y de bloque (`/* ... */`, incluyendo
//! `/** ... */`), estos últimos posiblemente a través de varias líneas.
//! Los caracteres de un comentario de bloque se reemplazan por espacios
//! para que las columnas sigan correspondiendo al código original, y
//! la salida conserva una línea por cada línea de entrada.

/// Remueve comentarios de una secuencia de líneas.
pub fn strip<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let mut in_block = false;

    lines
        .iter()
        .map(|line| {
            let mut stripped = String::with_capacity(line.as_ref().len());
            let mut in_string = false;
            let mut chars = line.as_ref().chars().peekable();

            while let Some(c) = chars.next() {
                let next = chars.peek().copied();
                match (in_block, in_string, c, next) {
                    (true, _, '*', Some('/')) => {
                        chars.next();
                        stripped.push_str("  ");
                        in_block = false;
                    }

                    (true, _, _, _) => stripped.push(' '),

                    (false, true, '"', _) => {
                        stripped.push(c);
                        in_string = false;
                    }

                    (false, false, '"', _) => {
                        stripped.push(c);
                        in_string = true;
                    }

                    (false, false, '/', Some('/')) => break,

                    (false, false, '/', Some('*')) => {
                        chars.next();
                        stripped.push_str("  ");
                        in_block = true;
                    }

                    _ => stripped.push(c),
                }
            }

            stripped.truncate(stripped.trim_end().len());
            stripped
        })
        .collect()
}
