//! Funciones del sistema operativo.
//!
//! Los programas compilados invocan a estas funciones igual que a
//! cualquier otra, con `call Clase.funcion n`. Una función cargada con
//! el mismo nombre tiene prioridad sobre el builtin.
//!
//! # Strings
//! `String.new(n)` reserva `n + 2` palabras: capacidad, largo actual y
//! luego un carácter UTF-16 por palabra.

use crate::{machine::Machine, RuntimeError};

type Run = fn(&mut Machine, &[i16]) -> Result<i16, RuntimeError>;

pub struct Builtin {
    name: &'static str,
    arity: u16,
    run: Run,
}

impl Builtin {
    pub fn arity(&self) -> u16 {
        self.arity
    }

    pub(crate) fn run(&self, machine: &mut Machine, arguments: &[i16]) -> Result<i16, RuntimeError> {
        (self.run)(machine, arguments)
    }
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "Math.multiply",
        arity: 2,
        run: |_, args| Ok(args[0].wrapping_mul(args[1])),
    },
    Builtin {
        name: "Math.divide",
        arity: 2,
        run: |_, args| match args[1] {
            0 => Err(RuntimeError::DivisionByZero),
            divisor => Ok(args[0].wrapping_div(divisor)),
        },
    },
    Builtin {
        name: "Memory.alloc",
        arity: 1,
        run: |machine, args| machine.alloc(args[0]),
    },
    Builtin {
        name: "Array.new",
        arity: 1,
        run: |machine, args| machine.alloc(args[0]),
    },
    Builtin {
        name: "String.new",
        arity: 1,
        run: string_new,
    },
    Builtin {
        name: "String.appendChar",
        arity: 2,
        run: append_char,
    },
    Builtin {
        name: "String.length",
        arity: 1,
        run: |machine, args| machine.read(i32::from(args[0]) + 1),
    },
    Builtin {
        name: "Output.printInt",
        arity: 1,
        run: |machine, args| {
            machine.print(&args[0].to_string());
            Ok(0)
        },
    },
    Builtin {
        name: "Output.printChar",
        arity: 1,
        run: |machine, args| {
            machine.print(&decode(&[args[0]]));
            Ok(0)
        },
    },
    Builtin {
        name: "Output.printString",
        arity: 1,
        run: print_string,
    },
    Builtin {
        name: "Output.println",
        arity: 0,
        run: |machine, _| {
            machine.print("\n");
            Ok(0)
        },
    },
    Builtin {
        name: "Sys.halt",
        arity: 0,
        run: |machine, _| {
            machine.halt();
            Ok(0)
        },
    },
];

/// Busca un builtin por nombre completo.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn string_new(machine: &mut Machine, args: &[i16]) -> Result<i16, RuntimeError> {
    let capacity = args[0].max(0);
    let string = machine.alloc(capacity.saturating_add(2))?;

    machine.write(string.into(), capacity)?;
    machine.write(i32::from(string) + 1, 0)?;
    Ok(string)
}

fn append_char(machine: &mut Machine, args: &[i16]) -> Result<i16, RuntimeError> {
    let (string, c) = (args[0], args[1]);
    let base = i32::from(string);

    let capacity = machine.read(base)?;
    let length = machine.read(base + 1)?;
    if length >= capacity {
        return Err(RuntimeError::StringFull(string));
    }

    machine.write(base + 2 + i32::from(length), c)?;
    machine.write(base + 1, length + 1)?;
    Ok(string)
}

fn print_string(machine: &mut Machine, args: &[i16]) -> Result<i16, RuntimeError> {
    let base = i32::from(args[0]);
    let length = machine.read(base + 1)?;

    let units = (0..i32::from(length))
        .map(|index| machine.read(base + 2 + index))
        .collect::<Result<Vec<_>, _>>()?;

    machine.print(&decode(&units));
    Ok(0)
}

fn decode(units: &[i16]) -> String {
    let units: Vec<u16> = units.iter().map(|&unit| unit as u16).collect();
    String::from_utf16_lossy(&units)
}
