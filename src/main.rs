//! Punto de entrada ("driver").
//!
//! Este módulo interpreta la línea de comandos, obtiene una ruta de
//! entrada válida y delega la compilación a [`jackc::driver`].

use anyhow::{self, bail, Context};
use clap::{self, crate_version, Arg, ArgAction, Command};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use unicase::UniCase;

use jackc::{
    compile::CodegenOptions,
    driver::{self, BuildConfig, BuildError, BuildOptions, Inputs},
    lex::LexOptions,
};

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()
        .context("Failed to initialize logger")?;

    // Parsing de CLI
    let args = Command::new("jackc")
        .version(crate_version!())
        .about("Compiles Jack classes to VM code")
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .help("A .jack file or a directory of them (prompted for if missing)"),
        )
        .arg(
            Arg::new("out-dir")
                .short('o')
                .long("out-dir")
                .takes_value(true)
                .value_name("DIR")
                .help("Write outputs here instead of next to each source file"),
        )
        .arg(
            Arg::new("tokens")
                .short('T')
                .long("tokens")
                .action(ArgAction::SetTrue)
                .help("Also write the token stream of each class as <Name>T.xml"),
        )
        .arg(
            Arg::new("keep-going")
                .short('k')
                .long("keep-going")
                .action(ArgAction::SetTrue)
                .help("Keep compiling after a failure, removing only that file's outputs"),
        )
        .arg(
            Arg::new("identifier-digits")
                .long("identifier-digits")
                .action(ArgAction::SetTrue)
                .help("Allow digits after the first character of an identifier"),
        )
        .arg(
            Arg::new("allocate-empty-strings")
                .long("allocate-empty-strings")
                .action(ArgAction::SetTrue)
                .help("Construct a String object for \"\" instead of emitting nothing"),
        )
        .get_matches();

    let mut config = BuildConfig {
        out_dir: args.get_one::<String>("out-dir").map(PathBuf::from),
        ..Default::default()
    };

    if args.get_flag("tokens") {
        config.options |= BuildOptions::TOKENS;
    }

    if args.get_flag("keep-going") {
        config.options |= BuildOptions::KEEP_GOING;
    }

    if args.get_flag("identifier-digits") {
        config.lex |= LexOptions::DIGITS_IN_IDENTIFIERS;
    }

    if args.get_flag("allocate-empty-strings") {
        config.codegen |= CodegenOptions::ALLOCATE_EMPTY_STRINGS;
    }

    let inputs = match inputs(args.get_one::<String>("path").cloned())? {
        Some(inputs) => inputs,
        None => return Ok(()),
    };

    match driver::build(&inputs, &config) {
        Ok(_) => {
            println!("Compiled {} file(s)", inputs.files().len());
            Ok(())
        }

        Err(BuildError::Failed(errors)) => {
            for error in &errors {
                eprintln!("{}", error);
            }

            bail!("{} of {} file(s) failed to compile", errors.len(), inputs.files().len())
        }

        Err(error) => Err(error).context("Compilation aborted, all outputs were removed"),
    }
}

/// Obtiene entradas válidas, preguntando al usuario mientras la ruta no lo sea.
///
/// Retorna `None` si el usuario pide salir.
fn inputs(mut path: Option<String>) -> anyhow::Result<Option<Inputs>> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        if let Some(path) = path.take() {
            if UniCase::new(path.trim()) == UniCase::new("quit") {
                return Ok(None);
            }

            match Inputs::discover(path.trim()) {
                Ok(inputs) => return Ok(Some(inputs)),
                Err(error) => eprintln!("{}", error),
            }
        }

        print!("Path to a .jack file or directory ('quit' to exit): ");
        io::stdout().flush().context("Failed to write prompt")?;

        match lines.next() {
            Some(line) => path = Some(line.context("Failed to read path")?),
            None => bail!("No input path was given"),
        }
    }
}
