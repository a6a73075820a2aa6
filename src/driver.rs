//! Compilación de archivos y manejo de artefactos.
//!
//! Este módulo descubre archivos fuente, compila cada uno de forma
//! independiente y escribe un `.vm` por clase. Cada artefacto escrito
//! se registra, de modo que ante un fallo se pueda deshacer todo lo
//! producido hasta ese punto antes de propagar el error.

use std::{
    collections::HashMap,
    ffi::OsStr,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use log::{debug, info, warn};
use thiserror::Error;
use unicase::UniCase;

use crate::{
    compile::{self, CodegenOptions},
    lex::{self, LexOptions},
    source::Source,
    vm,
};

bitflags! {
    /// Opciones de construcción.
    pub struct BuildOptions: u32 {
        /// Escribir también el flujo de tokens como `<Name>T.xml`.
        const TOKENS = 0x01;

        /// Continuar con los archivos restantes luego de un fallo.
        ///
        /// Solo se remueven los artefactos del archivo que falló; los
        /// demás se conservan.
        const KEEP_GOING = 0x02;
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions::empty()
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("No such file or directory: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a .jack source file: {}", .0.display())]
    NotSource(PathBuf),

    #[error("Directory contains no .jack files: {}", .0.display())]
    NoSources(PathBuf),

    #[error("I/O error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// El compilador rechazó el archivo. `report` es el diagnóstico ya
    /// desplegado, con extracto del código fuente.
    #[error("Failed to compile {}\n\n{}", .path.display(), .report)]
    Rejected { path: PathBuf, report: String },

    /// Dos fuentes cuyo nombre difiere solo en la capitalización de la
    /// extensión producirían el mismo artefacto.
    #[error("Both {} and {} would be compiled to {}", .first.display(), .second.display(), .output.display())]
    OutputCollision {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{} file(s) failed to compile", .0.len())]
    Failed(Vec<BuildError>),
}

impl BuildError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
        move |source| BuildError::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// Configuración completa de una construcción.
#[derive(Clone, Debug, Default)]
pub struct BuildConfig {
    /// Directorio de salida. Por omisión, el directorio de cada fuente.
    pub out_dir: Option<PathBuf>,
    pub lex: LexOptions,
    pub codegen: CodegenOptions,
    pub options: BuildOptions,
}

/// Conjunto ordenado de archivos fuente a compilar.
#[derive(Debug)]
pub struct Inputs {
    files: Vec<PathBuf>,
}

impl Inputs {
    /// Resuelve una ruta de entrada.
    ///
    /// Una ruta a un archivo `.jack` produce ese único archivo. Una ruta
    /// a un directorio produce todos sus archivos `.jack` inmediatos,
    /// ordenados por nombre.
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, BuildError> {
        let path = path.as_ref();
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(BuildError::NotFound(path.to_owned()))
            }

            Err(error) => return Err(BuildError::io(path)(error)),
        };

        if !metadata.is_dir() {
            return if is_source(path) {
                Ok(Inputs {
                    files: vec![path.to_owned()],
                })
            } else {
                Err(BuildError::NotSource(path.to_owned()))
            };
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(path).map_err(BuildError::io(path))? {
            let entry = entry.map_err(BuildError::io(path))?.path();
            if entry.is_file() && is_source(&entry) {
                files.push(entry);
            }
        }

        if files.is_empty() {
            return Err(BuildError::NoSources(path.to_owned()));
        }

        files.sort();
        Ok(Inputs { files })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Compila todas las entradas.
///
/// Retorna las rutas de los artefactos producidos. Si algún archivo
/// falla, sus artefactos se remueven; sin [`BuildOptions::KEEP_GOING`]
/// se remueven además los de todos los archivos anteriores y la
/// construcción se detiene en ese punto.
pub fn build(inputs: &Inputs, config: &BuildConfig) -> Result<Vec<PathBuf>, BuildError> {
    let keep_going = config.options.contains(BuildOptions::KEEP_GOING);

    // Ningún artefacto se escribe si dos fuentes comparten salida
    let mut planned: HashMap<PathBuf, &Path> = HashMap::new();
    for file in inputs.files() {
        let output = out_dir(file, config).join(format!("{}.vm", stem(file)?));
        if let Some(first) = planned.get(&output) {
            return Err(BuildError::OutputCollision {
                output,
                first: first.to_path_buf(),
                second: file.clone(),
            });
        }

        planned.insert(output, file);
    }

    let mut produced = Artifacts::default();
    let mut failures = Vec::new();

    for file in inputs.files() {
        info!("Compiling {}", file.display());

        let mut artifacts = Artifacts::default();
        match compile_file(file, config, &mut artifacts) {
            Ok(()) => produced.append(artifacts),

            Err(error) => {
                artifacts.rollback();
                if !keep_going {
                    produced.rollback();
                    return Err(error);
                }

                failures.push(error);
            }
        }
    }

    if failures.is_empty() {
        Ok(produced.paths)
    } else {
        Err(BuildError::Failed(failures))
    }
}

fn compile_file(path: &Path, config: &BuildConfig, artifacts: &mut Artifacts) -> Result<(), BuildError> {
    let file = File::open(path).map_err(BuildError::io(path))?;
    let source = Source::read(BufReader::new(file), path.display().to_string())
        .map_err(BuildError::io(path))?;

    let class = compile::compile_class(&source, config.lex, config.codegen).map_err(|diagnostics| {
        BuildError::Rejected {
            path: path.to_owned(),
            report: diagnostics.to_string(),
        }
    })?;

    let stem = stem(path)?;
    if class.name != stem {
        warn!("{} declares class `{}`", path.display(), class.name);
    }

    let out_dir = out_dir(path, config);
    if config.out_dir.is_some() {
        fs::create_dir_all(&out_dir).map_err(BuildError::io(&out_dir))?;
    }

    if config.options.contains(BuildOptions::TOKENS) {
        let xml = out_dir.join(format!("{}T.xml", stem));
        artifacts.write(&xml, |output| lex::write_xml(&class.tokens, output))?;
    }

    let code = out_dir.join(format!("{}.vm", stem));
    artifacts.write(&code, |output| vm::write(&class.code, output))
}

fn stem(path: &Path) -> Result<&str, BuildError> {
    path.file_stem()
        .and_then(OsStr::to_str)
        .ok_or_else(|| BuildError::NotSource(path.to_owned()))
}

/// Directorio donde se escriben los artefactos de `path`.
fn out_dir(path: &Path, config: &BuildConfig) -> PathBuf {
    match &config.out_dir {
        Some(out_dir) => out_dir.clone(),
        None => path.parent().map(Path::to_owned).unwrap_or_default(),
    }
}

/// Registro de archivos escritos.
#[derive(Default)]
struct Artifacts {
    paths: Vec<PathBuf>,
}

impl Artifacts {
    /// Crea y escribe un artefacto.
    ///
    /// La ruta se registra antes de crear el archivo, por lo que una
    /// escritura parcial también se remueve en un rollback.
    fn write<F>(&mut self, path: &Path, contents: F) -> Result<(), BuildError>
    where
        F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
    {
        self.paths.push(path.to_owned());
        debug!("Writing {}", path.display());

        let mut output = BufWriter::new(File::create(path).map_err(BuildError::io(path))?);
        contents(&mut output)
            .and_then(|()| output.flush())
            .map_err(BuildError::io(path))
    }

    fn append(&mut self, other: Artifacts) {
        self.paths.extend(other.paths);
    }

    fn rollback(self) {
        for path in self.paths.iter().rev() {
            match fs::remove_file(path) {
                Ok(()) => warn!("Removed {}", path.display()),
                Err(error) if error.kind() == io::ErrorKind::NotFound => (),
                Err(error) => warn!("Failed to remove {}: {}", path.display(), error),
            }
        }
    }
}

fn is_source(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map_or(false, |extension| UniCase::new(extension) == UniCase::new("jack"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Directorio temporal exclusivo de una prueba.
    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("jackc-driver-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const MAIN: &str = "class Main { function void main() { return; } }";
    const BROKEN: &str = "class Broken { function void main() { let x = 1; return; } }";

    #[test]
    fn extension_is_case_insensitive() {
        assert!(is_source(Path::new("a/Main.jack")));
        assert!(is_source(Path::new("Main.JACK")));
        assert!(!is_source(Path::new("Main.vm")));
        assert!(!is_source(Path::new("jack")));
    }

    #[test]
    fn discovers_sorted_sources() {
        let dir = scratch("discover");
        for name in ["b.jack", "a.Jack", "notes.txt"] {
            fs::write(dir.join(name), MAIN).unwrap();
        }

        let inputs = Inputs::discover(&dir).unwrap();
        let names: Vec<_> = inputs
            .files()
            .iter()
            .map(|file| file.file_name().unwrap().to_str().unwrap())
            .collect();

        assert_eq!(names, vec!["a.Jack", "b.jack"]);
        assert!(matches!(
            Inputs::discover(dir.join("notes.txt")),
            Err(BuildError::NotSource(_))
        ));

        assert!(matches!(
            Inputs::discover(dir.join("missing")),
            Err(BuildError::NotFound(_))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory() {
        let dir = scratch("empty");
        assert!(matches!(Inputs::discover(&dir), Err(BuildError::NoSources(_))));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failure_rolls_back_everything() {
        let dir = scratch("rollback");
        fs::write(dir.join("A.jack"), MAIN).unwrap();
        fs::write(dir.join("B.jack"), BROKEN).unwrap();
        fs::write(dir.join("C.jack"), MAIN).unwrap();

        let config = BuildConfig {
            options: BuildOptions::TOKENS,
            ..Default::default()
        };

        let inputs = Inputs::discover(&dir).unwrap();
        match build(&inputs, &config) {
            Err(BuildError::Rejected { path, report }) => {
                assert!(path.ends_with("B.jack"));
                assert!(report.contains("No symbol found named `x`"));
            }

            other => panic!("unexpected result: {:?}", other),
        }

        for artifact in ["A.vm", "AT.xml", "B.vm", "C.vm"] {
            assert!(!dir.join(artifact).exists(), "{} was left behind", artifact);
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn sources_sharing_an_output_are_rejected() {
        let dir = scratch("collision");
        fs::write(dir.join("A.JACK"), "class A { function void f() { return; } }").unwrap();
        fs::write(dir.join("A.jack"), "class A { function void g() { return; } }").unwrap();

        let inputs = Inputs::discover(&dir).unwrap();
        let config = BuildConfig {
            options: BuildOptions::KEEP_GOING,
            ..Default::default()
        };

        match build(&inputs, &config) {
            Err(BuildError::OutputCollision { output, first, second }) => {
                assert_eq!(output, dir.join("A.vm"));
                assert!(first.ends_with("A.JACK"));
                assert!(second.ends_with("A.jack"));
            }

            other => panic!("unexpected result: {:?}", other),
        }

        assert!(!dir.join("A.vm").exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn keep_going_isolates_failures() {
        let dir = scratch("keep-going");
        let out = dir.join("out");
        fs::write(dir.join("A.jack"), MAIN).unwrap();
        fs::write(dir.join("B.jack"), BROKEN).unwrap();
        fs::write(dir.join("C.jack"), MAIN).unwrap();

        let config = BuildConfig {
            out_dir: Some(out.clone()),
            options: BuildOptions::KEEP_GOING,
            ..Default::default()
        };

        let inputs = Inputs::discover(&dir).unwrap();
        match build(&inputs, &config) {
            Err(BuildError::Failed(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(out.join("A.vm").exists());
        assert!(!out.join("B.vm").exists());
        assert!(out.join("C.vm").exists());

        let code = fs::read_to_string(out.join("C.vm")).unwrap();
        assert_eq!(code, "function Main.main 0\npush constant 0\nreturn\n");

        fs::remove_dir_all(&dir).unwrap();
    }
}
