use clap::{CommandFactory, Parser as ClapParser};
use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
    process,
};

use bytecode::{Identity, disassemble};
use mjc::{Compilation, Lexer, compile};

#[derive(ClapParser, Debug)]
#[command(author, version, about = "MicroJava compiler", long_about = None)]
struct Cli {
    /// MicroJava source file
    #[arg(help = "The .mj file to compile")]
    source: Option<PathBuf>,

    /// Object file to write
    #[arg(short, long, help = "Output path (default: source with .obj extension)")]
    output: Option<PathBuf>,

    #[arg(long, help = "Print the token stream and stop")]
    tokens: bool,

    #[arg(long, help = "Disassemble the generated code")]
    dump_bytecode: bool,

    #[arg(long, help = "Print the symbol table")]
    dump_symbols: bool,

    #[arg(short, long, help = "Only print the error count")]
    quiet: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let Some(source_path) = cli.source.as_deref() else {
        let _ = Cli::command().print_help();
        println!();
        process::exit(2);
    };

    let source = match fs::read(source_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("Error reading file '{}': {}", source_path.display(), err);
            process::exit(1);
        }
    };

    if cli.tokens {
        dump_tokens(&source);
        return;
    }

    log::info!("compiling {}", source_path.display());
    let compilation = compile(source.as_slice());

    if !cli.quiet {
        for diag in &compilation.diagnostics {
            println!("{diag}");
        }
    }
    println!("{} errors detected", compilation.error_count());

    if cli.dump_symbols {
        print!("{}", compilation.symbols.dump());
    }
    if cli.dump_bytecode {
        dump_bytecode(&compilation);
    }

    if !compilation.is_ok() {
        process::exit(1);
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| source_path.with_extension("obj"));
    if let Err(err) = write_object(&compilation, &output) {
        eprintln!("Error writing '{}': {}", output.display(), err);
        process::exit(1);
    }
}

fn write_object(compilation: &Compilation, path: &Path) -> Result<(), bytecode::ObjectError> {
    let file = fs::File::create(path)?;
    let mut out = BufWriter::new(file);
    compilation.write_object(&Identity, &mut out)?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn dump_tokens(source: &[u8]) {
    for token in Lexer::new(source) {
        println!(
            "{:>4}:{:<3} {:<12} {}",
            token.span.start.line,
            token.span.start.column,
            token.kind.name(),
            token.lexeme
        );
    }
}

fn dump_bytecode(compilation: &Compilation) {
    let code = &compilation.code;
    println!("-- code ({} bytes) --", code.pc());
    if let Some(main) = code.main_pc() {
        println!("main @{main}");
    }
    match disassemble(code.as_bytes()) {
        Ok(listing) => {
            for (at, insn) in listing {
                println!("{at:>5}: {insn}");
            }
        }
        Err(err) => eprintln!("disassembly stopped: {err}"),
    }
}
