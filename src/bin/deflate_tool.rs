use std::fs::File;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use server_proxy::deflate::{deflate, inflate};
use server_proxy::error::Result;

fn usage() -> ! {
    eprintln!("usage: deflate_tool [-c | -d] [infile] [outfile]");
    eprintln!("  -c   compress (default)");
    eprintln!("  -d   decompress");
    eprintln!("  reads stdin / writes stdout when paths are omitted");
    std::process::exit(2);
}

enum Mode {
    Compress,
    Decompress,
}

fn open_input(path: Option<&str>) -> io::Result<Box<dyn Read>> {
    match path {
        Some(p) => Ok(Box::new(File::open(p)?)),
        None => Ok(Box::new(io::stdin())),
    }
}

fn open_output(path: Option<&str>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(p) => Ok(Box::new(File::create(p)?)),
        None => Ok(Box::new(io::stdout())),
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut mode = Mode::Compress;
    let mut paths: Vec<&str> = Vec::new();

    for arg in &args {
        match arg.as_str() {
            "-c" => mode = Mode::Compress,
            "-d" => mode = Mode::Decompress,
            "-h" | "--help" => usage(),
            other => paths.push(other),
        }
    }

    if paths.len() > 2 {
        usage();
    }

    let input = open_input(paths.first().copied())?;
    let output = open_output(paths.get(1).copied())?;

    match mode {
        Mode::Compress => deflate(input, output)?,
        Mode::Decompress => {
            let mut input = input;
            let mut output = output;
            inflate(&mut input, &mut output)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
