#![deny(unused_must_use)]
#![warn(clippy::pedantic)]
#![allow(clippy::wildcard_imports)]

use std::fs;

use anyhow::{anyhow, Result};

use tcc::args::Args;
use tcc::compiler::{Compiler, OutputKind};

fn main() -> Result<()> {
    let args = Args::parse();

    let file_exists = fs::exists(&args.input)?;
    if !file_exists {
        let err_msg = format!("File {} does not exist", args.input.to_string_lossy());
        return Err(anyhow!(err_msg));
    }

    let mut compiler = Compiler::new();
    if args.compile_only {
        compiler.output_type = OutputKind::Obj;
    }

    compiler.compile(&args.input)?;
    if compiler.nb_errors > 0 {
        return Err(anyhow!("{} error(s) generated", compiler.nb_errors));
    }

    let output = args.output.clone().unwrap_or_else(|| args.default_output());
    compiler.output_file(&output)?;

    Ok(())
}
