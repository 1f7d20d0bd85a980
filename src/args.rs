use std::env;
use std::path::PathBuf;
use std::process::exit;

pub struct Args {
    pub output: Option<PathBuf>,
    pub compile_only: bool,
    pub input: PathBuf,
}

impl Args {
    pub fn parse() -> Self {
        let mut args = env::args().skip(1);

        let mut output = None;
        let mut compile_only = false;
        let mut input = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-o" => match args.next() {
                    Some(o) => output = Some(PathBuf::from(o)),
                    None => Self::bad_usage("-o requires an argument"),
                },
                "-c" => compile_only = true,
                "-v" => {
                    println!("tcc version {}", env!("CARGO_PKG_VERSION"));
                    exit(0)
                }
                "-h" | "--help" => Self::usage(),
                s if s.starts_with('-') => {
                    Self::bad_usage(&format!("unknown option '{s}'"));
                }
                _ => {
                    if input.is_some() {
                        Self::bad_usage("multiple input files");
                    }
                    input = Some(PathBuf::from(arg));
                }
            }
        }

        let Some(input) = input else {
            Self::bad_usage("no input file");
        };
        Self {
            output,
            compile_only,
            input,
        }
    }

    /// Output path when no `-o` was given: the input with its extension
    /// swapped for the output kind's.
    pub fn default_output(&self) -> PathBuf {
        let mut out = self.input.clone();
        out.set_extension(if self.compile_only { "obj" } else { "exe" });
        out
    }

    fn usage() -> ! {
        let cmd0 = env::args().next().unwrap_or("tcc".to_owned());
        let usage_msg = format!("Usage: {cmd0} [OPTIONS] INPUT.c\n");
        static OPTIONS: &str = concat!(
            "Options:\n",
            "  -o OUT         Set output filename\n",
            "  -c             Compile only, don't link\n",
            "  -v             Show version\n",
            "  -h             Show this message\n",
        );
        print!("Tiny C compiler\n\n{usage_msg}\n{OPTIONS}");
        exit(0)
    }

    fn bad_usage(msg: &str) -> ! {
        eprintln!("tcc: {msg}");
        exit(1)
    }
}
