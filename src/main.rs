use std::env;
use std::io::{self, Write};
use std::process;

use reckon::document::Document;
use reckon::namespace::Namespace;

mod repl;

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.len() {
        1 => repl::start(),
        2 if args[1] == "-C" => usage(),
        2 => run_file(&args[1], false),
        3 if args[1] == "-C" => run_file(&args[2], true),
        _ => usage(),
    }
}

fn usage() {
    eprintln!("usage: reckon [-C] <file>");
    process::exit(2);
}

fn run_file(path: &str, check_only: bool) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading '{}': {}", path, err);
            process::exit(1);
        }
    };

    let mut ns = Namespace::new(true);
    let (doc, errors) = Document::parse(&source, &mut ns);
    for error in &errors {
        eprintln!("{}", error);
    }
    let mut failures = errors.len();

    let rendered = if check_only {
        doc.render(&mut io::sink())
    } else {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        doc.render(&mut out).and_then(|n| out.flush().map(|_| n))
    };
    match rendered {
        Ok(eval_failures) => failures += eval_failures,
        Err(err) => {
            eprintln!("error writing output: {}", err);
            process::exit(1);
        }
    }

    if check_only {
        match failures {
            0 => eprintln!("no errors"),
            n => eprintln!("{} error(s)", n),
        }
    }
    if failures > 0 {
        process::exit(1);
    }
}
