//! Interactive shell: each line is defined into a persistent namespace and
//! its value printed back. Unbalanced parentheses continue onto the next
//! line, mirroring how a document definition may span lines inside parens.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use reckon::error::ErrorKind;
use reckon::namespace::Namespace;

pub fn start() {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("failed to initialize shell: {}", err);
            std::process::exit(1);
        }
    };

    let mut ns = Namespace::new(true);

    loop {
        let input = match read_input(&mut editor) {
            Some(line) => line,
            None => break,
        };
        if input.trim().is_empty() {
            continue;
        }

        let (_, result) = ns.define(&input);
        match result {
            Ok(var) => match var.arity() {
                Some(0) => match var.value() {
                    Ok(value) => println!("{}", value),
                    Err(err) => eprintln!("error: {}", err.kind.describe()),
                },
                arity => {
                    println!("defined {}({} args)", var.name(), arity.unwrap_or(0));
                }
            },
            Err(err) => {
                eprintln!("error: {}", err.kind.describe());
                let mut buf = String::new();
                match err.kind {
                    ErrorKind::Redef => {
                        ns.format_redef(&mut buf);
                        eprintln!("    redefinition of \"{}\"", buf);
                    }
                    ErrorKind::CircularDependency => {
                        ns.format_cycle(&mut buf);
                        eprintln!("    dependency chain: {}", buf);
                    }
                    _ => {}
                }
            }
        }
    }
}

fn read_input(editor: &mut DefaultEditor) -> Option<String> {
    let first_line = match editor.readline(">> ") {
        Ok(line) => line,
        Err(ReadlineError::Eof | ReadlineError::Interrupted) => return None,
        Err(err) => {
            eprintln!("readline error: {}", err);
            return None;
        }
    };

    if first_line.trim() == ".exit" {
        return None;
    }

    let mut buffer = first_line;
    while open_parens(&buffer) > 0 {
        match editor.readline(".. ") {
            Ok(line) => {
                buffer.push('\n');
                buffer.push_str(&line);
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => {
                eprintln!("readline error: {}", err);
                break;
            }
        }
    }

    let _ = editor.add_history_entry(&buffer);
    Some(buffer)
}

fn open_parens(input: &str) -> i32 {
    let mut depth = 0;
    for byte in input.bytes() {
        match byte {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'#' => break,
            _ => {}
        }
    }
    depth
}
