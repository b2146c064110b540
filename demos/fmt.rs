//! Format littlelisp source.
//!
//! Formats each file named on the command line, or standard input when none are
//! given, and prints the result.

use littlelisp::Formatter;
use std::io::{self, Read};
use std::process;

fn main() {
    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.iter().any(|arg| arg == "-h" || arg == "--help") {
        println!("Usage: fmt [FILE]...");
        return;
    }

    let mut formatter = Formatter::new();

    if paths.is_empty() {
        let mut source = String::new();
        if let Err(err) = io::stdin().read_to_string(&mut source) {
            eprintln!("Error reading standard input: {err}");
            process::exit(1);
        }
        print!("{}", formatter.format(&source));
        return;
    }

    let mut failed = false;
    for path in &paths {
        match std::fs::read_to_string(path) {
            Ok(source) => {
                if paths.len() > 1 {
                    println!(";; {path}");
                }
                println!("{}", formatter.format(&source));
            }
            Err(err) => {
                eprintln!("Error reading {path}: {err}");
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}
