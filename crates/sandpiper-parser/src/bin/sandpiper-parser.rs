use sandpiper_parser::{ast_dump::dump_module, parse, transform};
use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    let (raw, filename) = match args.as_slice() {
        [_, file] => (false, file),
        [_, flag, file] if flag == "--raw" => (true, file),
        _ => {
            eprintln!("Usage: {} [--raw] <file.py>", args[0]);
            eprintln!();
            eprintln!("Parse a Sandpiper script and dump its AST structure");
            eprintln!("(with input calls rewritten, unless --raw is given)");
            process::exit(1);
        }
    };

    // Read file
    let input = match fs::read_to_string(filename) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", filename, e);
            process::exit(1);
        }
    };

    // Parse
    let result = if raw { parse(&input) } else { transform(&input) };
    let module = match result {
        Ok(module) => module,
        Err(e) => {
            eprintln!("Parse error in '{}':", filename);
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    // Dump AST
    print!("{}", dump_module(&module));
}
