//! REPL for gno
//!
//! Every accepted input is kept, and each new input rebuilds and reruns
//! the whole session as one `main` package. Output from earlier inputs is
//! dropped, so only what the new input prints is shown.

use crate::ast::{Ast, NodeKind};
use crate::interp::OutputSink;
use crate::parser::parse_expr;
use crate::runtime::{Runtime, RuntimeOptions};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;

const PROMPT: &str = "gno> ";
const HISTORY_FILE: &str = ".gnovm_history";
const FILE_NAME: &str = "<repl>";

/// Inputs accepted so far, split by where they go in the session file.
#[derive(Debug, Clone, Default)]
pub struct Session {
    imports: Vec<String>,
    decls: Vec<String>,
    stmts: Vec<String>,
    /// Bytes printed by the statements accepted so far.
    printed: usize,
}

/// What an input line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Import,
    Decl,
    Stmt,
}

fn classify(input: &str) -> InputKind {
    let first = input.split_whitespace().next().unwrap_or_default();
    match first {
        "import" => InputKind::Import,
        "func" | "type" | "var" | "const" => InputKind::Decl,
        _ => InputKind::Stmt,
    }
}

/// Bare expressions other than calls are printed.
fn is_printable_expr(input: &str) -> bool {
    let mut ast = Ast::new();
    match parse_expr(&mut ast, input) {
        Ok(x) => !matches!(ast.kind(x), NodeKind::Call { .. }),
        Err(_) => false,
    }
}

impl Session {
    /// The session as a single source file.
    pub fn source(&self) -> String {
        let mut out = String::from("package main\n\n");
        for i in &self.imports {
            out.push_str(i);
            out.push('\n');
        }
        for d in &self.decls {
            out.push_str(d);
            out.push_str("\n\n");
        }
        out.push_str("func main() {\n");
        for s in &self.stmts {
            out.push('\t');
            out.push_str(s);
            out.push('\n');
        }
        out.push_str("}\n");
        out
    }

    /// Adds `input` and reruns the session. On failure the input is
    /// dropped and the session is left as it was. Returns the new output.
    pub fn eval(&mut self, input: &str, options: &RuntimeOptions) -> crate::Result<String> {
        let mut next = self.clone();
        match classify(input) {
            InputKind::Import => next.imports.push(input.to_string()),
            InputKind::Decl => next.decls.push(input.to_string()),
            InputKind::Stmt if is_printable_expr(input) => next.stmts.push(format!("println({input})")),
            InputKind::Stmt => next.stmts.push(input.to_string()),
        }
        let (output, buf) = OutputSink::buffer();
        let mut rt = Runtime::new(RuntimeOptions {
            output,
            ..options.clone()
        })?;
        rt.run_files(&[(FILE_NAME.to_string(), next.source())])?;
        let all = buf.borrow().clone();
        let fresh = all.get(self.printed..).unwrap_or_default().to_string();
        next.printed = all.len();
        *self = next;
        Ok(fresh)
    }
}

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    session: Session,
    options: RuntimeOptions,
    history_path: Option<PathBuf>,
}

impl Repl {
    pub fn new(options: RuntimeOptions) -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let history_path = dirs_home().map(|h| h.join(HISTORY_FILE));
        let mut repl = Repl {
            editor,
            session: Session::default(),
            options,
            history_path,
        };
        if let Some(ref path) = repl.history_path {
            let _ = repl.editor.load_history(path);
        }
        Ok(repl)
    }

    pub fn run(&mut self) -> RlResult<()> {
        println!("gnovm {}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line);
                    if line.starts_with(':') {
                        if self.handle_command(line) {
                            break;
                        }
                        continue;
                    }
                    match self.session.eval(line, &self.options) {
                        Ok(out) => print!("{out}"),
                        Err(e) => eprintln!("{e}"),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(ref path) = self.history_path {
            let _ = self.editor.save_history(path);
        }
        Ok(())
    }

    /// Handles `:` commands; returns true to quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":quit" | ":q" | ":exit" => true,
            ":help" | ":h" | ":?" => {
                print_help();
                false
            }
            ":reset" => {
                self.session = Session::default();
                false
            }
            ":source" => {
                print!("{}", self.session.source());
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help, :h, :?   Show this help");
    println!("  :quit, :q       Exit");
    println!("  :reset          Forget every input");
    println!("  :source         Show the session as a file");
    println!();
    println!("Inputs starting with import, func, type, var or const are");
    println!("declarations; anything else runs inside main. Bare");
    println!("expressions are printed.");
}

fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("import \"strings\""), InputKind::Import);
        assert_eq!(classify("func f() int { return 1 }"), InputKind::Decl);
        assert_eq!(classify("x := 1"), InputKind::Stmt);
    }

    #[test]
    fn test_printable_expr() {
        assert!(is_printable_expr("1 + 2"));
        assert!(!is_printable_expr("println(1)"));
        assert!(!is_printable_expr("x := 1"));
    }

    #[test]
    fn test_session_only_shows_new_output() {
        let opts = RuntimeOptions::default();
        let mut s = Session::default();
        assert_eq!(s.eval("x := 20", &opts).unwrap(), "");
        assert_eq!(s.eval("println(x)", &opts).unwrap(), "20\n");
        assert_eq!(s.eval("func double(n int) int { return n * 2 }", &opts).unwrap(), "");
        assert_eq!(s.eval("double(x) + 2", &opts).unwrap(), "42\n");
    }

    #[test]
    fn test_session_drops_failed_input() {
        let opts = RuntimeOptions::default();
        let mut s = Session::default();
        assert!(s.eval("y + 1", &opts).is_err());
        assert_eq!(s.stmts.len(), 0);
        assert_eq!(s.eval("1 + 1", &opts).unwrap(), "2\n");
    }
}
