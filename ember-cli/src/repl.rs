//! Interactive prompt.
//!
//! Every line is appended to a buffer and the whole buffer is run again
//! in a fresh VM, so earlier declarations stay visible.
use std::io::{self, BufRead, Write};

use ember::prelude::*;

const PROMPT: &str = "> ";

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Continue,
    Exit,
}

/// Process stdout as a cloneable writer the VM can own.
#[derive(Clone, Copy)]
pub struct Stdout;

impl Write for Stdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

pub struct Repl {
    conf: VmConf,
    buffer: String,
}

impl Repl {
    pub fn new(conf: VmConf) -> Self {
        Self {
            conf,
            buffer: String::new(),
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn run(&mut self, input: impl BufRead, mut out: impl Write + Clone + 'static) -> io::Result<()> {
        writeln!(out, "Ember v{} (type 'exit' to quit, 'clear' to reset)", ember::IMPL_VERSION)?;
        write!(out, "{PROMPT}")?;
        out.flush()?;

        for line in input.lines() {
            if self.handle_line(&line?, out.clone())? == Action::Exit {
                return Ok(());
            }
            write!(out, "{PROMPT}")?;
            out.flush()?;
        }
        writeln!(out)?;
        Ok(())
    }

    pub fn handle_line(&mut self, line: &str, mut out: impl Write + Clone + 'static) -> io::Result<Action> {
        match line.trim() {
            "exit" => {
                writeln!(out, "Bye!")?;
                return Ok(Action::Exit);
            }
            "clear" => {
                self.buffer.clear();
                return Ok(Action::Continue);
            }
            "" => return Ok(Action::Continue),
            _ => {}
        }

        let keep = self.buffer.len();
        self.buffer.push_str(line);
        self.buffer.push('\n');

        let mut vm = Vm::new(self.conf.clone());
        vm.set_output(out.clone());
        match vm.interpret(&self.buffer) {
            Ok(values) => {
                for value in values {
                    writeln!(out, "{}", vm.display(&value))?;
                }
            }
            Err(err) => {
                match err {
                    EmberError::Compile(diagnostics) => {
                        write!(out, "{}", diagnostics.render(&self.buffer, false))?
                    }
                    err => writeln!(out, "{err}")?,
                }
                // Keep the buffer runnable.
                self.buffer.truncate(keep);
            }
        }
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[derive(Clone, Default)]
    struct Output(Rc<RefCell<Vec<u8>>>);

    impl Write for Output {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Output {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    #[test]
    fn test_buffer_is_rerun() {
        let mut repl = Repl::new(VmConf::default());
        let out = Output::default();
        repl.handle_line("let x = 2;", out.clone()).unwrap();
        repl.handle_line("println(x * 21);", out.clone()).unwrap();
        assert_eq!(out.text(), "42\n");
        assert_eq!(repl.buffer(), "let x = 2;\nprintln(x * 21);\n");
    }

    #[test]
    fn test_clear_and_exit() {
        let mut repl = Repl::new(VmConf::default());
        let out = Output::default();
        repl.handle_line("let x = 1;", out.clone()).unwrap();
        assert_eq!(repl.handle_line("clear", out.clone()).unwrap(), Action::Continue);
        assert_eq!(repl.buffer(), "");
        assert_eq!(repl.handle_line("exit", out.clone()).unwrap(), Action::Exit);
        assert!(out.text().ends_with("Bye!\n"));
    }

    #[test]
    fn test_compile_error_drops_line() {
        let mut repl = Repl::new(VmConf::default());
        let out = Output::default();
        repl.handle_line("let x = 1;", out.clone()).unwrap();
        repl.handle_line("let = ;", out.clone()).unwrap();
        assert_eq!(repl.buffer(), "let x = 1;\n");
        assert!(out.text().contains("error"));
    }

    #[test]
    fn test_runtime_error_drops_line() {
        let mut repl = Repl::new(VmConf::default());
        let out = Output::default();
        repl.handle_line("let a = [];", out.clone()).unwrap();
        repl.handle_line("a[3];", out.clone()).unwrap();
        assert_eq!(repl.buffer(), "let a = [];\n");

        repl.handle_line("println(\"after\");", out.clone()).unwrap();
        let text = out.text();
        assert_eq!(text.matches("out of range").count(), 1, "{text}");
        assert!(text.ends_with("after\n"), "{text}");
    }

    #[test]
    fn test_run_reads_lines() {
        let mut repl = Repl::new(VmConf::default());
        let out = Output::default();
        let input = io::Cursor::new("println(\"hi\");\nexit\nprintln(1);\n");
        repl.run(input, out.clone()).unwrap();
        let text = out.text();
        assert!(text.contains("hi\n"));
        assert!(text.contains("Bye!"));
        assert!(!text.contains("1\n"));
    }
}
