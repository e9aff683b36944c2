#![allow(dead_code)]

use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

use ember::prelude::*;

/// Shared buffer the VM writes program output into.
#[derive(Clone, Default)]
pub struct Output(Rc<RefCell<Vec<u8>>>);

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Output {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

pub fn vm_with(conf: VmConf) -> (Vm, Output) {
    let out = Output::default();
    let mut vm = Vm::new(conf);
    vm.set_output(out.clone());
    (vm, out)
}

/// Run a script with the default configuration and return what it printed.
pub fn run(source: &str) -> String {
    run_with(VmConf::default(), source)
}

pub fn run_with(conf: VmConf, source: &str) -> String {
    let (mut vm, out) = vm_with(conf);
    if let Err(err) = vm.interpret(source) {
        panic!("script failed: {err}\n{source}");
    }
    out.text()
}

/// Run a script expected to fail at runtime.
pub fn run_err(source: &str) -> EmberError {
    let (mut vm, _) = vm_with(VmConf::default());
    match vm.interpret(source) {
        Ok(_) => panic!("script should have failed:\n{source}"),
        Err(err) => err,
    }
}
