mod common;

use std::io::Cursor;

use common::vm_with;
use ember::{disassemble, prelude::*, serialize};

const PROGRAM: &str = r#"
    class Greeter {
        let greeting = "hello";
        fn greet(name) { return this.greeting + ", " + name; }
    }
    module Util {
        fn square(x) { return x * x; }
        enum Level { Low, High = 10 }
    }
    fn outer() {
        let n = 'c';
        return fn () { return n; };
    }
    let g = new Greeter();
    println(g.greet("world"), Util.square(1.5), Util.Level.High, outer()());
    return 255, -7;
"#;

fn run_function(function: Function) -> (Vec<String>, String) {
    let (mut vm, out) = vm_with(VmConf::default());
    let values = vm.run(function).unwrap();
    let shown = values.iter().map(|v| vm.display(v)).collect();
    (shown, out.text())
}

#[test]
fn test_loaded_program_behaves_like_compiled() {
    let function = ember::compile(PROGRAM).unwrap();
    let bytes = serialize::serialize(&function);
    let loaded = serialize::deserialize(&bytes).unwrap();

    assert_eq!(loaded, function);
    assert_eq!(disassemble(&loaded), disassemble(&function));

    let expected = run_function(function);
    assert_eq!(expected.1, "hello, world 2.25 10 c\n");
    assert_eq!(expected.0, vec!["255", "-7"]);
    assert_eq!(run_function(loaded), expected);
}

#[test]
fn test_stream_round_trip() {
    let function = ember::compile("println(1);").unwrap();
    let mut buf = Vec::new();
    serialize::write_to(&function, &mut buf).unwrap();
    assert_eq!(&buf[..4], serialize::MAGIC);

    let loaded = serialize::read_from(&mut Cursor::new(buf)).unwrap();
    assert_eq!(loaded, function);
}

#[test]
fn test_trailing_bytes_are_rejected() {
    let function = ember::compile("let x = 1;").unwrap();
    let mut bytes = serialize::serialize(&function);
    bytes.push(0);
    let err = serialize::deserialize(&bytes).unwrap_err();
    assert!(matches!(err, EmberError::Bytecode(_)), "{err}");
}
