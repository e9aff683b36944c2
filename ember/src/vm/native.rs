//! Built-in functions installed into the first global slots.
use std::time::{SystemTime, UNIX_EPOCH};

use itertools::Itertools;

use crate::{
    object::{NativeContext, NativeFn, Object},
    value::Value,
};

pub struct NativeDef {
    pub name: &'static str,
    /// Exact argument count, `None` accepts any.
    pub arity: Option<u8>,
    pub func: NativeFn,
}

/// Natives in global slot order.
pub const NATIVES: &[NativeDef] = &[
    NativeDef {
        name: "println",
        arity: None,
        func: println,
    },
    NativeDef {
        name: "print",
        arity: None,
        func: print,
    },
    NativeDef {
        name: "len",
        arity: Some(1),
        func: len,
    },
    NativeDef {
        name: "clock",
        arity: Some(0),
        func: clock,
    },
    NativeDef {
        name: "random",
        arity: Some(0),
        func: random,
    },
    NativeDef {
        name: "type_of",
        arity: Some(1),
        func: type_of,
    },
    NativeDef {
        name: "to_str",
        arity: Some(1),
        func: to_str,
    },
];

/// Names of the natives, in slot order.
pub fn native_names() -> impl Iterator<Item = &'static str> {
    NATIVES.iter().map(|def| def.name)
}

fn join(ctx: &NativeContext, args: &[Value]) -> String {
    args.iter().map(|arg| ctx.heap.stringify(arg)).join(" ")
}

fn println(ctx: &mut NativeContext, args: &[Value]) -> Result<Value, String> {
    let line = join(ctx, args);
    writeln!(ctx.out, "{line}").map_err(|err| err.to_string())?;
    Ok(Value::Null)
}

fn print(ctx: &mut NativeContext, args: &[Value]) -> Result<Value, String> {
    let text = join(ctx, args);
    write!(ctx.out, "{text}").map_err(|err| err.to_string())?;
    ctx.out.flush().map_err(|err| err.to_string())?;
    Ok(Value::Null)
}

fn len(ctx: &mut NativeContext, args: &[Value]) -> Result<Value, String> {
    let value = &args[0];
    let len = match value.as_object().and_then(|h| ctx.heap.get(h)) {
        Some(Object::Str(s)) => s.chars().count(),
        Some(Object::Array(items)) => items.len(),
        Some(Object::Dict(pairs)) => pairs.len(),
        Some(Object::Struct(fields)) => fields.len(),
        _ => return Err(format!("{} has no length", ctx.heap.type_name(value))),
    };
    Ok(Value::I64(len as i64))
}

fn clock(_ctx: &mut NativeContext, _args: &[Value]) -> Result<Value, String> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| err.to_string())?;
    Ok(Value::F64(elapsed.as_secs_f64()))
}

fn random(_ctx: &mut NativeContext, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::F64(rand::random::<f64>()))
}

fn type_of(ctx: &mut NativeContext, args: &[Value]) -> Result<Value, String> {
    let name = ctx.heap.type_name(&args[0]);
    Ok(Value::Object(ctx.heap.alloc(Object::Str(name.into()))))
}

fn to_str(ctx: &mut NativeContext, args: &[Value]) -> Result<Value, String> {
    let text = ctx.heap.stringify(&args[0]);
    Ok(Value::Object(ctx.heap.alloc(Object::Str(text.into()))))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{heap::Heap, vm::VmConf};

    fn call(heap: &mut Heap, func: NativeFn, args: &[Value]) -> (Result<Value, String>, String) {
        let mut out = Vec::new();
        let result = {
            let mut ctx = NativeContext { heap, out: &mut out };
            func(&mut ctx, args)
        };
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_println_joins_arguments() {
        let mut heap = Heap::new(&VmConf::default());
        let s = heap.alloc(Object::Str("x".into()));
        let (result, out) = call(
            &mut heap,
            println,
            &[Value::I64(1), Value::Object(s), Value::Bool(true)],
        );
        assert_eq!(result, Ok(Value::Null));
        assert_eq!(out, "1 x true\n");
    }

    #[test]
    fn test_len() {
        let mut heap = Heap::new(&VmConf::default());
        let s = heap.alloc(Object::Str("héllo".into()));
        let a = heap.alloc(Object::Array(vec![Value::Null; 3]));
        assert_eq!(call(&mut heap, len, &[Value::Object(s)]).0, Ok(Value::I64(5)));
        assert_eq!(call(&mut heap, len, &[Value::Object(a)]).0, Ok(Value::I64(3)));
        assert!(call(&mut heap, len, &[Value::I32(4)]).0.is_err());
    }

    #[test]
    fn test_random_in_unit_range() {
        let mut heap = Heap::new(&VmConf::default());
        for _ in 0..32 {
            match call(&mut heap, random, &[]).0 {
                Ok(Value::F64(x)) => assert!((0.0..1.0).contains(&x)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_type_of() {
        let mut heap = Heap::new(&VmConf::default());
        let result = call(&mut heap, type_of, &[Value::Bool(false)]).0.unwrap();
        assert_eq!(heap.as_str(&result), Some("bool"));
    }
}
