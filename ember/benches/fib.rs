use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ember::prelude::*;

const FIB: &str = "
fn fib(n) {
    if (n < 2) return n;
    return fib(n - 1) + fib(n - 2);
}
return fib(20);
";

fn criterion_benchmark(c: &mut Criterion) {
    let function = ember::compile(FIB).unwrap();

    {
        let mut vm = Vm::new(VmConf::default());

        c.bench_function("fib 20", |b| {
            b.iter(|| black_box(vm.run(function.clone()).unwrap()))
        });
    }

    {
        let mut vm = Vm::new(VmConf {
            function_cache: true,
            ..VmConf::default()
        });

        c.bench_function("fib 20 cached", |b| {
            b.iter(|| {
                // Cold cache on every iteration.
                vm.reset();
                black_box(vm.run(function.clone()).unwrap())
            })
        });
    }

    c.bench_function("compile fib", |b| {
        b.iter(|| black_box(ember::compile(black_box(FIB)).unwrap()))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
