use criterion::*;
use stitch::{*, stack::*};
use std::ptr::addr_of_mut;

struct Pair {
  main: Fiber,
  echo: Fiber,
}

fn echo(arg: usize) {
  let pair = arg as *mut Pair;
  loop {
    unsafe { suspend(addr_of_mut!((*pair).echo)) };
  }
}

fn restarting(c: &mut Criterion) {
  let mut group = c.benchmark_group("restart");
  group.throughput(Throughput::Elements(1));
  group.bench_function(
    "stitch",
    |b| {
      unsafe {
        let region = OsRegion::new(64 * 1024, PageSize::get().unwrap()).unwrap();
        let mut stacks = region.allocator();
        let mut pair = Box::new(Pair { main: Fiber::new(), echo: Fiber::new() });
        let p = &mut *pair as *mut Pair;
        let fiber = addr_of_mut!((*p).echo);
        create(&mut stacks, fiber, 8192, echo, p as usize).unwrap();
        b.iter(|| {
          restart(black_box(fiber), echo, p as usize);
        });
      }
    }
  );
}

fn ping_pong(c: &mut Criterion) {
  let mut group = c.benchmark_group("ping_pong");
  group.throughput(Throughput::Elements(1));
  group.bench_function(
    "stitch",
    |b| {
      unsafe {
        let region = OsRegion::new(64 * 1024, PageSize::get().unwrap()).unwrap();
        let mut stacks = region.allocator();
        let mut pair = Box::new(Pair { main: Fiber::new(), echo: Fiber::new() });
        let p = &mut *pair as *mut Pair;
        let (main, fiber) = (addr_of_mut!((*p).main), addr_of_mut!((*p).echo));
        create(&mut stacks, fiber, 8192, echo, p as usize).unwrap();
        b.iter(|| {
          swap(fiber, main);
        });
      }
    }
  );
}

criterion_group!(
  benches,
  restarting,
  ping_pong,
);
criterion_main!(benches);
