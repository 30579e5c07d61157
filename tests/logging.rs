//! Storage decisions are reported through `tracing`.

use std::{
    io,
    sync::{Arc, Mutex},
};

use polyfn::{Function, allocators::Counting};
use tracing::Level;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture(f: impl FnOnce()) -> String {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    captured.contents()
}

#[test]
fn test_storage_events() {
    let output = capture(|| {
        let mut f: Function<dyn Fn() -> u32> = Function::new(|| 1u32);
        f.set(|| 2u32);
        let big = [3u32; 8];
        f.set(move || big[0]);
        f.clear();
    });

    assert!(output.contains("allocated payload storage"), "{output}");
    assert!(output.contains("reusing payload storage"), "{output}");
    assert!(output.contains("reallocating payload storage"), "{output}");
    assert!(output.contains("releasing payload storage"), "{output}");
}

#[test]
fn test_deep_swap_event() {
    let output = capture(|| {
        let mut f: Function<dyn Fn() -> u32, Counting> = Function::new(|| 1u32);
        let mut g: Function<dyn Fn() -> u32, Counting> = Function::new(|| 2u32);
        f.swap(&mut g);
        assert_eq!(f.call(), 2);
        assert_eq!(g.call(), 1);
    });

    assert!(output.contains("DEBUG"), "{output}");
    assert!(
        output.contains("swapping between unequal allocators by deep copy"),
        "{output}"
    );
}
