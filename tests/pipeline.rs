//! Generator files from `demos/` through the salsa pipeline and the
//! reference runtime.

use std::path::Path;
use std::rc::Rc;

use insta::assert_snapshot;
use turnstile::{GeneratorFile, GeneratorSource, TurnstileDatabaseImpl, lower_with_diagnostics};
use turnstile_eval::{CancellationToken, CountingSourceFactory, Runtime, Value};
use turnstile_ir::{Flavor, StateMachineType};
use turnstile_lower::AllocatorSeed;

fn demo(name: &str) -> GeneratorFile {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name);
    GeneratorFile::read(&path).unwrap()
}

fn lower(file: GeneratorFile) -> StateMachineType {
    let db = TurnstileDatabaseImpl::default();
    let source = GeneratorSource::new(&db, file.method, file.options);
    let output = lower_with_diagnostics(&db, source);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    output.machine.unwrap()
}

#[test]
fn test_cleanup_demo() {
    let ty = Rc::new(lower(demo("cleanup.json")));
    assert_snapshot!(ty.states.iter().map(|(state, entry)| format!("{state} {} @ {}", entry.kind, entry.span)).collect::<Vec<_>>().join("\n"), @r"
    -6 yield @ 60..74
    -5 yield @ 40..54
    -4 yield @ 20..34
    ");

    let mut runtime = Runtime::new();
    let instance = runtime.invoke(&ty, vec![]).unwrap();
    let values = runtime.collect(&instance).unwrap();
    assert_eq!(Value::list(values).to_string(), "[1, 2, 3]");
    assert_eq!(runtime.take_log(), ["cleanup"]);

    let instance = runtime.invoke(&ty, vec![]).unwrap();
    assert!(runtime.move_next(&instance).unwrap());
    assert!(runtime.move_next(&instance).unwrap());
    runtime.request_dispose(&instance).unwrap();
    assert_eq!(runtime.take_log(), ["cleanup"]);
}

#[test]
fn test_countdown_demo() {
    let ty = Rc::new(lower(demo("countdown.json")));
    assert_eq!(ty.flavor, Flavor::Reiterable);
    let names: Vec<_> = ty.fields.iter().map(|field| field.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "state",
            "current",
            "dispose_mode",
            "awaiter",
            "param.from",
            "param.token",
            "proxy.from",
            "proxy.token",
            "hoisted.n",
            "combined_tokens",
        ]
    );

    let factory = CountingSourceFactory::new();
    let mut runtime = Runtime::with_factory(factory.clone());
    let enumerable = runtime
        .invoke(&ty, vec![Value::Int(3), Value::Token(CancellationToken::new())])
        .unwrap();

    let first = runtime
        .get_enumerator(&enumerable, Some(CancellationToken::new()))
        .unwrap();
    let second = runtime.get_enumerator(&enumerable, None).unwrap();
    assert_eq!(Value::list(runtime.collect(&first).unwrap()).to_string(), "[3, 2, 1]");
    assert!(runtime.move_next(&second).unwrap());
    runtime.request_dispose(&second).unwrap();

    // Only the first enumerator received a second token to link.
    assert_eq!((factory.created(), factory.disposed()), (1, 1));
}

#[test]
fn test_recompile_with_seed_from_debug_map() {
    let file = demo("cleanup.json");
    let first = lower(file.clone());

    let mut edited = file;
    edited.options.allocator_seed = Some(AllocatorSeed::from_debug_map(&first.states));
    let second = lower(edited);
    assert_eq!(first.states, second.states);
}

#[test]
fn test_generator_file_round_trips_through_json() {
    let file = demo("countdown.json");
    let text = file.to_json().unwrap();
    assert_eq!(GeneratorFile::from_json(&text).unwrap(), file);
}
