//! Integration tests for loader delegation and type identity.

use std::sync::{Arc, Barrier};
use std::thread;

use classlink::{prelude::*, Result};

fn source_of(classes: &[ClassDescriptor]) -> MemorySource {
    classes
        .iter()
        .fold(MemorySource::new(), |source, class| source.with_class(class))
}

// Route the crate's tracing output through the test harness
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

#[test]
fn test_parent_defines_shared_names() -> Result<()> {
    let shared = ClassBuilder::class("demo.lang.Object").build()?;
    let runtime = Runtime::builder()
        .bootstrap_source(source_of(&[shared.clone()]))
        .build();
    let app = runtime.create_loader("app", runtime.bootstrap(), source_of(&[shared]))?;

    let record = runtime.load_type(&app, "demo.lang.Object")?;
    assert!(record.identity().loader().is_bootstrap());
    assert!(app.cached("demo.lang.Object").is_none());

    let again = runtime.load_type(runtime.bootstrap(), "demo.lang.Object")?;
    assert!(Arc::ptr_eq(&record, &again));
    Ok(())
}

#[test]
fn test_sibling_loaders_define_distinct_types() -> Result<()> {
    let plugin = ClassBuilder::class("demo.plugin.Entry")
        .static_field("state", "I")
        .build()?;
    let runtime = Runtime::new();
    let first = runtime.create_loader("first", runtime.bootstrap(), source_of(&[plugin.clone()]))?;
    let second = runtime.create_loader("second", runtime.bootstrap(), source_of(&[plugin]))?;

    let a = runtime.load_type(&first, "demo.plugin.Entry")?;
    let b = runtime.load_type(&second, "demo.plugin.Entry")?;

    assert_eq!(a.name(), b.name());
    assert_ne!(a.identity(), b.identity());
    assert!(!a.is_assignable_to(&b));
    assert!(!a.identity().same_package(b.identity()));

    runtime.ensure_initialized(&a)?;
    a.statics().set_by_name(a.identity(), "state", Value::Int(9))?;
    runtime.ensure_initialized(&b)?;
    assert_eq!(b.statics().get_by_name("state"), Some(Value::Int(0)));

    assert_eq!(
        runtime.find_type(a.identity()).map(|r| Arc::ptr_eq(&r, &a)),
        Some(true)
    );
    Ok(())
}

#[test]
fn test_parent_cannot_see_child_types() -> Result<()> {
    let runtime = Runtime::new();
    let app = runtime.create_loader(
        "app",
        runtime.bootstrap(),
        source_of(&[ClassBuilder::class("demo.app.Main").build()?]),
    )?;

    assert!(runtime.load_type(&app, "demo.app.Main").is_ok());
    assert!(matches!(
        runtime.load_type(runtime.bootstrap(), "demo.app.Main"),
        Err(Error::NotFound(_))
    ));
    Ok(())
}

#[test]
fn test_three_level_chain() -> Result<()> {
    init_tracing();
    let runtime = Runtime::builder()
        .bootstrap_source(source_of(&[ClassBuilder::class("demo.lang.Base").build()?]))
        .build();
    let platform = runtime.create_loader(
        "platform",
        runtime.bootstrap(),
        source_of(&[ClassBuilder::class("demo.platform.Service")
            .extends("demo.lang.Base")
            .build()?]),
    )?;
    let app = runtime.create_loader(
        "app",
        &platform,
        source_of(&[ClassBuilder::class("demo.app.Impl")
            .extends("demo.platform.Service")
            .build()?]),
    )?;

    assert_eq!(
        app.delegation_chain(),
        vec![app.id(), platform.id(), LoaderId::BOOTSTRAP]
    );

    let record = runtime.load_type(&app, "demo.app.Impl")?;
    runtime.link(&record)?;

    let service = record.supertype().unwrap();
    assert_eq!(service.identity().loader(), platform.id());
    assert!(service
        .supertype()
        .unwrap()
        .identity()
        .loader()
        .is_bootstrap());
    assert!(runtime.diagnostics().of_kind(EventKind::Delegated).len() >= 2);
    Ok(())
}

#[test]
fn test_child_sources_untouched_when_parent_defines() -> Result<()> {
    let shared = ClassBuilder::class("demo.lang.Shared").build()?;
    let bootstrap_source = Arc::new(source_of(&[shared.clone()]));
    let first_source = Arc::new(source_of(&[shared.clone()]));
    let second_source = Arc::new(source_of(&[shared]));

    let runtime = Runtime::builder()
        .bootstrap_source(bootstrap_source.clone())
        .build();
    let first = runtime.create_loader("first", runtime.bootstrap(), first_source.clone())?;
    let second = runtime.create_loader("second", &first, second_source.clone())?;

    let record = runtime.load_type(&second, "demo.lang.Shared")?;
    assert!(record.identity().loader().is_bootstrap());
    assert!(Arc::ptr_eq(
        &record,
        &runtime.load_type(runtime.bootstrap(), "demo.lang.Shared")?
    ));
    assert!(Arc::ptr_eq(&record, &runtime.load_type(&first, "demo.lang.Shared")?));

    assert_eq!(bootstrap_source.fetch_count(), 1);
    assert_eq!(first_source.fetch_count(), 0);
    assert_eq!(second_source.fetch_count(), 0);
    assert!(first.is_empty());
    assert!(second.is_empty());
    Ok(())
}

#[test]
fn test_isolated_loader_sees_only_its_source() -> Result<()> {
    let runtime = Runtime::builder()
        .bootstrap_source(source_of(&[ClassBuilder::class("demo.lang.Base").build()?]))
        .build();
    let isolated = runtime.create_isolated_loader(
        "sandbox",
        source_of(&[ClassBuilder::class("demo.sandbox.Task")
            .extends("demo.lang.Base")
            .build()?]),
    );

    assert!(isolated.parent()?.is_none());
    let task = runtime.load_type(&isolated, "demo.sandbox.Task")?;
    assert!(matches!(
        runtime.load_type(&isolated, "demo.lang.Base"),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        runtime.link(&task),
        Err(Error::VerificationFailure { .. })
    ));
    Ok(())
}

#[test]
fn test_concurrent_loads_agree_on_one_record() -> Result<()> {
    init_tracing();
    let runtime = Runtime::new();
    let app = runtime.create_loader(
        "app",
        runtime.bootstrap(),
        source_of(&[ClassBuilder::class("demo.app.Shared")
            .field("x", "I")
            .build()?]),
    )?;

    let barrier = Barrier::new(16);
    let records: Vec<TypeRecordRc> = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    runtime.load_type(&app, "demo.app.Shared").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));
    assert_eq!(app.len(), 1);
    assert_eq!(
        runtime
            .diagnostics()
            .of_kind(EventKind::Defined)
            .len(),
        1
    );
    Ok(())
}

#[test]
fn test_arrays_follow_component_loader() -> Result<()> {
    let runtime = Runtime::new();
    let app = runtime.create_loader(
        "app",
        runtime.bootstrap(),
        source_of(&[ClassBuilder::class("demo.app.Point").build()?]),
    )?;

    let points = runtime.load_type(&app, "[Ldemo.app.Point;")?;
    assert_eq!(points.identity().loader(), app.id());
    assert!(points.is_linked());
    assert!(points.is_initialized());

    let ints = runtime.load_type(&app, "[[I")?;
    assert!(ints.identity().loader().is_bootstrap());
    assert!(runtime.bootstrap().cached("[I").is_some());
    Ok(())
}

#[test]
fn test_transformed_source() -> Result<()> {
    let scrambled: Vec<u8> = ClassBuilder::class("demo.app.Secret")
        .to_bytes()?
        .into_iter()
        .map(|byte| byte ^ 0x5A)
        .collect();
    let raw = Arc::new(MemorySource::new().with("demo.app.Secret", scrambled));

    let runtime = Runtime::new();
    let plain = runtime.create_loader("plain", runtime.bootstrap(), raw.clone())?;
    assert!(matches!(
        runtime.load_type(&plain, "demo.app.Secret"),
        Err(Error::Malformed { .. })
    ));

    let decrypting =
        runtime.create_loader("decrypting", runtime.bootstrap(), TransformSource::xor(raw, 0x5A))?;
    let secret = runtime.load_type(&decrypting, "demo.app.Secret")?;
    assert_eq!(secret.name(), "demo.app.Secret");
    assert!(secret.digest().is_some());
    Ok(())
}

#[test]
fn test_dropped_loader_releases_types() -> Result<()> {
    let runtime = Runtime::new();
    let plugin = runtime.create_loader(
        "plugin",
        runtime.bootstrap(),
        source_of(&[ClassBuilder::class("demo.plugin.Entry").build()?]),
    )?;
    let id = plugin.id();
    let entry = runtime.load_type(&plugin, "demo.plugin.Entry")?;

    drop(plugin);
    assert!(entry.loader().is_none());
    assert!(matches!(
        entry.defining_loader(),
        Err(Error::LoaderUnavailable(_))
    ));
    assert!(runtime.registry().loader(id).is_none());
    assert!(runtime.find_type(entry.identity()).is_none());
    assert_eq!(runtime.registry().prune(), 1);
    Ok(())
}
