//! Engine lifecycle, singleton and context table behaviour.

use crate::integration::test_utils::{started_registry, with_engine_env, GatedDriver};
use reclaim::engine::{
    engine, reset_engine, set_engine, EngineDriver, EngineRegistry, EngineState, InertDriver,
};
use reclaim::error::EngineError;
use reclaim::session::{Resource, SessionState};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_end_to_end_scenario() {
    let (driver, registry) = started_registry();
    assert_eq!(registry.state(), EngineState::Started);

    let context = registry.load("com.acme.Inventory").unwrap();
    assert_eq!(context.application_name(), "Inventory");
    assert!(matches!(
        registry.load("com.acme.Inventory"),
        Err(EngineError::AlreadyLoaded(_))
    ));

    let mut session = context.create_session().unwrap();
    session.close().unwrap();
    let mut session = context.create_session().unwrap();
    session.close().unwrap();

    assert!(registry.dispose(&context).unwrap());
    assert!(!registry.dispose(&context).unwrap());

    registry.shutdown().unwrap();
    assert_eq!(registry.state(), EngineState::Shutdown);
    assert_eq!(driver.store("com.acme.Inventory").open_sessions(), 0);
}

#[test]
fn test_operations_require_started_engine() {
    let registry = EngineRegistry::new(Arc::new(reclaim::engine::memory::MemoryDriver::new()));
    assert_eq!(registry.state(), EngineState::Available);

    let err = registry.load("app.Inventory").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Application engine is not active (state: AVAILABLE)"
    );
    assert!(registry.find_by_class_name("app.Inventory").is_err());

    registry.start().unwrap();
    let context = registry.load("app.Inventory").unwrap();
    registry.shutdown().unwrap();
    assert!(matches!(
        registry.dispose(&context),
        Err(EngineError::NotActive(EngineState::Shutdown))
    ));
}

#[test]
fn test_shutdown_with_open_sessions_in_several_contexts() {
    let (driver, registry) = started_registry();
    let inventory = registry.load("app.Inventory").unwrap();
    let billing = registry.load("app.Billing").unwrap();
    let inventory_session = inventory.create_session().unwrap();
    let billing_session = billing.create_session().unwrap();

    registry.shutdown().unwrap();

    assert!(inventory_session.state().is_released());
    assert!(billing_session.state().is_released());
    assert_eq!(driver.store("app.Inventory").open_sessions(), 0);
    assert_eq!(driver.store("app.Billing").open_sessions(), 0);
    assert!(registry.contexts().is_empty());
    assert!(registry.current().is_none());
}

#[test]
fn test_default_engine_from_property() {
    let test_dir = TempDir::new().unwrap();
    with_engine_env(&test_dir, |env| {
        env.set_driver_property("memory");
        let registry = engine();
        assert_eq!(registry.driver_name(), "memory");
        assert_eq!(registry.state(), EngineState::Available);
        assert!(Arc::ptr_eq(&registry, &engine()));

        registry.start().unwrap();
        let context = registry.load("app.Inventory").unwrap();
        let mut session = context.create_session().unwrap();
        session.close().unwrap();
    });
}

#[test]
fn test_default_engine_undefined_without_configuration() {
    let test_dir = TempDir::new().unwrap();
    with_engine_env(&test_dir, |_| {
        let registry = engine();
        assert_eq!(registry.state(), EngineState::Undefined);
        assert_eq!(registry.driver_name(), "inert");
        assert!(!registry.is_online());
        assert!(matches!(
            registry.start(),
            Err(EngineError::NoImplementation(_))
        ));
    });
}

#[test]
fn test_default_engine_unavailable_for_unknown_driver() {
    let test_dir = TempDir::new().unwrap();
    with_engine_env(&test_dir, |env| {
        env.set_driver_property("no-such-driver");
        let registry = engine();
        assert_eq!(registry.state(), EngineState::Unavailable);
        let err = registry.start().unwrap_err();
        assert!(err.to_string().contains("no-such-driver"));
    });
}

#[test]
fn test_set_engine_overrides_discovery() {
    let test_dir = TempDir::new().unwrap();
    with_engine_env(&test_dir, |env| {
        env.set_driver_property("memory");
        let discovered = engine();
        discovered.start().unwrap();

        let explicit = Arc::new(EngineRegistry::new(
            Arc::new(InertDriver::new("explicit")) as Arc<dyn EngineDriver>
        ));
        set_engine(Arc::clone(&explicit));

        assert_eq!(discovered.state(), EngineState::Shutdown);
        assert!(Arc::ptr_eq(&engine(), &explicit));
        assert_eq!(engine().driver_name(), "inert");

        let cleared = reset_engine().unwrap();
        assert!(Arc::ptr_eq(&cleared, &explicit));
        assert!(!Arc::ptr_eq(&engine(), &explicit));
    });
}

#[test]
fn test_shutdown_while_session_opens() {
    let gate = Arc::new(Barrier::new(2));
    let driver = Arc::new(GatedDriver::new(Arc::clone(&gate)));
    let registry = EngineRegistry::new(Arc::clone(&driver) as Arc<dyn EngineDriver>);
    registry.start().unwrap();
    let context = registry.load("app.Inventory").unwrap();

    let opener = {
        let context = Arc::clone(&context);
        thread::spawn(move || context.create_session().map(|session| session.state()))
    };
    gate.wait();
    registry.shutdown().unwrap();
    gate.wait();

    let outcome = opener.join().unwrap();
    assert!(
        matches!(
            outcome,
            Err(EngineError::ContextDisposed(_)) | Err(EngineError::Offline(_))
        ),
        "unexpected outcome: {:?}",
        outcome
    );
    assert_eq!(registry.state(), EngineState::Shutdown);
    assert!(context.is_disposed());
    assert_eq!(context.active_sessions(), 0);
    assert!(!registry.reaper().is_active());
    assert_eq!(driver.memory().store("app.Inventory").open_sessions(), 0);
}

#[test]
fn test_sessions_racing_shutdown_end_disposed() {
    const WORKERS: usize = 8;
    let (driver, registry) = started_registry();
    let context = registry.load("app.Inventory").unwrap();
    let held = context.create_session().unwrap();
    let ready = Arc::new(Barrier::new(WORKERS + 1));

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let context = Arc::clone(&context);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                ready.wait();
                let mut opened = 0usize;
                loop {
                    match context.create_session() {
                        Ok(mut session) => {
                            let _ = session.modify(Resource::new(format!("item-{}-{}", worker, opened)));
                            if opened % 2 == 0 {
                                let _ = session.close();
                            }
                            opened += 1;
                        }
                        Err(EngineError::ContextDisposed(_)) | Err(EngineError::Offline(_)) => {
                            return opened;
                        }
                        Err(other) => panic!("unexpected error: {}", other),
                    }
                }
            })
        })
        .collect();

    ready.wait();
    thread::sleep(Duration::from_millis(20));
    registry.shutdown().unwrap();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(held.state(), SessionState::Disposed);
    assert_eq!(registry.state(), EngineState::Shutdown);
    assert!(context.is_disposed());
    assert_eq!(context.active_sessions(), 0);
    assert!(!registry.reaper().is_active());
    assert_eq!(driver.store("app.Inventory").open_sessions(), 0);
}

#[test]
fn test_dispose_racing_shutdown_disposes_once() {
    let (_driver, registry) = started_registry();
    let registry = Arc::new(registry);
    let context = registry.load("app.Inventory").unwrap();
    let ready = Arc::new(Barrier::new(2));

    let disposer = {
        let registry = Arc::clone(&registry);
        let context = Arc::clone(&context);
        let ready = Arc::clone(&ready);
        thread::spawn(move || {
            ready.wait();
            registry.dispose(&context)
        })
    };
    ready.wait();
    registry.shutdown().unwrap();

    match disposer.join().unwrap() {
        Ok(_) | Err(EngineError::NotActive(EngineState::Shutdown)) => {}
        Err(other) => panic!("unexpected error: {}", other),
    }
    assert!(context.is_disposed());
    assert!(registry.contexts().is_empty());
    assert!(!registry.reaper().is_active());
}
