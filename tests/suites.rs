//! Suites driven the way a native filter drives them: through the basic
//! suite and the tables placed in its parameter block.

use filterbridge::suites::{
    ACTION_DESCRIPTOR_SUITE_NAME, ActionValue, BUFFER_SUITE_NAME, DESCRIPTOR_REGISTRY_SUITE_NAME,
    DescriptorToken, PSActionDescriptorProcs, PSBufferSuite1, PSDescriptorRegistryProcs, SuiteConfig,
    SuiteSession, codes,
};
use filterbridge::fourcc::fourcc;
use std::ffi::{CString, c_void};

fn acquire<T>(basic: &filterbridge::suites::SPBasicSuite, name: &str, version: i32) -> Result<&'static T, i32> {
    let name = CString::new(name).unwrap();
    let mut table: *const c_void = std::ptr::null();
    let err = unsafe { (basic.acquire_suite)(name.as_ptr(), version, &mut table) };
    if err != codes::NO_ERROR {
        assert!(table.is_null());
        return Err(err);
    }
    Ok(unsafe { &*table.cast::<T>() })
}

#[test]
fn test_buffer_suite_through_basic_suite() {
    let active = SuiteSession::new(&SuiteConfig::default().with_buffer_limit(10_000))
        .activate()
        .unwrap();
    let callbacks = active.callbacks();
    let basic = unsafe { &*callbacks.basic };

    let buffers: &PSBufferSuite1 = acquire(basic, BUFFER_SUITE_NAME, 1).unwrap();
    let mut size = 32_000u32;
    let first = unsafe { (buffers.new)(&mut size, 1000) };
    assert!(!first.is_null());
    assert_eq!(size, 8000);
    assert_eq!(unsafe { (buffers.get_space)() }, 2000);

    // The legacy procs draw from the same pool.
    let procs = unsafe { &*callbacks.buffer_procs };
    let mut id = std::ptr::null_mut();
    assert_ne!(unsafe { (procs.allocate)(4000, &mut id) }, 0);

    let mut held = first;
    unsafe { (buffers.dispose)(&mut held) };
    assert_eq!(unsafe { (procs.allocate)(4000, &mut id) }, 0);
    unsafe { (procs.free)(id) };

    let name = CString::new(BUFFER_SUITE_NAME).unwrap();
    assert_eq!(unsafe { (basic.release_suite)(name.as_ptr(), 1) }, codes::NO_ERROR);
}

#[test]
fn test_unknown_suites_are_refused() {
    let active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
    let basic = unsafe { &*active.callbacks().basic };
    assert_eq!(
        acquire::<c_void>(basic, "Photoshop Channel Ports Suite", 3).unwrap_err(),
        codes::SUITE_NOT_FOUND
    );
    assert!(acquire::<c_void>(basic, BUFFER_SUITE_NAME, 7).is_err());
}

#[test]
fn test_handles_lock_through_procs() {
    let active = SuiteSession::new(&SuiteConfig::default()).activate().unwrap();
    let procs = unsafe { &*active.callbacks().handle_procs };
    unsafe {
        let h = (procs.new)(16);
        assert!(!h.is_null());
        let data = (procs.lock)(h, 0);
        assert!(!data.is_null());
        data.write_bytes(0xAB, 16);
        (procs.unlock)(h);

        assert_eq!((procs.set_size)(h, 24), 0);
        assert_eq!((procs.get_size)(h), 24);
        let data = (procs.lock)(h, 0);
        assert_eq!(std::slice::from_raw_parts(data, 16), &[0xAB; 16]);
        (procs.unlock)(h);
        (procs.dispose)(h);
    }
}

#[test]
fn test_registered_descriptor_outlives_session() {
    let key = CString::new("com.example.twirl").unwrap();
    let active = SuiteSession::new(&SuiteConfig::default())
        .with_plugin_name("Twirl")
        .activate()
        .unwrap();
    let basic = unsafe { &*active.callbacks().basic };
    let actions: &PSActionDescriptorProcs = acquire(basic, ACTION_DESCRIPTOR_SUITE_NAME, 2).unwrap();
    let registry: &PSDescriptorRegistryProcs = acquire(basic, DESCRIPTOR_REGISTRY_SUITE_NAME, 1).unwrap();

    unsafe {
        let mut descriptor: DescriptorToken = std::ptr::null_mut();
        assert_eq!((actions.make)(&mut descriptor), codes::NO_ERROR);
        assert_eq!((actions.put_integer)(descriptor, fourcc(b"Angl"), 50), codes::NO_ERROR);
        assert_eq!((registry.register)(key.as_ptr(), descriptor, 1), codes::NO_ERROR);
        assert_eq!((actions.free)(descriptor), codes::NO_ERROR);

        let mut fetched: DescriptorToken = std::ptr::null_mut();
        assert_eq!((registry.get)(key.as_ptr(), &mut fetched), codes::NO_ERROR);
        assert!(!fetched.is_null());
        let mut angle = 0;
        assert_eq!((actions.get_integer)(fetched, fourcc(b"Angl"), &mut angle), codes::NO_ERROR);
        assert_eq!(angle, 50);
        (actions.free)(fetched);
    }

    let registry = active.finish().unwrap().into_registry();
    let stored = registry.get("com.example.twirl").unwrap();
    assert_eq!(stored.get(fourcc(b"Angl")), Some(&ActionValue::Integer(50)));
    assert_eq!(registry.is_persistent("com.example.twirl"), Some(true));
}
