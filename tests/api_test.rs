//! Drives the process-wide boundary. Everything runs in one test because the
//! context and the plugin registry are global.

use std::sync::{Arc, Mutex};

use surface_bridge::api;
use surface_bridge::{
    decode_commands, BridgeConfig, BridgeError, CommandType, EngineKind, HostCallbacks,
    NativeString, NativeValue, SurfaceId, ViolationPolicy,
};

fn utf16(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

fn config() -> BridgeConfig {
    BridgeConfig::default()
        .with_engine(EngineKind::Quickjs)
        .with_violation_policy(ViolationPolicy::Report)
}

#[test]
fn host_boundary_lifecycle() {
    assert_eq!(
        api::create_surface(SurfaceId(1)).unwrap_err(),
        BridgeError::NotInitialized
    );

    api::register_plugin_source("greeting", Some(utf16("globalThis.greeting = 'hi';").as_slice()))
        .expect("register plugin");

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let callbacks = HostCallbacks::new()
        .on_js_error(move |surface, message| sink.lock().unwrap().push((surface, message.to_string())));
    api::init_context(config(), callbacks).expect("init");

    let handle = api::create_surface(SurfaceId(1)).expect("surface");
    assert_eq!(handle.surface(), SurfaceId(1));
    api::clear_command_items(handle).expect("clear");
    assert_eq!(api::command_item_size(handle).expect("size"), 0);

    let source = utf16(
        "if (globalThis.greeting !== 'hi') throw new Error('plugin missing');\n\
         const text = document.createTextNode(greeting);\n\
         document.appendChild(text);\n\
         bridge.addModuleListener((module, event, detail) => module === 'echo' ? detail : undefined);",
    );
    assert!(api::evaluate_script(handle, Some(source.as_slice()), "main.js", 1).expect("evaluate"));

    let kinds = api::with_command_items(handle, |commands| {
        commands.iter().map(|command| command.kind).collect::<Vec<_>>()
    })
    .expect("read");
    assert_eq!(
        kinds,
        vec![CommandType::CreateTextNode, CommandType::InsertAdjacentNode]
    );
    let decoded = decode_commands(&api::encode_command_items(handle).expect("encode")).expect("decode");
    assert_eq!(decoded[0].args, vec![NativeString::from("hi")]);
    api::clear_command_items(handle).expect("clear");
    assert!(api::take_command_items(handle).expect("take").is_empty());

    let echoed = api::invoke_module_event(
        handle,
        Some(utf16("echo").as_slice()),
        "message",
        None,
        &NativeValue::from("payload"),
    )
    .expect("module event");
    assert_eq!(echoed, NativeValue::from("payload"));

    // Script errors go to the host and are never fatal.
    assert!(!api::evaluate_script(handle, Some(utf16("undefinedFn()").as_slice()), "bad.js", 1).expect("evaluate"));
    assert!(!api::evaluate_byte_code(handle, &[1, 2, 3]).expect("byte code"));
    assert_eq!(errors.lock().unwrap().len(), 2);
    assert!(errors.lock().unwrap().iter().all(|(surface, _)| *surface == SurfaceId(1)));

    // Null source is an empty script.
    assert!(api::evaluate_script(handle, None, "empty.js", 1).expect("evaluate"));

    assert!(api::parse_markup(handle, b"<p>markup</p>").expect("markup"));
    assert!(api::command_item_size(handle).expect("size") > 0);

    let surface_id = api::dispatch_ui_task(handle, |surface| surface.id()).expect("ui task");
    assert_eq!(surface_id, SurfaceId(1));

    assert!(matches!(
        api::register_plugin_byte_code("late", &[0]),
        Err(BridgeError::PluginRegistrySealed(name)) if name == "late"
    ));

    // Hot restart retires the previous context and its surfaces.
    api::init_context(config(), HostCallbacks::new()).expect("re-init");
    assert_eq!(
        api::command_item_size(handle).unwrap_err(),
        BridgeError::StaleHandle(SurfaceId(1))
    );
    let fresh = api::create_surface(SurfaceId(1)).expect("surface after restart");
    api::dispose_surface(fresh).expect("dispose");
    assert_eq!(
        api::dispose_surface(fresh).unwrap_err(),
        BridgeError::StaleHandle(SurfaceId(1))
    );

    let other_thread = std::thread::spawn(|| api::init_context(config(), HostCallbacks::new()))
        .join()
        .expect("thread");
    assert_eq!(other_thread.unwrap_err(), BridgeError::NotController);

    let info = api::runtime_info();
    assert_eq!(info.app_name, "surface_bridge");
    assert!(std::ptr::eq(info, api::runtime_info()));
    assert_eq!(api::profile_mode_enabled(), cfg!(feature = "profile"));
}
