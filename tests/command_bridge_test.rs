use std::sync::Arc;

use surface_bridge::{
    decode_commands, BridgeConfig, CommandType, Context, EngineKind, HostCallbacks, NativeString,
    NativeValue, Surface, SurfaceId, TargetId, ViolationPolicy,
};

fn headless_context() -> Context {
    Context::new(
        BridgeConfig::default()
            .with_engine(EngineKind::Headless)
            .with_violation_policy(ViolationPolicy::Report),
        HostCallbacks::new(),
    )
}

fn headless_surface(id: i32) -> Surface {
    let config = BridgeConfig::default().with_engine(EngineKind::Headless);
    Surface::new(SurfaceId(id), &config, Arc::new(HostCallbacks::new())).expect("surface")
}

#[test]
fn text_data_writes_are_queued_in_call_order() {
    let mut surface = headless_surface(1);
    surface.clear_commands();

    let values = ["one", "two", "", "\u{1F600}", "five"];
    let text = surface.with_dom(|dom| {
        let text = dom
            .construct("TextNode", &[NativeValue::from("initial")])
            .expect("construct text");
        for value in values {
            dom.set_property(text, "data", &NativeValue::from(value))
                .expect("set data");
            assert_eq!(
                dom.get_property(text, "data").expect("get data"),
                Some(NativeValue::from(value))
            );
        }
        text
    });

    let commands = surface.take_commands();
    assert_eq!(commands.len(), values.len() + 1);
    assert_eq!(commands[0].kind, CommandType::CreateTextNode);
    assert_eq!(commands[0].target, text);
    assert_eq!(commands[0].args, vec![NativeString::from("initial")]);
    assert!(commands[0].aux.is_some(), "creation carries the event target");

    for (command, value) in commands[1..].iter().zip(values) {
        assert_eq!(command.kind, CommandType::SetProperty);
        assert_eq!(command.target, text);
        assert_eq!(command.args, vec![NativeString::from("data"), NativeString::from(value)]);
        assert!(command.aux.is_none());
    }
}

#[test]
fn draining_an_empty_buffer_is_idempotent() {
    let mut surface = headless_surface(2);
    surface.clear_commands();
    surface.clear_commands();
    assert_eq!(surface.command_count(), 0);
    assert!(surface.take_commands().is_empty());
    assert!(surface.take_commands().is_empty());
    surface.with_commands(|commands| assert!(commands.is_empty()));
}

#[test]
fn node_name_reads_do_not_queue_commands() {
    let mut surface = headless_surface(3);
    surface.with_dom(|dom| {
        let text = dom
            .construct("TextNode", &[NativeValue::from("x")])
            .expect("construct text");
        let before = dom.commands().size();
        assert_eq!(
            dom.get_property(text, "nodeName").expect("nodeName"),
            Some(NativeValue::from("#text"))
        );
        assert_eq!(
            dom.get_property(text, "nodeType").expect("nodeType"),
            Some(NativeValue::Int64(3))
        );
        assert_eq!(dom.commands().size(), before);
    });
    assert!(surface.take_commands().len() >= 2);
}

#[test]
fn comment_length_counts_utf16_units() {
    let mut surface = headless_surface(4);
    surface.with_dom(|dom| {
        let plain = dom
            .construct("CommentNode", &[NativeValue::from("hello")])
            .expect("construct comment");
        let emoji = dom
            .construct("CommentNode", &[NativeValue::from("\u{1F600}")])
            .expect("construct comment");
        assert_eq!(
            dom.get_property(plain, "length").expect("length"),
            Some(NativeValue::Int64(5))
        );
        assert_eq!(
            dom.get_property(emoji, "length").expect("length"),
            Some(NativeValue::Int64(2))
        );

        // Read-only: the assignment is ignored and nothing is queued.
        let before = dom.commands().size();
        dom.set_property(plain, "data", &NativeValue::from("changed"))
            .expect("assignment is ignored");
        assert_eq!(
            dom.get_property(plain, "data").expect("data"),
            Some(NativeValue::from("hello"))
        );
        assert_eq!(dom.commands().size(), before);
    });
    surface.clear_commands();
}

#[test]
fn surfaces_have_separate_buffers_and_id_spaces() {
    let context = headless_context();
    let first = context.create_surface(SurfaceId(10)).expect("first surface");
    let second = context.create_surface(SurfaceId(11)).expect("second surface");

    let a = context
        .with_surface(first, |surface| {
            surface.clear_commands();
            surface.with_dom(|dom| dom.construct("TextNode", &[NativeValue::from("a")]))
        })
        .expect("first entry")
        .expect("construct a");
    let b = context
        .with_surface(second, |surface| {
            surface.with_dom(|dom| dom.construct("TextNode", &[NativeValue::from("b")]))
        })
        .expect("second entry")
        .expect("construct b");

    // Both namespaces start after their own document.
    assert_eq!(a, b);
    assert_eq!(a, TargetId(2));

    let first_commands = context
        .with_surface(first, |surface| surface.take_commands())
        .expect("drain first");
    let second_commands = context
        .with_surface(second, |surface| surface.take_commands())
        .expect("drain second");
    assert_eq!(first_commands.len(), 1);
    assert_eq!(first_commands[0].args, vec![NativeString::from("a")]);
    assert_eq!(second_commands.len(), 2, "document creation plus text");
    assert_eq!(second_commands[1].args, vec![NativeString::from("b")]);
    assert_eq!(
        second_commands[1].aux.map(|aux| aux.surface),
        Some(SurfaceId(11))
    );
}

#[test]
fn style_remove_property_returns_prior_value_once() {
    let mut surface = headless_surface(5);
    surface.with_dom(|dom| {
        let element = dom
            .construct("Element", &[NativeValue::from("div")])
            .expect("construct element");
        let set = |name: &str, value: &str| {
            vec![NativeValue::from(name), NativeValue::from(value)]
        };
        dom.invoke_style(element, "setProperty", &set("color", "red"))
            .expect("setProperty");
        let style_commands = |dom: &surface_bridge::DomState| {
            dom.commands()
                .data()
                .iter()
                .filter(|command| command.kind == CommandType::SetStyle)
                .count()
        };
        assert_eq!(style_commands(dom), 1);

        let removed = dom
            .invoke_style(element, "removeProperty", &[NativeValue::from("color")])
            .expect("removeProperty");
        assert_eq!(removed, NativeValue::from("red"));
        assert_eq!(
            dom.invoke_style(element, "getPropertyValue", &[NativeValue::from("color")])
                .expect("getPropertyValue"),
            NativeValue::from("")
        );
        assert_eq!(style_commands(dom), 2);

        let again = dom
            .invoke_style(element, "removeProperty", &[NativeValue::from("color")])
            .expect("removeProperty");
        assert_eq!(again, NativeValue::from(""));
        assert_eq!(style_commands(dom), 2, "no duplicate removal");

        let removal = dom
            .commands()
            .data()
            .iter()
            .rev()
            .find(|command| command.kind == CommandType::SetStyle)
            .expect("removal command");
        assert_eq!(removal.target, element, "addressed to the owning element");
        assert_eq!(removal.args, vec![NativeString::from("color"), NativeString::new()]);
    });
}

#[test]
fn wire_stream_matches_the_buffer() {
    let mut surface = headless_surface(6);
    assert!(surface.parse_markup("<ul><li class=\"a\">one</li><!--x--></ul>"));
    let encoded = surface.encode_commands();
    let decoded = decode_commands(&encoded).expect("decode");
    surface.with_commands(|commands| assert_eq!(decoded, commands));

    let kinds: Vec<CommandType> = decoded.iter().map(|command| command.kind).collect();
    assert_eq!(kinds[0], CommandType::CreateDocument);
    assert!(kinds.contains(&CommandType::SetAttribute));
    assert!(kinds.contains(&CommandType::CreateComment));
    // Every node is created before it is inserted.
    for (index, command) in decoded.iter().enumerate() {
        if command.kind == CommandType::InsertAdjacentNode {
            let child = command.args[1].to_string_lossy();
            let created_before = decoded[..index].iter().any(|earlier| {
                earlier.kind.is_creation() && earlier.target.get().to_string() == child
            });
            assert!(created_before, "node {child} inserted before creation");
        }
    }
}

#[test]
fn quickjs_surface_mirrors_script_mutations() {
    let config = BridgeConfig::default().with_engine(EngineKind::Quickjs);
    let mut surface =
        Surface::new(SurfaceId(7), &config, Arc::new(HostCallbacks::new())).expect("surface");
    surface.clear_commands();

    let ok = surface.evaluate_script(
        &NativeString::from(
            "const t = document.createTextNode('v0');\n\
             for (let i = 1; i <= 3; i++) { t.data = 'v' + i; }\n\
             document.appendChild(t);",
        ),
        "mirror.js",
        1,
    );
    assert!(ok);

    let commands = surface.take_commands();
    let kinds: Vec<CommandType> = commands.iter().map(|command| command.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CommandType::CreateTextNode,
            CommandType::SetProperty,
            CommandType::SetProperty,
            CommandType::SetProperty,
            CommandType::InsertAdjacentNode,
        ]
    );
    assert_eq!(commands[0].args, vec![NativeString::from("v0")]);
    assert_eq!(commands[3].args[1], "v3");

    assert!(!surface.evaluate_script(&NativeString::from("null.x"), "bad.js", 1));
}
