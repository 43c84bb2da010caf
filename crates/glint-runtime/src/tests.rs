#[cfg(test)]
mod tests {
    use std::cell::{Cell as StdCell, RefCell};
    use std::rc::Rc;

    use crate::prelude::*;

    type Log = Rc<RefCell<Vec<String>>>;

    fn app() -> Application {
        app_with(RenderConfig::default())
    }

    fn app_with(config: RenderConfig) -> Application {
        let _ = env_logger::builder().is_test(true).try_init();
        Application::new(config)
    }

    fn every_hook() -> Rc<Fragment> {
        let fragment = Hook::ALL
            .iter()
            .fold(Fragment::new("every-hook"), |f, hook| f.hook(*hook, |_| Ok(())));
        Rc::new(fragment)
    }

    /// `name:hook` for every hook that fires.
    fn hook_log(app: &Application) -> Log {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        app.renderer().add_hook_observer(move |instance, hook| {
            l.borrow_mut().push(format!("{}:{hook}", instance.name()));
        });
        log
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.borrow_mut())
    }

    /// `top(twitter) -> middle(name) -> bottom(website)`, plus a `sibling`
    /// next to `bottom` when asked for.
    fn three_levels(app: &Application, with_sibling: bool) {
        let hooks = every_hook();
        app.register_component(
            "top",
            ComponentDescriptor::builder("top")
                .fragment(hooks.clone())
                .layout(Template::new("top", |b| {
                    let twitter = b.get("twitter");
                    b.text("Top: ");
                    b.component("middle").arg("name", twitter).finish()
                }))
                .build(),
        );
        app.register_component(
            "middle",
            ComponentDescriptor::builder("middle")
                .fragment(hooks.clone())
                .layout(Template::new("middle", move |b| {
                    let name = b.get("name");
                    b.text("Middle: ");
                    b.component("bottom").arg("website", name).finish()?;
                    if with_sibling {
                        b.component("sibling").finish()?;
                    }
                    Ok(())
                }))
                .build(),
        );
        for name in ["bottom", "sibling"] {
            app.register_component(
                name,
                ComponentDescriptor::builder(name)
                    .fragment(hooks.clone())
                    .layout(Template::new(name, |b| {
                        let website = b.get("website");
                        b.text(website);
                        Ok(())
                    }))
                    .build(),
            );
        }
    }

    fn invoke_top() -> Template {
        Template::new("application", |b| {
            let twitter = b.get("twitter");
            b.component("top").arg("twitter", twitter).finish()
        })
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn initial_render_hook_order() {
        let app = app();
        three_levels(&app, false);
        let log = hook_log(&app);
        app.render(&invoke_top(), Record::new().with("twitter", "@tomdale"))
            .unwrap();

        assert_eq!(
            take(&log),
            strings(&[
                "top:init",
                "top:didReceiveAttrs",
                "top:willRender",
                "top:willInsertElement",
                "middle:init",
                "middle:didReceiveAttrs",
                "middle:willRender",
                "middle:willInsertElement",
                "bottom:init",
                "bottom:didReceiveAttrs",
                "bottom:willRender",
                "bottom:willInsertElement",
                "bottom:didInsertElement",
                "bottom:didRender",
                "middle:didInsertElement",
                "middle:didRender",
                "top:didInsertElement",
                "top:didRender",
            ])
        );
        insta::assert_snapshot!(
            app.html(),
            @r#"<div id="glint2" class="glint-view">Top: <div id="glint3" class="glint-view">Middle: <div id="glint4" class="glint-view">@tomdale</div></div></div>"#
        );
    }

    #[test]
    fn leaf_change_updates_only_its_ancestor_chain() {
        let app = app();
        three_levels(&app, true);
        let log = hook_log(&app);
        let root = app
            .render(&invoke_top(), Record::new().with("twitter", "@tomdale"))
            .unwrap();
        take(&log);

        let middle = root.child_views()[0].child_views()[0].clone();
        let views = middle.child_views();
        assert_eq!(views.len(), 2);
        let bottom = views[0].clone();
        app.run(|| bottom.set("website", "tomdale.net")).unwrap();

        assert_eq!(
            take(&log),
            strings(&[
                "top:willUpdate",
                "top:willRender",
                "middle:willUpdate",
                "middle:willRender",
                "bottom:willUpdate",
                "bottom:willRender",
                "bottom:didUpdate",
                "bottom:didRender",
                "middle:didUpdate",
                "middle:didRender",
                "top:didUpdate",
                "top:didRender",
            ])
        );
        assert_eq!(bottom.text_content(), "tomdale.net");
    }

    #[test]
    fn changed_args_flow_down_with_attrs_hooks() {
        let app = app();
        three_levels(&app, true);
        let log = hook_log(&app);
        let context = Rc::new(Record::new().with("twitter", "@tomdale"));
        app.render(&invoke_top(), Value::Object(context.clone()))
            .unwrap();
        take(&log);

        app.run(|| context.set("twitter", "@hipstertomdale")).unwrap();
        let mut expected = Vec::new();
        for name in ["top", "middle", "bottom"] {
            for hook in ["didUpdateAttrs", "didReceiveAttrs", "willUpdate", "willRender"] {
                expected.push(format!("{name}:{hook}"));
            }
        }
        for name in ["bottom", "middle", "top"] {
            for hook in ["didUpdate", "didRender"] {
                expected.push(format!("{name}:{hook}"));
            }
        }
        assert_eq!(take(&log), expected);
        assert!(app.html().contains("@hipstertomdale"));
    }

    #[test]
    fn stable_rerender() {
        let app = app();
        three_levels(&app, true);
        let log = hook_log(&app);
        let context = Rc::new(Record::new().with("twitter", "@tomdale"));
        let root = app
            .render(&invoke_top(), Value::Object(context.clone()))
            .unwrap();
        take(&log);
        let before = app.renderer().stats();

        assert!(!app.renderer().flush().unwrap());
        context.set("twitter", "@tomdale").unwrap();
        assert!(!app.renderer().has_pending());

        root.rerender().unwrap();
        assert!(app.renderer().flush().unwrap());

        let after = app.renderer().stats();
        assert!(take(&log).is_empty());
        assert_eq!(after.hooks_fired, before.hooks_fired);
        assert_eq!(after.dom_mutations, before.dom_mutations);
        assert_eq!(after.flushes, before.flushes + 1);
    }

    #[test]
    fn teardown_hook_order() {
        let app = app();
        three_levels(&app, false);
        let log = hook_log(&app);
        app.render(&invoke_top(), Record::new().with("twitter", "@tomdale"))
            .unwrap();
        take(&log);

        app.teardown().unwrap();
        assert_eq!(
            take(&log),
            strings(&[
                "top:willDestroyElement",
                "top:willClearRender",
                "middle:willDestroyElement",
                "middle:willClearRender",
                "bottom:willDestroyElement",
                "bottom:willClearRender",
                "bottom:didDestroyElement",
                "middle:didDestroyElement",
                "top:didDestroyElement",
                "top:willDestroy",
                "middle:willDestroy",
                "bottom:willDestroy",
            ])
        );
        assert_eq!(app.html(), "");
        assert!(matches!(
            app.render(&invoke_top(), Record::new()),
            Err(Error::DestroyedObject { .. })
        ));
    }

    #[test]
    fn non_interactive_rendering() {
        let app = app_with(RenderConfig::non_interactive());
        three_levels(&app, false);
        let log = hook_log(&app);
        let context = Rc::new(Record::new().with("twitter", "@tomdale"));
        let root = app
            .render(&invoke_top(), Value::Object(context.clone()))
            .unwrap();

        assert_eq!(
            take(&log),
            strings(&[
                "top:init",
                "top:didReceiveAttrs",
                "middle:init",
                "middle:didReceiveAttrs",
                "bottom:init",
                "bottom:didReceiveAttrs",
            ])
        );
        assert!(app.html().contains("@tomdale"));
        let top = root.child_views()[0].clone();
        assert!(matches!(
            top.element(),
            Err(Error::IllegalElementAccess { .. })
        ));

        app.run(|| context.set("twitter", "@wycats")).unwrap();
        assert_eq!(
            take(&log),
            strings(&[
                "top:didUpdateAttrs",
                "top:didReceiveAttrs",
                "middle:didUpdateAttrs",
                "middle:didReceiveAttrs",
                "bottom:didUpdateAttrs",
                "bottom:didReceiveAttrs",
            ])
        );
        assert!(matches!(
            app.dispatch("click", app.renderer().body()),
            Err(Error::Assertion(_))
        ));
    }

    #[test]
    fn element_access_follows_the_lifecycle() {
        let app = app();
        let seen: Log = Rc::new(RefCell::new(Vec::new()));
        let probe = |hook: Hook| {
            let seen = seen.clone();
            move |i: &Instance| -> Result<()> {
                let access = if i.element().is_ok() { "ok" } else { "denied" };
                seen.borrow_mut().push(format!("{hook}:{access}"));
                Ok(())
            }
        };
        app.register_component(
            "x-probe",
            ComponentDescriptor::builder("x-probe")
                .hook(Hook::Init, probe(Hook::Init))
                .hook(Hook::WillInsertElement, probe(Hook::WillInsertElement))
                .hook(Hook::DidInsertElement, probe(Hook::DidInsertElement))
                .hook(Hook::WillDestroyElement, probe(Hook::WillDestroyElement))
                .build(),
        );
        let root = app
            .render(
                &Template::new("application", |b| b.component("x-probe").finish()),
                Record::new(),
            )
            .unwrap();
        let probe = root.child_views()[0].clone();
        probe.destroy().unwrap();

        assert_eq!(
            *seen.borrow(),
            strings(&[
                "init:denied",
                "willInsertElement:ok",
                "didInsertElement:ok",
                "willDestroyElement:ok",
            ])
        );
        assert!(probe.is_destroyed());
        assert!(matches!(
            probe.element(),
            Err(Error::IllegalElementAccess {
                state: LifecycleState::Destroyed,
                ..
            })
        ));
    }

    #[test]
    fn curried_component_keeps_its_instance() {
        let app = app();
        let inits = Rc::new(StdCell::new(0));
        let counting = {
            let inits = inits.clone();
            Rc::new(Fragment::new("counting").hook(Hook::Init, move |_| {
                inits.set(inits.get() + 1);
                Ok(())
            }))
        };
        for name in ["x-foo", "x-bar"] {
            app.register_component(
                name,
                ComponentDescriptor::builder(name)
                    .fragment(counting.clone())
                    .layout(Template::new(name, move |b| {
                        let open = b.get("isOpen");
                        b.text(format!("{name}:{open}"));
                        Ok(())
                    }))
                    .build(),
            );
        }
        let context = Rc::new(Record::new().with("which", "x-foo").with("isOpen", false));
        let template = Template::new("application", |b| {
            let which = b.get("which");
            let open = b.get("isOpen");
            let curried = b.curry(which, vec![], vec![("isOpen".into(), open)])?;
            b.component(curried).finish()
        });
        let root = app
            .render(&template, Value::Object(context.clone()))
            .unwrap();
        let first = root.child_views()[0].clone();

        for i in 0..5 {
            let open = i % 2 == 0;
            app.run(|| context.set("isOpen", open)).unwrap();
            assert_eq!(inits.get(), 1);
            assert_eq!(first.text_content(), format!("x-foo:{open}"));
        }

        app.run(|| context.set("which", "x-bar")).unwrap();
        assert_eq!(inits.get(), 2);
        assert!(first.is_destroyed());
        assert_eq!(root.text_content(), "x-bar:true");
    }

    #[test]
    fn recurrying_keeps_positional_args() {
        let app = app();
        app.register_component(
            "x-pair",
            ComponentDescriptor::builder("x-pair")
                .tag("span")
                .positional_params(["first", "second"])
                .layout(Template::new("x-pair", |b| {
                    let first = b.get("first");
                    let second = b.get("second");
                    b.text(format!("{first}-{second}"));
                    Ok(())
                }))
                .build(),
        );
        let template = Template::new("application", |b| {
            let inner = b.curry("x-pair", vec!["a".into(), "b".into()], vec![])?;
            let outer = b.curry(inner, vec![], vec![])?;
            b.component(outer).finish()
        });
        let root = app.render(&template, Record::new()).unwrap();

        let pair = root.child_views()[0].clone();
        assert_eq!(pair.attrs().positional.len(), 2);
        insta::assert_snapshot!(app.html(), @r#"<span id="glint2" class="glint-view">a-b</span>"#);
    }

    /// `x-foo -> x-bar -> x-qux`, each passing `...attributes` on with its
    /// own `id` before or after the splat.
    fn nested_splat(splat_first: bool) -> String {
        let app = app();
        for (name, next) in [("x-foo", "x-bar"), ("x-bar", "x-qux")] {
            let id = name.trim_start_matches("x-");
            app.register_template(
                name,
                Template::new(name, move |b| {
                    let next = b.component(next);
                    let next = if splat_first {
                        next.splat().attr("id", id)
                    } else {
                        next.attr("id", id).splat()
                    };
                    next.finish()
                }),
            );
        }
        app.register_template(
            "x-qux",
            Template::new("x-qux", move |b| {
                let div = b.element("div");
                let div = if splat_first {
                    div.splat().attr("id", "qux")
                } else {
                    div.attr("id", "qux").splat()
                };
                div.finish()
            }),
        );
        let template = Template::new("application", |b| {
            b.component("x-foo").attr("id", "top").finish()
        });
        app.render(&template, Record::new()).unwrap();
        app.html()
    }

    #[test]
    fn attributes_after_the_splat_win() {
        insta::assert_snapshot!(nested_splat(true), @r#"<div id="qux"></div>"#);
    }

    #[test]
    fn attributes_before_the_splat_lose() {
        insta::assert_snapshot!(nested_splat(false), @r#"<div id="top"></div>"#);
    }

    #[test]
    fn failed_init_aborts_and_recovers() {
        let app = app();
        let attempts = Rc::new(StdCell::new(0));
        let a = attempts.clone();
        app.register_component(
            "x-fragile",
            ComponentDescriptor::builder("x-fragile")
                .tag("p")
                .hook(Hook::Init, move |i| {
                    a.set(a.get() + 1);
                    if a.get() == 2 {
                        return Err(Error::hook(i.name(), "init", "second render fails"));
                    }
                    Ok(())
                })
                .layout(Template::new("x-fragile", |b| {
                    b.text("fragile");
                    Ok(())
                }))
                .build(),
        );
        let context = Rc::new(Record::new().with("show", true));
        let template = Template::new("application", |b| {
            let show = b.get("show");
            b.if_block(&show, |b| b.component("x-fragile").finish())
        });
        app.render(&template, Value::Object(context.clone()))
            .unwrap();
        assert!(app.html().contains("fragile"));

        app.run(|| context.set("show", false)).unwrap();
        assert_eq!(app.html(), "");

        let err = app.run(|| context.set("show", true)).unwrap_err();
        assert!(matches!(err, Error::Hook { .. }), "{err}");
        assert!(!app.renderer().in_transaction());
        assert_eq!(app.html(), "");
        assert_eq!(app.renderer().stats().aborted, 1);

        app.run(|| context.set("show", false)).unwrap();
        app.run(|| context.set("show", true)).unwrap();
        assert_eq!(attempts.get(), 3);
        assert!(app.html().contains("<p"));
        assert!(app.html().contains("fragile"));
    }

    #[test]
    fn actions_bubble_to_the_target() {
        let app = app();
        app.register_component(
            "x-button",
            ComponentDescriptor::builder("x-button").tag("button").build(),
        );
        let template = Template::new("application", |b| {
            b.component("x-button").finish()?;
            b.component("x-button").finish()
        });
        let root = app.render(&template, Record::new()).unwrap();
        let buttons = root.child_views();

        let saves = Rc::new(StdCell::new(0));
        let s = saves.clone();
        buttons[0].set_target(Rc::new(ActionHandler::new("controller").on("save", move |_| {
            s.set(s.get() + 1);
            Ok(())
        })));
        buttons[0].send("save", &[]).unwrap();
        assert_eq!(saves.get(), 1);

        match buttons[1].send("save", &[]) {
            Err(Error::UnhandledAction { action, origin }) => {
                assert_eq!(action, "save");
                assert_eq!(origin, buttons[1].describe());
            }
            other => panic!("expected an unhandled action, got {other:?}"),
        }

        buttons[0].destroy().unwrap();
        assert!(matches!(
            buttons[0].send("save", &[]),
            Err(Error::DestroyedObject { .. })
        ));
        assert_eq!(saves.get(), 1);
    }

    #[test]
    fn call_super_walks_fragments_then_target() {
        let app = app();
        let trail: Log = Rc::new(RefCell::new(Vec::new()));
        let (t1, t2, t3) = (trail.clone(), trail.clone(), trail.clone());
        let base = Fragment::new("saves").action("save", move |cx| {
            t1.borrow_mut().push(format!("base:{}", cx.arg(0)));
            cx.call_super()
        });
        app.register_component(
            "x-editor",
            ComponentDescriptor::builder("x-editor")
                .fragment(base)
                .action("save", move |cx| {
                    t2.borrow_mut().push(format!("editor:{}", cx.arg(0)));
                    cx.call_super_with(&["draft".into()])
                })
                .build(),
        );
        let root = app
            .render(
                &Template::new("application", |b| b.component("x-editor").finish()),
                Record::new(),
            )
            .unwrap();
        let editor = root.child_views()[0].clone();
        editor.set_target(Rc::new(ActionHandler::new("route").on("save", move |args| {
            t3.borrow_mut().push(format!("route:{}", args[0]));
            Ok(())
        })));

        editor.send("save", &["post".into()]).unwrap();
        assert_eq!(
            *trail.borrow(),
            strings(&["editor:post", "base:draft", "route:draft"])
        );
    }

    #[test]
    fn class_name_binding_toggles() {
        let app = app();
        app.register_component(
            "x-mood",
            ComponentDescriptor::builder("x-mood")
                .class_name_bindings(["isHappy:happy:sad"])
                .build(),
        );
        let context = Rc::new(Record::new().with("happy", false));
        let template = Template::new("application", |b| {
            let happy = b.get("happy");
            b.component("x-mood").arg("isHappy", happy).finish()
        });
        let root = app
            .render(&template, Value::Object(context.clone()))
            .unwrap();
        let el = root.child_views()[0].element().unwrap();
        let classes =
            |app: &Application| app.renderer().with_document(|doc| doc.attribute(el, "class").map(str::to_string));
        assert_eq!(classes(&app).as_deref(), Some("glint-view sad"));

        let before = app.renderer().stats().dom_mutations;
        app.run(|| context.set("happy", true)).unwrap();
        assert_eq!(classes(&app).as_deref(), Some("glint-view happy"));
        assert_eq!(app.renderer().stats().dom_mutations, before + 1);
    }

    #[test]
    fn event_handlers_bubble_until_stopped() {
        let app = app();
        let stop = Rc::new(StdCell::new(false));
        let clicks: Log = Rc::new(RefCell::new(Vec::new()));
        let (c1, c2, s) = (clicks.clone(), clicks.clone(), stop.clone());
        app.register_component(
            "x-clicker",
            ComponentDescriptor::builder("x-clicker")
                .tag("button")
                .event("click", move |_, _| {
                    c1.borrow_mut().push("clicker".into());
                    Ok(if s.get() {
                        Propagation::Stop
                    } else {
                        Propagation::Continue
                    })
                })
                .build(),
        );
        app.register_component(
            "x-panel",
            ComponentDescriptor::builder("x-panel")
                .tag("section")
                .event("click", move |_, event| {
                    c2.borrow_mut().push("panel".into());
                    event.prevent_default();
                    Ok(Propagation::Continue)
                })
                .layout(Template::new("x-panel", |b| b.component("x-clicker").finish()))
                .build(),
        );
        let root = app
            .render(
                &Template::new("application", |b| b.component("x-panel").finish()),
                Record::new(),
            )
            .unwrap();
        let clicker = root.child_views()[0].child_views()[0].element().unwrap();

        let event = app.dispatch("click", clicker).unwrap();
        assert!(event.was_handled());
        assert!(event.is_default_prevented());
        assert_eq!(take(&clicks), strings(&["clicker", "panel"]));

        stop.set(true);
        let event = app.dispatch("click", clicker).unwrap();
        assert!(event.is_propagation_stopped());
        assert_eq!(take(&clicks), strings(&["clicker"]));

        let event = app.dispatch("keydown", clicker).unwrap();
        assert!(!event.was_handled());
        assert!(matches!(app.dispatch("", clicker), Err(Error::Assertion(_))));
    }

    #[test]
    fn action_modifiers_fire_and_rerender() {
        let app = app();
        let removed: Log = Rc::new(RefCell::new(Vec::new()));
        let r = removed.clone();
        app.register_component(
            "x-form",
            ComponentDescriptor::builder("x-form")
                .tag("form")
                .action("save", |cx| cx.instance().set("saved", true))
                .action("remove", move |cx| {
                    r.borrow_mut().push(cx.arg(0).to_string());
                    Ok(())
                })
                .layout(Template::new("x-form", |b| {
                    let saved = b.get("saved");
                    let label = if saved.is_truthy() { "saved" } else { "save" };
                    b.element("button")
                        .attr("id", "save")
                        .on("click", "save")
                        .children(|b| {
                            b.text(label);
                            Ok(())
                        })?;
                    let remove = b.action("remove", vec!["draft".into()]);
                    b.component("x-remove").arg("onRemove", remove).finish()
                }))
                .build(),
        );
        app.register_template(
            "x-remove",
            Template::new("x-remove", |b| {
                let on_remove = b.arg("onRemove");
                b.element("a")
                    .attr("id", "remove")
                    .on_action("click", &on_remove)?
                    .finish()
            }),
        );
        app.render(
            &Template::new("application", |b| b.component("x-form").finish()),
            Record::new(),
        )
        .unwrap();

        let save = app.element_by_id("save").unwrap();
        let event = app.dispatch("click", save).unwrap();
        assert!(event.is_default_prevented());
        assert!(app.html().contains(">saved</button>"));

        let remove = app.element_by_id("remove").unwrap();
        app.dispatch("click", remove).unwrap();
        assert_eq!(*removed.borrow(), strings(&["draft"]));
    }

    #[test]
    fn tagless_components_cannot_handle_events() {
        let app = app();
        app.register_component(
            "x-bad",
            ComponentDescriptor::builder("x-bad")
                .tagless()
                .event("click", |_, _| Ok(Propagation::Continue))
                .build(),
        );
        let err = app
            .render(
                &Template::new("application", |b| b.component("x-bad").finish()),
                Record::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Assertion(_)));
        assert!(!app.renderer().in_transaction());
        assert_eq!(app.html(), "");
    }

    #[test]
    fn mut_bindings_write_upstream() {
        let app = app();
        app.register_template(
            "x-input",
            Template::new("x-input", |b| {
                let value = b.get("value");
                b.text(value);
                Ok(())
            }),
        );
        let context = Rc::new(Record::new().with("value", "old"));
        let template = Template::new("application", |b| {
            let value = b.mutable("value")?;
            b.component("x-input").arg("value", value).finish()
        });
        let root = app
            .render(&template, Value::Object(context.clone()))
            .unwrap();
        let input = root.child_views()[0].clone();

        app.run(|| input.set("value", "new")).unwrap();
        assert_eq!(context.get("value"), Value::from("new"));
        assert_eq!(app.html(), "new");
    }

    #[test]
    fn each_reuses_rows_by_position() {
        let app = app();
        app.register_component(
            "x-item",
            ComponentDescriptor::builder("x-item")
                .tag("li")
                .layout(Template::new("x-item", |b| {
                    let name = b.get("name");
                    b.text(name);
                    Ok(())
                }))
                .build(),
        );
        let items = |names: &[&str]| Value::list(names.iter().map(|n| Value::from(*n)));
        let context = Rc::new(Record::new().with("items", items(&["a", "b", "c"])));
        let template = Template::new("application", |b| {
            let items = b.get("items");
            b.element("ul").children(|b| {
                b.each(&items, |b, item, _| {
                    b.component("x-item").arg("name", item.clone()).finish()
                })
            })
        });
        app.render(&template, Value::Object(context.clone()))
            .unwrap();

        app.run(|| context.set("items", items(&["a", "c"]))).unwrap();
        assert_eq!(app.renderer().stats().instances_destroyed, 1);
        insta::assert_snapshot!(
            app.html(),
            @r#"<ul><li id="glint2" class="glint-view">a</li><li id="glint3" class="glint-view">c</li></ul>"#
        );
    }

    #[test]
    fn helpers_and_proxies() {
        let app = app();
        app.register_helper("upper", |positional, _| {
            Ok(Value::from(positional[0].to_string().to_uppercase()))
        });
        let proxy = Rc::new(Proxy::new(Record::new().with("name", "tom")));
        let template = Template::new("application", |b| {
            let name = b.get("name");
            let loud = b.helper("upper", vec![name], vec![])?;
            b.text(loud);
            Ok(())
        });
        app.render(&template, Value::Object(proxy.clone())).unwrap();
        assert_eq!(app.html(), "TOM");

        app.run(|| proxy.set_content(Record::new().with("name", "yehuda")))
            .unwrap();
        assert_eq!(app.html(), "YEHUDA");

        app.run(|| proxy.own().set("name", "godfrey")).unwrap();
        assert_eq!(app.html(), "GODFREY");
    }

    #[test]
    fn post_hook_writes_settle() {
        let app = app();
        app.register_component(
            "x-late",
            ComponentDescriptor::builder("x-late")
                .hook(Hook::DidInsertElement, |i| i.set("ready", true))
                .layout(Template::new("x-late", |b| {
                    let ready = b.get("ready");
                    b.text(if ready.is_truthy() { "ready" } else { "waiting" });
                    Ok(())
                }))
                .build(),
        );
        let root = app
            .render(
                &Template::new("application", |b| b.component("x-late").finish()),
                Record::new(),
            )
            .unwrap();
        assert_eq!(root.text_content(), "ready");
        assert_eq!(app.renderer().stats().flushes, 1);
        assert!(!app.renderer().has_pending());
    }

    #[test]
    fn runaway_invalidation_is_reported() {
        let app = app_with(RenderConfig {
            max_settle_passes: 3,
            ..RenderConfig::default()
        });
        app.register_component(
            "x-counter",
            ComponentDescriptor::builder("x-counter")
                .hook(Hook::DidRender, |i| {
                    let n = i.get("n").as_int().unwrap_or(0);
                    i.set("n", n + 1)
                })
                .layout(Template::new("x-counter", |b| {
                    let n = b.get("n");
                    b.text(n);
                    Ok(())
                }))
                .build(),
        );
        let err = app
            .render(
                &Template::new("application", |b| b.component("x-counter").finish()),
                Record::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Assertion(_)), "{err}");
        assert_eq!(app.renderer().stats().flushes, 3);
    }

    #[test]
    fn block_changes_belong_to_the_caller() {
        let app = app();
        let hooks = every_hook();
        app.register_component(
            "x-parent",
            ComponentDescriptor::builder("x-parent")
                .fragment(hooks.clone())
                .prop("x", "one")
                .layout(Template::new("x-parent", |b| {
                    b.component("x-child")
                        .block(|b, _| {
                            let x = b.get("x");
                            b.text(x);
                            Ok(())
                        })
                        .finish()
                }))
                .build(),
        );
        app.register_component(
            "x-child",
            ComponentDescriptor::builder("x-child")
                .fragment(hooks)
                .layout(Template::new("x-child", |b| b.yield_block(vec![])))
                .build(),
        );
        let log = hook_log(&app);
        let root = app
            .render(
                &Template::new("application", |b| b.component("x-parent").finish()),
                Record::new(),
            )
            .unwrap();
        let parent = root.child_views()[0].clone();
        let child = parent.child_views()[0].clone();
        assert_eq!(child.text_content(), "one");
        take(&log);

        app.run(|| parent.set("x", "two")).unwrap();
        assert_eq!(
            take(&log),
            strings(&[
                "x-parent:willUpdate",
                "x-parent:willRender",
                "x-parent:didUpdate",
                "x-parent:didRender",
            ])
        );
        assert!(child.ptr_eq(&parent.child_views()[0]));
        assert_eq!(child.text_content(), "two");
    }

    #[test]
    fn failed_update_keeps_the_last_good_render() {
        let app = app();
        app.register_component(
            "x-parent",
            ComponentDescriptor::builder("x-parent")
                .prop("x", "good")
                .layout(Template::new("x-parent", |b| {
                    let x = b.get("x");
                    b.component("x-child").arg("value", x).finish()
                }))
                .build(),
        );
        app.register_component(
            "x-child",
            ComponentDescriptor::builder("x-child")
                .tag("span")
                .hook(Hook::DidUpdateAttrs, |i| {
                    if i.attr("value") == Value::from("bad") {
                        return Err(Error::hook(i.name(), "didUpdateAttrs", "rejected value"));
                    }
                    Ok(())
                })
                .layout(Template::new("x-child", |b| {
                    let value = b.get("value");
                    b.text(value);
                    Ok(())
                }))
                .build(),
        );
        let root = app
            .render(
                &Template::new("application", |b| b.component("x-parent").finish()),
                Record::new(),
            )
            .unwrap();
        let parent = root.child_views()[0].clone();
        let before = app.html();
        assert!(before.contains("good"));

        let err = app.run(|| parent.set("x", "bad")).unwrap_err();
        assert!(matches!(err, Error::Hook { .. }), "{err}");
        assert!(!app.renderer().in_transaction());
        assert_eq!(app.html(), before);
        assert!(!app.renderer().has_pending());

        app.run(|| parent.set("x", "better")).unwrap();
        assert_eq!(parent.text_content(), "better");
        assert_eq!(parent.child_views()[0].attr("value"), Value::from("better"));
    }

    #[test]
    fn curried_component_through_a_path() {
        let app = app();
        app.register_component(
            "x-leaf",
            ComponentDescriptor::builder("x-leaf")
                .tag("em")
                .layout(Template::new("x-leaf", |b| {
                    let label = b.get("label");
                    b.text(label);
                    Ok(())
                }))
                .build(),
        );
        app.register_component(
            "x-host",
            ComponentDescriptor::builder("x-host")
                .tagless()
                .layout(Template::new("x-host", |b| {
                    let inner = b.get("h.inner");
                    b.component(inner).finish()
                }))
                .build(),
        );
        let template = Template::new("application", |b| {
            let leaf = b.curry("x-leaf", vec![], vec![("label".into(), "via-path".into())])?;
            let h = Rc::new(Record::new().with("inner", leaf));
            b.component("x-host").arg("h", Value::Object(h)).finish()
        });
        let root = app.render(&template, Record::new()).unwrap();

        let host = root.child_views()[0].clone();
        assert_eq!(host.child_views()[0].name(), "x-leaf");
        assert_eq!(root.text_content(), "via-path");
        assert!(app.html().contains("<em"));
    }

    fn two_rows(app: &Application) -> (Instance, Instance) {
        app.register_component(
            "x-row",
            ComponentDescriptor::builder("x-row")
                .tag("li")
                .prop("v", "old")
                .hook(Hook::WillUpdate, |i| {
                    if i.get("v") == Value::from("bad") {
                        return Err(Error::hook(i.name(), "willUpdate", "bad row"));
                    }
                    Ok(())
                })
                .layout(Template::new("x-row", |b| {
                    let v = b.get("v");
                    b.text(v);
                    Ok(())
                }))
                .build(),
        );
        let root = app
            .render(
                &Template::new("application", |b| {
                    b.component("x-row").finish()?;
                    b.component("x-row").finish()
                }),
                Record::new(),
            )
            .unwrap();
        let rows = root.child_views();
        (rows[0].clone(), rows[1].clone())
    }

    #[test]
    fn failed_sibling_leaves_other_updates_queued() {
        let app = app();
        let (first, second) = two_rows(&app);

        let err = app
            .run(|| {
                first.set("v", "new")?;
                second.set("v", "bad")
            })
            .unwrap_err();
        assert!(matches!(err, Error::Hook { .. }), "{err}");
        assert_eq!(first.text_content(), "old");
        assert_eq!(second.text_content(), "old");
        assert!(app.renderer().has_pending());

        app.renderer().settle().unwrap();
        assert_eq!(first.text_content(), "new");
        assert_eq!(second.text_content(), "old");
        assert!(!app.renderer().has_pending());
    }

    #[test]
    fn unreached_sibling_stays_queued() {
        let app = app();
        let (first, second) = two_rows(&app);

        app.run(|| {
            first.set("v", "bad")?;
            second.set("v", "new")
        })
        .unwrap_err();
        assert!(app.renderer().has_pending());

        app.renderer().settle().unwrap();
        assert_eq!(first.text_content(), "old");
        assert_eq!(second.text_content(), "new");
    }

    #[test]
    fn computed_props_cache_until_an_input_changes() {
        let app = app();
        let runs = Rc::new(StdCell::new(0));
        let r = runs.clone();
        app.register_component(
            "x-name",
            ComponentDescriptor::builder("x-name")
                .tag("span")
                .prop("first", "Tom")
                .prop("last", "Dale")
                .computed("fullName", move |i| {
                    r.set(r.get() + 1);
                    Value::str(format!("{} {}", i.get("first"), i.get("last")))
                })
                .layout(Template::new("x-name", |b| {
                    let full = b.get("fullName");
                    b.text(full);
                    Ok(())
                }))
                .build(),
        );
        let root = app
            .render(
                &Template::new("application", |b| b.component("x-name").finish()),
                Record::new(),
            )
            .unwrap();
        let name = root.child_views()[0].clone();
        assert_eq!(name.text_content(), "Tom Dale");
        assert_eq!(name.get("fullName"), Value::from("Tom Dale"));
        assert_eq!(runs.get(), 1);

        app.run(|| name.set("first", "Yehuda")).unwrap();
        assert_eq!(name.text_content(), "Yehuda Dale");
        assert_eq!(runs.get(), 2);

        assert!(matches!(
            name.set("fullName", "nope"),
            Err(Error::Assertion(_))
        ));
    }
}
