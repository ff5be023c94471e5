use runloop::{
    args, Action, Args, GuidRegistry, IdentityMap, ManualPlatform, Method, QueueOptions, QueueSet,
    RunLoopEvent, Scheduler, SchedulerBuilder, SchedulerError, Target, TaskError, TaskResult,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("runloop_runtime=trace")
        .with_test_writer()
        .try_init();
}

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

fn scheduler_with(queues: &[&str]) -> (Rc<Scheduler>, Rc<ManualPlatform>) {
    init_tracing();
    let platform = Rc::new(ManualPlatform::new());
    let scheduler = SchedulerBuilder::new(queues.iter().copied())
        .platform(platform.clone())
        .build()
        .unwrap();
    (scheduler, platform)
}

fn push(log: &Log, entry: &'static str) -> Action {
    let log = log.clone();
    Action::func(move |_| {
        log.borrow_mut().push(entry.to_string());
        Ok(())
    })
}

/// A component with named methods that records every call.
struct Component {
    name: &'static str,
    log: Log,
}

impl Target for Component {
    fn respond_to(&self, method: &str) -> bool {
        matches!(method, "render" | "update")
    }

    fn perform(&self, method: &str, args: &Args) -> TaskResult {
        let value = args.get::<i32>(0).copied().unwrap_or_default();
        self.log
            .borrow_mut()
            .push(format!("{}.{}({})", self.name, method, value));
        Ok(())
    }
}

#[test]
fn test_earlier_queue_runs_before_later_queue_continues() {
    let (scheduler, _platform) = scheduler_with(&["sync", "actions"]);
    let log = new_log();

    let weak = Rc::downgrade(&scheduler);
    let inner = log.clone();
    let schedules_sync = Action::func(move |_| {
        inner.borrow_mut().push("a1".into());
        if let Some(scheduler) = weak.upgrade() {
            scheduler.defer("sync", push(&inner, "s1"))?;
        }
        Ok(())
    });

    scheduler
        .run(|| {
            scheduler.defer("actions", schedules_sync)?;
            scheduler.defer("actions", push(&log, "a2"))?;
            Ok(())
        })
        .unwrap();

    // a2 was already in the batch being flushed, so it still runs before s1.
    assert_eq!(entries(&log), vec!["a1", "a2", "s1"]);
}

#[test]
fn test_work_scheduled_during_flush_runs_in_same_end() {
    let (scheduler, _platform) = scheduler_with(&["sync", "actions", "render"]);
    let log = new_log();

    let weak = Rc::downgrade(&scheduler);
    let inner = log.clone();
    let chain = Action::func(move |_| {
        inner.borrow_mut().push("render".into());
        if let Some(scheduler) = weak.upgrade() {
            scheduler.defer("actions", push(&inner, "late action"))?;
        }
        Ok(())
    });

    scheduler.begin();
    scheduler.defer("render", chain).unwrap();
    scheduler.defer("sync", push(&log, "sync")).unwrap();
    scheduler.end().unwrap();

    assert_eq!(entries(&log), vec!["sync", "render", "late action"]);
    assert!(scheduler.current_instance().is_none());
}

#[test]
fn test_defer_once_keeps_first_position_with_last_args() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);
    let log = new_log();
    let component: Rc<dyn Target> = Rc::new(Component {
        name: "list",
        log: log.clone(),
    });

    scheduler.begin();
    scheduler
        .defer_once("actions", Action::send(component.clone(), "render").with_args(args![1]))
        .unwrap();
    scheduler.defer("actions", push(&log, "between")).unwrap();
    scheduler
        .defer_once("actions", Action::send(component.clone(), "render").with_args(args![2]))
        .unwrap();
    scheduler.end().unwrap();

    assert_eq!(entries(&log), vec!["list.render(2)", "between"]);
}

#[test]
fn test_defer_once_with_guid_registry() {
    init_tracing();
    let registry = Rc::new(GuidRegistry::new());
    let identity: Rc<dyn IdentityMap> = registry.clone();
    let scheduler = SchedulerBuilder::new(["actions"])
        .platform(Rc::new(ManualPlatform::new()))
        .identity_map(identity)
        .build()
        .unwrap();
    let log = new_log();
    let first: Rc<dyn Target> = Rc::new(Component {
        name: "first",
        log: log.clone(),
    });
    let second: Rc<dyn Target> = Rc::new(Component {
        name: "second",
        log: log.clone(),
    });
    registry.register(&first);
    registry.register(&second);

    scheduler.begin();
    for (target, value) in [(&first, 1), (&second, 2), (&first, 3), (&second, 4)] {
        scheduler
            .defer_once("actions", Action::send(target.clone(), "update").with_args(args![value]))
            .unwrap();
    }
    scheduler.end().unwrap();

    assert_eq!(entries(&log), vec!["first.update(3)", "second.update(4)"]);
}

#[test]
fn test_unknown_queue_and_method_are_rejected() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);
    let component: Rc<dyn Target> = Rc::new(Component {
        name: "c",
        log: new_log(),
    });

    let err = scheduler.defer("nope", Action::func(|_| Ok(()))).unwrap_err();
    assert!(matches!(err, SchedulerError::NoSuchQueue(ref q) if q == "nope"));

    let err = scheduler
        .defer("actions", Action::send(component, "destroy"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NoSuchMethod(_)));
    assert!(scheduler.current_instance().is_none());
}

#[test]
fn test_begin_begin_end_end_restores_state() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);

    assert!(scheduler.current_instance().is_none());
    scheduler.begin();
    let outer = scheduler.current_instance().unwrap();
    scheduler.begin();
    let inner = scheduler.current_instance().unwrap();
    assert_ne!(outer.id(), inner.id());

    scheduler.end().unwrap();
    assert_eq!(scheduler.current_instance().unwrap().id(), outer.id());
    scheduler.end().unwrap();
    assert!(scheduler.current_instance().is_none());
    assert!(matches!(scheduler.end(), Err(SchedulerError::NoCurrentInstance)));
}

#[test]
fn test_cancel_pending_task_twice() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);
    let log = new_log();

    scheduler.begin();
    let handle = scheduler.defer("actions", push(&log, "cancelled")).unwrap();
    scheduler.defer("actions", push(&log, "kept")).unwrap();
    assert!(scheduler.cancel(&handle));
    assert!(!scheduler.cancel(&handle));
    scheduler.end().unwrap();

    assert_eq!(entries(&log), vec!["kept"]);
}

#[test]
fn test_cancel_later_task_from_inside_flush() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);
    let log = new_log();
    let victim = Rc::new(RefCell::new(None));

    let weak = Rc::downgrade(&scheduler);
    let slot = victim.clone();
    let canceller = Action::func(move |_| {
        if let (Some(scheduler), Some(handle)) = (weak.upgrade(), slot.borrow().as_ref()) {
            scheduler.cancel(handle);
        }
        Ok(())
    });

    scheduler.begin();
    scheduler.defer("actions", canceller).unwrap();
    let handle = scheduler.defer("actions", push(&log, "never")).unwrap();
    *victim.borrow_mut() = Some(handle);
    scheduler.end().unwrap();

    assert!(log.borrow().is_empty());
}

#[test]
fn test_errors_propagate_without_handler() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);
    let log = new_log();

    scheduler.begin();
    scheduler
        .defer("actions", Action::func(|_| Err("broken".into())))
        .unwrap();
    scheduler.defer("actions", push(&log, "after")).unwrap();
    let err = scheduler.end().unwrap_err();

    assert_eq!(err.to_string(), "task failed: broken");
    assert!(log.borrow().is_empty());
    assert!(scheduler.current_instance().is_none());
}

#[test]
fn test_error_handler_keeps_flushing() {
    init_tracing();
    let errors = new_log();
    let sink = errors.clone();
    let scheduler = SchedulerBuilder::new(["actions"])
        .platform(Rc::new(ManualPlatform::new()))
        .on_error(move |error: TaskError, _| sink.borrow_mut().push(error.to_string()))
        .build()
        .unwrap();
    let log = new_log();

    scheduler.begin();
    scheduler
        .defer("actions", Action::func(|_| Err("broken".into())))
        .unwrap();
    scheduler.defer("actions", push(&log, "after")).unwrap();
    scheduler.end().unwrap();

    let result = scheduler.run(|| Err::<(), TaskError>("from run".into())).unwrap();
    assert!(result.is_none());

    assert_eq!(entries(&errors), vec!["broken", "from run"]);
    assert_eq!(entries(&log), vec!["after"]);
}

#[test]
fn test_error_handler_target_receives_debug_stack() {
    struct Reporter {
        stacks: RefCell<usize>,
        messages: Log,
    }

    impl Target for Reporter {
        fn respond_to(&self, method: &str) -> bool {
            method == "report"
        }

        fn perform(&self, _method: &str, args: &Args) -> TaskResult {
            if let Some(error) = args.get::<TaskError>(0) {
                self.messages.borrow_mut().push(error.to_string());
            }
            if args.get::<runloop::DebugStack>(1).is_some() {
                *self.stacks.borrow_mut() += 1;
            }
            Ok(())
        }
    }

    init_tracing();
    let reporter = Rc::new(Reporter {
        stacks: RefCell::new(0),
        messages: new_log(),
    });
    let scheduler = SchedulerBuilder::new(["actions"])
        .platform(Rc::new(ManualPlatform::new()))
        .on_error_target(reporter.clone(), "report")
        .debug(true)
        .build()
        .unwrap();

    scheduler.begin();
    scheduler
        .defer("actions", Action::func(|_| Err("traced".into())))
        .unwrap();
    scheduler.end().unwrap();

    assert_eq!(entries(&reporter.messages), vec!["traced"]);
    assert_eq!(*reporter.stacks.borrow(), 1);
}

#[test]
fn test_events_and_hooks_see_instances() {
    init_tracing();
    let hooks = new_log();
    let begin_sink = hooks.clone();
    let end_sink = hooks.clone();
    let scheduler = SchedulerBuilder::new(["actions"])
        .platform(Rc::new(ManualPlatform::new()))
        .on_begin(move |current: Option<&QueueSet>, previous: Option<&QueueSet>| {
            begin_sink.borrow_mut().push(format!(
                "hook begin {:?} {:?}",
                current.map(QueueSet::id),
                previous.map(QueueSet::id)
            ));
        })
        .on_end(move |current: Option<&QueueSet>, next: Option<&QueueSet>| {
            end_sink.borrow_mut().push(format!(
                "hook end {:?} {:?}",
                current.map(QueueSet::id),
                next.map(QueueSet::id)
            ));
        })
        .build()
        .unwrap();

    let sink = hooks.clone();
    let id = scheduler.on(
        RunLoopEvent::Begin,
        move |current: Option<&QueueSet>, _: Option<&QueueSet>| {
            sink.borrow_mut()
                .push(format!("listener begin {:?}", current.map(QueueSet::id)));
        },
    );

    scheduler.begin();
    scheduler.begin();
    scheduler.end().unwrap();
    scheduler.end().unwrap();

    scheduler.off(RunLoopEvent::Begin, id).unwrap();
    assert!(matches!(
        scheduler.off(RunLoopEvent::Begin, id),
        Err(SchedulerError::ListenerNotFound)
    ));

    assert_eq!(
        entries(&hooks),
        vec![
            "listener begin Some(1)",
            "hook begin Some(1) None",
            "listener begin Some(2)",
            "hook begin Some(2) Some(1)",
            "hook end Some(2) Some(1)",
            "hook end Some(1) None",
        ]
    );
}

#[test]
fn test_queue_hooks_wrap_each_flush() {
    init_tracing();
    let log = new_log();
    let before = log.clone();
    let after = log.clone();
    let scheduler = SchedulerBuilder::new(["actions", "render"])
        .platform(Rc::new(ManualPlatform::new()))
        .queue_options(
            "render",
            QueueOptions::new()
                .before(move || before.borrow_mut().push("before render".into()))
                .after(move || after.borrow_mut().push("after render".into())),
        )
        .build()
        .unwrap();

    scheduler.begin();
    scheduler.defer("actions", push(&log, "action")).unwrap();
    scheduler.defer("render", push(&log, "paint")).unwrap();
    scheduler.end().unwrap();

    assert_eq!(
        entries(&log),
        vec!["action", "before render", "paint", "after render"]
    );
}

#[test]
fn test_join_outside_run_loop_behaves_like_run() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);
    let log = new_log();

    let action = push(&log, "joined");
    let value = scheduler
        .join(|| {
            assert!(scheduler.current_instance().is_some());
            scheduler.defer("actions", action)?;
            Ok("done")
        })
        .unwrap();

    assert_eq!(value, Some("done"));
    assert_eq!(entries(&log), vec!["joined"]);
    assert!(scheduler.current_instance().is_none());
}

#[test]
fn test_named_method_on_shared_method_value() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);
    let log = new_log();
    let sink = log.clone();
    let method = Method::func(move |args: &Args| {
        sink.borrow_mut()
            .push(format!("called with {}", args.get::<&str>(0).copied().unwrap_or("?")));
        Ok(())
    });

    scheduler.begin();
    scheduler
        .defer_once("actions", Action::new(method.clone()).with_args(args!["first"]))
        .unwrap();
    scheduler
        .defer_once("actions", Action::new(method).with_args(args!["second"]))
        .unwrap();
    scheduler.end().unwrap();

    assert_eq!(entries(&log), vec!["called with second"]);
}

#[test]
fn test_cancel_twice_spares_task_sharing_the_method() {
    let (scheduler, _platform) = scheduler_with(&["actions"]);
    let calls = Rc::new(RefCell::new(0));
    let sink = calls.clone();
    let method = Method::func(move |_| {
        *sink.borrow_mut() += 1;
        Ok(())
    });

    scheduler.begin();
    let first = scheduler.defer("actions", Action::new(method.clone())).unwrap();
    scheduler.defer("actions", Action::new(method)).unwrap();
    assert!(scheduler.cancel(&first));
    assert!(!scheduler.cancel(&first));
    scheduler.end().unwrap();

    assert_eq!(*calls.borrow(), 1);
}
