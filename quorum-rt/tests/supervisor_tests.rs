//! Supervision: strategies, restart intensity, ordered shutdown, dynamic
//! children, and nested trees.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use quorum_rt::actor::{Behavior, BehaviorError, CallOutcome, CastOutcome, ExitReason, ServerRef};
use quorum_rt::events::LifecycleEvent;
use quorum_rt::supervisor::{
    ChildSpec, DynamicTemplate, RestartIntensity, RestartPolicy, Supervisor, SupervisorError,
    SupervisorSpec, SupervisorStrategy,
};
use quorum_rt::system::ActorSystem;

#[derive(Debug, Serialize, Deserialize)]
struct Ping;

struct Worker;

#[async_trait]
impl Behavior for Worker {
    type State = u64;
    type Call = Ping;
    type Cast = Ping;
    type Reply = u64;

    async fn init(&self) -> Result<u64, BehaviorError> {
        Ok(0)
    }

    async fn handle_call(&self, _msg: Ping, state: u64) -> CallOutcome<u64, u64> {
        CallOutcome::reply(state, state)
    }

    async fn handle_cast(&self, _msg: Ping, state: u64) -> CastOutcome<u64> {
        CastOutcome::next(state + 1)
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

async fn running_server(sup: &Supervisor, id: &str) -> ServerRef {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(Some(info)) = sup.get_child(id).await {
            if info.running {
                if let Some(server) = info.server {
                    return server;
                }
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "child {id} did not come up"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Kill a child abnormally and wait for the supervisor to replace it.
async fn kill_and_await_restart(system: &ActorSystem, sup: &Supervisor, id: &str) -> ServerRef {
    let old = running_server(sup, id).await;
    system
        .stop_with_reason(&old, ExitReason::error("killed by test"))
        .await
        .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(Some(info)) = sup.get_child(id).await {
            if info.running {
                if let Some(server) = info.server {
                    if server != old {
                        return server;
                    }
                }
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "child {id} was not restarted"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn one_for_one_restarts_only_the_failed_child() {
    let system = ActorSystem::standalone();
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne)
        .with_intensity(RestartIntensity::new(3, Duration::from_millis(5000)))
        .with_child(ChildSpec::actor("a", &system, || Worker))
        .with_child(ChildSpec::actor("b", &system, || Worker));
    let sup = Supervisor::start(&system, spec).await.unwrap();

    let b_before = running_server(&sup, "b").await;
    kill_and_await_restart(&system, &sup, "a").await;

    let a_info = sup.get_child("a").await.unwrap().unwrap();
    let b_info = sup.get_child("b").await.unwrap().unwrap();
    assert_eq!(a_info.restart_count, 1);
    assert_eq!(b_info.restart_count, 0);
    // b's instance is untouched.
    assert_eq!(b_info.server, Some(b_before));

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn rest_for_one_restarts_the_failed_child_and_its_suffix() {
    let system = ActorSystem::standalone();
    let (_sub, mut events) = system.lifecycle_events();
    let spec = SupervisorSpec::new(SupervisorStrategy::RestForOne)
        .with_child(ChildSpec::actor("db", &system, || Worker))
        .with_child(ChildSpec::actor("cache", &system, || Worker))
        .with_child(ChildSpec::actor("api", &system, || Worker));
    let sup = Supervisor::start(&system, spec).await.unwrap();

    let db_before = running_server(&sup, "db").await;
    let cache_before = running_server(&sup, "cache").await;
    let api_before = running_server(&sup, "api").await;

    // Drain startup events before the kill.
    while events.try_recv().is_ok() {}

    system
        .stop_with_reason(&cache_before, ExitReason::error("killed by test"))
        .await
        .unwrap();

    let cache_after = kill_wait_new(&sup, "cache", &cache_before).await;
    let api_after = kill_wait_new(&sup, "api", &api_before).await;
    assert_ne!(cache_after, cache_before);
    assert_ne!(api_after, api_before);

    let db_info = sup.get_child("db").await.unwrap().unwrap();
    assert_eq!(db_info.restart_count, 0);
    assert_eq!(db_info.server, Some(db_before));

    // Observed order: api terminates after cache's failure (suffix stop in
    // reverse), then cache starts before api (forward restart).
    let mut terminated = Vec::new();
    let mut started = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline
        && (terminated.len() < 2 || started.len() < 2)
    {
        while let Ok(event) = events.try_recv() {
            match event {
                LifecycleEvent::Terminated { server, .. } => terminated.push(server),
                LifecycleEvent::Started { server, .. } => started.push(server),
                _ => {}
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Terminations: cache (the kill), then api (suffix shutdown).
    assert_eq!(terminated[0], cache_before);
    assert_eq!(terminated[1], api_before);
    // Starts: cache before api.
    assert_eq!(started[0], cache_after);
    assert_eq!(started[1], api_after);

    sup.stop().await.unwrap();
}

async fn kill_wait_new(sup: &Supervisor, id: &str, old: &ServerRef) -> ServerRef {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(Some(info)) = sup.get_child(id).await {
            if info.running {
                if let Some(server) = info.server {
                    if &server != old {
                        return server;
                    }
                }
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "child {id} was not replaced"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn one_for_all_replaces_every_child() {
    let system = ActorSystem::standalone();
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForAll)
        .with_child(ChildSpec::actor("x", &system, || Worker))
        .with_child(ChildSpec::actor("y", &system, || Worker));
    let sup = Supervisor::start(&system, spec).await.unwrap();

    let x_before = running_server(&sup, "x").await;
    let y_before = running_server(&sup, "y").await;

    system
        .stop_with_reason(&x_before, ExitReason::error("killed by test"))
        .await
        .unwrap();

    let x_after = kill_wait_new(&sup, "x", &x_before).await;
    let y_after = kill_wait_new(&sup, "y", &y_before).await;
    assert_ne!(x_after, x_before);
    assert_ne!(y_after, y_before);

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn restart_intensity_breach_fails_the_supervisor() {
    let system = ActorSystem::standalone();
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne)
        .with_intensity(RestartIntensity::new(3, Duration::from_millis(2000)))
        .with_child(ChildSpec::actor("x", &system, || Worker));
    let sup = Supervisor::start(&system, spec).await.unwrap();

    // Three kills restart fine; the fourth inside the window is refused.
    for _ in 0..3 {
        kill_and_await_restart(&system, &sup, "x").await;
    }
    let last = running_server(&sup, "x").await;
    system
        .stop_with_reason(&last, ExitReason::error("killed by test"))
        .await
        .unwrap();

    let outcome = sup.wait_terminated().await;
    match outcome {
        Err(SupervisorError::MaxRestartsExceeded { max_restarts, .. }) => {
            assert_eq!(max_restarts, 3);
        }
        other => panic!("expected MaxRestartsExceeded, got {other:?}"),
    }

    // Commands after the terminal failure report the supervisor stopped.
    assert!(matches!(
        sup.get_child("x").await,
        Err(SupervisorError::Stopped)
    ));
}

#[tokio::test]
async fn restart_budget_recovers_after_the_window_slides() {
    let system = ActorSystem::standalone();
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne)
        .with_intensity(RestartIntensity::new(3, Duration::from_millis(2000)))
        .with_child(ChildSpec::actor("x", &system, || Worker));
    let sup = Supervisor::start(&system, spec).await.unwrap();

    for _ in 0..3 {
        kill_and_await_restart(&system, &sup, "x").await;
    }
    // Let the 2000ms window slide past the three recorded restarts.
    tokio::time::sleep(Duration::from_millis(2100)).await;

    // A fourth kill now restarts fine.
    kill_and_await_restart(&system, &sup, "x").await;
    let info = sup.get_child("x").await.unwrap().unwrap();
    assert_eq!(info.restart_count, 4);
    assert!(info.running);

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn transient_children_restart_only_on_abnormal_exit() {
    let system = ActorSystem::standalone();
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne).with_child(
        ChildSpec::actor("t", &system, || Worker).with_restart(RestartPolicy::Transient),
    );
    let sup = Supervisor::start(&system, spec).await.unwrap();

    // A normal stop is not restarted.
    let server = running_server(&sup, "t").await;
    system.stop(&server).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let info = sup.get_child("t").await.unwrap().unwrap();
    assert!(!info.running);
    assert_eq!(info.restart_count, 0);

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn temporary_children_never_restart() {
    let system = ActorSystem::standalone();
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne).with_child(
        ChildSpec::actor("tmp", &system, || Worker).with_restart(RestartPolicy::Temporary),
    );
    let sup = Supervisor::start(&system, spec).await.unwrap();

    let server = running_server(&sup, "tmp").await;
    system
        .stop_with_reason(&server, ExitReason::error("killed by test"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let info = sup.get_child("tmp").await.unwrap().unwrap();
    assert!(!info.running);
    assert_eq!(info.restart_count, 0);

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn failed_child_start_unwinds_previous_children() {
    let system = ActorSystem::standalone();

    struct BadInit;

    #[async_trait]
    impl Behavior for BadInit {
        type State = ();
        type Call = ();
        type Cast = ();
        type Reply = ();

        async fn init(&self) -> Result<(), BehaviorError> {
            Err(BehaviorError::from("refused"))
        }

        async fn handle_call(&self, _msg: (), state: ()) -> CallOutcome<(), ()> {
            CallOutcome::reply((), state)
        }

        async fn handle_cast(&self, _msg: (), state: ()) -> CastOutcome<()> {
            CastOutcome::next(state)
        }
    }

    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne)
        .with_child(ChildSpec::actor("ok", &system, || Worker))
        .with_child(ChildSpec::actor("bad", &system, || BadInit));
    let err = Supervisor::start(&system, spec).await.unwrap_err();
    assert!(matches!(err, SupervisorError::StartFailed { .. }));

    // The first child was shut down during the unwind.
    assert!(
        wait_until(|| system.actor_count() == 0, Duration::from_secs(1)).await,
        "previously started children must be unwound"
    );
}

#[tokio::test]
async fn dynamic_supervisor_spawns_and_restarts_instances() {
    let system = ActorSystem::standalone();
    let template = DynamicTemplate::actor("conn", &system, |_args| Worker);
    let sup = Supervisor::start_dynamic(&system, template, RestartIntensity::default());

    let first = sup
        .start_dynamic_child(json!({"peer": 1}))
        .await
        .unwrap()
        .unwrap();
    let second = sup
        .start_dynamic_child(json!({"peer": 2}))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(first, second);

    let counts = sup.count_children().await.unwrap();
    assert_eq!(counts.specs, 2);
    assert_eq!(counts.active, 2);

    // An instance failure restarts only that instance.
    system
        .stop_with_reason(&first, ExitReason::error("killed by test"))
        .await
        .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let counts = sup.count_children().await.unwrap();
        if counts.active == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "instance was not restarted"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(system.alive(&second));

    // Static child specs are rejected on a dynamic supervisor.
    let err = sup
        .start_child(ChildSpec::actor("static", &system, || Worker))
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::RequiresStatic));

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn terminate_child_stops_without_restart() {
    let system = ActorSystem::standalone();
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne)
        .with_child(ChildSpec::actor("w", &system, || Worker));
    let sup = Supervisor::start(&system, spec).await.unwrap();

    let server = running_server(&sup, "w").await;
    sup.terminate_child("w").await.unwrap();
    assert!(!system.alive(&server));
    let info = sup.get_child("w").await.unwrap().unwrap();
    assert!(!info.running);

    // Manual restart brings it back.
    sup.restart_child("w").await.unwrap();
    let info = sup.get_child("w").await.unwrap().unwrap();
    assert!(info.running);

    assert!(matches!(
        sup.terminate_child("ghost").await,
        Err(SupervisorError::UnknownChild(_))
    ));

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn supervisor_stop_shuts_children_down_in_reverse_order() {
    let system = ActorSystem::standalone();
    let (_sub, mut events) = system.lifecycle_events();
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne)
        .with_child(ChildSpec::actor("first", &system, || Worker))
        .with_child(ChildSpec::actor("second", &system, || Worker));
    let sup = Supervisor::start(&system, spec).await.unwrap();

    let first = running_server(&sup, "first").await;
    let second = running_server(&sup, "second").await;
    while events.try_recv().is_ok() {}

    sup.stop().await.unwrap();
    assert!(!system.alive(&first));
    assert!(!system.alive(&second));

    let mut terminated = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::Terminated { server, .. } = event {
            terminated.push(server);
        }
    }
    assert_eq!(terminated, vec![second, first]);
}

#[tokio::test]
async fn nested_tree_escalates_intensity_overflow_to_the_parent() {
    let system = ActorSystem::standalone();
    let child_system = system.clone();

    // Inner supervisor with zero restart budget; parent treats its failure
    // like any child exit and restarts it.
    let spec = SupervisorSpec::new(SupervisorStrategy::OneForOne).with_child(
        ChildSpec::supervisor("inner", &system, move || {
            SupervisorSpec::new(SupervisorStrategy::OneForOne)
                .with_intensity(RestartIntensity::new(0, Duration::from_millis(1000)))
                .with_child(ChildSpec::actor("leaf", &child_system, || Worker))
        }),
    );
    let sup = Supervisor::start(&system, spec).await.unwrap();
    assert!(
        wait_until(|| system.actor_count() == 1, Duration::from_secs(1)).await,
        "leaf should be running"
    );

    // Kill the leaf: the inner supervisor overflows instantly and fails; the
    // parent restarts the whole inner tree.
    let leaf = {
        let snapshot = quorum_rt::observer::Observer::new(system.clone()).snapshot();
        snapshot.actors[0].server.clone()
    };
    system
        .stop_with_reason(&leaf, ExitReason::error("killed by test"))
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(Some(info)) = sup.get_child("inner").await {
            if info.running && info.restart_count == 1 && system.actor_count() == 1 {
                break;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "parent should restart the inner tree"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    sup.stop().await.unwrap();
}
