//! Interruption handling and media services reset

mod helpers;

use avs_common::events::{AudioCategory, CategoryOptions, ErrorOrigin, InterruptionMode, InterruptionPhase};
use avs_common::{ActivityState, SessionEvent};
use avs_coordinator::{Error, InterruptionEvent, InterruptionState, Signal};
use helpers::{coordinator, drain, register, FakePlayer, PortCall, RecordingPort};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

const BEGAN: InterruptionEvent = InterruptionEvent::Began;
const RESUME: InterruptionEvent = InterruptionEvent::Ended { should_resume: true };
const NO_RESUME: InterruptionEvent = InterruptionEvent::Ended {
    should_resume: false,
};

/// **Given:** A user-paused before the interruption, B playing
/// **When:** An interruption begins and then ends with the resume hint
/// **Then:** Only B is paused and resumed; A stays paused
#[test]
fn test_user_paused_object_stays_paused() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let a_player = FakePlayer::new();
    let b_player = FakePlayer::new();
    let a = register(&coordinator, &a_player);
    let b = register(&coordinator, &b_player);
    coordinator.activate(a).unwrap();
    coordinator.activate(b).unwrap();
    coordinator.deactivate(a).unwrap();

    coordinator.handle_interruption(BEGAN);
    assert_eq!(coordinator.interruption_state(), InterruptionState::Interrupted);
    assert_eq!(coordinator.interruption_phase(), InterruptionPhase::Began);
    assert_eq!(coordinator.activity(a), Some(ActivityState::Idle));
    assert_eq!(coordinator.activity(b), Some(ActivityState::PausedByInterruption));
    assert_eq!(a_player.pauses(), 0);
    assert_eq!(b_player.pauses(), 1);
    assert_eq!(coordinator.session_count(), 0);
    assert_eq!(port.deactivations(), 0, "the OS already revoked the session");

    coordinator.handle_interruption(RESUME);
    assert_eq!(coordinator.interruption_state(), InterruptionState::Normal);
    assert_eq!(coordinator.interruption_phase(), InterruptionPhase::Ended);
    assert_eq!(port.activations(), 2);
    assert_eq!(coordinator.session_count(), 1);
    assert_eq!(coordinator.activity(a), Some(ActivityState::Idle));
    assert_eq!(coordinator.activity(b), Some(ActivityState::Active));
    assert_eq!(a_player.resumes(), 0);
    assert_eq!(b_player.resumes(), 1);
}

#[test]
fn test_interruption_events_list_objects() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let player = FakePlayer::new();
    let handle = register(&coordinator, &player);
    coordinator.activate(handle).unwrap();
    let mut rx = coordinator.subscribe();

    coordinator.handle_interruption(BEGAN);
    coordinator.handle_interruption(RESUME);

    let events = drain(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        SessionEvent::InterruptionBegan { paused, .. } if paused == &vec![handle]
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        SessionEvent::InterruptionEnded { should_resume: true, resumed, .. } if resumed == &vec![handle]
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        SessionEvent::ActivityChanged {
            old_state: ActivityState::PausedByInterruption,
            new_state: ActivityState::Active,
            ..
        }
    )));
}

#[test]
fn test_end_without_resume_never_reactivates() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let player = FakePlayer::new();
    let handle = register(&coordinator, &player);
    coordinator.activate(handle).unwrap();

    coordinator.handle_interruption(BEGAN);
    port.clear();
    coordinator.handle_interruption(NO_RESUME);

    assert!(port.calls().is_empty());
    assert_eq!(coordinator.interruption_state(), InterruptionState::Normal);
    assert_eq!(coordinator.activity(handle), Some(ActivityState::PausedByInterruption));
    assert_eq!(player.resumes(), 0);
    assert_eq!(coordinator.session_count(), 0);

    // The object can still be restarted explicitly
    coordinator.activate(handle).unwrap();
    assert_eq!(coordinator.activity(handle), Some(ActivityState::Active));
}

/// **Given:** An interrupted session
/// **When:** The interruption ends with the resume hint but the host refuses
/// **Then:** Nothing resumes, the handler stays interrupted with an empty
/// snapshot, and the failure is published as an event
#[test]
fn test_denied_resume_surfaces_error() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let player = FakePlayer::new();
    let handle = register(&coordinator, &player);
    coordinator.activate(handle).unwrap();
    coordinator.handle_interruption(BEGAN);

    let mut rx = coordinator.subscribe();
    port.deny_activation.store(true, Ordering::SeqCst);
    coordinator.handle_interruption(RESUME);

    assert_eq!(coordinator.interruption_state(), InterruptionState::Interrupted);
    assert_eq!(coordinator.activity(handle), Some(ActivityState::PausedByInterruption));
    assert_eq!(player.resumes(), 0);
    assert_eq!(coordinator.session_count(), 0);
    assert!(drain(&mut rx).iter().any(|event| matches!(
        event,
        SessionEvent::Error {
            origin: ErrorOrigin::Interruption,
            ..
        }
    )));

    // Snapshot was consumed: a later end resumes nothing
    port.deny_activation.store(false, Ordering::SeqCst);
    coordinator.handle_interruption(RESUME);
    assert_eq!(coordinator.interruption_state(), InterruptionState::Normal);
    assert_eq!(player.resumes(), 0);
}

#[test]
fn test_end_while_normal_is_ignored() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let mut rx = coordinator.subscribe();

    coordinator.handle_interruption(RESUME);

    assert!(port.calls().is_empty());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(coordinator.interruption_phase(), InterruptionPhase::None);
}

#[test]
fn test_repeated_began_extends_snapshot() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let first = FakePlayer::new();
    let second = FakePlayer::new();
    let a = register(&coordinator, &first);
    let b = register(&coordinator, &second);
    coordinator.activate(a).unwrap();

    coordinator.handle_interruption(BEGAN);
    // Host lets b start during the interruption
    coordinator.activate(b).unwrap();
    coordinator.handle_interruption(BEGAN);
    assert_eq!(coordinator.activity(b), Some(ActivityState::PausedByInterruption));

    coordinator.handle_interruption(RESUME);
    assert_eq!(coordinator.activity(a), Some(ActivityState::Active));
    assert_eq!(coordinator.activity(b), Some(ActivityState::Active));
    assert_eq!(coordinator.session_count(), 2);
}

/// **Given:** A category change while interrupted
/// **When:** The interruption ends with the resume hint
/// **Then:** The new category reaches the host before the re-activation
#[test]
fn test_category_deferred_during_interruption() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let handle = register(&coordinator, &FakePlayer::new());
    coordinator.activate(handle).unwrap();
    coordinator.handle_interruption(BEGAN);
    port.clear();

    let mixing = CategoryOptions {
        interruption_mode: InterruptionMode::MixWithOthers,
        bit_rate_strategy: None,
    };
    let mut rx = coordinator.subscribe();
    coordinator.set_category(AudioCategory::Ambient, mixing).unwrap();
    assert!(port.calls().is_empty());
    assert!(drain(&mut rx).iter().any(|event| matches!(
        event,
        SessionEvent::CategoryChanged { deferred: true, .. }
    )));

    coordinator.handle_interruption(RESUME);
    assert_eq!(
        port.calls(),
        vec![
            PortCall::SetCategory(AudioCategory::Ambient, mixing),
            PortCall::SetActive(true),
        ]
    );
}

/// **Given:** One active and one interrupted-then-idle object, mid interruption
/// **When:** Media services reset
/// **Then:** Count is zero, the session is reconfigured, every object
/// reinitializes and ends idle, and the handler is back to normal
#[test]
fn test_media_services_reset_preempts_interruption() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let a_player = FakePlayer::new();
    let b_player = FakePlayer::new();
    let a = register(&coordinator, &a_player);
    let b = register(&coordinator, &b_player);
    coordinator.activate(a).unwrap();
    coordinator.activate(b).unwrap();
    coordinator.handle_interruption(BEGAN);

    let mut rx = coordinator.subscribe();
    port.clear();
    coordinator.handle_media_services_reset();

    assert_eq!(coordinator.session_count(), 0);
    assert_eq!(coordinator.interruption_state(), InterruptionState::Normal);
    assert_eq!(coordinator.interruption_phase(), InterruptionPhase::None);
    assert_eq!(coordinator.activity(a), Some(ActivityState::Idle));
    assert_eq!(coordinator.activity(b), Some(ActivityState::Idle));
    assert_eq!(a_player.reinitializations(), 1);
    assert_eq!(b_player.reinitializations(), 1);
    assert_eq!(
        port.calls(),
        vec![PortCall::SetCategory(AudioCategory::Playback, CategoryOptions::default())]
    );

    let reinitialized = drain(&mut rx).into_iter().find_map(|event| match event {
        SessionEvent::MediaServicesReset { reinitialized, .. } => Some(reinitialized),
        _ => None,
    });
    let mut reinitialized = reinitialized.expect("reset event emitted");
    reinitialized.sort_by_key(|handle| handle.index);
    assert_eq!(reinitialized, vec![a, b]);

    // A later end of the pre-reset interruption is ignored
    coordinator.handle_interruption(RESUME);
    assert_eq!(a_player.resumes(), 0);
    assert_eq!(b_player.resumes(), 0);
}

#[test]
fn test_media_services_reset_from_normal() {
    let port = RecordingPort::new();
    let coordinator = coordinator(&port);
    let player = FakePlayer::new();
    let handle = register(&coordinator, &player);
    coordinator.promote_audio_session_if_necessary().unwrap();
    coordinator.activate(handle).unwrap();
    assert_eq!(coordinator.session_count(), 2);

    coordinator.handle_media_services_reset();
    assert_eq!(coordinator.session_count(), 0);
    assert_eq!(player.reinitializations(), 1);

    // Next promotion rebuilds the session from scratch
    port.clear();
    coordinator.activate(handle).unwrap();
    assert_eq!(port.activations(), 1);
    assert_eq!(coordinator.session_count(), 1);
}

/// **Given:** A port that posts an interruption from inside its activation call
/// **When:** An interruption ends with the resume hint
/// **Then:** The nested signal is queued and handled after the current one,
/// without deadlocking
#[test]
fn test_signal_posted_from_port_is_queued() {
    let port = RecordingPort::new();
    let coordinator = Arc::new(coordinator(&port));
    let player = FakePlayer::new();
    let handle = register(&coordinator, &player);
    coordinator.activate(handle).unwrap();
    coordinator.handle_interruption(BEGAN);

    let weak = Arc::downgrade(&coordinator);
    port.on_activate(move || {
        if let Some(coordinator) = weak.upgrade() {
            coordinator.post(Signal::Interruption(InterruptionEvent::Began));
        }
    });

    coordinator.handle_interruption(RESUME);

    // Resumed by the end, then paused again by the nested began
    assert_eq!(player.resumes(), 1);
    assert_eq!(player.pauses(), 2);
    assert_eq!(coordinator.interruption_state(), InterruptionState::Interrupted);
    assert_eq!(coordinator.activity(handle), Some(ActivityState::PausedByInterruption));
}

/// **Given:** A active, and a category the host refused once so the next
/// promotion has to push it again
/// **When:** B activates and the port raises an interruption from inside
/// that `set_category`
/// **Then:** `activate` returns instead of deadlocking, and the interruption
/// runs right after it, pausing both objects
#[test]
fn test_signal_posted_from_port_during_activate_is_deferred() {
    let port = RecordingPort::new();
    let coordinator = Arc::new(coordinator(&port));
    let a_player = FakePlayer::new();
    let b_player = FakePlayer::new();
    let a = register(&coordinator, &a_player);
    let b = register(&coordinator, &b_player);
    coordinator.activate(a).unwrap();

    let mixing = CategoryOptions {
        interruption_mode: InterruptionMode::MixWithOthers,
        bit_rate_strategy: None,
    };
    port.refuse_category.store(true, Ordering::SeqCst);
    assert!(coordinator.set_category(AudioCategory::Ambient, mixing).is_err());
    port.refuse_category.store(false, Ordering::SeqCst);

    let weak = Arc::downgrade(&coordinator);
    let fired = AtomicBool::new(false);
    port.on_category(move || {
        if fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(coordinator) = weak.upgrade() {
            coordinator.handle_interruption(BEGAN);
        }
    });

    let (tx, rx) = mpsc::channel();
    let worker = {
        let coordinator = Arc::clone(&coordinator);
        std::thread::spawn(move || {
            let _ = tx.send(coordinator.activate(b));
        })
    };
    let outcome = rx
        .recv_timeout(Duration::from_secs(3))
        .expect("activate returns while the port raises an interruption");
    worker.join().unwrap();

    assert_eq!(outcome, Ok(()));
    assert_eq!(coordinator.interruption_state(), InterruptionState::Interrupted);
    assert_eq!(coordinator.activity(a), Some(ActivityState::PausedByInterruption));
    assert_eq!(coordinator.activity(b), Some(ActivityState::PausedByInterruption));
    assert_eq!(a_player.pauses(), 1);
    assert_eq!(b_player.pauses(), 1);
    assert_eq!(coordinator.session_count(), 0);

    coordinator.handle_interruption(RESUME);
    assert_eq!(coordinator.activity(a), Some(ActivityState::Active));
    assert_eq!(coordinator.activity(b), Some(ActivityState::Active));
    assert_eq!(coordinator.session_count(), 2);
}

/// Same thread, activation call: the interruption lands after `activate`
/// and pauses the object it just activated
#[test]
fn test_interruption_raised_by_activation_pauses_object() {
    let port = RecordingPort::new();
    let coordinator = Arc::new(coordinator(&port));
    let player = FakePlayer::new();
    let handle = register(&coordinator, &player);

    let weak = Arc::downgrade(&coordinator);
    port.on_activate(move || {
        if let Some(coordinator) = weak.upgrade() {
            coordinator.handle_interruption(BEGAN);
        }
    });

    coordinator.activate(handle).unwrap();

    assert_eq!(coordinator.interruption_state(), InterruptionState::Interrupted);
    assert_eq!(coordinator.activity(handle), Some(ActivityState::PausedByInterruption));
    assert_eq!(player.pauses(), 1);
    assert_eq!(coordinator.session_count(), 0);
}

/// **Given:** An activation whose port call is still in flight
/// **When:** Another thread delivers an interruption before the call returns
/// **Then:** The activation is denied and rolled back, so no object is left
/// active behind the interruption
#[test]
fn test_interruption_during_activation_denies_it() {
    let port = RecordingPort::new();
    let coordinator = Arc::new(coordinator(&port));
    let player = FakePlayer::new();
    let handle = register(&coordinator, &player);

    let weak = Arc::downgrade(&coordinator);
    port.on_activate(move || {
        if let Some(coordinator) = weak.upgrade() {
            std::thread::scope(|scope| {
                scope.spawn(|| coordinator.handle_interruption(BEGAN));
            });
        }
    });

    let err = coordinator.activate(handle).unwrap_err();
    assert!(err.denies_activation());
    assert_eq!(coordinator.interruption_state(), InterruptionState::Interrupted);
    assert_eq!(coordinator.activity(handle), Some(ActivityState::Idle));
    assert_eq!(coordinator.session_count(), 0);
    assert_eq!(player.pauses(), 0);
}

/// **Given:** An activation in flight with a second promoter joined to it
/// **When:** Media services reset before the port call returns
/// **Then:** Both callers get the reset denial, the count is zero and the
/// object is idle
#[test]
fn test_reset_discards_in_flight_activation() {
    let port = RecordingPort::new();
    let coordinator = Arc::new(coordinator(&port));
    let player = FakePlayer::new();
    let handle = register(&coordinator, &player);

    let joined = Arc::new(Mutex::new(None));
    let weak = Arc::downgrade(&coordinator);
    let slot = Arc::clone(&joined);
    port.on_activate(move || {
        let Some(coordinator) = weak.upgrade() else {
            return;
        };
        std::thread::scope(|scope| {
            let joiner = scope.spawn(|| coordinator.promote_audio_session_if_necessary());

            let deadline = Instant::now() + Duration::from_secs(3);
            while coordinator.session_count() < 2 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            scope
                .spawn(|| coordinator.handle_media_services_reset())
                .join()
                .unwrap();

            *slot.lock().unwrap() = Some(joiner.join().unwrap());
        });
    });

    let reset_denial: Result<(), Error> = Err(Error::ActivationDenied("media services reset".to_string()));
    assert_eq!(coordinator.activate(handle), reset_denial);
    assert_eq!(joined.lock().unwrap().take(), Some(reset_denial));
    assert_eq!(coordinator.session_count(), 0);
    assert_eq!(coordinator.activity(handle), Some(ActivityState::Idle));
    assert_eq!(player.reinitializations(), 1);

    // The session comes back with the next promotion
    port.on_activate(|| {});
    coordinator.activate(handle).unwrap();
    assert_eq!(coordinator.session_count(), 1);
}
