use std::sync::Arc;

use sincro_core::chat::{AddOutcome, ChatLog, ChatMessage, MessageType, TranscriptAccumulator};
use sincro_core::clock::ManualClock;
use sincro_core::talk::{MoraEvent, MoraScheduler};

fn mora(length: f64, new_text: bool) -> MoraEvent {
    MoraEvent {
        timestamp: 0.0,
        message: "9月3日です。".to_string(),
        vowel: Some("a".to_string()),
        text: Some("ガ".to_string()),
        length,
        new_text,
    }
}

fn chat(id: &str, text: &str) -> ChatMessage {
    ChatMessage {
        message_id: id.to_string(),
        message_type: MessageType::User,
        speaker_id: "guest".to_string(),
        speaker_name: "Guest".to_string(),
        message: text.to_string(),
        created_at: 1725330115214.0,
    }
}

#[test]
fn test_single_unit_window() {
    let clock = ManualClock::new();
    let scheduler = MoraScheduler::with_clock(clock.clone());

    scheduler.add_event(mora(0.1, true));

    clock.set_ms(50);
    assert!(scheduler.current_unit().is_some(), "active inside the window");
    clock.set_ms(150);
    assert!(scheduler.current_unit().is_none(), "expired after the window");
}

#[test]
fn test_replacement_reports_second_unit() {
    let clock = ManualClock::new();
    let scheduler = MoraScheduler::with_clock(clock.clone());

    let first = scheduler.add_event(mora(0.5, true)).unwrap();
    clock.set_ms(100);
    let second = scheduler.add_event(mora(0.2, true)).unwrap();

    clock.set_ms(150);
    let unit = scheduler.current_unit().expect("second unit still active");
    assert_eq!(unit.unit_id, second);
    assert_ne!(unit.unit_id, first);
}

#[test]
fn test_window_holds_for_every_query_inside_it() {
    let clock = ManualClock::new();
    let scheduler = MoraScheduler::with_clock(clock.clone());

    clock.set_ms(1_000);
    let event = mora(0.19575, true);
    scheduler.add_event(event.clone());

    // 1000 .. 1195.75 is active
    for t in (1_000..1_196).step_by(13) {
        clock.set_ms(t);
        let unit = scheduler.current_unit().expect("inside window");
        assert_eq!(unit.event, event);
    }
    for t in [1_196, 1_300, 5_000] {
        clock.set_ms(t);
        assert!(scheduler.current_unit().is_none());
    }
}

#[test]
fn test_supplementary_events_never_change_current_unit() {
    let clock = ManualClock::new();
    let scheduler = MoraScheduler::with_clock(clock.clone());

    scheduler.add_event(mora(0.3, true));
    for t in [0u64, 50, 100, 250] {
        clock.set_ms(t);
        let before = scheduler.current_unit();
        scheduler.add_event(mora(10.0, false));
        let after = scheduler.current_unit();
        match (before, after) {
            (Some(b), Some(a)) => assert!(Arc::ptr_eq(&b, &a)),
            (None, None) => {}
            other => panic!("current unit changed: {:?}", other),
        }
    }
    clock.set_ms(300);
    assert!(scheduler.current_unit().is_none());
    assert_eq!(scheduler.history().len(), 5);
}

#[test]
fn test_transcript_update_by_id() {
    let mut acc = TranscriptAccumulator::new();
    acc.add_message(chat("m1", "hello"));
    acc.add_message(chat("m1", "hello world"));

    assert_eq!(acc.len(), 1);
    assert_eq!(acc.get("m1").unwrap().message, "hello world");
}

#[test]
fn test_chat_log_routes_remote_updates_and_notices() {
    let log = ChatLog::new(50);
    log.write_system_message("Connecting to the speech server.");
    assert_eq!(log.write_message(chat("m1", "今日")), AddOutcome::Added);
    assert_eq!(log.write_message(chat("m1", "今日は")), AddOutcome::Updated);

    let messages = log.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message_type, MessageType::System);
    assert_eq!(messages[1].message, "今日は");
}

#[test]
fn test_error_dedup_and_force() {
    let log = ChatLog::new(0);
    assert!(log.write_error_message("Failed", false).is_some());
    assert!(log.write_error_message("Failed", false).is_none());
    assert_eq!(log.len(), 1);

    assert!(log.write_error_message("Failed", true).is_some());
    assert_eq!(log.len(), 2);
}
