// Integration tests for the meeting session lifecycle
//
// These tests drive a MeetingSession against scripted fakes and verify the
// join protocol, exactly-once finalization and the degraded paths.

mod common;

use anyhow::Result;
use common::{caption_message, session_config, Harness, MEETING_URL};
use meet_recorder::browser::Locators;
use meet_recorder::session::{MeetingSession, RecordingStatus, SessionError, StopReason};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_join_protocol_reaches_started() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    let locators = Locators::default();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    assert_eq!(session.status(), RecordingStatus::NotStarted);

    session.start().await?;

    assert_eq!(session.status(), RecordingStatus::Started);
    assert_eq!(harness.launcher.launches.load(Ordering::SeqCst), 1);
    assert_eq!(*harness.page.navigated.lock().unwrap(), vec![MEETING_URL.to_string()]);
    assert_eq!(*harness.page.typed.lock().unwrap(), vec!["Notetaker".to_string()]);
    assert!(harness.page.was_clicked(&locators.captions_toggle));
    assert!(harness.page.has_binding());
    assert_eq!(harness.page.scripts.lock().unwrap().len(), 2);
    assert_eq!(session.title().as_deref(), Some("Weekly Sync"));

    // Recording was fully running before STARTED was reported
    assert_eq!(harness.capture.starts.load(Ordering::SeqCst), 1);
    assert_eq!(harness.encoder.spawns.load(Ordering::SeqCst), 1);

    let options = harness.launcher.last_options.lock().unwrap().clone().unwrap();
    assert!(options.headless);
    assert_eq!(options.language, "en-US");

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_produces_result_with_transcript_and_recording() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;

    assert!(harness.capture.feed(b"frame-1").await);
    assert!(harness.capture.feed(b"frame-2").await);
    assert!(harness.page.emit(caption_message("A", "hello")).await);
    assert!(harness.page.emit(caption_message("B", "world")).await);

    for _ in 0..200 {
        if session.transcript().await.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let result = session.stop().await.expect("first stop finalizes");

    assert_eq!(session.status(), RecordingStatus::Stopped);
    assert_eq!(result.stop_reason, StopReason::Requested);
    assert_eq!(result.title, "Weekly Sync");
    assert_eq!(result.meeting_url, MEETING_URL);
    assert_eq!(result.transcript_text, "A: hello\nB: world");
    assert_eq!(result.transcript.len(), 2);
    assert!(!result.recording_degraded);
    assert!(result.started_at.is_some());
    assert!(result.summary.is_none(), "no credential, no summary");

    // Pipeline drained every byte before stop returned
    assert_eq!(harness.encoder.bytes_written(), b"frame-1frame-2".to_vec());
    assert_eq!(harness.encoder.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.capture.stops.load(Ordering::SeqCst), 1);
    assert_eq!(harness.page.close_count(), 1);

    let location = result.recording_location.expect("recording enabled");
    assert_eq!(location.parent(), Some(temp_dir.path()));
    assert_eq!(harness.encoder.outputs.lock().unwrap()[0], location);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_stop_finalizes_once() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    assert!(session.on_end(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    session.start().await?;

    let (first, second) = tokio::join!(session.stop(), session.stop());

    assert_eq!(
        [first.is_some(), second.is_some()].iter().filter(|s| **s).count(),
        1,
        "exactly one stop produces the result"
    );
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(harness.encoder.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.page.close_count(), 1);
    assert_eq!(harness.capture.stops.load(Ordering::SeqCst), 1);

    // Later stops are no-ops
    assert!(session.stop().await.is_none());
    assert_eq!(harness.page.close_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_record_disabled_never_touches_encoder() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let mut config = session_config(&temp_dir.path().join("never-created"));
    config.record_meeting = false;

    let session = MeetingSession::new(config, harness.collaborators())?;
    session.start().await?;
    let result = session.stop().await.expect("result");

    assert_eq!(harness.encoder.spawns.load(Ordering::SeqCst), 0);
    assert_eq!(harness.encoder.finishes.load(Ordering::SeqCst), 0);
    assert_eq!(harness.capture.starts.load(Ordering::SeqCst), 0);
    assert!(result.recording_location.is_none());
    assert!(!temp_dir.path().join("never-created").exists());

    Ok(())
}

#[tokio::test]
async fn test_alone_in_meeting_stops_session() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    let locators = Locators::default();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;

    harness.page.set_text(&locators.participant_count, "1");

    let result = tokio::time::timeout(Duration::from_secs(2), session.wait_for_end())
        .await?
        .expect("result");

    assert_eq!(result.stop_reason, StopReason::AloneInMeeting);
    assert_eq!(session.status(), RecordingStatus::Stopped);
    assert_eq!(harness.page.close_count(), 1);
    assert!(session.stop().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_kicked_stops_session() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    let locators = Locators::default();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;

    harness.page.show(&locators.removed_heading);

    let result = tokio::time::timeout(Duration::from_secs(2), session.wait_for_end())
        .await?
        .expect("result");

    assert_eq!(result.stop_reason, StopReason::Kicked);
    assert_eq!(harness.encoder.finishes.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_probe_and_stop_race_finalizes_once() -> Result<()> {
    for _ in 0..10 {
        let temp_dir = TempDir::new()?;
        let harness = Harness::new();
        let locators = Locators::default();

        let mut config = session_config(temp_dir.path());
        config.probe_interval_ms = 1;

        let session = MeetingSession::new(config, harness.collaborators())?;

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        session.on_end(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.start().await?;

        harness.page.show(&locators.removed_heading);
        let explicit = session.stop().await;

        let result = tokio::time::timeout(Duration::from_secs(2), session.wait_for_end())
            .await?
            .expect("result");

        if let Some(explicit) = explicit {
            assert_eq!(explicit.stop_reason, result.stop_reason);
        }

        // Give a late probe the chance to misbehave
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(harness.page.close_count(), 1);
        assert_eq!(harness.encoder.finishes.load(Ordering::SeqCst), 1);
    }

    Ok(())
}

#[tokio::test]
async fn test_missing_output_dir_is_created_and_normalized() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let recordings = temp_dir.path().join("recordings");
    let mut config = session_config(temp_dir.path());
    config.recording_location = format!("{}/", recordings.display());

    assert!(!recordings.exists());

    let session = MeetingSession::new(config, harness.collaborators())?;

    assert!(recordings.is_dir());
    let output = session.output_path().expect("output path");
    assert!(!output.to_string_lossy().contains("//"));
    assert_eq!(output.parent(), Some(recordings.as_path()));

    let file_name = output.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("meeting-"));
    assert!(file_name.ends_with(".mp4"));

    Ok(())
}

#[tokio::test]
async fn test_unwritable_output_dir_is_config_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let blocker = temp_dir.path().join("file");
    std::fs::write(&blocker, b"not a directory")?;

    let config = session_config(&blocker.join("recordings"));
    let err = MeetingSession::new(config, harness.collaborators()).err().expect("config error");

    assert!(matches!(err, SessionError::Config(_)));
    assert_eq!(harness.launcher.launches.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_join_timeout_aborts_without_result() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    harness.page.hide(&Locators::default().call_active);

    let mut config = session_config(temp_dir.path());
    config.join_timeout_ms = Some(100);

    let session = MeetingSession::new(config, harness.collaborators())?;
    let err = session.start().await.err().expect("join timeout");

    assert!(matches!(err, SessionError::JoinTimeout { step: "active call" }));
    assert_eq!(session.status(), RecordingStatus::NotStarted);
    assert!(session.result().is_none());
    assert_eq!(harness.encoder.spawns.load(Ordering::SeqCst), 0);
    assert_eq!(harness.page.close_count(), 1);
    assert!(session.snapshot().await.error.is_some());

    // No result is ever emitted for a failed join
    assert!(session.stop().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_navigation_failure_is_join_protocol_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    harness.page.fail_navigation.store(true, Ordering::SeqCst);

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    let err = session.start().await.err().expect("navigation error");

    assert!(matches!(err, SessionError::JoinProtocol { step: "navigation", .. }));
    assert_eq!(harness.page.close_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_encoder_spawn_failure_aborts_start() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    harness.encoder.fail_spawn.store(true, Ordering::SeqCst);

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    let err = session.start().await.err().expect("recording error");

    assert!(matches!(err, SessionError::Recording(_)));
    assert_eq!(session.status(), RecordingStatus::NotStarted);
    // Capture was started, then released again
    assert_eq!(harness.capture.starts.load(Ordering::SeqCst), 1);
    assert_eq!(harness.capture.stops.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_sink_write_failure_degrades_result() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    harness.encoder.fail_writes.store(true, Ordering::SeqCst);

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;

    harness.capture.feed(b"frame").await;
    harness.page.emit(caption_message("A", "still here")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = session.stop().await.expect("result despite sink failure");

    assert!(result.recording_degraded);
    assert_eq!(result.title, "Weekly Sync");
    assert_eq!(result.transcript_text, "A: still here");

    Ok(())
}

#[tokio::test]
async fn test_pause_drops_transcript_fragments() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    assert!(!session.pause(), "cannot pause before joining");

    session.start().await?;

    harness.page.emit(caption_message("A", "one")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.pause());
    assert!(!session.pause());
    assert_eq!(session.status(), RecordingStatus::Paused);

    harness.page.emit(caption_message("A", "dropped")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.resume());
    assert_eq!(session.status(), RecordingStatus::Started);

    harness.page.emit(caption_message("B", "two")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = session.stop().await.expect("result");
    assert_eq!(result.transcript_text, "A: one\nB: two");

    Ok(())
}

#[tokio::test]
async fn test_stop_while_paused() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;
    session.pause();

    assert!(session.stop().await.is_some());
    assert!(!session.resume());

    Ok(())
}

#[tokio::test]
async fn test_summary_uses_credential_and_transcript() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let mut config = session_config(temp_dir.path());
    config.api_key = Some("secret".to_string());

    let session = MeetingSession::new(config, harness.collaborators())?;
    session.start().await?;

    harness.page.emit(caption_message("A", "ship it")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = session.stop().await.expect("result");

    assert_eq!(result.summary.as_deref(), Some("Discussed the roadmap."));
    assert_eq!(harness.summarizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.summarizer.last_transcript.lock().unwrap().as_deref(),
        Some("A: ship it")
    );

    Ok(())
}

#[tokio::test]
async fn test_summary_failure_keeps_result() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    harness.summarizer.fail.store(true, Ordering::SeqCst);

    let mut config = session_config(temp_dir.path());
    config.api_key = Some("secret".to_string());

    let session = MeetingSession::new(config, harness.collaborators())?;
    session.start().await?;

    harness.page.emit(caption_message("A", "hello")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = session.stop().await.expect("result");

    assert!(result.summary.is_none());
    assert_eq!(result.transcript_text, "A: hello");

    Ok(())
}

#[tokio::test]
async fn test_empty_transcript_skips_summary() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let mut config = session_config(temp_dir.path());
    config.api_key = Some("secret".to_string());

    let session = MeetingSession::new(config, harness.collaborators())?;
    session.start().await?;
    let result = session.stop().await.expect("result");

    assert!(result.summary.is_none());
    assert_eq!(harness.summarizer.calls.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_on_end_after_end_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;
    session.stop().await;

    assert!(!session.on_end(|_| panic!("must not run")));
    assert!(session.result().is_some());
    assert!(session.wait_for_end().await.is_some());

    Ok(())
}

#[tokio::test]
async fn test_start_twice_is_invalid_state() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;

    let err = session.start().await.err().expect("second start rejected");
    assert!(matches!(err, SessionError::InvalidState(RecordingStatus::Started)));
    assert_eq!(harness.launcher.launches.load(Ordering::SeqCst), 1);

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_debug_launches_headed_browser() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let mut config = session_config(temp_dir.path());
    config.debug = true;
    config.language = "nl-NL".to_string();

    let session = MeetingSession::launch(config, harness.collaborators()).await?;

    let options = harness.launcher.last_options.lock().unwrap().clone().unwrap();
    assert!(!options.headless);
    assert_eq!(options.language, "nl-NL");

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_mic_prompt_is_dismissed_when_shown() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    let locators = Locators::default();

    harness.page.show(&locators.mic_prompt);
    harness.page.show(&locators.mic_prompt_dismiss);

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;

    assert!(harness.page.was_clicked(&locators.mic_prompt_dismiss));
    assert!(!harness.page.was_clicked(&locators.keep_safe_dismiss));

    session.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_absent_optional_steps_bounded_by_timeout() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let mut config = session_config(temp_dir.path());
    config.optional_step_timeout_ms = 2000;

    let session = MeetingSession::new(config, harness.collaborators())?;

    let started = tokio::time::Instant::now();
    session.start().await?;
    let elapsed = started.elapsed();

    // Mic prompt and safety notice each wait out their timeout, nothing more
    assert!(elapsed >= Duration::from_millis(4000));
    assert!(elapsed < Duration::from_millis(4500), "took {:?}", elapsed);
    assert_eq!(session.status(), RecordingStatus::Started);

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_snapshot_reports_progress() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;

    harness.page.emit(caption_message("A", "hello")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.id, session.id());
    assert_eq!(snapshot.status, RecordingStatus::Started);
    assert_eq!(snapshot.transcript_entries, 1);
    assert_eq!(snapshot.title.as_deref(), Some("Weekly Sync"));
    assert!(snapshot.stop_reason.is_none());

    session.stop().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.status, RecordingStatus::Stopped);
    assert_eq!(snapshot.stop_reason, Some(StopReason::Requested));
    assert!(snapshot.ended_at.is_some());
    assert!(snapshot.output_path.is_some());

    Ok(())
}

#[tokio::test]
async fn test_abort_while_joining_releases_browser() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    harness.page.hide(&Locators::default().call_active);

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;

    let joining = session.clone();
    let join_task = tokio::spawn(async move { joining.start().await });

    assert!(common::eventually(|| !harness.page.typed.lock().unwrap().is_empty()).await);
    assert_eq!(harness.page.close_count(), 0);

    assert!(session.abort().await.is_none(), "no result before joining");

    let err = join_task.await?.err().expect("join cancelled");
    assert!(matches!(err, SessionError::Aborted));
    assert_eq!(session.status(), RecordingStatus::Stopped);
    assert_eq!(harness.page.close_count(), 1);
    assert_eq!(harness.encoder.spawns.load(Ordering::SeqCst), 0);
    assert!(session.result().is_none());
    assert!(session.snapshot().await.error.is_some());

    // Nothing left to release or restart
    assert!(session.abort().await.is_none());
    assert!(session.stop().await.is_none());
    assert!(matches!(
        session.start().await,
        Err(SessionError::InvalidState(RecordingStatus::Stopped))
    ));
    assert_eq!(harness.page.close_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_abort_live_session_finalizes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;
    harness.capture.feed(b"frame").await;

    let result = session.abort().await.expect("live session produces a result");

    assert_eq!(result.stop_reason, StopReason::Requested);
    assert_eq!(harness.encoder.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.page.close_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stop_while_waiting_for_captions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();
    harness.page.hide(&Locators::default().captions_toggle);

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;

    let joining = session.clone();
    let join_task = tokio::spawn(async move { joining.start().await });

    let live = session.clone();
    assert!(common::eventually(|| live.status() == RecordingStatus::Started).await);

    let result = session.stop().await.expect("live session produces a result");
    assert_eq!(result.stop_reason, StopReason::Requested);

    // The join returns once the pending captions wait sees the stop
    tokio::time::timeout(Duration::from_secs(2), join_task).await???;

    assert_eq!(harness.page.close_count(), 1);
    assert_eq!(harness.encoder.finishes.load(Ordering::SeqCst), 1);
    assert!(!harness.page.has_binding(), "transcript never wired after stop");
    assert!(session.title().is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pause_resume_keeps_transcript_in_step() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let harness = Harness::new();

    let session = MeetingSession::new(session_config(temp_dir.path()), harness.collaborators())?;
    session.start().await?;

    let mut toggles = Vec::new();
    for i in 0..200 {
        let session = session.clone();
        toggles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                session.pause();
            } else {
                session.resume();
            }
        }));
    }
    for toggle in toggles {
        toggle.await?;
    }

    let paused = session.status() == RecordingStatus::Paused;
    harness.page.emit(caption_message("A", "after the race")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Fragments are kept exactly when the session reports STARTED
    assert_eq!(session.transcript().await.is_empty(), paused);

    session.stop().await;
    Ok(())
}
