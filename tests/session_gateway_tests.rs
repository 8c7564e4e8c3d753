//! Session and gateway scenario tests
//!
//! Each test runs a real gateway session against the scripted mock backend in
//! `common` and drives it from the caller side through channels.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use bytes::Bytes;

use callbridge_gateway::core::agent::{AgentConfig, DEFAULT_FALLBACK_UTTERANCE};
use callbridge_gateway::core::gateway::{GatewaySettings, SessionGateway};
use callbridge_gateway::core::guardrails::{BlocklistGuardrail, GuardrailChain};
use callbridge_gateway::core::realtime::BackendEvent;
use callbridge_gateway::core::session::{
    CallerCommand, CloseReason, InboundEvent, SessionError, SessionReport, SessionSettings,
    SessionState, close_code,
};
use common::*;
use tokio::task::JoinHandle;

fn settings() -> GatewaySettings {
    GatewaySettings::default()
}

/// Starts one session on `gateway` and returns its caller side.
fn spawn_session(gateway: &Arc<SessionGateway>) -> (CallerSide, JoinHandle<SessionReport>) {
    let (caller, inbound_rx, caller_tx) = caller_channels();
    let gateway = gateway.clone();
    let task = tokio::spawn(async move { gateway.accept_connection(inbound_rx, caller_tx).await });
    (caller, task)
}

async fn connected(handle: &MockHandle) {
    assert!(
        handle
            .wait_for(|calls| matches!(calls.first(), Some(BackendCall::Connect { .. })))
            .await,
        "backend never connected"
    );
    assert!(handle.is_connected());
}

fn media_payload(command: &CallerCommand) -> Vec<u8> {
    match command {
        CallerCommand::Media(frame) => BASE64_STANDARD.decode(&frame.payload).unwrap(),
        other => panic!("expected media, got {other:?}"),
    }
}

// =============================================================================
// Connect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_closes_caller() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Hang), settings());
    let (mut caller, task) = spawn_session(&gateway);

    let report = task.await.unwrap();

    assert_eq!(report.final_state, SessionState::Closed);
    assert!(matches!(
        report.close_reason,
        Some(CloseReason::Fatal(SessionError::ConnectTimeout(d))) if d == Duration::from_secs(10)
    ));
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Close {
            code: close_code::TRY_AGAIN_LATER,
            reason: "connect_timeout".to_string(),
        }
    );
    assert_eq!(handle.disconnects(), 1);
    assert_eq!(handle.audio_sequences(), Vec::<u64>::new());
}

#[tokio::test]
async fn test_connect_failure_is_not_retried() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Fail), settings());
    let (mut caller, task) = spawn_session(&gateway);

    let report = task.await.unwrap();

    assert!(matches!(
        report.close_reason,
        Some(CloseReason::Fatal(SessionError::BackendConnect(_)))
    ));
    assert_eq!(
        handle.count(|call| matches!(call, BackendCall::Connect { .. })),
        1
    );
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Close {
            code: close_code::INTERNAL_ERROR,
            reason: "backend_unavailable".to_string(),
        }
    );
}

#[tokio::test]
async fn test_session_setup_carries_agent() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    let BackendCall::Connect {
        instructions,
        tools,
    } = handle.calls()[0].clone()
    else {
        panic!("first call should be connect");
    };
    assert_eq!(instructions, "You are a helpful assistant at a veterinary office.");
    assert_eq!(
        tools,
        vec!["schedule_appointment", "lookup_records", "check_availability"]
    );

    drop(caller);
    task.await.unwrap();
}

// =============================================================================
// Caller audio
// =============================================================================

#[tokio::test]
async fn test_out_of_order_frames_reach_backend_in_order() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    caller.start().await;
    for sequence in [1, 3, 2, 5, 4, 6] {
        caller.send_frame(sequence, &[sequence as u8]).await;
    }

    assert!(handle.wait_for(|calls| calls.len() >= 7).await);
    assert_eq!(handle.audio_sequences(), vec![1, 2, 3, 4, 5, 6]);

    drop(caller);
    let report = task.await.unwrap();
    assert_eq!(report.stats.frames_in, 6);
    assert_eq!(report.stats.frames_forwarded, 6);
}

#[tokio::test]
async fn test_duplicate_frames_are_dropped() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    caller.start().await;
    caller.send_frame(1, b"a").await;
    caller.send_frame(1, b"a").await;
    caller.send_frame(2, b"b").await;

    assert!(handle.wait_for(|calls| calls.len() >= 3).await);
    drop(caller);
    let report = task.await.unwrap();

    assert_eq!(handle.audio_sequences(), vec![1, 2]);
    assert_eq!(report.stats.frames_dropped, 1);
}

#[tokio::test]
async fn test_held_frames_drain_on_hangup() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    caller.start().await;
    caller.send_frame(1, b"a").await;
    caller.send_frame(3, b"c").await;
    caller.send_frame(4, b"d").await;
    caller.inbound.send(InboundEvent::Stop).await.unwrap();

    let report = task.await.unwrap();
    assert!(matches!(report.close_reason, Some(CloseReason::CallerHangup)));
    assert_eq!(handle.audio_sequences(), vec![1, 3, 4]);

    let calls = handle.calls();
    assert_eq!(calls.last(), Some(&BackendCall::Disconnect));
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Close {
            code: close_code::NORMAL,
            reason: "caller_hangup".to_string(),
        }
    );
}

#[tokio::test]
async fn test_unsupported_caller_format_is_fatal() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    caller
        .inbound
        .send(InboundEvent::Start {
            stream_id: "MZ1".to_string(),
            format: callbridge_gateway::core::codec::MediaFormat::new("audio/opus", 48000, 1),
            first_sequence: 1,
        })
        .await
        .unwrap();

    let report = task.await.unwrap();
    assert!(matches!(
        report.close_reason,
        Some(CloseReason::Fatal(SessionError::Codec(_)))
    ));
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Close {
            code: close_code::UNSUPPORTED_DATA,
            reason: "unsupported_format".to_string(),
        }
    );
}

// =============================================================================
// Turns and guardrails
// =============================================================================

#[tokio::test]
async fn test_clean_turn_is_released_with_mark() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit_turn("resp_1", "We have an opening on Monday.", &[b"one", b"two"])
        .await;

    let first = caller.next_command().await;
    assert_eq!(media_payload(&first), b"one");
    let CallerCommand::Media(frame) = &first else {
        unreachable!()
    };
    assert_eq!(frame.sequence, 1);

    let second = caller.next_command().await;
    assert_eq!(media_payload(&second), b"two");
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Mark {
            name: "resp_1".to_string()
        }
    );

    drop(caller.inbound);
    let report = task.await.unwrap();
    assert_eq!(report.stats.turns_released, 1);
    assert_eq!(report.stats.turns_withheld, 0);
    assert_eq!(report.stats.frames_out, 2);
}

#[tokio::test]
async fn test_blocklisted_turn_is_replaced_by_fallback() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    for term in ["diagnosis", "discount", "cure", "refund"] {
        handle.clear_calls();
        let response_id = format!("resp_{term}");
        handle
            .emit(BackendEvent::TranscriptDelta {
                response_id: response_id.clone(),
                delta: format!("You qualify for a {term}"),
            })
            .await;
        handle
            .emit(BackendEvent::AudioDelta {
                response_id: response_id.clone(),
                audio: Bytes::from_static(b"forbidden"),
            })
            .await;
        handle
            .emit(BackendEvent::TurnComplete { response_id })
            .await;

        // The only audio that reaches the caller is the spoken fallback
        let command = caller.next_command().await;
        assert_eq!(media_payload(&command), SPOKEN_AUDIO, "term {term}");
        assert!(matches!(caller.next_command().await, CallerCommand::Mark { .. }));
        assert_eq!(
            handle.count(|call| *call == BackendCall::Speak(DEFAULT_FALLBACK_UTTERANCE.to_string())),
            1
        );
    }

    drop(caller.inbound);
    let report = task.await.unwrap();
    assert_eq!(report.stats.turns_withheld, 4);
    assert_eq!(report.stats.turns_released, 4);
    assert_eq!(report.final_state, SessionState::Closed);
}

#[tokio::test]
async fn test_barge_in_discards_unreleased_turn() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit(BackendEvent::AudioDelta {
            response_id: "resp_1".to_string(),
            audio: Bytes::from_static(b"interrupted"),
        })
        .await;
    handle.emit(BackendEvent::SpeechStarted).await;
    handle
        .emit(BackendEvent::TurnComplete {
            response_id: "resp_1".to_string(),
        })
        .await;
    handle.emit_turn("resp_2", "Sure.", &[b"next"]).await;

    assert_eq!(caller.next_command().await, CallerCommand::Clear);
    assert_eq!(media_payload(&caller.next_command().await), b"next");

    drop(caller.inbound);
    let report = task.await.unwrap();
    assert_eq!(report.stats.turns_released, 1);
}

#[tokio::test]
async fn test_interrupted_response_output_is_dropped() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit(BackendEvent::TranscriptDelta {
            response_id: "resp_1".to_string(),
            delta: "Your pet needs".to_string(),
        })
        .await;
    handle
        .emit(BackendEvent::AudioDelta {
            response_id: "resp_1".to_string(),
            audio: Bytes::from_static(b"part1"),
        })
        .await;
    handle.emit(BackendEvent::SpeechStarted).await;
    // Output the backend had already sent before it saw the interruption
    handle
        .emit(BackendEvent::AudioDelta {
            response_id: "resp_1".to_string(),
            audio: Bytes::from_static(b"part2"),
        })
        .await;
    handle
        .emit(BackendEvent::TurnComplete {
            response_id: "resp_1".to_string(),
        })
        .await;
    handle.emit_turn("resp_2", "Go ahead.", &[b"next"]).await;

    assert_eq!(caller.next_command().await, CallerCommand::Clear);
    assert_eq!(media_payload(&caller.next_command().await), b"next");
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Mark {
            name: "resp_2".to_string()
        }
    );

    drop(caller.inbound);
    let report = task.await.unwrap();
    assert_eq!(report.stats.turns_released, 1);
    assert_eq!(report.stats.frames_out, 1);
}

#[tokio::test]
async fn test_aborted_response_is_never_released() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit(BackendEvent::TranscriptDelta {
            response_id: "resp_1".to_string(),
            delta: "We can".to_string(),
        })
        .await;
    handle
        .emit(BackendEvent::AudioDelta {
            response_id: "resp_1".to_string(),
            audio: Bytes::from_static(b"cut"),
        })
        .await;
    handle
        .emit(BackendEvent::TurnAborted {
            response_id: "resp_1".to_string(),
            status: "incomplete".to_string(),
        })
        .await;
    handle.emit_turn("resp_2", "Anything else?", &[b"whole"]).await;

    assert_eq!(media_payload(&caller.next_command().await), b"whole");

    drop(caller.inbound);
    let report = task.await.unwrap();
    assert_eq!(report.stats.turns_released, 1);
    assert_eq!(report.stats.turns_withheld, 0);
}

#[tokio::test]
async fn test_tripped_fallback_stays_silent_after_unrelated_response() {
    let handle = MockHandle::new();
    handle.mute_speech();
    let agent = Arc::new(
        AgentConfig::new("Triage Agent", "You are a helpful assistant at a veterinary office.")
            .with_guardrails(
                GuardrailChain::new().with(BlocklistGuardrail::new("Blocklist terms", ["refund"])),
            )
            .with_fallback_utterance("Ask the front desk about a refund."),
    );
    let gateway = Arc::new(SessionGateway::new(
        agent,
        mock_factory(handle.clone(), ConnectBehavior::Succeed),
        settings(),
    ));
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit_turn("resp_1", "You are owed a refund.", &[b"blocked"])
        .await;
    assert!(
        handle
            .wait_for(|calls| calls.iter().any(|call| matches!(call, BackendCall::Speak(_))))
            .await
    );

    // A response with no output finishes before the fallback is generated
    handle
        .emit(BackendEvent::TurnComplete {
            response_id: "resp_tool".to_string(),
        })
        .await;
    handle
        .emit_turn("resp_fallback", "Ask the front desk about a refund.", &[b"fallback"])
        .await;
    handle.emit_turn("resp_3", "Goodbye.", &[b"bye"]).await;

    assert_eq!(media_payload(&caller.next_command().await), b"bye");
    assert_eq!(
        handle.count(|call| matches!(call, BackendCall::Speak(_))),
        1
    );

    drop(caller.inbound);
    let report = task.await.unwrap();
    assert_eq!(report.stats.turns_withheld, 2);
    assert_eq!(report.stats.turns_released, 1);
}

// =============================================================================
// Tools
// =============================================================================

#[tokio::test]
async fn test_tool_call_result_returns_to_backend() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit(BackendEvent::ToolCallRequest {
            call_id: "call_1".to_string(),
            name: "schedule_appointment".to_string(),
            arguments: r#"{"date":"2024-01-01"}"#.to_string(),
        })
        .await;

    assert!(handle.wait_for(|calls| calls.iter().any(|c| matches!(c, BackendCall::ToolResult { .. }))).await);
    assert_eq!(
        handle.tool_results(),
        vec![(
            "call_1".to_string(),
            "Appointment scheduled for 2024-01-01 at 10am".to_string()
        )]
    );

    drop(caller);
    let report = task.await.unwrap();
    assert_eq!(report.stats.tool_calls, 1);
    assert_eq!(report.stats.tool_errors, 0);
}

#[tokio::test]
async fn test_tool_errors_are_reported_and_session_continues() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    let requests = [
        ("call_1", "schedule_appointment", "{}", "validation_error"),
        ("call_2", "unknown_tool", "{}", "unknown_tool"),
        ("call_3", "lookup_records", "{}", "execution_error"),
    ];
    for (call_id, name, arguments, _) in requests {
        handle
            .emit(BackendEvent::ToolCallRequest {
                call_id: call_id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            })
            .await;
    }

    assert!(handle.wait_for(|calls| calls.iter().filter(|c| matches!(c, BackendCall::ToolResult { .. })).count() == 3).await);
    let results = handle.tool_results();
    for ((call_id, output), (expected_id, _, _, kind)) in results.iter().zip(requests) {
        assert_eq!(call_id, expected_id);
        let value: serde_json::Value = serde_json::from_str(output).unwrap();
        assert_eq!(value["error"]["kind"], kind);
    }

    // Still serving turns
    handle.emit_turn("resp_1", "Anything else?", &[b"ok"]).await;
    assert_eq!(media_payload(&caller.next_command().await), b"ok");

    drop(caller.inbound);
    let report = task.await.unwrap();
    assert_eq!(report.stats.tool_calls, 3);
    assert_eq!(report.stats.tool_errors, 3);
    assert!(matches!(report.close_reason, Some(CloseReason::CallerHangup)));
}

#[tokio::test]
async fn test_audio_keeps_flowing_while_tool_pending() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit(BackendEvent::ToolCallRequest {
            call_id: "call_slow".to_string(),
            name: "check_availability".to_string(),
            arguments: "{}".to_string(),
        })
        .await;

    caller.start().await;
    caller.send_frame(1, b"a").await;
    caller.send_frame(2, b"b").await;
    assert!(handle.wait_for(|calls| calls.iter().filter(|c| matches!(c, BackendCall::Audio { .. })).count() == 2).await);

    // Hanging up cancels the slow tool; its result is never delivered
    drop(caller);
    let report = task.await.unwrap();
    assert!(matches!(report.close_reason, Some(CloseReason::CallerHangup)));
    assert!(handle.tool_results().is_empty());
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_failing_tool_in_one_session_leaves_other_untouched() {
    let handle_a = MockHandle::new();
    let handle_b = MockHandle::new();
    let gateway = test_gateway(
        sequential_factory(vec![handle_a.clone(), handle_b.clone()]),
        settings(),
    );

    let (caller_a, task_a) = spawn_session(&gateway);
    connected(&handle_a).await;
    let (mut caller_b, task_b) = spawn_session(&gateway);
    connected(&handle_b).await;

    handle_a
        .emit(BackendEvent::ToolCallRequest {
            call_id: "a_1".to_string(),
            name: "lookup_records".to_string(),
            arguments: "{}".to_string(),
        })
        .await;
    assert!(handle_a.wait_for(|calls| calls.iter().any(|c| matches!(c, BackendCall::ToolResult { .. }))).await);

    handle_b
        .emit(BackendEvent::ToolCallRequest {
            call_id: "b_1".to_string(),
            name: "schedule_appointment".to_string(),
            arguments: r#"{"date":"2024-02-02"}"#.to_string(),
        })
        .await;
    assert!(handle_b.wait_for(|calls| calls.iter().any(|c| matches!(c, BackendCall::ToolResult { .. }))).await);
    assert!(handle_b.tool_results()[0].1.contains("2024-02-02"));

    handle_b.emit_turn("resp_b", "Booked.", &[b"booked"]).await;
    assert_eq!(media_payload(&caller_b.next_command().await), b"booked");

    assert!(handle_a.tool_results().iter().all(|(id, _)| id.starts_with("a_")));
    assert!(handle_b.tool_results().iter().all(|(id, _)| id.starts_with("b_")));
    assert_eq!(gateway.active_sessions(), 2);

    drop(caller_a);
    let report_a = task_a.await.unwrap();
    assert_eq!(report_a.stats.tool_errors, 1);
    assert!(matches!(report_a.close_reason, Some(CloseReason::CallerHangup)));
    assert_eq!(handle_b.disconnects(), 0);

    drop(caller_b.inbound);
    let report_b = task_b.await.unwrap();
    assert_eq!(report_b.stats.tool_errors, 0);
    assert_eq!(report_b.stats.turns_released, 1);
    assert_ne!(report_a.session_id, report_b.session_id);
    assert_eq!(gateway.active_sessions(), 0);
}

// =============================================================================
// Closing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_session_is_closed() {
    let handle = MockHandle::new();
    let gateway = test_gateway(
        mock_factory(handle.clone(), ConnectBehavior::Succeed),
        GatewaySettings {
            session: SessionSettings {
                idle_timeout: Duration::from_secs(60),
                ..SessionSettings::default()
            },
            max_concurrent_sessions: None,
        },
    );
    let (mut caller, task) = spawn_session(&gateway);

    let started = tokio::time::Instant::now();
    let report = task.await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(report.final_state, SessionState::Closed);
    assert!(matches!(report.close_reason, Some(CloseReason::IdleTimeout)));
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Close {
            code: close_code::GOING_AWAY,
            reason: "idle_timeout".to_string(),
        }
    );
    assert_eq!(handle.disconnects(), 1);
    drop(caller.inbound);
}

#[tokio::test]
async fn test_unbounded_idle_timeout_does_not_fire() {
    let handle = MockHandle::new();
    let gateway = test_gateway(
        mock_factory(handle.clone(), ConnectBehavior::Succeed),
        GatewaySettings {
            session: SessionSettings {
                idle_timeout: Duration::from_secs(u64::MAX),
                ..SessionSettings::default()
            },
            max_concurrent_sessions: None,
        },
    );
    let (caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    caller.start().await;
    caller.send_frame(1, b"hi").await;
    assert!(handle.wait_for(|calls| calls.len() >= 2).await);

    drop(caller.inbound);
    let report = task.await.unwrap();
    assert_eq!(report.final_state, SessionState::Closed);
    assert!(matches!(report.close_reason, Some(CloseReason::CallerHangup)));
}

#[tokio::test]
async fn test_backend_error_closes_session() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit(BackendEvent::protocol_error("unexpected message shape"))
        .await;

    let report = task.await.unwrap();
    assert!(matches!(
        report.close_reason,
        Some(CloseReason::Fatal(SessionError::BackendProtocol(_)))
    ));
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Close {
            code: close_code::INTERNAL_ERROR,
            reason: "backend_protocol_error".to_string(),
        }
    );
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_backend_close_ends_session() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle
        .emit(BackendEvent::Closed {
            reason: "server shutting down".to_string(),
        })
        .await;

    let report = task.await.unwrap();
    assert!(matches!(
        report.close_reason,
        Some(CloseReason::BackendClosed(ref reason)) if reason == "server shutting down"
    ));
    assert_eq!(
        caller.next_command().await,
        CallerCommand::Close {
            code: close_code::GOING_AWAY,
            reason: "backend_closed".to_string(),
        }
    );
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_backend_stream_end_ends_session() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    handle.drop_events();

    let report = task.await.unwrap();
    assert!(matches!(report.close_reason, Some(CloseReason::BackendClosed(_))));
    drop(caller);
}

#[tokio::test]
async fn test_stop_then_hangup_releases_once() {
    let handle = MockHandle::new();
    let gateway = test_gateway(mock_factory(handle.clone(), ConnectBehavior::Succeed), settings());
    let (mut caller, task) = spawn_session(&gateway);
    connected(&handle).await;

    caller.inbound.send(InboundEvent::Stop).await.unwrap();
    caller.inbound.send(InboundEvent::Stop).await.ok();
    let report = task.await.unwrap();

    assert_eq!(report.final_state, SessionState::Closed);
    assert_eq!(handle.disconnects(), 1);
    assert!(matches!(
        caller.next_command().await,
        CallerCommand::Close { code: 1000, .. }
    ));
    assert!(caller.commands.recv().await.is_none());
}
