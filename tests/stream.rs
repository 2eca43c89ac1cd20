use std::{sync::Arc, thread};

use crossbeam_channel::unbounded;
use exercise_classifier::{
    FEATURE_COUNT, InferenceOrchestrator, SequenceBuffer, SessionConfig, SessionReply,
    backend::stub::StubBackend, extract_features, start_session, types::fallback,
};

const CLASSES: [&str; 3] = ["bicep_curl", "squat", "push_up"];

fn pose(offset: f32) -> Vec<Vec<f32>> {
    (0..12)
        .map(|i| {
            let side = if i % 2 == 0 { 0.4 } else { 0.6 };
            vec![side + offset, 0.2 + 0.08 * i as f32, 0.1]
        })
        .collect()
}

#[test]
fn full_window_slides_one_prediction_per_frame() {
    let backend = Arc::new(StubBackend::new(&CLASSES, 2, FEATURE_COUNT));
    let orchestrator = InferenceOrchestrator::new(backend.clone());
    let mut buffer = SequenceBuffer::new(2 * FEATURE_COUNT).unwrap();

    let mut results = Vec::new();
    for frame in 0..4 {
        let features = extract_features(&pose(0.01 * frame as f32));
        assert_eq!(features.len(), FEATURE_COUNT);

        match buffer.append(&features).unwrap() {
            Some(window) => {
                assert_eq!(window.shape(), &[1, 2, FEATURE_COUNT]);
                results.push(orchestrator.predict(window.view()));
            }
            None => assert_eq!(frame, 0),
        }
    }

    assert_eq!(results.len(), 3);
    assert_eq!(backend.forward_calls(), 3);
    for result in &results {
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(
            CLASSES.contains(&result.label.as_str()) || fallback::ALL.contains(&result.label.as_str())
        );
    }
}

#[test]
fn concurrent_sessions_keep_separate_windows() {
    let orchestrator = Arc::new(InferenceOrchestrator::new(Arc::new(StubBackend::new(
        &CLASSES,
        3,
        FEATURE_COUNT,
    ))));

    let mut workers = Vec::new();
    for session_frames in [3usize, 2] {
        let (frame_tx, frame_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();
        let handle = start_session(
            orchestrator.clone(),
            SessionConfig::default(),
            frame_rx,
            reply_tx,
        )
        .unwrap();

        let feeder = thread::spawn(move || {
            for i in 0..session_frames {
                let frame = serde_json::json!({
                    "keypoints": pose(0.02 * i as f32),
                    "timestamp": i,
                });
                frame_tx.send(frame.to_string()).unwrap();
            }
        });
        workers.push((feeder, handle, reply_rx));
    }

    let mut replies: Vec<Vec<SessionReply>> = Vec::new();
    for (feeder, handle, reply_rx) in workers {
        feeder.join().unwrap();
        handle.join().unwrap();
        replies.push(reply_rx.iter().collect());
    }

    // Three frames fill a window; two frames from another stream never do.
    assert!(replies[0][2].is_prediction());
    assert!(replies[1].iter().all(|r| !r.is_prediction()));
    assert_eq!(replies[1][1].frames_needed, Some(1));
}
