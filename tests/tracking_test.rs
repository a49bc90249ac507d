use facetrack_rs::{
    AssociationStrategy, Detection, DetectionBuilder, TrackId, TrackManager, TrackState,
    TrackerConfig,
};

fn worked_example_face() -> Detection {
    Detection::new(10.0, 10.0, 50.0, 50.0, 0.9)
}

#[test]
fn test_worked_example_lifecycle() {
    let config = TrackerConfig::default();
    let mut manager = TrackManager::new(config.clone());
    let t1 = TrackId::new(1);

    // Frame 1: new tentative track.
    let report = manager.associate(1, &[worked_example_face()]);
    assert_eq!(report.created, vec![(t1, 0)]);
    assert_eq!(manager.get(t1).unwrap().state(), TrackState::Tentative);

    // Frames 2..confirm_threshold: confirmed on the last of them.
    for frame in 2..=u64::from(config.confirm_threshold) {
        let report = manager.associate(frame, &[worked_example_face()]);
        assert_eq!(report.matched, vec![(t1, 0)]);
        let expected = if frame == u64::from(config.confirm_threshold) {
            TrackState::Confirmed
        } else {
            TrackState::Tentative
        };
        assert_eq!(manager.get(t1).unwrap().state(), expected);
    }

    // max_missed_frames empty frames keep it around as Lost.
    let first_miss = u64::from(config.confirm_threshold) + 1;
    let last_kept = first_miss + u64::from(config.max_missed_frames) - 1;
    for frame in first_miss..=last_kept {
        let report = manager.associate(frame, &[]);
        assert!(report.is_noop());
        assert!(report.removed.is_empty());
        assert_eq!(manager.get(t1).unwrap().state(), TrackState::Lost);
    }

    // One more miss removes it, reported exactly once.
    let report = manager.associate(last_kept + 1, &[]);
    assert_eq!(report.removed, vec![t1]);
    assert!(manager.get(t1).is_none());
    assert!(manager.associate(last_kept + 2, &[]).removed.is_empty());

    // Re-appearance at the same place gets a fresh identity.
    let report = manager.associate(last_kept + 3, &[worked_example_face()]);
    assert_eq!(report.created, vec![(TrackId::new(2), 0)]);
}

#[test]
fn test_identity_stable_under_smooth_motion() {
    let mut manager = TrackManager::new(TrackerConfig::default());
    let embedding = vec![0.3, 0.1, 0.9, 0.2];

    for frame in 1..=40u64 {
        let x = 100.0 + 2.0 * frame as f32;
        let det = DetectionBuilder::new()
            .tlwh(x, 80.0, 60.0, 60.0)
            .score(0.95)
            .embedding(embedding.clone())
            .build();
        let report = manager.associate(frame, &[det]);

        if frame == 1 {
            assert_eq!(report.created.len(), 1);
        } else {
            assert!(report.created.is_empty());
            assert_eq!(report.matched, vec![(TrackId::new(1), 0)]);
        }
        if frame >= 3 {
            let ids: Vec<TrackId> = manager
                .tracks()
                .filter(|t| t.state() == TrackState::Confirmed)
                .map(|t| t.id())
                .collect();
            assert_eq!(ids, vec![TrackId::new(1)]);
        }
    }
}

#[test]
fn test_confirmation_needs_consecutive_hits() {
    let mut manager = TrackManager::new(TrackerConfig::default());
    let id = TrackId::new(1);

    manager.associate(1, &[worked_example_face()]);
    manager.associate(2, &[worked_example_face()]);
    // A miss resets the hit run.
    manager.associate(3, &[]);
    manager.associate(4, &[worked_example_face()]);
    manager.associate(5, &[worked_example_face()]);
    assert_eq!(manager.get(id).unwrap().state(), TrackState::Tentative);

    let report = manager.associate(6, &[worked_example_face()]);
    assert_eq!(report.confirmed, vec![id]);
    assert_eq!(manager.get(id).unwrap().state(), TrackState::Confirmed);
}

#[test]
fn test_two_faces_keep_their_identities() {
    let mut manager = TrackManager::new(TrackerConfig {
        strategy: AssociationStrategy::Optimal,
        ..Default::default()
    });

    let left = |x: f32| Detection::new(x, 100.0, x + 50.0, 150.0, 0.9);
    let right = |x: f32| Detection::new(x + 300.0, 100.0, x + 350.0, 150.0, 0.8);

    manager.associate(1, &[left(0.0), right(0.0)]);
    for frame in 2..10u64 {
        let shift = 3.0 * frame as f32;
        // Detection order swaps every frame.
        let dets = if frame % 2 == 0 {
            vec![right(shift), left(shift)]
        } else {
            vec![left(shift), right(shift)]
        };
        let report = manager.associate(frame, &dets);
        assert!(report.created.is_empty());

        let left_track = manager.get(TrackId::new(1)).unwrap();
        assert!(left_track.bbox().x < 100.0);
        let right_track = manager.get(TrackId::new(2)).unwrap();
        assert!(right_track.bbox().x > 200.0);
    }
}
