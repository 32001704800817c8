mod common;

use std::io::Write;
use std::sync::Arc;

use approx::assert_relative_eq;
use lm_model::CellType;
use lm_scorer::{LmScorer, ScorerConfig, ScorerError, SpecialLabels};
use lm_tensor::{Shape, Tensor};

use common::{random_model, save, toy_gru, toy_labels};

fn toy_scorer(threads: usize) -> LmScorer {
    LmScorer::from_shared(Arc::new(toy_gru()), threads, toy_labels()).unwrap()
}

#[test]
fn test_toy_reference_scores() {
    let scorer = toy_scorer(1);
    let zero = scorer.zero_state().unwrap();
    assert_eq!(zero.shape().dims(), &[2, 1, 2]);

    let a = 1.0f32.tanh() / 2.0;
    let lse = (2.0 * a.exp() + 2.0 * (-a).exp()).ln();

    let (score, next) = scorer.step(&zero, scorer.start(), 1).unwrap();
    assert_relative_eq!(score, -a - lse, epsilon = 1e-5);
    let expected = Tensor::new(vec![a, -a, 0.0, 0.0], Shape::from_slice(&[2, 1, 2]));
    assert!(next.max_abs_diff(&expected).unwrap() < 1e-5);

    let (eos, _) = scorer.step_eos(&zero, scorer.start()).unwrap();
    assert_relative_eq!(eos, a - lse, epsilon = 1e-5);
}

#[test]
fn test_step_eos_matches_step_with_eos() {
    let scorer = LmScorer::from_shared(
        Arc::new(random_model(CellType::Lstm, 120, 1)),
        1,
        SpecialLabels::default(),
    )
    .unwrap();
    let zero = scorer.zero_state().unwrap();
    let (_, state) = scorer.step(&zero, scorer.start(), 17).unwrap();

    let (eos_score, eos_state) = scorer.step_eos(&state, 17).unwrap();
    let (score, next) = scorer.step(&state, 17, scorer.eos()).unwrap();
    assert_eq!(eos_score, score);
    assert_eq!(eos_state, next);
}

#[test]
fn test_default_start_label() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&random_model(CellType::Gru, 120, 2), dir.path(), "gru.gguf");

    let mut scorer = LmScorer::new();
    scorer.load(&path, 1).unwrap();
    assert_eq!(scorer.start(), 99);
    assert_eq!(scorer.eos(), 99);

    let zero = scorer.zero_state().unwrap();
    let (score, _) = scorer.step(&zero, scorer.start(), 5).unwrap();
    assert!(score.is_finite() && score < 0.0);
}

#[test]
fn test_step_is_deterministic_and_pure() {
    let scorer = LmScorer::from_shared(
        Arc::new(random_model(CellType::Gru, 120, 3)),
        1,
        SpecialLabels::default(),
    )
    .unwrap();
    let zero = scorer.zero_state().unwrap();
    let (_, state) = scorer.step(&zero, 99, 40).unwrap();
    let snapshot = state.clone();

    let first = scorer.step(&state, 40, 41).unwrap();
    let second = scorer.step(&state, 40, 41).unwrap();
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
    assert_eq!(state, snapshot);

    // Expanding the same state with different labels gives the same next state.
    let other = scorer.step(&state, 40, 7).unwrap();
    assert_eq!(other.1, first.1);
}

#[test]
fn test_independent_hypotheses_do_not_interfere() {
    let scorer = LmScorer::from_shared(
        Arc::new(random_model(CellType::Lstm, 120, 4)),
        1,
        SpecialLabels::default(),
    )
    .unwrap();
    let run_alone = |labels: &[u32]| scorer.score_sequence(labels).unwrap();
    let x = [3u32, 14, 15, 92];
    let y = [65u32, 35, 89, 79];
    let alone_x = run_alone(&x);
    let alone_y = run_alone(&y);

    let mut sx = scorer.zero_state().unwrap();
    let mut sy = scorer.zero_state().unwrap();
    let (mut px, mut py) = (scorer.start(), scorer.start());
    let (mut tx, mut ty) = (Vec::new(), Vec::new());
    for (&lx, &ly) in x.iter().zip(&y) {
        let (score, next) = scorer.step(&sx, px, lx).unwrap();
        tx.push(score);
        sx = next;
        px = lx;
        let (score, next) = scorer.step(&sy, py, ly).unwrap();
        ty.push(score);
        sy = next;
        py = ly;
    }
    tx.push(scorer.step_eos(&sx, px).unwrap().0);
    ty.push(scorer.step_eos(&sy, py).unwrap().0);

    assert_eq!(tx, alone_x.per_label);
    assert_eq!(ty, alone_y.per_label);
}

#[test]
fn test_sequence_score_sums_steps() {
    let scorer = toy_scorer(1);
    let seq = scorer.score_sequence(&[1, 2, 1]).unwrap();
    assert_eq!(seq.per_label.len(), 4);
    assert_relative_eq!(seq.total, seq.per_label.iter().sum::<f32>());
    assert!(seq.per_label.iter().all(|s| *s < 0.0));
}

#[test]
fn test_thread_count_does_not_change_results() {
    let model = Arc::new(random_model(CellType::Gru, 300, 5));
    let labels = SpecialLabels::default();
    let serial = LmScorer::from_shared(Arc::clone(&model), 1, labels).unwrap();
    let pooled = LmScorer::from_shared(Arc::clone(&model), 4, labels).unwrap();
    assert_eq!(pooled.num_threads().unwrap(), 4);

    let seq = [10u32, 200, 31, 299, 0];
    assert_eq!(
        serial.score_sequence(&seq).unwrap(),
        pooled.score_sequence(&seq).unwrap()
    );
}

#[test]
fn test_shared_scorer_across_threads() {
    let scorer = LmScorer::from_shared(
        Arc::new(random_model(CellType::Rnn, 120, 6)),
        1,
        SpecialLabels::default(),
    )
    .unwrap();
    let sequences: Vec<Vec<u32>> = (0..4).map(|i| vec![i, i + 10, i + 20]).collect();
    let expected: Vec<f32> = sequences
        .iter()
        .map(|s| scorer.score_sequence(s).unwrap().total)
        .collect();

    let scorer = &scorer;
    let got: Vec<f32> = std::thread::scope(|scope| {
        let handles: Vec<_> = sequences
            .iter()
            .map(|s| scope.spawn(move || scorer.score_sequence(s).unwrap().total))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(got, expected);
}

#[test]
fn test_out_of_vocabulary_labels() {
    let scorer = toy_scorer(1);
    let zero = scorer.zero_state().unwrap();

    let err = scorer.step(&zero, 0, 4).unwrap_err();
    assert!(matches!(
        err,
        ScorerError::LabelOutOfRange {
            label: 4,
            vocab_size: 4
        }
    ));
    assert!(err.is_caller_error());
    assert!(matches!(
        scorer.step(&zero, 7, 1),
        Err(ScorerError::LabelOutOfRange { label: 7, .. })
    ));
}

#[test]
fn test_default_eos_outside_small_vocab_fails_at_step() {
    // Reserved labels are not checked at load; using them is.
    let scorer =
        LmScorer::from_shared(Arc::new(toy_gru()), 1, SpecialLabels::default()).unwrap();
    let zero = scorer.zero_state().unwrap();
    assert!(matches!(
        scorer.step_eos(&zero, 1),
        Err(ScorerError::LabelOutOfRange { label: 99, .. })
    ));
}

#[test]
fn test_wrong_state_shape_is_runtime_error() {
    let scorer = toy_scorer(1);
    let bad = Tensor::zeros(Shape::from_slice(&[2, 2, 2]));
    let err = scorer.step(&bad, 0, 1).unwrap_err();
    assert!(matches!(err, ScorerError::Runtime(_)));
    assert!(!err.is_caller_error());
}

#[test]
fn test_failed_load_leaves_scorer_unusable() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("garbage.gguf");
    std::fs::write(&garbage, b"definitely not a model file").unwrap();

    let mut scorer = LmScorer::with_labels(toy_labels());
    assert!(matches!(
        scorer.load(&garbage, 1),
        Err(ScorerError::Load { .. })
    ));
    assert!(!scorer.is_loaded());
    let state = Tensor::zeros(Shape::from_slice(&[2, 1, 2]));
    assert!(matches!(
        scorer.step(&state, 0, 1),
        Err(ScorerError::NotLoaded)
    ));

    // A later load of a valid file still works.
    let good = save(&toy_gru(), dir.path(), "toy.gguf");
    scorer.load(&good, 1).unwrap();
    assert!(scorer.step(&state, 0, 1).is_ok());
}

#[test]
fn test_truncated_file_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&toy_gru(), dir.path(), "toy.gguf");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

    let mut scorer = LmScorer::new();
    assert!(matches!(scorer.load(&path, 1), Err(ScorerError::Load { .. })));
    assert!(!scorer.is_loaded());
}

fn gguf_prefix(n_tensors: u64, n_kv: u64) -> Vec<u8> {
    let mut bytes = b"GGUF".to_vec();
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&n_tensors.to_le_bytes());
    bytes.extend_from_slice(&n_kv.to_le_bytes());
    bytes
}

#[test]
fn test_corrupt_tables_fail_to_load() {
    let dir = tempfile::tempdir().unwrap();

    // Metadata array nested far deeper than any model needs.
    let mut nested = gguf_prefix(0, 1);
    nested.extend_from_slice(&1u64.to_le_bytes());
    nested.push(b'k');
    nested.extend_from_slice(&9u32.to_le_bytes());
    for _ in 0..200_000 {
        nested.extend_from_slice(&9u32.to_le_bytes());
        nested.extend_from_slice(&1u64.to_le_bytes());
    }
    let nested_path = dir.path().join("nested.gguf");
    std::fs::write(&nested_path, &nested).unwrap();

    // Tensor whose element count overflows but whose byte size is zero.
    let mut huge = gguf_prefix(1, 0);
    let name = b"token_embd.weight";
    huge.extend_from_slice(&(name.len() as u64).to_le_bytes());
    huge.extend_from_slice(name);
    huge.extend_from_slice(&3u32.to_le_bytes());
    for d in [1u64 << 33, 1 << 33, 0] {
        huge.extend_from_slice(&d.to_le_bytes());
    }
    huge.extend_from_slice(&0u32.to_le_bytes());
    huge.extend_from_slice(&0u64.to_le_bytes());
    huge.resize(huge.len() + 96, 0);
    let huge_path = dir.path().join("huge.gguf");
    std::fs::write(&huge_path, &huge).unwrap();

    for path in [&nested_path, &huge_path] {
        let mut scorer = LmScorer::new();
        assert!(matches!(scorer.load(path, 1), Err(ScorerError::Load { .. })));
        assert!(!scorer.is_loaded());
    }
}

#[test]
fn test_second_load_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&toy_gru(), dir.path(), "toy.gguf");
    let mut scorer = LmScorer::with_labels(toy_labels());
    scorer.load(&path, 1).unwrap();
    assert!(matches!(
        scorer.load(&path, 1),
        Err(ScorerError::AlreadyLoaded)
    ));
    assert!(scorer.is_loaded());
}

#[test]
fn test_loaded_file_matches_in_memory_model() {
    let dir = tempfile::tempdir().unwrap();
    let model = random_model(CellType::Lstm, 120, 8);
    let path = save(&model, dir.path(), "lstm.gguf");

    let mut from_file = LmScorer::new();
    from_file.load(&path, 2).unwrap();
    let in_memory =
        LmScorer::from_shared(Arc::new(model), 1, SpecialLabels::default()).unwrap();

    let seq = [1u32, 2, 3, 119];
    assert_eq!(
        from_file.score_sequence(&seq).unwrap(),
        in_memory.score_sequence(&seq).unwrap()
    );
}

#[test]
fn test_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = save(&toy_gru(), dir.path(), "toy.gguf");
    let config_path = dir.path().join("scorer.toml");
    let mut f = std::fs::File::create(&config_path).unwrap();
    writeln!(f, "model_path = {:?}", model_path.display().to_string()).unwrap();
    writeln!(f, "num_threads = 2").unwrap();
    writeln!(f, "[labels]\nsos = 0\neos = 3\nstart = 0").unwrap();
    drop(f);

    let config = ScorerConfig::load_from_path(&config_path).unwrap();
    let scorer = LmScorer::from_config(&config).unwrap();
    assert_eq!(scorer.labels(), toy_labels());
    assert_eq!(scorer.num_threads().unwrap(), 2);

    let reference = toy_scorer(1);
    assert_eq!(
        scorer.score_sequence(&[1, 2]).unwrap(),
        reference.score_sequence(&[1, 2]).unwrap()
    );
}

#[test]
fn test_vocab_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&toy_gru(), dir.path(), "toy.gguf");
    let mut scorer = LmScorer::with_labels(toy_labels());
    scorer.load(&path, 1).unwrap();

    let vocab = scorer.vocab().unwrap().unwrap();
    assert_eq!(vocab.encode(["a", "b", "</s>"]).unwrap(), vec![1, 2, 3]);
}
