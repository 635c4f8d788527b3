use cv_search::synthetic::SyntheticScene;
use cv_search::{RankedResult, SearchConfig, SearchEngine};

/// Respects RUST_LOG, defaults to "warn".
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn scores(results: &[RankedResult]) -> Vec<usize> {
    results.iter().map(|r| r.score).collect()
}

#[test]
fn test_full_probe_matches_brute_force_across_scenes() {
    init_tracing();
    for seed in 0..4u64 {
        let engine = SearchEngine::new(&SearchConfig::default().with_seed(seed)).unwrap();
        let scene = SyntheticScene::new(seed, 32);
        let query = scene.query("q", 90);
        let gallery = scene.gallery(&query, 7);

        let brute = engine.rank_brute_force(&query, &gallery, 4);
        let two = engine.rank_two_stage(&query, &gallery, 4, gallery.len());
        assert_eq!(scores(&brute), scores(&two), "seed {seed}");
    }
}

#[test]
fn test_stricter_ratio_shrinks_coarse_scores() {
    init_tracing();
    let scene = SyntheticScene::new(12, 32);
    let query = scene.query("q", 120);
    let gallery = scene.gallery(&query, 6);

    let loose = SearchEngine::new(&SearchConfig {
        ratio: 0.9,
        ..SearchConfig::default().with_seed(1)
    })
    .unwrap();
    let strict = SearchEngine::new(&SearchConfig {
        ratio: 0.3,
        ..SearchConfig::default().with_seed(1)
    })
    .unwrap();

    for candidate in &gallery {
        let l = loose.score_pair(&query, candidate).correspondences.len();
        let s = strict.score_pair(&query, candidate).correspondences.len();
        assert!(s <= l, "{}: strict {s} > loose {l}", candidate.id());
    }
}

#[test]
fn test_two_stage_is_idempotent_with_seed() {
    init_tracing();
    let config = SearchConfig {
        parallel: true,
        ..SearchConfig::default().with_seed(8)
    };
    let engine = SearchEngine::new(&config).unwrap();
    let scene = SyntheticScene::new(8, 32);
    let query = scene.query("q", 100);
    let gallery = scene.gallery(&query, 9);

    let first = engine.rank_two_stage(&query, &gallery, 3, 4);
    for _ in 0..3 {
        assert_eq!(engine.rank_two_stage(&query, &gallery, 3, 4), first);
    }
}

#[test]
fn test_results_are_sorted_and_bounded() {
    init_tracing();
    let engine = SearchEngine::new(&SearchConfig::default().with_seed(4)).unwrap();
    let scene = SyntheticScene::new(4, 32);
    let query = scene.query("q", 80);
    let gallery = scene.gallery(&query, 10);

    for (top_k, n_probe) in [(3, 5), (5, 3), (20, 20), (0, 4)] {
        let results = engine.rank_two_stage(&query, &gallery, top_k, n_probe);
        assert!(results.len() <= top_k.min(n_probe).min(gallery.len()));
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
