//! Seed and determinism tests.
//!
//! Tests cover:
//! - Same seed → identical batches for every randomized sampler
//! - Different seeds → different batches
//! - Deterministic samplers ignore the seed entirely

mod common;
use common::{index_from_listing, init_logging, TEST_SEED};

use frame_sampling::{AnySampler, BatchKeys, Sampler, SamplerConfig};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

const VIDEOS: [(&str, usize); 6] = [("a", 40), ("b", 25), ("c", 31), ("d", 12), ("e", 18), ("f", 9)];

fn collect_batches(json: &str, seed: u64, calls: usize) -> Result<Vec<BatchKeys>> {
    init_logging();
    let source = index_from_listing(&VIDEOS, 2, |video, frame| match (video, frame % 3) {
        ("a", 0) => Some(1),
        ("b", _) => Some(2),
        _ => None,
    })?;
    let config = SamplerConfig::from_json_str(json)?;
    let mut sampler = AnySampler::new(&config, source, StdRng::seed_from_u64(seed))?;
    let width = match config.options {
        frame_sampling::SamplerOptions::Sequential { batch_size, .. } => batch_size.unwrap_or(1),
        _ => 8,
    };
    (0..calls).map(|_| sampler.sample_keys(width)).collect()
}

const RANDOMIZED: [&str; 5] = [
    r#"{"sampler": "permuted", "sequence_length": 3}"#,
    r#"{"sampler": "permuted", "sequence_length": 3, "replace": true}"#,
    r#"{"sampler": "balanced", "sequence_length": 2, "background_weight": 0.5}"#,
    r#"{"sampler": "sequential", "sequence_length": 4, "batch_size": 2}"#,
    r#"{"sampler": "sequential_batch", "sequence_length": 4}"#,
];

#[test]
fn same_seed_produces_identical_batches() -> Result<()> {
    for json in RANDOMIZED {
        let first = collect_batches(json, TEST_SEED, 20)?;
        let second = collect_batches(json, TEST_SEED, 20)?;
        assert_eq!(first, second, "{json}");
    }
    Ok(())
}

#[test]
fn different_seeds_produce_different_batches() -> Result<()> {
    for json in RANDOMIZED {
        let first = collect_batches(json, TEST_SEED, 20)?;
        let second = collect_batches(json, TEST_SEED + 1, 20)?;
        assert_ne!(first, second, "{json}");
    }
    Ok(())
}

#[test]
fn uniform_sampler_ignores_seed() -> Result<()> {
    let json = r#"{"sampler": "uniformly_spaced", "sequence_length": 2, "num_frames_per_video": 4}"#;
    assert_eq!(
        collect_batches(json, TEST_SEED, 5)?,
        collect_batches(json, TEST_SEED + 1, 5)?
    );
    Ok(())
}
