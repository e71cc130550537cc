//! Few-Shot Networks Demo
//!
//! This demo walks through a single 5-way task:
//! 1. Sampling a task from a synthetic dataset
//! 2. Computing prototypes and prototypical predictions
//! 3. Building cosine attention and matching network predictions
//! 4. Evaluating a full epoch from a JSON configuration
//!
//! Run with: cargo run --example few_shot_demo
//! Set RUST_LOG=debug to see per-task logs.

use anyhow::Result;
use few_shot_networks::prelude::*;
use ndarray::{s, Array2, Axis};
use tracing_subscriber::EnvFilter;

fn label_embedding(x: &Array2<f64>) -> few_shot_networks::Result<Array2<f64>> {
    // Drop the sample index column of the dummy features
    Ok(x.slice(s![.., 1..]).mapv(|v| v * 10.0))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    println!("=== Few-Shot Networks Demo ===\n");

    let (n, k, q) = (5, 5, 3);
    let dataset = DummyDataset::new(200, 20, 2)?;

    println!("1. Sampling a {}-shot, {}-way task with {} queries per class...", n, k, q);
    let mut sampler = NShotTaskSampler::new(&dataset, 10, n, k, q, 1)?.with_seed(42);
    let task = sampler.sample_task()?;
    println!("   - Classes: {:?}", task.classes);
    println!("   - Task features: {:?}\n", task.x.dim());

    println!("2. Computing prototypes...");
    let support = task.support()?;
    let prototypes = compute_prototypes_grouped(&support)?;
    for (i, prototype) in prototypes.axis_iter(Axis(0)).enumerate() {
        println!("   - Class {} (dataset id {}): {:?}", i, task.classes[i], prototype.to_vec());
    }

    let embeddings = label_embedding(&task.x)?;
    let proto = proto_net_episode(&embeddings, n, k, q, DistanceMetric::L2)?;
    println!("   - Prototypical accuracy: {:.1}%\n", proto.accuracy * 100.0);

    println!("3. Matching network predictions from cosine attention...");
    let support_emb = embeddings.slice(s![..n * k, ..]).to_owned();
    let query_emb = embeddings.slice(s![n * k.., ..]).to_owned();
    let distances = pairwise_distances(&query_emb, &support_emb, DistanceMetric::Cosine)?;
    let attention = softmax_rows(&distances.mapv(|d| -d));
    let y_pred = matching_net_predictions(&attention, n, k, q)?;
    println!("   - Predictions shape: {:?}", y_pred.dim());
    println!("   - First query: {:?}\n", y_pred.row(0).to_vec());

    println!("4. Evaluating an epoch from configuration...");
    let config = FewShotConfig::from_json_str(
        r#"{"n": 1, "k": 5, "q": 5, "episodes_per_epoch": 20, "seed": 7}"#,
    )?;
    let summary = evaluate_prototypical(&dataset, &config, label_embedding)?;
    println!(
        "   - {} episodes, mean loss {:.4}, mean accuracy {:.1}%",
        summary.episodes,
        summary.mean_loss,
        summary.mean_accuracy * 100.0
    );

    let encoder = get_few_shot_encoder(3)?;
    println!(
        "\n5. Encoder output for 84x84 RGB images: {} dimensions",
        encoder.output_dim(84, 84)?
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}
