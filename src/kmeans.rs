use rand::prelude::*;
use rayon::prelude::*;

use crate::config::EmptyClusterPolicy;
use crate::math::l2_distance_sqr;

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub centroids: Vec<Vec<f32>>,
    pub assignments: Vec<usize>,
    /// Number of assignment passes that were executed.
    pub iterations: usize,
    /// True when a pass left every assignment unchanged before `max_iter` ran out.
    pub converged: bool,
    /// Clusters that own no sample in the final assignment.
    pub empty_clusters: usize,
}

/// Run Lloyd's k-means with centers seeded from uniformly drawn samples.
///
/// Seeds are drawn with replacement, so duplicate initial centers are
/// possible. Samples are assigned to the nearest center by squared L2
/// distance; ties go to the lowest cluster index. The first pass always
/// updates the centers; after that the loop stops as soon as a pass changes
/// no assignment, or after `max_iter` passes.
pub fn run_kmeans(
    data: &[Vec<f32>],
    k: usize,
    max_iter: usize,
    rng: &mut StdRng,
    policy: EmptyClusterPolicy,
) -> KMeansResult {
    assert!(!data.is_empty(), "k-means requires non-empty data");
    assert!(k > 0, "k must be positive");
    let dim = data[0].len();
    assert!(data.iter().all(|v| v.len() == dim));

    let mut centroids: Vec<Vec<f32>> = (0..k)
        .map(|_| data[rng.gen_range(0..data.len())].clone())
        .collect();
    // Unassigned until the first pass, so that pass always counts as a change
    // and at least one center update runs. Starting from cluster 0 instead
    // would let a pass that assigns everything to cluster 0 stop with the raw
    // seeds as centers.
    let mut assignments = vec![usize::MAX; data.len()];
    let mut fit_distances = vec![0.0f32; data.len()];
    let mut iterations = 0usize;
    let mut converged = false;

    for _ in 0..max_iter {
        iterations += 1;

        let changed = assignments
            .par_iter_mut()
            .zip(fit_distances.par_iter_mut())
            .enumerate()
            .map(|(idx, (assignment, fit))| {
                let (best_cluster, best_distance) = nearest_centroid(&data[idx], &centroids);
                *fit = best_distance;
                if *assignment != best_cluster {
                    *assignment = best_cluster;
                    1usize
                } else {
                    0usize
                }
            })
            .sum::<usize>();

        if changed == 0 {
            converged = true;
            break;
        }

        let empty = recompute_centroids(data, &assignments, &mut centroids);
        if !empty.is_empty() {
            log::debug!(
                "k-means pass {iterations}: {} of {k} clusters are empty",
                empty.len()
            );
            if policy == EmptyClusterPolicy::ReseedFromWorstFit {
                reseed_from_worst_fit(data, &fit_distances, &empty, &mut centroids);
            }
        }
    }

    let mut counts = vec![0usize; k];
    for &cluster in &assignments {
        counts[cluster] += 1;
    }
    let empty_clusters = counts.iter().filter(|&&count| count == 0).count();

    KMeansResult {
        centroids,
        assignments,
        iterations,
        converged,
        empty_clusters,
    }
}

/// Index and squared distance of the nearest centroid, first minimum wins.
pub(crate) fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> (usize, f32) {
    let mut best_cluster = 0usize;
    let mut best_distance = f32::MAX;
    for (cid, centroid) in centroids.iter().enumerate() {
        let dist = l2_distance_sqr(vector, centroid);
        if dist < best_distance {
            best_distance = dist;
            best_cluster = cid;
        }
    }
    (best_cluster, best_distance)
}

/// Move every populated centroid to the mean of its members and return the
/// ids of clusters that received no member. Empty centroids are left as-is.
///
/// Sums are accumulated in sample order so that a fixed seed reproduces the
/// same codebook regardless of thread scheduling.
fn recompute_centroids(
    data: &[Vec<f32>],
    assignments: &[usize],
    centroids: &mut [Vec<f32>],
) -> Vec<usize> {
    let k = centroids.len();
    let dim = centroids[0].len();
    let mut sums = vec![vec![0.0f32; dim]; k];
    let mut counts = vec![0usize; k];

    for (vector, &cluster) in data.iter().zip(assignments.iter()) {
        counts[cluster] += 1;
        for (sum, value) in sums[cluster].iter_mut().zip(vector.iter()) {
            *sum += *value;
        }
    }

    let mut empty = Vec::new();
    for cid in 0..k {
        if counts[cid] == 0 {
            empty.push(cid);
            continue;
        }
        let inv = 1.0f32 / counts[cid] as f32;
        for (center, sum) in centroids[cid].iter_mut().zip(sums[cid].iter()) {
            *center = *sum * inv;
        }
    }
    empty
}

/// Give each empty cluster a distinct sample, worst-fitting samples first.
fn reseed_from_worst_fit(
    data: &[Vec<f32>],
    fit_distances: &[f32],
    empty: &[usize],
    centroids: &mut [Vec<f32>],
) {
    let mut order: Vec<usize> = (0..data.len()).collect();
    order.sort_by(|&a, &b| {
        fit_distances[b]
            .total_cmp(&fit_distances[a])
            .then_with(|| a.cmp(&b))
    });
    for (&cid, &sample) in empty.iter().zip(order.iter()) {
        centroids[cid].copy_from_slice(&data[sample]);
    }
}
